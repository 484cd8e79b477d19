//! flowcore: a BPMN process execution core.
//!
//! Commands are appended to a log and processed one at a time against the
//! partition state. Processing writes follow-up events, which update the
//! state, and follow-up commands, which are processed later. Element
//! instances move through a fixed lifecycle; message correlation is split
//! between a message side and a process side that talk through commands.

pub mod behavior;
pub mod clock;
pub mod command;
pub mod config;
pub mod correlation;
pub mod document;
pub mod engine;
pub mod error;
pub mod expression;
pub mod intent;
pub mod lifecycle;
pub mod log;
pub mod metrics;
pub mod model;
pub mod processing;
pub mod record;
pub mod state;
pub mod types;

pub use behavior::{ChannelJobNotifier, JobNotifier, NoopJobNotifier, Services};
pub use clock::{Clock, ControlledClock, SystemClock};
pub use command::{ClientCommand, CommandRequest};
pub use config::{ConfigError, EngineConfig};
pub use engine::{CommandOutcome, Engine};
pub use error::{EngineError, EngineResult};
pub use log::{MemoryLog, RecordLog};
pub use metrics::{ElementAction, EngineMetrics};
pub use model::ProcessRegistry;
pub use record::{Record, RecordType, RecordValue, RejectionType};
pub use state::EngineState;
pub use types::{ElementType, Key, Position, Timestamp};

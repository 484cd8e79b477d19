//! Partition state. Mutated only by applying events (see [`applier`]);
//! commands read it to decide which events to write. The one exception is
//! the sent-time index of pending subscription commands, which the periodic
//! sweeps stamp directly: it only schedules resends and is not part of any
//! record.
//!
//! Every store keeps an undo journal of the changes made since the last
//! [`EngineState::commit`], so a failed command is rolled back without
//! copying the partition.

mod applier;
mod journal;
pub mod compensation;
pub mod element_instance;
pub mod incident;
pub mod job;
pub mod message;
pub mod pending;
pub mod signal;
pub mod subscription;
pub mod user_task;
pub mod variable;

pub use compensation::CompensationSubscriptionState;
pub use element_instance::{ElementInstance, ElementInstanceState, EventTrigger};
pub use incident::IncidentState;
pub use job::JobState;
pub use message::{MessageState, StoredMessage};
pub use signal::SignalSubscriptionState;
pub use subscription::{
    MessageStartEventSubscriptionState, MessageSubscription, MessageSubscriptionState,
    ProcessMessageSubscription, ProcessMessageSubscriptionState, SubscriptionStatus,
};
pub use user_task::UserTaskState;
pub use variable::{VariableInstance, VariableState};

use journal::{transactional, Transactional};

/// Everything one partition knows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineState {
    pub element_instances: ElementInstanceState,
    pub variables: VariableState,
    pub messages: MessageState,
    pub message_subscriptions: MessageSubscriptionState,
    pub process_message_subscriptions: ProcessMessageSubscriptionState,
    pub message_start_subscriptions: MessageStartEventSubscriptionState,
    pub incidents: IncidentState,
    pub jobs: JobState,
    pub user_tasks: UserTaskState,
    pub signal_subscriptions: SignalSubscriptionState,
    pub compensation_subscriptions: CompensationSubscriptionState,
}

transactional!(EngineState {
    element_instances,
    variables,
    messages,
    message_subscriptions,
    process_message_subscriptions,
    message_start_subscriptions,
    incidents,
    jobs,
    user_tasks,
    signal_subscriptions,
    compensation_subscriptions,
});

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps every change made since the last commit.
    pub(crate) fn commit(&mut self) {
        Transactional::commit(self);
    }

    /// Discards every change made since the last commit.
    pub(crate) fn rollback(&mut self) {
        Transactional::rollback(self);
    }
}

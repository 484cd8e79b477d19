use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Scalar aliases ───────────────────────────────────────────

/// Globally unique, strictly increasing record key.
pub type Key = u64;

/// Epoch milliseconds (UTC).
pub type Timestamp = i64;

/// Position of a record in the log.
pub type Position = u64;

// ─── Element types ────────────────────────────────────────────

/// BPMN element type tag. Selects the processor that drives an element.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElementType {
    #[default]
    Process,
    SubProcess,
    StartEvent,
    EndEvent,
    IntermediateCatchEvent,
    IntermediateThrowEvent,
    BoundaryEvent,
    ServiceTask,
    UserTask,
    ReceiveTask,
    BusinessRuleTask,
    ExclusiveGateway,
    ParallelGateway,
    CallActivity,
    MultiInstanceBody,
    SequenceFlow,
}

impl ElementType {
    /// Elements that own child element instances.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            ElementType::Process
                | ElementType::SubProcess
                | ElementType::MultiInstanceBody
                | ElementType::CallActivity
        )
    }

    /// Elements that are entered without consuming a sequence flow token.
    pub fn is_entered_without_flow(&self) -> bool {
        matches!(
            self,
            ElementType::Process | ElementType::StartEvent | ElementType::BoundaryEvent
        )
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementType::Process => "PROCESS",
            ElementType::SubProcess => "SUB_PROCESS",
            ElementType::StartEvent => "START_EVENT",
            ElementType::EndEvent => "END_EVENT",
            ElementType::IntermediateCatchEvent => "INTERMEDIATE_CATCH_EVENT",
            ElementType::IntermediateThrowEvent => "INTERMEDIATE_THROW_EVENT",
            ElementType::BoundaryEvent => "BOUNDARY_EVENT",
            ElementType::ServiceTask => "SERVICE_TASK",
            ElementType::UserTask => "USER_TASK",
            ElementType::ReceiveTask => "RECEIVE_TASK",
            ElementType::BusinessRuleTask => "BUSINESS_RULE_TASK",
            ElementType::ExclusiveGateway => "EXCLUSIVE_GATEWAY",
            ElementType::ParallelGateway => "PARALLEL_GATEWAY",
            ElementType::CallActivity => "CALL_ACTIVITY",
            ElementType::MultiInstanceBody => "MULTI_INSTANCE_BODY",
            ElementType::SequenceFlow => "SEQUENCE_FLOW",
        };
        f.write_str(name)
    }
}

// ─── Event types ──────────────────────────────────────────────

/// Event definition carried by an event element.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BpmnEventType {
    #[default]
    None,
    Message,
    Signal,
    Link,
    Compensation,
}

use crate::error::ErrorType;
use crate::intent::Intent;
use crate::types::{BpmnEventType, ElementType, Key, Position, Timestamp};
use serde::{Deserialize, Serialize};

// ─── Record envelope ──────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordType {
    Command,
    Event,
    Rejection,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionType {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    InvalidState,
    ProcessingError,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub rejection_type: RejectionType,
    pub reason: String,
}

/// One entry of the append-only log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub position: Position,
    /// Key of the entity the record refers to. New commands carry none.
    pub key: Option<Key>,
    pub record_type: RecordType,
    pub intent: Intent,
    pub value: RecordValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<Rejection>,
}

impl Record {
    pub fn is_command(&self) -> bool {
        self.record_type == RecordType::Command
    }

    pub fn is_event(&self) -> bool {
        self.record_type == RecordType::Event
    }

    pub fn is_rejection(&self) -> bool {
        self.record_type == RecordType::Rejection
    }
}

// ─── Record values ────────────────────────────────────────────

/// Element instance lifecycle record. Also used for sequence flows.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessInstanceRecord {
    pub bpmn_process_id: String,
    pub process_definition_key: Key,
    pub process_instance_key: Key,
    pub element_id: String,
    pub element_type: ElementType,
    pub event_type: BpmnEventType,
    pub flow_scope_key: Option<Key>,
    /// Set on the root process instance of a called process.
    pub parent_process_instance_key: Option<Key>,
    /// Set on the root process instance of a called process.
    pub parent_element_instance_key: Option<Key>,
}

/// Terminates the children of one element instance in bounded chunks.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessInstanceBatchRecord {
    pub process_instance_key: Key,
    pub batch_element_instance_key: Key,
    /// Continue after this child key.
    pub index: Option<Key>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessInstanceCreationRecord {
    pub bpmn_process_id: String,
    /// Zero selects the latest definition of `bpmn_process_id`.
    pub process_definition_key: Key,
    pub process_instance_key: Option<Key>,
    /// MessagePack map.
    pub variables: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableRecord {
    pub name: String,
    /// MessagePack value.
    pub value: Vec<u8>,
    pub scope_key: Key,
    pub process_instance_key: Key,
    pub process_definition_key: Key,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableDocumentRecord {
    pub scope_key: Key,
    /// MessagePack map.
    pub variables: Vec<u8>,
    /// Write every field into `scope_key` instead of merging up the scope chain.
    pub local: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub name: String,
    pub correlation_key: String,
    pub time_to_live_ms: i64,
    /// Assigned on publish.
    pub deadline: Timestamp,
    pub variables: Vec<u8>,
    /// Idempotency id; empty ids are never deduplicated.
    pub message_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageSubscriptionRecord {
    pub process_instance_key: Key,
    pub element_instance_key: Key,
    pub bpmn_process_id: String,
    pub message_name: String,
    pub correlation_key: String,
    pub message_key: Option<Key>,
    pub variables: Vec<u8>,
    pub interrupting: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessMessageSubscriptionRecord {
    pub process_instance_key: Key,
    pub element_instance_key: Key,
    /// Catch element that is triggered on correlation.
    pub element_id: String,
    pub bpmn_process_id: String,
    pub message_name: String,
    pub correlation_key: String,
    pub message_key: Option<Key>,
    pub variables: Vec<u8>,
    pub interrupting: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageStartEventSubscriptionRecord {
    pub process_definition_key: Key,
    pub bpmn_process_id: String,
    pub start_event_id: String,
    pub message_name: String,
    pub message_key: Option<Key>,
    pub correlation_key: String,
    pub process_instance_key: Option<Key>,
    pub variables: Vec<u8>,
}

/// A triggered catch event waiting to be consumed by its scope.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessEventRecord {
    pub scope_key: Key,
    pub target_element_id: String,
    pub variables: Vec<u8>,
    pub process_instance_key: Key,
    pub process_definition_key: Key,
    pub interrupting: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub error_type: ErrorType,
    pub error_message: String,
    pub bpmn_process_id: String,
    pub process_definition_key: Key,
    pub process_instance_key: Key,
    pub element_id: String,
    pub element_instance_key: Key,
    pub variable_scope_key: Key,
    pub job_key: Option<Key>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_type: String,
    pub retries: u32,
    pub error_message: Option<String>,
    pub variables: Vec<u8>,
    pub element_id: String,
    pub element_instance_key: Key,
    pub process_instance_key: Key,
    pub process_definition_key: Key,
    pub bpmn_process_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserTaskRecord {
    pub element_id: String,
    pub element_instance_key: Key,
    pub process_instance_key: Key,
    pub process_definition_key: Key,
    pub bpmn_process_id: String,
    pub assignee: Option<String>,
    pub candidate_groups: Vec<String>,
    pub form_key: Option<String>,
    pub variables: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub signal_name: String,
    pub variables: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalSubscriptionRecord {
    pub signal_name: String,
    pub catch_element_id: String,
    /// Waiting element instance; the host activity for boundary events.
    pub catch_event_instance_key: Key,
    pub process_instance_key: Key,
    pub process_definition_key: Key,
    pub bpmn_process_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompensationSubscriptionRecord {
    pub process_instance_key: Key,
    pub process_definition_key: Key,
    pub bpmn_process_id: String,
    /// The completed activity that can be compensated.
    pub element_id: String,
    pub element_instance_key: Key,
    pub flow_scope_key: Key,
    pub handler_id: String,
    /// Set when a throw event triggers the handler.
    pub throw_event_instance_key: Option<Key>,
    pub handler_instance_key: Option<Key>,
}

// ─── RecordValue ──────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "value_type", content = "value")]
pub enum RecordValue {
    ProcessInstance(ProcessInstanceRecord),
    ProcessInstanceBatch(ProcessInstanceBatchRecord),
    ProcessInstanceCreation(ProcessInstanceCreationRecord),
    Variable(VariableRecord),
    VariableDocument(VariableDocumentRecord),
    Message(MessageRecord),
    MessageSubscription(MessageSubscriptionRecord),
    ProcessMessageSubscription(ProcessMessageSubscriptionRecord),
    MessageStartEventSubscription(MessageStartEventSubscriptionRecord),
    ProcessEvent(ProcessEventRecord),
    Incident(IncidentRecord),
    Job(JobRecord),
    UserTask(UserTaskRecord),
    Signal(SignalRecord),
    SignalSubscription(SignalSubscriptionRecord),
    CompensationSubscription(CompensationSubscriptionRecord),
}

macro_rules! value_from {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for RecordValue {
                fn from(value: $ty) -> Self {
                    RecordValue::$variant(value)
                }
            }
        )*
    };
}

value_from! {
    ProcessInstance => ProcessInstanceRecord,
    ProcessInstanceBatch => ProcessInstanceBatchRecord,
    ProcessInstanceCreation => ProcessInstanceCreationRecord,
    Variable => VariableRecord,
    VariableDocument => VariableDocumentRecord,
    Message => MessageRecord,
    MessageSubscription => MessageSubscriptionRecord,
    ProcessMessageSubscription => ProcessMessageSubscriptionRecord,
    MessageStartEventSubscription => MessageStartEventSubscriptionRecord,
    ProcessEvent => ProcessEventRecord,
    Incident => IncidentRecord,
    Job => JobRecord,
    UserTask => UserTaskRecord,
    Signal => SignalRecord,
    SignalSubscription => SignalSubscriptionRecord,
    CompensationSubscription => CompensationSubscriptionRecord,
}

impl MessageSubscriptionRecord {
    pub fn from_process_side(record: &ProcessMessageSubscriptionRecord) -> Self {
        Self {
            process_instance_key: record.process_instance_key,
            element_instance_key: record.element_instance_key,
            bpmn_process_id: record.bpmn_process_id.clone(),
            message_name: record.message_name.clone(),
            correlation_key: record.correlation_key.clone(),
            message_key: record.message_key,
            variables: record.variables.clone(),
            interrupting: record.interrupting,
        }
    }
}

impl ProcessMessageSubscriptionRecord {
    /// Process-side view of a message-side record. The catch element id is
    /// only known on the process side and is filled in from local state.
    pub fn from_message_side(record: &MessageSubscriptionRecord) -> Self {
        Self {
            process_instance_key: record.process_instance_key,
            element_instance_key: record.element_instance_key,
            element_id: String::new(),
            bpmn_process_id: record.bpmn_process_id.clone(),
            message_name: record.message_name.clone(),
            correlation_key: record.correlation_key.clone(),
            message_key: record.message_key,
            variables: record.variables.clone(),
            interrupting: record.interrupting,
        }
    }
}

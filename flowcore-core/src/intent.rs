//! Intents of every record value type.
//!
//! Commands are imperative (`ActivateElement`, `Publish`), events are past
//! tense (`ElementActivated`, `Published`). Only events are applied to state.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessInstanceIntent {
    ActivateElement,
    CompleteElement,
    TerminateElement,
    /// Client request to cancel a root process instance.
    Cancel,
    ElementActivating,
    ElementActivated,
    ElementCompleting,
    ElementCompleted,
    ElementTerminating,
    ElementTerminated,
    SequenceFlowTaken,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessInstanceBatchIntent {
    Terminate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessInstanceCreationIntent {
    Create,
    Created,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariableIntent {
    Created,
    Updated,
}

/// Bulk update of the variables of one scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariableDocumentIntent {
    Update,
    Updated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageIntent {
    Publish,
    Published,
    Expire,
    Expired,
}

/// Message-side subscription, owned by the message store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageSubscriptionIntent {
    Create,
    Created,
    Correlating,
    Correlate,
    Correlated,
    Reject,
    Rejected,
    Delete,
    Deleted,
}

/// Process-side subscription, owned by the waiting element instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessMessageSubscriptionIntent {
    Creating,
    Create,
    Created,
    Correlate,
    Correlated,
    Deleting,
    Delete,
    Deleted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStartEventSubscriptionIntent {
    Created,
    Correlated,
    Deleted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessEventIntent {
    Triggering,
    Triggered,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentIntent {
    Created,
    Resolve,
    Resolved,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobIntent {
    Created,
    Complete,
    Completed,
    Fail,
    Failed,
    UpdateRetries,
    RetriesUpdated,
    Canceled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserTaskIntent {
    Created,
    Complete,
    Completed,
    Canceled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalIntent {
    Broadcast,
    Broadcasted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalSubscriptionIntent {
    Created,
    Deleted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompensationSubscriptionIntent {
    Created,
    Triggered,
    Deleted,
}

// ─── Intent ───────────────────────────────────────────────────

/// Intent of a record, tagged by value type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "value_type", content = "intent")]
pub enum Intent {
    ProcessInstance(ProcessInstanceIntent),
    ProcessInstanceBatch(ProcessInstanceBatchIntent),
    ProcessInstanceCreation(ProcessInstanceCreationIntent),
    Variable(VariableIntent),
    VariableDocument(VariableDocumentIntent),
    Message(MessageIntent),
    MessageSubscription(MessageSubscriptionIntent),
    ProcessMessageSubscription(ProcessMessageSubscriptionIntent),
    MessageStartEventSubscription(MessageStartEventSubscriptionIntent),
    ProcessEvent(ProcessEventIntent),
    Incident(IncidentIntent),
    Job(JobIntent),
    UserTask(UserTaskIntent),
    Signal(SignalIntent),
    SignalSubscription(SignalSubscriptionIntent),
    CompensationSubscription(CompensationSubscriptionIntent),
}

macro_rules! intent_from {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Intent {
                fn from(intent: $ty) -> Self {
                    Intent::$variant(intent)
                }
            }
        )*
    };
}

intent_from! {
    ProcessInstance => ProcessInstanceIntent,
    ProcessInstanceBatch => ProcessInstanceBatchIntent,
    ProcessInstanceCreation => ProcessInstanceCreationIntent,
    Variable => VariableIntent,
    VariableDocument => VariableDocumentIntent,
    Message => MessageIntent,
    MessageSubscription => MessageSubscriptionIntent,
    ProcessMessageSubscription => ProcessMessageSubscriptionIntent,
    MessageStartEventSubscription => MessageStartEventSubscriptionIntent,
    ProcessEvent => ProcessEventIntent,
    Incident => IncidentIntent,
    Job => JobIntent,
    UserTask => UserTaskIntent,
    Signal => SignalIntent,
    SignalSubscription => SignalSubscriptionIntent,
    CompensationSubscription => CompensationSubscriptionIntent,
}

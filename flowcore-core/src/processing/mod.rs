//! Command processors.
//!
//! [`process_command`] routes one command to the processor of its value
//! type. Element lifecycle commands end up in [`element`], which dispatches
//! on the element type; everything else lives in a module per record type.
//! A processor either writes follow-up records through the facade, rejects
//! the command, or returns a defect that aborts it.

mod batch;
mod call_activity;
mod container;
mod creation;
mod element;
mod event;
mod gateway;
mod incident;
mod job;
mod message;
mod multi_instance;
mod process;
mod process_instance;
pub mod scheduled;
mod signal;
mod sub_process;
mod subscription;
mod task;
mod user_task;
mod variable_document;

pub use container::Container;

use crate::behavior::BpmnBehaviors;
use crate::error::EngineResult;
use crate::intent::*;
use crate::record::{Record, RecordValue, RejectionType};

/// Processes one command read from the log.
pub fn process_command(b: &mut BpmnBehaviors<'_>, command: &Record) -> EngineResult<()> {
    tracing::debug!(intent = ?command.intent, key = ?command.key, "processing command");
    match (command.intent, &command.value) {
        (Intent::ProcessInstance(intent), RecordValue::ProcessInstance(record)) => {
            process_instance::process(b, command, intent, record)
        }
        (Intent::ProcessInstanceBatch(ProcessInstanceBatchIntent::Terminate), RecordValue::ProcessInstanceBatch(record)) => {
            batch::terminate(b, command, record)
        }
        (Intent::ProcessInstanceCreation(ProcessInstanceCreationIntent::Create), RecordValue::ProcessInstanceCreation(record)) => {
            creation::create(b, command, record)
        }
        (Intent::Message(MessageIntent::Publish), RecordValue::Message(record)) => message::publish(b, command, record),
        (Intent::Message(MessageIntent::Expire), RecordValue::Message(_)) => message::expire(b, command),
        (Intent::MessageSubscription(intent), RecordValue::MessageSubscription(record)) => {
            subscription::process_message_side(b, command, intent, record)
        }
        (Intent::ProcessMessageSubscription(intent), RecordValue::ProcessMessageSubscription(record)) => {
            subscription::process_process_side(b, command, intent, record)
        }
        (Intent::Job(intent), RecordValue::Job(record)) => job::process(b, command, intent, record),
        (Intent::UserTask(UserTaskIntent::Complete), RecordValue::UserTask(record)) => {
            user_task::complete(b, command, record)
        }
        (Intent::Incident(IncidentIntent::Resolve), RecordValue::Incident(_)) => incident::resolve(b, command),
        (Intent::Signal(SignalIntent::Broadcast), RecordValue::Signal(record)) => signal::broadcast(b, command, record),
        (Intent::VariableDocument(VariableDocumentIntent::Update), RecordValue::VariableDocument(record)) => {
            variable_document::update(b, command, record)
        }
        (intent, _) => {
            b.reject(
                command,
                RejectionType::InvalidArgument,
                format!("Expected a supported command, but got intent {intent:?} with a {} value", value_type(&command.value)),
            );
            Ok(())
        }
    }
}

fn value_type(value: &RecordValue) -> &'static str {
    match value {
        RecordValue::ProcessInstance(_) => "PROCESS_INSTANCE",
        RecordValue::ProcessInstanceBatch(_) => "PROCESS_INSTANCE_BATCH",
        RecordValue::ProcessInstanceCreation(_) => "PROCESS_INSTANCE_CREATION",
        RecordValue::Variable(_) => "VARIABLE",
        RecordValue::VariableDocument(_) => "VARIABLE_DOCUMENT",
        RecordValue::Message(_) => "MESSAGE",
        RecordValue::MessageSubscription(_) => "MESSAGE_SUBSCRIPTION",
        RecordValue::ProcessMessageSubscription(_) => "PROCESS_MESSAGE_SUBSCRIPTION",
        RecordValue::MessageStartEventSubscription(_) => "MESSAGE_START_EVENT_SUBSCRIPTION",
        RecordValue::ProcessEvent(_) => "PROCESS_EVENT",
        RecordValue::Incident(_) => "INCIDENT",
        RecordValue::Job(_) => "JOB",
        RecordValue::UserTask(_) => "USER_TASK",
        RecordValue::Signal(_) => "SIGNAL",
        RecordValue::SignalSubscription(_) => "SIGNAL_SUBSCRIPTION",
        RecordValue::CompensationSubscription(_) => "COMPENSATION_SUBSCRIPTION",
    }
}

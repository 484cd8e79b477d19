//! Client commands, as accepted by the server.
//!
//! A [`ClientCommand`] is the JSON shape a client sends; it is turned into a
//! [`CommandRequest`] that the engine either applies directly (deployments)
//! or appends to the log as a command record.

use crate::document::{self, DocumentError};
use crate::intent::*;
use crate::record::*;
use crate::types::Key;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ClientCommand {
    Deploy {
        yaml: String,
    },
    CreateInstance {
        bpmn_process_id: String,
        #[serde(default)]
        variables: Value,
    },
    CancelInstance {
        process_instance_key: Key,
    },
    PublishMessage {
        name: String,
        #[serde(default)]
        correlation_key: String,
        #[serde(default)]
        time_to_live_ms: i64,
        #[serde(default)]
        message_id: Option<String>,
        #[serde(default)]
        variables: Value,
    },
    CompleteJob {
        job_key: Key,
        #[serde(default)]
        variables: Value,
    },
    FailJob {
        job_key: Key,
        retries: u32,
        #[serde(default)]
        error_message: Option<String>,
    },
    UpdateJobRetries {
        job_key: Key,
        retries: u32,
    },
    CompleteUserTask {
        user_task_key: Key,
        #[serde(default)]
        variables: Value,
    },
    ResolveIncident {
        incident_key: Key,
    },
    BroadcastSignal {
        signal_name: String,
        #[serde(default)]
        variables: Value,
    },
    SetVariables {
        scope_key: Key,
        #[serde(default)]
        variables: Value,
        #[serde(default)]
        local: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandRequest {
    Deploy(String),
    /// A command record for the log. `key` names the entity it targets.
    Submit {
        key: Option<Key>,
        intent: Intent,
        value: RecordValue,
    },
}

impl CommandRequest {
    pub fn submit(key: Option<Key>, intent: impl Into<Intent>, value: impl Into<RecordValue>) -> Self {
        CommandRequest::Submit {
            key,
            intent: intent.into(),
            value: value.into(),
        }
    }
}

impl TryFrom<ClientCommand> for CommandRequest {
    type Error = DocumentError;

    fn try_from(command: ClientCommand) -> Result<Self, Self::Error> {
        let request = match command {
            ClientCommand::Deploy { yaml } => CommandRequest::Deploy(yaml),
            ClientCommand::CreateInstance {
                bpmn_process_id,
                variables,
            } => CommandRequest::submit(
                None,
                ProcessInstanceCreationIntent::Create,
                ProcessInstanceCreationRecord {
                    bpmn_process_id,
                    process_definition_key: 0,
                    process_instance_key: None,
                    variables: document::from_json(&variables)?,
                },
            ),
            ClientCommand::CancelInstance { process_instance_key } => CommandRequest::submit(
                Some(process_instance_key),
                ProcessInstanceIntent::Cancel,
                ProcessInstanceRecord::default(),
            ),
            ClientCommand::PublishMessage {
                name,
                correlation_key,
                time_to_live_ms,
                message_id,
                variables,
            } => CommandRequest::submit(
                None,
                MessageIntent::Publish,
                MessageRecord {
                    name,
                    correlation_key,
                    time_to_live_ms,
                    deadline: 0,
                    variables: document::from_json(&variables)?,
                    message_id,
                },
            ),
            ClientCommand::CompleteJob { job_key, variables } => CommandRequest::submit(
                Some(job_key),
                JobIntent::Complete,
                JobRecord {
                    variables: document::from_json(&variables)?,
                    ..Default::default()
                },
            ),
            ClientCommand::FailJob {
                job_key,
                retries,
                error_message,
            } => CommandRequest::submit(
                Some(job_key),
                JobIntent::Fail,
                JobRecord {
                    retries,
                    error_message,
                    ..Default::default()
                },
            ),
            ClientCommand::UpdateJobRetries { job_key, retries } => CommandRequest::submit(
                Some(job_key),
                JobIntent::UpdateRetries,
                JobRecord {
                    retries,
                    ..Default::default()
                },
            ),
            ClientCommand::CompleteUserTask {
                user_task_key,
                variables,
            } => CommandRequest::submit(
                Some(user_task_key),
                UserTaskIntent::Complete,
                UserTaskRecord {
                    variables: document::from_json(&variables)?,
                    ..Default::default()
                },
            ),
            ClientCommand::ResolveIncident { incident_key } => CommandRequest::submit(
                Some(incident_key),
                IncidentIntent::Resolve,
                IncidentRecord::default(),
            ),
            ClientCommand::BroadcastSignal { signal_name, variables } => CommandRequest::submit(
                None,
                SignalIntent::Broadcast,
                SignalRecord {
                    signal_name,
                    variables: document::from_json(&variables)?,
                },
            ),
            ClientCommand::SetVariables {
                scope_key,
                variables,
                local,
            } => CommandRequest::submit(
                Some(scope_key),
                VariableDocumentIntent::Update,
                VariableDocumentRecord {
                    scope_key,
                    variables: document::from_json(&variables)?,
                    local,
                },
            ),
        };
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tagged_commands() {
        let command: ClientCommand = serde_json::from_value(json!({
            "command": "publish_message",
            "name": "paid",
            "correlation_key": "order-1",
            "time_to_live_ms": 1000
        }))
        .unwrap();
        assert_eq!(
            command,
            ClientCommand::PublishMessage {
                name: "paid".to_string(),
                correlation_key: "order-1".to_string(),
                time_to_live_ms: 1000,
                message_id: None,
                variables: Value::Null,
            }
        );

        let request = CommandRequest::try_from(command).unwrap();
        match request {
            CommandRequest::Submit { key, intent, value } => {
                assert_eq!(key, None);
                assert_eq!(intent, Intent::Message(MessageIntent::Publish));
                match value {
                    RecordValue::Message(message) => assert_eq!(message.variables, document::empty_document()),
                    other => panic!("unexpected value {other:?}"),
                }
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn non_object_variables_are_refused() {
        let command = ClientCommand::CompleteJob {
            job_key: 5,
            variables: json!([1, 2]),
        };
        assert_eq!(
            CommandRequest::try_from(command),
            Err(DocumentError::NotAMap("array"))
        );
    }
}

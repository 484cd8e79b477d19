use crate::behavior::BpmnBehaviors;
use crate::document;
use crate::error::EngineResult;
use crate::intent::{ProcessInstanceIntent, UserTaskIntent};
use crate::record::{Record, RejectionType, UserTaskRecord};

/// Completes a user task; its variables reach the element as a trigger.
pub(super) fn complete(b: &mut BpmnBehaviors<'_>, command: &Record, record: &UserTaskRecord) -> EngineResult<()> {
    let Some((key, task)) = command
        .key
        .and_then(|key| b.state.user_tasks.get(key).map(|task| (key, task.clone())))
    else {
        b.reject(
            command,
            RejectionType::NotFound,
            format!(
                "Expected to complete user task with key '{}', but no such user task was found",
                command.key.unwrap_or_default()
            ),
        );
        return Ok(());
    };
    if let Err(err) = document::entries(&record.variables) {
        b.reject(
            command,
            RejectionType::InvalidArgument,
            format!("Expected user task variables to be a valid document, but {err}"),
        );
        return Ok(());
    }

    b.emit(
        key,
        UserTaskIntent::Completed,
        UserTaskRecord {
            variables: record.variables.clone(),
            ..task.clone()
        },
    )?;
    tracing::debug!(user_task_key = key, element_instance_key = task.element_instance_key, "user task completed");

    let element = b.context_of(task.element_instance_key).ok();
    if let Some(element) = element.filter(|e| e.intent == ProcessInstanceIntent::ElementActivated) {
        b.trigger_event(&element, &task.element_id, record.variables.clone(), false)?;
        b.complete_element(&element);
    }
    Ok(())
}

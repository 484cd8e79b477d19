//! The root container of a process instance.

use super::element::{none_start_event, ElementProcessor};
use crate::behavior::{BpmnBehaviors, BpmnElementContext};
use crate::error::ProcessingResult;
use crate::model::ExecutableElement;

pub(super) static PROCESS: ElementProcessor = ElementProcessor {
    on_activate: activate,
    on_complete: complete,
    on_terminate: terminate,
};

/// A process instance started by a message enters through the triggered
/// start event, any other through its none start event.
fn activate(b: &mut BpmnBehaviors<'_>, element: &ExecutableElement, ctx: &BpmnElementContext) -> ProcessingResult<()> {
    let activated = b.transition_to_activated(ctx)?;
    let trigger = b.state.element_instances.peek_trigger(activated.key).cloned();
    match trigger {
        Some(trigger) => {
            b.consume_trigger(&activated, &trigger)?;
            let start = b.element_by_id(activated.record.process_definition_key, &trigger.element_id)?;
            b.activate_triggered_event(&activated, activated.key, start, &trigger.variables)?;
        }
        None => {
            let start = none_start_event(b, element, &activated)?;
            b.activate_child_instance(&activated, start);
        }
    }
    tracing::info!(
        process_instance_key = activated.key,
        bpmn_process_id = %activated.record.bpmn_process_id,
        "process instance activated"
    );
    Ok(())
}

fn complete(
    b: &mut BpmnBehaviors<'_>,
    element: &ExecutableElement,
    ctx: &BpmnElementContext,
    reentrant: bool,
) -> ProcessingResult<()> {
    let completing = b.transition_to_completing(ctx, reentrant)?;
    let correlation_key = correlation_key_of(b, &completing);
    let variables = if completing.record.parent_element_instance_key.is_some() {
        b.state.variables.local_document(completing.key)?
    } else {
        Vec::new()
    };

    let completed = b.transition_to_completed(element, &completing)?;
    b.on_called_process_completed(&completed, variables)?;
    if let Some(correlation_key) = correlation_key {
        b.correlate_buffered_start_message(&completed.record.bpmn_process_id, &correlation_key)?;
    }
    tracing::info!(
        process_instance_key = completed.key,
        bpmn_process_id = %completed.record.bpmn_process_id,
        "process instance completed"
    );
    Ok(())
}

fn terminate(b: &mut BpmnBehaviors<'_>, _element: &ExecutableElement, ctx: &BpmnElementContext) -> ProcessingResult<()> {
    let terminating = b.transition_to_terminating(ctx)?;
    b.resolve_incidents(&terminating)?;
    if b.terminate_child_instances(&terminating) {
        finish_process_termination(b, &terminating)?;
    }
    Ok(())
}

/// Terminates a process instance whose children are gone. Releases the
/// message start lock it may hold and lets the next buffered message in.
pub(super) fn finish_process_termination(b: &mut BpmnBehaviors<'_>, ctx: &BpmnElementContext) -> ProcessingResult<()> {
    let correlation_key = correlation_key_of(b, ctx);
    let terminated = b.finish_termination(ctx)?;
    if let Some(correlation_key) = correlation_key {
        b.correlate_buffered_start_message(&terminated.record.bpmn_process_id, &correlation_key)?;
    }
    tracing::info!(
        process_instance_key = terminated.key,
        bpmn_process_id = %terminated.record.bpmn_process_id,
        "process instance terminated"
    );
    Ok(())
}

fn correlation_key_of(b: &BpmnBehaviors<'_>, ctx: &BpmnElementContext) -> Option<String> {
    b.state
        .messages
        .correlation_key_of(ctx.key)
        .map(str::to_string)
}

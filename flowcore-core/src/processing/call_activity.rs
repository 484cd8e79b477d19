//! Call activities start an instance of another process and wait for it.
//!
//! The called instance sees a copy of every variable visible from the call
//! activity. When it completes, its root variables come back as the trigger
//! of the call activity and go through the output mappings like any other
//! result.

use super::element::{complete_and_take_flows, ElementProcessor};
use crate::behavior::{BpmnBehaviors, BpmnElementContext, VariableScope};
use crate::error::{ErrorType, Failure, ProcessingResult};
use crate::intent::ProcessInstanceIntent;
use crate::model::{ElementGraph, ExecutableElement};
use crate::record::ProcessInstanceRecord;
use crate::types::ElementType;

pub(super) static CALL_ACTIVITY: ElementProcessor = ElementProcessor {
    on_activate: activate,
    on_complete: complete_and_take_flows,
    on_terminate: terminate,
};

fn activate(b: &mut BpmnBehaviors<'_>, element: &ExecutableElement, ctx: &BpmnElementContext) -> ProcessingResult<()> {
    b.apply_input_mappings(element, ctx)?;

    let called_id = element.called_process_id.as_deref().unwrap_or_default();
    let graph: &dyn ElementGraph = b.graph;
    let Some(process) = graph.latest_process(called_id) else {
        return Err(Failure::new(
            format!("Expected process with BPMN process id '{called_id}' to be deployed, but not found."),
            ErrorType::CalledElementError,
        )
        .into());
    };
    let Some(root) = process.root().filter(|root| root.none_start_event.is_some()) else {
        return Err(Failure::new(
            format!("Expected process with BPMN process id '{called_id}' to have a none start event, but not found."),
            ErrorType::CalledElementError,
        )
        .into());
    };

    b.subscribe_to_events(element, ctx)?;
    let activated = b.transition_to_activated(ctx)?;

    let child_key = b.next_key();
    let record = ProcessInstanceRecord {
        bpmn_process_id: process.bpmn_process_id.clone(),
        process_definition_key: process.key,
        process_instance_key: child_key,
        element_id: root.id.clone(),
        element_type: ElementType::Process,
        event_type: root.event_type,
        flow_scope_key: None,
        parent_process_instance_key: Some(activated.process_instance_key()),
        parent_element_instance_key: Some(activated.key),
    };
    let variables = b.state.variables.visible_document(activated.key, None)?;
    b.merge_local_document(VariableScope::new(child_key, &record), &variables)?;
    b.command(child_key, ProcessInstanceIntent::ActivateElement, record);

    tracing::info!(
        call_activity_key = activated.key,
        child_process_instance_key = child_key,
        bpmn_process_id = %process.bpmn_process_id,
        "called process instance requested"
    );
    Ok(())
}

/// The called instance goes first; the call activity finishes its
/// termination once the child reports back.
fn terminate(b: &mut BpmnBehaviors<'_>, _element: &ExecutableElement, ctx: &BpmnElementContext) -> ProcessingResult<()> {
    let terminating = b.transition_to_terminating(ctx)?;
    b.unsubscribe_from_events(&terminating)?;
    b.resolve_incidents(&terminating)?;

    let child = b
        .state
        .element_instances
        .get(terminating.key)
        .and_then(|instance| instance.called_child_instance_key);
    match child {
        Some(child_key) => {
            let child = b.context_of(child_key)?;
            b.terminate_element(&child);
        }
        None => {
            b.finish_termination(&terminating)?;
        }
    }
    Ok(())
}

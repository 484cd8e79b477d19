//! Start, end, intermediate and boundary events.

use super::element::{complete_and_take_flows, terminate_leaf, ElementProcessor};
use crate::behavior::{BpmnBehaviors, BpmnElementContext};
use crate::error::{EngineError, ProcessingResult};
use crate::model::ExecutableElement;
use crate::types::{BpmnEventType, ElementType};

pub(super) static START_EVENT: ElementProcessor = ElementProcessor {
    on_activate: pass_through,
    on_complete: complete_and_take_flows,
    on_terminate: terminate_leaf,
};

/// An end event has no outgoing flows; completing it ends the execution
/// path, which is when its container is told.
pub(super) static END_EVENT: ElementProcessor = ElementProcessor {
    on_activate: pass_through,
    on_complete: complete_and_take_flows,
    on_terminate: terminate_leaf,
};

pub(super) static INTERMEDIATE_CATCH_EVENT: ElementProcessor = ElementProcessor {
    on_activate: activate_catch,
    on_complete: complete_and_take_flows,
    on_terminate: terminate_leaf,
};

pub(super) static INTERMEDIATE_THROW_EVENT: ElementProcessor = ElementProcessor {
    on_activate: activate_throw,
    on_complete: complete_throw,
    on_terminate: terminate_leaf,
};

pub(super) static BOUNDARY_EVENT: ElementProcessor = ElementProcessor {
    on_activate: pass_through,
    on_complete: complete_and_take_flows,
    on_terminate: terminate_leaf,
};

fn pass_through(b: &mut BpmnBehaviors<'_>, _element: &ExecutableElement, ctx: &BpmnElementContext) -> ProcessingResult<()> {
    let activated = b.transition_to_activated(ctx)?;
    b.complete_element(&activated);
    Ok(())
}

// ── Catch ──

fn activate_catch(b: &mut BpmnBehaviors<'_>, element: &ExecutableElement, ctx: &BpmnElementContext) -> ProcessingResult<()> {
    if element.event_type == BpmnEventType::Link {
        return pass_through(b, element, ctx);
    }
    b.apply_input_mappings(element, ctx)?;
    b.subscribe_to_events(element, ctx)?;
    b.transition_to_activated(ctx)?;
    Ok(())
}

// ── Throw ──

fn activate_throw(b: &mut BpmnBehaviors<'_>, element: &ExecutableElement, ctx: &BpmnElementContext) -> ProcessingResult<()> {
    b.apply_input_mappings(element, ctx)?;
    let activated = b.transition_to_activated(ctx)?;
    match element.event_type {
        BpmnEventType::Signal => {
            let variables = b.state.variables.local_document(activated.key)?;
            if let Some(signal_name) = element.signal_name.as_deref() {
                b.broadcast_signal(signal_name, variables);
            }
            b.complete_element(&activated);
        }
        // Completed by the last of its compensation handlers.
        BpmnEventType::Compensation => {
            if !b.trigger_compensation(element, &activated)? {
                b.complete_element(&activated);
            }
        }
        _ => b.complete_element(&activated),
    }
    Ok(())
}

/// A link throw continues at the link catch event of the same scope
/// instead of taking a sequence flow.
fn complete_throw(
    b: &mut BpmnBehaviors<'_>,
    element: &ExecutableElement,
    ctx: &BpmnElementContext,
    reentrant: bool,
) -> ProcessingResult<()> {
    if !element.is_link_throw() {
        return complete_and_take_flows(b, element, ctx, reentrant);
    }
    let process = b.process(ctx.record.process_definition_key)?;
    let scope_id = element.flow_scope.as_deref().unwrap_or(&process.bpmn_process_id);
    let link_name = element.link_name.as_deref().unwrap_or_default();
    let catch = process
        .link_catch(scope_id, link_name)
        .ok_or_else(|| EngineError::ElementNotFound {
            definition_key: process.key,
            element_id: format!("{scope_id}#{link_name}"),
            element_type: ElementType::IntermediateCatchEvent,
        })?;

    let completing = b.transition_to_completing(ctx, reentrant)?;
    let completed = b.transition_to_completed(element, &completing)?;
    b.activate_element_instance_in_flow_scope(&completed, catch);
    Ok(())
}

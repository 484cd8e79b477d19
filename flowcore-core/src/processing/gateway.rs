//! Gateways pass straight through: they are activated, completed and left
//! while processing a single command.

use super::element::{terminate_leaf, ElementProcessor};
use crate::behavior::{BpmnBehaviors, BpmnElementContext};
use crate::error::{ErrorType, Failure, ProcessingResult};
use crate::model::{ExecutableElement, SequenceFlow};

pub(super) static EXCLUSIVE_GATEWAY: ElementProcessor = ElementProcessor {
    on_activate: activate_exclusive,
    on_complete: complete_exclusive,
    on_terminate: terminate_leaf,
};

pub(super) static PARALLEL_GATEWAY: ElementProcessor = ElementProcessor {
    on_activate: activate_parallel,
    on_complete: complete_parallel,
    on_terminate: terminate_leaf,
};

// ── Exclusive ──

/// The first conditional flow whose condition holds, in model order; then
/// the default flow; then a flow without condition.
fn select_flow<'e>(
    b: &BpmnBehaviors<'_>,
    element: &'e ExecutableElement,
    ctx: &BpmnElementContext,
) -> ProcessingResult<Option<&'e SequenceFlow>> {
    if element.outgoing.is_empty() {
        return Ok(None);
    }
    for flow in element.outgoing.iter().filter(|f| !f.is_default) {
        if let Some(condition) = &flow.condition {
            if b.evaluate_bool(condition, ctx.key)? {
                return Ok(Some(flow));
            }
        }
    }
    let fallback = element
        .outgoing
        .iter()
        .find(|f| f.is_default)
        .or_else(|| element.outgoing.iter().find(|f| f.condition.is_none()));
    match fallback {
        Some(flow) => Ok(Some(flow)),
        None => Err(Failure::new(
            format!(
                "Expected at least one condition to evaluate to true, or to have a default flow, on gateway '{}'",
                element.id
            ),
            ErrorType::ConditionError,
        )
        .into()),
    }
}

fn activate_exclusive(b: &mut BpmnBehaviors<'_>, element: &ExecutableElement, ctx: &BpmnElementContext) -> ProcessingResult<()> {
    let flow = select_flow(b, element, ctx)?;
    let activated = b.transition_to_activated(ctx)?;
    leave_by(b, element, &activated, flow, false)
}

fn complete_exclusive(
    b: &mut BpmnBehaviors<'_>,
    element: &ExecutableElement,
    ctx: &BpmnElementContext,
    reentrant: bool,
) -> ProcessingResult<()> {
    let flow = select_flow(b, element, ctx)?;
    leave_by(b, element, ctx, flow, reentrant)
}

fn leave_by(
    b: &mut BpmnBehaviors<'_>,
    element: &ExecutableElement,
    ctx: &BpmnElementContext,
    flow: Option<&SequenceFlow>,
    reentrant: bool,
) -> ProcessingResult<()> {
    let completing = b.transition_to_completing(ctx, reentrant)?;
    let completed = b.transition_to_completed(element, &completing)?;
    if let Some(flow) = flow {
        tracing::debug!(gateway = %element.id, flow = %flow.id, "sequence flow selected");
        b.take_sequence_flow(&completed, flow)?;
    }
    Ok(())
}

// ── Parallel ──

fn activate_parallel(b: &mut BpmnBehaviors<'_>, element: &ExecutableElement, ctx: &BpmnElementContext) -> ProcessingResult<()> {
    let activated = b.transition_to_activated(ctx)?;
    complete_parallel(b, element, &activated, false)
}

fn complete_parallel(
    b: &mut BpmnBehaviors<'_>,
    element: &ExecutableElement,
    ctx: &BpmnElementContext,
    reentrant: bool,
) -> ProcessingResult<()> {
    let completing = b.transition_to_completing(ctx, reentrant)?;
    let completed = b.transition_to_completed(element, &completing)?;
    b.take_outgoing_sequence_flows(element, &completed)?;
    Ok(())
}

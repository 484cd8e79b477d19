//! Multi-instance bodies.
//!
//! The body wraps the inner activity and activates one instance of it per
//! element of the input collection, all at once or one after another. The
//! collection is evaluated again in the body scope whenever an inner
//! instance needs its element.

use super::element::{terminate_container, ElementProcessor};
use crate::behavior::{type_name, BpmnBehaviors, BpmnElementContext};
use crate::document;
use crate::error::{EngineError, EngineResult, ErrorType, Failure, ProcessingError, ProcessingResult};
use crate::intent::ProcessInstanceIntent;
use crate::model::{ExecutableElement, LoopCharacteristics};
use crate::types::Key;
use serde_json::Value;

pub(super) static MULTI_INSTANCE_BODY: ElementProcessor = ElementProcessor {
    on_activate: activate,
    on_complete: complete,
    on_terminate: terminate_container,
};

const LOOP_COUNTER: &str = "loopCounter";

fn loop_characteristics(body: &ExecutableElement) -> EngineResult<&LoopCharacteristics> {
    body.multi_instance
        .as_ref()
        .ok_or_else(|| EngineError::NotAContainer(body.id.clone()))
}

fn inner_activity(body: &ExecutableElement) -> EngineResult<&ExecutableElement> {
    body.inner_activity
        .as_deref()
        .ok_or_else(|| EngineError::NotAContainer(body.id.clone()))
}

fn input_collection(b: &BpmnBehaviors<'_>, body: &ExecutableElement, scope_key: Key) -> ProcessingResult<Vec<Value>> {
    let mi = loop_characteristics(body)?;
    match b.evaluate(&mi.input_collection, scope_key)? {
        Value::Array(items) => Ok(items),
        other => Err(Failure::new(
            format!(
                "Expected result of the expression '{}' to be 'ARRAY', but was '{}'",
                mi.input_collection,
                type_name(&other)
            ),
            ErrorType::ExtractValueError,
        )
        .into()),
    }
}

fn loop_counter_of(b: &BpmnBehaviors<'_>, key: Key) -> u32 {
    b.state
        .element_instances
        .get(key)
        .map_or(0, |instance| instance.multi_instance_loop_counter)
}

// ── Body lifecycle ──

fn activate(b: &mut BpmnBehaviors<'_>, body: &ExecutableElement, ctx: &BpmnElementContext) -> ProcessingResult<()> {
    let mi = loop_characteristics(body)?;
    let inner = inner_activity(body)?;
    let items = input_collection(b, body, ctx.key)?;

    b.subscribe_to_events(body, ctx)?;
    b.initialize_output_collection(body, ctx, items.len())?;
    let activated = b.transition_to_activated(ctx)?;

    if items.is_empty() {
        b.complete_element(&activated);
    } else if mi.sequential {
        b.activate_child_instance(&activated, inner);
    } else {
        for _ in &items {
            b.activate_child_instance(&activated, inner);
        }
    }
    tracing::debug!(body_key = activated.key, items = items.len(), sequential = mi.sequential, "multi-instance body activated");
    Ok(())
}

fn complete(
    b: &mut BpmnBehaviors<'_>,
    body: &ExecutableElement,
    ctx: &BpmnElementContext,
    reentrant: bool,
) -> ProcessingResult<()> {
    let mi = loop_characteristics(body)?;
    let completing = b.transition_to_completing(ctx, reentrant)?;
    if let Some(output_collection) = mi.output_collection.as_deref() {
        b.propagate_variable(&completing, output_collection)?;
    }
    b.unsubscribe_from_events(&completing)?;
    let completed = b.transition_to_completed(body, &completing)?;
    b.take_outgoing_sequence_flows(body, &completed)?;
    Ok(())
}

// ── Inner instances ──

/// Gives a new inner instance its input element and loop counter.
pub(super) fn on_child_activating(
    b: &mut BpmnBehaviors<'_>,
    body: &ExecutableElement,
    body_ctx: &BpmnElementContext,
    child: &BpmnElementContext,
) -> ProcessingResult<()> {
    let mi = loop_characteristics(body)?;
    let loop_counter = loop_counter_of(b, child.key);

    if let Some(input_element) = mi.input_element.as_deref() {
        let items = input_collection(b, body, body_ctx.key)?;
        let item = (loop_counter as usize)
            .checked_sub(1)
            .and_then(|index| items.get(index))
            .ok_or_else(|| {
                Failure::new(
                    format!(
                        "Expected the input collection to contain an element at index {loop_counter}, but it has {} elements",
                        items.len()
                    ),
                    ErrorType::ExtractValueError,
                )
            })?;
        b.set_local(child.scope(), input_element, &document::encode(item)?)?;
    }
    b.set_local(child.scope(), LOOP_COUNTER, &document::encode(&Value::from(loop_counter))?)?;
    Ok(())
}

/// Collects the output element of a finished inner instance and evaluates
/// the completion condition in its scope.
pub(super) fn before_child_completed(
    b: &mut BpmnBehaviors<'_>,
    body: &ExecutableElement,
    body_ctx: &BpmnElementContext,
    child: &BpmnElementContext,
) -> ProcessingResult<bool> {
    let mi = loop_characteristics(body)?;
    let loop_counter = loop_counter_of(b, child.key);
    b.update_output_collection(body, body_ctx, child, loop_counter)?;
    match &mi.completion_condition {
        Some(condition) => b.evaluate_bool(condition, child.key),
        None => Ok(false),
    }
}

pub(super) fn after_child_completed(
    b: &mut BpmnBehaviors<'_>,
    body: &ExecutableElement,
    body_ctx: &BpmnElementContext,
    _child: &BpmnElementContext,
    satisfied: bool,
) -> ProcessingResult<()> {
    if body_ctx.intent != ProcessInstanceIntent::ElementActivated {
        return Ok(());
    }
    if satisfied {
        tracing::debug!(body_key = body_ctx.key, "completion condition fulfilled");
        if b.terminate_child_instances(body_ctx) {
            b.complete_element(body_ctx);
        }
        return Ok(());
    }

    continue_loop(b, body, body_ctx)
}

/// Activates the next inner instance of a sequential body, or completes the
/// body once nothing is left to run.
fn continue_loop(b: &mut BpmnBehaviors<'_>, body: &ExecutableElement, body_ctx: &BpmnElementContext) -> ProcessingResult<()> {
    let mi = loop_characteristics(body)?;
    if mi.sequential {
        let activated_so_far = loop_counter_of(b, body_ctx.key) as usize;
        match input_collection(b, body, body_ctx.key) {
            Ok(items) if activated_so_far < items.len() => {
                b.activate_child_instance(body_ctx, inner_activity(body)?);
                return Ok(());
            }
            Ok(_) => {}
            // The child is gone; the body carries the incident.
            Err(ProcessingError::Failure(failure)) => {
                b.create_incident(&failure, body_ctx)?;
                return Ok(());
            }
            Err(defect) => return Err(defect),
        }
    }
    if b.can_be_completed(body_ctx) {
        b.complete_element(body_ctx);
    }
    Ok(())
}

/// Picks a body up again after the incident that stopped it between two
/// inner instances was resolved.
pub(super) fn resume(b: &mut BpmnBehaviors<'_>, body_ctx: &BpmnElementContext) -> EngineResult<()> {
    if !b.can_be_completed(body_ctx) {
        return Ok(());
    }
    let body = b.element(&body_ctx.record)?;
    match continue_loop(b, body, body_ctx) {
        Ok(()) => Ok(()),
        Err(ProcessingError::Failure(failure)) => b.create_incident(&failure, body_ctx),
        Err(ProcessingError::Defect(err)) => Err(err),
    }
}

//! Per element type processors and the steps that drive them.

use super::{call_activity, event, gateway, multi_instance, process, sub_process, task};
use crate::behavior::{BpmnBehaviors, BpmnElementContext};
use crate::error::{EngineError, EngineResult, ProcessingError, ProcessingResult};
use crate::model::ExecutableElement;
use crate::record::ProcessInstanceRecord;
use crate::types::{ElementType, Key};

pub(crate) type ActivateFn =
    fn(&mut BpmnBehaviors<'_>, &ExecutableElement, &BpmnElementContext) -> ProcessingResult<()>;
pub(crate) type CompleteFn =
    fn(&mut BpmnBehaviors<'_>, &ExecutableElement, &BpmnElementContext, bool) -> ProcessingResult<()>;
pub(crate) type TerminateFn =
    fn(&mut BpmnBehaviors<'_>, &ExecutableElement, &BpmnElementContext) -> ProcessingResult<()>;

/// What an element does when it is activated, completed or terminated.
pub(crate) struct ElementProcessor {
    pub on_activate: ActivateFn,
    /// The flag is set when an incident resolution re-runs the completion.
    pub on_complete: CompleteFn,
    pub on_terminate: TerminateFn,
}

/// The processor of an element type. Sequence flows have none.
pub(crate) fn processor_for(element_type: ElementType) -> Option<&'static ElementProcessor> {
    let processor = match element_type {
        ElementType::Process => &process::PROCESS,
        ElementType::SubProcess => &sub_process::SUB_PROCESS,
        ElementType::StartEvent => &event::START_EVENT,
        ElementType::EndEvent => &event::END_EVENT,
        ElementType::IntermediateCatchEvent => &event::INTERMEDIATE_CATCH_EVENT,
        ElementType::IntermediateThrowEvent => &event::INTERMEDIATE_THROW_EVENT,
        ElementType::BoundaryEvent => &event::BOUNDARY_EVENT,
        ElementType::ServiceTask
        | ElementType::UserTask
        | ElementType::ReceiveTask
        | ElementType::BusinessRuleTask => &task::TASK,
        ElementType::ExclusiveGateway => &gateway::EXCLUSIVE_GATEWAY,
        ElementType::ParallelGateway => &gateway::PARALLEL_GATEWAY,
        ElementType::CallActivity => &call_activity::CALL_ACTIVITY,
        ElementType::MultiInstanceBody => &multi_instance::MULTI_INSTANCE_BODY,
        ElementType::SequenceFlow => return None,
    };
    Some(processor)
}

/// The none start event of a process or sub-process.
pub(crate) fn none_start_event<'a>(
    b: &BpmnBehaviors<'a>,
    container: &ExecutableElement,
    ctx: &BpmnElementContext,
) -> EngineResult<&'a ExecutableElement> {
    let start_id = container
        .none_start_event
        .as_deref()
        .ok_or_else(|| EngineError::ElementNotFound {
            definition_key: ctx.record.process_definition_key,
            element_id: format!("{}#start", container.id),
            element_type: ElementType::StartEvent,
        })?;
    b.element_by_id(ctx.record.process_definition_key, start_id)
}

fn require_processor(element: &ExecutableElement) -> EngineResult<&'static ElementProcessor> {
    processor_for(element.element_type).ok_or(EngineError::NoProcessor(element.element_type))
}

/// Turns the failure of a step into an incident on `ctx`. Defects pass.
pub(crate) fn handle_outcome(
    b: &mut BpmnBehaviors<'_>,
    ctx: &BpmnElementContext,
    outcome: ProcessingResult<()>,
) -> EngineResult<()> {
    match outcome {
        Ok(()) => Ok(()),
        Err(ProcessingError::Failure(failure)) => {
            tracing::debug!(element_instance_key = ctx.key, %failure, "element step failed");
            b.create_incident(&failure, ctx)
        }
        Err(ProcessingError::Defect(err)) => Err(err),
    }
}

// ── Steps ──

/// Activates an element instance, or re-runs its activation.
pub(crate) fn activate_element(
    b: &mut BpmnBehaviors<'_>,
    key: Option<Key>,
    record: ProcessInstanceRecord,
    reentrant: bool,
) -> EngineResult<()> {
    let element = b.element(&record)?;
    let processor = require_processor(element)?;
    let ctx = b.transition_to_activating(key, record, reentrant)?;
    let outcome = b
        .on_element_activating(&ctx)
        .and_then(|()| (processor.on_activate)(b, element, &ctx));
    handle_outcome(b, &ctx, outcome)
}

/// Completes an activated element instance, or re-runs its completion.
pub(crate) fn complete_element(b: &mut BpmnBehaviors<'_>, ctx: &BpmnElementContext, reentrant: bool) -> EngineResult<()> {
    let element = b.element(&ctx.record)?;
    let processor = require_processor(element)?;
    let outcome = (processor.on_complete)(b, element, ctx, reentrant);
    handle_outcome(b, ctx, outcome)
}

pub(crate) fn terminate_element(b: &mut BpmnBehaviors<'_>, ctx: &BpmnElementContext) -> EngineResult<()> {
    let element = b.element(&ctx.record)?;
    let processor = require_processor(element)?;
    let outcome = (processor.on_terminate)(b, element, ctx);
    handle_outcome(b, ctx, outcome)
}

// ── Shared lifecycles ──

/// Leaves an element along all of its outgoing flows.
pub(crate) fn complete_and_take_flows(
    b: &mut BpmnBehaviors<'_>,
    element: &ExecutableElement,
    ctx: &BpmnElementContext,
    reentrant: bool,
) -> ProcessingResult<()> {
    let completing = b.transition_to_completing(ctx, reentrant)?;
    b.apply_output_mappings(element, &completing)?;
    b.unsubscribe_from_events(&completing)?;
    let completed = b.transition_to_completed(element, &completing)?;
    b.take_outgoing_sequence_flows(element, &completed)?;
    Ok(())
}

/// Terminates an element that owns no child instances.
pub(crate) fn terminate_leaf(
    b: &mut BpmnBehaviors<'_>,
    _element: &ExecutableElement,
    ctx: &BpmnElementContext,
) -> ProcessingResult<()> {
    let terminating = b.transition_to_terminating(ctx)?;
    b.unsubscribe_from_events(&terminating)?;
    b.resolve_incidents(&terminating)?;
    b.finish_termination(&terminating)?;
    Ok(())
}

/// Terminates a container: its children go first, the container follows
/// once the last of them has terminated.
pub(crate) fn terminate_container(
    b: &mut BpmnBehaviors<'_>,
    _element: &ExecutableElement,
    ctx: &BpmnElementContext,
) -> ProcessingResult<()> {
    let terminating = b.transition_to_terminating(ctx)?;
    b.unsubscribe_from_events(&terminating)?;
    b.resolve_incidents(&terminating)?;
    if b.terminate_child_instances(&terminating) {
        b.finish_termination(&terminating)?;
    }
    Ok(())
}

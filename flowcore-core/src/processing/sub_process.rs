use super::element::{complete_and_take_flows, none_start_event, terminate_container, ElementProcessor};
use crate::behavior::{BpmnBehaviors, BpmnElementContext};
use crate::error::ProcessingResult;
use crate::model::ExecutableElement;

pub(super) static SUB_PROCESS: ElementProcessor = ElementProcessor {
    on_activate: activate,
    on_complete: complete_and_take_flows,
    on_terminate: terminate_container,
};

fn activate(b: &mut BpmnBehaviors<'_>, element: &ExecutableElement, ctx: &BpmnElementContext) -> ProcessingResult<()> {
    b.apply_input_mappings(element, ctx)?;
    b.subscribe_to_events(element, ctx)?;
    let activated = b.transition_to_activated(ctx)?;
    let start = none_start_event(b, element, &activated)?;
    b.activate_child_instance(&activated, start);
    Ok(())
}

//! Service, user, receive and business rule tasks.
//!
//! Everything that can fail is evaluated before the task is activated, so an
//! incident always leaves the instance in ACTIVATING with nothing created.

use super::element::{complete_and_take_flows, ElementProcessor};
use crate::behavior::{BpmnBehaviors, BpmnElementContext};
use crate::document;
use crate::error::ProcessingResult;
use crate::model::ExecutableElement;
use crate::record::UserTaskRecord;
use crate::types::ElementType;
use serde_json::Value;

pub(super) static TASK: ElementProcessor = ElementProcessor {
    on_activate: activate,
    on_complete: complete_and_take_flows,
    on_terminate: terminate,
};

/// What the activated task hands out.
enum Work {
    Job(String),
    UserTask(UserTaskRecord),
    Decision(String, Value),
    /// Waits for a message.
    Wait,
}

fn activate(b: &mut BpmnBehaviors<'_>, element: &ExecutableElement, ctx: &BpmnElementContext) -> ProcessingResult<()> {
    b.apply_input_mappings(element, ctx)?;
    let work = match element.element_type {
        ElementType::ServiceTask => Work::Job(b.evaluate_job_type(element, ctx)?),
        ElementType::UserTask => Work::UserTask(b.prepare_user_task(element, ctx)?),
        ElementType::BusinessRuleTask => {
            let (result_variable, result) = b.evaluate_decision(element, ctx)?;
            Work::Decision(result_variable, result)
        }
        _ => Work::Wait,
    };
    b.subscribe_to_events(element, ctx)?;
    let activated = b.transition_to_activated(ctx)?;

    match work {
        Work::Job(job_type) => b.create_job(element, &activated, job_type)?,
        Work::UserTask(record) => b.create_user_task(record)?,
        Work::Decision(result_variable, result) => {
            let variables = document::write_document(&[(result_variable.as_str(), document::encode(&result)?)])?;
            b.trigger_event(&activated, &activated.record.element_id, variables, false)?;
            b.complete_element(&activated);
        }
        Work::Wait => {}
    }
    Ok(())
}

fn terminate(b: &mut BpmnBehaviors<'_>, element: &ExecutableElement, ctx: &BpmnElementContext) -> ProcessingResult<()> {
    let terminating = b.transition_to_terminating(ctx)?;
    match element.element_type {
        ElementType::ServiceTask => b.cancel_job(&terminating)?,
        ElementType::UserTask => b.cancel_user_task(&terminating)?,
        _ => {}
    }
    b.unsubscribe_from_events(&terminating)?;
    b.resolve_incidents(&terminating)?;
    b.finish_termination(&terminating)?;
    Ok(())
}

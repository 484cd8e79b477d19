//! Resolving incidents.
//!
//! Resolving an element incident re-runs the lifecycle step that failed:
//! the element re-enters its current state and its processor runs again.
//! A job incident only makes the job activatable again.

use super::{element, multi_instance};
use crate::behavior::BpmnBehaviors;
use crate::error::EngineResult;
use crate::intent::{IncidentIntent, ProcessInstanceIntent};
use crate::record::{Record, RejectionType};
use crate::types::ElementType;

pub(super) fn resolve(b: &mut BpmnBehaviors<'_>, command: &Record) -> EngineResult<()> {
    let Some((key, incident)) = command
        .key
        .and_then(|key| b.state.incidents.get(key).map(|incident| (key, incident.clone())))
    else {
        b.reject(
            command,
            RejectionType::NotFound,
            format!(
                "Expected to resolve incident with key '{}', but no such incident was found",
                command.key.unwrap_or_default()
            ),
        );
        return Ok(());
    };

    if let Some(job_key) = incident.job_key {
        let job_type = match b.state.jobs.get(job_key) {
            Some(job) if job.retries == 0 => {
                b.reject(
                    command,
                    RejectionType::InvalidState,
                    format!(
                        "Expected incident to refer to a job with retries, but job '{job_key}' has no retries left. Update the job retries first"
                    ),
                );
                return Ok(());
            }
            Some(job) => Some(job.job_type.clone()),
            None => None,
        };
        b.emit(key, IncidentIntent::Resolved, incident)?;
        if let Some(job_type) = job_type {
            b.notify_job_available(&job_type);
        }
        tracing::info!(incident_key = key, job_key, "job incident resolved");
        return Ok(());
    }

    b.emit(key, IncidentIntent::Resolved, incident.clone())?;
    tracing::info!(
        incident_key = key,
        element_instance_key = incident.element_instance_key,
        "incident resolved"
    );

    let Ok(ctx) = b.context_of(incident.element_instance_key) else {
        return Ok(());
    };
    match ctx.intent {
        ProcessInstanceIntent::ElementActivating => {
            element::activate_element(b, Some(ctx.key), ctx.record, true)
        }
        ProcessInstanceIntent::ElementCompleting => element::complete_element(b, &ctx, true),
        ProcessInstanceIntent::ElementActivated if ctx.element_type() == ElementType::MultiInstanceBody => {
            multi_instance::resume(b, &ctx)
        }
        _ => Ok(()),
    }
}

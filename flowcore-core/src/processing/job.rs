//! Commands of job workers.
//!
//! Completing a job hands its variables to the service task as a trigger
//! and completes the task. Failing the last retry raises an incident that
//! stays open until the retries are raised and the incident is resolved.

use crate::behavior::BpmnBehaviors;
use crate::document;
use crate::error::{EngineResult, ErrorType, Failure};
use crate::intent::{JobIntent, ProcessInstanceIntent};
use crate::record::{JobRecord, Record, RejectionType};
use crate::types::Key;

pub(super) fn process(b: &mut BpmnBehaviors<'_>, command: &Record, intent: JobIntent, record: &JobRecord) -> EngineResult<()> {
    if !matches!(intent, JobIntent::Complete | JobIntent::Fail | JobIntent::UpdateRetries) {
        b.reject(
            command,
            RejectionType::InvalidArgument,
            format!("Expected a job command, but got {intent:?}"),
        );
        return Ok(());
    }
    let Some((key, job)) = command
        .key
        .and_then(|key| b.state.jobs.get(key).map(|job| (key, job.clone())))
    else {
        b.reject(
            command,
            RejectionType::NotFound,
            format!(
                "Expected to {} job with key '{}', but no such job was found",
                action(intent),
                command.key.unwrap_or_default()
            ),
        );
        return Ok(());
    };

    match intent {
        JobIntent::Complete => complete(b, command, key, job, record),
        JobIntent::Fail => fail(b, key, job, record),
        _ => update_retries(b, command, key, job, record),
    }
}

fn action(intent: JobIntent) -> &'static str {
    match intent {
        JobIntent::Complete => "complete",
        JobIntent::Fail => "fail",
        _ => "update retries of",
    }
}

fn complete(b: &mut BpmnBehaviors<'_>, command: &Record, key: Key, job: JobRecord, record: &JobRecord) -> EngineResult<()> {
    if let Err(err) = document::entries(&record.variables) {
        b.reject(
            command,
            RejectionType::InvalidArgument,
            format!("Expected job variables to be a valid document, but {err}"),
        );
        return Ok(());
    }
    b.resolve_job_incident(key)?;
    b.emit(
        key,
        JobIntent::Completed,
        JobRecord {
            variables: record.variables.clone(),
            ..job.clone()
        },
    )?;
    tracing::debug!(job_key = key, job_type = %job.job_type, "job completed");

    let task = b.context_of(job.element_instance_key).ok();
    if let Some(task) = task.filter(|t| t.intent == ProcessInstanceIntent::ElementActivated) {
        b.trigger_event(&task, &job.element_id, record.variables.clone(), false)?;
        b.complete_element(&task);
    }
    Ok(())
}

fn fail(b: &mut BpmnBehaviors<'_>, key: Key, job: JobRecord, record: &JobRecord) -> EngineResult<()> {
    let failed = JobRecord {
        retries: record.retries,
        error_message: record.error_message.clone(),
        ..job
    };
    b.emit(key, JobIntent::Failed, failed.clone())?;
    tracing::info!(job_key = key, retries = failed.retries, "job failed");

    if failed.retries == 0 {
        let message = failed
            .error_message
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "No more retries left.".to_string());
        b.create_job_incident(&Failure::new(message, ErrorType::JobNoRetries), key, &failed)?;
    } else {
        b.notify_job_available(&failed.job_type);
    }
    Ok(())
}

fn update_retries(b: &mut BpmnBehaviors<'_>, command: &Record, key: Key, job: JobRecord, record: &JobRecord) -> EngineResult<()> {
    if record.retries == 0 {
        b.reject(
            command,
            RejectionType::InvalidArgument,
            format!("Expected retries of job '{key}' to be greater than zero, but it was 0"),
        );
        return Ok(());
    }
    b.emit(
        key,
        JobIntent::RetriesUpdated,
        JobRecord {
            retries: record.retries,
            ..job
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::testing::Harness;
    use crate::intent::Intent;
    use crate::record::RecordType;

    fn job_command(key: Key, intent: JobIntent, record: JobRecord) -> Record {
        Record {
            position: 0,
            key: Some(key),
            record_type: RecordType::Command,
            intent: intent.into(),
            value: record.into(),
            rejection: None,
        }
    }

    fn with_job(harness: &mut Harness) -> Key {
        harness.run(|b| {
            let key = b.next_key();
            b.emit(
                key,
                JobIntent::Created,
                JobRecord {
                    job_type: "charge".to_string(),
                    retries: 1,
                    element_id: "charge".to_string(),
                    element_instance_key: 77,
                    process_instance_key: 70,
                    ..Default::default()
                },
            )
            .unwrap();
            key
        })
    }

    #[test]
    fn failing_the_last_retry_raises_an_incident() {
        let mut harness = Harness::new(&[]);
        let job_key = with_job(&mut harness);
        let failure = JobRecord {
            retries: 0,
            error_message: Some("card declined".to_string()),
            ..Default::default()
        };
        harness.run(|b| process(b, &job_command(job_key, JobIntent::Fail, failure.clone()), JobIntent::Fail, &failure).unwrap());

        let incident_key = harness.state.incidents.for_job(job_key).unwrap();
        let incident = harness.state.incidents.get(incident_key).unwrap();
        assert_eq!(incident.error_type, ErrorType::JobNoRetries);
        assert_eq!(incident.error_message, "card declined");
        assert_eq!(harness.state.jobs.get(job_key).unwrap().retries, 0);
    }

    #[test]
    fn failing_with_retries_left_notifies_workers() {
        let mut harness = Harness::new(&[]);
        let job_key = with_job(&mut harness);
        harness.effects.jobs_available.clear();
        let failure = JobRecord {
            retries: 2,
            ..Default::default()
        };
        harness.run(|b| process(b, &job_command(job_key, JobIntent::Fail, failure.clone()), JobIntent::Fail, &failure).unwrap());

        assert!(harness.state.incidents.is_empty());
        assert_eq!(harness.effects.jobs_available, vec!["charge".to_string()]);
    }

    #[test]
    fn zero_retries_update_is_rejected() {
        let mut harness = Harness::new(&[]);
        let job_key = with_job(&mut harness);
        let update = JobRecord::default();
        harness.run(|b| {
            process(b, &job_command(job_key, JobIntent::UpdateRetries, update.clone()), JobIntent::UpdateRetries, &update).unwrap()
        });

        let rejection = harness.records.last().unwrap();
        assert_eq!(rejection.record_type, RecordType::Rejection);
        assert_eq!(rejection.intent, Intent::Job(JobIntent::UpdateRetries));
    }

    #[test]
    fn unknown_job_is_not_found() {
        let mut harness = Harness::new(&[]);
        let complete = JobRecord::default();
        harness.run(|b| process(b, &job_command(999, JobIntent::Complete, complete.clone()), JobIntent::Complete, &complete).unwrap());

        let rejection = harness.records.last().unwrap();
        assert_eq!(rejection.rejection.as_ref().unwrap().rejection_type, RejectionType::NotFound);
    }
}

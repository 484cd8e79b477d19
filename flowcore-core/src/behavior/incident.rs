use super::{BpmnBehaviors, BpmnElementContext};
use crate::error::{EngineResult, Failure};
use crate::intent::IncidentIntent;
use crate::record::{IncidentRecord, JobRecord};
use crate::types::Key;

impl BpmnBehaviors<'_> {
    /// Raises an incident for a failed element instance. At most one open
    /// incident exists per element instance.
    pub fn create_incident(&mut self, failure: &Failure, ctx: &BpmnElementContext) -> EngineResult<()> {
        if let Some(existing) = self.state.incidents.for_element(ctx.key) {
            tracing::warn!(
                element_instance_key = ctx.key,
                incident_key = existing,
                "incident already open, not raising another"
            );
            return Ok(());
        }
        let key = self.next_key();
        let record = IncidentRecord {
            error_type: failure.error_type,
            error_message: failure.message.clone(),
            bpmn_process_id: ctx.record.bpmn_process_id.clone(),
            process_definition_key: ctx.record.process_definition_key,
            process_instance_key: ctx.record.process_instance_key,
            element_id: ctx.record.element_id.clone(),
            element_instance_key: ctx.key,
            variable_scope_key: failure.variable_scope_key.unwrap_or(ctx.key),
            job_key: None,
        };
        tracing::info!(
            incident_key = key,
            element_instance_key = ctx.key,
            element_id = %ctx.record.element_id,
            error_type = %failure.error_type,
            "incident created"
        );
        self.emit(key, IncidentIntent::Created, record)
    }

    /// Raises an incident for a job that ran out of retries.
    pub fn create_job_incident(&mut self, failure: &Failure, job_key: Key, job: &JobRecord) -> EngineResult<()> {
        if self.state.incidents.for_job(job_key).is_some() {
            return Ok(());
        }
        let key = self.next_key();
        let record = IncidentRecord {
            error_type: failure.error_type,
            error_message: failure.message.clone(),
            bpmn_process_id: job.bpmn_process_id.clone(),
            process_definition_key: job.process_definition_key,
            process_instance_key: job.process_instance_key,
            element_id: job.element_id.clone(),
            element_instance_key: job.element_instance_key,
            variable_scope_key: job.element_instance_key,
            job_key: Some(job_key),
        };
        tracing::info!(incident_key = key, job_key, "job incident created");
        self.emit(key, IncidentIntent::Created, record)
    }

    /// Resolves the open incident of an element instance that is going away.
    pub fn resolve_incidents(&mut self, ctx: &BpmnElementContext) -> EngineResult<()> {
        let Some(key) = self.state.incidents.for_element(ctx.key) else {
            return Ok(());
        };
        self.resolve_incident_by_key(key)
    }

    pub fn resolve_job_incident(&mut self, job_key: Key) -> EngineResult<()> {
        let Some(key) = self.state.incidents.for_job(job_key) else {
            return Ok(());
        };
        self.resolve_incident_by_key(key)
    }

    fn resolve_incident_by_key(&mut self, key: Key) -> EngineResult<()> {
        let Some(record) = self.state.incidents.get(key).cloned() else {
            return Ok(());
        };
        self.emit(key, IncidentIntent::Resolved, record)
    }
}

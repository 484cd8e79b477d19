use super::{BpmnBehaviors, BpmnElementContext};
use crate::error::{EngineResult, ErrorType, Failure, ProcessingResult};
use crate::intent::JobIntent;
use crate::model::ExecutableElement;
use crate::record::JobRecord;
use serde_json::Value;
use tokio::sync::mpsc;

/// Told when jobs of a type can be activated. Called only after the command
/// that created or released the job is committed.
pub trait JobNotifier: Send + Sync {
    fn notify_work_available(&self, job_type: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopJobNotifier;

impl JobNotifier for NoopJobNotifier {
    fn notify_work_available(&self, _job_type: &str) {}
}

/// Forwards job types to a channel, e.g. to wake up a worker loop.
#[derive(Debug, Clone)]
pub struct ChannelJobNotifier {
    sender: mpsc::UnboundedSender<String>,
}

impl ChannelJobNotifier {
    pub fn new(sender: mpsc::UnboundedSender<String>) -> Self {
        Self { sender }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl JobNotifier for ChannelJobNotifier {
    fn notify_work_available(&self, job_type: &str) {
        if self.sender.send(job_type.to_string()).is_err() {
            tracing::debug!(job_type, "no listener for job notifications");
        }
    }
}

impl BpmnBehaviors<'_> {
    pub fn evaluate_job_type(
        &self,
        element: &ExecutableElement,
        ctx: &BpmnElementContext,
    ) -> ProcessingResult<String> {
        let Some(expression) = element.job_type.as_ref() else {
            return Err(Failure::new(
                format!("Expected service task '{}' to define a job type", element.id),
                ErrorType::ExtractValueError,
            )
            .into());
        };
        match self.evaluate(expression, ctx.key)? {
            Value::String(job_type) if !job_type.is_empty() => Ok(job_type),
            other => Err(Failure::new(
                format!(
                    "Expected result of the expression '{expression}' to be a non-empty 'STRING', but was '{other}'"
                ),
                ErrorType::ExtractValueError,
            )
            .into()),
        }
    }

    pub fn create_job(
        &mut self,
        element: &ExecutableElement,
        ctx: &BpmnElementContext,
        job_type: String,
    ) -> EngineResult<()> {
        let key = self.next_key();
        let record = JobRecord {
            job_type: job_type.clone(),
            retries: element.job_retries,
            error_message: None,
            variables: Vec::new(),
            element_id: ctx.element_id().to_string(),
            element_instance_key: ctx.key,
            process_instance_key: ctx.process_instance_key(),
            process_definition_key: ctx.record.process_definition_key,
            bpmn_process_id: ctx.record.bpmn_process_id.clone(),
        };
        self.emit(key, JobIntent::Created, record)?;
        tracing::debug!(job_key = key, %job_type, element_instance_key = ctx.key, "job created");
        self.effects.jobs_available.push(job_type);
        Ok(())
    }

    /// Cancels the job of the element instance, if any, and resolves its incident.
    pub fn cancel_job(&mut self, ctx: &BpmnElementContext) -> EngineResult<()> {
        let Some(job_key) = self.state.jobs.for_element(ctx.key) else {
            return Ok(());
        };
        if let Some(job) = self.state.jobs.get(job_key).cloned() {
            self.emit(job_key, JobIntent::Canceled, job)?;
        }
        self.resolve_job_incident(job_key)
    }

    pub(crate) fn notify_job_available(&mut self, job_type: &str) {
        self.effects.jobs_available.push(job_type.to_string());
    }
}

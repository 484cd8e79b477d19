use super::variable::type_name;
use super::{BpmnBehaviors, BpmnElementContext};
use crate::error::{EngineResult, ErrorType, Failure, ProcessingResult};
use crate::intent::UserTaskIntent;
use crate::model::ExecutableElement;
use crate::record::UserTaskRecord;
use serde_json::Value;

impl BpmnBehaviors<'_> {
    /// Builds the user task of the element instance, without writing anything.
    pub fn prepare_user_task(&self, element: &ExecutableElement, ctx: &BpmnElementContext) -> ProcessingResult<UserTaskRecord> {
        let properties = element.user_task.clone().unwrap_or_default();

        if let Some(form_key) = properties.form_key.as_deref() {
            if !self.graph.form_exists(form_key) {
                return Err(Failure::new(
                    format!("Expected to find a form with key '{form_key}', but no form with this key exists"),
                    ErrorType::FormNotFound,
                )
                .into());
            }
        }

        let assignee = match &properties.assignee {
            None => None,
            Some(expression) => match self.evaluate(expression, ctx.key)? {
                Value::String(assignee) => Some(assignee),
                Value::Null => None,
                other => {
                    return Err(Failure::new(
                        format!(
                            "Expected result of the expression '{expression}' to be 'STRING', but was '{}'",
                            type_name(&other)
                        ),
                        ErrorType::ExtractValueError,
                    )
                    .into())
                }
            },
        };

        Ok(UserTaskRecord {
            element_id: ctx.element_id().to_string(),
            element_instance_key: ctx.key,
            process_instance_key: ctx.process_instance_key(),
            process_definition_key: ctx.record.process_definition_key,
            bpmn_process_id: ctx.record.bpmn_process_id.clone(),
            assignee,
            candidate_groups: properties.candidate_groups,
            form_key: properties.form_key,
            variables: Vec::new(),
        })
    }

    pub fn create_user_task(&mut self, record: UserTaskRecord) -> EngineResult<()> {
        let key = self.next_key();
        tracing::debug!(user_task_key = key, element_instance_key = record.element_instance_key, "user task created");
        self.emit(key, UserTaskIntent::Created, record)
    }

    pub fn cancel_user_task(&mut self, ctx: &BpmnElementContext) -> EngineResult<()> {
        let Some(key) = self.state.user_tasks.for_element(ctx.key) else {
            return Ok(());
        };
        if let Some(record) = self.state.user_tasks.get(key).cloned() {
            self.emit(key, UserTaskIntent::Canceled, record)?;
        }
        Ok(())
    }
}

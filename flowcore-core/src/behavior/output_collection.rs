use super::{BpmnBehaviors, BpmnElementContext};
use crate::document::{self, editor};
use crate::error::{ErrorType, Failure, ProcessingError, ProcessingResult};
use crate::model::ExecutableElement;
use serde_json::Value;

impl BpmnBehaviors<'_> {
    /// Seeds the output collection of a multi-instance body with one nil per
    /// input element.
    pub fn initialize_output_collection(
        &mut self,
        body: &ExecutableElement,
        body_ctx: &BpmnElementContext,
        size: usize,
    ) -> ProcessingResult<()> {
        let Some(name) = body
            .multi_instance
            .as_ref()
            .and_then(|mi| mi.output_collection.as_deref())
        else {
            return Ok(());
        };
        let collection = editor::nil_array(size)?;
        self.set_local(body_ctx.scope(), name, &collection)?;
        Ok(())
    }

    /// Writes the output element of the iteration `child` into slot
    /// `loop_counter` of the body's output collection. The edit reuses the
    /// scratch buffer of the facade.
    pub fn update_output_collection(
        &mut self,
        body: &ExecutableElement,
        body_ctx: &BpmnElementContext,
        child: &BpmnElementContext,
        loop_counter: u32,
    ) -> ProcessingResult<()> {
        let Some(mi) = body.multi_instance.as_ref() else {
            return Ok(());
        };
        let Some(name) = mi.output_collection.as_deref() else {
            return Ok(());
        };
        let element = match &mi.output_element {
            Some(expression) => self.evaluate(expression, child.key)?,
            None => Value::Null,
        };
        let element = document::encode(&element)?;
        let Some(current) = self
            .state
            .variables
            .get_local(body_ctx.key, name)
            .map(|v| v.value.clone())
        else {
            return Err(Failure::with_scope(
                format!("Expected the output collection variable '{name}' to exist, but it was not found"),
                ErrorType::ExtractValueError,
                body_ctx.key,
            )
            .into());
        };

        let mut buffer = std::mem::take(self.scratch);
        let outcome = match editor::replace_array_element(&current, loop_counter as usize, &element, &mut buffer) {
            Ok(()) => self
                .set_local(body_ctx.scope(), name, &buffer)
                .map_err(ProcessingError::from),
            Err(err) => Err(Failure::with_scope(
                format!("Unable to update an item in output collection '{name}' because {err}"),
                ErrorType::ExtractValueError,
                body_ctx.key,
            )
            .into()),
        };
        buffer.clear();
        *self.scratch = buffer;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::testing::Harness;
    use crate::document::{decode, encode};
    use crate::intent::ProcessInstanceIntent;
    use crate::model::ElementGraph;
    use crate::record::ProcessInstanceRecord;
    use crate::types::ElementType;
    use serde_json::json;

    const COLLECT: &str = r#"
id: collect
nodes:
  - kind: StartEvent
    id: start
  - kind: ServiceTask
    id: check
    job_type: check
    multi_instance:
      input_collection: "=items"
      input_element: item
      output_collection: results
      output_element: "=result"
edges:
  - from: start
    to: check
"#;

    fn context(key: u64, element_type: ElementType, flow_scope_key: Option<u64>) -> BpmnElementContext {
        BpmnElementContext::new(
            key,
            ProcessInstanceIntent::ElementActivated,
            ProcessInstanceRecord {
                process_instance_key: 1,
                process_definition_key: 1,
                element_id: "check".to_string(),
                element_type,
                flow_scope_key,
                ..Default::default()
            },
        )
    }

    #[test]
    fn fills_slots_and_reuses_the_scratch_buffer() {
        let mut harness = Harness::new(&[COLLECT]);
        let body = harness
            .graph
            .element(1, "check", ElementType::MultiInstanceBody)
            .unwrap()
            .clone();
        harness.state.variables.create_scope(10, None);
        harness.state.variables.create_scope(11, Some(10));
        let body_ctx = context(10, ElementType::MultiInstanceBody, None);
        let child = context(11, ElementType::ServiceTask, Some(10));

        harness.run(|b| {
            b.initialize_output_collection(&body, &body_ctx, 3).unwrap();
            b.set_local(child.scope(), "result", &encode(&json!("ok")).unwrap())
                .unwrap();
            b.update_output_collection(&body, &body_ctx, &child, 2).unwrap();
        });

        let results = harness.state.variables.get_local(10, "results").unwrap();
        assert_eq!(decode(&results.value).unwrap(), json!([null, "ok", null]));
        assert!(harness.scratch.is_empty());
        assert!(harness.scratch.capacity() > 0);
    }

    #[test]
    fn out_of_range_slot_fails_on_the_body() {
        let mut harness = Harness::new(&[COLLECT]);
        let body = harness
            .graph
            .element(1, "check", ElementType::MultiInstanceBody)
            .unwrap()
            .clone();
        harness.state.variables.create_scope(10, None);
        harness.state.variables.create_scope(11, Some(10));
        let body_ctx = context(10, ElementType::MultiInstanceBody, None);
        let child = context(11, ElementType::ServiceTask, Some(10));

        let result = harness.run(|b| {
            b.initialize_output_collection(&body, &body_ctx, 1).unwrap();
            b.set_local(child.scope(), "result", &encode(&json!(1)).unwrap())
                .unwrap();
            b.update_output_collection(&body, &body_ctx, &child, 2)
        });
        match result {
            Err(ProcessingError::Failure(failure)) => {
                assert_eq!(failure.variable_scope_key, Some(10));
                assert!(failure.message.contains("results"));
            }
            other => panic!("expected a failure, got {other:?}"),
        }
    }
}

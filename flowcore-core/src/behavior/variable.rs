use super::{BpmnBehaviors, BpmnElementContext, VariableScope};
use crate::document::{self, EMPTY_DOCUMENT};
use crate::error::{EngineResult, ErrorType, Failure, ProcessingError, ProcessingResult};
use crate::expression::Expression;
use crate::intent::VariableIntent;
use crate::model::{ExecutableElement, VariableMapping};
use crate::record::VariableRecord;
use crate::types::{ElementType, Key};
use serde_json::{Map, Value};

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NULL",
        Value::Bool(_) => "BOOLEAN",
        Value::Number(_) => "NUMBER",
        Value::String(_) => "STRING",
        Value::Array(_) => "ARRAY",
        Value::Object(_) => "OBJECT",
    }
}

fn is_empty_document(bytes: &[u8]) -> bool {
    bytes.is_empty() || bytes == EMPTY_DOCUMENT || bytes == [document::NIL]
}

impl BpmnBehaviors<'_> {
    // ── Expressions ──

    /// Evaluates `expression` against the variables visible from `scope_key`.
    pub fn evaluate(&self, expression: &Expression, scope_key: Key) -> ProcessingResult<Value> {
        if let Expression::Static(value) = expression {
            return Ok(value.clone());
        }
        let variables = self.state.variables.visible_json(scope_key)?;
        self.evaluate_with(expression, &variables, ErrorType::ExtractValueError)
    }

    fn evaluate_with(
        &self,
        expression: &Expression,
        variables: &Map<String, Value>,
        error_type: ErrorType,
    ) -> ProcessingResult<Value> {
        self.services
            .expressions
            .evaluate(expression, variables)
            .map_err(|message| {
                ProcessingError::from(Failure::new(
                    format!("Expected to evaluate expression '{expression}', but {message}"),
                    error_type,
                ))
            })
    }

    pub fn evaluate_bool(&self, expression: &Expression, scope_key: Key) -> ProcessingResult<bool> {
        let condition_error =
            |message: String| ProcessingError::from(Failure::new(message, ErrorType::ConditionError));
        match self.evaluate(expression, scope_key) {
            Ok(Value::Bool(result)) => Ok(result),
            Ok(other) => Err(condition_error(format!(
                "Expected result of the expression '{expression}' to be 'BOOLEAN', but was '{}'",
                type_name(&other)
            ))),
            Err(ProcessingError::Failure(failure)) => Err(condition_error(failure.message)),
            Err(defect) => Err(defect),
        }
    }

    /// Correlation keys may be strings or numbers.
    pub fn evaluate_correlation_key(&self, expression: &Expression, scope_key: Key) -> ProcessingResult<String> {
        match self.evaluate(expression, scope_key)? {
            Value::String(key) => Ok(key),
            Value::Number(number) => Ok(number.to_string()),
            other => Err(Failure::new(
                format!(
                    "Failed to extract the correlation key for '{expression}': The value must be either a string or a number, but was '{}'",
                    type_name(&other)
                ),
                ErrorType::ExtractValueError,
            )
            .into()),
        }
    }

    // ── Writes ──

    /// Writes one variable into exactly `scope`. Unchanged values write nothing.
    pub fn set_local(&mut self, scope: VariableScope, name: &str, value: &[u8]) -> EngineResult<()> {
        let existing = self
            .state
            .variables
            .get_local(scope.scope_key, name)
            .map(|v| (v.key, v.value.as_slice() == value));
        let (key, intent) = match existing {
            Some((_, true)) => return Ok(()),
            Some((key, false)) => (key, VariableIntent::Updated),
            None => (self.next_key(), VariableIntent::Created),
        };
        let record = VariableRecord {
            name: name.to_string(),
            value: value.to_vec(),
            scope_key: scope.scope_key,
            process_instance_key: scope.process_instance_key,
            process_definition_key: scope.process_definition_key,
        };
        self.emit(key, intent, record)
    }

    /// Writes each field of `document` into the nearest scope of the chain
    /// starting at `scope` that already defines it, otherwise into the
    /// top-most scope of the chain.
    pub fn merge_document(&mut self, scope: VariableScope, document: &[u8]) -> EngineResult<()> {
        let entries = document::entries(document)?;
        if entries.is_empty() {
            return Ok(());
        }
        let chain = self.state.variables.scope_chain(scope.scope_key);
        let top = chain.last().copied().unwrap_or(scope.scope_key);
        for entry in entries {
            let target = chain
                .iter()
                .copied()
                .find(|s| self.state.variables.get_local(*s, entry.name).is_some())
                .unwrap_or(top);
            self.set_local(scope.at(target), entry.name, entry.value)?;
        }
        Ok(())
    }

    /// Writes every field of `document` into exactly `scope`.
    pub fn merge_local_document(&mut self, scope: VariableScope, document: &[u8]) -> EngineResult<()> {
        for entry in document::entries(document)? {
            self.set_local(scope, entry.name, entry.value)?;
        }
        Ok(())
    }

    /// Merges the local variable `name` of the instance into its flow scope.
    pub fn propagate_variable(&mut self, ctx: &BpmnElementContext, name: &str) -> EngineResult<()> {
        let Some(value) = self
            .state
            .variables
            .get_local(ctx.key, name)
            .map(|v| v.value.clone())
        else {
            return Ok(());
        };
        let document = document::write_document(&[(name, value)])?;
        self.merge_document(ctx.flow_scope(), &document)
    }

    // ── Mappings ──

    fn evaluate_mappings(&self, mappings: &[VariableMapping], scope_key: Key) -> ProcessingResult<Vec<u8>> {
        let variables = self.state.variables.visible_json(scope_key)?;
        let mut fields = Vec::with_capacity(mappings.len());
        for mapping in mappings {
            let value = self.evaluate_with(&mapping.source, &variables, ErrorType::IoMappingError)?;
            fields.push((mapping.target.as_str(), document::encode(&value)?));
        }
        Ok(document::write_document(&fields)?)
    }

    /// Evaluates the input mappings in the element's own scope and writes
    /// the results as its local variables.
    pub fn apply_input_mappings(&mut self, element: &ExecutableElement, ctx: &BpmnElementContext) -> ProcessingResult<()> {
        if element.input_mappings.is_empty() {
            return Ok(());
        }
        let document = self.evaluate_mappings(&element.input_mappings, ctx.key)?;
        self.merge_local_document(ctx.scope(), &document)?;
        Ok(())
    }

    /// Moves the result of the element into its flow scope and consumes the
    /// pending event trigger of the instance.
    ///
    /// With output mappings, the trigger variables become local first and
    /// the mappings are merged into the flow scope (into the instance itself
    /// for an inner multi-instance iteration). Without, the trigger variables
    /// are merged from the instance upwards; start and boundary events merge
    /// their local variables into the flow scope.
    pub fn apply_output_mappings(&mut self, element: &ExecutableElement, ctx: &BpmnElementContext) -> ProcessingResult<()> {
        let trigger = self
            .state
            .element_instances
            .peek_trigger(ctx.key)
            .filter(|t| !t.interrupting)
            .cloned();
        let trigger_variables = trigger
            .as_ref()
            .map(|t| t.variables.as_slice())
            .filter(|v| !is_empty_document(v));
        let loop_counter = self
            .state
            .element_instances
            .get(ctx.key)
            .map_or(0, |i| i.multi_instance_loop_counter);

        if !element.output_mappings.is_empty() {
            if let Some(variables) = trigger_variables {
                self.merge_local_document(ctx.scope(), variables)?;
            }
            let document = self.evaluate_mappings(&element.output_mappings, ctx.key)?;
            if loop_counter > 0 {
                self.merge_local_document(ctx.scope(), &document)?;
            } else {
                self.merge_document(ctx.flow_scope(), &document)?;
            }
        } else if let Some(variables) = trigger_variables {
            self.merge_document(ctx.scope(), variables)?;
        } else if matches!(element.element_type, ElementType::StartEvent | ElementType::BoundaryEvent) {
            let local = self.state.variables.local_document(ctx.key)?;
            self.merge_document(ctx.flow_scope(), &local)?;
        }

        if let Some(trigger) = trigger {
            self.consume_trigger(ctx, &trigger)?;
        }
        Ok(())
    }
}

use super::{BpmnBehaviors, BpmnElementContext};
use crate::error::{ErrorType, Failure, ProcessingResult};
use crate::model::ExecutableElement;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Evaluates the decision referenced by a business rule task.
pub trait DecisionEvaluator: Send + Sync {
    fn evaluate(&self, decision_id: &str, variables: &Map<String, Value>) -> Result<Value, String>;
}

/// Returns a fixed result per decision id.
#[derive(Debug, Default, Clone)]
pub struct StaticDecisionEvaluator {
    results: BTreeMap<String, Value>,
}

impl StaticDecisionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decision(mut self, decision_id: impl Into<String>, result: Value) -> Self {
        self.results.insert(decision_id.into(), result);
        self
    }
}

impl DecisionEvaluator for StaticDecisionEvaluator {
    fn evaluate(&self, decision_id: &str, _variables: &Map<String, Value>) -> Result<Value, String> {
        self.results
            .get(decision_id)
            .cloned()
            .ok_or_else(|| format!("no decision found for id '{decision_id}'"))
    }
}

impl BpmnBehaviors<'_> {
    /// Evaluates the element's decision against the variables visible from
    /// the element instance. Returns the result variable name and value.
    pub fn evaluate_decision(
        &mut self,
        element: &ExecutableElement,
        ctx: &BpmnElementContext,
    ) -> ProcessingResult<(String, Value)> {
        let Some(decision) = element.decision.as_ref() else {
            return Err(Failure::new(
                format!("Expected element '{}' to reference a decision", element.id),
                ErrorType::DecisionEvaluationError,
            )
            .into());
        };
        let variables = self.state.variables.visible_json(ctx.key)?;
        let result = self
            .services
            .decisions
            .evaluate(&decision.decision_id, &variables)
            .map_err(|message| {
                Failure::new(
                    format!(
                        "Expected to evaluate decision '{}', but {message}",
                        decision.decision_id
                    ),
                    ErrorType::DecisionEvaluationError,
                )
            })?;
        tracing::debug!(decision_id = %decision.decision_id, element_instance_key = ctx.key, "decision evaluated");
        Ok((decision.result_variable.clone(), result))
    }
}

//! The executable element graph.
//!
//! Processes are authored as YAML ([`dto`]), checked by [`validate`] and
//! compiled by [`build`] into [`ExecutableProcess`]es. The engine only sees
//! them through the [`ElementGraph`] trait.

pub mod build;
pub mod dto;
pub mod validate;
pub mod yaml;

use crate::expression::Expression;
use crate::types::{BpmnEventType, ElementType, Key};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

pub use validate::ValidationError;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("process validation failed:\n{}", format_errors(.0))]
    Invalid(Vec<ValidationError>),

    #[error("invalid expression on element '{element_id}': {message}")]
    Expression { element_id: String, message: String },
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ValidationError::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Executable elements ──

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceFlow {
    pub id: String,
    pub source: String,
    pub target: String,
    pub condition: Option<Expression>,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableMapping {
    pub source: Expression,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageDefinition {
    pub name: String,
    /// Absent on message start events.
    pub correlation_key: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopCharacteristics {
    pub input_collection: Expression,
    pub input_element: Option<String>,
    pub output_collection: Option<String>,
    pub output_element: Option<Expression>,
    pub completion_condition: Option<Expression>,
    pub sequential: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserTaskProperties {
    pub assignee: Option<Expression>,
    pub candidate_groups: Vec<String>,
    pub form_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecisionProperties {
    pub decision_id: String,
    pub result_variable: String,
}

/// One element of a compiled process. Fields not relevant to the element's
/// type stay empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutableElement {
    pub id: String,
    pub element_type: ElementType,
    pub event_type: BpmnEventType,
    /// Id of the enclosing container; `None` only for the process itself.
    pub flow_scope: Option<String>,
    pub incoming: Vec<String>,
    pub outgoing: Vec<SequenceFlow>,

    pub boundary_events: Vec<String>,
    pub attached_to: Option<String>,
    pub interrupting: bool,

    pub input_mappings: Vec<VariableMapping>,
    pub output_mappings: Vec<VariableMapping>,

    pub message: Option<MessageDefinition>,
    pub signal_name: Option<String>,
    pub link_name: Option<String>,

    pub job_type: Option<Expression>,
    pub job_retries: u32,
    pub user_task: Option<UserTaskProperties>,
    pub decision: Option<DecisionProperties>,
    pub called_process_id: Option<String>,

    pub multi_instance: Option<LoopCharacteristics>,
    /// The wrapped activity of a multi-instance body.
    pub inner_activity: Option<Box<ExecutableElement>>,

    pub compensation_handler: Option<String>,
    /// Compensation throw target; all activities of the scope when `None`.
    pub activity_ref: Option<String>,
    /// The none start event of a container.
    pub none_start_event: Option<String>,
}

impl ExecutableElement {
    pub fn is_link_throw(&self) -> bool {
        self.element_type == ElementType::IntermediateThrowEvent
            && self.event_type == BpmnEventType::Link
    }

    pub fn is_joining_gateway(&self) -> bool {
        self.element_type == ElementType::ParallelGateway && self.incoming.len() > 1
    }

    /// Waits for a process-instance-bound message subscription.
    pub fn is_message_catch(&self) -> bool {
        self.message.is_some() && self.element_type != ElementType::StartEvent
    }

    pub fn is_signal_catch(&self) -> bool {
        self.element_type == ElementType::IntermediateCatchEvent
            && self.event_type == BpmnEventType::Signal
    }
}

/// A deployed process definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutableProcess {
    pub key: Key,
    pub bpmn_process_id: String,
    pub version: u32,
    pub elements: BTreeMap<String, ExecutableElement>,
    pub sequence_flows: BTreeMap<String, SequenceFlow>,
    pub message_start_events: Vec<String>,
}

impl ExecutableProcess {
    pub fn root(&self) -> Option<&ExecutableElement> {
        self.elements.get(&self.bpmn_process_id)
    }

    /// Looks up an element by id and expected type. A multi-instance body
    /// also answers for its inner activity.
    pub fn element(&self, id: &str, element_type: ElementType) -> Option<&ExecutableElement> {
        let element = self.elements.get(id)?;
        if element.element_type == element_type {
            return Some(element);
        }
        element
            .inner_activity
            .as_deref()
            .filter(|inner| inner.element_type == element_type)
    }

    /// Element by id, whatever its type.
    pub fn element_by_id(&self, id: &str) -> Option<&ExecutableElement> {
        self.elements.get(id)
    }

    pub fn sequence_flow(&self, id: &str) -> Option<&SequenceFlow> {
        self.sequence_flows.get(id)
    }

    pub fn message_start_event_elements(&self) -> impl Iterator<Item = &ExecutableElement> {
        self.message_start_events
            .iter()
            .filter_map(|id| self.elements.get(id))
    }

    /// The catch event of `link_name` inside `flow_scope`.
    pub fn link_catch(&self, flow_scope: &str, link_name: &str) -> Option<&ExecutableElement> {
        self.elements.values().find(|e| {
            e.element_type == ElementType::IntermediateCatchEvent
                && e.event_type == BpmnEventType::Link
                && e.flow_scope.as_deref() == Some(flow_scope)
                && e.link_name.as_deref() == Some(link_name)
        })
    }
}

// ── Graph seam ──

/// Read access to deployed processes.
pub trait ElementGraph: Send + Sync {
    fn process(&self, definition_key: Key) -> Option<&ExecutableProcess>;

    /// Highest version of `bpmn_process_id`.
    fn latest_process(&self, bpmn_process_id: &str) -> Option<&ExecutableProcess>;

    fn processes(&self) -> Vec<&ExecutableProcess>;

    fn form_exists(&self, form_key: &str) -> bool;

    fn element(
        &self,
        definition_key: Key,
        element_id: &str,
        element_type: ElementType,
    ) -> Option<&ExecutableElement> {
        self.process(definition_key)?
            .element(element_id, element_type)
    }
}

/// In-memory element graph. Definition keys are assigned in deploy order.
#[derive(Debug, Default, Clone)]
pub struct ProcessRegistry {
    processes: BTreeMap<Key, ExecutableProcess>,
    forms: BTreeSet<String>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and compiles `dto`; returns the new definition key.
    pub fn deploy(&mut self, dto: &dto::ProcessDto) -> Result<Key, ModelError> {
        let errors = validate::validate_process(dto);
        if !errors.is_empty() {
            return Err(ModelError::Invalid(errors));
        }
        let key = self.processes.len() as Key + 1;
        let version = self
            .processes
            .values()
            .filter(|p| p.bpmn_process_id == dto.id)
            .count() as u32
            + 1;
        let process = build::build_process(dto, key, version)?;
        tracing::info!(
            bpmn_process_id = %process.bpmn_process_id,
            definition_key = key,
            version,
            "process deployed"
        );
        self.processes.insert(key, process);
        Ok(key)
    }

    pub fn deploy_yaml(&mut self, source: &str) -> anyhow::Result<Key> {
        use anyhow::Context;
        let dto = yaml::parse_process_yaml(source)?;
        let id = dto.id.clone();
        let key = self
            .deploy(&dto)
            .with_context(|| format!("failed to deploy process '{id}'"))?;
        Ok(key)
    }

    pub fn register_form(&mut self, form_key: impl Into<String>) {
        self.forms.insert(form_key.into());
    }
}

impl ElementGraph for ProcessRegistry {
    fn process(&self, definition_key: Key) -> Option<&ExecutableProcess> {
        self.processes.get(&definition_key)
    }

    fn latest_process(&self, bpmn_process_id: &str) -> Option<&ExecutableProcess> {
        self.processes
            .values()
            .filter(|p| p.bpmn_process_id == bpmn_process_id)
            .max_by_key(|p| p.version)
    }

    fn processes(&self) -> Vec<&ExecutableProcess> {
        self.processes.values().collect()
    }

    fn form_exists(&self, form_key: &str) -> bool {
        self.forms.contains(form_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDER: &str = r#"
id: order
nodes:
  - kind: StartEvent
    id: start
  - kind: ServiceTask
    id: ship
    job_type: shipping
    multi_instance:
      input_collection: "=items"
      input_element: item
  - kind: EndEvent
    id: end
edges:
  - from: start
    to: ship
  - from: ship
    to: end
"#;

    #[test]
    fn redeploy_creates_new_version() {
        let mut registry = ProcessRegistry::new();
        let first = registry.deploy_yaml(ORDER).unwrap();
        let second = registry.deploy_yaml(ORDER).unwrap();
        assert_eq!((first, second), (1, 2));
        let latest = registry.latest_process("order").unwrap();
        assert_eq!((latest.key, latest.version), (2, 2));
    }

    #[test]
    fn multi_instance_body_answers_for_inner_activity() {
        let mut registry = ProcessRegistry::new();
        let key = registry.deploy_yaml(ORDER).unwrap();

        let body = registry
            .element(key, "ship", ElementType::MultiInstanceBody)
            .unwrap();
        assert_eq!(body.outgoing.len(), 1);

        let inner = registry.element(key, "ship", ElementType::ServiceTask).unwrap();
        assert_eq!(inner.flow_scope.as_deref(), Some("ship"));
        assert!(inner.outgoing.is_empty());
        assert!(registry.element(key, "ship", ElementType::UserTask).is_none());
    }

    #[test]
    fn invalid_process_is_not_deployed() {
        let mut registry = ProcessRegistry::new();
        let err = registry
            .deploy_yaml("id: broken\nnodes:\n  - kind: EndEvent\n    id: end\n")
            .unwrap_err();
        assert!(format!("{err:#}").contains("start event"));
        assert!(registry.processes().is_empty());
    }

    #[test]
    fn forms_are_registered() {
        let mut registry = ProcessRegistry::new();
        registry.register_form("approve-form");
        assert!(registry.form_exists("approve-form"));
        assert!(!registry.form_exists("other"));
    }
}

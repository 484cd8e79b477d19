//! The behavior facade.
//!
//! [`BpmnBehaviors`] bundles everything an element processor may touch while
//! one command is processed: the partition state, the record writer, the
//! element graph and the external services. Every event goes through
//! [`BpmnBehaviors::emit`], which applies it to state before appending it, so
//! later steps of the same command observe it.

mod catch_event;
mod compensation;
mod decision;
mod incident;
mod job;
mod message;
mod output_collection;
mod signal;
mod state_transition;
mod user_task;
mod variable;

pub use decision::{DecisionEvaluator, StaticDecisionEvaluator};
pub use job::{ChannelJobNotifier, JobNotifier, NoopJobNotifier};
pub(crate) use variable::type_name;

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::expression::{ExpressionEvaluator, PathExpressionEvaluator};
use crate::intent::{Intent, ProcessInstanceIntent};
use crate::log::RecordWriter;
use crate::metrics::ElementAction;
use crate::model::{ElementGraph, ExecutableElement, ExecutableProcess};
use crate::record::{ProcessInstanceRecord, Record, RecordValue, RejectionType};
use crate::state::EngineState;
use crate::types::{ElementType, Key, Timestamp};
use std::sync::Arc;

// ── Context ──

/// The element instance a processing step works on, as of `intent`.
#[derive(Debug, Clone, PartialEq)]
pub struct BpmnElementContext {
    pub key: Key,
    pub intent: ProcessInstanceIntent,
    pub record: ProcessInstanceRecord,
}

impl BpmnElementContext {
    pub fn new(key: Key, intent: ProcessInstanceIntent, record: ProcessInstanceRecord) -> Self {
        Self { key, intent, record }
    }

    pub fn with_intent(&self, intent: ProcessInstanceIntent) -> Self {
        Self {
            intent,
            ..self.clone()
        }
    }

    pub fn flow_scope_key(&self) -> Option<Key> {
        self.record.flow_scope_key
    }

    pub fn process_instance_key(&self) -> Key {
        self.record.process_instance_key
    }

    pub fn element_id(&self) -> &str {
        &self.record.element_id
    }

    pub fn element_type(&self) -> ElementType {
        self.record.element_type
    }

    /// Variable scope of the instance itself.
    pub fn scope(&self) -> VariableScope {
        VariableScope::new(self.key, &self.record)
    }

    /// Variable scope of the flow scope; the instance itself for a root.
    pub fn flow_scope(&self) -> VariableScope {
        VariableScope::new(self.flow_scope_key().unwrap_or(self.key), &self.record)
    }

    /// Record of an element activated inside `flow_scope_key`, in the same
    /// process instance.
    pub fn record_for(&self, element: &ExecutableElement, flow_scope_key: Option<Key>) -> ProcessInstanceRecord {
        ProcessInstanceRecord {
            bpmn_process_id: self.record.bpmn_process_id.clone(),
            process_definition_key: self.record.process_definition_key,
            process_instance_key: self.record.process_instance_key,
            element_id: element.id.clone(),
            element_type: element.element_type,
            event_type: element.event_type,
            flow_scope_key,
            parent_process_instance_key: None,
            parent_element_instance_key: None,
        }
    }
}

/// Where a variable write lands, and the instance it is reported against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableScope {
    pub scope_key: Key,
    pub process_instance_key: Key,
    pub process_definition_key: Key,
}

impl VariableScope {
    pub fn new(scope_key: Key, record: &ProcessInstanceRecord) -> Self {
        Self {
            scope_key,
            process_instance_key: record.process_instance_key,
            process_definition_key: record.process_definition_key,
        }
    }

    pub fn at(&self, scope_key: Key) -> Self {
        Self { scope_key, ..*self }
    }
}

// ── Services ──

/// External collaborators of the engine.
pub struct Services {
    pub expressions: Box<dyn ExpressionEvaluator>,
    pub decisions: Box<dyn DecisionEvaluator>,
    pub notifier: Box<dyn JobNotifier>,
    pub clock: Arc<dyn Clock>,
}

impl Services {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            expressions: Box::new(PathExpressionEvaluator),
            decisions: Box::new(StaticDecisionEvaluator::default()),
            notifier: Box::new(NoopJobNotifier),
            clock,
        }
    }

    pub fn with_expressions(mut self, expressions: impl ExpressionEvaluator + 'static) -> Self {
        self.expressions = Box::new(expressions);
        self
    }

    pub fn with_decisions(mut self, decisions: impl DecisionEvaluator + 'static) -> Self {
        self.decisions = Box::new(decisions);
        self
    }

    pub fn with_notifier(mut self, notifier: impl JobNotifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }
}

impl Default for Services {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

/// Effects that may only happen once the command is committed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SideEffects {
    pub metrics: Vec<(ElementType, ElementAction)>,
    pub jobs_available: Vec<String>,
}

// ── Facade ──

pub struct BpmnBehaviors<'a> {
    pub(crate) state: &'a mut EngineState,
    pub(crate) writer: &'a mut dyn RecordWriter,
    pub(crate) graph: &'a dyn ElementGraph,
    pub(crate) services: &'a Services,
    pub(crate) config: &'a EngineConfig,
    pub(crate) effects: &'a mut SideEffects,
    /// Reused by output collection edits.
    pub(crate) scratch: &'a mut Vec<u8>,
    pub(crate) now: Timestamp,
}

impl<'a> BpmnBehaviors<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: &'a mut EngineState,
        writer: &'a mut dyn RecordWriter,
        graph: &'a dyn ElementGraph,
        services: &'a Services,
        config: &'a EngineConfig,
        effects: &'a mut SideEffects,
        scratch: &'a mut Vec<u8>,
    ) -> Self {
        let now = services.clock.current_time_millis();
        Self {
            state,
            writer,
            graph,
            services,
            config,
            effects,
            scratch,
            now,
        }
    }

    pub fn state(&self) -> &EngineState {
        &*self.state
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn config(&self) -> &EngineConfig {
        self.config
    }

    // ── Records ──

    pub(crate) fn next_key(&mut self) -> Key {
        self.writer.next_key()
    }

    /// Applies the event, then appends it.
    pub(crate) fn emit(
        &mut self,
        key: Key,
        intent: impl Into<Intent>,
        value: impl Into<RecordValue>,
    ) -> EngineResult<()> {
        let intent = intent.into();
        let value = value.into();
        self.state.apply(self.graph, self.now, key, intent, &value)?;
        self.writer.append_follow_up_event(key, intent, value);
        Ok(())
    }

    pub(crate) fn command(&mut self, key: Key, intent: impl Into<Intent>, value: impl Into<RecordValue>) {
        self.writer
            .append_follow_up_command(key, intent.into(), value.into());
    }

    pub(crate) fn new_command(&mut self, intent: impl Into<Intent>, value: impl Into<RecordValue>) {
        self.writer.append_new_command(intent.into(), value.into());
    }

    pub(crate) fn reject(&mut self, command: &Record, rejection_type: RejectionType, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(
            intent = ?command.intent,
            key = ?command.key,
            ?rejection_type,
            %reason,
            "command rejected"
        );
        self.writer
            .append_rejection(command, rejection_type, reason);
    }

    // ── Element graph ──

    pub fn process(&self, definition_key: Key) -> EngineResult<&'a ExecutableProcess> {
        let graph: &'a dyn ElementGraph = self.graph;
        graph
            .process(definition_key)
            .ok_or(EngineError::ProcessNotFound(definition_key))
    }

    /// The executable element a record refers to.
    pub fn element(&self, record: &ProcessInstanceRecord) -> EngineResult<&'a ExecutableElement> {
        let graph: &'a dyn ElementGraph = self.graph;
        graph
            .element(record.process_definition_key, &record.element_id, record.element_type)
            .ok_or_else(|| EngineError::ElementNotFound {
                definition_key: record.process_definition_key,
                element_id: record.element_id.clone(),
                element_type: record.element_type,
            })
    }

    pub fn element_by_id(&self, definition_key: Key, element_id: &str) -> EngineResult<&'a ExecutableElement> {
        self.process(definition_key)?
            .element_by_id(element_id)
            .ok_or_else(|| EngineError::ElementNotFound {
                definition_key,
                element_id: element_id.to_string(),
                element_type: ElementType::default(),
            })
    }

    /// Context of a live element instance, as of its current state.
    pub fn context_of(&self, key: Key) -> EngineResult<BpmnElementContext> {
        let instance = self.state.element_instances.require(key)?;
        Ok(BpmnElementContext::new(key, instance.state, instance.value.clone()))
    }

    pub(crate) fn record_metric(&mut self, element_type: ElementType, action: ElementAction) {
        self.effects.metrics.push((element_type, action));
    }
}

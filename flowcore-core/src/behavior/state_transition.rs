//! Lifecycle transitions of element instances.
//!
//! Each `transition_to_*` checks the lifecycle table, emits the event and
//! returns the context as of the new state. Completion and termination also
//! notify the enclosing container, so processors never talk to their parent
//! directly.

use super::{BpmnBehaviors, BpmnElementContext};
use crate::error::{EngineError, EngineResult, ProcessingResult};
use crate::intent::{ProcessEventIntent, ProcessInstanceBatchIntent, ProcessInstanceIntent};
use crate::lifecycle::can_transition;
use crate::metrics::ElementAction;
use crate::model::{ExecutableElement, SequenceFlow};
use crate::record::{ProcessEventRecord, ProcessInstanceBatchRecord, ProcessInstanceRecord};
use crate::state::EventTrigger;
use crate::types::{ElementType, Key};

use ProcessInstanceIntent::*;

impl BpmnBehaviors<'_> {
    fn check_transition(&self, ctx: &BpmnElementContext, to: ProcessInstanceIntent) -> EngineResult<()> {
        if can_transition(ctx.intent, to) {
            Ok(())
        } else {
            Err(EngineError::IllegalTransition {
                key: ctx.key,
                from: ctx.intent,
                to,
            })
        }
    }

    // ── Activation ──

    /// Creates the element instance, or re-enters it while an incident on it
    /// is being resolved. Without `key` a new key is assigned.
    pub fn transition_to_activating(
        &mut self,
        key: Option<Key>,
        record: ProcessInstanceRecord,
        reentrant: bool,
    ) -> EngineResult<BpmnElementContext> {
        if let Some(existing) = key.and_then(|k| self.state.element_instances.get(k)) {
            if reentrant && existing.state == ElementActivating {
                return Ok(BpmnElementContext::new(existing.key, ElementActivating, existing.value.clone()));
            }
            return Err(EngineError::UnexpectedReentry {
                key: existing.key,
                state: existing.state,
            });
        }
        let key = match key {
            Some(key) => key,
            None => self.next_key(),
        };
        self.emit(key, ElementActivating, record.clone())?;
        tracing::debug!(key, element_id = %record.element_id, element_type = %record.element_type, "element activating");
        Ok(BpmnElementContext::new(key, ElementActivating, record))
    }

    pub fn transition_to_activated(&mut self, ctx: &BpmnElementContext) -> EngineResult<BpmnElementContext> {
        self.check_transition(ctx, ElementActivated)?;
        self.emit(ctx.key, ElementActivated, ctx.record.clone())?;
        self.record_metric(ctx.element_type(), ElementAction::Activated);
        Ok(ctx.with_intent(ElementActivated))
    }

    // ── Completion ──

    pub fn transition_to_completing(
        &mut self,
        ctx: &BpmnElementContext,
        reentrant: bool,
    ) -> EngineResult<BpmnElementContext> {
        if reentrant && ctx.intent == ElementCompleting {
            return Ok(ctx.clone());
        }
        self.check_transition(ctx, ElementCompleting)?;
        self.emit(ctx.key, ElementCompleting, ctx.record.clone())?;
        Ok(ctx.with_intent(ElementCompleting))
    }

    /// Completes the instance. When it ends an execution path of its flow
    /// scope, the container is consulted before and notified after.
    pub fn transition_to_completed(
        &mut self,
        element: &ExecutableElement,
        ctx: &BpmnElementContext,
    ) -> ProcessingResult<BpmnElementContext> {
        self.check_transition(ctx, ElementCompleted)?;
        let ends_path = element.outgoing.is_empty()
            && !element.is_link_throw()
            && element.element_type != ElementType::Process;
        let satisfied = if ends_path {
            self.before_execution_path_completed(ctx)?
        } else {
            false
        };

        self.emit(ctx.key, ElementCompleted, ctx.record.clone())?;
        self.record_metric(ctx.element_type(), ElementAction::Completed);
        let completed = ctx.with_intent(ElementCompleted);

        self.create_compensation_subscription(element, &completed)?;
        self.on_compensation_handler_completed(&completed)?;

        if ends_path {
            self.after_execution_path_completed(&completed, satisfied)?;
        }
        Ok(completed)
    }

    // ── Termination ──

    pub fn transition_to_terminating(&mut self, ctx: &BpmnElementContext) -> EngineResult<BpmnElementContext> {
        if ctx.intent == ElementTerminating {
            return Err(EngineError::AlreadyTerminating(ctx.key));
        }
        self.check_transition(ctx, ElementTerminating)?;
        self.emit(ctx.key, ElementTerminating, ctx.record.clone())?;
        Ok(ctx.with_intent(ElementTerminating))
    }

    pub fn transition_to_terminated(&mut self, ctx: &BpmnElementContext) -> EngineResult<BpmnElementContext> {
        self.check_transition(ctx, ElementTerminated)?;
        self.emit(ctx.key, ElementTerminated, ctx.record.clone())?;
        self.record_metric(ctx.element_type(), ElementAction::Terminated);
        Ok(ctx.with_intent(ElementTerminated))
    }

    /// Terminates the instance and then either activates the interrupting
    /// boundary event that caused it or notifies the container.
    pub fn finish_termination(&mut self, ctx: &BpmnElementContext) -> ProcessingResult<BpmnElementContext> {
        let trigger = self
            .state
            .element_instances
            .peek_trigger(ctx.key)
            .filter(|t| t.interrupting)
            .cloned();
        let terminated = self.transition_to_terminated(ctx)?;

        let flow_scope_active = ctx
            .flow_scope_key()
            .and_then(|k| self.state.element_instances.get(k))
            .is_some_and(|scope| scope.state == ElementActivated);
        match trigger {
            Some(trigger) if flow_scope_active => self.activate_interrupting_event(&terminated, &trigger)?,
            _ => self.on_element_terminated(&terminated)?,
        }
        Ok(terminated)
    }

    fn activate_interrupting_event(&mut self, host: &BpmnElementContext, trigger: &EventTrigger) -> EngineResult<()> {
        let flow_scope_key = host
            .flow_scope_key()
            .ok_or(EngineError::MissingFlowScope(host.key))?;
        self.consume_trigger(host, trigger)?;
        let boundary = self.element_by_id(host.record.process_definition_key, &trigger.element_id)?;
        self.activate_triggered_event(host, flow_scope_key, boundary, &trigger.variables)?;
        Ok(())
    }

    // ── Sequence flows ──

    pub fn take_sequence_flow(&mut self, ctx: &BpmnElementContext, flow: &SequenceFlow) -> EngineResult<()> {
        self.check_transition(ctx, SequenceFlowTaken)?;
        let flow_scope_key = ctx.flow_scope_key();
        let key = self.next_key();
        let record = ProcessInstanceRecord {
            element_id: flow.id.clone(),
            element_type: ElementType::SequenceFlow,
            event_type: Default::default(),
            flow_scope_key,
            parent_process_instance_key: None,
            parent_element_instance_key: None,
            ..ctx.record.clone()
        };
        self.emit(key, SequenceFlowTaken, record)?;

        let target = self.element_by_id(ctx.record.process_definition_key, &flow.target)?;
        if target.is_joining_gateway() {
            let scope_key = flow_scope_key.ok_or(EngineError::MissingFlowScope(ctx.key))?;
            if !self
                .state
                .element_instances
                .is_join_satisfied(scope_key, &target.id, &target.incoming)
            {
                return Ok(());
            }
        }
        self.new_command(ProcessInstanceIntent::ActivateElement, ctx.record_for(target, flow_scope_key));
        Ok(())
    }

    pub fn take_outgoing_sequence_flows(&mut self, element: &ExecutableElement, ctx: &BpmnElementContext) -> EngineResult<()> {
        for flow in &element.outgoing {
            self.take_sequence_flow(ctx, flow)?;
        }
        Ok(())
    }

    // ── Commands to other instances ──

    pub fn complete_element(&mut self, ctx: &BpmnElementContext) {
        self.command(ctx.key, ProcessInstanceIntent::CompleteElement, ctx.record.clone());
    }

    pub fn terminate_element(&mut self, ctx: &BpmnElementContext) {
        self.command(ctx.key, ProcessInstanceIntent::TerminateElement, ctx.record.clone());
    }

    /// Activates `child` inside the container instance `ctx`.
    pub fn activate_child_instance(&mut self, ctx: &BpmnElementContext, child: &ExecutableElement) {
        self.new_command(ProcessInstanceIntent::ActivateElement, ctx.record_for(child, Some(ctx.key)));
    }

    /// Asks the children of `ctx` to terminate. True when there are none.
    pub fn terminate_child_instances(&mut self, ctx: &BpmnElementContext) -> bool {
        let active_children = self
            .state
            .element_instances
            .get(ctx.key)
            .map_or(0, |i| i.active_children);
        if active_children == 0 {
            return true;
        }
        let key = self.next_key();
        self.command(
            key,
            ProcessInstanceBatchIntent::Terminate,
            ProcessInstanceBatchRecord {
                process_instance_key: ctx.process_instance_key(),
                batch_element_instance_key: ctx.key,
                index: None,
            },
        );
        false
    }

    /// No active children and no sequence flow in transit.
    pub fn can_be_completed(&self, ctx: &BpmnElementContext) -> bool {
        self.state
            .element_instances
            .get(ctx.key)
            .is_some_and(|i| !i.has_pending_execution_paths())
    }

    // ── Triggered events ──

    /// Activates an event element that is entered by a trigger rather than a
    /// sequence flow, stores `variables` on it and completes it.
    pub fn activate_triggered_event(
        &mut self,
        origin: &BpmnElementContext,
        flow_scope_key: Key,
        element: &ExecutableElement,
        variables: &[u8],
    ) -> EngineResult<Key> {
        let key = self.next_key();
        let record = origin.record_for(element, Some(flow_scope_key));
        self.emit(key, ElementActivating, record.clone())?;
        self.emit(key, ElementActivated, record.clone())?;
        self.record_metric(element.element_type, ElementAction::Activated);
        let ctx = BpmnElementContext::new(key, ElementActivated, record);
        self.merge_local_document(ctx.scope(), variables)?;
        self.complete_element(&ctx);
        Ok(key)
    }

    /// Consumes `trigger` from the pending triggers of `scope`.
    pub fn consume_trigger(&mut self, scope: &BpmnElementContext, trigger: &EventTrigger) -> EngineResult<()> {
        self.emit(
            trigger.event_key,
            ProcessEventIntent::Triggered,
            ProcessEventRecord {
                scope_key: scope.key,
                target_element_id: trigger.element_id.clone(),
                variables: trigger.variables.clone(),
                process_instance_key: scope.process_instance_key(),
                process_definition_key: scope.record.process_definition_key,
                interrupting: trigger.interrupting,
            },
        )
    }
}

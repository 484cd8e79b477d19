use super::{BpmnBehaviors, BpmnElementContext};
use crate::error::{EngineError, EngineResult, ProcessingResult};
use crate::intent::{
    MessageSubscriptionIntent, ProcessEventIntent, ProcessMessageSubscriptionIntent,
    SignalSubscriptionIntent,
};
use crate::model::ExecutableElement;
use crate::record::{
    MessageSubscriptionRecord, ProcessEventRecord, ProcessMessageSubscriptionRecord,
    SignalSubscriptionRecord,
};
use crate::state::SubscriptionStatus;
use crate::types::{ElementType, Key};

impl BpmnBehaviors<'_> {
    // ── Subscriptions ──

    /// Opens the message and signal subscriptions of the element and of its
    /// boundary events. Correlation keys are evaluated before anything is
    /// written, so a failing expression leaves no subscription behind.
    pub fn subscribe_to_events(&mut self, element: &ExecutableElement, ctx: &BpmnElementContext) -> ProcessingResult<()> {
        let process = self.process(ctx.record.process_definition_key)?;
        let mut catches = Vec::with_capacity(element.boundary_events.len() + 1);
        if element.is_message_catch() || element.is_signal_catch() {
            catches.push(element);
        }
        for id in &element.boundary_events {
            let boundary = process
                .element_by_id(id)
                .ok_or_else(|| EngineError::ElementNotFound {
                    definition_key: process.key,
                    element_id: id.clone(),
                    element_type: ElementType::BoundaryEvent,
                })?;
            catches.push(boundary);
        }

        let mut messages = Vec::new();
        for catch in &catches {
            if let Some(message) = &catch.message {
                let correlation_key = match &message.correlation_key {
                    Some(expression) => self.evaluate_correlation_key(expression, ctx.key)?,
                    None => String::new(),
                };
                messages.push((*catch, message.name.as_str(), correlation_key));
            }
        }

        for (catch, name, correlation_key) in messages {
            self.open_message_subscription(ctx, catch, name, correlation_key)?;
        }
        for catch in catches.iter().filter(|c| c.signal_name.is_some()) {
            self.open_signal_subscription(ctx, catch)?;
        }
        Ok(())
    }

    fn open_message_subscription(
        &mut self,
        ctx: &BpmnElementContext,
        catch: &ExecutableElement,
        message_name: &str,
        correlation_key: String,
    ) -> EngineResult<()> {
        let key = self.next_key();
        let record = ProcessMessageSubscriptionRecord {
            process_instance_key: ctx.process_instance_key(),
            element_instance_key: ctx.key,
            element_id: catch.id.clone(),
            bpmn_process_id: ctx.record.bpmn_process_id.clone(),
            message_name: message_name.to_string(),
            correlation_key,
            message_key: None,
            variables: Vec::new(),
            interrupting: catch.element_type != ElementType::BoundaryEvent || catch.interrupting,
        };
        tracing::debug!(
            subscription_key = key,
            element_instance_key = ctx.key,
            message_name,
            correlation_key = %record.correlation_key,
            "opening message subscription"
        );
        self.emit(key, ProcessMessageSubscriptionIntent::Creating, record.clone())?;
        self.command(
            key,
            MessageSubscriptionIntent::Create,
            MessageSubscriptionRecord::from_process_side(&record),
        );
        Ok(())
    }

    fn open_signal_subscription(&mut self, ctx: &BpmnElementContext, catch: &ExecutableElement) -> EngineResult<()> {
        let Some(signal_name) = catch.signal_name.clone() else {
            return Ok(());
        };
        let key = self.next_key();
        self.emit(
            key,
            SignalSubscriptionIntent::Created,
            SignalSubscriptionRecord {
                signal_name,
                catch_element_id: catch.id.clone(),
                catch_event_instance_key: ctx.key,
                process_instance_key: ctx.process_instance_key(),
                process_definition_key: ctx.record.process_definition_key,
                bpmn_process_id: ctx.record.bpmn_process_id.clone(),
            },
        )
    }

    /// Closes every subscription the element instance still holds.
    pub fn unsubscribe_from_events(&mut self, ctx: &BpmnElementContext) -> EngineResult<()> {
        let open: Vec<_> = self
            .state
            .process_message_subscriptions
            .subscriptions_of(ctx.key)
            .into_iter()
            .filter(|s| s.status != SubscriptionStatus::Closing)
            .map(|s| (s.key, s.record.clone()))
            .collect();
        for (key, record) in open {
            self.emit(key, ProcessMessageSubscriptionIntent::Deleting, record.clone())?;
            self.command(
                key,
                MessageSubscriptionIntent::Delete,
                MessageSubscriptionRecord::from_process_side(&record),
            );
        }

        for key in self.state.signal_subscriptions.subscriptions_of(ctx.key) {
            if let Some(record) = self.state.signal_subscriptions.get(key).cloned() {
                self.emit(key, SignalSubscriptionIntent::Deleted, record)?;
            }
        }
        Ok(())
    }

    // ── Triggers ──

    /// Queues a trigger for `scope`; consumed when the scope completes or,
    /// if interrupting, when it has terminated.
    pub fn trigger_event(
        &mut self,
        scope: &BpmnElementContext,
        target_element_id: &str,
        variables: Vec<u8>,
        interrupting: bool,
    ) -> EngineResult<Key> {
        let key = self.next_key();
        self.emit(
            key,
            ProcessEventIntent::Triggering,
            ProcessEventRecord {
                scope_key: scope.key,
                target_element_id: target_element_id.to_string(),
                variables,
                process_instance_key: scope.process_instance_key(),
                process_definition_key: scope.record.process_definition_key,
                interrupting,
            },
        )?;
        Ok(key)
    }

    /// Delivers a correlated message or a signal to the waiting instance.
    ///
    /// A catch event or receive task is triggered and completed. An
    /// interrupting boundary event terminates its host and is activated once
    /// the host is gone; a non-interrupting one is activated right away.
    pub fn trigger_catch(
        &mut self,
        waiting: &BpmnElementContext,
        catch: &ExecutableElement,
        variables: Vec<u8>,
    ) -> EngineResult<()> {
        if catch.element_type != ElementType::BoundaryEvent {
            self.trigger_event(waiting, &catch.id, variables, false)?;
            self.complete_element(waiting);
        } else if catch.interrupting {
            self.trigger_event(waiting, &catch.id, variables, true)?;
            self.terminate_element(waiting);
        } else {
            let flow_scope_key = waiting
                .flow_scope_key()
                .ok_or(EngineError::MissingFlowScope(waiting.key))?;
            self.activate_triggered_event(waiting, flow_scope_key, catch, &variables)?;
        }
        Ok(())
    }
}

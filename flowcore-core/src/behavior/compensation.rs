use super::{BpmnBehaviors, BpmnElementContext};
use crate::error::{EngineError, EngineResult};
use crate::intent::{CompensationSubscriptionIntent, ProcessInstanceIntent};
use crate::model::ExecutableElement;
use crate::record::CompensationSubscriptionRecord;

impl BpmnBehaviors<'_> {
    /// Remembers a completed activity that defines a compensation handler.
    pub fn create_compensation_subscription(
        &mut self,
        element: &ExecutableElement,
        completed: &BpmnElementContext,
    ) -> EngineResult<()> {
        let (Some(handler_id), Some(flow_scope_key)) =
            (element.compensation_handler.as_ref(), completed.flow_scope_key())
        else {
            return Ok(());
        };
        let key = self.next_key();
        self.emit(
            key,
            CompensationSubscriptionIntent::Created,
            CompensationSubscriptionRecord {
                process_instance_key: completed.process_instance_key(),
                process_definition_key: completed.record.process_definition_key,
                bpmn_process_id: completed.record.bpmn_process_id.clone(),
                element_id: completed.element_id().to_string(),
                element_instance_key: completed.key,
                flow_scope_key,
                handler_id: handler_id.clone(),
                throw_event_instance_key: None,
                handler_instance_key: None,
            },
        )
    }

    /// Activates the compensation handlers of the activities completed in the
    /// throw event's flow scope, most recent first. Returns false when there
    /// is nothing to compensate.
    pub fn trigger_compensation(&mut self, throw: &ExecutableElement, ctx: &BpmnElementContext) -> EngineResult<bool> {
        let flow_scope_key = ctx
            .flow_scope_key()
            .ok_or(EngineError::MissingFlowScope(ctx.key))?;
        let subscriptions: Vec<_> = self
            .state
            .compensation_subscriptions
            .compensable_in(flow_scope_key)
            .into_iter()
            .filter(|(_, s)| throw.activity_ref.as_ref().map_or(true, |target| *target == s.element_id))
            .map(|(key, s)| (key, s.clone()))
            .collect();
        if subscriptions.is_empty() {
            return Ok(false);
        }

        for (key, subscription) in subscriptions {
            let handler = self.element_by_id(ctx.record.process_definition_key, &subscription.handler_id)?;
            let handler_instance_key = self.next_key();
            self.emit(
                key,
                CompensationSubscriptionIntent::Triggered,
                CompensationSubscriptionRecord {
                    throw_event_instance_key: Some(ctx.key),
                    handler_instance_key: Some(handler_instance_key),
                    ..subscription
                },
            )?;
            self.command(
                handler_instance_key,
                ProcessInstanceIntent::ActivateElement,
                ctx.record_for(handler, Some(flow_scope_key)),
            );
        }
        Ok(true)
    }

    /// When `completed` ran as a compensation handler, releases its
    /// subscription and completes the throw event once all of its handlers
    /// are done.
    pub fn on_compensation_handler_completed(&mut self, completed: &BpmnElementContext) -> EngineResult<()> {
        let Some((key, subscription)) = self
            .state
            .compensation_subscriptions
            .for_handler_instance(completed.key)
            .map(|(key, s)| (key, s.clone()))
        else {
            return Ok(());
        };
        let throw_key = subscription.throw_event_instance_key;
        self.emit(key, CompensationSubscriptionIntent::Deleted, subscription)?;

        if let Some(throw_key) = throw_key {
            if self.state.compensation_subscriptions.pending_handlers_of(throw_key) == 0 {
                if let Some(throw) = self.state.element_instances.get(throw_key) {
                    let record = throw.value.clone();
                    self.command(throw_key, ProcessInstanceIntent::CompleteElement, record);
                }
            }
        }
        Ok(())
    }
}

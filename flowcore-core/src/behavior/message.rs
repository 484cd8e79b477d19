use super::{BpmnBehaviors, BpmnElementContext};
use crate::correlation::find_message_to_correlate;
use crate::error::{EngineError, EngineResult};
use crate::intent::{MessageStartEventSubscriptionIntent, ProcessInstanceIntent};
use crate::model::ElementGraph;
use crate::record::{MessageStartEventSubscriptionRecord, ProcessInstanceRecord};
use crate::types::{ElementType, Key};

impl BpmnBehaviors<'_> {
    /// Starts a new instance of the subscription's process for a message.
    /// The message reaches the start event as a trigger on the new instance.
    pub fn correlate_to_start_event(
        &mut self,
        subscription_key: Key,
        subscription: MessageStartEventSubscriptionRecord,
        message_key: Key,
        correlation_key: &str,
        variables: &[u8],
    ) -> EngineResult<Key> {
        let process = self.process(subscription.process_definition_key)?;
        let root = process.root().ok_or_else(|| EngineError::ElementNotFound {
            definition_key: process.key,
            element_id: process.bpmn_process_id.clone(),
            element_type: ElementType::Process,
        })?;

        let process_instance_key = self.next_key();
        let start_event_id = subscription.start_event_id.clone();
        self.emit(
            subscription_key,
            MessageStartEventSubscriptionIntent::Correlated,
            MessageStartEventSubscriptionRecord {
                message_key: Some(message_key),
                correlation_key: correlation_key.to_string(),
                process_instance_key: Some(process_instance_key),
                variables: variables.to_vec(),
                ..subscription
            },
        )?;

        let record = ProcessInstanceRecord {
            bpmn_process_id: process.bpmn_process_id.clone(),
            process_definition_key: process.key,
            process_instance_key,
            element_id: root.id.clone(),
            element_type: ElementType::Process,
            event_type: root.event_type,
            flow_scope_key: None,
            parent_process_instance_key: None,
            parent_element_instance_key: None,
        };
        let ctx = BpmnElementContext::new(process_instance_key, ProcessInstanceIntent::ActivateElement, record);
        self.trigger_event(&ctx, &start_event_id, variables.to_vec(), false)?;
        self.command(process_instance_key, ProcessInstanceIntent::ActivateElement, ctx.record);

        tracing::info!(
            bpmn_process_id = %process.bpmn_process_id,
            process_instance_key,
            message_key,
            correlation_key,
            "message started process instance"
        );
        Ok(process_instance_key)
    }

    /// Opens the message start event subscriptions of a newly deployed
    /// definition and closes those of older versions of the same process.
    pub fn open_start_event_subscriptions(&mut self, definition_key: Key) -> EngineResult<()> {
        let process = self.process(definition_key)?;
        let graph: &dyn ElementGraph = self.graph;
        if graph.latest_process(&process.bpmn_process_id).map(|latest| latest.key) != Some(process.key) {
            return Ok(());
        }

        let stale: Vec<(Key, MessageStartEventSubscriptionRecord)> = graph
            .processes()
            .into_iter()
            .filter(|p| p.bpmn_process_id == process.bpmn_process_id && p.key != process.key)
            .flat_map(|p| self.state.message_start_subscriptions.subscriptions_of_definition(p.key))
            .map(|(key, record)| (key, record.clone()))
            .collect();
        for (key, record) in stale {
            self.emit(key, MessageStartEventSubscriptionIntent::Deleted, record)?;
        }

        for element in process.message_start_event_elements() {
            let Some(message) = &element.message else { continue };
            let key = self.next_key();
            self.emit(
                key,
                MessageStartEventSubscriptionIntent::Created,
                MessageStartEventSubscriptionRecord {
                    process_definition_key: process.key,
                    bpmn_process_id: process.bpmn_process_id.clone(),
                    start_event_id: element.id.clone(),
                    message_name: message.name.clone(),
                    ..Default::default()
                },
            )?;
            tracing::debug!(bpmn_process_id = %process.bpmn_process_id, message_name = %message.name, "message start subscription opened");
        }
        Ok(())
    }

    /// Once an instance holding the lock for `correlation_key` is gone, the
    /// oldest buffered message for the same key may start the next one.
    pub fn correlate_buffered_start_message(&mut self, bpmn_process_id: &str, correlation_key: &str) -> EngineResult<()> {
        if correlation_key.is_empty()
            || self
                .state
                .messages
                .exist_active_process_instance(bpmn_process_id, correlation_key)
        {
            return Ok(());
        }
        let Some(correlation) =
            find_message_to_correlate(&*self.state, self.graph, bpmn_process_id, correlation_key, self.now)
        else {
            return Ok(());
        };
        let subscription = self
            .state
            .message_start_subscriptions
            .get(correlation.subscription_key)
            .cloned();
        let message = self.state.messages.get(correlation.message_key).cloned();
        let (Some(subscription), Some(message)) = (subscription, message) else {
            return Ok(());
        };
        self.correlate_to_start_event(
            correlation.subscription_key,
            subscription,
            message.key,
            &message.correlation_key,
            &message.variables,
        )?;
        Ok(())
    }
}

//! Event appliers: the only code that mutates [`EngineState`].

use super::element_instance::{ElementInstance, EventTrigger};
use super::message::StoredMessage;
use super::subscription::SubscriptionStatus;
use super::EngineState;
use crate::error::{EngineError, EngineResult};
use crate::intent::*;
use crate::model::ElementGraph;
use crate::record::*;
use crate::types::{ElementType, Key, Timestamp};

impl EngineState {
    /// Applies one event. Command intents are accepted and ignored.
    ///
    /// `now` stamps the sent time of subscriptions that enter a pending state.
    pub(crate) fn apply(
        &mut self,
        graph: &dyn ElementGraph,
        now: Timestamp,
        key: Key,
        intent: Intent,
        value: &RecordValue,
    ) -> EngineResult<()> {
        match (intent, value) {
            (Intent::ProcessInstance(i), RecordValue::ProcessInstance(r)) => {
                self.apply_process_instance(graph, key, i, r)
            }
            (Intent::ProcessInstanceBatch(_), RecordValue::ProcessInstanceBatch(_))
            | (Intent::ProcessInstanceCreation(_), RecordValue::ProcessInstanceCreation(_))
            | (Intent::VariableDocument(_), RecordValue::VariableDocument(_))
            | (Intent::Signal(_), RecordValue::Signal(_)) => Ok(()),
            (Intent::Variable(_), RecordValue::Variable(r)) => {
                self.variables
                    .set_variable(key, r.scope_key, &r.name, r.value.clone());
                Ok(())
            }
            (Intent::Message(i), RecordValue::Message(r)) => {
                self.apply_message(key, i, r);
                Ok(())
            }
            (Intent::MessageSubscription(i), RecordValue::MessageSubscription(r)) => {
                self.apply_message_subscription(now, key, i, r);
                Ok(())
            }
            (Intent::ProcessMessageSubscription(i), RecordValue::ProcessMessageSubscription(r)) => {
                self.apply_process_message_subscription(now, key, i, r);
                Ok(())
            }
            (
                Intent::MessageStartEventSubscription(i),
                RecordValue::MessageStartEventSubscription(r),
            ) => {
                self.apply_start_event_subscription(key, i, r);
                Ok(())
            }
            (Intent::ProcessEvent(i), RecordValue::ProcessEvent(r)) => {
                self.apply_process_event(key, i, r);
                Ok(())
            }
            (Intent::Incident(i), RecordValue::Incident(r)) => {
                match i {
                    IncidentIntent::Created => self.incidents.put(key, r.clone()),
                    IncidentIntent::Resolved => {
                        self.incidents.remove(key);
                    }
                    IncidentIntent::Resolve => {}
                }
                Ok(())
            }
            (Intent::Job(i), RecordValue::Job(r)) => {
                match i {
                    JobIntent::Created => self.jobs.put(key, r.clone()),
                    JobIntent::Failed | JobIntent::RetriesUpdated => {
                        self.jobs.update(key, r.retries, r.error_message.clone())
                    }
                    JobIntent::Completed | JobIntent::Canceled => {
                        self.jobs.remove(key);
                    }
                    JobIntent::Complete | JobIntent::Fail | JobIntent::UpdateRetries => {}
                }
                Ok(())
            }
            (Intent::UserTask(i), RecordValue::UserTask(r)) => {
                match i {
                    UserTaskIntent::Created => self.user_tasks.put(key, r.clone()),
                    UserTaskIntent::Completed | UserTaskIntent::Canceled => {
                        self.user_tasks.remove(key);
                    }
                    UserTaskIntent::Complete => {}
                }
                Ok(())
            }
            (Intent::SignalSubscription(i), RecordValue::SignalSubscription(r)) => {
                match i {
                    SignalSubscriptionIntent::Created => self.signal_subscriptions.put(key, r.clone()),
                    SignalSubscriptionIntent::Deleted => self.signal_subscriptions.remove(key),
                }
                Ok(())
            }
            (Intent::CompensationSubscription(i), RecordValue::CompensationSubscription(r)) => {
                match i {
                    CompensationSubscriptionIntent::Created
                    | CompensationSubscriptionIntent::Triggered => {
                        self.compensation_subscriptions.put(key, r.clone())
                    }
                    CompensationSubscriptionIntent::Deleted => {
                        self.compensation_subscriptions.remove(key)
                    }
                }
                Ok(())
            }
            (intent, _) => Err(EngineError::MismatchedRecord(intent)),
        }
    }

    // ── Element instances ──

    fn apply_process_instance(
        &mut self,
        graph: &dyn ElementGraph,
        key: Key,
        intent: ProcessInstanceIntent,
        record: &ProcessInstanceRecord,
    ) -> EngineResult<()> {
        use ProcessInstanceIntent::*;
        match intent {
            ElementActivating => self.apply_activating(graph, key, record),
            ElementActivated | ElementCompleting => {
                self.element_instances.require_mut(key)?.state = intent;
                Ok(())
            }
            ElementTerminating => {
                let instance = self.element_instances.require_mut(key)?;
                instance.state = intent;
                instance.active_sequence_flows = 0;
                self.element_instances.clear_taken_flows(key);
                Ok(())
            }
            ElementCompleted | ElementTerminated => self.apply_ended(key, record),
            SequenceFlowTaken => self.apply_sequence_flow_taken(graph, record),
            ActivateElement | CompleteElement | TerminateElement | Cancel => Ok(()),
        }
    }

    fn apply_activating(
        &mut self,
        graph: &dyn ElementGraph,
        key: Key,
        record: &ProcessInstanceRecord,
    ) -> EngineResult<()> {
        let mut instance = ElementInstance::new(key, ProcessInstanceIntent::ElementActivating, record.clone());

        if let Some(scope_key) = record.flow_scope_key {
            let element = graph
                .element(record.process_definition_key, &record.element_id, record.element_type)
                .ok_or_else(|| EngineError::ElementNotFound {
                    definition_key: record.process_definition_key,
                    element_id: record.element_id.clone(),
                    element_type: record.element_type,
                })?;

            self.element_instances
                .increment_children(scope_key)
                .map_err(|_| EngineError::MissingFlowScope(scope_key))?;
            if self.element_instances.require(scope_key)?.value.element_type == ElementType::MultiInstanceBody {
                let scope = self.element_instances.require_mut(scope_key)?;
                scope.multi_instance_loop_counter += 1;
                instance.multi_instance_loop_counter = scope.multi_instance_loop_counter;
            }

            let consumed = if element.is_joining_gateway() {
                self.element_instances
                    .consume_join(scope_key, &element.id, &element.incoming);
                element.incoming.len() as u32
            } else if !element.incoming.is_empty() && !record.element_type.is_entered_without_flow() {
                1
            } else {
                0
            };
            self.element_instances
                .decrement_sequence_flows(scope_key, consumed)?;
        }

        if record.element_type == ElementType::Process {
            if let Some(parent) = record.parent_element_instance_key {
                self.element_instances.require_mut(parent)?.called_child_instance_key = Some(key);
            }
        }

        self.variables.create_scope(key, record.flow_scope_key);
        self.element_instances.insert(instance);
        Ok(())
    }

    fn apply_ended(&mut self, key: Key, record: &ProcessInstanceRecord) -> EngineResult<()> {
        let instance = self.element_instances.require(key)?;
        if instance.has_pending_execution_paths() {
            return Err(EngineError::PendingExecutionPaths {
                key,
                active_children: instance.active_children,
                active_sequence_flows: instance.active_sequence_flows,
            });
        }
        self.element_instances.remove(key);
        self.variables.remove_scope(key);
        self.compensation_subscriptions.remove_scope(key);
        if let Some(scope_key) = record.flow_scope_key {
            self.element_instances.decrement_children(scope_key)?;
        }

        if record.element_type == ElementType::Process {
            self.messages.release(key);
            self.compensation_subscriptions.remove_process_instance(key);
            if let Some(parent) = record.parent_element_instance_key {
                if let Ok(call_activity) = self.element_instances.require_mut(parent) {
                    call_activity.called_child_instance_key = None;
                }
            }
        }
        Ok(())
    }

    fn apply_sequence_flow_taken(
        &mut self,
        graph: &dyn ElementGraph,
        record: &ProcessInstanceRecord,
    ) -> EngineResult<()> {
        let scope_key = record
            .flow_scope_key
            .ok_or(EngineError::MissingFlowScope(record.process_instance_key))?;
        self.element_instances.increment_sequence_flows(scope_key)?;

        let process = graph
            .process(record.process_definition_key)
            .ok_or(EngineError::ProcessNotFound(record.process_definition_key))?;
        let flow = process
            .sequence_flow(&record.element_id)
            .ok_or_else(|| EngineError::ElementNotFound {
                definition_key: record.process_definition_key,
                element_id: record.element_id.clone(),
                element_type: ElementType::SequenceFlow,
            })?;
        if process
            .element_by_id(&flow.target)
            .is_some_and(|target| target.is_joining_gateway())
        {
            self.element_instances
                .add_taken_flow(scope_key, &flow.target, &flow.id);
        }
        Ok(())
    }

    fn apply_process_event(&mut self, key: Key, intent: ProcessEventIntent, record: &ProcessEventRecord) {
        match intent {
            ProcessEventIntent::Triggering => {
                if record.interrupting {
                    if let Ok(scope) = self.element_instances.require_mut(record.scope_key) {
                        scope.interrupted = true;
                    }
                }
                self.element_instances.push_trigger(
                    record.scope_key,
                    EventTrigger {
                        event_key: key,
                        element_id: record.target_element_id.clone(),
                        variables: record.variables.clone(),
                        interrupting: record.interrupting,
                    },
                );
            }
            ProcessEventIntent::Triggered => {
                self.element_instances.remove_trigger(record.scope_key, key)
            }
        }
    }

    // ── Messages ──

    fn apply_message(&mut self, key: Key, intent: MessageIntent, record: &MessageRecord) {
        match intent {
            MessageIntent::Published => self.messages.put(StoredMessage {
                key,
                name: record.name.clone(),
                correlation_key: record.correlation_key.clone(),
                variables: record.variables.clone(),
                message_id: record.message_id.clone(),
                deadline: record.deadline,
            }),
            MessageIntent::Expired => {
                self.messages.remove(key);
            }
            MessageIntent::Publish | MessageIntent::Expire => {}
        }
    }

    fn apply_message_subscription(
        &mut self,
        now: Timestamp,
        key: Key,
        intent: MessageSubscriptionIntent,
        record: &MessageSubscriptionRecord,
    ) {
        use MessageSubscriptionIntent::*;
        match intent {
            Created => self.message_subscriptions.put(key, record.clone()),
            Correlating => {
                if let Some(message_key) = record.message_key {
                    self.message_subscriptions.update_to_correlating(
                        key,
                        message_key,
                        record.variables.clone(),
                        now,
                    );
                    self.messages
                        .put_correlation(message_key, &record.bpmn_process_id);
                }
            }
            Correlated => {
                if record.interrupting {
                    self.message_subscriptions.remove(key);
                } else {
                    self.message_subscriptions.reset_correlating(key);
                }
            }
            Rejected => {
                if let Some(message_key) = record.message_key {
                    self.messages
                        .remove_correlation(message_key, &record.bpmn_process_id);
                }
                self.message_subscriptions.reset_correlating(key);
            }
            Deleted => {
                self.message_subscriptions.remove(key);
            }
            Create | Correlate | Reject | Delete => {}
        }
    }

    fn apply_process_message_subscription(
        &mut self,
        now: Timestamp,
        key: Key,
        intent: ProcessMessageSubscriptionIntent,
        record: &ProcessMessageSubscriptionRecord,
    ) {
        use ProcessMessageSubscriptionIntent::*;
        let subscriptions = &mut self.process_message_subscriptions;
        let (element, name) = (record.element_instance_key, record.message_name.as_str());
        match intent {
            Creating => subscriptions.put_opening(key, record.clone(), now),
            Created => subscriptions.set_status(element, name, SubscriptionStatus::Opened, now),
            Correlated => {
                let interrupting = subscriptions
                    .get(element, name)
                    .is_some_and(|s| s.record.interrupting);
                if interrupting {
                    subscriptions.remove(element, name);
                }
            }
            Deleting => subscriptions.set_status(element, name, SubscriptionStatus::Closing, now),
            Deleted => {
                subscriptions.remove(element, name);
            }
            Create | Correlate | Delete => {}
        }
    }

    fn apply_start_event_subscription(
        &mut self,
        key: Key,
        intent: MessageStartEventSubscriptionIntent,
        record: &MessageStartEventSubscriptionRecord,
    ) {
        match intent {
            MessageStartEventSubscriptionIntent::Created => {
                self.message_start_subscriptions.put(key, record.clone())
            }
            MessageStartEventSubscriptionIntent::Correlated => {
                if let Some(message_key) = record.message_key {
                    self.messages
                        .put_correlation(message_key, &record.bpmn_process_id);
                }
                if let Some(process_instance_key) = record.process_instance_key {
                    if !record.correlation_key.is_empty() {
                        self.messages.lock(
                            &record.bpmn_process_id,
                            &record.correlation_key,
                            process_instance_key,
                        );
                    }
                }
            }
            MessageStartEventSubscriptionIntent::Deleted => {
                self.message_start_subscriptions.remove(key)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProcessRegistry;

    const JOIN: &str = r#"
id: join
nodes:
  - kind: StartEvent
    id: start
  - kind: ParallelGateway
    id: fork
  - kind: ParallelGateway
    id: merge
  - kind: EndEvent
    id: end
edges:
  - from: start
    to: fork
  - from: fork
    to: merge
    id: a
  - from: fork
    to: merge
    id: b
  - from: merge
    to: end
"#;

    fn record(element_id: &str, element_type: ElementType, scope: Option<Key>) -> ProcessInstanceRecord {
        ProcessInstanceRecord {
            bpmn_process_id: "join".to_string(),
            process_definition_key: 1,
            process_instance_key: 100,
            element_id: element_id.to_string(),
            element_type,
            flow_scope_key: scope,
            ..Default::default()
        }
    }

    fn apply(state: &mut EngineState, graph: &ProcessRegistry, key: Key, intent: ProcessInstanceIntent, record: &ProcessInstanceRecord) {
        state
            .apply(graph, 0, key, intent.into(), &record.clone().into())
            .unwrap();
    }

    #[test]
    fn join_consumes_one_token_per_incoming_flow() {
        let mut graph = ProcessRegistry::new();
        graph.deploy_yaml(JOIN).unwrap();
        let mut state = EngineState::new();
        use ProcessInstanceIntent::*;

        apply(&mut state, &graph, 100, ElementActivating, &record("join", ElementType::Process, None));
        for flow in ["a", "b"] {
            apply(&mut state, &graph, 200, SequenceFlowTaken, &record(flow, ElementType::SequenceFlow, Some(100)));
        }
        let process = state.element_instances.get(100).unwrap();
        assert_eq!(process.active_sequence_flows, 2);

        apply(&mut state, &graph, 300, ElementActivating, &record("merge", ElementType::ParallelGateway, Some(100)));
        let process = state.element_instances.get(100).unwrap();
        assert_eq!((process.active_sequence_flows, process.active_children), (0, 1));
        let incoming = vec!["a".to_string(), "b".to_string()];
        assert!(!state.element_instances.is_join_satisfied(100, "merge", &incoming));
    }

    #[test]
    fn ending_an_instance_with_pending_children_is_a_defect() {
        let mut graph = ProcessRegistry::new();
        graph.deploy_yaml(JOIN).unwrap();
        let mut state = EngineState::new();
        use ProcessInstanceIntent::*;

        apply(&mut state, &graph, 100, ElementActivating, &record("join", ElementType::Process, None));
        apply(&mut state, &graph, 101, ElementActivating, &record("start", ElementType::StartEvent, Some(100)));
        let err = state
            .apply(&graph, 0, 100, ElementTerminated.into(), &record("join", ElementType::Process, None).into())
            .unwrap_err();
        assert!(matches!(err, EngineError::PendingExecutionPaths { key: 100, active_children: 1, .. }));

        apply(&mut state, &graph, 101, ElementCompleted, &record("start", ElementType::StartEvent, Some(100)));
        apply(&mut state, &graph, 100, ElementTerminated, &record("join", ElementType::Process, None));
        assert!(state.element_instances.is_empty());
    }

    #[test]
    fn start_event_correlation_takes_the_lock() {
        let graph = ProcessRegistry::new();
        let mut state = EngineState::new();
        let record = MessageStartEventSubscriptionRecord {
            bpmn_process_id: "payment".to_string(),
            message_key: Some(7),
            correlation_key: "order-42".to_string(),
            process_instance_key: Some(70),
            ..Default::default()
        };
        state
            .apply(
                &graph,
                0,
                1,
                MessageStartEventSubscriptionIntent::Correlated.into(),
                &record.into(),
            )
            .unwrap();
        assert!(state.messages.exist_correlation(7, "payment"));
        assert_eq!(state.messages.active_process_instance("payment", "order-42"), Some(70));
    }

    #[test]
    fn mismatched_value_is_rejected() {
        let graph = ProcessRegistry::new();
        let mut state = EngineState::new();
        let err = state
            .apply(&graph, 0, 1, JobIntent::Created.into(), &MessageRecord::default().into())
            .unwrap_err();
        assert!(matches!(err, EngineError::MismatchedRecord(_)));
    }
}

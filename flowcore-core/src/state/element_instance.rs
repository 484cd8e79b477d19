use crate::error::{EngineError, EngineResult};
use crate::intent::ProcessInstanceIntent;
use crate::record::ProcessInstanceRecord;
use crate::types::Key;
use super::journal::{transactional, JournaledMap, JournaledSet};
use std::collections::{BTreeMap, VecDeque};

/// A live element instance. Lives in the arena until COMPLETED or
/// TERMINATED is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementInstance {
    pub key: Key,
    pub state: ProcessInstanceIntent,
    pub value: ProcessInstanceRecord,
    pub active_children: u32,
    /// Tokens taken into this scope that have not activated an element yet.
    pub active_sequence_flows: u32,
    /// Set when an interrupting event is terminating this instance.
    pub interrupted: bool,
    /// Zero unless this is an inner instance of a multi-instance body; for
    /// the body itself, the number of children activated so far.
    pub multi_instance_loop_counter: u32,
    pub called_child_instance_key: Option<Key>,
}

impl ElementInstance {
    pub fn new(key: Key, state: ProcessInstanceIntent, value: ProcessInstanceRecord) -> Self {
        Self {
            key,
            state,
            value,
            active_children: 0,
            active_sequence_flows: 0,
            interrupted: false,
            multi_instance_loop_counter: 0,
            called_child_instance_key: None,
        }
    }

    pub fn flow_scope_key(&self) -> Option<Key> {
        self.value.flow_scope_key
    }

    pub fn has_pending_execution_paths(&self) -> bool {
        self.active_children > 0 || self.active_sequence_flows > 0
    }
}

/// A triggered catch event waiting to be consumed by its scope.
#[derive(Debug, Clone, PartialEq)]
pub struct EventTrigger {
    pub event_key: Key,
    pub element_id: String,
    pub variables: Vec<u8>,
    pub interrupting: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementInstanceState {
    instances: JournaledMap<Key, ElementInstance>,
    /// (flow scope, child).
    children: JournaledSet<(Key, Key)>,
    /// (flow scope, joining gateway) → incoming flow → tokens waiting.
    taken_flows: JournaledMap<(Key, String), BTreeMap<String, u32>>,
    event_triggers: JournaledMap<Key, VecDeque<EventTrigger>>,
}

transactional!(ElementInstanceState {
    instances,
    children,
    taken_flows,
    event_triggers,
});

impl ElementInstanceState {
    pub fn get(&self, key: Key) -> Option<&ElementInstance> {
        self.instances.get(&key)
    }

    pub fn require(&self, key: Key) -> EngineResult<&ElementInstance> {
        self.instances
            .get(&key)
            .ok_or(EngineError::ElementInstanceNotFound(key))
    }

    pub(crate) fn require_mut(&mut self, key: Key) -> EngineResult<&mut ElementInstance> {
        self.instances
            .get_mut(&key)
            .ok_or(EngineError::ElementInstanceNotFound(key))
    }

    pub fn contains(&self, key: Key) -> bool {
        self.instances.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Child keys of `scope_key` in ascending key order.
    pub fn child_keys(&self, scope_key: Key) -> Vec<Key> {
        self.children
            .range((scope_key, Key::MIN)..=(scope_key, Key::MAX))
            .map(|(_, child)| *child)
            .collect()
    }

    pub fn children(&self, scope_key: Key) -> impl Iterator<Item = &ElementInstance> {
        self.children
            .range((scope_key, Key::MIN)..=(scope_key, Key::MAX))
            .filter_map(|(_, child)| self.instances.get(child))
    }

    /// All live instances of one process instance, in key order.
    pub fn instances_of(&self, process_instance_key: Key) -> Vec<&ElementInstance> {
        self.instances
            .values()
            .filter(|i| i.value.process_instance_key == process_instance_key)
            .collect()
    }

    pub(crate) fn insert(&mut self, instance: ElementInstance) {
        if let Some(scope) = instance.flow_scope_key() {
            self.children.insert((scope, instance.key));
        }
        self.instances.insert(instance.key, instance);
    }

    pub(crate) fn remove(&mut self, key: Key) -> Option<ElementInstance> {
        let instance = self.instances.remove(&key)?;
        if let Some(scope) = instance.flow_scope_key() {
            self.children.remove(&(scope, key));
        }
        let orphans: Vec<(Key, Key)> = self
            .children
            .range((key, Key::MIN)..=(key, Key::MAX))
            .copied()
            .collect();
        self.children.remove_all(orphans);
        self.event_triggers.remove(&key);
        self.clear_taken_flows(key);
        Some(instance)
    }

    pub(crate) fn increment_children(&mut self, key: Key) -> EngineResult<()> {
        self.require_mut(key)?.active_children += 1;
        Ok(())
    }

    pub(crate) fn decrement_children(&mut self, key: Key) -> EngineResult<()> {
        let instance = self.require_mut(key)?;
        instance.active_children =
            instance
                .active_children
                .checked_sub(1)
                .ok_or(EngineError::CounterUnderflow {
                    key,
                    counter: "active_children",
                })?;
        Ok(())
    }

    pub(crate) fn increment_sequence_flows(&mut self, key: Key) -> EngineResult<()> {
        self.require_mut(key)?.active_sequence_flows += 1;
        Ok(())
    }

    pub(crate) fn decrement_sequence_flows(&mut self, key: Key, count: u32) -> EngineResult<()> {
        let instance = self.require_mut(key)?;
        instance.active_sequence_flows = instance
            .active_sequence_flows
            .checked_sub(count)
            .ok_or(EngineError::CounterUnderflow {
                key,
                counter: "active_sequence_flows",
            })?;
        Ok(())
    }

    // ── Joining gateways ──

    pub(crate) fn add_taken_flow(&mut self, scope_key: Key, gateway_id: &str, flow_id: &str) {
        *self
            .taken_flows
            .get_or_default((scope_key, gateway_id.to_string()))
            .entry(flow_id.to_string())
            .or_default() += 1;
    }

    /// Whether every incoming flow of the gateway holds a token.
    pub fn is_join_satisfied(&self, scope_key: Key, gateway_id: &str, incoming: &[String]) -> bool {
        self.taken_flows
            .get(&(scope_key, gateway_id.to_string()))
            .is_some_and(|taken| {
                incoming
                    .iter()
                    .all(|flow| taken.get(flow).is_some_and(|count| *count > 0))
            })
    }

    /// Removes one token of every incoming flow.
    pub(crate) fn consume_join(&mut self, scope_key: Key, gateway_id: &str, incoming: &[String]) {
        let entry_key = (scope_key, gateway_id.to_string());
        if let Some(taken) = self.taken_flows.get_mut(&entry_key) {
            for flow in incoming {
                if let Some(count) = taken.get_mut(flow) {
                    *count -= 1;
                    if *count == 0 {
                        taken.remove(flow);
                    }
                }
            }
            if taken.is_empty() {
                self.taken_flows.remove(&entry_key);
            }
        }
    }

    pub(crate) fn clear_taken_flows(&mut self, scope_key: Key) {
        let gateways: Vec<(Key, String)> = self
            .taken_flows
            .range((scope_key, String::new())..)
            .take_while(|((scope, _), _)| *scope == scope_key)
            .map(|(entry, _)| entry.clone())
            .collect();
        for entry in gateways {
            self.taken_flows.remove(&entry);
        }
    }

    // ── Event triggers ──

    pub(crate) fn push_trigger(&mut self, scope_key: Key, trigger: EventTrigger) {
        self.event_triggers
            .get_or_default(scope_key)
            .push_back(trigger);
    }

    pub fn peek_trigger(&self, scope_key: Key) -> Option<&EventTrigger> {
        self.event_triggers.get(&scope_key)?.front()
    }

    pub(crate) fn remove_trigger(&mut self, scope_key: Key, event_key: Key) {
        if let Some(queue) = self.event_triggers.get_mut(&scope_key) {
            queue.retain(|t| t.event_key != event_key);
            if queue.is_empty() {
                self.event_triggers.remove(&scope_key);
            }
        }
    }
}

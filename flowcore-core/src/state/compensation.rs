use crate::record::CompensationSubscriptionRecord;
use crate::types::Key;
use super::journal::{transactional, JournaledMap};

/// Completed activities that can still be compensated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompensationSubscriptionState {
    subscriptions: JournaledMap<Key, CompensationSubscriptionRecord>,
}

transactional!(CompensationSubscriptionState { subscriptions });

impl CompensationSubscriptionState {
    pub fn get(&self, key: Key) -> Option<&CompensationSubscriptionRecord> {
        self.subscriptions.get(&key)
    }

    /// Untriggered subscriptions of activities completed in `flow_scope_key`,
    /// most recently completed first.
    pub fn compensable_in(&self, flow_scope_key: Key) -> Vec<(Key, &CompensationSubscriptionRecord)> {
        self.subscriptions
            .iter()
            .rev()
            .filter(|(_, s)| s.flow_scope_key == flow_scope_key && s.throw_event_instance_key.is_none())
            .map(|(key, s)| (*key, s))
            .collect()
    }

    pub fn for_handler_instance(&self, handler_instance_key: Key) -> Option<(Key, &CompensationSubscriptionRecord)> {
        self.subscriptions
            .iter()
            .find(|(_, s)| s.handler_instance_key == Some(handler_instance_key))
            .map(|(key, s)| (*key, s))
    }

    /// Number of handlers a throw event is still waiting for.
    pub fn pending_handlers_of(&self, throw_event_instance_key: Key) -> usize {
        self.subscriptions
            .values()
            .filter(|s| s.throw_event_instance_key == Some(throw_event_instance_key))
            .count()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub(crate) fn put(&mut self, key: Key, record: CompensationSubscriptionRecord) {
        self.subscriptions.insert(key, record);
    }

    pub(crate) fn remove(&mut self, key: Key) {
        self.subscriptions.remove(&key);
    }

    /// Drops the subscriptions of activities that completed inside `scope_key`.
    /// Triggered subscriptions stay until their handler is done.
    pub(crate) fn remove_scope(&mut self, scope_key: Key) {
        self.subscriptions
            .retain(|_, s| s.flow_scope_key != scope_key || s.throw_event_instance_key.is_some());
    }

    pub(crate) fn remove_process_instance(&mut self, process_instance_key: Key) {
        self.subscriptions
            .retain(|_, s| s.process_instance_key != process_instance_key);
    }
}

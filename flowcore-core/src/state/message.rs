use crate::types::{Key, Timestamp};
use super::journal::{transactional, JournaledMap, JournaledSet};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub key: Key,
    pub name: String,
    pub correlation_key: String,
    pub variables: Vec<u8>,
    pub message_id: Option<String>,
    pub deadline: Timestamp,
}

impl StoredMessage {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.deadline <= now
    }
}

/// Buffered messages, their correlations and the start-event correlation
/// locks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageState {
    messages: JournaledMap<Key, StoredMessage>,
    /// (name, correlation key, message key).
    by_name_and_correlation: JournaledSet<(String, String, Key)>,
    deadlines: JournaledSet<(Timestamp, Key)>,
    message_ids: JournaledMap<(String, String), Key>,
    /// (message key, bpmn process id) pairs a message was correlated to.
    correlated: JournaledSet<(Key, String)>,
    /// (bpmn process id, correlation key) → process instance started by it.
    active_process_instances: JournaledMap<(String, String), Key>,
    instance_correlation_keys: JournaledMap<Key, (String, String)>,
}

transactional!(MessageState {
    messages,
    by_name_and_correlation,
    deadlines,
    message_ids,
    correlated,
    active_process_instances,
    instance_correlation_keys,
});

impl MessageState {
    pub fn get(&self, key: Key) -> Option<&StoredMessage> {
        self.messages.get(&key)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn exist_message_id(&self, name: &str, message_id: &str) -> bool {
        self.message_ids
            .contains_key(&(name.to_string(), message_id.to_string()))
    }

    /// Messages with the given name and correlation key, ascending by key.
    pub fn messages_for<'a>(
        &'a self,
        name: &str,
        correlation_key: &str,
    ) -> impl Iterator<Item = &'a StoredMessage> + 'a {
        let (name, correlation_key) = (name.to_string(), correlation_key.to_string());
        self.by_name_and_correlation
            .range((name.clone(), correlation_key.clone(), Key::MIN)..=(name, correlation_key, Key::MAX))
            .filter_map(|(_, _, key)| self.messages.get(key))
    }

    /// Keys of messages whose deadline is at or before `now`, oldest first.
    pub fn expired_before(&self, now: Timestamp, limit: usize) -> Vec<Key> {
        self.deadlines
            .range(..=(now, Key::MAX))
            .take(limit)
            .map(|(_, key)| *key)
            .collect()
    }

    pub fn exist_correlation(&self, message_key: Key, bpmn_process_id: &str) -> bool {
        self.correlated
            .contains(&(message_key, bpmn_process_id.to_string()))
    }

    pub fn exist_active_process_instance(&self, bpmn_process_id: &str, correlation_key: &str) -> bool {
        self.active_process_instances
            .contains_key(&(bpmn_process_id.to_string(), correlation_key.to_string()))
    }

    pub fn active_process_instance(&self, bpmn_process_id: &str, correlation_key: &str) -> Option<Key> {
        self.active_process_instances
            .get(&(bpmn_process_id.to_string(), correlation_key.to_string()))
            .copied()
    }

    /// Correlation key the instance was started with, if it holds a lock.
    pub fn correlation_key_of(&self, process_instance_key: Key) -> Option<&str> {
        self.instance_correlation_keys
            .get(&process_instance_key)
            .map(|(_, correlation_key)| correlation_key.as_str())
    }

    // ── Mutations, applied from events only ──

    pub(crate) fn put(&mut self, message: StoredMessage) {
        let key = message.key;
        self.by_name_and_correlation
            .insert((message.name.clone(), message.correlation_key.clone(), key));
        self.deadlines.insert((message.deadline, key));
        if let Some(id) = message.message_id.as_ref().filter(|id| !id.is_empty()) {
            self.message_ids
                .insert((message.name.clone(), id.clone()), key);
        }
        self.messages.insert(key, message);
    }

    pub(crate) fn remove(&mut self, key: Key) -> Option<StoredMessage> {
        let message = self.messages.remove(&key)?;
        self.by_name_and_correlation
            .remove(&(message.name.clone(), message.correlation_key.clone(), key));
        self.deadlines.remove(&(message.deadline, key));
        if let Some(id) = &message.message_id {
            self.message_ids.remove(&(message.name.clone(), id.clone()));
        }
        let correlations: Vec<(Key, String)> = self
            .correlated
            .range((key, String::new())..)
            .take_while(|(message_key, _)| *message_key == key)
            .cloned()
            .collect();
        self.correlated.remove_all(correlations);
        Some(message)
    }

    pub(crate) fn put_correlation(&mut self, message_key: Key, bpmn_process_id: &str) {
        self.correlated
            .insert((message_key, bpmn_process_id.to_string()));
    }

    pub(crate) fn remove_correlation(&mut self, message_key: Key, bpmn_process_id: &str) {
        self.correlated
            .remove(&(message_key, bpmn_process_id.to_string()));
    }

    pub(crate) fn lock(&mut self, bpmn_process_id: &str, correlation_key: &str, process_instance_key: Key) {
        let entry = (bpmn_process_id.to_string(), correlation_key.to_string());
        self.active_process_instances
            .insert(entry.clone(), process_instance_key);
        self.instance_correlation_keys
            .insert(process_instance_key, entry);
    }

    /// Releases the lock held by `process_instance_key`, if any.
    pub(crate) fn release(&mut self, process_instance_key: Key) {
        if let Some(entry) = self.instance_correlation_keys.remove(&process_instance_key) {
            self.active_process_instances.remove(&entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(key: Key, correlation_key: &str, deadline: Timestamp, id: Option<&str>) -> StoredMessage {
        StoredMessage {
            key,
            name: "orderPaid".to_string(),
            correlation_key: correlation_key.to_string(),
            variables: Vec::new(),
            message_id: id.map(str::to_string),
            deadline,
        }
    }

    #[test]
    fn messages_are_visited_by_ascending_key() {
        let mut state = MessageState::default();
        state.put(message(9, "order-42", 100, None));
        state.put(message(4, "order-42", 100, None));
        state.put(message(6, "order-7", 100, None));
        let keys: Vec<Key> = state.messages_for("orderPaid", "order-42").map(|m| m.key).collect();
        assert_eq!(keys, vec![4, 9]);
    }

    #[test]
    fn removal_drops_ids_and_correlations() {
        let mut state = MessageState::default();
        state.put(message(1, "order-42", 100, Some("m-1")));
        state.put_correlation(1, "payment");
        assert!(state.exist_message_id("orderPaid", "m-1"));
        assert!(state.exist_correlation(1, "payment"));

        state.remove(1);
        assert!(!state.exist_message_id("orderPaid", "m-1"));
        assert!(!state.exist_correlation(1, "payment"));
        assert_eq!(state.messages_for("orderPaid", "order-42").count(), 0);
    }

    #[test]
    fn expiry_is_ordered_by_deadline() {
        let mut state = MessageState::default();
        state.put(message(1, "a", 300, None));
        state.put(message(2, "b", 100, None));
        state.put(message(3, "c", 200, None));
        assert_eq!(state.expired_before(200, 10), vec![2, 3]);
        assert_eq!(state.expired_before(300, 1), vec![2]);
    }

    #[test]
    fn lock_is_released_by_instance() {
        let mut state = MessageState::default();
        state.lock("payment", "order-42", 77);
        assert!(state.exist_active_process_instance("payment", "order-42"));
        assert_eq!(state.correlation_key_of(77), Some("order-42"));

        state.release(77);
        assert!(!state.exist_active_process_instance("payment", "order-42"));
        state.release(77);
    }
}

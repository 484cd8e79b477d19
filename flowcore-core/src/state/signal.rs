use crate::record::SignalSubscriptionRecord;
use crate::types::Key;
use super::journal::{transactional, JournaledMap, JournaledSet};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalSubscriptionState {
    subscriptions: JournaledMap<Key, SignalSubscriptionRecord>,
    by_name: JournaledSet<(String, Key)>,
    /// (catch event instance, subscription).
    by_element: JournaledSet<(Key, Key)>,
}

transactional!(SignalSubscriptionState {
    subscriptions,
    by_name,
    by_element,
});

impl SignalSubscriptionState {
    pub fn get(&self, key: Key) -> Option<&SignalSubscriptionRecord> {
        self.subscriptions.get(&key)
    }

    /// Subscriptions waiting for `signal_name`, ascending by key.
    pub fn subscriptions_for(&self, signal_name: &str) -> Vec<(Key, &SignalSubscriptionRecord)> {
        self.by_name
            .range((signal_name.to_string(), Key::MIN)..=(signal_name.to_string(), Key::MAX))
            .filter_map(|(_, key)| self.subscriptions.get(key).map(|s| (*key, s)))
            .collect()
    }

    pub fn subscriptions_of(&self, element_instance_key: Key) -> Vec<Key> {
        self.by_element
            .range((element_instance_key, Key::MIN)..=(element_instance_key, Key::MAX))
            .map(|(_, key)| *key)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub(crate) fn put(&mut self, key: Key, record: SignalSubscriptionRecord) {
        self.by_name.insert((record.signal_name.clone(), key));
        self.by_element
            .insert((record.catch_event_instance_key, key));
        self.subscriptions.insert(key, record);
    }

    pub(crate) fn remove(&mut self, key: Key) {
        let Some(record) = self.subscriptions.remove(&key) else {
            return;
        };
        self.by_name.remove(&(record.signal_name, key));
        self.by_element
            .remove(&(record.catch_event_instance_key, key));
    }
}

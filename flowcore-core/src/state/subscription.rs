use super::pending::SentTimeIndex;
use crate::record::{
    MessageStartEventSubscriptionRecord, MessageSubscriptionRecord,
    ProcessMessageSubscriptionRecord,
};
use crate::types::{Key, Timestamp};
use super::journal::{transactional, JournaledMap, JournaledSet};

// ── Message side ──

#[derive(Debug, Clone, PartialEq)]
pub struct MessageSubscription {
    pub key: Key,
    pub record: MessageSubscriptionRecord,
    /// A message was handed to the process side and is not acknowledged yet.
    pub correlating: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageSubscriptionState {
    subscriptions: JournaledMap<Key, MessageSubscription>,
    by_element: JournaledMap<(Key, String), Key>,
    /// (message name, correlation key, subscription).
    by_name_and_correlation: JournaledSet<(String, String, Key)>,
    pending: SentTimeIndex,
}

transactional!(MessageSubscriptionState {
    subscriptions,
    by_element,
    by_name_and_correlation,
    pending,
});

impl MessageSubscriptionState {
    pub fn get(&self, key: Key) -> Option<&MessageSubscription> {
        self.subscriptions.get(&key)
    }

    pub fn get_for_element(&self, element_instance_key: Key, message_name: &str) -> Option<&MessageSubscription> {
        self.by_element
            .get(&(element_instance_key, message_name.to_string()))
            .and_then(|key| self.subscriptions.get(key))
    }

    /// Subscriptions waiting for `name`/`correlation_key`, ascending by key.
    pub fn subscriptions_for<'a>(
        &'a self,
        name: &str,
        correlation_key: &str,
    ) -> impl Iterator<Item = &'a MessageSubscription> + 'a {
        let (name, correlation_key) = (name.to_string(), correlation_key.to_string());
        self.by_name_and_correlation
            .range((name.clone(), correlation_key.clone(), Key::MIN)..=(name, correlation_key, Key::MAX))
            .filter_map(|(_, _, key)| self.subscriptions.get(key))
    }

    /// Visits correlating subscriptions last sent before `deadline` in
    /// ascending (sent time, key) order until the visitor returns `false`.
    pub fn visit_subscriptions_before(
        &self,
        deadline: Timestamp,
        mut visitor: impl FnMut(&MessageSubscription) -> bool,
    ) {
        for key in self.pending.before(deadline) {
            if let Some(subscription) = self.subscriptions.get(&key) {
                if !visitor(subscription) {
                    break;
                }
            }
        }
    }

    pub(crate) fn update_sent_time(&mut self, key: Key, sent_time: Timestamp) {
        if self.subscriptions.contains_key(&key) {
            self.pending.update(key, sent_time);
        }
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    // ── Mutations, applied from events only ──

    pub(crate) fn put(&mut self, key: Key, record: MessageSubscriptionRecord) {
        self.by_element
            .insert((record.element_instance_key, record.message_name.clone()), key);
        self.by_name_and_correlation
            .insert((record.message_name.clone(), record.correlation_key.clone(), key));
        self.subscriptions.insert(
            key,
            MessageSubscription {
                key,
                record,
                correlating: false,
            },
        );
    }

    pub(crate) fn update_to_correlating(
        &mut self,
        key: Key,
        message_key: Key,
        variables: Vec<u8>,
        sent_time: Timestamp,
    ) {
        if let Some(subscription) = self.subscriptions.get_mut(&key) {
            subscription.correlating = true;
            subscription.record.message_key = Some(message_key);
            subscription.record.variables = variables;
            self.pending.update(key, sent_time);
        }
    }

    pub(crate) fn reset_correlating(&mut self, key: Key) {
        if let Some(subscription) = self.subscriptions.get_mut(&key) {
            subscription.correlating = false;
            subscription.record.message_key = None;
            subscription.record.variables.clear();
        }
        self.pending.remove(key);
    }

    pub(crate) fn remove(&mut self, key: Key) -> Option<MessageSubscription> {
        let subscription = self.subscriptions.remove(&key)?;
        let record = &subscription.record;
        self.by_element
            .remove(&(record.element_instance_key, record.message_name.clone()));
        self.by_name_and_correlation
            .remove(&(record.message_name.clone(), record.correlation_key.clone(), key));
        self.pending.remove(key);
        Some(subscription)
    }
}

// ── Process side ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Opening,
    Opened,
    Closing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessMessageSubscription {
    pub key: Key,
    pub record: ProcessMessageSubscriptionRecord,
    pub status: SubscriptionStatus,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessMessageSubscriptionState {
    subscriptions: JournaledMap<(Key, String), ProcessMessageSubscription>,
    by_key: JournaledMap<Key, (Key, String)>,
    pending: SentTimeIndex,
}

transactional!(ProcessMessageSubscriptionState {
    subscriptions,
    by_key,
    pending,
});

impl ProcessMessageSubscriptionState {
    pub fn get(&self, element_instance_key: Key, message_name: &str) -> Option<&ProcessMessageSubscription> {
        self.subscriptions
            .get(&(element_instance_key, message_name.to_string()))
    }

    pub fn get_by_key(&self, key: Key) -> Option<&ProcessMessageSubscription> {
        self.by_key
            .get(&key)
            .and_then(|entry| self.subscriptions.get(entry))
    }

    /// Subscriptions opened for one element instance.
    pub fn subscriptions_of(&self, element_instance_key: Key) -> Vec<&ProcessMessageSubscription> {
        self.subscriptions
            .range((element_instance_key, String::new())..)
            .take_while(|((key, _), _)| *key == element_instance_key)
            .map(|(_, subscription)| subscription)
            .collect()
    }

    /// Visits opening and closing subscriptions last sent before `deadline`
    /// in ascending (sent time, key) order until the visitor returns `false`.
    pub fn visit_subscriptions_before(
        &self,
        deadline: Timestamp,
        mut visitor: impl FnMut(&ProcessMessageSubscription) -> bool,
    ) {
        for key in self.pending.before(deadline) {
            if let Some(subscription) = self.get_by_key(key) {
                if !visitor(subscription) {
                    break;
                }
            }
        }
    }

    pub(crate) fn update_sent_time(&mut self, key: Key, sent_time: Timestamp) {
        if self.by_key.contains_key(&key) {
            self.pending.update(key, sent_time);
        }
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    // ── Mutations, applied from events only ──

    pub(crate) fn put_opening(&mut self, key: Key, record: ProcessMessageSubscriptionRecord, sent_time: Timestamp) {
        let entry = (record.element_instance_key, record.message_name.clone());
        self.by_key.insert(key, entry.clone());
        self.subscriptions.insert(
            entry,
            ProcessMessageSubscription {
                key,
                record,
                status: SubscriptionStatus::Opening,
            },
        );
        self.pending.update(key, sent_time);
    }

    pub(crate) fn set_status(
        &mut self,
        element_instance_key: Key,
        message_name: &str,
        status: SubscriptionStatus,
        sent_time: Timestamp,
    ) {
        if let Some(subscription) = self
            .subscriptions
            .get_mut(&(element_instance_key, message_name.to_string()))
        {
            subscription.status = status;
            match status {
                SubscriptionStatus::Opened => self.pending.remove(subscription.key),
                _ => self.pending.update(subscription.key, sent_time),
            }
        }
    }

    pub(crate) fn remove(&mut self, element_instance_key: Key, message_name: &str) -> Option<ProcessMessageSubscription> {
        let subscription = self
            .subscriptions
            .remove(&(element_instance_key, message_name.to_string()))?;
        self.by_key.remove(&subscription.key);
        self.pending.remove(subscription.key);
        Some(subscription)
    }
}

// ── Start events ──

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageStartEventSubscriptionState {
    subscriptions: JournaledMap<Key, MessageStartEventSubscriptionRecord>,
    by_name: JournaledSet<(String, Key)>,
    /// (process definition, subscription).
    by_definition: JournaledSet<(Key, Key)>,
}

transactional!(MessageStartEventSubscriptionState {
    subscriptions,
    by_name,
    by_definition,
});

impl MessageStartEventSubscriptionState {
    pub fn get(&self, key: Key) -> Option<&MessageStartEventSubscriptionRecord> {
        self.subscriptions.get(&key)
    }

    /// Start-event subscriptions for `message_name`, ascending by key.
    pub fn subscriptions_for_message(&self, message_name: &str) -> Vec<(Key, &MessageStartEventSubscriptionRecord)> {
        self.by_name
            .range((message_name.to_string(), Key::MIN)..=(message_name.to_string(), Key::MAX))
            .filter_map(|(_, key)| self.subscriptions.get(key).map(|s| (*key, s)))
            .collect()
    }

    pub fn subscriptions_of_definition(&self, process_definition_key: Key) -> Vec<(Key, &MessageStartEventSubscriptionRecord)> {
        self.by_definition
            .range((process_definition_key, Key::MIN)..=(process_definition_key, Key::MAX))
            .filter_map(|(_, key)| self.subscriptions.get(key).map(|s| (*key, s)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub(crate) fn put(&mut self, key: Key, record: MessageStartEventSubscriptionRecord) {
        self.by_name.insert((record.message_name.clone(), key));
        self.by_definition
            .insert((record.process_definition_key, key));
        self.subscriptions.insert(key, record);
    }

    pub(crate) fn remove(&mut self, key: Key) {
        if let Some(record) = self.subscriptions.remove(&key) {
            self.by_name.remove(&(record.message_name, key));
            self.by_definition
                .remove(&(record.process_definition_key, key));
        }
    }
}

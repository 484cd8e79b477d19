use crate::record::UserTaskRecord;
use crate::types::Key;
use super::journal::{transactional, JournaledMap};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserTaskState {
    tasks: JournaledMap<Key, UserTaskRecord>,
    by_element: JournaledMap<Key, Key>,
}

transactional!(UserTaskState { tasks, by_element });

impl UserTaskState {
    pub fn get(&self, key: Key) -> Option<&UserTaskRecord> {
        self.tasks.get(&key)
    }

    pub fn for_element(&self, element_instance_key: Key) -> Option<Key> {
        self.by_element.get(&element_instance_key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Key, &UserTaskRecord)> {
        self.tasks.iter().map(|(key, task)| (*key, task))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub(crate) fn put(&mut self, key: Key, record: UserTaskRecord) {
        self.by_element.insert(record.element_instance_key, key);
        self.tasks.insert(key, record);
    }

    pub(crate) fn remove(&mut self, key: Key) -> Option<UserTaskRecord> {
        let task = self.tasks.remove(&key)?;
        self.by_element.remove(&task.element_instance_key);
        Some(task)
    }
}

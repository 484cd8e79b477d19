use crate::record::IncidentRecord;
use crate::types::Key;
use super::journal::{transactional, JournaledMap};

/// Active incidents. At most one per element instance and one per job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncidentState {
    incidents: JournaledMap<Key, IncidentRecord>,
    by_element: JournaledMap<Key, Key>,
    by_job: JournaledMap<Key, Key>,
}

transactional!(IncidentState {
    incidents,
    by_element,
    by_job,
});

impl IncidentState {
    pub fn get(&self, key: Key) -> Option<&IncidentRecord> {
        self.incidents.get(&key)
    }

    /// Element incident of `element_instance_key`; job incidents are not included.
    pub fn for_element(&self, element_instance_key: Key) -> Option<Key> {
        self.by_element.get(&element_instance_key).copied()
    }

    pub fn for_job(&self, job_key: Key) -> Option<Key> {
        self.by_job.get(&job_key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Key, &IncidentRecord)> {
        self.incidents.iter().map(|(key, record)| (*key, record))
    }

    pub fn len(&self) -> usize {
        self.incidents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incidents.is_empty()
    }

    pub(crate) fn put(&mut self, key: Key, record: IncidentRecord) {
        match record.job_key {
            Some(job_key) => self.by_job.insert(job_key, key),
            None => self.by_element.insert(record.element_instance_key, key),
        };
        self.incidents.insert(key, record);
    }

    pub(crate) fn remove(&mut self, key: Key) -> Option<IncidentRecord> {
        let record = self.incidents.remove(&key)?;
        match record.job_key {
            Some(job_key) => self.by_job.remove(&job_key),
            None => self.by_element.remove(&record.element_instance_key),
        };
        Some(record)
    }
}

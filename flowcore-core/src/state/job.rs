use crate::record::JobRecord;
use crate::types::Key;
use super::journal::{transactional, JournaledMap};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobState {
    jobs: JournaledMap<Key, JobRecord>,
    by_element: JournaledMap<Key, Key>,
}

transactional!(JobState { jobs, by_element });

impl JobState {
    pub fn get(&self, key: Key) -> Option<&JobRecord> {
        self.jobs.get(&key)
    }

    pub fn for_element(&self, element_instance_key: Key) -> Option<Key> {
        self.by_element.get(&element_instance_key).copied()
    }

    /// Jobs of `job_type` that still have retries left, ascending by key.
    pub fn activatable(&self, job_type: &str) -> Vec<(Key, &JobRecord)> {
        self.jobs
            .iter()
            .filter(|(_, job)| job.job_type == job_type && job.retries > 0)
            .map(|(key, job)| (*key, job))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub(crate) fn put(&mut self, key: Key, record: JobRecord) {
        self.by_element.insert(record.element_instance_key, key);
        self.jobs.insert(key, record);
    }

    pub(crate) fn update(&mut self, key: Key, retries: u32, error_message: Option<String>) {
        if let Some(job) = self.jobs.get_mut(&key) {
            job.retries = retries;
            if error_message.is_some() {
                job.error_message = error_message;
            }
        }
    }

    pub(crate) fn remove(&mut self, key: Key) -> Option<JobRecord> {
        let job = self.jobs.remove(&key)?;
        self.by_element.remove(&job.element_instance_key);
        Some(job)
    }
}

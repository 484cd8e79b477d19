use crate::types::{Key, Timestamp};
use super::journal::{transactional, JournaledMap, JournaledSet};

/// Pending subscription commands ordered by the time they were last sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SentTimeIndex {
    by_time: JournaledSet<(Timestamp, Key)>,
    by_key: JournaledMap<Key, Timestamp>,
}

transactional!(SentTimeIndex { by_time, by_key });

impl SentTimeIndex {
    /// Inserts `key` or moves it to `sent_time`.
    pub fn update(&mut self, key: Key, sent_time: Timestamp) {
        if let Some(previous) = self.by_key.insert(key, sent_time) {
            self.by_time.remove(&(previous, key));
        }
        self.by_time.insert((sent_time, key));
    }

    pub fn remove(&mut self, key: Key) {
        if let Some(previous) = self.by_key.remove(&key) {
            self.by_time.remove(&(previous, key));
        }
    }

    pub fn sent_time(&self, key: Key) -> Option<Timestamp> {
        self.by_key.get(&key).copied()
    }

    pub fn contains(&self, key: Key) -> bool {
        self.by_key.contains_key(&key)
    }

    /// Keys last sent strictly before `deadline`, ascending by (sent time, key).
    pub fn before(&self, deadline: Timestamp) -> Vec<Key> {
        self.by_time
            .range(..(deadline, Key::MIN))
            .map(|(_, key)| *key)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visits_in_sent_time_then_key_order() {
        let mut index = SentTimeIndex::default();
        index.update(5, 100);
        index.update(3, 100);
        index.update(1, 200);
        index.update(9, 50);
        assert_eq!(index.before(150), vec![9, 3, 5]);
        assert_eq!(index.before(50), Vec::<Key>::new());
    }

    #[test]
    fn updating_moves_the_entry() {
        let mut index = SentTimeIndex::default();
        index.update(1, 10);
        index.update(2, 20);
        index.update(1, 30);
        assert_eq!(index.before(25), vec![2]);
        assert_eq!(index.before(31), vec![2, 1]);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn removed_entries_are_not_visited() {
        let mut index = SentTimeIndex::default();
        index.update(1, 10);
        index.remove(1);
        index.remove(42);
        assert!(index.before(100).is_empty());
        assert!(index.is_empty());
    }
}

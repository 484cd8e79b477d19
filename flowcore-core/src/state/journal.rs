//! Ordered collections that can undo their own changes.
//!
//! Every mutation records the entry it replaced. [`Transactional::commit`]
//! forgets those records; [`Transactional::rollback`] replays them
//! backwards, which restores the collection to what it was at the last
//! commit. Reads go straight to the underlying `BTreeMap`/`BTreeSet`
//! through `Deref`; there is no `DerefMut`, so every write is recorded.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Deref;

/// State that is changed by one command at a time and either kept or
/// thrown away as a whole.
pub(crate) trait Transactional {
    fn commit(&mut self);
    fn rollback(&mut self);
}

/// Implements [`Transactional`] for a store by forwarding to its fields.
macro_rules! transactional {
    ($store:ty { $($field:ident),+ $(,)? }) => {
        impl $crate::state::journal::Transactional for $store {
            fn commit(&mut self) {
                $($crate::state::journal::Transactional::commit(&mut self.$field);)+
            }

            fn rollback(&mut self) {
                $($crate::state::journal::Transactional::rollback(&mut self.$field);)+
            }
        }
    };
}
pub(crate) use transactional;

#[derive(Debug, Clone)]
pub(crate) struct JournaledMap<K, V> {
    entries: BTreeMap<K, V>,
    undo: Vec<(K, Option<V>)>,
}

impl<K, V> Default for JournaledMap<K, V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            undo: Vec::new(),
        }
    }
}

impl<K: PartialEq, V: PartialEq> PartialEq for JournaledMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<K, V> Deref for JournaledMap<K, V> {
    type Target = BTreeMap<K, V>;

    fn deref(&self) -> &Self::Target {
        &self.entries
    }
}

impl<K: Ord + Clone, V: Clone> JournaledMap<K, V> {
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let previous = self.entries.insert(key.clone(), value);
        self.undo.push((key, previous.clone()));
        previous
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let (key, previous) = self.entries.remove_entry(key)?;
        self.undo.push((key, Some(previous.clone())));
        Some(previous)
    }

    /// Mutable access to one entry. The entry is recorded whether or not
    /// the caller changes it.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let current = self.entries.get(key)?.clone();
        self.undo.push((key.clone(), Some(current)));
        self.entries.get_mut(key)
    }

    pub fn get_or_default(&mut self, key: K) -> &mut V
    where
        V: Default,
    {
        let previous = self.entries.get(&key).cloned();
        self.undo.push((key.clone(), previous));
        self.entries.entry(key).or_default()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&K, &V) -> bool) {
        let dropped: Vec<K> = self
            .entries
            .iter()
            .filter(|(key, value)| !keep(key, value))
            .map(|(key, _)| key.clone())
            .collect();
        for key in dropped {
            self.remove(&key);
        }
    }
}

impl<K: Ord, V> Transactional for JournaledMap<K, V> {
    fn commit(&mut self) {
        self.undo.clear();
    }

    fn rollback(&mut self) {
        while let Some((key, previous)) = self.undo.pop() {
            match previous {
                Some(value) => {
                    self.entries.insert(key, value);
                }
                None => {
                    self.entries.remove(&key);
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct JournaledSet<T> {
    entries: BTreeSet<T>,
    /// Changed value and whether it was present before the change.
    undo: Vec<(T, bool)>,
}

impl<T> Default for JournaledSet<T> {
    fn default() -> Self {
        Self {
            entries: BTreeSet::new(),
            undo: Vec::new(),
        }
    }
}

impl<T: PartialEq> PartialEq for JournaledSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<T> Deref for JournaledSet<T> {
    type Target = BTreeSet<T>;

    fn deref(&self) -> &Self::Target {
        &self.entries
    }
}

impl<T: Ord + Clone> JournaledSet<T> {
    pub fn insert(&mut self, value: T) -> bool {
        let added = self.entries.insert(value.clone());
        if added {
            self.undo.push((value, false));
        }
        added
    }

    pub fn remove(&mut self, value: &T) -> bool {
        match self.entries.take(value) {
            Some(value) => {
                self.undo.push((value, true));
                true
            }
            None => false,
        }
    }

    /// Removes every value in `values`.
    pub fn remove_all(&mut self, values: Vec<T>) {
        for value in values {
            self.remove(&value);
        }
    }
}

impl<T: Ord> Transactional for JournaledSet<T> {
    fn commit(&mut self) {
        self.undo.clear();
    }

    fn rollback(&mut self) {
        while let Some((value, was_present)) = self.undo.pop() {
            if was_present {
                self.entries.insert(value);
            } else {
                self.entries.remove(&value);
            }
        }
    }
}

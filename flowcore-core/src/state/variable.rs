use crate::document::{self, DocumentError};
use crate::types::Key;
use serde_json::{Map, Value};
use super::journal::{transactional, JournaledMap};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct VariableInstance {
    pub key: Key,
    /// MessagePack value.
    pub value: Vec<u8>,
}

/// Variables keyed by (scope, name), plus the scope tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableState {
    parents: JournaledMap<Key, Option<Key>>,
    variables: JournaledMap<(Key, String), VariableInstance>,
}

transactional!(VariableState { parents, variables });

impl VariableState {
    pub fn get_local(&self, scope_key: Key, name: &str) -> Option<&VariableInstance> {
        self.variables.get(&(scope_key, name.to_string()))
    }

    pub fn parent_of(&self, scope_key: Key) -> Option<Key> {
        self.parents.get(&scope_key).copied().flatten()
    }

    /// `scope_key` followed by its ancestors, nearest first.
    pub fn scope_chain(&self, scope_key: Key) -> Vec<Key> {
        let mut chain = vec![scope_key];
        let mut current = scope_key;
        while let Some(parent) = self.parent_of(current) {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// Nearest definition of `name` walking up from `scope_key`, with the
    /// scope it was found in.
    pub fn get_visible(&self, scope_key: Key, name: &str) -> Option<(Key, &VariableInstance)> {
        self.scope_chain(scope_key)
            .into_iter()
            .find_map(|scope| self.get_local(scope, name).map(|v| (scope, v)))
    }

    pub fn local_variables(&self, scope_key: Key) -> impl Iterator<Item = (&str, &VariableInstance)> {
        self.variables
            .range((scope_key, String::new())..)
            .take_while(move |((scope, _), _)| *scope == scope_key)
            .map(|((_, name), variable)| (name.as_str(), variable))
    }

    /// Encoded document of the local variables of `scope_key`.
    pub fn local_document(&self, scope_key: Key) -> Result<Vec<u8>, DocumentError> {
        let fields: Vec<(&str, &[u8])> = self
            .local_variables(scope_key)
            .map(|(name, v)| (name, v.value.as_slice()))
            .collect();
        document::write_document(&fields)
    }

    /// Encoded document of every variable visible from `scope_key`,
    /// optionally restricted to `filter`.
    pub fn visible_document(
        &self,
        scope_key: Key,
        filter: Option<&[&str]>,
    ) -> Result<Vec<u8>, DocumentError> {
        let visible = self.visible_values(scope_key, filter);
        let fields: Vec<(&str, &[u8])> = visible
            .iter()
            .map(|(name, value)| (*name, value.as_slice()))
            .collect();
        document::write_document(&fields)
    }

    /// Decoded view of every variable visible from `scope_key`.
    pub fn visible_json(&self, scope_key: Key) -> Result<Map<String, Value>, DocumentError> {
        self.visible_values(scope_key, None)
            .into_iter()
            .map(|(name, value)| document::decode(value).map(|v| (name.to_string(), v)))
            .collect()
    }

    fn visible_values(&self, scope_key: Key, filter: Option<&[&str]>) -> BTreeMap<&str, &Vec<u8>> {
        let mut visible: BTreeMap<&str, &Vec<u8>> = BTreeMap::new();
        for scope in self.scope_chain(scope_key) {
            for (name, variable) in self.local_variables(scope) {
                if filter.is_some_and(|names| !names.contains(&name)) {
                    continue;
                }
                visible.entry(name).or_insert(&variable.value);
            }
        }
        visible
    }

    // ── Mutations, applied from events only ──

    pub(crate) fn create_scope(&mut self, scope_key: Key, parent: Option<Key>) {
        self.parents.insert(scope_key, parent);
    }

    pub(crate) fn remove_scope(&mut self, scope_key: Key) {
        self.parents.remove(&scope_key);
        let names: Vec<String> = self
            .local_variables(scope_key)
            .map(|(name, _)| name.to_string())
            .collect();
        for name in names {
            self.variables.remove(&(scope_key, name));
        }
    }

    pub(crate) fn set_variable(&mut self, key: Key, scope_key: Key, name: &str, value: Vec<u8>) {
        self.variables
            .insert((scope_key, name.to_string()), VariableInstance { key, value });
    }
}

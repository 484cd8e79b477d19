use crate::types::ElementType;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElementAction {
    Activated,
    Completed,
    Terminated,
}

/// Per element type lifecycle counters. Only committed commands count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineMetrics {
    counters: BTreeMap<(ElementType, ElementAction), u64>,
}

impl EngineMetrics {
    pub fn increment(&mut self, element_type: ElementType, action: ElementAction) {
        *self.counters.entry((element_type, action)).or_default() += 1;
    }

    pub fn count(&self, element_type: ElementType, action: ElementAction) -> u64 {
        self.counters
            .get(&(element_type, action))
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self, action: ElementAction) -> u64 {
        self.counters
            .iter()
            .filter(|((_, a), _)| *a == action)
            .map(|(_, count)| count)
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ElementType, ElementAction, u64)> + '_ {
        self.counters
            .iter()
            .map(|((element_type, action), count)| (*element_type, *action, *count))
    }
}

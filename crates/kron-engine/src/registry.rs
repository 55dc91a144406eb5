//! In-memory mapping from template name to its live trigger.
//!
//! There is no locking here: the registry is owned by the
//! [`ReconciliationEngine`](crate::ReconciliationEngine), which is its only
//! writer.

use std::collections::HashMap;

use crate::trigger::TriggerId;

#[derive(Debug, Default)]
pub struct ScheduleRegistry {
    entries: HashMap<String, TriggerId>,
}

impl ScheduleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, template: &str) -> Option<TriggerId> {
        self.entries.get(template).copied()
    }

    /// Records `trigger` for `template`, returning the entry it replaced.
    pub fn insert(&mut self, template: impl Into<String>, trigger: TriggerId) -> Option<TriggerId> {
        self.entries.insert(template.into(), trigger)
    }

    /// Drops the entry for `template`, if any.
    pub fn remove(&mut self, template: &str) -> Option<TriggerId> {
        self.entries.remove(template)
    }

    #[must_use]
    pub fn contains(&self, template: &str) -> bool {
        self.entries.contains_key(template)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered template names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_and_returns_previous() {
        let mut registry = ScheduleRegistry::new();
        let first = TriggerId::new_v4();
        let second = TriggerId::new_v4();

        assert_eq!(registry.insert("t1", first), None);
        assert_eq!(registry.insert("t1", second), Some(first));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("t1"), Some(second));
    }

    #[test]
    fn remove_unknown_is_noop() {
        let mut registry = ScheduleRegistry::new();
        assert_eq!(registry.remove("missing"), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn names_are_sorted() {
        let mut registry = ScheduleRegistry::new();
        registry.insert("b", TriggerId::new_v4());
        registry.insert("a", TriggerId::new_v4());
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
    }
}

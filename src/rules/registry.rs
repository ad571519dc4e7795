//! Rule registry - the active rule set in evaluation order

use chrono::{DateTime, Utc};

use super::AdaptationRule;
use crate::{Error, Result};

#[derive(Debug, Clone)]
struct Entry {
    sequence: u64,
    rule: AdaptationRule,
}

/// Prioritised rule set.
///
/// Evaluation order is ascending priority, ties broken by registration
/// order. Re-registering a name replaces the definition but keeps the
/// original registration slot.
#[derive(Debug, Default)]
pub struct RuleRegistry {
    entries: Vec<Entry>,
    next_sequence: u64,
}

impl RuleRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no rules are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add or replace a rule. Returns the replaced definition, if any.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the rule has an empty name or its
    /// ID is already held by a rule with a different name.
    pub fn register(&mut self, rule: AdaptationRule) -> Result<Option<AdaptationRule>> {
        if rule.name.is_empty() {
            return Err(Error::Configuration("rule name must not be empty".to_string()));
        }
        if let Some(holder) = self.iter().find(|r| r.id == rule.id && r.name != rule.name) {
            return Err(Error::Configuration(format!(
                "rule id '{}' is already used by rule '{}'",
                rule.id, holder.name
            )));
        }
        let replaced = match self.entries.iter_mut().find(|e| e.rule.name == rule.name) {
            Some(entry) => Some(std::mem::replace(&mut entry.rule, rule)),
            None => {
                self.entries.push(Entry {
                    sequence: self.next_sequence,
                    rule,
                });
                self.next_sequence += 1;
                None
            }
        };
        // Priority may have changed on replacement
        self.entries.sort_by_key(|e| (e.rule.priority, e.sequence));
        Ok(replaced)
    }

    /// Remove a rule by name. Absent names are a no-op returning `None`.
    pub fn unregister(&mut self, name: &str) -> Option<AdaptationRule> {
        let index = self.entries.iter().position(|e| e.rule.name == name)?;
        Some(self.entries.remove(index).rule)
    }

    /// Look up a rule by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AdaptationRule> {
        self.entries.iter().map(|e| &e.rule).find(|r| r.name == name)
    }

    /// Look up a rule by ID.
    #[must_use]
    pub fn get_by_id(&self, id: &str) -> Option<&AdaptationRule> {
        self.entries.iter().map(|e| &e.rule).find(|r| r.id == id)
    }

    /// Enable or disable a rule.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown names.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.rule.name == name)
            .ok_or_else(|| Error::not_found("rule", name))?;
        entry.rule.enabled = enabled;
        Ok(())
    }

    /// Record that a rule fired. Unknown names (unregistered mid-pass) are ignored.
    pub fn mark_triggered(&mut self, name: &str, at: DateTime<Utc>) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.rule.name == name) {
            entry.rule.last_triggered = Some(at);
        }
    }

    /// All rules in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = &AdaptationRule> {
        self.entries.iter().map(|e| &e.rule)
    }

    /// Enabled rules in evaluation order, cloned for a pass.
    #[must_use]
    pub fn enabled(&self) -> Vec<AdaptationRule> {
        self.iter().filter(|r| r.enabled).cloned().collect()
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::{Euid, InternalRef};

/// A concrete object materialized from exactly one template. The parent
/// template reference is recorded at creation and never changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// Process-unique internal identifier, used for joins only.
    pub internal: InternalRef,
    /// Immutable externally-visible identifier, assigned by the store.
    pub euid: Euid,
    /// Polymorphic discriminator, e.g. `container_instance`.
    pub discriminator: String,
    /// Internal reference of the parent template.
    pub template: InternalRef,
    /// Template code, denormalized for filtering and display.
    pub template_code: String,
    pub status: String,
    /// Mutable property bag: JSON-like, schema-guided but not enforced.
    pub properties: HashMap<String, serde_json::Value>,
    pub is_deleted: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

impl Instance {
    /// Replace the property bag wholesale with `merged` and refresh the
    /// update attribution. The caller computes the merge so that audit
    /// rows can be emitted per changed key in the same transaction.
    pub fn replace_properties(
        &mut self,
        merged: HashMap<String, serde_json::Value>,
        actor_id: &str,
    ) {
        self.properties = merged;
        self.updated_by = actor_id.to_string();
        self.updated_at = Utc::now();
    }
}

/// Input model for instance creation. The EUID is set server-side; the
/// optional `euid` field exists only so a caller-supplied value can be
/// rejected rather than silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInstance {
    /// Template code of the parent template, e.g.
    /// `container/plate/fixed-plate-96/1.0/`.
    pub template: String,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub euid: Option<String>,
}

impl NewInstance {
    pub fn from_template_code(code: impl Into<String>) -> Self {
        Self {
            template: code.into(),
            properties: HashMap::new(),
            status: None,
            euid: None,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

/// Partial update of the property bag. A key mapped to JSON `null`
/// removes it from the bag; any other value inserts or replaces.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyDiff(pub HashMap<String, serde_json::Value>);

impl PropertyDiff {
    /// Merge the diff over `current`, returning the replacement map and
    /// the (key, old, new) changes actually applied. Setting a key to a
    /// value it already holds produces no change entry.
    pub fn merge_over(
        &self,
        current: &HashMap<String, serde_json::Value>,
    ) -> (HashMap<String, serde_json::Value>, Vec<PropertyChange>) {
        let mut merged = current.clone();
        let mut changes = Vec::new();
        for (key, value) in &self.0 {
            let old = current.get(key).cloned();
            if value.is_null() {
                if old.is_some() {
                    merged.remove(key);
                    changes.push(PropertyChange {
                        key: key.clone(),
                        old,
                        new: None,
                    });
                }
            } else if old.as_ref() != Some(value) {
                merged.insert(key.clone(), value.clone());
                changes.push(PropertyChange {
                    key: key.clone(),
                    old,
                    new: Some(value.clone()),
                });
            }
        }
        changes.sort_by(|a, b| a.key.cmp(&b.key));
        (merged, changes)
    }
}

/// One applied property-bag change, feeding the audit recorder.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    pub key: String,
    pub old: Option<serde_json::Value>,
    pub new: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bag(pairs: &[(&str, serde_json::Value)]) -> HashMap<String, serde_json::Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn merge_applies_only_the_diff() {
        let current = bag(&[("color", json!("red")), ("volume", json!(50))]);
        let diff = PropertyDiff(bag(&[("volume", json!(75)), ("label", json!("rack A"))]));

        let (merged, changes) = diff.merge_over(&current);
        assert_eq!(merged, bag(&[
            ("color", json!("red")),
            ("volume", json!(75)),
            ("label", json!("rack A")),
        ]));
        assert_eq!(changes.len(), 2);
    }

    #[test]
    fn null_removes_a_key() {
        let current = bag(&[("color", json!("red"))]);
        let diff = PropertyDiff(bag(&[("color", serde_json::Value::Null)]));

        let (merged, changes) = diff.merge_over(&current);
        assert!(merged.is_empty());
        assert_eq!(changes[0].old, Some(json!("red")));
        assert_eq!(changes[0].new, None);
    }

    #[test]
    fn unchanged_value_emits_no_change() {
        let current = bag(&[("color", json!("red"))]);
        let diff = PropertyDiff(bag(&[("color", json!("red"))]));

        let (merged, changes) = diff.merge_over(&current);
        assert_eq!(merged, current);
        assert!(changes.is_empty());
    }
}

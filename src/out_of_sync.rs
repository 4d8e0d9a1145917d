//! Out-of-sync ledger
//!
//! Records, per node, the shared fields whose value on that node's fragment
//! disagreed with the aggregate chosen during merge. Only merge writes to it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::model::NodeId;

/// Shared entity fields checked for drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharedField {
    Name,
    Info,
    Triggers,
    Flags,
    Validity,
    Enabled,
}

/// Divergent values reported by one node, keyed by field.
///
/// Values are the node's own, `Value::Null` when the node has none.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutOfSyncRecord(BTreeMap<SharedField, Value>);

impl OutOfSyncRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: SharedField, value: Value) {
        self.0.insert(field, value);
    }

    pub fn with(mut self, field: SharedField, value: Value) -> Self {
        self.insert(field, value);
        self
    }

    pub fn get(&self, field: SharedField) -> Option<&Value> {
        self.0.get(&field)
    }

    pub fn fields(&self) -> impl Iterator<Item = SharedField> + '_ {
        self.0.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    fn absorb(&mut self, other: OutOfSyncRecord) {
        self.0.extend(other.0);
    }
}

/// Per-entity, per-node drift ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutOfSyncLedger(BTreeMap<NodeId, OutOfSyncRecord>);

impl OutOfSyncLedger {
    /// Record drift for `node_id`, merging with anything already recorded.
    /// Empty records are ignored.
    pub fn add(&mut self, node_id: &str, record: OutOfSyncRecord) {
        if record.is_empty() {
            return;
        }
        self.0.entry(node_id.to_string()).or_default().absorb(record);
    }

    pub fn get(&self, node_id: &str) -> Option<&OutOfSyncRecord> {
        self.0.get(node_id)
    }

    pub fn remove(&mut self, node_id: &str) -> Option<OutOfSyncRecord> {
        self.0.remove(node_id)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OutOfSyncRecord)> + '_ {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_add_merges_fields_per_node() {
        let mut ledger = OutOfSyncLedger::default();
        ledger.add("n2", OutOfSyncRecord::new().with(SharedField::Name, json!("Evening Lights")));
        ledger.add("n2", OutOfSyncRecord::new().with(SharedField::Flags, json!(3)));
        ledger.add("n3", OutOfSyncRecord::new());

        assert_eq!(ledger.len(), 1);
        let record = ledger.get("n2").unwrap();
        assert_eq!(record.get(SharedField::Name), Some(&json!("Evening Lights")));
        assert_eq!(record.get(SharedField::Flags), Some(&json!(3)));
        assert!(ledger.get("n3").is_none());
    }

    #[test]
    fn test_remove_and_clear() {
        let mut ledger = OutOfSyncLedger::default();
        ledger.add("n1", OutOfSyncRecord::new().with(SharedField::Info, Value::Null));
        ledger.add("n2", OutOfSyncRecord::new().with(SharedField::Enabled, json!(false)));

        assert!(ledger.remove("n1").is_some());
        assert_eq!(ledger.nodes().collect::<Vec<_>>(), vec!["n2"]);

        ledger.clear();
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_record_serializes_with_field_names() {
        let record = OutOfSyncRecord::new().with(SharedField::Name, json!("Evening Lights"));
        assert_eq!(serde_json::to_value(&record).unwrap(), json!({"name": "Evening Lights"}));
    }
}

//! Node registry
//!
//! Cached per-node device/service configuration. Raw fragments for an
//! entity kind sit in the parameter whose service and parameter types match
//! that kind's [`ServiceIdentifiers`]. Insertion order is merge order.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::config::ServiceIdentifiers;
use crate::error::Result;
use crate::model::NodeId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamRecord {
    pub name: String,
    #[serde(rename = "type", default)]
    pub param_type: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub name: String,
    #[serde(rename = "type", default)]
    pub service_type: String,
    #[serde(default)]
    pub params: Vec<ParamRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    #[serde(default)]
    pub services: Vec<ServiceRecord>,
}

impl NodeRecord {
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            services: Vec::new(),
        }
    }

    /// Node carrying one fragment parameter for `ids`.
    pub fn with_fragments(id: impl Into<NodeId>, ids: &ServiceIdentifiers, fragments: Vec<Value>) -> Self {
        let mut node = Self::new(id);
        node.services.push(ServiceRecord {
            name: ids.service_name.clone(),
            service_type: ids.service_type.clone(),
            params: vec![ParamRecord {
                name: ids.param_name.clone(),
                param_type: ids.param_type.clone(),
                value: Value::Array(fragments),
            }],
        });
        node
    }

    fn param(&self, ids: &ServiceIdentifiers) -> Option<&ParamRecord> {
        self.services
            .iter()
            .filter(|s| s.service_type == ids.service_type)
            .flat_map(|s| s.params.iter())
            .find(|p| p.param_type == ids.param_type)
    }

    fn param_mut(&mut self, ids: &ServiceIdentifiers) -> Option<&mut ParamRecord> {
        self.services
            .iter_mut()
            .filter(|s| s.service_type == ids.service_type)
            .flat_map(|s| s.params.iter_mut())
            .find(|p| p.param_type == ids.param_type)
    }
}

/// Ordered set of node records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeRegistry {
    nodes: Vec<NodeRecord>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON array of node records.
    pub fn from_json(json: &str) -> Result<Self> {
        let nodes: Vec<NodeRecord> = serde_json::from_str(json)?;
        let mut registry = Self::new();
        for node in nodes {
            registry.upsert(node);
        }
        Ok(registry)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Insert a node, or replace it in place keeping its position.
    pub fn upsert(&mut self, node: NodeRecord) {
        match self.nodes.iter_mut().find(|n| n.id == node.id) {
            Some(existing) => *existing = node,
            None => self.nodes.push(node),
        }
    }

    pub fn remove(&mut self, node_id: &str) -> Option<NodeRecord> {
        let idx = self.nodes.iter().position(|n| n.id == node_id)?;
        Some(self.nodes.remove(idx))
    }

    pub fn get(&self, node_id: &str) -> Option<&NodeRecord> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Raw fragment array of `node_id` for the given kind, if the node has
    /// the service.
    pub fn fragments(&self, node_id: &str, ids: &ServiceIdentifiers) -> Option<&Vec<Value>> {
        self.get(node_id)?.param(ids)?.value.as_array()
    }

    /// Mutable raw fragment array; a null parameter value becomes empty.
    pub fn fragments_mut(&mut self, node_id: &str, ids: &ServiceIdentifiers) -> Option<&mut Vec<Value>> {
        let param = self
            .nodes
            .iter_mut()
            .find(|n| n.id == node_id)?
            .param_mut(ids)?;
        if param.value.is_null() {
            param.value = Value::Array(Vec::new());
        }
        param.value.as_array_mut()
    }

    /// Merge input: `(node id, raw fragments)` per node that has the
    /// service, in registry order or in the order of `only`.
    pub fn collect_fragments(&self, ids: &ServiceIdentifiers, only: Option<&[NodeId]>) -> Vec<(NodeId, Vec<Value>)> {
        let order = match only {
            Some(list) => list.to_vec(),
            None => self.node_ids(),
        };
        order
            .into_iter()
            .filter_map(|id| {
                let fragments = self.fragments(&id, ids)?.clone();
                Some((id, fragments))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServicesConfig;
    use serde_json::json;

    fn schedules() -> ServiceIdentifiers {
        ServicesConfig::default().schedules
    }

    #[test]
    fn test_upsert_keeps_position() {
        let mut registry = NodeRegistry::new();
        registry.upsert(NodeRecord::new("n1"));
        registry.upsert(NodeRecord::new("n2"));
        registry.upsert(NodeRecord::with_fragments("n1", &schedules(), vec![]));

        assert_eq!(registry.node_ids(), vec!["n1", "n2"]);
        assert!(registry.fragments("n1", &schedules()).is_some());
        assert!(registry.fragments("n2", &schedules()).is_none());
    }

    #[test]
    fn test_fragments_found_by_type_pair() {
        let json = json!([{
            "id": "n1",
            "services": [
                {"name": "Light", "type": "esp.service.lightbulb", "params": []},
                {"name": "Schedule", "type": "esp.service.schedule", "params": [
                    {"name": "Schedules", "type": "esp.param.schedules", "value": [{"id": "s1"}]}
                ]}
            ]
        }]);
        let registry = NodeRegistry::from_json(&json.to_string()).unwrap();

        let fragments = registry.fragments("n1", &schedules()).unwrap();
        assert_eq!(fragments, &vec![json!({"id": "s1"})]);
        assert!(registry.fragments("n1", &ServicesConfig::default().scenes).is_none());
    }

    #[test]
    fn test_fragments_mut_initializes_null_value() {
        let mut node = NodeRecord::with_fragments("n1", &schedules(), vec![]);
        node.services[0].params[0].value = Value::Null;
        let mut registry = NodeRegistry::new();
        registry.upsert(node);

        registry.fragments_mut("n1", &schedules()).unwrap().push(json!({"id": "s1"}));
        assert_eq!(registry.fragments("n1", &schedules()).unwrap().len(), 1);
    }

    #[test]
    fn test_collect_fragments_order() {
        let mut registry = NodeRegistry::new();
        registry.upsert(NodeRecord::with_fragments("n1", &schedules(), vec![json!({"id": "a"})]));
        registry.upsert(NodeRecord::with_fragments("n2", &schedules(), vec![json!({"id": "b"})]));
        registry.upsert(NodeRecord::new("n3"));

        let all = registry.collect_fragments(&schedules(), None);
        assert_eq!(all.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>(), vec!["n1", "n2"]);

        let only = registry.collect_fragments(&schedules(), Some(&["n2".to_string(), "n1".to_string(), "n9".to_string()]));
        assert_eq!(only.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>(), vec!["n2", "n1"]);
    }

    #[test]
    fn test_remove() {
        let mut registry = NodeRegistry::new();
        registry.upsert(NodeRecord::new("n1"));
        assert!(registry.remove("n1").is_some());
        assert!(registry.remove("n1").is_none());
        assert!(registry.is_empty());
    }
}

//! Payload generation
//!
//! Turns one node's classified operation into a node-addressed message:
//!
//! ```json
//! {"node_id": "n1", "payload": {"Schedule": {"Schedules": [{"id": "s1", "operation": "add", ...}]}}}
//! ```
//!
//! Optional fields that are absent (`None`) are left out so they do not
//! overwrite what the device already stores. Present falsy values such as
//! `0` or an empty trigger list are sent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ServiceIdentifiers;
use crate::error::{Result, ShardError};
use crate::model::{Trigger, Validity};
use crate::operation::Operation;

/// Shared fields an add/edit message may carry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayloadFields {
    pub name: Option<String>,
    pub info: Option<String>,
    pub triggers: Option<Vec<Trigger>>,
    pub flags: Option<u32>,
    pub validity: Option<Validity>,
}

/// One entry of the parameter array sent to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadEntry {
    pub id: String,
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggers: Option<Vec<Trigger>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validity: Option<Validity>,
}

/// Node-addressed wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePayload {
    pub node_id: String,
    pub payload: Value,
}

impl NodePayload {
    /// Wrap one entry under the service/parameter names.
    pub fn wrap(node_id: &str, ids: &ServiceIdentifiers, entry: &PayloadEntry) -> Result<Self> {
        let mut param = Map::new();
        param.insert(ids.param_name.clone(), Value::Array(vec![serde_json::to_value(entry)?]));
        let mut service = Map::new();
        service.insert(ids.service_name.clone(), Value::Object(param));

        Ok(Self {
            node_id: node_id.to_string(),
            payload: Value::Object(service),
        })
    }

    /// The entries addressed under the given service/parameter names.
    pub fn entries(&self, ids: &ServiceIdentifiers) -> Vec<PayloadEntry> {
        self.payload
            .get(&ids.service_name)
            .and_then(|service| service.get(&ids.param_name))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Build the entry for one node.
pub fn generate_entry(
    operation: Operation,
    entity_id: &str,
    node_id: &str,
    fields: &PayloadFields,
    action: Option<&Value>,
) -> Result<PayloadEntry> {
    if node_id.is_empty() {
        return Err(ShardError::MissingNodeId(entity_id.to_string()));
    }
    let tag = operation
        .wire_tag()
        .ok_or_else(|| ShardError::UnknownOperation(operation.to_string()))?;

    let mut entry = PayloadEntry {
        id: entity_id.to_string(),
        operation: tag.to_string(),
        name: None,
        info: None,
        action: None,
        triggers: None,
        flags: None,
        validity: None,
    };

    if operation.carries_body() {
        let action = action.ok_or_else(|| ShardError::MissingAction {
            entity_id: entity_id.to_string(),
            node_id: node_id.to_string(),
        })?;
        entry.name = fields.name.clone();
        entry.info = fields.info.clone();
        entry.action = Some(action.clone());
        entry.triggers = fields.triggers.clone();
        entry.flags = fields.flags;
        entry.validity = fields.validity.clone();
    }

    Ok(entry)
}

/// Build the node-addressed message for one node.
pub fn generate_payload(
    ids: &ServiceIdentifiers,
    operation: Operation,
    entity_id: &str,
    node_id: &str,
    fields: &PayloadFields,
    action: Option<&Value>,
) -> Result<NodePayload> {
    let entry = generate_entry(operation, entity_id, node_id, fields, action)?;
    NodePayload::wrap(node_id, ids, &entry)
}

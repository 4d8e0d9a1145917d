//! Automations
//!
//! Automations live in the cloud rather than on nodes, so they are never
//! merged from fragments. Their actions still address devices per node.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, ShardError};

use super::{device_count, ActionMap, EntityKind, NodeId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Automation {
    pub id: String,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Conditions that fire the automation; opaque device-parameter trees
    #[serde(default)]
    pub events: Vec<Value>,
    /// How `events` combine ("and" / "or")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_operator: Option<String>,
    #[serde(default)]
    pub actions: ActionMap,
    #[serde(default)]
    pub nodes: Vec<NodeId>,
    #[serde(default)]
    pub devices_count: usize,
}

fn default_enabled() -> bool {
    true
}

impl Automation {
    /// Replace the action map; `nodes` and `devices_count` follow it.
    pub fn set_actions(&mut self, actions: ActionMap) {
        self.nodes = actions.keys().cloned().collect();
        self.actions = actions;
        self.recount();
    }

    pub fn recount(&mut self) {
        self.devices_count = self.actions.values().map(device_count).sum();
    }

    pub fn from_draft(draft: AutomationDraft) -> Result<Self> {
        if draft.name.trim().is_empty() {
            return Err(ShardError::Validation("automation name is required".into()));
        }
        if draft.actions.is_empty() {
            return Err(ShardError::Validation(
                "automation actions must target at least one node".into(),
            ));
        }

        let mut automation = Self {
            id: draft.id.unwrap_or_else(|| EntityKind::Automation.generate_id()),
            name: draft.name,
            enabled: draft.enabled,
            events: draft.events,
            event_operator: draft.event_operator,
            actions: ActionMap::new(),
            nodes: Vec::new(),
            devices_count: 0,
        };
        automation.set_actions(draft.actions);
        Ok(automation)
    }

    /// Full request body for a create call.
    pub fn to_patch(&self) -> AutomationPatch {
        AutomationPatch {
            name: Some(self.name.clone()),
            enabled: Some(self.enabled),
            events: Some(self.events.clone()),
            event_operator: self.event_operator.clone(),
            actions: Some(self.actions.clone()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutomationDraft {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub events: Vec<Value>,
    #[serde(default)]
    pub event_operator: Option<String>,
    #[serde(default)]
    pub actions: ActionMap,
}

/// Sparse update body sent to the automation API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutomationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<ActionMap>,
}

impl AutomationPatch {
    /// Write the present fields into `automation`.
    pub fn apply(&self, automation: &mut Automation) {
        if let Some(name) = &self.name {
            automation.name = name.clone();
        }
        if let Some(enabled) = self.enabled {
            automation.enabled = enabled;
        }
        if let Some(events) = &self.events {
            automation.events = events.clone();
        }
        if let Some(op) = &self.event_operator {
            automation.event_operator = Some(op.clone());
        }
        if let Some(actions) = &self.actions {
            automation.set_actions(actions.clone());
        }
    }
}

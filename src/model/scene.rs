//! Scenes
//!
//! A scene is a named set of device states applied on activation. Each node
//! stores the scene's name and info plus the states for its own devices.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, ShardError};
use crate::intent;
use crate::operation::Operation;
use crate::out_of_sync::{OutOfSyncRecord, SharedField};
use crate::payload::PayloadFields;

use super::{as_value, draft_order, ActionMap, EntityKind, NodeId, Origin, RawFragment, ShardedEntity, Shards};

#[derive(Debug, Clone, Deserialize)]
pub struct SceneFragment {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub info: Option<String>,
    #[serde(default)]
    pub action: Value,
}

impl RawFragment for SceneFragment {
    fn id(&self) -> &str {
        &self.id
    }

    fn action(&self) -> &Value {
        &self.action
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scene {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(flatten)]
    pub shards: Shards,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SceneDraft {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub info: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeId>,
    #[serde(default)]
    pub action: ActionMap,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SceneEdit {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "actions")]
    pub action: Option<ActionMap>,
    #[serde(default)]
    pub info: Option<String>,
}

impl SceneEdit {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_action(mut self, action: ActionMap) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }
}

impl ShardedEntity for Scene {
    type Fragment = SceneFragment;
    type Draft = SceneDraft;
    type Edit = SceneEdit;

    const KIND: EntityKind = EntityKind::Scene;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn shards(&self) -> &Shards {
        &self.shards
    }

    fn shards_mut(&mut self) -> &mut Shards {
        &mut self.shards
    }

    fn from_draft(draft: SceneDraft) -> Result<Self> {
        if draft.name.trim().is_empty() {
            return Err(ShardError::Validation("scene name is required".into()));
        }
        if draft.action.is_empty() {
            return Err(ShardError::Validation("scene action must target at least one node".into()));
        }

        let order = draft_order(&draft.nodes, &draft.action);
        let mut shards = Shards::from_action(&order, draft.action);
        shards.origin = Origin::Local;

        Ok(Self {
            id: draft.id.unwrap_or_else(|| EntityKind::Scene.generate_id()),
            name: draft.name,
            info: draft.info,
            shards,
        })
    }

    fn seed(node_id: &str, fragment: SceneFragment) -> Self {
        Self {
            shards: Shards::seeded(node_id, fragment.action),
            id: fragment.id,
            name: fragment.name,
            info: fragment.info,
        }
    }

    fn sync_check(&self, fragment: &SceneFragment) -> OutOfSyncRecord {
        let mut record = OutOfSyncRecord::new();
        if fragment.name != self.name {
            record.insert(SharedField::Name, as_value(&fragment.name));
        }
        if fragment.info != self.info {
            record.insert(SharedField::Info, as_value(&fragment.info));
        }
        record
    }

    fn proposed_action(&self, edit: &SceneEdit) -> ActionMap {
        edit.action.clone().unwrap_or_else(|| self.shards.action.clone())
    }

    fn resolve_intent(&self, node_id: &str, _edit: &SceneEdit, proposed: &ActionMap) -> Operation {
        intent::resolve_scene(node_id, &self.shards.action, proposed)
    }

    fn validate_edit(&self, edit: &SceneEdit) -> Result<()> {
        if edit.name.as_ref().is_some_and(|n| n.trim().is_empty()) {
            return Err(ShardError::Validation("scene name is required".into()));
        }
        Ok(())
    }

    fn apply_edit(&mut self, edit: &SceneEdit) {
        if let Some(name) = &edit.name {
            self.name = name.clone();
        }
        if let Some(info) = &edit.info {
            self.info = Some(info.clone());
        }
        if let Some(action) = &edit.action {
            let order = self.shards.nodes.clone();
            self.shards.replace_action(&order, action.clone());
        }
    }

    fn payload_fields(&self) -> PayloadFields {
        PayloadFields {
            name: Some(self.name.clone()),
            info: self.info.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fragment(name: &str, info: Option<&str>) -> SceneFragment {
        SceneFragment {
            id: "s1".into(),
            name: name.into(),
            info: info.map(String::from),
            action: json!({"light": {"power": true}}),
        }
    }

    #[test]
    fn test_sync_check_name_and_info() {
        let scene = Scene::seed("n1", fragment("Evening", None));

        let record = scene.sync_check(&fragment("Evening Lights", Some("dim")));
        assert_eq!(record.get(SharedField::Name), Some(&json!("Evening Lights")));
        assert_eq!(record.get(SharedField::Info), Some(&json!("dim")));

        assert!(scene.sync_check(&fragment("Evening", None)).is_empty());
    }

    #[test]
    fn test_payload_fields_have_no_schedule_fields() {
        let scene = Scene::seed("n1", fragment("Evening", Some("dim")));
        let fields = scene.payload_fields();
        assert_eq!(fields.name.as_deref(), Some("Evening"));
        assert!(fields.triggers.is_none());
        assert!(fields.flags.is_none());
    }

    #[test]
    fn test_draft_requires_action() {
        let err = Scene::from_draft(SceneDraft {
            name: "Evening".into(),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ShardError::Validation(_)));
    }
}

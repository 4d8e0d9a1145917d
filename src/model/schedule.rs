//! Schedules
//!
//! A schedule fires device actions on a set of nodes at a time of day, on a
//! date, or after a relative delay. Each node stores the schedule's shared
//! fields plus the actions for its own devices.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, ShardError};
use crate::intent;
use crate::operation::Operation;
use crate::out_of_sync::{OutOfSyncRecord, SharedField};
use crate::payload::PayloadFields;

use super::{as_value, draft_order, ActionMap, EntityKind, NodeId, Origin, RawFragment, ShardedEntity, Shards};

/// When a schedule fires.
///
/// Either `m` (minutes since midnight, with `d` weekday bitmask or a date
/// via `dd`/`mm`/`yy`) or `rsec` (seconds from now) must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dd: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mm: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yy: Option<u16>,
    /// Repeat every year
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rsec: Option<u64>,
    /// Absolute fire time reported by the device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<u64>,
    /// Device fields this model does not name; compared and sent back as-is
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Trigger {
    /// Time of day on the given weekdays (bit 0 = Monday).
    pub fn at_minutes(minutes: u32, days: u8) -> Self {
        Self {
            m: Some(minutes),
            d: Some(days),
            ..Default::default()
        }
    }

    /// Fire once after `seconds`.
    pub fn relative(seconds: u64) -> Self {
        Self {
            rsec: Some(seconds),
            ..Default::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.m.is_some() || self.rsec.is_some()
    }
}

/// Window outside which a schedule does not fire, in Unix seconds.
///
/// A missing bound leaves that side of the window open.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<u64>,
}

/// Unordered trigger list comparison: every trigger of each list must be
/// equal to some trigger of the other.
pub fn triggers_equivalent(a: &[Trigger], b: &[Trigger]) -> bool {
    a.iter().all(|t| b.contains(t)) && b.iter().all(|t| a.contains(t))
}

/// Schedule fragment as stored on one node.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleFragment {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub info: Option<String>,
    #[serde(default)]
    pub action: Value,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub flags: Option<u32>,
    #[serde(default)]
    pub validity: Option<Validity>,
}

impl RawFragment for ScheduleFragment {
    fn id(&self) -> &str {
        &self.id
    }

    fn action(&self) -> &Value {
        &self.action
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schedule {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    pub triggers: Vec<Trigger>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validity: Option<Validity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<u32>,
    /// Activation as reported by devices; `None` until a node reports it
    pub enabled: Option<bool>,
    #[serde(flatten)]
    pub shards: Shards,
}

/// Locally created schedule.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleDraft {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub info: Option<String>,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub validity: Option<Validity>,
    #[serde(default)]
    pub flags: Option<u32>,
    /// Preferred node order; action keys not listed follow
    #[serde(default)]
    pub nodes: Vec<NodeId>,
    #[serde(default)]
    pub action: ActionMap,
}

/// Proposed schedule change. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ScheduleEdit {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "actions")]
    pub action: Option<ActionMap>,
    #[serde(default)]
    pub info: Option<String>,
    #[serde(default)]
    pub triggers: Option<Vec<Trigger>>,
    #[serde(default)]
    pub flags: Option<u32>,
    #[serde(default)]
    pub validity: Option<Validity>,
}

impl ScheduleEdit {
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

    pub fn with_triggers(mut self, triggers: Vec<Trigger>) -> Self {
        self.triggers = Some(triggers);
        self
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = Some(flags);
        self
    }

    pub fn with_validity(mut self, validity: Validity) -> Self {
        self.validity = Some(validity);
        self
    }
}

fn validate_triggers(triggers: &[Trigger]) -> Result<()> {
    if triggers.is_empty() {
        return Err(ShardError::Validation("schedule needs at least one trigger".into()));
    }
    if let Some(bad) = triggers.iter().position(|t| !t.is_valid()) {
        return Err(ShardError::Validation(format!(
            "trigger {} has neither a time of day (m) nor relative seconds (rsec)",
            bad
        )));
    }
    Ok(())
}

impl ShardedEntity for Schedule {
    type Fragment = ScheduleFragment;
    type Draft = ScheduleDraft;
    type Edit = ScheduleEdit;

    const KIND: EntityKind = EntityKind::Schedule;

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

    fn from_draft(draft: ScheduleDraft) -> Result<Self> {
        if draft.name.trim().is_empty() {
            return Err(ShardError::Validation("schedule name is required".into()));
        }
        validate_triggers(&draft.triggers)?;
        if draft.action.is_empty() {
            return Err(ShardError::Validation("schedule action must target at least one node".into()));
        }

        let order = draft_order(&draft.nodes, &draft.action);
        let mut shards = Shards::from_action(&order, draft.action);
        shards.origin = Origin::Local;

        Ok(Self {
            id: draft.id.unwrap_or_else(|| EntityKind::Schedule.generate_id()),
            name: draft.name,
            info: draft.info,
            triggers: draft.triggers,
            validity: draft.validity,
            flags: draft.flags,
            enabled: None,
            shards,
        })
    }

    fn seed(node_id: &str, fragment: ScheduleFragment) -> Self {
        Self {
            shards: Shards::seeded(node_id, fragment.action),
            id: fragment.id,
            name: fragment.name,
            info: fragment.info,
            triggers: fragment.triggers,
            validity: fragment.validity,
            flags: fragment.flags,
            enabled: fragment.enabled,
        }
    }

    fn sync_check(&self, fragment: &ScheduleFragment) -> OutOfSyncRecord {
        let mut record = OutOfSyncRecord::new();
        if fragment.name != self.name {
            record.insert(SharedField::Name, as_value(&fragment.name));
        }
        if !triggers_equivalent(&fragment.triggers, &self.triggers) {
            record.insert(SharedField::Triggers, as_value(&fragment.triggers));
        }
        if fragment.info != self.info {
            record.insert(SharedField::Info, as_value(&fragment.info));
        }
        if fragment.flags != self.flags {
            record.insert(SharedField::Flags, as_value(&fragment.flags));
        }
        if fragment.validity != self.validity {
            record.insert(SharedField::Validity, as_value(&fragment.validity));
        }
        if fragment.enabled != self.enabled {
            record.insert(SharedField::Enabled, as_value(&fragment.enabled));
        }
        record
    }

    fn proposed_action(&self, edit: &ScheduleEdit) -> ActionMap {
        edit.action.clone().unwrap_or_else(|| self.shards.action.clone())
    }

    fn resolve_intent(&self, node_id: &str, edit: &ScheduleEdit, proposed: &ActionMap) -> Operation {
        intent::resolve_schedule(node_id, self, edit, proposed)
    }

    fn validate_edit(&self, edit: &ScheduleEdit) -> Result<()> {
        if edit.name.as_ref().is_some_and(|n| n.trim().is_empty()) {
            return Err(ShardError::Validation("schedule name is required".into()));
        }
        if let Some(triggers) = &edit.triggers {
            validate_triggers(triggers)?;
        }
        Ok(())
    }

    fn apply_edit(&mut self, edit: &ScheduleEdit) {
        if let Some(name) = &edit.name {
            self.name = name.clone();
        }
        if let Some(info) = &edit.info {
            self.info = Some(info.clone());
        }
        if let Some(triggers) = &edit.triggers {
            self.triggers = triggers.clone();
        }
        if let Some(flags) = edit.flags {
            self.flags = Some(flags);
        }
        if let Some(validity) = &edit.validity {
            self.validity = Some(validity.clone());
        }
        if let Some(action) = &edit.action {
            let order = self.shards.nodes.clone();
            self.shards.replace_action(&order, action.clone());
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = Some(enabled);
    }

    fn payload_fields(&self) -> PayloadFields {
        PayloadFields {
            name: Some(self.name.clone()),
            info: self.info.clone(),
            triggers: Some(self.triggers.clone()),
            flags: self.flags,
            validity: self.validity.clone(),
        }
    }
}

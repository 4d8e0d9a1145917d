//! Entity model
//!
//! A logical entity (schedule, scene) is stored as one fragment per node.
//! [`Shards`] holds the per-node bookkeeping every kind shares; the kind
//! modules add their shared fields and implement [`ShardedEntity`].

pub mod automation;
pub mod scene;
pub mod schedule;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;
use crate::operation::Operation;
use crate::out_of_sync::{OutOfSyncLedger, OutOfSyncRecord};
use crate::payload::PayloadFields;

pub use automation::{Automation, AutomationDraft, AutomationPatch};
pub use scene::{Scene, SceneDraft, SceneEdit, SceneFragment};
pub use schedule::{Schedule, ScheduleDraft, ScheduleEdit, ScheduleFragment, Trigger, Validity};

/// Node identifier
pub type NodeId = String;

/// Node id → opaque device-parameter tree for that node
pub type ActionMap = BTreeMap<NodeId, Value>;

/// Entity kinds handled by the stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Schedule,
    Scene,
    Automation,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Schedule => "schedule",
            EntityKind::Scene => "scene",
            EntityKind::Automation => "automation",
        }
    }

    /// `{kind}_{millis}` id for locally created entities.
    ///
    /// The number never repeats within a process: a second id asked for in
    /// the same millisecond takes the next value up.
    pub fn generate_id(&self) -> String {
        format!("{}_{}", self.as_str(), next_id_stamp())
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an entity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Origin {
    /// Rebuilt by fragment merge
    #[default]
    Merged,
    /// Created locally and not yet seen on any node
    Local,
}

/// Per-node bookkeeping shared by every fragmented entity.
///
/// Invariants: every key of `action` is in `nodes`, and `devices_count` is
/// the number of device entries across all action blobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Shards {
    pub nodes: Vec<NodeId>,
    pub action: ActionMap,
    pub devices_count: usize,
    pub out_of_sync_meta: OutOfSyncLedger,
    /// Classification of the in-flight mutation, per node
    #[serde(skip)]
    pub callback_update_operation: BTreeMap<NodeId, Operation>,
    #[serde(skip)]
    pub origin: Origin,
}

impl Shards {
    /// Shards for a single node's fragment.
    pub fn seeded(node_id: &str, action: Value) -> Self {
        let mut shards = Self::default();
        shards.absorb(node_id, action);
        shards
    }

    /// Shards built from an action map, ordered by `order` first and then
    /// by any remaining action keys.
    pub fn from_action(order: &[NodeId], action: ActionMap) -> Self {
        let mut shards = Self::default();
        shards.replace_action(order, action);
        shards
    }

    /// Add or replace one node's fragment.
    pub fn absorb(&mut self, node_id: &str, action: Value) {
        if !self.nodes.iter().any(|n| n == node_id) {
            self.nodes.push(node_id.to_string());
        }
        self.action.insert(node_id.to_string(), action);
        self.recount();
    }

    /// Replace the whole action map; `nodes` follows its keys.
    pub fn replace_action(&mut self, order: &[NodeId], action: ActionMap) {
        let mut nodes: Vec<NodeId> = order
            .iter()
            .filter(|n| action.contains_key(*n))
            .cloned()
            .collect();
        for key in action.keys() {
            if !nodes.contains(key) {
                nodes.push(key.clone());
            }
        }
        self.nodes = nodes;
        self.action = action;
        self.recount();
    }

    /// Drop one node's fragment.
    pub fn remove_node(&mut self, node_id: &str) {
        self.nodes.retain(|n| n != node_id);
        self.action.remove(node_id);
        self.recount();
    }

    pub fn action_for(&self, node_id: &str) -> Option<&Value> {
        self.action.get(node_id)
    }

    pub fn recount(&mut self) {
        self.devices_count = self.action.values().map(device_count).sum();
    }

    pub fn has_pending(&self) -> bool {
        !self.callback_update_operation.is_empty()
    }
}

/// Number of device entries in one action blob.
pub fn device_count(action: &Value) -> usize {
    match action {
        Value::Object(devices) => devices.len(),
        _ => 0,
    }
}

/// Raw per-node record as it sits in a node's parameter list.
pub trait RawFragment: DeserializeOwned {
    fn id(&self) -> &str;
    fn action(&self) -> &Value;
}

/// A logical entity assembled from per-node fragments.
pub trait ShardedEntity: Clone + Send + Sync + Serialize + 'static {
    type Fragment: RawFragment;
    type Draft: Send;
    type Edit: Send + Sync + 'static;

    const KIND: EntityKind;

    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn shards(&self) -> &Shards;
    fn shards_mut(&mut self) -> &mut Shards;

    /// Validate a draft and build a local-origin entity.
    fn from_draft(draft: Self::Draft) -> Result<Self>;

    /// New entity from the first fragment seen for its id.
    fn seed(node_id: &str, fragment: Self::Fragment) -> Self;

    /// Shared fields on `fragment` that differ from this aggregate.
    fn sync_check(&self, fragment: &Self::Fragment) -> OutOfSyncRecord;

    /// Action map after `edit` would apply.
    fn proposed_action(&self, edit: &Self::Edit) -> ActionMap;

    /// Operation `node_id` needs for `edit`; see [`crate::intent`].
    fn resolve_intent(&self, node_id: &str, edit: &Self::Edit, proposed: &ActionMap) -> Operation;

    /// Reject an edit that would leave the entity malformed.
    fn validate_edit(&self, _edit: &Self::Edit) -> Result<()> {
        Ok(())
    }

    /// Optimistically apply `edit`.
    fn apply_edit(&mut self, edit: &Self::Edit);

    /// Optimistic enable/disable; kinds without the flag ignore it.
    fn set_enabled(&mut self, _enabled: bool) {}

    /// Shared fields carried by add/edit payloads.
    fn payload_fields(&self) -> PayloadFields;
}

/// Serialize a field value for drift records.
pub(crate) fn as_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

static LAST_ID_STAMP: AtomicU64 = AtomicU64::new(0);

fn next_id_stamp() -> u64 {
    let now = now_ms();
    let prev = LAST_ID_STAMP
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
        .unwrap_or_else(|last| last);
    now.max(prev + 1)
}

pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Node order for a draft: explicit order first, then the remaining keys.
pub(crate) fn draft_order(nodes: &[NodeId], action: &ActionMap) -> Vec<NodeId> {
    let mut order: Vec<NodeId> = nodes.to_vec();
    for key in action.keys() {
        if !order.contains(key) {
            order.push(key.clone());
        }
    }
    order
}

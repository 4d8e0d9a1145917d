//! Entity stores
//!
//! A [`FragmentStore`] owns the entities of one fragmented kind, rebuilt
//! from the node registry by [`merge_fragments`]. Mutations go through the
//! store so that every node's part of a change is classified, sent in one
//! batch, replayed into the registry on success and followed by a fresh
//! merge.

pub mod automation;
mod reconcile;
pub mod scene;
pub mod schedule;

pub use automation::AutomationStore;
pub use scene::SceneStore;
pub use schedule::ScheduleStore;

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::ServiceIdentifiers;
use crate::error::{Result, ShardError};
use crate::events::{Change, EventBus, StoreEvent};
use crate::intercept::Interceptor;
use crate::merge::merge_fragments;
use crate::model::{NodeId, Origin, ShardedEntity};
use crate::operation::Operation;
use crate::out_of_sync::OutOfSyncRecord;
use crate::payload::{generate_entry, NodePayload, PayloadEntry};
use crate::registry::NodeRegistry;
use crate::tracked::Tracked;
use crate::transport::{NodeResult, Transport};

// ============================================================================
// Transaction arguments
// ============================================================================

/// What a caller asked for.
pub(crate) enum Mutation<E: ShardedEntity> {
    Add,
    Edit(E::Edit),
    Remove,
    Toggle(bool),
    Activate,
}

impl<E: ShardedEntity> Mutation<E> {
    /// Operation shared by every node, for mutations that do not fan out.
    fn fixed_operation(&self) -> Option<Operation> {
        match self {
            Mutation::Add => Some(Operation::Add),
            Mutation::Edit(_) => None,
            Mutation::Remove => Some(Operation::Remove),
            Mutation::Toggle(true) => Some(Operation::Enable),
            Mutation::Toggle(false) => Some(Operation::Disable),
            Mutation::Activate => Some(Operation::Activate),
        }
    }
}

/// Planned transaction: per-node classification and the entries to send.
pub(crate) struct TxArgs<E: ShardedEntity> {
    mutation: Mutation<E>,
    targets: Vec<NodeId>,
    operations: BTreeMap<NodeId, Operation>,
    entries: BTreeMap<NodeId, PayloadEntry>,
}

impl<E: ShardedEntity> TxArgs<E> {
    /// One payload per node that needs something, in target order.
    fn payloads(&self, ids: &ServiceIdentifiers) -> Result<Vec<NodePayload>> {
        self.targets
            .iter()
            .filter_map(|node| self.entries.get(node).map(|entry| (node, entry)))
            .map(|(node, entry)| NodePayload::wrap(node, ids, entry))
            .collect()
    }
}

/// Classify every target node and build its entry.
fn plan<E: ShardedEntity>(entity: &E, mutation: Mutation<E>) -> Result<TxArgs<E>> {
    let shards = entity.shards();

    let (targets, operations, preview) = match &mutation {
        Mutation::Edit(edit) => {
            entity.validate_edit(edit)?;
            let proposed = entity.proposed_action(edit);
            if proposed.is_empty() {
                return Err(ShardError::Validation(format!(
                    "{} {} would be left without nodes; remove it instead",
                    E::KIND,
                    entity.id()
                )));
            }

            let mut targets = shards.nodes.clone();
            for node in proposed.keys() {
                if !targets.contains(node) {
                    targets.push(node.clone());
                }
            }
            let operations: BTreeMap<NodeId, Operation> = targets
                .iter()
                .map(|node| (node.clone(), entity.resolve_intent(node, edit, &proposed)))
                .collect();

            let mut preview = entity.clone();
            preview.apply_edit(edit);
            (targets, operations, preview)
        }
        fixed => {
            let op = fixed.fixed_operation().unwrap_or(Operation::NoChange);
            let targets = shards.nodes.clone();
            let operations = targets.iter().map(|node| (node.clone(), op)).collect();
            (targets, operations, entity.clone())
        }
    };

    let fields = preview.payload_fields();
    let mut entries = BTreeMap::new();
    for node in &targets {
        let Some(&op) = operations.get(node) else {
            continue;
        };
        debug!(kind = %E::KIND, entity_id = %entity.id(), node_id = %node, operation = %op, "Classified node");
        if op == Operation::NoChange {
            continue;
        }
        let action = if op.carries_body() {
            preview.shards().action_for(node)
        } else {
            None
        };
        entries.insert(node.clone(), generate_entry(op, entity.id(), node, &fields, action)?);
    }

    Ok(TxArgs {
        mutation,
        targets,
        operations,
        entries,
    })
}

// ============================================================================
// Store
// ============================================================================

/// One row of the drift report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftEntry {
    pub entity_id: String,
    pub node_id: NodeId,
    pub fields: OutOfSyncRecord,
}

/// Entities of one fragmented kind.
pub struct FragmentStore<E: ShardedEntity> {
    ids: ServiceIdentifiers,
    registry: Tracked<NodeRegistry>,
    transport: Arc<dyn Transport>,
    events: EventBus,
    entities: RwLock<BTreeMap<String, Tracked<E>>>,
    mutate: Interceptor<E, TxArgs<E>, Vec<NodeResult>>,
}

impl<E: ShardedEntity> FragmentStore<E> {
    pub fn new(
        ids: ServiceIdentifiers,
        registry: Tracked<NodeRegistry>,
        transport: Arc<dyn Transport>,
        events: EventBus,
    ) -> Self {
        let mutate = reconcile::mutation_interceptor::<E>(registry.clone(), ids.clone());
        Self {
            ids,
            registry,
            transport,
            events,
            entities: RwLock::new(BTreeMap::new()),
            mutate,
        }
    }

    fn table(&self) -> RwLockReadGuard<'_, BTreeMap<String, Tracked<E>>> {
        self.entities.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn table_mut(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Tracked<E>>> {
        self.entities.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn identifiers(&self) -> &ServiceIdentifiers {
        &self.ids
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Rebuild the store from the registry.
    ///
    /// `only` restricts the merge to the listed nodes, in that order.
    /// Entities created locally and not yet found on any node, and entities
    /// with a classification in flight, survive even when the merge does
    /// not produce them. Existing slots are updated in place.
    pub fn sync(&self, only: Option<&[NodeId]>) -> usize {
        let inputs = self.registry.read(|r| r.collect_fragments(&self.ids, only));
        let merged = merge_fragments::<E>(&inputs);

        let count = {
            let mut table = self.table_mut();
            let mut next = BTreeMap::new();

            for (id, mut entity) in merged {
                match table.remove(&id) {
                    Some(slot) => {
                        slot.write(|current| {
                            let pending = std::mem::take(&mut current.shards_mut().callback_update_operation);
                            entity.shards_mut().callback_update_operation = pending;
                            *current = entity;
                        });
                        next.insert(id, slot);
                    }
                    None => {
                        next.insert(id, Tracked::new(entity));
                    }
                }
            }

            for (id, slot) in std::mem::take(&mut *table) {
                let keep = slot.read(|e| e.shards().origin == Origin::Local || e.shards().has_pending());
                if keep {
                    next.insert(id, slot);
                } else {
                    debug!(kind = %E::KIND, entity_id = %id, "Entity no longer on any node");
                }
            }

            *table = next;
            table.len()
        };

        info!(kind = %E::KIND, nodes = inputs.len(), entities = count, "Store synced");
        self.events.publish(E::KIND, Change::Synced { entities: count });
        count
    }

    /// Validate a draft and add it as a local entity. Nothing is sent
    /// until [`EntityHandle::add`].
    pub fn create(&self, draft: E::Draft) -> Result<E> {
        let entity = E::from_draft(draft)?;
        let id = entity.id().to_string();

        {
            let mut table = self.table_mut();
            if table.contains_key(&id) {
                return Err(ShardError::Validation(format!("{} {} already exists", E::KIND, id)));
            }
            table.insert(id.clone(), Tracked::new(entity.clone()));
        }

        info!(kind = %E::KIND, entity_id = %id, nodes = entity.shards().nodes.len(), "Entity created");
        self.events.publish(E::KIND, Change::Created { id });
        Ok(entity)
    }

    pub fn get(&self, id: &str) -> Option<E> {
        self.table().get(id).map(Tracked::get)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.table().contains_key(id)
    }

    pub fn list(&self) -> Vec<E> {
        self.table().values().map(Tracked::get).collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.table().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    /// Per-entity API for `id`.
    pub fn handle(&self, id: &str) -> Result<EntityHandle<'_, E>> {
        let slot = self
            .table()
            .get(id)
            .cloned()
            .ok_or_else(|| ShardError::NotFound(format!("{} {}", E::KIND, id)))?;
        Ok(EntityHandle { store: self, slot })
    }

    /// Every recorded drift, by entity then node.
    pub fn out_of_sync_report(&self) -> Vec<DriftEntry> {
        let table = self.table();
        let mut report = Vec::new();
        for (id, slot) in table.iter() {
            slot.read(|e| {
                for (node, record) in e.shards().out_of_sync_meta.iter() {
                    report.push(DriftEntry {
                        entity_id: id.clone(),
                        node_id: node.to_string(),
                        fields: record.clone(),
                    });
                }
            });
        }
        report
    }

    /// Forget drift recorded for `node_id` on every entity.
    pub fn clear_out_of_sync_meta(&self, node_id: &str) {
        for slot in self.table().values() {
            slot.write(|e| {
                e.shards_mut().out_of_sync_meta.remove(node_id);
            });
        }
    }

    pub fn clear(&self) {
        self.table_mut().clear();
        debug!(kind = %E::KIND, "Store cleared");
    }

    /// Run one mutation end to end.
    async fn transact(&self, slot: &Tracked<E>, mutation: Mutation<E>) -> Result<Vec<NodeResult>> {
        let entity = slot.get();
        let id = entity.id().to_string();
        let is_remove = matches!(mutation, Mutation::Remove);

        let args = plan(&entity, mutation)?;
        let payloads = args.payloads(&self.ids)?;
        let sent: Vec<NodeId> = if payloads.is_empty() {
            args.targets.clone()
        } else {
            payloads.iter().map(|p| p.node_id.clone()).collect()
        };

        let outcome = if payloads.is_empty() {
            debug!(kind = %E::KIND, entity_id = %id, "No node needs a change");
            let synthesized: Vec<NodeResult> = args.targets.iter().map(NodeResult::success).collect();
            self.mutate.run(slot, args, async move { Ok(synthesized) }).await
        } else {
            info!(kind = %E::KIND, entity_id = %id, payloads = payloads.len(), "Submitting batch");
            self.mutate
                .run(slot, args, self.transport.submit_batch(payloads))
                .await
        };

        let results = match outcome {
            Ok(results) => results,
            Err(e) => {
                warn!(kind = %E::KIND, entity_id = %id, error = %e, "Mutation rolled back");
                self.events.publish(E::KIND, Change::RolledBack { id });
                return Err(e);
            }
        };

        slot.write(|e| e.shards_mut().callback_update_operation.clear());

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        // A node missing from the results has not confirmed anything
        let every_node_confirmed = sent
            .iter()
            .all(|node| results.iter().any(|r| &r.node_id == node && r.is_success()));
        if is_remove && every_node_confirmed {
            self.table_mut().remove(&id);
            info!(kind = %E::KIND, entity_id = %id, "Entity removed from every node");
            self.events.publish(E::KIND, Change::Removed { id });
        } else {
            info!(
                kind = %E::KIND,
                entity_id = %id,
                succeeded,
                failed = results.len() - succeeded,
                "Mutation finished"
            );
            self.events.publish(E::KIND, Change::Updated { id });
        }

        self.sync(None);
        Ok(results)
    }
}

// ============================================================================
// Entity handle
// ============================================================================

/// Per-entity API. Kind-specific operations live in the kind modules.
pub struct EntityHandle<'a, E: ShardedEntity> {
    store: &'a FragmentStore<E>,
    slot: Tracked<E>,
}

impl<'a, E: ShardedEntity> EntityHandle<'a, E> {
    pub fn id(&self) -> String {
        self.slot.read(|e| e.id().to_string())
    }

    /// Current value of the entity.
    pub fn get(&self) -> E {
        self.slot.get()
    }

    pub fn revision(&self) -> u64 {
        self.slot.revision()
    }

    /// Classifications of the mutation in flight, if any.
    pub fn pending_operations(&self) -> BTreeMap<NodeId, Operation> {
        self.slot.read(|e| e.shards().callback_update_operation.clone())
    }

    /// Send the entity to every node in its action map.
    pub async fn add(&self) -> Result<Vec<NodeResult>> {
        self.store.transact(&self.slot, Mutation::Add).await
    }

    /// Apply `edit`, sending each node only the operation it needs.
    pub async fn edit(&self, edit: E::Edit) -> Result<Vec<NodeResult>> {
        self.store.transact(&self.slot, Mutation::Edit(edit)).await
    }

    /// Delete the entity from every node. It leaves the store only when
    /// every node succeeds.
    pub async fn remove(&self) -> Result<Vec<NodeResult>> {
        self.store.transact(&self.slot, Mutation::Remove).await
    }

    pub fn out_of_sync_meta(&self, node_id: &str) -> Option<OutOfSyncRecord> {
        self.slot.read(|e| e.shards().out_of_sync_meta.get(node_id).cloned())
    }

    pub fn add_out_of_sync_meta(&self, node_id: &str, record: OutOfSyncRecord) {
        self.slot.write(|e| e.shards_mut().out_of_sync_meta.add(node_id, record));
    }

    pub fn remove_out_of_sync_meta(&self, node_id: &str) -> Option<OutOfSyncRecord> {
        self.slot.write(|e| e.shards_mut().out_of_sync_meta.remove(node_id))
    }

    pub fn clear_out_of_sync_meta(&self) {
        self.slot.write(|e| e.shards_mut().out_of_sync_meta.clear());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActionMap, Schedule, ScheduleDraft, ScheduleEdit, Trigger};
    use serde_json::json;

    fn schedule() -> Schedule {
        let mut action = ActionMap::new();
        action.insert("n1".into(), json!({"light": {"power": true}}));
        action.insert("n2".into(), json!({"fan": {"power": false}}));
        Schedule::from_draft(ScheduleDraft {
            id: Some("s1".into()),
            name: "Morning".into(),
            triggers: vec![Trigger::at_minutes(420, 127)],
            nodes: vec!["n1".into(), "n2".into()],
            action,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_plan_add_targets_every_node() {
        let args = plan(&schedule(), Mutation::Add).unwrap();
        assert_eq!(args.targets, vec!["n1", "n2"]);
        assert_eq!(args.entries["n1"].action, Some(json!({"light": {"power": true}})));
        assert_eq!(args.entries["n2"].action, Some(json!({"fan": {"power": false}})));
    }

    #[test]
    fn test_plan_edit_fans_out() {
        let current = schedule();
        let mut action = current.shards.action.clone();
        action.remove("n2");
        action.insert("n3".into(), json!({"plug": {"power": true}}));

        let args = plan(&current, Mutation::Edit(ScheduleEdit::default().with_action(action))).unwrap();

        assert_eq!(args.targets, vec!["n1", "n2", "n3"]);
        assert_eq!(args.operations["n1"], Operation::NoChange);
        assert_eq!(args.operations["n2"], Operation::Remove);
        assert_eq!(args.operations["n3"], Operation::Add);
        assert!(!args.entries.contains_key("n1"));
        assert!(args.entries["n2"].action.is_none());
    }

    #[test]
    fn test_plan_edit_to_no_nodes_is_rejected() {
        let err = plan(
            &schedule(),
            Mutation::Edit(ScheduleEdit::default().with_action(ActionMap::new())),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ShardError::Validation(_)));
    }

    #[test]
    fn test_plan_toggle_is_bodyless() {
        let args = plan(&schedule(), Mutation::Toggle(false)).unwrap();
        assert!(args.operations.values().all(|op| *op == Operation::Disable));
        assert!(args.entries.values().all(|e| e.action.is_none() && e.name.is_none()));
    }
}

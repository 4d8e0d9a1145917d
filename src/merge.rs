//! Fragment merge
//!
//! Rebuilds logical entities from per-node raw fragments. Nodes are visited
//! in the order given and shared fields come from the first fragment seen
//! for an id; later fragments only contribute their action blob and any
//! drift against that first one.

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::model::{NodeId, RawFragment, ShardedEntity};

/// One node's raw fragment list.
pub type NodeFragments = (NodeId, Vec<Value>);

/// Merge raw fragments into entities keyed by id.
///
/// Pure: the same input always yields the same output. Fragments that do
/// not parse are skipped.
pub fn merge_fragments<E: ShardedEntity>(nodes: &[NodeFragments]) -> BTreeMap<String, E> {
    let mut merged: BTreeMap<String, E> = BTreeMap::new();

    for (node_id, raw) in nodes {
        for value in raw {
            let fragment: E::Fragment = match serde_json::from_value(value.clone()) {
                Ok(f) => f,
                Err(e) => {
                    warn!(kind = %E::KIND, node_id = %node_id, error = %e, "Skipping malformed fragment");
                    continue;
                }
            };

            match merged.get_mut(fragment.id()) {
                Some(entity) => {
                    let drift = entity.sync_check(&fragment);
                    if !drift.is_empty() {
                        debug!(
                            kind = %E::KIND,
                            entity_id = %fragment.id(),
                            node_id = %node_id,
                            fields = drift.len(),
                            "Fragment out of sync"
                        );
                    }
                    let shards = entity.shards_mut();
                    shards.absorb(node_id, fragment.action().clone());
                    shards.out_of_sync_meta.add(node_id, drift);
                }
                None => {
                    let id = fragment.id().to_string();
                    debug!(kind = %E::KIND, entity_id = %id, node_id = %node_id, "Seeding entity");
                    merged.insert(id, E::seed(node_id, fragment));
                }
            }
        }
    }

    merged
}

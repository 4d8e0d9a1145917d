//! Reconciliation of batched results
//!
//! After a batch returns, every node that reported success has its cached
//! raw fragment list brought in line with what was sent. Failed nodes are
//! left alone; the next merge shows whatever they still hold.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::ServiceIdentifiers;
use crate::error::Result;
use crate::intercept::Interceptor;
use crate::model::{EntityKind, ShardedEntity};
use crate::operation::Operation;
use crate::payload::PayloadEntry;
use crate::registry::NodeRegistry;
use crate::tracked::Tracked;
use crate::transport::NodeResult;

use super::{Mutation, TxArgs};

/// The one interceptor every fragment mutation runs through.
pub(crate) fn mutation_interceptor<E: ShardedEntity>(
    registry: Tracked<NodeRegistry>,
    ids: ServiceIdentifiers,
) -> Interceptor<E, TxArgs<E>, Vec<NodeResult>> {
    Interceptor::restoring(label(E::KIND))
        .action(|entity: &mut E, args: &TxArgs<E>| {
            entity.shards_mut().callback_update_operation = args.operations.clone();
            match &args.mutation {
                Mutation::Edit(edit) => entity.apply_edit(edit),
                Mutation::Toggle(enabled) => entity.set_enabled(*enabled),
                Mutation::Add | Mutation::Remove | Mutation::Activate => {}
            }
            Ok(())
        })
        .on_success(move |results: Vec<NodeResult>, args: &TxArgs<E>, entity: &mut E| {
            let entity_id = entity.id().to_string();
            let pending = &mut entity.shards_mut().callback_update_operation;

            registry.write(|nodes| {
                for result in &results {
                    if !result.is_success() {
                        warn!(
                            kind = %E::KIND,
                            entity_id = %entity_id,
                            node_id = %result.node_id,
                            status = %result.status,
                            description = %result.description,
                            "Node rejected update"
                        );
                        continue;
                    }
                    let Some(operation) = pending.remove(&result.node_id) else {
                        continue;
                    };
                    if let Some(entry) = args.entries.get(&result.node_id) {
                        replay(nodes, &ids, &result.node_id, operation, entry);
                    }
                }
            });

            Ok(results)
        })
}

fn label(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Schedule => "schedule.mutate",
        EntityKind::Scene => "scene.mutate",
        EntityKind::Automation => "automation.mutate",
    }
}

/// Apply one node's successful operation to its cached fragment list.
pub(crate) fn replay(
    registry: &mut NodeRegistry,
    ids: &ServiceIdentifiers,
    node_id: &str,
    operation: Operation,
    entry: &PayloadEntry,
) {
    let Some(fragments) = registry.fragments_mut(node_id, ids) else {
        warn!(node_id = %node_id, service = %ids.service_type, "Node has no fragment parameter; skipping replay");
        return;
    };

    let position = fragments
        .iter()
        .position(|f| f.get("id").and_then(Value::as_str) == Some(entry.id.as_str()));

    match operation {
        Operation::Add => {
            let fragment = match entry_fields(entry) {
                Ok(fields) => Value::Object(fields),
                Err(e) => {
                    warn!(node_id = %node_id, error = %e, "Unable to encode fragment");
                    return;
                }
            };
            match position {
                Some(idx) => fragments[idx] = fragment,
                None => fragments.push(fragment),
            }
        }
        Operation::Edit => {
            let fields = match entry_fields(entry) {
                Ok(fields) => fields,
                Err(e) => {
                    warn!(node_id = %node_id, error = %e, "Unable to encode fragment");
                    return;
                }
            };
            match position.and_then(|idx| fragments[idx].as_object_mut()) {
                Some(existing) => existing.extend(fields),
                None => fragments.push(Value::Object(fields)),
            }
        }
        Operation::Remove => {
            if let Some(idx) = position {
                fragments.remove(idx);
            }
        }
        Operation::Enable | Operation::Disable => {
            if let Some(existing) = position.and_then(|idx| fragments[idx].as_object_mut()) {
                existing.insert("enabled".into(), Value::Bool(operation == Operation::Enable));
            }
        }
        Operation::Activate | Operation::NoChange => {}
    }

    debug!(node_id = %node_id, entity_id = %entry.id, operation = %operation, "Replayed into registry");
}

/// Entry as a raw fragment object, without the operation tag.
fn entry_fields(entry: &PayloadEntry) -> Result<Map<String, Value>> {
    let mut fields = match serde_json::to_value(entry)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    fields.remove("operation");
    Ok(fields)
}

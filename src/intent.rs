//! Intent resolution
//!
//! Pure classification of what one node needs, given the entity's current
//! action map and the proposed one. Neither map is modified.

use serde_json::Value;

use crate::model::schedule::triggers_equivalent;
use crate::model::{ActionMap, Schedule, ScheduleEdit};
use crate::operation::Operation;

/// Presence-based part of classification shared by every kind.
///
/// Returns `None` when the node is present in both maps or in neither, so
/// the caller decides between edit and no-change.
pub fn classify_presence(before: Option<&Value>, after: Option<&Value>) -> Option<Operation> {
    match (before, after) {
        (None, Some(_)) => Some(Operation::Add),
        (Some(_), None) => Some(Operation::Remove),
        _ => None,
    }
}

/// Schedule classification.
///
/// A node whose action blob is unchanged still gets an edit when any shared
/// field the edit proposes differs from the current value.
pub fn resolve_schedule(
    node_id: &str,
    current: &Schedule,
    edit: &ScheduleEdit,
    proposed: &ActionMap,
) -> Operation {
    let before = current.shards.action.get(node_id);
    let after = proposed.get(node_id);

    if let Some(op) = classify_presence(before, after) {
        return op;
    }
    if before != after {
        return Operation::Edit;
    }
    if schedule_fields_change(current, edit) {
        Operation::Edit
    } else {
        Operation::NoChange
    }
}

/// Scene classification: present in both maps is always an edit, even when
/// nothing differs.
pub fn resolve_scene(node_id: &str, current: &ActionMap, proposed: &ActionMap) -> Operation {
    let before = current.get(node_id);
    let after = proposed.get(node_id);

    match classify_presence(before, after) {
        Some(op) => op,
        None if before.is_some() => Operation::Edit,
        None => Operation::NoChange,
    }
}

fn schedule_fields_change(current: &Schedule, edit: &ScheduleEdit) -> bool {
    let name = edit.name.as_ref().is_some_and(|n| *n != current.name);
    let info = edit.info.as_ref().is_some_and(|i| current.info.as_ref() != Some(i));
    let triggers = edit
        .triggers
        .as_ref()
        .is_some_and(|t| !triggers_equivalent(t, &current.triggers));
    let flags = edit.flags.is_some_and(|f| current.flags != Some(f));
    let validity = edit.validity.as_ref().is_some_and(|v| current.validity.as_ref() != Some(v));

    name || info || triggers || flags || validity
}

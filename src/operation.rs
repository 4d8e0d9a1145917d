//! Per-node operation classification

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ShardError;

/// What a single node needs for one mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Add,
    Edit,
    Remove,
    Enable,
    Disable,
    Activate,
    /// Nothing to send; never appears on the wire
    NoChange,
}

impl Operation {
    /// Wire tag, or `None` for [`Operation::NoChange`].
    pub fn wire_tag(&self) -> Option<&'static str> {
        match self {
            Operation::Add => Some("add"),
            Operation::Edit => Some("edit"),
            Operation::Remove => Some("remove"),
            Operation::Enable => Some("enable"),
            Operation::Disable => Some("disable"),
            Operation::Activate => Some("activate"),
            Operation::NoChange => None,
        }
    }

    /// Whether the payload carries the full entity body.
    pub fn carries_body(&self) -> bool {
        matches!(self, Operation::Add | Operation::Edit)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_tag().unwrap_or("no_change"))
    }
}

impl FromStr for Operation {
    type Err = ShardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(Operation::Add),
            "edit" => Ok(Operation::Edit),
            "remove" => Ok(Operation::Remove),
            "enable" => Ok(Operation::Enable),
            "disable" => Ok(Operation::Disable),
            "activate" => Ok(Operation::Activate),
            other => Err(ShardError::UnknownOperation(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_parse_back() {
        for op in [
            Operation::Add,
            Operation::Edit,
            Operation::Remove,
            Operation::Enable,
            Operation::Disable,
            Operation::Activate,
        ] {
            let tag = op.wire_tag().unwrap();
            assert_eq!(tag.parse::<Operation>().unwrap(), op);
        }
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let err = "upsert".parse::<Operation>().unwrap_err();
        assert_eq!(err, ShardError::UnknownOperation("upsert".into()));
        assert!(Operation::NoChange.wire_tag().is_none());
    }
}

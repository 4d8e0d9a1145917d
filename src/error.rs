//! Error types for shardview

use thiserror::Error;

/// Result type for shardview operations
pub type Result<T> = std::result::Result<T, ShardError>;

/// Errors raised by stores, transactions and payload generation.
///
/// Per-node failures inside a successful batch are not errors; they come
/// back as [`NodeResult`](crate::transport::NodeResult)s with a non-success
/// status.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShardError {
    /// Malformed entity rejected before any network activity
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation tag has no wire representation
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// Payload requested without a target node
    #[error("Missing node id for entity {0}")]
    MissingNodeId(String),

    /// Add/edit payload requested for a node with no action blob
    #[error("Missing action for entity {entity_id} on node {node_id}")]
    MissingAction { entity_id: String, node_id: String },

    /// Entity not present in the store
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// The batched remote call itself failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Remote collaborator answered with a non-success status
    #[error("Remote rejected request: {status}: {description}")]
    Rejected { status: String, description: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(String),
}

impl ShardError {
    /// Errors that indicate a bug at the call site; never worth retrying.
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            ShardError::UnknownOperation(_)
                | ShardError::MissingNodeId(_)
                | ShardError::MissingAction { .. }
        )
    }

    /// Errors produced by the remote side of a transaction.
    pub fn is_remote(&self) -> bool {
        matches!(self, ShardError::Transport(_) | ShardError::Rejected { .. })
    }
}

impl From<serde_json::Error> for ShardError {
    fn from(err: serde_json::Error) -> Self {
        ShardError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for ShardError {
    fn from(err: toml::de::Error) -> Self {
        ShardError::Config(err.to_string())
    }
}

impl From<std::io::Error> for ShardError {
    fn from(err: std::io::Error) -> Self {
        ShardError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(ShardError::UnknownOperation("nochange".into()).is_programmer_error());
        assert!(ShardError::MissingNodeId("s1".into()).is_programmer_error());
        assert!(!ShardError::Transport("offline".into()).is_programmer_error());
        assert!(ShardError::Transport("offline".into()).is_remote());
        assert!(ShardError::Rejected {
            status: "failure".into(),
            description: "denied".into()
        }
        .is_remote());
        assert!(!ShardError::Validation("name".into()).is_remote());
    }

    #[test]
    fn test_json_error_converts() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let converted: ShardError = err.into();
        assert!(matches!(converted, ShardError::Serialization(_)));
    }
}

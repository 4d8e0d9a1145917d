//! Remote collaborators
//!
//! [`Transport`] delivers a batch of node-addressed payloads in one call and
//! returns one result per node. [`AutomationApi`] is the cloud endpoint for
//! automations. Both are implemented outside this crate; [`DryRunTransport`]
//! only records what would have been sent.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use crate::error::{Result, ShardError};
use crate::model::{Automation, AutomationPatch};
use crate::payload::NodePayload;

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_FAILURE: &str = "failure";

/// Outcome of one node's part of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    pub node_id: String,
    pub status: String,
    #[serde(default)]
    pub description: String,
}

impl NodeResult {
    pub fn success(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            status: STATUS_SUCCESS.to_string(),
            description: String::new(),
        }
    }

    pub fn failure(node_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            status: STATUS_FAILURE.to_string(),
            description: description.into(),
        }
    }

    /// Anything other than `"success"` is a failure; `description` is not
    /// interpreted.
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

/// Batched delivery of node payloads.
///
/// An `Err` means the call as a whole failed and every optimistic change
/// is rolled back. Per-node failures come back as non-success results.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn submit_batch(&self, payloads: Vec<NodePayload>) -> Result<Vec<NodeResult>>;
}

/// Transport that records batches and reports success for every node.
#[derive(Debug, Default)]
pub struct DryRunTransport {
    batches: Mutex<Vec<Vec<NodePayload>>>,
}

impl DryRunTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every batch submitted so far.
    pub fn batches(&self) -> Vec<Vec<NodePayload>> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn last_batch(&self) -> Option<Vec<NodePayload>> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

#[async_trait]
impl Transport for DryRunTransport {
    async fn submit_batch(&self, payloads: Vec<NodePayload>) -> Result<Vec<NodeResult>> {
        debug!(payloads = payloads.len(), "Dry run batch");
        let results = payloads.iter().map(|p| NodeResult::success(&p.node_id)).collect();
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(payloads);
        Ok(results)
    }
}

/// Response of the automation endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    #[serde(default)]
    pub description: String,
}

impl ApiResponse {
    pub fn success() -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            description: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    /// `Rejected` error for a non-success response.
    pub fn into_result(self) -> Result<ApiResponse> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ShardError::Rejected {
                status: self.status,
                description: self.description,
            })
        }
    }
}

/// Cloud endpoint holding automations.
#[async_trait]
pub trait AutomationApi: Send + Sync {
    async fn create(&self, automation: &Automation) -> Result<ApiResponse>;
    async fn update(&self, id: &str, patch: &AutomationPatch) -> Result<ApiResponse>;
    async fn delete(&self, id: &str) -> Result<ApiResponse>;
}

/// Automation endpoint that accepts everything.
#[derive(Debug, Default)]
pub struct DryRunAutomationApi;

#[async_trait]
impl AutomationApi for DryRunAutomationApi {
    async fn create(&self, automation: &Automation) -> Result<ApiResponse> {
        debug!(automation_id = %automation.id, "Dry run automation create");
        Ok(ApiResponse::success())
    }

    async fn update(&self, id: &str, _patch: &AutomationPatch) -> Result<ApiResponse> {
        debug!(automation_id = %id, "Dry run automation update");
        Ok(ApiResponse::success())
    }

    async fn delete(&self, id: &str) -> Result<ApiResponse> {
        debug!(automation_id = %id, "Dry run automation delete");
        Ok(ApiResponse::success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_only_success_status_succeeds() {
        assert!(NodeResult::success("n1").is_success());
        assert!(!NodeResult::failure("n1", "offline").is_success());

        let odd: NodeResult = serde_json::from_value(json!({"node_id": "n1", "status": "Success"})).unwrap();
        assert!(!odd.is_success());
        assert_eq!(odd.description, "");
    }

    #[tokio::test]
    async fn test_dry_run_records_batches() {
        let transport = DryRunTransport::new();
        let payloads = vec![
            NodePayload { node_id: "n1".into(), payload: json!({}) },
            NodePayload { node_id: "n2".into(), payload: json!({}) },
        ];

        let results = transport.submit_batch(payloads.clone()).await.unwrap();

        assert_eq!(results, vec![NodeResult::success("n1"), NodeResult::success("n2")]);
        assert_eq!(transport.last_batch(), Some(payloads));
        assert_eq!(transport.batches().len(), 1);
    }

    #[test]
    fn test_rejected_response() {
        let response = ApiResponse {
            status: "failure".into(),
            description: "quota".into(),
        };
        assert_eq!(
            response.into_result().unwrap_err(),
            ShardError::Rejected {
                status: "failure".into(),
                description: "quota".into()
            }
        );
        assert!(ApiResponse::success().into_result().is_ok());
    }
}

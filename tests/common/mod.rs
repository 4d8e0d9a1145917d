//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

use shardview::{
    Client, Config, DryRunAutomationApi, NodePayload, NodeRecord, NodeRegistry, NodeResult, Result,
    ShardError, Transport,
};

/// Holds one batch inside the transport until released.
#[derive(Default)]
pub struct Gate {
    /// Signalled once the held batch has arrived
    pub reached: Notify,
    pub release: Notify,
}

/// Transport with scripted per-node failures or a whole-batch error.
#[derive(Default)]
pub struct ScriptedTransport {
    failing: Mutex<BTreeSet<String>>,
    silent: Mutex<BTreeSet<String>>,
    error: Mutex<Option<ShardError>>,
    next_error: Mutex<Option<ShardError>>,
    gate: Mutex<Option<Arc<Gate>>>,
    batches: Mutex<Vec<Vec<NodePayload>>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `node_id` reports failure from now on.
    pub fn fail_node(&self, node_id: &str) {
        self.failing.lock().unwrap().insert(node_id.to_string());
    }

    /// `node_id` is left out of the results from now on.
    pub fn omit_result(&self, node_id: &str) {
        self.silent.lock().unwrap().insert(node_id.to_string());
    }

    /// Only the next batch fails with `err`.
    pub fn fail_next(&self, err: ShardError) {
        *self.next_error.lock().unwrap() = Some(err);
    }

    /// The next batch waits until the returned gate is released.
    pub fn hold(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Every batch fails with `err` from now on.
    pub fn fail_batch(&self, err: ShardError) {
        *self.error.lock().unwrap() = Some(err);
    }

    pub fn batches(&self) -> Vec<Vec<NodePayload>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn last_batch(&self) -> Vec<NodePayload> {
        self.batches.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn submit_batch(&self, payloads: Vec<NodePayload>) -> Result<Vec<NodeResult>> {
        self.batches.lock().unwrap().push(payloads.clone());
        let one_shot = self.next_error.lock().unwrap().take();
        let gate = self.gate.lock().unwrap().take();

        if let Some(gate) = gate {
            gate.reached.notify_one();
            gate.release.notified().await;
        }

        let error = one_shot.or_else(|| self.error.lock().unwrap().clone());
        if let Some(err) = error {
            return Err(err);
        }

        let failing = self.failing.lock().unwrap();
        let silent = self.silent.lock().unwrap();
        Ok(payloads
            .iter()
            .filter(|p| !silent.contains(&p.node_id))
            .map(|p| {
                if failing.contains(&p.node_id) {
                    NodeResult::failure(&p.node_id, "device offline")
                } else {
                    NodeResult::success(&p.node_id)
                }
            })
            .collect())
    }
}

pub fn client(transport: Arc<ScriptedTransport>) -> Client {
    Client::init(Config::default(), transport, Arc::new(DryRunAutomationApi))
}

/// Node hosting both the schedule and the scene parameter.
pub fn node(id: &str, schedules: Vec<Value>, scenes: Vec<Value>) -> NodeRecord {
    let services = Config::default().services;
    let mut record = NodeRecord::with_fragments(id, &services.schedules, schedules);
    record
        .services
        .extend(NodeRecord::with_fragments(id, &services.scenes, scenes).services);
    record
}

pub fn registry(nodes: Vec<NodeRecord>) -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    for node in nodes {
        registry.upsert(node);
    }
    registry
}

pub fn morning(action: Value) -> Value {
    json!({
        "id": "s1",
        "name": "Morning",
        "action": action,
        "triggers": [{"m": 420, "d": 127}],
        "enabled": true
    })
}

pub fn schedule_fragments(client: &Client, node_id: &str) -> Vec<Value> {
    let ids = client.config().services.schedules.clone();
    client
        .registry()
        .read(|r| r.fragments(node_id, &ids).cloned().unwrap_or_default())
}

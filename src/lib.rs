//! shardview: client-side view of entities sharded across IoT nodes
//!
//! Schedules and scenes are stored on every node they govern, one fragment
//! per node. This crate rebuilds one logical entity from those fragments,
//! works out what each node needs when the entity changes, sends all of it
//! in one batch and folds per-node results back into the cached view.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use shardview::{Client, Config, ScheduleEdit};
//!
//! let client = Client::init(Config::default(), transport, automation_api);
//! client.load_registry(registry);
//!
//! let schedule = client.schedules().handle("s1")?;
//! let results = schedule.edit(ScheduleEdit::default().with_name("Wake up")).await?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod intent;
pub mod intercept;
pub mod merge;
pub mod model;
pub mod operation;
pub mod out_of_sync;
pub mod payload;
pub mod registry;
pub mod snapshot;
pub mod store;
pub mod tracked;
pub mod transport;

pub use client::Client;
pub use config::{Config, ServiceIdentifiers};
pub use error::{Result, ShardError};
pub use events::{Change, StoreEvent};
pub use intercept::{Interceptor, TxPhase};
pub use merge::merge_fragments;
pub use model::{
    ActionMap, Automation, AutomationDraft, AutomationPatch, EntityKind, NodeId, Scene, SceneDraft, SceneEdit,
    Schedule, ScheduleDraft, ScheduleEdit, ShardedEntity, Trigger, Validity,
};
pub use operation::Operation;
pub use out_of_sync::{OutOfSyncLedger, OutOfSyncRecord, SharedField};
pub use payload::{generate_payload, NodePayload, PayloadFields};
pub use registry::{NodeRecord, NodeRegistry};
pub use store::{AutomationStore, DriftEntry, EntityHandle, FragmentStore, SceneStore, ScheduleStore};
pub use tracked::Tracked;
pub use transport::{ApiResponse, AutomationApi, DryRunAutomationApi, DryRunTransport, NodeResult, Transport};

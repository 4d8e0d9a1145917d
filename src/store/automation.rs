//! Automation store
//!
//! Automations are held by the cloud endpoint, not by nodes, so there is no
//! merge. Every change is still optimistic: it is applied locally first and
//! undone if the endpoint call fails or answers with a non-success status.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{Result, ShardError};
use crate::events::{Change, EventBus, StoreEvent};
use crate::intercept::Interceptor;
use crate::model::{ActionMap, Automation, AutomationDraft, AutomationPatch, EntityKind};
use crate::tracked::Tracked;
use crate::transport::{ApiResponse, AutomationApi};

type Table = Arc<RwLock<BTreeMap<String, Tracked<Automation>>>>;

/// Collection membership change: the slot entering or leaving the table.
struct SlotArgs {
    table: Table,
    id: String,
    slot: Tracked<Automation>,
}

impl SlotArgs {
    fn insert(&self) {
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(self.id.clone(), self.slot.clone());
    }

    fn remove(&self) {
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

pub struct AutomationStore {
    api: Arc<dyn AutomationApi>,
    events: EventBus,
    table: Table,
    update_tx: Interceptor<Automation, AutomationPatch, ApiResponse>,
    create_tx: Interceptor<Automation, SlotArgs, ApiResponse>,
    delete_tx: Interceptor<Automation, SlotArgs, ApiResponse>,
}

impl AutomationStore {
    pub fn new(api: Arc<dyn AutomationApi>, events: EventBus) -> Self {
        let update_tx: Interceptor<Automation, AutomationPatch, ApiResponse> =
            Interceptor::restoring("automation.update").action(
                |automation: &mut Automation, patch: &AutomationPatch| {
                    patch.apply(automation);
                    Ok(())
                },
            );

        let create_tx: Interceptor<Automation, SlotArgs, ApiResponse> = Interceptor::new("automation.create")
            .action(|_: &mut Automation, args: &SlotArgs| {
                args.insert();
                Ok(())
            })
            .rollback(|_: &mut Automation, _, args: &SlotArgs| args.remove());

        let delete_tx: Interceptor<Automation, SlotArgs, ApiResponse> = Interceptor::new("automation.delete")
            .action(|_: &mut Automation, args: &SlotArgs| {
                args.remove();
                Ok(())
            })
            .rollback(|_: &mut Automation, _, args: &SlotArgs| args.insert())
            .on_error(|err: &ShardError, args: &SlotArgs| match err {
                // Already gone counts as deleted
                ShardError::NotFound(_) => {
                    debug!(automation_id = %args.id, "Automation already deleted remotely");
                    Some(ApiResponse::success())
                }
                _ => None,
            });

        Self {
            api,
            events,
            table: Arc::new(RwLock::new(BTreeMap::new())),
            update_tx,
            create_tx,
            delete_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn slot(&self, id: &str) -> Result<Tracked<Automation>> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| ShardError::NotFound(format!("automation {}", id)))
    }

    fn slots(&self) -> Vec<Tracked<Automation>> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Replace the store with automations fetched from the endpoint.
    pub fn load(&self, automations: Vec<Automation>) -> usize {
        let next: BTreeMap<String, Tracked<Automation>> = automations
            .into_iter()
            .map(|mut a| {
                a.recount();
                (a.id.clone(), Tracked::new(a))
            })
            .collect();
        let count = next.len();
        *self.table.write().unwrap_or_else(PoisonError::into_inner) = next;

        info!(entities = count, "Automations loaded");
        self.events.publish(EntityKind::Automation, Change::Synced { entities: count });
        count
    }

    pub fn get(&self, id: &str) -> Option<Automation> {
        self.slot(id).ok().map(|s| s.get())
    }

    pub fn list(&self) -> Vec<Automation> {
        self.slots().iter().map(Tracked::get).collect()
    }

    pub fn len(&self) -> usize {
        self.table.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.table.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Create an automation; it is listed before the endpoint answers.
    pub async fn create(&self, draft: AutomationDraft) -> Result<Automation> {
        let automation = Automation::from_draft(draft)?;
        let id = automation.id.clone();
        if self.slot(&id).is_ok() {
            return Err(ShardError::Validation(format!("automation {} already exists", id)));
        }

        let slot = Tracked::new(automation.clone());
        let args = SlotArgs {
            table: Arc::clone(&self.table),
            id: id.clone(),
            slot: slot.clone(),
        };
        let remote = async { self.api.create(&automation).await?.into_result() };

        match self.create_tx.run(&slot, args, remote).await {
            Ok(_) => {
                info!(automation_id = %id, "Automation created");
                self.events.publish(EntityKind::Automation, Change::Created { id });
                Ok(slot.get())
            }
            Err(e) => {
                warn!(automation_id = %id, error = %e, "Automation create rolled back");
                self.events.publish(EntityKind::Automation, Change::RolledBack { id });
                Err(e)
            }
        }
    }

    pub async fn rename(&self, id: &str, name: impl Into<String>) -> Result<ApiResponse> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ShardError::Validation("automation name is required".into()));
        }
        self.update(
            id,
            AutomationPatch {
                name: Some(name),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<ApiResponse> {
        self.update(
            id,
            AutomationPatch {
                enabled: Some(enabled),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn update_events(&self, id: &str, events: Vec<serde_json::Value>, operator: Option<String>) -> Result<ApiResponse> {
        self.update(
            id,
            AutomationPatch {
                events: Some(events),
                event_operator: operator,
                ..Default::default()
            },
        )
        .await
    }

    pub async fn update_actions(&self, id: &str, actions: ActionMap) -> Result<ApiResponse> {
        if actions.is_empty() {
            return Err(ShardError::Validation(
                "automation actions must target at least one node".into(),
            ));
        }
        self.update(
            id,
            AutomationPatch {
                actions: Some(actions),
                ..Default::default()
            },
        )
        .await
    }

    async fn update(&self, id: &str, patch: AutomationPatch) -> Result<ApiResponse> {
        let slot = self.slot(id)?;
        let body = patch.clone();
        let remote = async { self.api.update(id, &body).await?.into_result() };

        match self.update_tx.run(&slot, patch, remote).await {
            Ok(response) => {
                debug!(automation_id = %id, "Automation updated");
                self.events.publish(EntityKind::Automation, Change::Updated { id: id.to_string() });
                Ok(response)
            }
            Err(e) => {
                warn!(automation_id = %id, error = %e, "Automation update rolled back");
                self.events.publish(EntityKind::Automation, Change::RolledBack { id: id.to_string() });
                Err(e)
            }
        }
    }

    /// Delete an automation; it disappears before the endpoint answers and
    /// comes back if the call fails.
    pub async fn delete(&self, id: &str) -> Result<ApiResponse> {
        let slot = self.slot(id)?;
        let args = SlotArgs {
            table: Arc::clone(&self.table),
            id: id.to_string(),
            slot: slot.clone(),
        };
        let remote = async { self.api.delete(id).await?.into_result() };

        match self.delete_tx.run(&slot, args, remote).await {
            Ok(response) => {
                // A recovered failure has already been rolled back into the table
                self.table.write().unwrap_or_else(PoisonError::into_inner).remove(id);
                info!(automation_id = %id, "Automation deleted");
                self.events.publish(EntityKind::Automation, Change::Removed { id: id.to_string() });
                Ok(response)
            }
            Err(e) => {
                warn!(automation_id = %id, error = %e, "Automation delete rolled back");
                self.events.publish(EntityKind::Automation, Change::RolledBack { id: id.to_string() });
                Err(e)
            }
        }
    }
}

//! Client context
//!
//! One [`Client`] holds everything the stores share: configuration, the node
//! registry, the transport and the event channel. Build it once with
//! [`Client::init`] and pass it where it is needed.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use crate::config::Config;
use crate::events::{EventBus, StoreEvent};
use crate::model::NodeId;
use crate::registry::NodeRegistry;
use crate::store::{AutomationStore, SceneStore, ScheduleStore};
use crate::tracked::Tracked;
use crate::transport::{AutomationApi, Transport};

pub struct Client {
    config: Config,
    registry: Tracked<NodeRegistry>,
    events: EventBus,
    schedules: ScheduleStore,
    scenes: SceneStore,
    automations: AutomationStore,
}

impl Client {
    pub fn init(config: Config, transport: Arc<dyn Transport>, automation_api: Arc<dyn AutomationApi>) -> Self {
        let registry = Tracked::new(NodeRegistry::new());
        let events = EventBus::new(config.store.event_capacity);

        let schedules = ScheduleStore::new(
            config.services.schedules.clone(),
            registry.clone(),
            Arc::clone(&transport),
            events.clone(),
        );
        let scenes = SceneStore::new(
            config.services.scenes.clone(),
            registry.clone(),
            transport,
            events.clone(),
        );
        let automations = AutomationStore::new(automation_api, events.clone());

        info!("Client initialized");
        Self {
            config,
            registry,
            events,
            schedules,
            scenes,
            automations,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Cached node configuration shared by the stores.
    pub fn registry(&self) -> &Tracked<NodeRegistry> {
        &self.registry
    }

    pub fn schedules(&self) -> &ScheduleStore {
        &self.schedules
    }

    pub fn scenes(&self) -> &SceneStore {
        &self.scenes
    }

    pub fn automations(&self) -> &AutomationStore {
        &self.automations
    }

    /// Events from every store.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Replace the registry contents and re-merge.
    pub fn load_registry(&self, registry: NodeRegistry) {
        self.registry.write(|r| *r = registry);
        self.sync(None);
    }

    /// Re-merge schedules and scenes from the registry.
    pub fn sync(&self, node_ids: Option<&[NodeId]>) {
        let schedules = self.schedules.sync(node_ids);
        let scenes = self.scenes.sync(node_ids);
        info!(schedules, scenes, "Client synced");
    }

    /// Drop every cached entity and node.
    pub fn teardown(&self) {
        self.schedules.clear();
        self.scenes.clear();
        self.automations.clear();
        self.registry.write(NodeRegistry::clear);
        info!("Client torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::NodeRecord;
    use crate::transport::{DryRunAutomationApi, DryRunTransport};
    use serde_json::json;

    fn client() -> Client {
        Client::init(
            Config::default(),
            Arc::new(DryRunTransport::new()),
            Arc::new(DryRunAutomationApi),
        )
    }

    #[test]
    fn test_load_registry_merges_both_kinds() {
        let client = client();
        let services = client.config().services.clone();

        let mut registry = NodeRegistry::new();
        let mut node = NodeRecord::with_fragments(
            "n1",
            &services.schedules,
            vec![json!({"id": "s1", "name": "Morning", "action": {}, "triggers": [{"m": 420}]})],
        );
        node.services.extend(
            NodeRecord::with_fragments("n1", &services.scenes, vec![json!({"id": "c1", "name": "Evening", "action": {}})])
                .services,
        );
        registry.upsert(node);

        client.load_registry(registry);
        assert_eq!(client.schedules().ids(), vec!["s1"]);
        assert_eq!(client.scenes().ids(), vec!["c1"]);

        client.teardown();
        assert!(client.schedules().is_empty());
        assert!(client.scenes().is_empty());
        assert!(client.registry().read(NodeRegistry::is_empty));
    }
}

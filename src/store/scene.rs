//! Scene store

use crate::error::Result;
use crate::model::Scene;
use crate::transport::NodeResult;

use super::{EntityHandle, FragmentStore, Mutation};

pub type SceneStore = FragmentStore<Scene>;

impl EntityHandle<'_, Scene> {
    /// Apply the scene's device states on every node.
    pub async fn activate(&self) -> Result<Vec<NodeResult>> {
        self.store.transact(&self.slot, Mutation::Activate).await
    }
}

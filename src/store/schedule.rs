//! Schedule store

use crate::error::Result;
use crate::model::Schedule;
use crate::transport::NodeResult;

use super::{EntityHandle, FragmentStore, Mutation};

pub type ScheduleStore = FragmentStore<Schedule>;

impl EntityHandle<'_, Schedule> {
    /// Activate the schedule on every node.
    pub async fn enable(&self) -> Result<Vec<NodeResult>> {
        self.store.transact(&self.slot, Mutation::Toggle(true)).await
    }

    pub async fn disable(&self) -> Result<Vec<NodeResult>> {
        self.store.transact(&self.slot, Mutation::Toggle(false)).await
    }
}

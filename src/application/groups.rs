// Group lifecycle flows: start, join, leave, close.
//
// Responsibilities
// - Mint group and segment ids at this boundary (the core never generates
//   ids) and drive the store, which serializes transitions per group.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::application::errors::ApplicationError;
use crate::application::policy::LocationPolicy;
use crate::core::group::{SegmentMember, SplitMode, TipGroup};
use crate::core::ports::GroupStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartGroupRequest {
    pub name: String,
    pub split_mode: SplitMode,
    /// (employee id, role tip weight) pairs from the scheduling
    /// collaborator.
    pub initial_members: Vec<(String, u64)>,
    pub started_at: i64,
}

pub struct GroupHandler<G> {
    policy: LocationPolicy,
    groups: Arc<G>,
}

impl<G: GroupStore> GroupHandler<G> {
    pub fn new(policy: LocationPolicy, groups: Arc<G>) -> Self {
        Self { policy, groups }
    }

    pub async fn start(&self, request: StartGroupRequest) -> Result<TipGroup, ApplicationError> {
        let members = request
            .initial_members
            .into_iter()
            .map(|(employee_id, tip_weight)| SegmentMember {
                employee_id,
                tip_weight,
            })
            .collect();
        let group = TipGroup::start(
            Uuid::now_v7().to_string(),
            self.policy.location_id.clone(),
            request.name,
            request.split_mode,
            members,
            request.started_at,
            Uuid::now_v7().to_string(),
        )
        .map_err(|e| ApplicationError::Validation(e.to_string()))?;
        self.groups.create(group.clone()).await?;
        info!(group_id = %group.id, "tip group started");
        Ok(group)
    }

    pub async fn join(
        &self,
        group_id: &str,
        employee_id: &str,
        tip_weight: u64,
        at: i64,
    ) -> Result<TipGroup, ApplicationError> {
        let group = self
            .groups
            .join(group_id, employee_id, tip_weight, at, Uuid::now_v7().to_string())
            .await?;
        info!(group_id, employee_id, "joined tip group");
        Ok(group)
    }

    pub async fn leave(
        &self,
        group_id: &str,
        employee_id: &str,
        at: i64,
    ) -> Result<TipGroup, ApplicationError> {
        let group = self
            .groups
            .leave(group_id, employee_id, at, Uuid::now_v7().to_string())
            .await?;
        info!(group_id, employee_id, "left tip group");
        Ok(group)
    }

    pub async fn close(&self, group_id: &str, at: i64) -> Result<TipGroup, ApplicationError> {
        let group = self.groups.close(group_id, at).await?;
        info!(group_id, "tip group closed");
        Ok(group)
    }

    pub async fn get(&self, group_id: &str) -> Result<TipGroup, ApplicationError> {
        Ok(self.groups.get(group_id).await?)
    }
}

// In-memory implementation of the GroupStore port.
//
// Responsibilities
// - Hold groups and apply lifecycle transitions under a write lock, which
//   serializes membership changes and keeps segments non-overlapping. A
//   relational backend would take a per-group row lock instead.
// - Enforce the location-wide rule: one active pool per employee.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::group::{GroupStatus, TipGroup};
use crate::core::ports::{GroupStore, GroupStoreError};

#[derive(Default)]
pub struct InMemoryGroupStore {
    inner: RwLock<HashMap<String, TipGroup>>,
}

impl InMemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn find_active_pool(
        groups: &HashMap<String, TipGroup>,
        location_id: &str,
        employee_id: &str,
        at: i64,
    ) -> Option<String> {
        groups
            .values()
            .filter(|g| g.location_id == location_id && g.status == GroupStatus::Open)
            .find(|g| g.is_active_member(employee_id, at))
            .map(|g| g.id.clone())
    }
}

#[async_trait]
impl GroupStore for InMemoryGroupStore {
    async fn create(&self, group: TipGroup) -> Result<(), GroupStoreError> {
        let mut groups = self.inner.write().await;
        if groups.contains_key(&group.id) {
            return Err(GroupStoreError::AlreadyExists {
                group_id: group.id.clone(),
            });
        }
        let started_at = group.segments[0].started_at;
        for member in &group.segments[0].members {
            if let Some(other) = Self::find_active_pool(
                &groups,
                &group.location_id,
                &member.employee_id,
                started_at,
            ) {
                return Err(GroupStoreError::AlreadyPooled {
                    employee_id: member.employee_id.clone(),
                    group_id: other,
                });
            }
        }
        groups.insert(group.id.clone(), group);
        Ok(())
    }

    async fn join(
        &self,
        group_id: &str,
        employee_id: &str,
        tip_weight: u64,
        at: i64,
        segment_id: String,
    ) -> Result<TipGroup, GroupStoreError> {
        let mut groups = self.inner.write().await;
        let location_id = groups
            .get(group_id)
            .ok_or_else(|| GroupStoreError::NotFound(group_id.to_string()))?
            .location_id
            .clone();
        if let Some(other) = Self::find_active_pool(&groups, &location_id, employee_id, at) {
            return Err(GroupStoreError::AlreadyPooled {
                employee_id: employee_id.to_string(),
                group_id: other,
            });
        }
        let group = groups
            .get_mut(group_id)
            .ok_or_else(|| GroupStoreError::NotFound(group_id.to_string()))?;
        group.join(employee_id, tip_weight, at, segment_id)?;
        Ok(group.clone())
    }

    async fn leave(
        &self,
        group_id: &str,
        employee_id: &str,
        at: i64,
        segment_id: String,
    ) -> Result<TipGroup, GroupStoreError> {
        let mut groups = self.inner.write().await;
        let group = groups
            .get_mut(group_id)
            .ok_or_else(|| GroupStoreError::NotFound(group_id.to_string()))?;
        group.leave(employee_id, at, segment_id)?;
        Ok(group.clone())
    }

    async fn close(&self, group_id: &str, at: i64) -> Result<TipGroup, GroupStoreError> {
        let mut groups = self.inner.write().await;
        let group = groups
            .get_mut(group_id)
            .ok_or_else(|| GroupStoreError::NotFound(group_id.to_string()))?;
        group.close(at)?;
        Ok(group.clone())
    }

    async fn get(&self, group_id: &str) -> Result<TipGroup, GroupStoreError> {
        let groups = self.inner.read().await;
        groups
            .get(group_id)
            .cloned()
            .ok_or_else(|| GroupStoreError::NotFound(group_id.to_string()))
    }

    async fn groups_for_location(
        &self,
        location_id: &str,
    ) -> Result<Vec<TipGroup>, GroupStoreError> {
        let groups = self.inner.read().await;
        let mut matching: Vec<TipGroup> = groups
            .values()
            .filter(|g| g.location_id == location_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matching)
    }
}

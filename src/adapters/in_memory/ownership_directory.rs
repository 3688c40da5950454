// In-memory implementation of the OwnershipDirectory port.
//
// The order collaborator records who owns each tab; corrections overwrite
// the record before a recalculation replays the allocation.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::allocation::OrderOwnership;
use crate::core::ports::OwnershipDirectory;

#[derive(Default)]
pub struct InMemoryOwnershipDirectory {
    inner: RwLock<HashMap<String, OrderOwnership>>,
}

impl InMemoryOwnershipDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OwnershipDirectory for InMemoryOwnershipDirectory {
    async fn ownership_for(&self, order_id: &str) -> anyhow::Result<Option<OrderOwnership>> {
        let records = self.inner.read().await;
        Ok(records.get(order_id).cloned())
    }

    async fn record(&self, ownership: OrderOwnership) -> anyhow::Result<()> {
        ownership.validate()?;
        let mut records = self.inner.write().await;
        records.insert(ownership.order_id.clone(), ownership);
        Ok(())
    }
}

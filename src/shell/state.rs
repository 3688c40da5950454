// Composition root: wire the in-memory infrastructure into the handlers.

use std::sync::Arc;

use crate::adapters::in_memory::group_store::InMemoryGroupStore;
use crate::adapters::in_memory::ledger_store::InMemoryLedgerStore;
use crate::adapters::in_memory::ownership_directory::InMemoryOwnershipDirectory;
use crate::application::chargeback::ChargebackHandler;
use crate::application::groups::GroupHandler;
use crate::application::policy::LocationPolicy;
use crate::application::posting::TipPostingHandler;
use crate::application::recalculation::RecalculationHandler;
use crate::application::reporting::ReportingService;
use crate::application::transfers::TransferHandler;

#[derive(Clone)]
pub struct AppState {
    pub posting: Arc<
        TipPostingHandler<InMemoryLedgerStore, InMemoryGroupStore, InMemoryOwnershipDirectory>,
    >,
    pub chargebacks: Arc<ChargebackHandler<InMemoryLedgerStore>>,
    pub recalculations: Arc<
        RecalculationHandler<InMemoryLedgerStore, InMemoryGroupStore, InMemoryOwnershipDirectory>,
    >,
    pub transfers: Arc<TransferHandler<InMemoryLedgerStore>>,
    pub groups: Arc<GroupHandler<InMemoryGroupStore>>,
    pub reporting: Arc<ReportingService<InMemoryLedgerStore, InMemoryGroupStore>>,
    pub ownership: Arc<InMemoryOwnershipDirectory>,
}

impl AppState {
    pub fn in_memory(policy: LocationPolicy) -> Self {
        let ledger = Arc::new(InMemoryLedgerStore::new());
        let groups = Arc::new(InMemoryGroupStore::new());
        let ownership = Arc::new(InMemoryOwnershipDirectory::new());

        Self {
            posting: Arc::new(TipPostingHandler::new(
                policy.clone(),
                ledger.clone(),
                groups.clone(),
                ownership.clone(),
            )),
            chargebacks: Arc::new(ChargebackHandler::new(policy.clone(), ledger.clone())),
            recalculations: Arc::new(RecalculationHandler::new(
                policy.clone(),
                ledger.clone(),
                groups.clone(),
                ownership.clone(),
            )),
            transfers: Arc::new(TransferHandler::new(policy.clone(), ledger.clone())),
            groups: Arc::new(GroupHandler::new(policy.clone(), groups.clone())),
            reporting: Arc::new(ReportingService::new(policy, ledger, groups)),
            ownership,
        }
    }
}

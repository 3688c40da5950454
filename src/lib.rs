// Crate entry point. Re-export modules so tests and binaries can import
// them easily.
//
// Responsibilities
// - Only declare and expose modules. No business logic here.

pub mod core {
    pub mod allocation;
    pub mod chargeback;
    pub mod compliance;
    pub mod entry;
    pub mod group;
    pub mod idempotency;
    pub mod money;
    pub mod ports;
    pub mod recalculation;
}

pub mod application {
    pub mod chargeback;
    pub mod errors;
    pub mod groups;
    pub mod policy;
    pub mod posting;
    pub mod recalculation;
    pub mod reporting;
    pub mod transfers;
}

pub mod adapters {
    pub mod in_memory {
        pub mod group_store;
        pub mod ledger_store;
        pub mod ownership_directory;
    }
}

pub mod shell {
    pub mod http;
    pub mod state;
}

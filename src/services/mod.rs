//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! Persistence modules are free functions over any `PgExecutor`, so they can be
//! composed inside one database transaction by the settlement store.

pub mod commission;
pub mod provider_client;
pub mod recovery;
pub mod service_catalog;
pub mod service_request_store;
pub mod settlement_store;
pub mod transaction_log;
pub mod vend_orchestrator;
pub mod wallet_ledger;

#[cfg(test)]
pub mod memory_store;

//! Settlement store - the persistence seam of the vend orchestrator.
//!
//! The orchestrator never issues queries itself. It asks a [`SettlementStore`]
//! for the few atomic units the settlement protocol needs:
//!
//! - `charge`: wallet debit + PENDING transaction insert
//! - `settle_success`: PENDING → COMPLETED + COMPLETED service request
//! - `settle_failure`: PENDING → FAILED + refund + FAILED service request
//! - `credit_commission`: commission entry + upline balance credit
//!
//! # Atomicity Guarantees
//!
//! In [`PgSettlementStore`] each unit is one PostgreSQL transaction. The
//! database ensures all-or-nothing execution, so a refund is never issued
//! without the FAILED status and vice versa.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        commission::CommissionEntry,
        service::Service,
        service_request::{NewServiceRequest, ServiceRequest},
        transaction::{NewCharge, Transaction, TransactionStatus},
    },
    services::{
        commission, service_catalog, service_request_store, transaction_log, wallet_ledger,
    },
};

#[async_trait]
pub trait SettlementStore: Send + Sync {
    async fn find_service(&self, service_id: Uuid) -> Result<Option<Service>, AppError>;

    /// Spendable balance; zero when the wallet does not exist yet.
    async fn wallet_balance(&self, user_id: Uuid) -> Result<Decimal, AppError>;

    async fn find_by_idempotency_key(
        &self,
        user_id: Uuid,
        key: &str,
    ) -> Result<Option<Transaction>, AppError>;

    async fn find_service_request(&self, reference: &str)
    -> Result<Option<ServiceRequest>, AppError>;

    /// Debit the wallet and record a PENDING transaction, atomically.
    ///
    /// # Errors
    ///
    /// - `InsufficientFunds`: nothing was written
    /// - `DuplicateRequest`: the idempotency key is taken; nothing was written
    async fn charge(&self, charge: NewCharge) -> Result<Transaction, AppError>;

    /// Mark the transaction COMPLETED and store its service request, atomically.
    ///
    /// Fails without writing anything if the transaction is not PENDING.
    async fn settle_success(
        &self,
        reference: &str,
        request: NewServiceRequest,
    ) -> Result<Transaction, AppError>;

    /// Mark the transaction FAILED, refund exactly the charged amount and store
    /// the service request, atomically.
    ///
    /// Returns `None` (and writes nothing) if the transaction was already settled.
    async fn settle_failure(
        &self,
        reference: &str,
        request: NewServiceRequest,
    ) -> Result<Option<Transaction>, AppError>;

    async fn find_upline(&self, user_id: Uuid) -> Result<Option<Uuid>, AppError>;

    /// Record a commission entry and credit the upline, atomically.
    ///
    /// Returns `false` when the entry already exists or its transaction is not COMPLETED.
    async fn credit_commission(&self, entry: &CommissionEntry) -> Result<bool, AppError>;

    /// PENDING transactions created before `cutoff`.
    async fn stale_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<Transaction>, AppError>;
}

/// PostgreSQL-backed settlement store.
#[derive(Clone)]
pub struct PgSettlementStore {
    pool: DbPool,
}

impl PgSettlementStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn shared(pool: DbPool) -> Arc<dyn SettlementStore> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SettlementStore for PgSettlementStore {
    async fn find_service(&self, service_id: Uuid) -> Result<Option<Service>, AppError> {
        service_catalog::find_service(&self.pool, service_id).await
    }

    async fn wallet_balance(&self, user_id: Uuid) -> Result<Decimal, AppError> {
        wallet_ledger::balance(&self.pool, user_id).await
    }

    async fn find_by_idempotency_key(
        &self,
        user_id: Uuid,
        key: &str,
    ) -> Result<Option<Transaction>, AppError> {
        transaction_log::find_by_idempotency_key(&self.pool, user_id, key).await
    }

    async fn find_service_request(
        &self,
        reference: &str,
    ) -> Result<Option<ServiceRequest>, AppError> {
        service_request_store::find_by_reference(&self.pool, reference).await
    }

    async fn charge(&self, charge: NewCharge) -> Result<Transaction, AppError> {
        let mut tx = self.pool.begin().await?;

        // Conditional decrement; a failed floor check leaves the balance untouched
        if let Err(e) = wallet_ledger::debit(&mut *tx, charge.user_id, charge.amount).await {
            tx.rollback().await?;
            return Err(e);
        }

        let transaction = match transaction_log::insert_pending(&mut *tx, &charge).await {
            Ok(transaction) => transaction,
            Err(e) => {
                tx.rollback().await?;
                return Err(e);
            }
        };

        // Commit debit and PENDING row together
        tx.commit().await?;

        Ok(transaction)
    }

    async fn settle_success(
        &self,
        reference: &str,
        request: NewServiceRequest,
    ) -> Result<Transaction, AppError> {
        let mut tx = self.pool.begin().await?;

        let Some(transaction) =
            transaction_log::mark_settled(&mut *tx, reference, TransactionStatus::Completed)
                .await?
        else {
            tx.rollback().await?;
            return Err(AppError::Unexpected(format!(
                "Transaction {reference} is not pending"
            )));
        };

        service_request_store::insert(&mut *tx, &request, TransactionStatus::Completed).await?;

        tx.commit().await?;

        Ok(transaction)
    }

    async fn settle_failure(
        &self,
        reference: &str,
        request: NewServiceRequest,
    ) -> Result<Option<Transaction>, AppError> {
        let mut tx = self.pool.begin().await?;

        let Some(transaction) =
            transaction_log::mark_settled(&mut *tx, reference, TransactionStatus::Failed).await?
        else {
            tx.rollback().await?;
            return Ok(None);
        };

        // Refund exactly what the row says was charged
        wallet_ledger::credit(&mut *tx, transaction.user_id, transaction.charged_amount()).await?;
        service_request_store::insert(&mut *tx, &request, TransactionStatus::Failed).await?;

        tx.commit().await?;

        Ok(Some(transaction))
    }

    async fn find_upline(&self, user_id: Uuid) -> Result<Option<Uuid>, AppError> {
        commission::find_upline(&self.pool, user_id).await
    }

    async fn credit_commission(&self, entry: &CommissionEntry) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        if !commission::record_entry(&mut *tx, entry).await? {
            tx.rollback().await?;
            return Ok(false);
        }

        wallet_ledger::credit_commission(&mut *tx, entry.upline_id, entry.amount).await?;

        tx.commit().await?;

        Ok(true)
    }

    async fn stale_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<Transaction>, AppError> {
        transaction_log::list_pending_before(&self.pool, cutoff).await
    }
}

//! Commission distributor - pays a buyer's upline per vended unit.
//!
//! Distribution happens after the transaction is COMPLETED and is best-effort:
//! every unit is credited in its own database transaction, and a failure is
//! logged and skipped. Nothing here can fail or unwind the vend that earned it.

use std::sync::Arc;

use rust_decimal::Decimal;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::commission::CommissionEntry,
    services::settlement_store::SettlementStore,
};

/// Upline configured for `user_id`, if any.
pub async fn find_upline(conn: impl PgExecutor<'_>, user_id: Uuid) -> Result<Option<Uuid>, AppError> {
    let upline: Option<Uuid> =
        sqlx::query_scalar("SELECT upline_id FROM referrals WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(conn)
            .await?;

    Ok(upline)
}

/// Insert a commission entry if its transaction is COMPLETED and the unit has
/// not been paid yet. Returns whether a row was written.
pub async fn record_entry(
    conn: impl PgExecutor<'_>,
    entry: &CommissionEntry,
) -> Result<bool, AppError> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO commission_entries (
            reference,
            unit_index,
            upline_id,
            buyer_id,
            service_id,
            amount
        )
        SELECT $1, $2, $3, $4, $5, $6
        WHERE EXISTS (
            SELECT 1 FROM transactions
            WHERE reference = $1 AND status = 'completed'
        )
        ON CONFLICT (reference, unit_index) DO NOTHING
        "#,
    )
    .bind(&entry.reference)
    .bind(entry.unit_index)
    .bind(entry.upline_id)
    .bind(entry.buyer_id)
    .bind(entry.service_id)
    .bind(entry.amount)
    .execute(conn)
    .await?
    .rows_affected();

    Ok(inserted == 1)
}

/// Credits uplines for completed vends.
#[derive(Clone)]
pub struct CommissionDistributor {
    store: Arc<dyn SettlementStore>,
}

impl CommissionDistributor {
    pub fn new(store: Arc<dyn SettlementStore>) -> Self {
        Self { store }
    }

    /// Credit one commission per purchased unit. Returns how many credits landed.
    pub async fn distribute(
        &self,
        buyer_id: Uuid,
        service_id: Uuid,
        reference: &str,
        units: i32,
    ) -> u32 {
        let mut credited = 0;
        for unit_index in 0..units {
            if self.credit(buyer_id, service_id, reference, unit_index).await {
                credited += 1;
            }
        }
        credited
    }

    /// Credit the buyer's upline with the service's commission for one unit.
    ///
    /// No-op when the buyer has no upline or the service pays no commission.
    /// Never fails; errors are logged.
    pub async fn credit(
        &self,
        buyer_id: Uuid,
        service_id: Uuid,
        reference: &str,
        unit_index: i32,
    ) -> bool {
        match self
            .try_credit(buyer_id, service_id, reference, unit_index)
            .await
        {
            Ok(Some(entry)) => {
                tracing::info!(
                    reference,
                    unit_index,
                    upline_id = %entry.upline_id,
                    amount = %entry.amount,
                    "Commission credited"
                );
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::error!(
                    reference,
                    unit_index,
                    buyer_id = %buyer_id,
                    "Commission credit failed: {:?}",
                    e
                );
                false
            }
        }
    }

    async fn try_credit(
        &self,
        buyer_id: Uuid,
        service_id: Uuid,
        reference: &str,
        unit_index: i32,
    ) -> Result<Option<CommissionEntry>, AppError> {
        let Some(upline_id) = self.store.find_upline(buyer_id).await? else {
            return Ok(None);
        };

        let amount = self
            .store
            .find_service(service_id)
            .await?
            .and_then(|service| service.commission_amount)
            .filter(|amount| *amount > Decimal::ZERO);
        let Some(amount) = amount else {
            return Ok(None);
        };

        let entry = CommissionEntry {
            reference: reference.to_string(),
            unit_index,
            upline_id,
            buyer_id,
            service_id,
            amount,
        };

        if self.store.credit_commission(&entry).await? {
            Ok(Some(entry))
        } else {
            tracing::debug!(reference, unit_index, "Commission already paid or not payable");
            Ok(None)
        }
    }
}

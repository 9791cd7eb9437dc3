//! Start-up recovery of abandoned vend attempts.
//!
//! A process that dies between the charge and its settlement leaves a PENDING
//! transaction with the wallet already debited. On start-up every PENDING row
//! older than the stale threshold is settled as FAILED with a refund, using the
//! purchase description stored with the charge to write its service request.

use std::time::Duration;

use chrono::Utc;

use crate::{
    error::AppError,
    models::{
        service_request::{NewServiceRequest, ServiceRequestDetails},
        transaction::Transaction,
    },
    services::settlement_store::SettlementStore,
};

const ABANDONED_MESSAGE: &str = "Attempt abandoned before the provider confirmed";

/// Refund every PENDING attempt older than `stale_after`. Returns how many were settled.
pub async fn recover_abandoned(
    store: &dyn SettlementStore,
    stale_after: Duration,
) -> Result<usize, AppError> {
    let stale_after = chrono::Duration::from_std(stale_after)
        .map_err(|e| AppError::Unexpected(format!("Invalid recovery threshold: {e}")))?;
    let cutoff = Utc::now() - stale_after;

    let stale = store.stale_pending(cutoff).await?;
    if stale.is_empty() {
        return Ok(0);
    }
    tracing::warn!(count = stale.len(), "Found abandoned vend attempts");

    let mut recovered = 0;
    for transaction in stale {
        let Some(request) = abandoned_request(&transaction) else {
            tracing::error!(
                reference = %transaction.reference,
                "Abandoned attempt has no purchase context, leaving it for manual review"
            );
            continue;
        };

        match store.settle_failure(&transaction.reference, request).await {
            Ok(Some(_)) => {
                tracing::info!(
                    reference = %transaction.reference,
                    user_id = %transaction.user_id,
                    refunded = %transaction.charged_amount(),
                    "Abandoned attempt refunded"
                );
                recovered += 1;
            }
            Ok(None) => {
                tracing::debug!(reference = %transaction.reference, "Attempt settled meanwhile");
            }
            Err(e) => {
                tracing::error!(
                    reference = %transaction.reference,
                    "Failed to refund abandoned attempt: {:?}",
                    e
                );
            }
        }
    }

    Ok(recovered)
}

fn abandoned_request(transaction: &Transaction) -> Option<NewServiceRequest> {
    let context = transaction.vend_context()?;

    Some(NewServiceRequest {
        user_id: transaction.user_id,
        service_id: transaction.service_id,
        reference: transaction.reference.clone(),
        details: ServiceRequestDetails::new(&context, None),
        raw_payload: None,
        provider_message: Some(ABANDONED_MESSAGE.to_string()),
        provider_status: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        service::ServiceCategory,
        transaction::{NewCharge, TransactionStatus, VendContext},
    };
    use crate::services::memory_store::MemoryStore;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    async fn pending_charge(store: &MemoryStore, user_id: Uuid, amount: Decimal) -> String {
        let reference = format!("VND{}", Uuid::new_v4().simple());
        store
            .charge(NewCharge {
                reference: reference.clone(),
                user_id,
                service_id: Uuid::new_v4(),
                amount,
                description: "WAEC x1".to_string(),
                idempotency_key: None,
                context: VendContext {
                    category: ServiceCategory::ExamPin,
                    destination: None,
                    quantity: 1,
                    amount: None,
                },
            })
            .await
            .unwrap();
        reference
    }

    #[tokio::test]
    async fn test_stale_attempts_are_refunded() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store.fund(user, dec!(1000));

        let stale = pending_charge(&store, user, dec!(500)).await;
        store.backdate(&stale, chrono::Duration::minutes(10));
        let fresh = pending_charge(&store, user, dec!(200)).await;
        assert_eq!(store.balance(user), dec!(300));

        let recovered = recover_abandoned(&store, Duration::from_secs(300)).await.unwrap();

        assert_eq!(recovered, 1);
        assert_eq!(store.balance(user), dec!(800));
        assert_eq!(store.transaction(&stale).unwrap().status, TransactionStatus::Failed);
        assert_eq!(store.transaction(&fresh).unwrap().status, TransactionStatus::Pending);

        let request = store.service_request(&stale).unwrap();
        assert_eq!(request.status, TransactionStatus::Failed);
        assert_eq!(request.provider_message.as_deref(), Some(ABANDONED_MESSAGE));
    }

    #[tokio::test]
    async fn test_recovery_is_idempotent() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store.fund(user, dec!(500));

        let stale = pending_charge(&store, user, dec!(500)).await;
        store.backdate(&stale, chrono::Duration::hours(1));

        assert_eq!(recover_abandoned(&store, Duration::from_secs(60)).await.unwrap(), 1);
        assert_eq!(recover_abandoned(&store, Duration::from_secs(60)).await.unwrap(), 0);
        assert_eq!(store.balance(user), dec!(500));
    }
}

//! Transaction log - one row per charge attempt, keyed by reference.
//!
//! Rows are inserted PENDING together with the wallet debit and leave that
//! state exactly once through [`mark_settled`], a compare-and-set on the status.

use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::transaction::{NewCharge, Transaction, TransactionStatus},
};

/// Unique constraint guarding `(user_id, idempotency_key)`.
pub const IDEMPOTENCY_CONSTRAINT: &str = "transactions_idempotency_unique";

/// Record a new PENDING charge.
///
/// The stored amount is negative: the wallet was charged `charge.amount`.
///
/// # Errors
///
/// - `DuplicateRequest`: another attempt already holds this idempotency key
pub async fn insert_pending(
    conn: impl PgExecutor<'_>,
    charge: &NewCharge,
) -> Result<Transaction, AppError> {
    let metadata = serde_json::to_value(&charge.context)
        .map_err(|e| AppError::Unexpected(format!("Failed to serialize vend context: {e}")))?;

    sqlx::query_as::<_, Transaction>(
        r#"
        INSERT INTO transactions (
            reference,
            user_id,
            service_id,
            amount,
            status,
            description,
            idempotency_key,
            metadata
        )
        VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(&charge.reference)
    .bind(charge.user_id)
    .bind(charge.service_id)
    .bind(-charge.amount)
    .bind(&charge.description)
    .bind(&charge.idempotency_key)
    .bind(metadata)
    .fetch_one(conn)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.constraint() == Some(IDEMPOTENCY_CONSTRAINT) => {
            AppError::DuplicateRequest(
                "A request with this idempotency key is already in progress".to_string(),
            )
        }
        _ => AppError::Database(e),
    })
}

/// Move a PENDING transaction to a terminal status.
///
/// Returns `None` when the reference is unknown or already settled; a settled
/// transaction is never changed again.
pub async fn mark_settled(
    conn: impl PgExecutor<'_>,
    reference: &str,
    status: TransactionStatus,
) -> Result<Option<Transaction>, AppError> {
    if !status.is_terminal() {
        return Err(AppError::Unexpected(format!(
            "Cannot settle {reference} to a non-terminal status"
        )));
    }

    let transaction = sqlx::query_as::<_, Transaction>(
        r#"
        UPDATE transactions
        SET status = $2,
            settled_at = NOW()
        WHERE reference = $1 AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(reference)
    .bind(status)
    .fetch_optional(conn)
    .await?;

    Ok(transaction)
}

pub async fn find_by_reference(
    conn: impl PgExecutor<'_>,
    reference: &str,
) -> Result<Option<Transaction>, AppError> {
    let transaction =
        sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE reference = $1")
            .bind(reference)
            .fetch_optional(conn)
            .await?;

    Ok(transaction)
}

pub async fn find_by_idempotency_key(
    conn: impl PgExecutor<'_>,
    user_id: Uuid,
    key: &str,
) -> Result<Option<Transaction>, AppError> {
    let transaction = sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE user_id = $1 AND idempotency_key = $2",
    )
    .bind(user_id)
    .bind(key)
    .fetch_optional(conn)
    .await?;

    Ok(transaction)
}

/// Most recent transactions of a user, newest first.
pub async fn list_for_user(
    conn: impl PgExecutor<'_>,
    user_id: Uuid,
    limit: i64,
) -> Result<Vec<Transaction>, AppError> {
    let transactions = sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(conn)
    .await?;

    Ok(transactions)
}

/// PENDING transactions created before `cutoff`, oldest first.
pub async fn list_pending_before(
    conn: impl PgExecutor<'_>,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Transaction>, AppError> {
    let transactions = sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE status = 'pending' AND created_at < $1 ORDER BY created_at",
    )
    .bind(cutoff)
    .fetch_all(conn)
    .await?;

    Ok(transactions)
}

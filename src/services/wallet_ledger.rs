//! Wallet ledger - atomic balance storage.
//!
//! Every function takes any Postgres executor, so the same call works against the
//! pool or inside an open `pool.begin()` transaction alongside the transaction
//! log write it belongs with.
//!
//! # Balance Rules
//!
//! - Debits are a single conditional `UPDATE ... WHERE balance >= $amount`; the
//!   affected-row count decides between success and insufficient funds.
//!   There is no read-then-write path.
//! - Credits always succeed and create the wallet if it does not exist yet.

use rust_decimal::Decimal;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::{error::AppError, models::wallet::Wallet};

/// Fetch a wallet, creating an empty one on first access.
pub async fn find_or_create_wallet(
    conn: impl PgExecutor<'_>,
    user_id: Uuid,
) -> Result<Wallet, AppError> {
    // The no-op update makes RETURNING yield the existing row on conflict
    let wallet = sqlx::query_as::<_, Wallet>(
        r#"
        INSERT INTO wallets (user_id)
        VALUES ($1)
        ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
        RETURNING user_id, balance, commission_balance, updated_at
        "#,
    )
    .bind(user_id)
    .fetch_one(conn)
    .await?;

    Ok(wallet)
}

/// Current spendable balance; zero for a wallet that does not exist yet.
pub async fn balance(conn: impl PgExecutor<'_>, user_id: Uuid) -> Result<Decimal, AppError> {
    let balance: Option<Decimal> =
        sqlx::query_scalar("SELECT balance FROM wallets WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(conn)
            .await?;

    Ok(balance.unwrap_or(Decimal::ZERO))
}

/// Take `amount` from the wallet if and only if the balance covers it.
///
/// # Errors
///
/// - `InsufficientFunds`: balance below `amount` (or no wallet); nothing changed
/// - `Validation`: `amount` is not positive
pub async fn debit(
    conn: impl PgExecutor<'_>,
    user_id: Uuid,
    amount: Decimal,
) -> Result<(), AppError> {
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation("Amount must be positive".to_string()));
    }

    let updated_count = sqlx::query(
        r#"
        UPDATE wallets
        SET balance = balance - $1,
            updated_at = NOW()
        WHERE user_id = $2 AND balance >= $1
        "#,
    )
    .bind(amount)
    .bind(user_id)
    .execute(conn)
    .await?
    .rows_affected();

    if updated_count == 0 {
        return Err(AppError::InsufficientFunds);
    }

    Ok(())
}

/// Add `amount` to the spendable balance. Used for refunds.
pub async fn credit(
    conn: impl PgExecutor<'_>,
    user_id: Uuid,
    amount: Decimal,
) -> Result<(), AppError> {
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation("Amount must be positive".to_string()));
    }

    sqlx::query(
        r#"
        INSERT INTO wallets (user_id, balance)
        VALUES ($1, $2)
        ON CONFLICT (user_id) DO UPDATE
        SET balance = wallets.balance + EXCLUDED.balance,
            updated_at = NOW()
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .execute(conn)
    .await?;

    Ok(())
}

/// Add `amount` to the commission balance of an upline.
pub async fn credit_commission(
    conn: impl PgExecutor<'_>,
    user_id: Uuid,
    amount: Decimal,
) -> Result<(), AppError> {
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation("Amount must be positive".to_string()));
    }

    sqlx::query(
        r#"
        INSERT INTO wallets (user_id, commission_balance)
        VALUES ($1, $2)
        ON CONFLICT (user_id) DO UPDATE
        SET commission_balance = wallets.commission_balance + EXCLUDED.commission_balance,
            updated_at = NOW()
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .execute(conn)
    .await?;

    Ok(())
}

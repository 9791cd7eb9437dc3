//! Wallet data model and API response type.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Represents a wallet record from the database.
///
/// # Database Table
///
/// Maps to the `wallets` table, one row per user, created lazily the first time
/// the wallet is read or credited.
///
/// # Balance Storage
///
/// Balances are `NUMERIC(18,2)` mapped to [`Decimal`], never floats.
/// Both balances are kept non-negative by CHECK constraints; the spendable
/// balance is only ever decremented through a conditional update.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Wallet {
    /// Owner of the wallet
    pub user_id: Uuid,

    /// Spendable balance used to pay for vends
    pub balance: Decimal,

    /// Commission earned from downline purchases
    pub commission_balance: Decimal,

    /// Timestamp of the last balance change
    pub updated_at: DateTime<Utc>,
}

/// Response body for `GET /api/v1/wallet`.
#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub balance: Decimal,
    pub commission_balance: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl From<Wallet> for WalletResponse {
    fn from(wallet: Wallet) -> Self {
        Self {
            balance: wallet.balance,
            commission_balance: wallet.commission_balance,
            updated_at: wallet.updated_at,
        }
    }
}

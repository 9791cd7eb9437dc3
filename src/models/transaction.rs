//! Transaction data models and API response types.
//!
//! This module defines:
//! - `Transaction`: one wallet charge attempt, keyed by its reference
//! - `TransactionStatus`: the PENDING → COMPLETED | FAILED lifecycle
//! - `VendContext`: what was being bought, kept with the charge for audit and recovery
//! - `TransactionResponse`: Response body returned to clients

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::service::ServiceCategory;

/// Settlement status shared by transactions and service requests.
///
/// A transaction starts `Pending` and moves to exactly one terminal state.
/// Service requests are only ever written in a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

/// Represents a transaction record from the database.
///
/// # Database Table
///
/// Maps to the `transactions` table. Each transaction:
/// - Has a unique `reference`, generated before the provider is contacted
/// - Stores a signed amount (negative: the wallet was charged that much)
/// - Tracks status, updated from pending exactly once
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Transaction {
    /// Unique identifier for this transaction
    pub id: Uuid,

    /// Correlates this charge with one provider call
    pub reference: String,

    /// Wallet owner that was charged
    pub user_id: Uuid,

    /// Service being bought
    pub service_id: Uuid,

    /// Signed amount; a vend charge is stored negative
    pub amount: Decimal,

    pub status: TransactionStatus,

    /// Human-readable description
    pub description: String,

    /// Optional caller-supplied key for deduplicating retried submissions
    pub idempotency_key: Option<String>,

    /// Serialized [`VendContext`]
    pub metadata: Option<serde_json::Value>,

    /// When transaction was created
    pub created_at: DateTime<Utc>,

    /// When the transaction left the pending state
    pub settled_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Amount taken from the wallet, and therefore the exact refund on failure.
    pub fn charged_amount(&self) -> Decimal {
        -self.amount
    }

    pub fn vend_context(&self) -> Option<VendContext> {
        self.metadata
            .clone()
            .and_then(|value| serde_json::from_value(value).ok())
    }
}

/// What a charge paid for. Stored as the transaction's metadata so an
/// abandoned attempt can still produce a complete audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendContext {
    pub category: ServiceCategory,
    pub destination: Option<String>,
    pub quantity: i32,
    pub amount: Option<Decimal>,
}

/// Everything needed to open a pending charge.
#[derive(Debug, Clone)]
pub struct NewCharge {
    pub reference: String,
    pub user_id: Uuid,
    pub service_id: Uuid,

    /// Positive amount to take from the wallet
    pub amount: Decimal,

    pub description: String,
    pub idempotency_key: Option<String>,
    pub context: VendContext,
}

/// Response returned for transaction history endpoints.
///
/// # JSON Example
///
/// ```json
/// {
///   "reference": "VND20250115103000a1b2c3d4e5f60718",
///   "service_id": "660e8400-e29b-41d4-a716-446655440001",
///   "amount": "-500.00",
///   "status": "completed",
///   "description": "WAEC result checker x1",
///   "created_at": "2025-01-15T10:30:00Z",
///   "settled_at": "2025-01-15T10:30:02Z"
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub reference: String,
    pub service_id: Uuid,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

/// Convert database Transaction to API TransactionResponse.
///
/// This removes internal fields like metadata and idempotency_key
/// that clients don't need to see.
impl From<Transaction> for TransactionResponse {
    fn from(transaction: Transaction) -> Self {
        Self {
            reference: transaction.reference,
            service_id: transaction.service_id,
            amount: transaction.amount,
            status: transaction.status,
            description: transaction.description,
            created_at: transaction.created_at,
            settled_at: transaction.settled_at,
        }
    }
}

/// Query parameters for `GET /api/v1/transactions`.
#[derive(Debug, Deserialize)]
pub struct TransactionListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    20
}

//! Upline commission entries.

use rust_decimal::Decimal;
use uuid::Uuid;

/// One commission credit, for one vended unit of one completed transaction.
///
/// # Database Table
///
/// Maps to the `commission_entries` table, unique on `(reference, unit_index)`
/// so a unit can never pay out twice.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct CommissionEntry {
    pub reference: String,

    /// Zero-based index of the purchased unit within the transaction
    pub unit_index: i32,

    /// Party receiving the commission
    pub upline_id: Uuid,

    /// Purchaser whose vend earned it
    pub buyer_id: Uuid,

    pub service_id: Uuid,
    pub amount: Decimal,
}

//! Vend request and receipt types.
//!
//! This module defines:
//! - `VendRequest`: body of `POST /api/v1/vend`
//! - `Caller`: who is buying, and at which price role
//! - `VendReceipt`: what a successful (or replayed) vend returns

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        api_key::Role,
        service::{PricingModel, ServiceCategory, VendQuantity},
        transaction::{TransactionStatus, VendContext},
    },
};

/// Largest quantity a single fixed-fee vend may ask for.
pub const MAX_QUANTITY: i32 = 50;

const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// Identity of the buyer, supplied by the authentication layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: Role,
}

/// Request to vend a service against the caller's wallet.
///
/// # JSON Examples
///
/// Fixed-fee service (bought by quantity):
///
/// ```json
/// {
///   "service_id": "660e8400-e29b-41d4-a716-446655440001",
///   "quantity": 3,
///   "idempotency_key": "checkout-42"
/// }
/// ```
///
/// Percentage service (bought by face value):
///
/// ```json
/// {
///   "service_id": "770e8400-e29b-41d4-a716-446655440002",
///   "destination": "08031234567",
///   "amount": 500
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct VendRequest {
    pub service_id: Uuid,

    /// Phone number or meter number; optional for exam pins
    pub destination: Option<String>,

    /// Units to buy, for fixed-fee services
    pub quantity: Option<i32>,

    /// Face value to buy, for percentage services
    pub amount: Option<Decimal>,

    /// Optional key to make retried submissions safe
    pub idempotency_key: Option<String>,
}

impl VendRequest {
    /// Validate the request against the service category and describe the purchase.
    pub fn context(&self, category: ServiceCategory) -> Result<VendContext, AppError> {
        let destination = self
            .destination
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);

        if category.requires_destination() && destination.is_none() {
            return Err(AppError::Validation("destination is required".to_string()));
        }

        let quantity = match category.pricing_model() {
            PricingModel::FixedFee => {
                let units = self
                    .quantity
                    .ok_or_else(|| AppError::Validation("quantity is required".to_string()))?;
                if !(1..=MAX_QUANTITY).contains(&units) {
                    return Err(AppError::Validation(format!(
                        "quantity must be between 1 and {MAX_QUANTITY}"
                    )));
                }
                VendQuantity::Units(units)
            }
            PricingModel::Percentage => {
                let amount = self
                    .amount
                    .ok_or_else(|| AppError::Validation("amount is required".to_string()))?;
                if amount <= Decimal::ZERO {
                    return Err(AppError::Validation("amount must be positive".to_string()));
                }
                VendQuantity::Amount(amount)
            }
        };

        Ok(VendContext {
            category,
            destination,
            quantity: quantity.units(),
            amount: match quantity {
                VendQuantity::Amount(amount) => Some(amount),
                VendQuantity::Units(_) => None,
            },
        })
    }

    /// The trimmed idempotency key, if one was supplied.
    pub fn idempotency_key(&self) -> Result<Option<&str>, AppError> {
        match self.idempotency_key.as_deref().map(str::trim) {
            None => Ok(None),
            Some(key) if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN => {
                Err(AppError::Validation(format!(
                    "idempotency_key must be 1 to {MAX_IDEMPOTENCY_KEY_LEN} characters"
                )))
            }
            Some(key) => Ok(Some(key)),
        }
    }
}

impl VendContext {
    /// The purchase as the pricing rules see it.
    pub fn vend_quantity(&self) -> VendQuantity {
        match self.amount {
            Some(amount) => VendQuantity::Amount(amount),
            None => VendQuantity::Units(self.quantity),
        }
    }
}

/// Successful vend result.
///
/// # JSON Example
///
/// ```json
/// {
///   "reference": "VND20250115103000a1b2c3d4e5f60718",
///   "service_id": "660e8400-e29b-41d4-a716-446655440001",
///   "amount_charged": "300.00",
///   "status": "completed",
///   "message": "Transaction successful",
///   "artifacts": ["1234567890", "2345678901", "3456789012"],
///   "units": null,
///   "replayed": false
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct VendReceipt {
    pub reference: String,
    pub service_id: Uuid,
    pub amount_charged: Decimal,
    pub status: TransactionStatus,
    pub message: String,
    pub artifacts: Vec<String>,
    pub units: Option<String>,

    /// True when this receipt was returned for a repeated idempotency key
    pub replayed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request() -> VendRequest {
        VendRequest {
            service_id: Uuid::new_v4(),
            destination: None,
            quantity: None,
            amount: None,
            idempotency_key: None,
        }
    }

    #[test]
    fn test_fixed_fee_requires_quantity_in_range() {
        let mut req = request();
        assert!(matches!(
            req.context(ServiceCategory::ExamPin),
            Err(AppError::Validation(_))
        ));

        req.quantity = Some(0);
        assert!(req.context(ServiceCategory::ExamPin).is_err());

        req.quantity = Some(MAX_QUANTITY + 1);
        assert!(req.context(ServiceCategory::ExamPin).is_err());

        req.quantity = Some(3);
        let context = req.context(ServiceCategory::ExamPin).unwrap();
        assert_eq!(context.quantity, 3);
        assert_eq!(context.amount, None);
        assert_eq!(context.vend_quantity(), VendQuantity::Units(3));
    }

    #[test]
    fn test_percentage_requires_positive_amount() {
        let mut req = request();
        req.destination = Some("08031234567".to_string());
        req.amount = Some(dec!(-5));
        assert!(req.context(ServiceCategory::Airtime).is_err());

        req.amount = Some(dec!(500));
        let context = req.context(ServiceCategory::Airtime).unwrap();
        assert_eq!(context.quantity, 1);
        assert_eq!(context.vend_quantity(), VendQuantity::Amount(dec!(500)));
    }

    #[test]
    fn test_destination_rules() {
        let mut req = request();
        req.quantity = Some(1);
        req.destination = Some("   ".to_string());
        assert!(matches!(
            req.context(ServiceCategory::Data),
            Err(AppError::Validation(_))
        ));

        let context = req.context(ServiceCategory::ExamPin).unwrap();
        assert_eq!(context.destination, None);

        req.destination = Some(" 08031234567 ".to_string());
        let context = req.context(ServiceCategory::Data).unwrap();
        assert_eq!(context.destination.as_deref(), Some("08031234567"));
    }

    #[test]
    fn test_idempotency_key_validation() {
        let mut req = request();
        assert_eq!(req.idempotency_key().unwrap(), None);

        req.idempotency_key = Some("  ".to_string());
        assert!(req.idempotency_key().is_err());

        req.idempotency_key = Some("x".repeat(129));
        assert!(req.idempotency_key().is_err());

        req.idempotency_key = Some(" checkout-42 ".to_string());
        assert_eq!(req.idempotency_key().unwrap(), Some("checkout-42"));
    }
}

//! Service catalog model and pricing rules.
//!
//! Services are read-only here: the surrounding platform maintains the catalog.
//! The only logic in this module is how a service is priced for a caller.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, models::api_key::Role};

/// Family a service belongs to. Decides pricing and the shape of the audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ServiceCategory {
    Airtime,
    Data,
    ExamPin,
    Electricity,
}

/// How a service's price fields are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingModel {
    /// Price fields are a fee per unit; the caller buys a quantity.
    FixedFee,
    /// Price fields are a percentage of the face value the caller asks for.
    Percentage,
}

impl ServiceCategory {
    pub fn pricing_model(self) -> PricingModel {
        match self {
            ServiceCategory::Data | ServiceCategory::ExamPin => PricingModel::FixedFee,
            ServiceCategory::Airtime | ServiceCategory::Electricity => PricingModel::Percentage,
        }
    }

    /// Whether a vend must name a phone number or meter.
    pub fn requires_destination(self) -> bool {
        !matches!(self, ServiceCategory::ExamPin)
    }
}

/// What the caller is buying: a count of units or a face-value amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VendQuantity {
    Units(i32),
    Amount(Decimal),
}

impl VendQuantity {
    /// Number of purchased units, the basis for commission.
    pub fn units(&self) -> i32 {
        match self {
            VendQuantity::Units(n) => *n,
            VendQuantity::Amount(_) => 1,
        }
    }
}

/// Represents a service record from the database.
///
/// # Database Table
///
/// Maps to the `services` table.
///
/// # Prices
///
/// `platform_price` applies to standard callers and `default_agent_price` to aggregators.
/// For fixed-fee categories they are currency amounts per unit; for percentage
/// categories they are percentages of the requested amount.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Service {
    pub id: Uuid,
    pub name: String,

    /// Code the provider knows this product by. A service without one cannot be vended.
    pub product_code: Option<String>,

    pub category: ServiceCategory,
    pub is_active: bool,
    pub platform_price: Decimal,
    pub default_agent_price: Decimal,

    /// Fixed commission credited to the buyer's upline per vended unit.
    pub commission_amount: Option<Decimal>,

    pub created_at: DateTime<Utc>,
}

impl Service {
    /// Check the service can be vended and return its provider product code.
    pub fn product_code_if_available(&self) -> Result<&str, AppError> {
        if !self.is_active {
            return Err(AppError::ServiceUnavailable(format!(
                "{} is currently unavailable",
                self.name
            )));
        }

        match self.product_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => Ok(code),
            _ => Err(AppError::ServiceUnavailable(format!(
                "{} is not configured for vending",
                self.name
            ))),
        }
    }

    /// Unit price or percentage for the caller's role.
    pub fn rate_for(&self, role: Role) -> Decimal {
        match role {
            Role::Aggregator => self.default_agent_price,
            Role::Standard => self.platform_price,
        }
    }

    /// Total wallet charge for a purchase.
    ///
    /// - Fixed fee: `rate × quantity`
    /// - Percentage: `amount × rate / 100`, rounded to 2 places (midpoint away from zero)
    pub fn total_price(&self, role: Role, quantity: VendQuantity) -> Result<Decimal, AppError> {
        let rate = self.rate_for(role);

        if rate <= Decimal::ZERO {
            return Err(AppError::ServiceUnavailable(format!(
                "{} is not priced",
                self.name
            )));
        }

        let total = match (self.category.pricing_model(), quantity) {
            (PricingModel::FixedFee, VendQuantity::Units(units)) => {
                rate.checked_mul(Decimal::from(units))
            }
            (PricingModel::Percentage, VendQuantity::Amount(amount)) => amount
                .checked_mul(rate)
                .and_then(|value| value.checked_div(Decimal::ONE_HUNDRED))
                .map(|value| {
                    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
                }),
            (PricingModel::FixedFee, VendQuantity::Amount(_)) => {
                return Err(AppError::Validation(
                    "This service is sold by quantity".to_string(),
                ));
            }
            (PricingModel::Percentage, VendQuantity::Units(_)) => {
                return Err(AppError::Validation(
                    "This service is sold by amount".to_string(),
                ));
            }
        };

        let total =
            total.ok_or_else(|| AppError::Validation("amount is too large".to_string()))?;

        // Percentage amounts that round below 0.01.
        if total <= Decimal::ZERO {
            return Err(AppError::Validation("amount is too small".to_string()));
        }

        Ok(total)
    }
}

/// Catalog entry returned by `GET /api/v1/services`, priced for the caller.
#[derive(Debug, Serialize)]
pub struct ServiceResponse {
    pub id: Uuid,
    pub name: String,
    pub category: ServiceCategory,
    pub pricing_model: PricingModel,

    /// Unit price or percentage, depending on `pricing_model`
    pub rate: Decimal,
}

impl ServiceResponse {
    pub fn for_role(service: Service, role: Role) -> Self {
        Self {
            id: service.id,
            rate: service.rate_for(role),
            pricing_model: service.category.pricing_model(),
            category: service.category,
            name: service.name,
        }
    }
}

//! Service request models: the per-attempt outcome record.
//!
//! Every charged attempt produces exactly one service request once the provider
//! outcome is known, including failed attempts. The record is a common envelope
//! (who, which reference, which status, what the provider said) plus a payload
//! whose shape depends on the service category.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::{
    provider::Delivery,
    service::ServiceCategory,
    transaction::{TransactionStatus, VendContext},
};

/// Category-specific part of a service request.
///
/// Stored as JSONB; the `category` tag doubles as the discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum ServiceRequestDetails {
    Airtime {
        phone_number: String,
        amount: Decimal,
        confirmation: Option<String>,
    },
    Data {
        phone_number: String,
        quantity: i32,
        confirmation: Option<String>,
    },
    ExamPin {
        destination: Option<String>,
        quantity: i32,
        pins: Vec<String>,
    },
    Electricity {
        meter_number: String,
        amount: Decimal,
        token: Option<String>,
        units: Option<String>,
    },
}

impl ServiceRequestDetails {
    /// Build the payload for an attempt. `delivery` is `None` for failed attempts.
    pub fn new(context: &VendContext, delivery: Option<&Delivery>) -> Self {
        let destination = context.destination.clone().unwrap_or_default();
        let amount = context.amount.unwrap_or_default();
        let first = delivery.and_then(|d| d.artifacts.first().cloned());

        match context.category {
            ServiceCategory::Airtime => ServiceRequestDetails::Airtime {
                phone_number: destination,
                amount,
                confirmation: first,
            },
            ServiceCategory::Data => ServiceRequestDetails::Data {
                phone_number: destination,
                quantity: context.quantity,
                confirmation: first,
            },
            ServiceCategory::ExamPin => ServiceRequestDetails::ExamPin {
                destination: context.destination.clone(),
                quantity: context.quantity,
                pins: delivery.map(|d| d.artifacts.clone()).unwrap_or_default(),
            },
            ServiceCategory::Electricity => ServiceRequestDetails::Electricity {
                meter_number: destination,
                amount,
                token: first,
                units: delivery.and_then(|d| d.units.clone()),
            },
        }
    }

    pub fn category(&self) -> ServiceCategory {
        match self {
            ServiceRequestDetails::Airtime { .. } => ServiceCategory::Airtime,
            ServiceRequestDetails::Data { .. } => ServiceCategory::Data,
            ServiceRequestDetails::ExamPin { .. } => ServiceCategory::ExamPin,
            ServiceRequestDetails::Electricity { .. } => ServiceCategory::Electricity,
        }
    }

    /// Pins, tokens or confirmations handed to the buyer.
    pub fn artifacts(&self) -> Vec<String> {
        match self {
            ServiceRequestDetails::Airtime { confirmation, .. }
            | ServiceRequestDetails::Data { confirmation, .. } => {
                confirmation.iter().cloned().collect()
            }
            ServiceRequestDetails::ExamPin { pins, .. } => pins.clone(),
            ServiceRequestDetails::Electricity { token, .. } => token.iter().cloned().collect(),
        }
    }

    pub fn units(&self) -> Option<String> {
        match self {
            ServiceRequestDetails::Electricity { units, .. } => units.clone(),
            _ => None,
        }
    }
}

/// Represents a service request record from the database.
///
/// # Database Table
///
/// Maps to the `service_requests` table. `reference` is unique and references
/// `transactions.reference`, so a request can never exist without its charge.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ServiceRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub service_id: Uuid,
    pub reference: String,
    pub category: ServiceCategory,
    pub status: TransactionStatus,
    pub details: Json<ServiceRequestDetails>,

    /// Provider reply exactly as received, when there was one
    pub raw_payload: Option<serde_json::Value>,

    /// Message shown to the buyer
    pub provider_message: Option<String>,

    /// Provider's own status text (e.g. "completed", "pending")
    pub provider_status: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// Fields supplied when settling an attempt. The status comes from the settlement itself.
#[derive(Debug, Clone)]
pub struct NewServiceRequest {
    pub user_id: Uuid,
    pub service_id: Uuid,
    pub reference: String,
    pub details: ServiceRequestDetails,
    pub raw_payload: Option<serde_json::Value>,
    pub provider_message: Option<String>,
    pub provider_status: Option<String>,
}

/// Service request as returned to clients.
#[derive(Debug, Serialize)]
pub struct ServiceRequestResponse {
    pub reference: String,
    pub status: TransactionStatus,
    pub details: ServiceRequestDetails,
    pub artifacts: Vec<String>,
    pub provider_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<ServiceRequest> for ServiceRequestResponse {
    fn from(request: ServiceRequest) -> Self {
        let details = request.details.0;
        Self {
            reference: request.reference,
            status: request.status,
            artifacts: details.artifacts(),
            details,
            provider_message: request.provider_message,
            created_at: request.created_at,
        }
    }
}

//! Vending gateway wire types and outcome classification.
//!
//! The gateway's replies are loosely typed: flags arrive as booleans, numbers or
//! strings, and the useful payload may be a string, a list or an object depending
//! on the product. Everything that guesses at those shapes lives here, so the
//! orchestrator only ever sees a [`ProviderOutcome`].

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::models::{service::ServiceCategory, transaction::VendContext};

const COMPLETED_STATUSES: &[&str] = &["completed", "complete", "successful", "success", "delivered"];
const PENDING_STATUSES: &[&str] = &["pending", "processing", "accepted", "initiated"];

/// Body of `POST /vend` sent to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderVendRequest {
    pub product_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    pub user_reference: String,
}

impl ProviderVendRequest {
    pub fn new(product_code: &str, reference: &str, context: &VendContext) -> Self {
        let (quantity, amount) = match context.amount {
            Some(amount) => (None, Some(amount)),
            None => (Some(context.quantity), None),
        };

        Self {
            product_code: product_code.to_string(),
            destination: context.destination.clone(),
            action: "vend".to_string(),
            quantity,
            amount,
            user_reference: reference.to_string(),
        }
    }
}

/// Reply from the gateway.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderResponse {
    #[serde(default, deserialize_with = "lenient_flag")]
    pub status: bool,

    #[serde(default)]
    pub text_status: Option<String>,

    #[serde(default)]
    pub server_message: Option<String>,

    #[serde(default)]
    pub data: Option<ProviderData>,

    /// The reply exactly as received, kept for the audit record
    #[serde(skip)]
    pub raw: Value,
}

/// Product payload inside a gateway reply.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderData {
    #[serde(default)]
    pub true_response: Value,

    #[serde(default)]
    pub token: Option<Value>,

    #[serde(default)]
    pub units: Option<Value>,
}

/// A vend the provider confirmed.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Pins, tokens or confirmation text; never empty
    pub artifacts: Vec<String>,
    pub units: Option<String>,
    pub message: String,
    pub provider_status: String,
    pub raw: Value,
}

/// A vend the provider declined (or did not confirm).
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub message: String,
    pub provider_status: Option<String>,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOutcome {
    Delivered(Delivery),
    Rejected(Rejection),
}

impl ProviderResponse {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let mut response: ProviderResponse = serde_json::from_value(value.clone())?;
        response.raw = value;
        Ok(response)
    }

    fn normalized_status(&self) -> String {
        self.text_status
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    }

    fn message_or(&self, fallback: &str) -> String {
        non_blank(self.server_message.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| fallback.to_string())
    }

    /// Decide whether this reply confirms the vend.
    ///
    /// Success needs the flag set, a completed (or, when `accept_pending`, pending)
    /// status text, and at least one artifact extracted for the category.
    pub fn classify(&self, category: ServiceCategory, accept_pending: bool) -> ProviderOutcome {
        let status = self.normalized_status();
        let provider_status = non_blank(Some(status.as_str())).map(str::to_string);

        let reject = |message: String| {
            ProviderOutcome::Rejected(Rejection {
                message,
                provider_status: provider_status.clone(),
                raw: self.raw.clone(),
            })
        };

        if !self.status {
            let fallback = non_blank(self.text_status.as_deref()).unwrap_or("Transaction failed");
            return reject(self.message_or(fallback));
        }

        let completed = COMPLETED_STATUSES.contains(&status.as_str());
        let pending = PENDING_STATUSES.contains(&status.as_str());
        if pending && !accept_pending {
            return reject(self.message_or("Transaction is still pending with the provider"));
        }
        if !completed && !pending {
            return reject(self.message_or("Transaction failed"));
        }

        let Some(data) = self.data.as_ref() else {
            return reject(self.message_or("Provider returned no result"));
        };

        let artifacts = extract_artifacts(category, data);
        if artifacts.is_empty() {
            return reject("Provider returned no result".to_string());
        }

        ProviderOutcome::Delivered(Delivery {
            artifacts,
            units: data.units.as_ref().and_then(text_of),
            message: self.message_or("Transaction successful"),
            provider_status: status,
            raw: self.raw.clone(),
        })
    }
}

fn extract_artifacts(category: ServiceCategory, data: &ProviderData) -> Vec<String> {
    match category {
        ServiceCategory::ExamPin => pins_of(&data.true_response),
        ServiceCategory::Electricity => data
            .token
            .as_ref()
            .and_then(text_of)
            .or_else(|| text_of(&data.true_response))
            .into_iter()
            .collect(),
        ServiceCategory::Airtime | ServiceCategory::Data => {
            text_of(&data.true_response).into_iter().collect()
        }
    }
}

/// Render a payload value as text; `None` for null or empty values.
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => non_blank(Some(s)).map(str::to_string),
        Value::Array(items) if items.is_empty() => None,
        Value::Object(map) if map.is_empty() => None,
        other => Some(other.to_string()),
    }
}

fn pins_of(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(pin_of).collect(),
        Value::String(s) => s
            .split(|c| matches!(c, ',' | ';' | '|' | '\n'))
            .map(str::trim)
            .filter(|pin| !pin.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Object(map) => match map.get("pins") {
            Some(pins) => pins_of(pins),
            None => text_of(value).into_iter().collect(),
        },
        other => text_of(other).into_iter().collect(),
    }
}

fn pin_of(item: &Value) -> Option<String> {
    match item {
        Value::Object(map) => map
            .get("pin")
            .and_then(text_of)
            .or_else(|| text_of(item)),
        other => text_of(other),
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Accept `true`, `1`, `"true"`, `"success"` and friends as a set flag.
fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_i64() == Some(1),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "success" | "successful"
        ),
        _ => false,
    })
}

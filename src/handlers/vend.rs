//! Vend HTTP handler.
//!
//! - POST /api/v1/vend - Buy a service against the caller's wallet

use std::sync::Arc;

use axum::{Extension, Json, extract::State, http::StatusCode};

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::vend::{VendReceipt, VendRequest},
    services::vend_orchestrator::VendOrchestrator,
};

/// Vend a service.
///
/// # Request Body
///
/// ```json
/// {
///   "service_id": "660e8400-...",
///   "quantity": 2,
///   "idempotency_key": "checkout-42"
/// }
/// ```
///
/// # Response (201, or 200 for a replayed idempotency key)
///
/// ```json
/// {
///   "reference": "VND20250115103000a1b2c3d4e5f60718",
///   "amount_charged": "1000.00",
///   "status": "completed",
///   "message": "Transaction successful",
///   "artifacts": ["1234567890", "2345678901"],
///   "replayed": false
/// }
/// ```
///
/// # Errors
///
/// Failures after the charge are only returned once the wallet has been refunded.
pub async fn create_vend(
    State(orchestrator): State<Arc<VendOrchestrator>>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<VendRequest>,
) -> Result<(StatusCode, Json<VendReceipt>), AppError> {
    tracing::debug!(api_key_id = %auth.api_key_id, "Vend requested");
    let receipt = orchestrator.vend(&auth.caller(), request).await?;

    let status = if receipt.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok((status, Json(receipt)))
}

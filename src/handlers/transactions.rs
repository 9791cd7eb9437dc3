//! Transaction HTTP handlers.
//!
//! This module implements transaction history endpoints:
//! - GET /api/v1/transactions - List the caller's recent transactions
//! - GET /api/v1/transactions/{reference} - One transaction with its service request

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde::Serialize;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        service_request::ServiceRequestResponse,
        transaction::{TransactionListQuery, TransactionResponse},
    },
    services::{service_request_store, transaction_log},
};

const MAX_LIMIT: i64 = 100;

/// Transaction together with the outcome record of its attempt.
///
/// `service_request` is `null` while the transaction is still pending.
#[derive(Debug, Serialize)]
pub struct TransactionDetailResponse {
    #[serde(flatten)]
    pub transaction: TransactionResponse,
    pub service_request: Option<ServiceRequestResponse>,
}

/// List the caller's transactions, newest first.
///
/// # Query Parameters
///
/// - `limit`: 1 to 100, defaults to 20
pub async fn list_transactions(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<TransactionListQuery>,
) -> Result<Json<Vec<TransactionResponse>>, AppError> {
    let limit = query.limit.clamp(1, MAX_LIMIT);
    let transactions = transaction_log::list_for_user(&pool, auth.user_id, limit).await?;

    Ok(Json(transactions.into_iter().map(Into::into).collect()))
}

/// Get transaction details by reference.
///
/// # Security
///
/// Only returns transactions belonging to the authenticated user; anything
/// else is reported as not found.
pub async fn get_transaction(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(reference): Path<String>,
) -> Result<Json<TransactionDetailResponse>, AppError> {
    let transaction = transaction_log::find_by_reference(&pool, &reference)
        .await?
        .filter(|transaction| transaction.user_id == auth.user_id)
        .ok_or(AppError::TransactionNotFound)?;

    let service_request =
        service_request_store::find_for_user(&pool, auth.user_id, &reference).await?;

    Ok(Json(TransactionDetailResponse {
        transaction: transaction.into(),
        service_request: service_request.map(Into::into),
    }))
}

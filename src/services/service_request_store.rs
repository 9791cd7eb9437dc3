//! Service request store - the audit record of each settled attempt.

use sqlx::{PgExecutor, types::Json};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        service_request::{NewServiceRequest, ServiceRequest},
        transaction::TransactionStatus,
    },
};

/// Persist the outcome record for a settled attempt.
///
/// Called inside the same database transaction that settles the charge, so the
/// request and the terminal transaction status become visible together.
pub async fn insert(
    conn: impl PgExecutor<'_>,
    request: &NewServiceRequest,
    status: TransactionStatus,
) -> Result<ServiceRequest, AppError> {
    let service_request = sqlx::query_as::<_, ServiceRequest>(
        r#"
        INSERT INTO service_requests (
            user_id,
            service_id,
            reference,
            category,
            status,
            details,
            raw_payload,
            provider_message,
            provider_status
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(request.user_id)
    .bind(request.service_id)
    .bind(&request.reference)
    .bind(request.details.category())
    .bind(status)
    .bind(Json(&request.details))
    .bind(&request.raw_payload)
    .bind(&request.provider_message)
    .bind(&request.provider_status)
    .fetch_one(conn)
    .await?;

    Ok(service_request)
}

pub async fn find_by_reference(
    conn: impl PgExecutor<'_>,
    reference: &str,
) -> Result<Option<ServiceRequest>, AppError> {
    let request =
        sqlx::query_as::<_, ServiceRequest>("SELECT * FROM service_requests WHERE reference = $1")
            .bind(reference)
            .fetch_optional(conn)
            .await?;

    Ok(request)
}

/// A user's service request for one reference, if it belongs to them.
pub async fn find_for_user(
    conn: impl PgExecutor<'_>,
    user_id: Uuid,
    reference: &str,
) -> Result<Option<ServiceRequest>, AppError> {
    let request = sqlx::query_as::<_, ServiceRequest>(
        "SELECT * FROM service_requests WHERE reference = $1 AND user_id = $2",
    )
    .bind(reference)
    .bind(user_id)
    .fetch_optional(conn)
    .await?;

    Ok(request)
}

//! Service catalog - read-only access to vendable services.

use sqlx::PgExecutor;
use uuid::Uuid;

use crate::{error::AppError, models::service::Service};

pub async fn find_service(
    conn: impl PgExecutor<'_>,
    service_id: Uuid,
) -> Result<Option<Service>, AppError> {
    let service = sqlx::query_as::<_, Service>("SELECT * FROM services WHERE id = $1")
        .bind(service_id)
        .fetch_optional(conn)
        .await?;

    Ok(service)
}

/// Active services that have a provider product code, by category then name.
pub async fn list_active(conn: impl PgExecutor<'_>) -> Result<Vec<Service>, AppError> {
    let services = sqlx::query_as::<_, Service>(
        r#"
        SELECT * FROM services
        WHERE is_active = true AND product_code IS NOT NULL AND product_code <> ''
        ORDER BY category, name
        "#,
    )
    .fetch_all(conn)
    .await?;

    Ok(services)
}

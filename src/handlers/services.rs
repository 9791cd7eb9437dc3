//! Service catalog HTTP handler.

use axum::{Extension, Json, extract::State};

use crate::{
    db::DbPool, error::AppError, middleware::auth::AuthContext,
    models::service::ServiceResponse, services::service_catalog,
};

/// List vendable services with the price the caller would pay.
///
/// Aggregator keys see agent prices; everyone else sees platform prices.
pub async fn list_services(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<ServiceResponse>>, AppError> {
    let services = service_catalog::list_active(&pool).await?;

    Ok(Json(
        services
            .into_iter()
            .map(|service| ServiceResponse::for_role(service, auth.role))
            .collect(),
    ))
}

//! Wallet HTTP handler.

use axum::{Extension, Json, extract::State};

use crate::{
    db::DbPool, error::AppError, middleware::auth::AuthContext, models::wallet::WalletResponse,
    services::wallet_ledger,
};

/// Get the caller's wallet, creating an empty one on first access.
///
/// # Response (200)
///
/// ```json
/// {
///   "balance": "1500.00",
///   "commission_balance": "45.00",
///   "updated_at": "2025-01-15T10:30:00Z"
/// }
/// ```
pub async fn get_wallet(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<WalletResponse>, AppError> {
    let wallet = wallet_ledger::find_or_create_wallet(&pool, auth.user_id).await?;

    Ok(Json(wallet.into()))
}

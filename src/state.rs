//! Shared application state handed to every handler.

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{db::DbPool, services::vend_orchestrator::VendOrchestrator};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orchestrator: Arc<VendOrchestrator>,
}

/// Lets handlers and middleware that only need the pool keep extracting `State<DbPool>`.
impl FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Arc<VendOrchestrator> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.orchestrator)
    }
}

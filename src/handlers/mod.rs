//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, etc.)
//! 2. Hands the work to a service (vend orchestrator or a read query)
//! 3. Returns HTTP response (JSON, status code)

/// Liveness and database connectivity
pub mod health;

/// Service catalog endpoint
pub mod services;

/// Transaction history endpoints
pub mod transactions;

/// The vend endpoint
pub mod vend;

/// Wallet endpoint
pub mod wallet;

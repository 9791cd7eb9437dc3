//! Data models representing database entities and API payloads.
//!
//! This module contains all data structures that map to database tables,
//! plus the request/response bodies of the HTTP API and the provider wire format.

/// API key authentication model
pub mod api_key;
/// Upline commission entries
pub mod commission;
/// Vending gateway wire format
pub mod provider;
/// Service catalog and pricing
pub mod service;
/// Per-attempt outcome records
pub mod service_request;
/// Wallet charge attempts
pub mod transaction;
/// Vend request and receipt
pub mod vend;
/// Wallet balances
pub mod wallet;

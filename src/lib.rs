//! Redemption-code (voucher) service: storage, generation, validation and
//! lifecycle management, served over HTTP.
//!
//! `services::redemption_store::RedemptionStore::record_use` is the hook for
//! redemption execution, which lives outside this crate.

pub mod bootstrap;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

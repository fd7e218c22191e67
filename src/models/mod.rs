//! Core data models for the redemption-code service.
//!
//! Records map to the `redemptions` table via `sqlx::FromRow` and serialize
//! as JSON via `serde`.

pub mod redemption;

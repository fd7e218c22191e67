//! Defines routes for redemption-code management.
//!
//! ## Structure
//! - **Collection endpoints** (`/api/redemption/`)
//!   - `GET    /`                 list codes (`p`, `page_size`)
//!   - `POST   /`                 create an explicit code or a batch
//!   - `PUT    /`                 update (`?status_only=true` for status only)
//!   - `GET    /search`           substring search on name
//!   - `POST   /random-quota`     batch with random per-code quota
//!   - `GET    /count-by-name`    exact-name count
//!   - `DELETE /delete-by-name`   exact-name bulk delete
//!   - `PUT    /batch-disable`    disable a list of ids
//!   - `DELETE /delete-disabled`  purge disabled codes
//!
//! - **Record endpoints**
//!   - `GET    /{id}`: fetch one code
//!   - `DELETE /{id}`: delete one code

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        redemption_handlers::{
            batch_disable, count_by_name, create_random_quota_redemptions, create_redemptions,
            delete_by_name, delete_disabled, delete_redemption, get_redemption, list_redemptions,
            search_redemptions, update_redemption,
        },
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{delete, get, post, put},
};

/// Build and return the router for all service routes.
pub fn routes() -> Router<AppState> {
    let collection = get(list_redemptions)
        .post(create_redemptions)
        .put(update_redemption);

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Collection routes, with and without the trailing slash
        .route("/api/redemption", collection.clone())
        .route("/api/redemption/", collection)
        .route("/api/redemption/search", get(search_redemptions))
        .route(
            "/api/redemption/random-quota",
            post(create_random_quota_redemptions),
        )
        .route("/api/redemption/count-by-name", get(count_by_name))
        .route("/api/redemption/delete-by-name", delete(delete_by_name))
        .route("/api/redemption/batch-disable", put(batch_disable))
        .route("/api/redemption/delete-disabled", delete(delete_disabled))
        // Record routes
        .route(
            "/api/redemption/{id}",
            get(get_redemption).delete(delete_redemption),
        )
}

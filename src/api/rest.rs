//! REST API routes for the founding spots engine.

use axum::routing::{get, post};
use axum::Router;

use crate::api::handlers::{health_check, metrics, readiness_check, redeem_promo, validate_promo};
use crate::server::AppState;

/// Build the `/api` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/promo/validate", post(validate_promo))
        .route("/v1/promo/redeem", post(redeem_promo))
}

/// Root-level operational routes.
pub fn ops_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics))
}

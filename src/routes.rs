use axum::{
    routing::{get, post},
    Router,
};

use crate::{entitlements, webhooks};

pub fn api_routes() -> Router {
    Router::new()
        .route("/api/users/:user_id/usage", get(entitlements::get_usage))
        .route(
            "/api/users/:user_id/usage/reset",
            post(entitlements::reset_usage),
        )
        .route(
            "/api/users/:user_id/usage/:feature/check",
            get(entitlements::check_usage),
        )
        .route(
            "/api/users/:user_id/usage/:feature",
            post(entitlements::record_usage),
        )
        .route(
            "/api/users/:user_id/subscription",
            get(entitlements::get_subscription),
        )
        .route("/webhooks/billing", post(webhooks::billing_webhook))
}

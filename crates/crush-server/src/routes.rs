//! Router

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{
    create_checkout, get_confirmation, get_public_artifact, health_check, list_entitlements,
    payment_webhook, stage_entitlement,
};
use crate::state::AppState;

/// Every route the server exposes, as `(method, path, description)`
pub const ENDPOINTS: [(&str, &str, &str); 7] = [
    ("GET ", "/health", "Health check"),
    ("POST", "/api/entitlements", "Stage an unpaid entitlement"),
    ("GET ", "/api/entitlements", "List your entitlements"),
    ("POST", "/api/checkout", "Create hosted checkout"),
    ("POST", "/webhook/payments", "Payment provider webhook"),
    ("GET ", "/api/entitlements/{id}/confirmation", "Poll for payment"),
    ("GET ", "/api/artifacts/{id}", "Paid artifact for share links"),
];

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        // Entitlements
        .route(
            "/api/entitlements",
            post(stage_entitlement).get(list_entitlements),
        )
        .route("/api/entitlements/{id}/confirmation", get(get_confirmation))
        .route("/api/artifacts/{id}", get(get_public_artifact))
        // Payments
        .route("/api/checkout", post(create_checkout))
        .route("/webhook/payments", post(payment_webhook))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

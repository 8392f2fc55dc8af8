//! HTTP Handlers

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{FromRequest, Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crush_core::{
    ArtifactKind, Confirmation, Draft, EntitlementId, EntitlementSummary, PricingTier,
    PublicArtifact,
};
use crush_payments::{CheckoutRequest, PaymentError, WebhookHeaders};

use crate::auth::Owner;
use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub provider: &'static str,
    pub payments_configured: bool,
    pub webhook_secret_configured: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedEntitlement {
    pub entitlement_id: EntitlementId,
    pub artifact_kind: ArtifactKind,
    pub pricing_tier: PricingTier,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub checkout_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map a payment error onto an HTTP status and stable code
fn api_error(err: &PaymentError) -> ApiError {
    let (status, code) = match err {
        PaymentError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
        PaymentError::Provider(_) => (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR"),
        PaymentError::WebhookSignature(_) => (StatusCode::UNAUTHORIZED, "INVALID_SIGNATURE"),
        PaymentError::WebhookParse(_) => (StatusCode::BAD_REQUEST, "MALFORMED_EVENT"),
        PaymentError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        PaymentError::AlreadyPaid(_) => (StatusCode::CONFLICT, "ALREADY_PAID"),
        PaymentError::TierMismatch { .. } => (StatusCode::BAD_REQUEST, "TIER_MISMATCH"),
        PaymentError::InvalidReturnUrl(_) => (StatusCode::BAD_REQUEST, "INVALID_RETURN_URL"),
        PaymentError::InvalidDraft(_) => (StatusCode::BAD_REQUEST, "INVALID_DRAFT"),
        PaymentError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
    };
    if status.is_server_error() {
        tracing::error!(error = %err, code, "Request failed");
    }
    (status, Json(ErrorResponse::new(err.user_message(), code)))
}

/// JSON body whose rejection uses the `{ error, code }` shape
#[derive(FromRequest)]
#[from_request(via(Json), rejection(InvalidBody))]
pub struct ApiJson<T>(pub T);

/// Body that failed to parse or deserialize
#[derive(Debug)]
pub struct InvalidBody(String);

impl From<JsonRejection> for InvalidBody {
    fn from(rejection: JsonRejection) -> Self {
        Self(rejection.body_text())
    }
}

impl IntoResponse for InvalidBody {
    fn into_response(self) -> Response {
        tracing::debug!(reason = %self.0, "Rejected request body");
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                format!("Invalid request: {}", self.0),
                "INVALID_REQUEST",
            )),
        )
            .into_response()
    }
}

/// Store calls may touch the disk; keep them off the async workers
async fn blocking<T, F>(f: F) -> Result<T, PaymentError>
where
    F: FnOnce() -> Result<T, PaymentError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PaymentError::Storage(format!("store task failed: {e}")))?
}

fn not_found() -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new("Not found.", "NOT_FOUND")),
    )
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        provider: state.provider,
        payments_configured: state.checkout.is_some(),
        webhook_secret_configured: state.webhooks.verifier().is_configured(),
    })
}

/// Persist a draft as an unpaid entitlement
pub async fn stage_entitlement(
    State(state): State<AppState>,
    Owner(owner): Owner,
    ApiJson(draft): ApiJson<Draft>,
) -> Result<(StatusCode, Json<StagedEntitlement>), ApiError> {
    let store = Arc::clone(&state.store);
    let record = blocking(move || crush_payments::stage_entitlement(store.as_ref(), &owner, draft))
        .await
        .map_err(|e| api_error(&e))?;

    Ok((
        StatusCode::CREATED,
        Json(StagedEntitlement {
            entitlement_id: record.id,
            artifact_kind: record.artifact_kind,
            pricing_tier: record.pricing_tier,
        }),
    ))
}

/// Caller's entitlements, newest first
pub async fn list_entitlements(
    State(state): State<AppState>,
    Owner(owner): Owner,
) -> Result<Json<Vec<EntitlementSummary>>, ApiError> {
    let store = Arc::clone(&state.store);
    let records = blocking(move || store.list_by_owner(&owner))
        .await
        .map_err(|e| api_error(&e))?;
    Ok(Json(records.iter().map(|r| r.summary()).collect()))
}

pub async fn create_checkout(
    State(state): State<AppState>,
    Owner(owner): Owner,
    ApiJson(payload): ApiJson<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let checkout = state.checkout.as_ref().ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new(
                "Payments not configured",
                "PAYMENTS_DISABLED",
            )),
        )
    })?;

    let session = checkout
        .create_checkout_session(&owner, payload)
        .await
        .map_err(|e| api_error(&e))?;

    Ok(Json(CheckoutResponse {
        checkout_url: session.checkout_url,
    }))
}

/// Provider callback; the raw body is what gets signed
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let signed =
        WebhookHeaders::from_lookup(|name| headers.get(name).and_then(|v| v.to_str().ok()));

    let webhooks = Arc::clone(&state.webhooks);
    match blocking(move || webhooks.receive(&signed, &body)).await {
        Ok(outcome) => {
            tracing::debug!(?outcome, "Webhook acknowledged");
            Ok(Json(WebhookAck { received: true }))
        }
        // Unknown id may be a race with staging; ask the provider to redeliver
        Err(e @ PaymentError::NotFound(_)) => {
            tracing::error!(error = %e, "Webhook for unknown entitlement");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(e.user_message(), "NOT_FOUND")),
            ))
        }
        Err(e) => Err(api_error(&e)),
    }
}

/// Poller read; only answers once paid
pub async fn get_confirmation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Confirmation>, ApiError> {
    let Ok(id) = EntitlementId::parse(&id) else {
        return Err(not_found());
    };
    let store = Arc::clone(&state.store);
    blocking(move || store.get_paid(&id))
        .await
        .map_err(|e| api_error(&e))?
        .and_then(|r| r.confirmation())
        .map(Json)
        .ok_or_else(not_found)
}

/// Viewer gate for share links
pub async fn get_public_artifact(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PublicArtifact>, ApiError> {
    let Ok(id) = EntitlementId::parse(&id) else {
        return Err(not_found());
    };
    let store = Arc::clone(&state.store);
    blocking(move || store.get_paid(&id))
        .await
        .map_err(|e| api_error(&e))?
        .and_then(|r| r.public_view())
        .map(Json)
        .ok_or_else(not_found)
}

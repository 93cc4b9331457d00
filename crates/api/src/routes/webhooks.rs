//! Stripe webhook endpoint.
//!
//! The body is taken as the raw string so the signature verifies against the
//! exact bytes Stripe signed. Per the boundary's availability policy, every
//! verified event is acknowledged with 200 even when dispatch fails; only a
//! bad signature earns a 400. Failed dispatches stay re-claimable in the
//! audit table for redelivery or admin replay.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<Json<Value>> {
    let billing = state.billing()?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Stripe webhook missing signature header");
            ApiError::Validation("Invalid signature".to_string())
        })?;

    let event = billing.webhooks.verify_event(&body, signature).map_err(|e| {
        tracing::warn!(error = %e, "Stripe webhook signature verification failed");
        ApiError::Validation("Invalid signature".to_string())
    })?;

    let event_type = event.type_.to_string();
    let event_id = event.id.to_string();

    if let Err(e) = billing.webhooks.handle_event(event, &body).await {
        // Never bounce the endpoint: a 4xx/5xx here would make Stripe
        // retry-storm a permanently failing event. The audit row keeps the
        // failure visible and replayable.
        tracing::error!(
            event_id = %event_id,
            event_type = %event_type,
            error = %e,
            "Webhook dispatch failed; event acknowledged and left replayable"
        );
    }

    Ok(Json(json!({ "received": true })))
}

//! Route handlers and router assembly.

pub mod admin;
pub mod analytics;
pub mod checkout;
pub mod intake;
pub mod webhooks;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::auth::require_admin;
use crate::state::AppState;

/// Build the full application router.
pub fn create_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/dashboard", get(admin::dashboard))
        .route("/customers", get(admin::list_customers))
        .route("/subscriptions", get(admin::list_subscriptions))
        .route("/orders", get(admin::list_orders))
        .route("/cancel-subscription", post(admin::cancel_subscription))
        .route("/update-order-status", post(admin::update_order_status))
        .route("/revenue-chart", get(admin::revenue_chart))
        .route("/replay-webhook", post(admin::replay_webhook))
        .route("/analytics/live", get(analytics::live))
        .route("/analytics/geo", get(analytics::geo))
        .route("/analytics/funnel", get(analytics::funnel))
        .route("/analytics/traffic-sources", get(analytics::traffic_sources))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin,
        ));

    let intake_admin = Router::new()
        .route("/submissions", get(intake::list_submissions))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin,
        ));

    Router::new()
        .route("/", get(root))
        .route("/api/health", get(health))
        .route("/api/products", get(checkout::products))
        .route("/api/checkout", post(checkout::create_checkout))
        .route("/api/customer-portal", post(checkout::customer_portal))
        .route("/api/subscription-status", get(checkout::subscription_status))
        .route("/api/webhooks/stripe", post(webhooks::stripe_webhook))
        .route("/api/track", post(analytics::track))
        .route("/api/intake", post(intake::submit_intake))
        .nest("/api/intake", intake_admin)
        .route("/api/admin/login", post(admin::login))
        .nest("/api/admin", admin_routes)
        .with_state(state)
}

async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": state.config.brand_name,
        "status": "running",
        "endpoints": {
            "health": "/api/health",
            "products": "/api/products",
        }
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "brand": state.config.brand_name,
        "timestamp": OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
    }))
}

/// Caller IP: first hop of x-forwarded-for, if present.
pub(crate) fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// RFC3339 formatting for response payloads.
pub(crate) fn rfc3339(timestamp: OffsetDateTime) -> String {
    timestamp.format(&Rfc3339).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_ip_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn client_ip_missing_header() {
        assert_eq!(client_ip(&HeaderMap::new()), None);
    }

    #[test]
    fn client_ip_empty_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(""));
        assert_eq!(client_ip(&headers), None);
    }
}

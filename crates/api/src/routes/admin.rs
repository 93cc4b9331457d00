//! Admin routes: login, dashboard reporting, ledger listings, cancellation,
//! fulfillment updates, and webhook replay.

use axum::extract::{Extension, Query, State};
use axum::Json;
use meridian_billing::{FulfillmentUpdate, OrderService, ReportingService};
use meridian_shared::OrderStatus;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::PgPool;

use crate::auth::{verify_password, AdminUser};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct AdminRow {
    id: i64,
    email: String,
    first_name: Option<String>,
    password_hash: Option<String>,
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<Value>> {
    let email = request
        .email
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Validation("Email and password required".to_string()))?;
    let password = request
        .password
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Validation("Email and password required".to_string()))?;

    let admin: Option<AdminRow> = sqlx::query_as(
        "SELECT id, email, first_name, password_hash FROM customers \
         WHERE email = $1 AND role = 'admin'",
    )
    .bind(meridian_billing::normalize_email(&email))
    .fetch_optional(&state.pool)
    .await?;

    let admin = admin
        .ok_or_else(|| ApiError::Unauthorized("Invalid credentials".to_string()))?;

    let valid = admin
        .password_hash
        .as_deref()
        .map(|hash| verify_password(&password, hash))
        .unwrap_or(false);
    if !valid {
        return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
    }

    let token = state.jwt.generate_token(admin.id, &admin.email, "admin")?;

    Ok(Json(json!({
        "token": token,
        "admin": { "id": admin.id, "email": admin.email, "name": admin.first_name },
    })))
}

pub async fn dashboard(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let reporting = ReportingService::new(state.pool.clone());
    let report = reporting.dashboard().await?;

    Ok(Json(json!({
        "stats": report.stats,
        "by_product": report.by_product,
        "by_plan": report.by_plan,
        "revenue_chart": report.revenue_chart,
        "stripe_connected": state.billing.is_some(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub status: Option<String>,
}

impl ListQuery {
    fn page(&self) -> i64 {
        self.page.unwrap_or(1)
    }

    fn limit(&self) -> i64 {
        self.limit.unwrap_or(50)
    }

    /// 'all' and empty both mean no filter.
    fn status_filter(&self) -> Option<&str> {
        self.status
            .as_deref()
            .filter(|s| !s.is_empty() && *s != "all")
    }
}

pub async fn list_customers(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Value>> {
    let reporting = ReportingService::new(state.pool.clone());
    let page = reporting
        .list_customers(
            query.page(),
            query.limit(),
            query.search.as_deref().unwrap_or(""),
        )
        .await?;
    Ok(Json(json!(page)))
}

pub async fn list_subscriptions(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Value>> {
    let reporting = ReportingService::new(state.pool.clone());
    let subscriptions = reporting
        .list_subscriptions(query.status_filter(), query.page(), query.limit())
        .await?;
    Ok(Json(json!({ "subscriptions": subscriptions })))
}

pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Value>> {
    let reporting = ReportingService::new(state.pool.clone());
    let orders = reporting
        .list_orders(query.status_filter(), query.page(), query.limit())
        .await?;
    Ok(Json(json!({ "orders": orders })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub subscription_id: i64,
    #[serde(default)]
    pub immediate: bool,
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminUser>,
    Json(request): Json<CancelRequest>,
) -> ApiResult<Json<Value>> {
    let billing = state.billing()?;

    let outcome = billing
        .subscriptions
        .cancel(request.subscription_id, request.immediate)
        .await?;

    log_admin_action(
        &state.pool,
        admin.id,
        "cancel_subscription",
        "subscription",
        Some(request.subscription_id),
        json!({ "immediate": request.immediate }),
    )
    .await;

    Ok(Json(json!({ "success": true, "message": outcome.message })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderRequest {
    pub order_id: i64,
    pub status: Option<String>,
    pub pharmacy_status: Option<String>,
    pub tracking_number: Option<String>,
}

pub async fn update_order_status(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminUser>,
    Json(request): Json<UpdateOrderRequest>,
) -> ApiResult<Json<Value>> {
    if let Some(status) = request.status.as_deref() {
        if OrderStatus::parse(status).is_none() {
            return Err(ApiError::Validation(format!(
                "Invalid order status: {}",
                status
            )));
        }
    }

    let orders = OrderService::new(state.pool.clone());
    let updated = orders
        .update_fulfillment(
            request.order_id,
            FulfillmentUpdate {
                status: request.status.clone(),
                pharmacy_status: request.pharmacy_status.clone(),
                tracking_number: request.tracking_number.clone(),
            },
        )
        .await?;

    if !updated {
        return Err(ApiError::NotFound("Order not found".to_string()));
    }

    log_admin_action(
        &state.pool,
        admin.id,
        "update_order_status",
        "order",
        Some(request.order_id),
        json!({
            "status": request.status,
            "pharmacy_status": request.pharmacy_status,
            "tracking_number": request.tracking_number,
        }),
    )
    .await;

    Ok(Json(json!({ "success": true })))
}

pub async fn revenue_chart(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let reporting = ReportingService::new(state.pool.clone());
    let data = reporting.revenue_chart(30).await?;
    Ok(Json(json!({ "data": data })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayRequest {
    pub event_id: String,
}

/// Re-run a stored webhook event that failed dispatch.
pub async fn replay_webhook(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminUser>,
    Json(request): Json<ReplayRequest>,
) -> ApiResult<Json<Value>> {
    let billing = state.billing()?;

    let result = billing.webhooks.replay_event(&request.event_id).await?;

    log_admin_action(
        &state.pool,
        admin.id,
        "replay_webhook",
        "webhook_event",
        None,
        json!({ "stripe_event_id": result.stripe_event_id, "outcome": result.outcome }),
    )
    .await;

    Ok(Json(json!(result)))
}

/// Append to the admin activity log. Best effort: a logging failure never
/// fails the action it describes.
async fn log_admin_action(
    pool: &PgPool,
    admin_id: i64,
    action: &str,
    target_type: &str,
    target_id: Option<i64>,
    details: Value,
) {
    let result = sqlx::query(
        "INSERT INTO admin_activity (admin_id, action, target_type, target_id, details) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(admin_id)
    .bind(action)
    .bind(target_type)
    .bind(target_id)
    .bind(details)
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::warn!(action = %action, error = %e, "Failed to record admin activity");
    }
}

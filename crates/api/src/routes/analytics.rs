//! Visitor analytics: the public tracking endpoint and the admin read side.
//!
//! Everything here is best-effort by design. Tracking writes swallow their
//! errors and always acknowledge; admin reads fail open to zeros and empty
//! lists rather than erroring the dashboard.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::routes::client_ip;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    pub page: Option<String>,
    pub visitor_id: Option<String>,
    pub referrer: Option<String>,
    pub event: Option<String>,
    pub metadata: Option<Value>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

/// Record a page view and/or funnel event.
///
/// Geo comes from the client when provided, otherwise from a best-effort
/// server-side lookup of the caller IP. Always answers `{ok: true}` once the
/// request is minimally valid.
pub async fn track(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<TrackRequest>,
) -> ApiResult<Json<Value>> {
    if request.page.is_none() && request.event.is_none() {
        return Err(ApiError::Validation("page or event required".to_string()));
    }

    let ip = client_ip(&headers);
    let visitor_id = request
        .visitor_id
        .clone()
        .or_else(|| ip.clone())
        .unwrap_or_else(|| format!("anon-{}", Uuid::new_v4()));

    if let Some(page) = &request.page {
        let (lat, lng, city, region, country) = if request.lat.is_some() {
            (
                request.lat,
                request.lng,
                request.city.clone(),
                request.state.clone(),
                request.country.clone(),
            )
        } else {
            match &ip {
                Some(ip) => match state.geo.lookup(ip).await {
                    Some(location) => (
                        Some(location.lat),
                        Some(location.lng),
                        location.city,
                        location.state,
                        location.country,
                    ),
                    None => (None, None, None, None, None),
                },
                None => (None, None, None, None, None),
            }
        };

        let _ = sqlx::query(
            r#"
            INSERT INTO page_views
                (visitor_id, page_path, referrer, ip_address, city, state, country, lat, lng)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&visitor_id)
        .bind(page)
        .bind(&request.referrer)
        .bind(&ip)
        .bind(&city)
        .bind(&region)
        .bind(&country)
        .bind(lat)
        .bind(lng)
        .execute(&state.pool)
        .await;

        let _ = sqlx::query(
            "INSERT INTO funnel_events (visitor_id, event_type) VALUES ($1, 'page_view')",
        )
        .bind(&visitor_id)
        .execute(&state.pool)
        .await;
    }

    if let Some(event) = &request.event {
        let _ = sqlx::query(
            "INSERT INTO funnel_events (visitor_id, event_type, metadata) VALUES ($1, $2, $3)",
        )
        .bind(&visitor_id)
        .bind(event)
        .bind(&request.metadata)
        .execute(&state.pool)
        .await;
    }

    Ok(Json(json!({ "ok": true })))
}

async fn count_or_zero(pool: &PgPool, sql: &str) -> i64 {
    sqlx::query_as(sql)
        .fetch_one(pool)
        .await
        .map(|(n,): (i64,)| n)
        .unwrap_or(0)
}

#[derive(Debug, Serialize, sqlx::FromRow)]
struct PageCountRow {
    page: String,
    count: i64,
}

/// Live view: distinct visitors in the last five minutes plus their pages.
pub async fn live(State(state): State<AppState>) -> Json<Value> {
    let active = count_or_zero(
        &state.pool,
        "SELECT COUNT(DISTINCT visitor_id) FROM page_views \
         WHERE viewed_at >= NOW() - INTERVAL '5 minutes'",
    )
    .await;
    let today = count_or_zero(
        &state.pool,
        "SELECT COUNT(DISTINCT visitor_id) FROM page_views \
         WHERE viewed_at >= date_trunc('day', NOW())",
    )
    .await;

    let pages: Vec<PageCountRow> = sqlx::query_as(
        "SELECT page_path AS page, COUNT(*) AS count FROM page_views \
         WHERE viewed_at >= NOW() - INTERVAL '5 minutes' \
         GROUP BY page_path ORDER BY count DESC LIMIT 8",
    )
    .fetch_all(&state.pool)
    .await
    .unwrap_or_default();

    Json(json!({
        "active_visitors": active,
        "today_visitors": today,
        "pages": pages,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    pub period: Option<String>,
}

/// Whitelisted period -> hours; anything unknown gets the default.
fn period_hours(period: Option<&str>, default_hours: i32) -> i32 {
    match period {
        Some("1h") => 1,
        Some("24h") => 24,
        Some("7d") => 24 * 7,
        Some("14d") => 24 * 14,
        Some("30d") => 24 * 30,
        Some("60d") => 24 * 60,
        Some("90d") => 24 * 90,
        _ => default_hours,
    }
}

#[derive(Debug, Serialize, sqlx::FromRow)]
struct GeoPointRow {
    lat: Option<f64>,
    lng: Option<f64>,
    city: Option<String>,
    state: Option<String>,
    country: Option<String>,
    page_path: String,
    #[serde(with = "time::serde::rfc3339")]
    viewed_at: OffsetDateTime,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
struct StateAggRow {
    state: Option<String>,
    country: Option<String>,
    visitors: i64,
    views: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
struct CityAggRow {
    city: Option<String>,
    state: Option<String>,
    country: Option<String>,
    lat: Option<f64>,
    lng: Option<f64>,
    visitors: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
struct ActiveGeoRow {
    lat: Option<f64>,
    lng: Option<f64>,
    city: Option<String>,
    state: Option<String>,
    page_path: String,
}

/// Visitor locations for the map: raw points, state/city aggregates, and
/// who's active right now.
pub async fn geo(
    State(state): State<AppState>,
    Query(query): Query<PeriodQuery>,
) -> Json<Value> {
    let hours = period_hours(query.period.as_deref(), 24);

    let points: Vec<GeoPointRow> = sqlx::query_as(
        r#"
        SELECT lat, lng, city, state, country, page_path, viewed_at
        FROM page_views
        WHERE lat IS NOT NULL AND viewed_at >= NOW() - ($1 || ' hours')::INTERVAL
        ORDER BY viewed_at DESC LIMIT 200
        "#,
    )
    .bind(hours)
    .fetch_all(&state.pool)
    .await
    .unwrap_or_default();

    let by_state: Vec<StateAggRow> = sqlx::query_as(
        r#"
        SELECT state, country, COUNT(DISTINCT visitor_id) AS visitors, COUNT(*) AS views
        FROM page_views
        WHERE state IS NOT NULL AND viewed_at >= NOW() - ($1 || ' hours')::INTERVAL
        GROUP BY state, country ORDER BY visitors DESC LIMIT 50
        "#,
    )
    .bind(hours)
    .fetch_all(&state.pool)
    .await
    .unwrap_or_default();

    let by_city: Vec<CityAggRow> = sqlx::query_as(
        r#"
        SELECT city, state, country, lat, lng, COUNT(DISTINCT visitor_id) AS visitors
        FROM page_views
        WHERE city IS NOT NULL AND lat IS NOT NULL
          AND viewed_at >= NOW() - ($1 || ' hours')::INTERVAL
        GROUP BY city, state, country, lat, lng ORDER BY visitors DESC LIMIT 30
        "#,
    )
    .bind(hours)
    .fetch_all(&state.pool)
    .await
    .unwrap_or_default();

    let active_now: Vec<ActiveGeoRow> = sqlx::query_as(
        r#"
        SELECT DISTINCT ON (visitor_id) lat, lng, city, state, page_path
        FROM page_views
        WHERE lat IS NOT NULL AND viewed_at >= NOW() - INTERVAL '5 minutes'
        ORDER BY visitor_id, viewed_at DESC LIMIT 50
        "#,
    )
    .fetch_all(&state.pool)
    .await
    .unwrap_or_default();

    Json(json!({
        "points": points,
        "by_state": by_state,
        "by_city": by_city,
        "active_now": active_now,
    }))
}

/// Conversion funnel over the requested period.
pub async fn funnel(
    State(state): State<AppState>,
    Query(query): Query<PeriodQuery>,
) -> Json<Value> {
    let hours = period_hours(query.period.as_deref(), 24 * 30);

    let visitors = count_or_zero_interval(
        &state.pool,
        "SELECT COUNT(DISTINCT visitor_id) FROM page_views \
         WHERE viewed_at >= NOW() - ($1 || ' hours')::INTERVAL",
        hours,
    )
    .await;
    let checkout_started = count_or_zero_interval(
        &state.pool,
        "SELECT COUNT(DISTINCT visitor_id) FROM funnel_events \
         WHERE event_type = 'checkout_started' \
           AND created_at >= NOW() - ($1 || ' hours')::INTERVAL",
        hours,
    )
    .await;
    let checkout_completed = count_or_zero_interval(
        &state.pool,
        "SELECT COUNT(DISTINCT visitor_id) FROM funnel_events \
         WHERE event_type = 'checkout_completed' \
           AND created_at >= NOW() - ($1 || ' hours')::INTERVAL",
        hours,
    )
    .await;
    let signups = count_or_zero_interval(
        &state.pool,
        "SELECT COUNT(*) FROM customers \
         WHERE role = 'customer' AND created_at >= NOW() - ($1 || ' hours')::INTERVAL",
        hours,
    )
    .await;
    let subscribers = count_or_zero_interval(
        &state.pool,
        "SELECT COUNT(*) FROM subscriptions \
         WHERE status = 'active' AND created_at >= NOW() - ($1 || ' hours')::INTERVAL",
        hours,
    )
    .await;

    Json(json!({
        "period": query.period.as_deref().unwrap_or("30d"),
        "steps": [
            { "label": "Site Visitors", "value": visitors },
            { "label": "Checkout Started", "value": checkout_started },
            { "label": "Checkout Completed", "value": checkout_completed },
            { "label": "Account Created", "value": signups },
            { "label": "Active Subscriber", "value": subscribers },
        ]
    }))
}

async fn count_or_zero_interval(pool: &PgPool, sql: &str, hours: i32) -> i64 {
    sqlx::query_as(sql)
        .bind(hours)
        .fetch_one(pool)
        .await
        .map(|(n,): (i64,)| n)
        .unwrap_or(0)
}

#[derive(Debug, Deserialize)]
pub struct DaysQuery {
    pub days: Option<i32>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
struct TrafficSourceRow {
    source: String,
    visits: i64,
}

/// Referrer/UTM classification of where visitors came from.
pub async fn traffic_sources(
    State(state): State<AppState>,
    Query(query): Query<DaysQuery>,
) -> Json<Value> {
    let days = query.days.unwrap_or(30).clamp(1, 365);

    let sources: Vec<TrafficSourceRow> = sqlx::query_as(
        r#"
        SELECT
            CASE
                WHEN referrer ILIKE '%instagram%' THEN 'Instagram'
                WHEN referrer ILIKE '%google%' THEN 'Google'
                WHEN referrer ILIKE '%tiktok%' THEN 'TikTok'
                WHEN referrer ILIKE '%facebook%' OR referrer ILIKE '%fb.%' THEN 'Facebook'
                WHEN referrer ILIKE '%twitter%' OR referrer ILIKE '%t.co%' THEN 'Twitter/X'
                WHEN referrer ILIKE '%youtube%' THEN 'YouTube'
                WHEN referrer ILIKE '%linkedin%' THEN 'LinkedIn'
                WHEN referrer ILIKE '%mail%' OR referrer ILIKE '%email%' THEN 'Email'
                WHEN referrer IS NOT NULL AND referrer != '' THEN 'Referral'
                ELSE 'Direct'
            END AS source,
            COUNT(DISTINCT visitor_id) AS visits
        FROM page_views
        WHERE viewed_at >= NOW() - ($1 || ' days')::INTERVAL
        GROUP BY source
        ORDER BY visits DESC
        LIMIT 10
        "#,
    )
    .bind(days)
    .fetch_all(&state.pool)
    .await
    .unwrap_or_default();

    Json(json!({ "sources": sources }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_periods_map_to_hours() {
        assert_eq!(period_hours(Some("1h"), 24), 1);
        assert_eq!(period_hours(Some("24h"), 24), 24);
        assert_eq!(period_hours(Some("7d"), 24), 168);
        assert_eq!(period_hours(Some("90d"), 24), 2160);
    }

    #[test]
    fn unknown_period_uses_default() {
        assert_eq!(period_hours(Some("5y"), 24), 24);
        assert_eq!(period_hours(Some(""), 720), 720);
        assert_eq!(period_hours(None, 720), 720);
    }
}

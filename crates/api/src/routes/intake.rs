//! Intake form submission and the admin submissions listing.
//!
//! Intake upserts the customer profile with merge semantics (new data wins,
//! missing data never nulls out what's already there) and appends an
//! append-only audit row for every submission.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use time::{Date, Month, OffsetDateTime};

use crate::error::{ApiError, ApiResult};
use crate::routes::client_ip;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub dob_month: Option<Value>,
    pub dob_day: Option<Value>,
    pub dob_year: Option<Value>,
    pub sex: Option<String>,
    pub height_ft: Option<Value>,
    pub height_in: Option<Value>,
    pub weight: Option<Value>,
    pub treatment: Option<String>,
    pub screening_clear: Option<bool>,
    pub flagged_conditions: Option<Vec<String>>,
    pub consents: Option<Value>,
    pub address: Option<String>,
    pub apt: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    #[serde(rename = "visitor_id")]
    pub visitor_id: Option<String>,
    #[serde(rename = "utm_source")]
    pub utm_source: Option<String>,
    #[serde(rename = "utm_medium")]
    pub utm_medium: Option<String>,
    #[serde(rename = "utm_campaign")]
    pub utm_campaign: Option<String>,
}

/// Form fields arrive as numbers or strings depending on the client.
fn int_field(value: Option<&Value>) -> Option<i32> {
    match value? {
        Value::Number(n) => n.as_i64().and_then(|v| i32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn string_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn month_number(raw: &str) -> Option<u8> {
    let by_name = match raw.to_lowercase().as_str() {
        "january" => Some(1),
        "february" => Some(2),
        "march" => Some(3),
        "april" => Some(4),
        "may" => Some(5),
        "june" => Some(6),
        "july" => Some(7),
        "august" => Some(8),
        "september" => Some(9),
        "october" => Some(10),
        "november" => Some(11),
        "december" => Some(12),
        _ => None,
    };
    by_name.or_else(|| raw.trim().parse().ok())
}

/// Assemble a date of birth from month (name or number), day, and year.
fn parse_dob(month: Option<String>, day: Option<String>, year: Option<String>) -> Option<Date> {
    let month = Month::try_from(month_number(&month?)?).ok()?;
    let day: u8 = day?.trim().parse().ok()?;
    let year: i32 = year?.trim().parse().ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

pub async fn submit_intake(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<IntakeRequest>,
) -> ApiResult<Json<Value>> {
    let missing = || {
        ApiError::Validation("firstName, lastName, and email are required".to_string())
    };
    let email = request
        .email
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .map(meridian_billing::normalize_email)
        .ok_or_else(missing)?;
    let first_name = request
        .first_name
        .clone()
        .filter(|v| !v.is_empty())
        .ok_or_else(missing)?;
    let last_name = request
        .last_name
        .clone()
        .filter(|v| !v.is_empty())
        .ok_or_else(missing)?;

    let ip = client_ip(&headers);
    let dob = parse_dob(
        string_field(request.dob_month.as_ref()),
        string_field(request.dob_day.as_ref()),
        string_field(request.dob_year.as_ref()),
    );
    let height_ft = int_field(request.height_ft.as_ref());
    let height_in = int_field(request.height_in.as_ref());
    let weight_lbs = int_field(request.weight.as_ref());
    let screening_clear = request.screening_clear.unwrap_or(false);
    let flagged = request
        .flagged_conditions
        .clone()
        .filter(|list| !list.is_empty());

    let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM customers WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.pool)
        .await?;

    let customer_id = match existing {
        None => {
            let (id,): (i64,) = sqlx::query_as(
                r#"
                INSERT INTO customers (
                    email, first_name, last_name, phone, dob, sex,
                    height_ft, height_in, weight_lbs,
                    shipping_street, shipping_apt, shipping_city, shipping_state, shipping_zip,
                    treatment_product, intake_status, screening_clear, flagged_conditions, consents,
                    visitor_id, utm_source, utm_medium, utm_campaign, role
                ) VALUES (
                    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                    $15, 'intake_completed', $16, $17, $18, $19, $20, $21, $22, 'customer'
                )
                RETURNING id
                "#,
            )
            .bind(&email)
            .bind(&first_name)
            .bind(&last_name)
            .bind(&request.phone)
            .bind(dob)
            .bind(&request.sex)
            .bind(height_ft)
            .bind(height_in)
            .bind(weight_lbs)
            .bind(&request.address)
            .bind(&request.apt)
            .bind(&request.city)
            .bind(&request.state)
            .bind(&request.zip)
            .bind(&request.treatment)
            .bind(screening_clear)
            .bind(&flagged)
            .bind(&request.consents)
            .bind(&request.visitor_id)
            .bind(&request.utm_source)
            .bind(&request.utm_medium)
            .bind(&request.utm_campaign)
            .fetch_one(&state.pool)
            .await?;
            id
        }
        Some((id,)) => {
            sqlx::query(
                r#"
                UPDATE customers SET
                    first_name = COALESCE($2, first_name),
                    last_name = COALESCE($3, last_name),
                    phone = COALESCE($4, phone),
                    dob = COALESCE($5, dob),
                    sex = COALESCE($6, sex),
                    height_ft = COALESCE($7, height_ft),
                    height_in = COALESCE($8, height_in),
                    weight_lbs = COALESCE($9, weight_lbs),
                    shipping_street = COALESCE($10, shipping_street),
                    shipping_apt = COALESCE($11, shipping_apt),
                    shipping_city = COALESCE($12, shipping_city),
                    shipping_state = COALESCE($13, shipping_state),
                    shipping_zip = COALESCE($14, shipping_zip),
                    treatment_product = COALESCE($15, treatment_product),
                    intake_status = 'intake_completed',
                    screening_clear = $16,
                    flagged_conditions = COALESCE($17, flagged_conditions),
                    consents = COALESCE($18, consents),
                    visitor_id = COALESCE($19, visitor_id),
                    utm_source = COALESCE($20, utm_source),
                    utm_medium = COALESCE($21, utm_medium),
                    utm_campaign = COALESCE($22, utm_campaign),
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(&request.first_name)
            .bind(&request.last_name)
            .bind(&request.phone)
            .bind(dob)
            .bind(&request.sex)
            .bind(height_ft)
            .bind(height_in)
            .bind(weight_lbs)
            .bind(&request.address)
            .bind(&request.apt)
            .bind(&request.city)
            .bind(&request.state)
            .bind(&request.zip)
            .bind(&request.treatment)
            .bind(screening_clear)
            .bind(&flagged)
            .bind(&request.consents)
            .bind(&request.visitor_id)
            .bind(&request.utm_source)
            .bind(&request.utm_medium)
            .bind(&request.utm_campaign)
            .execute(&state.pool)
            .await?;
            id
        }
    };

    // Append-only audit of every submission; a failure here is logged but
    // never fails the intake itself.
    let audit = sqlx::query(
        r#"
        INSERT INTO intake_submissions (
            customer_id, email, first_name, last_name, phone, dob, sex,
            height_ft, height_in, weight_lbs, treatment_product,
            screening_clear, flagged_conditions, consents,
            shipping_street, shipping_apt, shipping_city, shipping_state, shipping_zip,
            ip_address, visitor_id, utm_source, utm_medium, utm_campaign, status
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
            $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, 'submitted'
        )
        "#,
    )
    .bind(customer_id)
    .bind(&email)
    .bind(&first_name)
    .bind(&last_name)
    .bind(&request.phone)
    .bind(dob)
    .bind(&request.sex)
    .bind(height_ft)
    .bind(height_in)
    .bind(weight_lbs)
    .bind(&request.treatment)
    .bind(screening_clear)
    .bind(&flagged)
    .bind(&request.consents)
    .bind(&request.address)
    .bind(&request.apt)
    .bind(&request.city)
    .bind(&request.state)
    .bind(&request.zip)
    .bind(&ip)
    .bind(&request.visitor_id)
    .bind(&request.utm_source)
    .bind(&request.utm_medium)
    .bind(&request.utm_campaign)
    .execute(&state.pool)
    .await;

    if let Err(e) = audit {
        tracing::error!(customer_id = customer_id, error = %e, "Intake audit log failed");
    }

    let visitor_id = request
        .visitor_id
        .clone()
        .unwrap_or_else(|| format!("email-{}", email));
    let _ = sqlx::query(
        "INSERT INTO funnel_events (visitor_id, event_type, metadata) \
         VALUES ($1, 'intake_completed', $2)",
    )
    .bind(&visitor_id)
    .bind(json!({
        "email": email,
        "treatment": request.treatment,
        "customer_id": customer_id,
    }))
    .execute(&state.pool)
    .await;

    Ok(Json(json!({
        "success": true,
        "customerId": customer_id,
        "message": "Intake submitted successfully",
    })))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct IntakeSubmissionRow {
    pub id: i64,
    pub customer_id: Option<i64>,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub dob: Option<String>,
    pub sex: Option<String>,
    pub height_ft: Option<i32>,
    pub height_in: Option<i32>,
    pub weight_lbs: Option<i32>,
    pub treatment_product: Option<String>,
    pub screening_clear: Option<bool>,
    pub flagged_conditions: Option<Vec<String>>,
    pub shipping_street: Option<String>,
    pub shipping_city: Option<String>,
    pub shipping_state: Option<String>,
    pub shipping_zip: Option<String>,
    pub visitor_id: Option<String>,
    pub utm_source: Option<String>,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
pub struct SubmissionsQuery {
    pub limit: Option<i64>,
}

/// Admin listing of recent intake submissions.
pub async fn list_submissions(
    State(state): State<AppState>,
    Query(query): Query<SubmissionsQuery>,
) -> ApiResult<Json<Value>> {
    let limit = query.limit.unwrap_or(200).clamp(1, 500);

    let submissions: Vec<IntakeSubmissionRow> = sqlx::query_as(
        r#"
        SELECT id, customer_id, email, first_name, last_name, phone,
               dob::TEXT AS dob, sex, height_ft, height_in, weight_lbs,
               treatment_product, screening_clear, flagged_conditions,
               shipping_street, shipping_city, shipping_state, shipping_zip,
               visitor_id, utm_source, status, created_at
        FROM intake_submissions
        ORDER BY created_at DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(json!({ "submissions": submissions })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dob_from_month_name() {
        let dob = parse_dob(
            Some("January".to_string()),
            Some("5".to_string()),
            Some("1990".to_string()),
        )
        .unwrap();
        assert_eq!(dob, Date::from_calendar_date(1990, Month::January, 5).unwrap());
    }

    #[test]
    fn dob_from_numeric_month() {
        let dob = parse_dob(
            Some("12".to_string()),
            Some("31".to_string()),
            Some("1985".to_string()),
        )
        .unwrap();
        assert_eq!(
            dob,
            Date::from_calendar_date(1985, Month::December, 31).unwrap()
        );
    }

    #[test]
    fn dob_case_insensitive_month() {
        assert!(parse_dob(
            Some("september".to_string()),
            Some("1".to_string()),
            Some("2000".to_string()),
        )
        .is_some());
    }

    #[test]
    fn invalid_dob_is_none() {
        // Feb 30 does not exist
        assert!(parse_dob(
            Some("February".to_string()),
            Some("30".to_string()),
            Some("1990".to_string()),
        )
        .is_none());
        assert!(parse_dob(None, Some("1".to_string()), Some("1990".to_string())).is_none());
        assert!(parse_dob(
            Some("Smarch".to_string()),
            Some("1".to_string()),
            Some("1990".to_string()),
        )
        .is_none());
    }

    #[test]
    fn int_fields_accept_numbers_and_strings() {
        assert_eq!(int_field(Some(&json!(5))), Some(5));
        assert_eq!(int_field(Some(&json!("5"))), Some(5));
        assert_eq!(int_field(Some(&json!(" 180 "))), Some(180));
        assert_eq!(int_field(Some(&json!("five"))), None);
        assert_eq!(int_field(Some(&json!(null))), None);
        assert_eq!(int_field(None), None);
    }

    #[test]
    fn string_fields_accept_numbers() {
        assert_eq!(string_field(Some(&json!("May"))), Some("May".to_string()));
        assert_eq!(string_field(Some(&json!(5))), Some("5".to_string()));
        assert_eq!(string_field(Some(&json!(""))), None);
    }
}

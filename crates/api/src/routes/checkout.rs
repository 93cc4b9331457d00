//! Public checkout, portal, and subscription-status routes.

use axum::extract::{Query, State};
use axum::Json;
use meridian_billing::checkout::CheckoutParams;
use meridian_shared::{PlanType, ProductType};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::routes::rfc3339;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub email: Option<String>,
    pub product_type: Option<String>,
    pub plan_type: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl CheckoutRequest {
    /// Validate required fields and parse the (product, plan) pair.
    fn validate(self) -> ApiResult<CheckoutParams> {
        let email = self
            .email
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| missing_fields())?;
        let product_raw = self
            .product_type
            .filter(|v| !v.is_empty())
            .ok_or_else(|| missing_fields())?;
        let plan_raw = self
            .plan_type
            .filter(|v| !v.is_empty())
            .ok_or_else(|| missing_fields())?;

        let product = ProductType::parse(&product_raw)
            .ok_or_else(|| ApiError::Validation("Invalid product or plan selection".to_string()))?;
        let plan = PlanType::parse(&plan_raw)
            .ok_or_else(|| ApiError::Validation("Invalid product or plan selection".to_string()))?;

        Ok(CheckoutParams {
            email,
            product,
            plan,
            first_name: self.first_name.filter(|v| !v.is_empty()),
            last_name: self.last_name.filter(|v| !v.is_empty()),
        })
    }
}

fn missing_fields() -> ApiError {
    ApiError::Validation("email, productType, and planType are required".to_string())
}

/// Public product/plan catalog with display pricing.
pub async fn products(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "brand": state.config.brand_name,
        "products": [
            {
                "id": "semaglutide",
                "name": "Compounded Semaglutide + B12",
                "type": "GLP-1 Agonist",
                "description": "Targets the GLP-1 receptor for proven weight loss results",
                "plans": [
                    { "type": "monthly", "price": 29900, "label": "$299/mo" },
                    { "type": "3month", "price": 24900, "label": "$249/mo", "billedAs": "$747 quarterly" },
                    { "type": "6month", "price": 19900, "label": "$199/mo", "billedAs": "$1,194 semi-annually" }
                ]
            },
            {
                "id": "tirzepatide",
                "name": "Compounded Tirzepatide + B12",
                "type": "GLP-1/GIP Dual Agonist",
                "description": "Works on both GLP-1 and GIP receptors for maximum weight loss",
                "plans": [
                    { "type": "monthly", "price": 39900, "label": "$399/mo" },
                    { "type": "3month", "price": 34900, "label": "$349/mo", "billedAs": "$1,047 quarterly" },
                    { "type": "6month", "price": 29900, "label": "$299/mo", "billedAs": "$1,794 semi-annually" }
                ]
            }
        ]
    }))
}

/// Create a Stripe checkout session for a (product, plan) pair.
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> ApiResult<Json<Value>> {
    let billing = state.billing()?;
    let params = request.validate()?;

    let response = billing
        .checkout
        .create_subscription_checkout(params)
        .await?;

    Ok(Json(json!({
        "url": response.url,
        "sessionId": response.session_id,
    })))
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: Option<String>,
}

/// Create a Stripe billing-portal session for an existing customer.
pub async fn customer_portal(
    State(state): State<AppState>,
    Json(request): Json<EmailRequest>,
) -> ApiResult<Json<Value>> {
    let billing = state.billing()?;
    let email = request
        .email
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("Email required".to_string()))?;

    let response = billing.checkout.create_portal_session(&email).await?;

    Ok(Json(json!({ "url": response.url })))
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub email: Option<String>,
}

/// Latest subscription projection for an email, or `{active: false}`.
pub async fn subscription_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<Value>> {
    let billing = state.billing()?;
    let email = query
        .email
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("Email required".to_string()))?;

    let view = billing.subscriptions.latest_for_email(&email).await?;

    let body = match view {
        None => json!({ "active": false }),
        Some(sub) => json!({
            "active": sub.is_active(),
            "status": sub.status,
            "productType": sub.product_type,
            "planType": sub.plan_type,
            "currentPeriodEnd": sub.current_period_end.map(rfc3339),
            "cancelAt": sub.cancel_at.map(rfc3339),
        }),
    };

    Ok(Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: Option<&str>, product: Option<&str>, plan: Option<&str>) -> CheckoutRequest {
        CheckoutRequest {
            email: email.map(String::from),
            product_type: product.map(String::from),
            plan_type: plan.map(String::from),
            first_name: None,
            last_name: None,
        }
    }

    #[test]
    fn valid_request_parses() {
        let params = request(Some("a@b.c"), Some("semaglutide"), Some("monthly"))
            .validate()
            .unwrap();
        assert_eq!(params.product, ProductType::Semaglutide);
        assert_eq!(params.plan, PlanType::Monthly);
    }

    #[test]
    fn missing_fields_rejected() {
        assert!(request(None, Some("semaglutide"), Some("monthly"))
            .validate()
            .is_err());
        assert!(request(Some("a@b.c"), None, Some("monthly"))
            .validate()
            .is_err());
        assert!(request(Some("a@b.c"), Some("semaglutide"), None)
            .validate()
            .is_err());
        assert!(request(Some("  "), Some("semaglutide"), Some("monthly"))
            .validate()
            .is_err());
    }

    #[test]
    fn unknown_product_or_plan_rejected() {
        assert!(request(Some("a@b.c"), Some("ozempic"), Some("monthly"))
            .validate()
            .is_err());
        assert!(request(Some("a@b.c"), Some("semaglutide"), Some("weekly"))
            .validate()
            .is_err());
    }
}

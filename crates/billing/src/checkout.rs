//! Hosted checkout and customer portal sessions.

use std::collections::HashMap;

use meridian_shared::{PlanType, ProductType};
use sqlx::PgPool;
use stripe::{
    BillingPortalSession, CheckoutSession, CheckoutSessionMode, CreateBillingPortalSession,
    CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionShippingAddressCollection,
    CreateCheckoutSessionShippingAddressCollectionAllowedCountries,
    CreateCheckoutSessionSubscriptionData, CreateCustomer, Customer,
};

use crate::client::StripeClient;
use crate::customer::CustomerService;
use crate::error::{BillingError, BillingResult};

/// Parameters for starting a subscription checkout.
#[derive(Debug, Clone)]
pub struct CheckoutParams {
    pub email: String,
    pub product: ProductType,
    pub plan: PlanType,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Response from creating a checkout session.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
}

/// Response from creating a billing portal session.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PortalResponse {
    pub url: String,
}

/// Creates Stripe checkout sessions for new subscriptions.
///
/// The session metadata carries our internal customer id; the webhook
/// reconciler joins on it when the completed event arrives.
pub struct CheckoutService {
    stripe: StripeClient,
    customers: CustomerService,
}

impl CheckoutService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self {
            stripe,
            customers: CustomerService::new(pool),
        }
    }

    /// Create a subscription-mode hosted checkout session.
    ///
    /// Resolves (or creates) both our customer row and the Stripe-side
    /// customer, persisting the linkage write-once before the session is
    /// created.
    pub async fn create_subscription_checkout(
        &self,
        params: CheckoutParams,
    ) -> BillingResult<CheckoutResponse> {
        let config = self.stripe.config();

        let price_id = config
            .prices
            .price_id(params.product, params.plan)
            .ok_or_else(|| BillingError::UnknownPlan {
                product: params.product.to_string(),
                plan: params.plan.to_string(),
            })?
            .to_string();

        let customer = self
            .customers
            .find_or_create(
                &params.email,
                params.first_name.as_deref(),
                params.last_name.as_deref(),
            )
            .await?;

        let stripe_customer_id = match &customer.stripe_customer_id {
            Some(id) => id.clone(),
            None => {
                let name = customer.full_name();
                let mut metadata = HashMap::new();
                metadata.insert("db_customer_id".to_string(), customer.id.to_string());
                metadata.insert("brand".to_string(), config.brand_name.clone());

                let created = Customer::create(
                    self.stripe.inner(),
                    CreateCustomer {
                        email: Some(&customer.email),
                        name: name.as_deref(),
                        metadata: Some(metadata),
                        ..Default::default()
                    },
                )
                .await?;

                let id = created.id.to_string();
                self.customers
                    .link_stripe_customer(customer.id, &id)
                    .await?;
                id
            }
        };

        let mut metadata = HashMap::new();
        metadata.insert("db_customer_id".to_string(), customer.id.to_string());
        metadata.insert("product_type".to_string(), params.product.to_string());
        metadata.insert("plan_type".to_string(), params.plan.to_string());
        metadata.insert("brand".to_string(), config.brand_name.clone());

        let success_url = format!(
            "{}/success?session_id={{CHECKOUT_SESSION_ID}}",
            config.site_url
        );
        let cancel_url = format!("{}/#products", config.site_url);

        let mut create = CreateCheckoutSession::new();
        create.customer = Some(stripe_customer_id.parse().map_err(|_| {
            BillingError::Internal(format!("invalid Stripe customer id: {}", stripe_customer_id))
        })?);
        create.mode = Some(CheckoutSessionMode::Subscription);
        create.success_url = Some(&success_url);
        create.cancel_url = Some(&cancel_url);
        create.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(price_id),
            quantity: Some(1),
            ..Default::default()
        }]);
        create.metadata = Some(metadata.clone());
        create.subscription_data = Some(CreateCheckoutSessionSubscriptionData {
            metadata: Some(metadata),
            ..Default::default()
        });
        // Shipping address is required for medication delivery
        create.shipping_address_collection = Some(CreateCheckoutSessionShippingAddressCollection {
            allowed_countries: vec![
                CreateCheckoutSessionShippingAddressCollectionAllowedCountries::Us,
            ],
        });
        create.allow_promotion_codes = Some(true);

        let session = CheckoutSession::create(self.stripe.inner(), create).await?;

        tracing::info!(
            customer_id = customer.id,
            product = %params.product,
            plan = %params.plan,
            session_id = %session.id,
            "Checkout session created"
        );

        Ok(CheckoutResponse {
            session_id: session.id.to_string(),
            url: session.url.clone(),
        })
    }

    /// Create a billing portal session for an existing customer.
    pub async fn create_portal_session(&self, email: &str) -> BillingResult<PortalResponse> {
        let customer = self
            .customers
            .find_by_email(email)
            .await?
            .ok_or_else(|| BillingError::CustomerNotFound(email.to_string()))?;

        let stripe_customer_id = customer
            .stripe_customer_id
            .ok_or_else(|| BillingError::CustomerNotFound(email.to_string()))?;

        let config = self.stripe.config();
        let parsed = stripe_customer_id.parse().map_err(|_| {
            BillingError::Internal(format!("invalid Stripe customer id: {}", stripe_customer_id))
        })?;

        let mut create = CreateBillingPortalSession::new(parsed);
        create.return_url = Some(&config.site_url);

        let session = BillingPortalSession::create(self.stripe.inner(), create).await?;

        Ok(PortalResponse { url: session.url })
    }
}

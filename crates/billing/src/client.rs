//! Stripe client wrapper and environment-driven configuration.

use std::sync::Arc;

use meridian_shared::{PlanType, ProductType};

use crate::error::{BillingError, BillingResult};

/// Stripe price ids, one per (product, plan) pair.
///
/// Missing entries mean the pair is not sellable; checkout rejects it with
/// `UnknownPlan` before touching Stripe.
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    pub sema_monthly: Option<String>,
    pub sema_3month: Option<String>,
    pub sema_6month: Option<String>,
    pub tirz_monthly: Option<String>,
    pub tirz_3month: Option<String>,
    pub tirz_6month: Option<String>,
}

impl PriceTable {
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            sema_monthly: var("STRIPE_PRICE_SEMA_MONTHLY"),
            sema_3month: var("STRIPE_PRICE_SEMA_3MONTH"),
            sema_6month: var("STRIPE_PRICE_SEMA_6MONTH"),
            tirz_monthly: var("STRIPE_PRICE_TIRZ_MONTHLY"),
            tirz_3month: var("STRIPE_PRICE_TIRZ_3MONTH"),
            tirz_6month: var("STRIPE_PRICE_TIRZ_6MONTH"),
        }
    }

    pub fn price_id(&self, product: ProductType, plan: PlanType) -> Option<&str> {
        let entry = match (product, plan) {
            (ProductType::Semaglutide, PlanType::Monthly) => &self.sema_monthly,
            (ProductType::Semaglutide, PlanType::ThreeMonth) => &self.sema_3month,
            (ProductType::Semaglutide, PlanType::SixMonth) => &self.sema_6month,
            (ProductType::Tirzepatide, PlanType::Monthly) => &self.tirz_monthly,
            (ProductType::Tirzepatide, PlanType::ThreeMonth) => &self.tirz_3month,
            (ProductType::Tirzepatide, PlanType::SixMonth) => &self.tirz_6month,
        };
        entry.as_deref()
    }
}

/// Stripe configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub prices: PriceTable,
    /// Public site base used for checkout success/cancel and portal returns.
    pub site_url: String,
    pub brand_name: String,
}

impl StripeConfig {
    pub fn from_env() -> BillingResult<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| BillingError::Config("STRIPE_SECRET_KEY not set".to_string()))?;
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| BillingError::Config("STRIPE_WEBHOOK_SECRET not set".to_string()))?;
        let site_url = std::env::var("SITE_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());
        let brand_name =
            std::env::var("BRAND_NAME").unwrap_or_else(|_| "Meridian Health".to_string());

        Ok(Self {
            secret_key,
            webhook_secret,
            prices: PriceTable::from_env(),
            site_url,
            brand_name,
        })
    }
}

/// Cheaply cloneable wrapper around the Stripe SDK client plus our config.
#[derive(Clone)]
pub struct StripeClient {
    client: stripe::Client,
    config: Arc<StripeConfig>,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        let client = stripe::Client::new(config.secret_key.clone());
        Self {
            client,
            config: Arc::new(config),
        }
    }

    pub fn from_env() -> BillingResult<Self> {
        Ok(Self::new(StripeConfig::from_env()?))
    }

    /// The underlying SDK client, for direct API calls.
    pub fn inner(&self) -> &stripe::Client {
        &self.client
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PriceTable {
        PriceTable {
            sema_monthly: Some("price_sema_m".to_string()),
            sema_3month: Some("price_sema_3m".to_string()),
            sema_6month: None,
            tirz_monthly: Some("price_tirz_m".to_string()),
            tirz_3month: None,
            tirz_6month: None,
        }
    }

    #[test]
    fn resolves_configured_pairs() {
        let prices = table();
        assert_eq!(
            prices.price_id(ProductType::Semaglutide, PlanType::Monthly),
            Some("price_sema_m")
        );
        assert_eq!(
            prices.price_id(ProductType::Tirzepatide, PlanType::Monthly),
            Some("price_tirz_m")
        );
    }

    #[test]
    fn unconfigured_pair_is_none() {
        let prices = table();
        assert_eq!(
            prices.price_id(ProductType::Semaglutide, PlanType::SixMonth),
            None
        );
        assert_eq!(
            prices.price_id(ProductType::Tirzepatide, PlanType::ThreeMonth),
            None
        );
    }
}

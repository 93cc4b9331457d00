//! Application state

use std::sync::Arc;

use meridian_billing::BillingService;
use sqlx::PgPool;

use crate::{auth::JwtManager, config::Config, error::ApiError, geo::GeoClient};

/// Shared application state, injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub jwt: JwtManager,
    /// Billing service; None when Stripe env vars are absent or billing is
    /// disabled, in which case billing endpoints answer 503.
    pub billing: Option<Arc<BillingService>>,
    pub geo: GeoClient,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let jwt = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);

        let billing = if config.enable_billing {
            match BillingService::from_env(pool.clone()) {
                Ok(service) => {
                    tracing::info!("Stripe billing service initialized");
                    Some(Arc::new(service))
                }
                Err(e) => {
                    tracing::warn!("Stripe billing not configured: {}", e);
                    None
                }
            }
        } else {
            tracing::info!("Billing disabled via config (ENABLE_BILLING=false)");
            None
        };

        Self {
            pool,
            config,
            jwt,
            billing,
            geo: GeoClient::new(),
        }
    }

    /// Billing service or 503.
    pub fn billing(&self) -> Result<&Arc<BillingService>, ApiError> {
        self.billing.as_ref().ok_or(ApiError::ServiceUnavailable)
    }
}

// Billing crate clippy configuration
// These are intentional patterns in this crate:
#![allow(clippy::too_many_arguments)] // Some Stripe operations require many parameters
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Meridian Billing Module
//!
//! Handles Stripe integration for the telehealth subscription service.
//!
//! ## Features
//!
//! - **Checkout**: Create hosted checkout sessions for (product, plan) pairs
//! - **Customers**: Billing identity, write-once Stripe linkage, shipping
//! - **Subscriptions**: Webhook-driven ledger of Stripe subscriptions
//! - **Orders**: One row per billing transaction, fulfillment tracking
//! - **Webhooks**: Idempotent reconciliation of Stripe events
//! - **Reporting**: Read-side aggregates for the admin dashboard

pub mod checkout;
pub mod client;
pub mod customer;
pub mod error;
pub mod orders;
pub mod reporting;
pub mod subscriptions;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Checkout
pub use checkout::{CheckoutParams, CheckoutResponse, CheckoutService, PortalResponse};

// Client
pub use client::{PriceTable, StripeClient, StripeConfig};

// Customer
pub use customer::{normalize_email, CustomerRecord, CustomerService, ShippingAddress};

// Error
pub use error::{BillingError, BillingResult};

// Orders
pub use orders::{FulfillmentUpdate, OrderService};

// Reporting
pub use reporting::{
    BreakdownRow, CustomerListPage, DashboardReport, DashboardStats, OrderListRow,
    ReportingService, RevenuePoint, SubscriptionListRow,
};

// Subscriptions
pub use subscriptions::{
    CancellationOutcome, SubscriptionRef, SubscriptionService, SubscriptionStatusView,
};

// Webhooks
pub use webhooks::{WebhookHandler, WebhookReplayResult};

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub checkout: CheckoutService,
    pub customers: CustomerService,
    pub orders: OrderService,
    pub reporting: ReportingService,
    pub subscriptions: SubscriptionService,
    pub webhooks: WebhookHandler,
}

impl BillingService {
    /// Create a new billing service from environment variables
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        let stripe = StripeClient::from_env()?;
        Ok(Self::with_client(stripe, pool))
    }

    /// Create a new billing service with explicit config
    pub fn new(config: StripeConfig, pool: PgPool) -> Self {
        Self::with_client(StripeClient::new(config), pool)
    }

    fn with_client(stripe: StripeClient, pool: PgPool) -> Self {
        Self {
            checkout: CheckoutService::new(stripe.clone(), pool.clone()),
            customers: CustomerService::new(pool.clone()),
            orders: OrderService::new(pool.clone()),
            reporting: ReportingService::new(pool.clone()),
            subscriptions: SubscriptionService::new(stripe.clone(), pool.clone()),
            webhooks: WebhookHandler::new(stripe, pool),
        }
    }
}

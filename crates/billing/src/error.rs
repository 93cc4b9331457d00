//! Billing error types

use thiserror::Error;

pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("webhook signature verification failed")]
    WebhookSignatureInvalid,

    #[error("unexpected webhook payload: {0}")]
    WebhookEventNotSupported(String),

    #[error("no price configured for product '{product}' plan '{plan}'")]
    UnknownPlan { product: String, plan: String },

    #[error("customer not found: {0}")]
    CustomerNotFound(String),

    #[error("subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("stripe error: {0}")]
    Stripe(#[from] stripe::StripeError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Internal(String),
}

impl From<sqlx::Error> for BillingError {
    fn from(e: sqlx::Error) -> Self {
        BillingError::Database(e.to_string())
    }
}

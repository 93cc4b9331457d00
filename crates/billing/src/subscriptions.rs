//! Subscription ledger: upserts driven by webhook events, admin
//! cancellation, and the customer-facing status lookup.

use meridian_shared::SubscriptionStatus;
use sqlx::PgPool;
use time::OffsetDateTime;

use stripe::{CancelSubscription, Subscription, UpdateSubscription};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

/// Lightweight reference to a subscription row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubscriptionRef {
    pub id: i64,
    pub customer_id: i64,
    pub product_type: String,
}

/// Projection returned by the customer-facing status check.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubscriptionStatusView {
    pub status: String,
    pub product_type: String,
    pub plan_type: String,
    pub current_period_end: Option<OffsetDateTime>,
    pub cancel_at: Option<OffsetDateTime>,
}

impl SubscriptionStatusView {
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active.as_str()
    }
}

/// Outcome of an admin cancellation request.
#[derive(Debug, Clone)]
pub struct CancellationOutcome {
    pub immediate: bool,
    pub message: String,
}

/// Service owning the subscriptions table.
pub struct SubscriptionService {
    stripe: StripeClient,
    pool: PgPool,
}

impl SubscriptionService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self { stripe, pool }
    }

    /// Upsert a subscription row from the Stripe subscription object.
    ///
    /// First sight inserts the full row. On conflict only status and period
    /// fields are updated: amount, product and plan are set once at creation
    /// and never rewritten by replays or racing deliveries.
    pub async fn upsert_from_stripe(
        &self,
        customer_id: i64,
        subscription: &Subscription,
        product_type: &str,
        plan_type: &str,
    ) -> BillingResult<i64> {
        let price_item = subscription.items.data.first();
        let stripe_price_id = price_item
            .and_then(|item| item.price.as_ref())
            .map(|price| price.id.to_string());
        let amount_cents = price_item
            .and_then(|item| item.price.as_ref())
            .and_then(|price| price.unit_amount)
            .unwrap_or(0) as i32;

        let status = SubscriptionStatus::from_stripe(subscription.status.as_str());
        let period_start =
            OffsetDateTime::from_unix_timestamp(subscription.current_period_start).ok();
        let period_end = OffsetDateTime::from_unix_timestamp(subscription.current_period_end).ok();

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO subscriptions
                (customer_id, stripe_subscription_id, stripe_price_id, product_type,
                 plan_type, status, amount_cents, current_period_start, current_period_end)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (stripe_subscription_id) DO UPDATE SET
                status = EXCLUDED.status,
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(customer_id)
        .bind(subscription.id.as_str())
        .bind(stripe_price_id)
        .bind(product_type)
        .bind(plan_type)
        .bind(status.as_str())
        .bind(amount_cents)
        .bind(period_start)
        .bind(period_end)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Apply a `customer.subscription.updated` event.
    ///
    /// Overwrites status, period and cancel_at. The `status <> 'canceled'`
    /// guard keeps cancellation terminal: an out-of-order update arriving
    /// after the delete event cannot resurrect the row. Unknown subscription
    /// ids are tolerated silently (the created event may not have landed
    /// yet).
    pub async fn apply_update(&self, subscription: &Subscription) -> BillingResult<bool> {
        let status = SubscriptionStatus::from_stripe(subscription.status.as_str());
        let period_start =
            OffsetDateTime::from_unix_timestamp(subscription.current_period_start).ok();
        let period_end = OffsetDateTime::from_unix_timestamp(subscription.current_period_end).ok();
        let cancel_at = subscription
            .cancel_at
            .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok());

        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = $1,
                current_period_start = $2,
                current_period_end = $3,
                cancel_at = $4,
                updated_at = NOW()
            WHERE stripe_subscription_id = $5 AND status <> 'canceled'
            "#,
        )
        .bind(status.as_str())
        .bind(period_start)
        .bind(period_end)
        .bind(cancel_at)
        .bind(subscription.id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Apply a `customer.subscription.deleted` event.
    ///
    /// Idempotent: `canceled_at` is set once and kept on re-delivery.
    pub async fn mark_canceled(&self, stripe_subscription_id: &str) -> BillingResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = 'canceled',
                canceled_at = COALESCE(canceled_at, NOW()),
                updated_at = NOW()
            WHERE stripe_subscription_id = $1
            "#,
        )
        .bind(stripe_subscription_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Apply an `invoice.payment_failed` event: flag the subscription as
    /// past due. Canceled rows are left alone.
    pub async fn mark_past_due(&self, stripe_subscription_id: &str) -> BillingResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = 'past_due', updated_at = NOW()
            WHERE stripe_subscription_id = $1 AND status <> 'canceled'
            "#,
        )
        .bind(stripe_subscription_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn find_by_stripe_id(
        &self,
        stripe_subscription_id: &str,
    ) -> BillingResult<Option<SubscriptionRef>> {
        let row = sqlx::query_as(
            r#"
            SELECT id, customer_id, product_type
            FROM subscriptions WHERE stripe_subscription_id = $1
            "#,
        )
        .bind(stripe_subscription_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Admin cancellation: immediately, or at the end of the current period.
    ///
    /// Only the Stripe side is mutated here; the ledger row follows when the
    /// resulting webhook events arrive.
    pub async fn cancel(
        &self,
        subscription_id: i64,
        immediate: bool,
    ) -> BillingResult<CancellationOutcome> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT stripe_subscription_id FROM subscriptions WHERE id = $1")
                .bind(subscription_id)
                .fetch_optional(&self.pool)
                .await?;

        let stripe_subscription_id = row
            .and_then(|(id,)| id)
            .ok_or_else(|| BillingError::SubscriptionNotFound(subscription_id.to_string()))?;

        let parsed = stripe_subscription_id.parse().map_err(|_| {
            BillingError::Internal(format!(
                "invalid Stripe subscription id: {}",
                stripe_subscription_id
            ))
        })?;

        if immediate {
            Subscription::cancel(self.stripe.inner(), &parsed, CancelSubscription::default())
                .await?;
        } else {
            Subscription::update(
                self.stripe.inner(),
                &parsed,
                UpdateSubscription {
                    cancel_at_period_end: Some(true),
                    ..Default::default()
                },
            )
            .await?;
        }

        tracing::info!(
            subscription_id = subscription_id,
            stripe_subscription_id = %stripe_subscription_id,
            immediate = immediate,
            "Subscription cancellation requested"
        );

        Ok(CancellationOutcome {
            immediate,
            message: if immediate {
                "Canceled immediately".to_string()
            } else {
                "Will cancel at period end".to_string()
            },
        })
    }

    /// Most recent subscription for an email, if any.
    pub async fn latest_for_email(
        &self,
        email: &str,
    ) -> BillingResult<Option<SubscriptionStatusView>> {
        let row = sqlx::query_as(
            r#"
            SELECT s.status, s.product_type, s.plan_type, s.current_period_end, s.cancel_at
            FROM subscriptions s
            JOIN customers c ON c.id = s.customer_id
            WHERE c.email = $1
            ORDER BY s.created_at DESC
            LIMIT 1
            "#,
        )
        .bind(crate::customer::normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_view_active_flag() {
        let view = SubscriptionStatusView {
            status: "active".to_string(),
            product_type: "semaglutide".to_string(),
            plan_type: "monthly".to_string(),
            current_period_end: None,
            cancel_at: None,
        };
        assert!(view.is_active());

        let view = SubscriptionStatusView {
            status: "past_due".to_string(),
            ..view
        };
        assert!(!view.is_active());
    }
}

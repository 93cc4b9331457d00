//! Order ledger: one row per billing transaction, plus admin fulfillment
//! updates.

use sqlx::PgPool;

use crate::error::BillingResult;

/// Partial fulfillment update; None leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct FulfillmentUpdate {
    pub status: Option<String>,
    pub pharmacy_status: Option<String>,
    pub tracking_number: Option<String>,
}

/// Service owning the orders table.
pub struct OrderService {
    pool: PgPool,
}

impl OrderService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record the initial payment taken at checkout completion.
    ///
    /// Initial checkout orders carry a payment intent but no invoice id, so
    /// the invoice uniqueness constraint does not apply here; duplicate
    /// suppression for this path is the event-level idempotency gate.
    pub async fn record_initial_payment(
        &self,
        customer_id: i64,
        subscription_id: i64,
        payment_intent_id: Option<&str>,
        amount_cents: i32,
        product_type: &str,
    ) -> BillingResult<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO orders
                (customer_id, subscription_id, stripe_payment_intent_id, amount_cents,
                 status, product_type)
            VALUES ($1, $2, $3, $4, 'paid', $5)
            RETURNING id
            "#,
        )
        .bind(customer_id)
        .bind(subscription_id)
        .bind(payment_intent_id)
        .bind(amount_cents)
        .bind(product_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Record a recurring invoice payment.
    ///
    /// Keyed on the invoice id: a redelivered or racing `invoice.paid` for
    /// the same invoice lands on the unique index and inserts nothing.
    /// Returns whether a new row was created.
    pub async fn record_invoice_payment(
        &self,
        customer_id: i64,
        subscription_id: i64,
        invoice_id: &str,
        payment_intent_id: Option<&str>,
        amount_cents: i32,
        product_type: &str,
    ) -> BillingResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO orders
                (customer_id, subscription_id, stripe_invoice_id,
                 stripe_payment_intent_id, amount_cents, status, product_type)
            VALUES ($1, $2, $3, $4, $5, 'paid', $6)
            ON CONFLICT (stripe_invoice_id) WHERE stripe_invoice_id IS NOT NULL
            DO NOTHING
            "#,
        )
        .bind(customer_id)
        .bind(subscription_id)
        .bind(invoice_id)
        .bind(payment_intent_id)
        .bind(amount_cents)
        .bind(product_type)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Admin fulfillment update; unset fields keep their current value.
    pub async fn update_fulfillment(
        &self,
        order_id: i64,
        update: FulfillmentUpdate,
    ) -> BillingResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = COALESCE($2, status),
                pharmacy_status = COALESCE($3, pharmacy_status),
                tracking_number = COALESCE($4, tracking_number),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(order_id)
        .bind(update.status)
        .bind(update.pharmacy_status)
        .bind(update.tracking_number)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

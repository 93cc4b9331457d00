//! Stripe webhook reconciliation
//!
//! Applies at-least-once, possibly out-of-order Stripe events to the
//! subscription and order ledgers. Signature verification happens before any
//! database access; an atomic claim on the event id keeps duplicate
//! deliveries from re-running mutations; failed dispatches stay re-claimable
//! so a later redelivery (or an admin replay) can repair them.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgPool;
use stripe::{
    CheckoutSession, CheckoutSessionMode, Event, EventObject, EventType, Invoice, Subscription,
    Webhook,
};
use subtle::ConstantTimeEq;
use time::OffsetDateTime;

use crate::client::StripeClient;
use crate::customer::{CustomerService, ShippingAddress};
use crate::error::{BillingError, BillingResult};
use crate::orders::OrderService;
use crate::subscriptions::SubscriptionService;

type HmacSha256 = Hmac<Sha256>;

/// How long a 'processing' claim is honored before a redelivery may steal it.
const PROCESSING_TIMEOUT_MINUTES: i32 = 30;

/// Outcome of an admin-triggered replay.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WebhookReplayResult {
    pub stripe_event_id: String,
    pub event_type: String,
    pub reprocessed: bool,
    pub outcome: String,
}

/// Webhook handler for Stripe events.
pub struct WebhookHandler {
    stripe: StripeClient,
    pool: PgPool,
}

impl WebhookHandler {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self { stripe, pool }
    }

    /// Verify and parse a Stripe webhook event.
    ///
    /// Tries the SDK's verifier first, then falls back to manual signature
    /// verification; the SDK rejects payloads from API versions newer than
    /// the one it was generated against even when the signature is fine.
    pub fn verify_event(&self, payload: &str, signature: &str) -> BillingResult<Event> {
        let webhook_secret = &self.stripe.config().webhook_secret;

        match Webhook::construct_event(payload, signature, webhook_secret) {
            Ok(event) => return Ok(event),
            Err(e) => {
                tracing::debug!(
                    stripe_error = %e,
                    "SDK webhook parsing failed, trying manual verification"
                );
            }
        }

        verify_signature_manual(payload, signature, webhook_secret)?;

        let event: Event = serde_json::from_str(payload).map_err(|e| {
            tracing::warn!(parse_error = %e, "Failed to parse webhook event JSON");
            BillingError::WebhookSignatureInvalid
        })?;

        tracing::debug!(
            event_type = %event.type_,
            event_id = %event.id,
            "Manual webhook verification succeeded"
        );

        Ok(event)
    }

    /// Handle a verified Stripe event.
    ///
    /// An INSERT...ON CONFLICT...RETURNING on the event id atomically claims
    /// exclusive processing rights: only one of any number of concurrent
    /// identical deliveries gets a row back. Events whose previous dispatch
    /// failed, or whose claim has been stuck in 'processing' past the
    /// timeout, can be re-claimed by a redelivery; successfully processed
    /// events short-circuit as duplicates without touching the ledger.
    pub async fn handle_event(&self, event: Event, raw_payload: &str) -> BillingResult<()> {
        let event_id = event.id.to_string();
        let event_type = event.type_.to_string();
        let event_timestamp = OffsetDateTime::from_unix_timestamp(event.created)
            .unwrap_or_else(|_| OffsetDateTime::now_utc());

        let claimed: Option<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO webhook_events
                (stripe_event_id, event_type, event_timestamp, payload, status, processing_started_at)
            VALUES ($1, $2, $3, $4::jsonb, 'processing', NOW())
            ON CONFLICT (stripe_event_id) DO UPDATE SET
                status = 'processing',
                processing_started_at = NOW(),
                error_message = NULL
            WHERE webhook_events.status = 'error'
               OR (webhook_events.status = 'processing'
                   AND webhook_events.processing_started_at < NOW() - ($5 || ' minutes')::INTERVAL)
            RETURNING id
            "#,
        )
        .bind(&event_id)
        .bind(&event_type)
        .bind(event_timestamp)
        .bind(raw_payload)
        .bind(PROCESSING_TIMEOUT_MINUTES)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(
                event_id = %event_id,
                error = %e,
                "Failed to claim webhook event for processing"
            );
            BillingError::Database(e.to_string())
        })?;

        if claimed.is_none() {
            let existing_status: Option<(String,)> =
                sqlx::query_as("SELECT status FROM webhook_events WHERE stripe_event_id = $1")
                    .bind(&event_id)
                    .fetch_optional(&self.pool)
                    .await
                    .ok()
                    .flatten();

            let reason = match existing_status {
                Some((status,)) if status == "success" => "already processed",
                Some((status,)) if status == "processing" => {
                    "currently being processed by another delivery"
                }
                Some(_) => "exists with another status",
                None => "unknown (claim race?)",
            };

            tracing::info!(
                event_id = %event_id,
                event_type = %event_type,
                reason = %reason,
                "Duplicate webhook event, skipping"
            );
            return Ok(());
        }

        tracing::info!(
            event_type = %event_type,
            event_id = %event_id,
            "Processing Stripe webhook event"
        );

        let result = self.process_event_internal(&event).await;
        self.record_outcome(&event_id, &result).await;
        result
    }

    /// Re-run dispatch for a stored event, from the audited payload.
    ///
    /// Used by the admin replay endpoint to repair events whose dispatch
    /// failed after the delivering system stopped retrying. Successfully
    /// processed events are never re-run.
    pub async fn replay_event(&self, stripe_event_id: &str) -> BillingResult<WebhookReplayResult> {
        let row: Option<(String, String, Option<serde_json::Value>)> = sqlx::query_as(
            r#"
            SELECT event_type, status, payload
            FROM webhook_events WHERE stripe_event_id = $1
            "#,
        )
        .bind(stripe_event_id)
        .fetch_optional(&self.pool)
        .await?;

        let (event_type, status, payload) = row.ok_or_else(|| {
            BillingError::Internal(format!("webhook event not found: {}", stripe_event_id))
        })?;

        if status == "success" {
            return Ok(WebhookReplayResult {
                stripe_event_id: stripe_event_id.to_string(),
                event_type,
                reprocessed: false,
                outcome: "already processed".to_string(),
            });
        }

        let payload = payload.ok_or_else(|| {
            BillingError::Internal(format!("no stored payload for event {}", stripe_event_id))
        })?;
        let event: Event = serde_json::from_value(payload).map_err(|e| {
            BillingError::Internal(format!("stored payload no longer parses: {}", e))
        })?;

        sqlx::query(
            r#"
            UPDATE webhook_events
            SET status = 'processing', processing_started_at = NOW(), error_message = NULL
            WHERE stripe_event_id = $1
            "#,
        )
        .bind(stripe_event_id)
        .execute(&self.pool)
        .await?;

        let result = self.process_event_internal(&event).await;
        self.record_outcome(stripe_event_id, &result).await;

        let outcome = match &result {
            Ok(()) => "success".to_string(),
            Err(e) => format!("error: {}", e),
        };

        Ok(WebhookReplayResult {
            stripe_event_id: stripe_event_id.to_string(),
            event_type,
            reprocessed: true,
            outcome,
        })
    }

    /// Record the dispatch outcome on the claimed audit row.
    ///
    /// Retried once; the audit row drives the idempotency gate, so losing
    /// the update would leave the event stuck in 'processing' until the
    /// claim timeout.
    async fn record_outcome(&self, event_id: &str, result: &BillingResult<()>) {
        let (status, error_message) = match result {
            Ok(()) => ("success", None),
            Err(e) => ("error", Some(e.to_string())),
        };

        for attempt in 0..2 {
            match sqlx::query(
                r#"
                UPDATE webhook_events
                SET status = $1, error_message = $2
                WHERE stripe_event_id = $3
                "#,
            )
            .bind(status)
            .bind(&error_message)
            .bind(event_id)
            .execute(&self.pool)
            .await
            {
                Ok(_) => return,
                Err(e) if attempt == 0 => {
                    tracing::warn!(
                        event_id = %event_id,
                        error = %e,
                        "Failed to record webhook outcome, retrying"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        event_id = %event_id,
                        status = %status,
                        error = %e,
                        "Failed to record webhook outcome after retry; \
                         event will appear stuck until the claim timeout"
                    );
                }
            }
        }
    }

    /// Dispatch on event type. Unrecognized types are acknowledged without
    /// ledger access.
    async fn process_event_internal(&self, event: &Event) -> BillingResult<()> {
        let event_owned = event.clone();

        match event.type_ {
            EventType::CheckoutSessionCompleted => {
                self.handle_checkout_completed(event_owned).await?;
            }
            EventType::CustomerSubscriptionUpdated => {
                self.handle_subscription_updated(event_owned).await?;
            }
            EventType::CustomerSubscriptionDeleted => {
                self.handle_subscription_deleted(event_owned).await?;
            }
            EventType::InvoicePaid => {
                self.handle_invoice_paid(event_owned).await?;
            }
            EventType::InvoicePaymentFailed => {
                self.handle_invoice_payment_failed(event_owned).await?;
            }
            _ => {
                tracing::info!(
                    event_type = %event.type_,
                    event_id = %event.id,
                    "Received unhandled Stripe event type - no handler configured"
                );
            }
        }

        Ok(())
    }

    /// checkout.session.completed: the birth of a subscription.
    ///
    /// Links the Stripe customer id (write-once), stores the collected
    /// shipping address, upserts the subscription row and records the
    /// initial paid order.
    async fn handle_checkout_completed(&self, event: Event) -> BillingResult<()> {
        let session = self.extract_checkout_session(event)?;

        if session.mode != CheckoutSessionMode::Subscription {
            tracing::debug!(
                session_id = %session.id,
                mode = ?session.mode,
                "Ignoring non-subscription checkout session"
            );
            return Ok(());
        }

        let Some(customer_id) = customer_id_from_metadata(session.metadata.as_ref()) else {
            tracing::warn!(
                session_id = %session.id,
                "Checkout session has no db_customer_id metadata, skipping"
            );
            return Ok(());
        };

        let customers = CustomerService::new(self.pool.clone());

        if let Some(customer) = &session.customer {
            customers
                .link_stripe_customer(customer_id, customer.id().as_str())
                .await?;
        }

        if let Some(address) = session
            .shipping_details
            .as_ref()
            .and_then(|details| details.address.as_ref())
        {
            if let Some(line1) = address.line1.as_deref() {
                let shipping = ShippingAddress {
                    street: ShippingAddress::street_from_lines(line1, address.line2.as_deref()),
                    city: address.city.clone(),
                    state: address.state.clone(),
                    zip: address.postal_code.clone(),
                };
                customers.update_shipping(customer_id, &shipping).await?;
            }
        }

        let Some(subscription_ref) = session.subscription.clone() else {
            tracing::warn!(
                session_id = %session.id,
                "Subscription-mode checkout session carries no subscription"
            );
            return Ok(());
        };

        let parsed_sub_id = subscription_ref.id().parse().map_err(|e| {
            tracing::error!("Failed to parse subscription ID: {}", e);
            BillingError::SubscriptionNotFound(subscription_ref.id().to_string())
        })?;
        let subscription =
            Subscription::retrieve(self.stripe.inner(), &parsed_sub_id, &[]).await?;

        let metadata = session.metadata.clone().unwrap_or_default();
        let product_type = metadata
            .get("product_type")
            .or_else(|| subscription.metadata.get("product_type"))
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());
        let plan_type = metadata
            .get("plan_type")
            .or_else(|| subscription.metadata.get("plan_type"))
            .cloned()
            .unwrap_or_else(|| "monthly".to_string());

        let subscriptions = SubscriptionService::new(self.stripe.clone(), self.pool.clone());
        let internal_sub_id = subscriptions
            .upsert_from_stripe(customer_id, &subscription, &product_type, &plan_type)
            .await?;

        let amount_cents = subscription
            .items
            .data
            .first()
            .and_then(|item| item.price.as_ref())
            .and_then(|price| price.unit_amount)
            .unwrap_or(0) as i32;
        let payment_intent_id = session
            .payment_intent
            .as_ref()
            .map(|pi| pi.id().to_string());

        let orders = OrderService::new(self.pool.clone());
        orders
            .record_initial_payment(
                customer_id,
                internal_sub_id,
                payment_intent_id.as_deref(),
                amount_cents,
                &product_type,
            )
            .await?;

        tracing::info!(
            customer_id = customer_id,
            subscription_id = %subscription.id,
            product = %product_type,
            plan = %plan_type,
            "New subscription from checkout"
        );

        Ok(())
    }

    async fn handle_subscription_updated(&self, event: Event) -> BillingResult<()> {
        let subscription = self.extract_subscription(event)?;

        let subscriptions = SubscriptionService::new(self.stripe.clone(), self.pool.clone());
        let updated = subscriptions.apply_update(&subscription).await?;

        if updated {
            tracing::info!(
                subscription_id = %subscription.id,
                status = %subscription.status,
                "Subscription updated"
            );
        } else {
            // Either the row doesn't exist yet (created event still in
            // flight) or it is canceled and stays that way.
            tracing::info!(
                subscription_id = %subscription.id,
                "Subscription update did not apply, skipping"
            );
        }

        Ok(())
    }

    async fn handle_subscription_deleted(&self, event: Event) -> BillingResult<()> {
        let subscription = self.extract_subscription(event)?;

        let subscriptions = SubscriptionService::new(self.stripe.clone(), self.pool.clone());
        subscriptions.mark_canceled(subscription.id.as_str()).await?;

        tracing::info!(
            subscription_id = %subscription.id,
            "Subscription canceled"
        );

        Ok(())
    }

    async fn handle_invoice_paid(&self, event: Event) -> BillingResult<()> {
        let invoice = self.extract_invoice(event)?;

        let Some(subscription_ref) = invoice.subscription.as_ref() else {
            tracing::debug!(invoice_id = %invoice.id, "Invoice has no subscription, skipping");
            return Ok(());
        };
        let stripe_subscription_id = subscription_ref.id().to_string();

        let subscriptions = SubscriptionService::new(self.stripe.clone(), self.pool.clone());
        let Some(sub) = subscriptions
            .find_by_stripe_id(&stripe_subscription_id)
            .await?
        else {
            tracing::warn!(
                invoice_id = %invoice.id,
                subscription_id = %stripe_subscription_id,
                "Invoice references unknown subscription, skipping"
            );
            return Ok(());
        };

        let amount_cents = invoice.amount_paid.unwrap_or(0) as i32;
        let payment_intent_id = invoice
            .payment_intent
            .as_ref()
            .map(|pi| pi.id().to_string());

        let orders = OrderService::new(self.pool.clone());
        let inserted = orders
            .record_invoice_payment(
                sub.customer_id,
                sub.id,
                invoice.id.as_str(),
                payment_intent_id.as_deref(),
                amount_cents,
                &sub.product_type,
            )
            .await?;

        if inserted {
            tracing::info!(
                invoice_id = %invoice.id,
                customer_id = sub.customer_id,
                amount_cents = amount_cents,
                "Invoice paid, order recorded"
            );
        } else {
            tracing::info!(
                invoice_id = %invoice.id,
                "Order for invoice already exists, skipping"
            );
        }

        Ok(())
    }

    async fn handle_invoice_payment_failed(&self, event: Event) -> BillingResult<()> {
        let invoice = self.extract_invoice(event)?;

        let Some(subscription_ref) = invoice.subscription.as_ref() else {
            tracing::debug!(invoice_id = %invoice.id, "Invoice has no subscription, skipping");
            return Ok(());
        };
        let stripe_subscription_id = subscription_ref.id().to_string();

        let subscriptions = SubscriptionService::new(self.stripe.clone(), self.pool.clone());
        let updated = subscriptions
            .mark_past_due(&stripe_subscription_id)
            .await?;

        tracing::warn!(
            invoice_id = %invoice.id,
            subscription_id = %stripe_subscription_id,
            updated = updated,
            "Invoice payment failed"
        );
        // TODO: queue a payment-failed email once a notification service exists

        Ok(())
    }

    fn extract_checkout_session(&self, event: Event) -> BillingResult<CheckoutSession> {
        match event.data.object {
            EventObject::CheckoutSession(session) => Ok(session),
            _ => Err(BillingError::WebhookEventNotSupported(
                "Expected CheckoutSession".to_string(),
            )),
        }
    }

    fn extract_subscription(&self, event: Event) -> BillingResult<Subscription> {
        match event.data.object {
            EventObject::Subscription(subscription) => Ok(subscription),
            _ => Err(BillingError::WebhookEventNotSupported(
                "Expected Subscription".to_string(),
            )),
        }
    }

    fn extract_invoice(&self, event: Event) -> BillingResult<Invoice> {
        match event.data.object {
            EventObject::Invoice(invoice) => Ok(invoice),
            _ => Err(BillingError::WebhookEventNotSupported(
                "Expected Invoice".to_string(),
            )),
        }
    }
}

/// Manual Stripe signature verification.
///
/// Header format is `t=timestamp,v1=signature[,v0=signature]`; the signed
/// payload is `"{t}.{body}"` HMAC-SHA256'd with the `whsec_`-stripped
/// secret. Timestamps older than five minutes are rejected to bound replay.
pub(crate) fn verify_signature_manual(
    payload: &str,
    signature: &str,
    webhook_secret: &str,
) -> BillingResult<()> {
    let mut timestamp: Option<i64> = None;
    let mut v1_signature: Option<String> = None;

    for part in signature.split(',') {
        let kv: Vec<&str> = part.splitn(2, '=').collect();
        if kv.len() == 2 {
            match kv[0] {
                "t" => timestamp = kv[1].parse().ok(),
                "v1" => v1_signature = Some(kv[1].to_string()),
                _ => {}
            }
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        tracing::warn!("Missing timestamp in webhook signature header");
        BillingError::WebhookSignatureInvalid
    })?;

    let v1_signature = v1_signature.ok_or_else(|| {
        tracing::warn!("Missing v1 signature in webhook signature header");
        BillingError::WebhookSignatureInvalid
    })?;

    let now = OffsetDateTime::now_utc().unix_timestamp();
    if (now - timestamp).abs() > 300 {
        tracing::warn!(
            timestamp = timestamp,
            skew_seconds = (now - timestamp).abs(),
            "Webhook timestamp outside tolerance"
        );
        return Err(BillingError::WebhookSignatureInvalid);
    }

    let secret_key = webhook_secret
        .strip_prefix("whsec_")
        .unwrap_or(webhook_secret);
    let signed_payload = format!("{}.{}", timestamp, payload);

    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
        .map_err(|_| BillingError::WebhookSignatureInvalid)?;
    mac.update(signed_payload.as_bytes());
    let computed = hex::encode(mac.finalize().into_bytes());

    let matches: bool = computed.as_bytes().ct_eq(v1_signature.as_bytes()).into();
    if !matches {
        tracing::warn!("Webhook signature mismatch");
        return Err(BillingError::WebhookSignatureInvalid);
    }

    Ok(())
}

/// Pull our customer id out of checkout session metadata.
pub(crate) fn customer_id_from_metadata(
    metadata: Option<&std::collections::HashMap<String, String>>,
) -> Option<i64> {
    metadata
        .and_then(|m| m.get("db_customer_id"))
        .and_then(|id| id.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn customer_id_extraction() {
        let mut metadata = HashMap::new();
        metadata.insert("db_customer_id".to_string(), "42".to_string());
        assert_eq!(customer_id_from_metadata(Some(&metadata)), Some(42));

        metadata.insert("db_customer_id".to_string(), "not-a-number".to_string());
        assert_eq!(customer_id_from_metadata(Some(&metadata)), None);

        assert_eq!(customer_id_from_metadata(Some(&HashMap::new())), None);
        assert_eq!(customer_id_from_metadata(None), None);
    }
}

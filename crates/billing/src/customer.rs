//! Customer records: identity, billing linkage, shipping.

use sqlx::PgPool;

use crate::error::{BillingError, BillingResult};

/// Minimal customer projection used by the billing flows.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CustomerRecord {
    pub id: i64,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub stripe_customer_id: Option<String>,
}

impl CustomerRecord {
    /// "First Last", or None when neither name is present.
    pub fn full_name(&self) -> Option<String> {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .iter()
            .flatten()
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }
}

/// Shipping address as collected at checkout.
#[derive(Debug, Clone)]
pub struct ShippingAddress {
    pub street: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
}

impl ShippingAddress {
    /// Collapse line1/line2 into a single street field.
    pub fn street_from_lines(line1: &str, line2: Option<&str>) -> String {
        match line2 {
            Some(l2) if !l2.is_empty() => format!("{} {}", line1, l2),
            _ => line1.to_string(),
        }
    }
}

/// Lowercase + trim; emails are unique keys and must compare consistently.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Service for customer identity and billing linkage.
pub struct CustomerService {
    pool: PgPool,
}

impl CustomerService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_email(&self, email: &str) -> BillingResult<Option<CustomerRecord>> {
        let record = sqlx::query_as(
            r#"
            SELECT id, email, first_name, last_name, stripe_customer_id
            FROM customers WHERE email = $1
            "#,
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    pub async fn find_by_id(&self, id: i64) -> BillingResult<Option<CustomerRecord>> {
        let record = sqlx::query_as(
            r#"
            SELECT id, email, first_name, last_name, stripe_customer_id
            FROM customers WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Find an existing customer by email or create a bare record.
    pub async fn find_or_create(
        &self,
        email: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> BillingResult<CustomerRecord> {
        if let Some(existing) = self.find_by_email(email).await? {
            return Ok(existing);
        }

        let record = sqlx::query_as(
            r#"
            INSERT INTO customers (email, first_name, last_name)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO UPDATE SET updated_at = NOW()
            RETURNING id, email, first_name, last_name, stripe_customer_id
            "#,
        )
        .bind(normalize_email(email))
        .bind(first_name)
        .bind(last_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    /// Link the Stripe customer id, write-once.
    ///
    /// The `stripe_customer_id IS NULL` predicate is the invariant: once set,
    /// the linkage is never reassigned, so a replayed or racing write is a
    /// no-op rather than an overwrite.
    pub async fn link_stripe_customer(
        &self,
        customer_id: i64,
        stripe_customer_id: &str,
    ) -> BillingResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE customers
            SET stripe_customer_id = $1, updated_at = NOW()
            WHERE id = $2 AND stripe_customer_id IS NULL
            "#,
        )
        .bind(stripe_customer_id)
        .bind(customer_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Overwrite the shipping fields with the address collected at checkout.
    pub async fn update_shipping(
        &self,
        customer_id: i64,
        address: &ShippingAddress,
    ) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE customers
            SET shipping_street = $1, shipping_city = $2, shipping_state = $3,
                shipping_zip = $4, updated_at = NOW()
            WHERE id = $5
            "#,
        )
        .bind(&address.street)
        .bind(&address.city)
        .bind(&address.state)
        .bind(&address.zip)
        .bind(customer_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Resolve a customer id from its Stripe customer id.
    pub async fn find_id_by_stripe_customer(
        &self,
        stripe_customer_id: &str,
    ) -> BillingResult<i64> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM customers WHERE stripe_customer_id = $1")
                .bind(stripe_customer_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(id,)| id)
            .ok_or_else(|| BillingError::CustomerNotFound(stripe_customer_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_normalization() {
        assert_eq!(normalize_email("  Jane@Example.COM "), "jane@example.com");
        assert_eq!(normalize_email("a@b.c"), "a@b.c");
    }

    #[test]
    fn street_line_assembly() {
        assert_eq!(
            ShippingAddress::street_from_lines("12 Main St", Some("Apt 4")),
            "12 Main St Apt 4"
        );
        assert_eq!(
            ShippingAddress::street_from_lines("12 Main St", None),
            "12 Main St"
        );
        assert_eq!(
            ShippingAddress::street_from_lines("12 Main St", Some("")),
            "12 Main St"
        );
    }

    #[test]
    fn full_name_handles_missing_parts() {
        let mut record = CustomerRecord {
            id: 1,
            email: "a@b.c".to_string(),
            first_name: Some("Jane".to_string()),
            last_name: Some("Doe".to_string()),
            stripe_customer_id: None,
        };
        assert_eq!(record.full_name().as_deref(), Some("Jane Doe"));

        record.last_name = None;
        assert_eq!(record.full_name().as_deref(), Some("Jane"));

        record.first_name = None;
        assert_eq!(record.full_name(), None);
    }
}

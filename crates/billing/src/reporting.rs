//! Read-side admin reporting: dashboard aggregates and ledger listings.
//!
//! Pure projection of current ledger state. Visitor-analytics counts fail
//! open to zero so a missing or broken analytics table never takes the
//! dashboard down.

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::error::BillingResult;

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub total_customers: i64,
    pub active_subscriptions: i64,
    pub month_revenue_cents: i64,
    pub total_revenue_cents: i64,
    pub recent_signups: i64,
    pub churn_30d: i64,
    pub mrr_cents: i64,
    pub monthly_visitors: i64,
    pub today_visitors: i64,
}

/// Count of active subscriptions grouped by one dimension.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BreakdownRow {
    pub key: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RevenuePoint {
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub revenue_cents: i64,
    pub orders: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardReport {
    pub stats: DashboardStats,
    pub by_product: Vec<BreakdownRow>,
    pub by_plan: Vec<BreakdownRow>,
    pub revenue_chart: Vec<RevenuePoint>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CustomerListRow {
    pub id: i64,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub shipping_street: Option<String>,
    pub shipping_city: Option<String>,
    pub shipping_state: Option<String>,
    pub shipping_zip: Option<String>,
    pub treatment_product: Option<String>,
    pub intake_status: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub subscriptions: Option<serde_json::Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerListPage {
    pub customers: Vec<CustomerListRow>,
    pub total: i64,
    pub page: i64,
    pub pages: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SubscriptionListRow {
    pub id: i64,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub product_type: String,
    pub plan_type: String,
    pub status: String,
    pub amount_cents: i32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub current_period_end: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub cancel_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderListRow {
    pub id: i64,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub product_type: Option<String>,
    pub amount_cents: i32,
    pub status: String,
    pub pharmacy_status: Option<String>,
    pub tracking_number: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Service for dashboard aggregates and ledger listings.
pub struct ReportingService {
    pool: PgPool,
}

impl ReportingService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn count(&self, sql: &str) -> BillingResult<i64> {
        let (n,): (i64,) = sqlx::query_as(sql).fetch_one(&self.pool).await?;
        Ok(n)
    }

    /// Same as `count`, but failures read as zero. Used for the analytics
    /// tables, which are best-effort by design.
    async fn count_or_zero(&self, sql: &str) -> i64 {
        sqlx::query_as(sql)
            .fetch_one(&self.pool)
            .await
            .map(|(n,): (i64,)| n)
            .unwrap_or(0)
    }

    pub async fn dashboard(&self) -> BillingResult<DashboardReport> {
        let total_customers = self
            .count("SELECT COUNT(*) FROM customers WHERE role = 'customer'")
            .await?;
        let active_subscriptions = self
            .count("SELECT COUNT(*) FROM subscriptions WHERE status = 'active'")
            .await?;
        let month_revenue_cents = self
            .count(
                "SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM orders \
                 WHERE status = 'paid' AND created_at >= date_trunc('month', CURRENT_DATE)",
            )
            .await?;
        let total_revenue_cents = self
            .count(
                "SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM orders WHERE status = 'paid'",
            )
            .await?;
        let recent_signups = self
            .count(
                "SELECT COUNT(*) FROM customers \
                 WHERE role = 'customer' AND created_at >= NOW() - INTERVAL '7 days'",
            )
            .await?;
        let churn_30d = self
            .count(
                "SELECT COUNT(*) FROM subscriptions \
                 WHERE status = 'canceled' AND canceled_at >= NOW() - INTERVAL '30 days'",
            )
            .await?;
        let mrr_cents = self
            .count(
                "SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM subscriptions \
                 WHERE status = 'active'",
            )
            .await?;

        let monthly_visitors = self
            .count_or_zero(
                "SELECT COUNT(DISTINCT visitor_id) FROM page_views \
                 WHERE viewed_at >= date_trunc('month', CURRENT_DATE)",
            )
            .await;
        let today_visitors = self
            .count_or_zero(
                "SELECT COUNT(DISTINCT visitor_id) FROM page_views \
                 WHERE viewed_at >= date_trunc('day', NOW())",
            )
            .await;

        let by_product: Vec<BreakdownRow> = sqlx::query_as(
            "SELECT product_type AS key, COUNT(*) AS count FROM subscriptions \
             WHERE status = 'active' GROUP BY product_type",
        )
        .fetch_all(&self.pool)
        .await?;

        let by_plan: Vec<BreakdownRow> = sqlx::query_as(
            "SELECT plan_type AS key, COUNT(*) AS count FROM subscriptions \
             WHERE status = 'active' GROUP BY plan_type",
        )
        .fetch_all(&self.pool)
        .await?;

        let revenue_chart = self.revenue_chart(90).await?;

        Ok(DashboardReport {
            stats: DashboardStats {
                total_customers,
                active_subscriptions,
                month_revenue_cents,
                total_revenue_cents,
                recent_signups,
                churn_30d,
                mrr_cents,
                monthly_visitors,
                today_visitors,
            },
            by_product,
            by_plan,
            revenue_chart,
        })
    }

    /// Daily paid-order revenue over the trailing window.
    pub async fn revenue_chart(&self, days: i32) -> BillingResult<Vec<RevenuePoint>> {
        let points = sqlx::query_as(
            r#"
            SELECT date_trunc('day', created_at) AS date,
                   COALESCE(SUM(amount_cents), 0)::BIGINT AS revenue_cents,
                   COUNT(*) AS orders
            FROM orders
            WHERE status = 'paid' AND created_at >= NOW() - ($1 || ' days')::INTERVAL
            GROUP BY date_trunc('day', created_at)
            ORDER BY date
            "#,
        )
        .bind(days)
        .fetch_all(&self.pool)
        .await?;
        Ok(points)
    }

    pub async fn list_customers(
        &self,
        page: i64,
        limit: i64,
        search: &str,
    ) -> BillingResult<CustomerListPage> {
        let limit = limit.clamp(1, 200);
        let page = page.max(1);
        let offset = (page - 1) * limit;
        let pattern = format!("%{}%", search);

        let customers: Vec<CustomerListRow> = sqlx::query_as(
            r#"
            SELECT c.id, c.email, c.first_name, c.last_name, c.phone,
                   c.shipping_street, c.shipping_city, c.shipping_state, c.shipping_zip,
                   c.treatment_product, c.intake_status, c.stripe_customer_id,
                   (SELECT json_agg(json_build_object(
                       'id', s.id, 'product_type', s.product_type, 'plan_type', s.plan_type,
                       'status', s.status, 'amount_cents', s.amount_cents,
                       'current_period_end', s.current_period_end
                   )) FROM subscriptions s WHERE s.customer_id = c.id) AS subscriptions,
                   c.created_at
            FROM customers c
            WHERE c.role = 'customer'
              AND ($1 = '' OR c.email ILIKE $2 OR c.first_name ILIKE $2 OR c.last_name ILIKE $2)
            ORDER BY c.created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(search)
        .bind(&pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total = self
            .count("SELECT COUNT(*) FROM customers WHERE role = 'customer'")
            .await?;

        Ok(CustomerListPage {
            customers,
            total,
            page,
            pages: (total + limit - 1) / limit,
        })
    }

    pub async fn list_subscriptions(
        &self,
        status: Option<&str>,
        page: i64,
        limit: i64,
    ) -> BillingResult<Vec<SubscriptionListRow>> {
        let limit = limit.clamp(1, 200);
        let offset = (page.max(1) - 1) * limit;

        let rows = sqlx::query_as(
            r#"
            SELECT s.id, c.email, c.first_name, c.last_name,
                   s.product_type, s.plan_type, s.status, s.amount_cents,
                   s.current_period_end, s.cancel_at, s.created_at
            FROM subscriptions s
            JOIN customers c ON c.id = s.customer_id
            WHERE ($1::TEXT IS NULL OR s.status = $1)
            ORDER BY s.created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list_orders(
        &self,
        status: Option<&str>,
        page: i64,
        limit: i64,
    ) -> BillingResult<Vec<OrderListRow>> {
        let limit = limit.clamp(1, 200);
        let offset = (page.max(1) - 1) * limit;

        let rows = sqlx::query_as(
            r#"
            SELECT o.id, c.email, c.first_name, c.last_name,
                   o.product_type, o.amount_cents, o.status,
                   o.pharmacy_status, o.tracking_number, o.created_at
            FROM orders o
            JOIN customers c ON c.id = o.customer_id
            WHERE ($1::TEXT IS NULL OR o.status = $1)
            ORDER BY o.created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

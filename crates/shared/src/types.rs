//! Domain enums shared across crates.
//!
//! All of these are stored as lowercase text columns; the enums exist so the
//! valid values live in one place instead of being scattered through SQL
//! string literals.

use serde::{Deserialize, Serialize};

/// Treatment product offered for subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Semaglutide,
    Tirzepatide,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Semaglutide => "semaglutide",
            ProductType::Tirzepatide => "tirzepatide",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "semaglutide" => Some(ProductType::Semaglutide),
            "tirzepatide" => Some(ProductType::Tirzepatide),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Billing cadence for a subscription plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanType {
    #[serde(rename = "monthly")]
    Monthly,
    #[serde(rename = "3month")]
    ThreeMonth,
    #[serde(rename = "6month")]
    SixMonth,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Monthly => "monthly",
            PlanType::ThreeMonth => "3month",
            PlanType::SixMonth => "6month",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "monthly" => Some(PlanType::Monthly),
            "3month" => Some(PlanType::ThreeMonth),
            "6month" => Some(PlanType::SixMonth),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Subscription lifecycle status.
///
/// Mirrors the payment processor's view of the subscription; rows only move
/// through these states via webhook events (or the initial `pending` insert).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    PastDue,
    Canceled,
    Paused,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Paused => "paused",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SubscriptionStatus::Pending),
            "active" => Some(SubscriptionStatus::Active),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "canceled" => Some(SubscriptionStatus::Canceled),
            "paused" => Some(SubscriptionStatus::Paused),
            _ => None,
        }
    }

    /// Map a Stripe subscription status string onto our ledger status.
    ///
    /// Stripe has more states than we track; trialing counts as active for
    /// access purposes, and the incomplete states collapse to pending or
    /// canceled depending on whether they can still recover.
    pub fn from_stripe(status: &str) -> Self {
        match status {
            "active" | "trialing" => SubscriptionStatus::Active,
            "past_due" | "unpaid" => SubscriptionStatus::PastDue,
            "canceled" | "incomplete_expired" => SubscriptionStatus::Canceled,
            "paused" => SubscriptionStatus::Paused,
            _ => SubscriptionStatus::Pending,
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order lifecycle status, from payment through fulfillment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Fulfilled,
    Shipped,
    Delivered,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Fulfilled => "fulfilled",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "paid" => Some(OrderStatus::Paid),
            "fulfilled" => Some(OrderStatus::Fulfilled),
            "shipped" => Some(OrderStatus::Shipped),
            "delivered" => Some(OrderStatus::Delivered),
            "refunded" => Some(OrderStatus::Refunded),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_type_round_trip() {
        for p in [ProductType::Semaglutide, ProductType::Tirzepatide] {
            assert_eq!(ProductType::parse(p.as_str()), Some(p));
        }
        assert_eq!(ProductType::parse("ozempic"), None);
    }

    #[test]
    fn plan_type_round_trip() {
        for p in [PlanType::Monthly, PlanType::ThreeMonth, PlanType::SixMonth] {
            assert_eq!(PlanType::parse(p.as_str()), Some(p));
        }
        assert_eq!(PlanType::parse("weekly"), None);
    }

    #[test]
    fn subscription_status_from_stripe() {
        assert_eq!(
            SubscriptionStatus::from_stripe("active"),
            SubscriptionStatus::Active
        );
        assert_eq!(
            SubscriptionStatus::from_stripe("trialing"),
            SubscriptionStatus::Active
        );
        assert_eq!(
            SubscriptionStatus::from_stripe("past_due"),
            SubscriptionStatus::PastDue
        );
        assert_eq!(
            SubscriptionStatus::from_stripe("unpaid"),
            SubscriptionStatus::PastDue
        );
        assert_eq!(
            SubscriptionStatus::from_stripe("canceled"),
            SubscriptionStatus::Canceled
        );
        assert_eq!(
            SubscriptionStatus::from_stripe("incomplete"),
            SubscriptionStatus::Pending
        );
        assert_eq!(
            SubscriptionStatus::from_stripe("paused"),
            SubscriptionStatus::Paused
        );
    }

    #[test]
    fn order_status_parse() {
        assert_eq!(OrderStatus::parse("paid"), Some(OrderStatus::Paid));
        assert_eq!(OrderStatus::parse("shipped"), Some(OrderStatus::Shipped));
        assert_eq!(OrderStatus::parse("lost"), None);
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&PlanType::ThreeMonth).unwrap();
        assert_eq!(json, "\"3month\"");
        let status: SubscriptionStatus = serde_json::from_str("\"past_due\"").unwrap();
        assert_eq!(status, SubscriptionStatus::PastDue);
    }
}

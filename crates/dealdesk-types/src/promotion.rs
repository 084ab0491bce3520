//! Paid listing promotions.
//!
//! A promotion is paid through the same provider flow as an order and is
//! reconciled by the same event handlers; only the effect differs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ListingId, PaymentIntentId, PaymentStatus, PromotionId, UserId};

/// Lifecycle status of a promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionStatus {
    PendingPayment,
    Active,
    Cancelled,
    Refunded,
}

impl std::fmt::Display for PromotionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PendingPayment => write!(f, "pending_payment"),
            Self::Active => write!(f, "active"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Refunded => write!(f, "refunded"),
        }
    }
}

/// A seller's paid promotion of one listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub id: PromotionId,
    pub listing_id: ListingId,
    pub seller_id: UserId,
    pub amount: Decimal,
    pub payment_intent_id: PaymentIntentId,
    pub payment_status: PaymentStatus,
    pub status: PromotionStatus,
    pub active_until: Option<DateTime<Utc>>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Promotion {
    /// A promotion awaiting payment.
    #[must_use]
    pub fn new(
        listing_id: ListingId,
        seller_id: UserId,
        amount: Decimal,
        payment_intent_id: PaymentIntentId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PromotionId::new(),
            listing_id,
            seller_id,
            amount,
            payment_intent_id,
            payment_status: PaymentStatus::Pending,
            status: PromotionStatus::PendingPayment,
            active_until: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Active and not yet lapsed at `now`.
    #[must_use]
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.status == PromotionStatus::Active && self.active_until.is_some_and(|t| t > now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_promotion_awaits_payment() {
        let now = Utc::now();
        let p = Promotion::new(
            ListingId::new(),
            UserId::new(),
            Decimal::new(1999, 2),
            PaymentIntentId::new("pi_promo"),
            now,
        );
        assert_eq!(p.status, PromotionStatus::PendingPayment);
        assert_eq!(p.payment_status, PaymentStatus::Pending);
        assert!(!p.is_live_at(now));
    }

    #[test]
    fn live_window() {
        let now = Utc::now();
        let mut p = Promotion::new(
            ListingId::new(),
            UserId::new(),
            Decimal::ONE,
            PaymentIntentId::new("pi_promo"),
            now,
        );
        p.status = PromotionStatus::Active;
        p.active_until = Some(now + chrono::Duration::days(1));
        assert!(p.is_live_at(now));
        assert!(!p.is_live_at(now + chrono::Duration::days(2)));
    }
}

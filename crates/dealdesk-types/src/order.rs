//! Order / escrow record types.
//!
//! An [`Order`] is created when an offer is accepted or a listing is bought
//! outright. Its state is the triple [`SettlementState`]:
//!
//! - **payment**: owned by the settlement reconciler
//! - **order** (fulfillment track): advanced by fulfillment actions, except
//!   that payment success confirms and payment failure cancels
//! - **escrow**: owned by the settlement reconciler
//!
//! ## Escrow
//!
//! ```text
//!   NONE ──paid──▶ HELD ──pickup──▶ RELEASED
//!    │              │ ▲                │
//!    │   dispute    ▼ │ reinstated     │ dispute
//!    └──────────▶ DISPUTED ◀───────────┘
//!
//!   NONE | HELD ──full refund──▶ REFUNDED   (never enters DISPUTED)
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ListingId, OfferId, OrderId, PaymentIntentId, TransferId, UserId};

/// Payment status of an order or promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
    PartiallyRefunded,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Refunded => write!(f, "refunded"),
            Self::PartiallyRefunded => write!(f, "partially_refunded"),
        }
    }
}

/// Fulfillment track of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl FulfillmentStatus {
    /// Before payment confirmation.
    #[must_use]
    pub fn is_pre_confirmation(self) -> bool {
        self == Self::Pending
    }

    /// The carrier has picked up the shipment (shipped or later).
    #[must_use]
    pub fn pickup_confirmed(self) -> bool {
        matches!(self, Self::Shipped | Self::Delivered)
    }
}

impl std::fmt::Display for FulfillmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Processing => write!(f, "processing"),
            Self::Shipped => write!(f, "shipped"),
            Self::Delivered => write!(f, "delivered"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Escrow status of an order's funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    None,
    Held,
    Released,
    Refunded,
    Disputed,
}

impl std::fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Held => write!(f, "held"),
            Self::Released => write!(f, "released"),
            Self::Refunded => write!(f, "refunded"),
            Self::Disputed => write!(f, "disputed"),
        }
    }
}

/// The (payment, order, escrow) status triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SettlementState {
    pub payment: PaymentStatus,
    pub order: FulfillmentStatus,
    pub escrow: EscrowStatus,
}

impl SettlementState {
    /// The state every new order starts in.
    pub const OPENED: Self = Self {
        payment: PaymentStatus::Pending,
        order: FulfillmentStatus::Pending,
        escrow: EscrowStatus::None,
    };
}

impl std::fmt::Display for SettlementState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "payment={} order={} escrow={}",
            self.payment, self.order, self.escrow
        )
    }
}

/// A priced transaction between one buyer and one seller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub listing_id: ListingId,
    /// The offer this order was struck from; `None` for a direct purchase.
    pub offer_id: Option<OfferId>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub buyer_fee: Decimal,
    pub seller_fee: Decimal,
    pub seller_payout: Decimal,
    pub shipping_price: Option<Decimal>,
    pub buyer_total: Decimal,
    pub payment_intent_id: Option<PaymentIntentId>,
    pub transfer_id: Option<TransferId>,
    pub payment_status: PaymentStatus,
    pub order_status: FulfillmentStatus,
    pub escrow_status: EscrowStatus,
    pub escrow_held_at: Option<DateTime<Utc>>,
    pub pickup_confirmed_at: Option<DateTime<Utc>>,
    /// Compare-and-swap counter; bumped on every committed write.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[must_use]
    pub fn settlement_state(&self) -> SettlementState {
        SettlementState {
            payment: self.payment_status,
            order: self.order_status,
            escrow: self.escrow_status,
        }
    }

    /// Overwrite the status triple. Timestamps and version are the
    /// caller's responsibility.
    pub fn set_settlement_state(&mut self, state: SettlementState) {
        self.payment_status = state.payment;
        self.order_status = state.order;
        self.escrow_status = state.escrow;
    }

    #[must_use]
    pub fn is_party(&self, user: UserId) -> bool {
        user == self.buyer_id || user == self.seller_id
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Order {
    /// A freshly opened order with no fees.
    pub fn dummy(unit_price: Decimal, quantity: Decimal) -> Self {
        let now = Utc::now();
        let subtotal = crate::money::total_price(unit_price, quantity).unwrap_or(Decimal::ZERO);
        Self {
            id: OrderId::new(),
            buyer_id: UserId::new(),
            seller_id: UserId::new(),
            listing_id: ListingId::new(),
            offer_id: None,
            quantity,
            unit_price,
            subtotal,
            buyer_fee: Decimal::ZERO,
            seller_fee: Decimal::ZERO,
            seller_payout: subtotal,
            shipping_price: None,
            buyer_total: subtotal,
            payment_intent_id: None,
            transfer_id: None,
            payment_status: PaymentStatus::Pending,
            order_status: FulfillmentStatus::Pending,
            escrow_status: EscrowStatus::None,
            escrow_held_at: None,
            pickup_confirmed_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opened_state() {
        let order = Order::dummy(Decimal::ONE, Decimal::ONE);
        assert_eq!(order.settlement_state(), SettlementState::OPENED);
    }

    #[test]
    fn pickup_checkpoint() {
        assert!(!FulfillmentStatus::Confirmed.pickup_confirmed());
        assert!(!FulfillmentStatus::Processing.pickup_confirmed());
        assert!(FulfillmentStatus::Shipped.pickup_confirmed());
        assert!(FulfillmentStatus::Delivered.pickup_confirmed());
    }

    #[test]
    fn set_state_roundtrips() {
        let mut order = Order::dummy(Decimal::ONE, Decimal::ONE);
        let state = SettlementState {
            payment: PaymentStatus::Succeeded,
            order: FulfillmentStatus::Confirmed,
            escrow: EscrowStatus::Held,
        };
        order.set_settlement_state(state);
        assert_eq!(order.settlement_state(), state);
    }

    #[test]
    fn settlement_state_display() {
        assert_eq!(
            SettlementState::OPENED.to_string(),
            "payment=pending order=pending escrow=none"
        );
    }

    #[test]
    fn party_check() {
        let order = Order::dummy(Decimal::ONE, Decimal::ONE);
        assert!(order.is_party(order.buyer_id));
        assert!(order.is_party(order.seller_id));
        assert!(!order.is_party(UserId::new()));
    }
}

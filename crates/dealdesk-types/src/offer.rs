//! Offer types: the append-only negotiation record between one buyer and
//! one seller on one listing.
//!
//! ## Status Machine
//!
//! ```text
//!            counter            counter
//!   ┌─────────┐ ───────▶ ┌────────────┐ ◀──┐
//!   │ PENDING │          │ COUNTERED  │ ───┘
//!   └────┬────┘          └─────┬──────┘
//!        │ accept / reject / withdraw / expire
//!        ▼                     ▼
//!   ACCEPTED · REJECTED · WITHDRAWN · EXPIRED   (terminal)
//! ```
//!
//! Whose turn it is is never stored: it is derived from `last_actor_id`.
//! The party that acted last may not act again until the counterparty has.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ListingId, OfferId, UserId, money};

/// Negotiation status of an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Pending,
    Countered,
    Accepted,
    Rejected,
    Withdrawn,
    Expired,
}

impl OfferStatus {
    /// Terminal statuses admit no further negotiation action.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Accepted | Self::Rejected | Self::Withdrawn | Self::Expired
        )
    }

    /// Statuses in which either party may still act.
    #[must_use]
    pub fn is_open(self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Countered => write!(f, "countered"),
            Self::Accepted => write!(f, "accepted"),
            Self::Rejected => write!(f, "rejected"),
            Self::Withdrawn => write!(f, "withdrawn"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Which side of the offer an identity is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Buyer,
    Seller,
}

/// Optimistic-concurrency token for an offer.
///
/// Every legal mutation changes the round (counter) or the status
/// (accept/reject/withdraw/expire), so two writers that loaded the same
/// revision cannot both commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OfferRevision {
    pub round: u32,
    pub status: OfferStatus,
}

/// A proposed price/quantity term between one buyer and one seller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub listing_id: ListingId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    /// The buyer's opening price-per-unit.
    pub price_per_unit: Decimal,
    /// The most recent counter price-per-unit, if any counter happened.
    pub counter_price_per_unit: Option<Decimal>,
    pub quantity: Decimal,
    pub message: Option<String>,
    pub status: OfferStatus,
    /// Starts at 1, +1 per counter.
    pub round: u32,
    /// The party who performed the most recent action.
    pub last_actor_id: UserId,
    pub expires_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Offer {
    /// The price currently on the table: the counter price if one was made,
    /// else the opening price.
    #[must_use]
    pub fn effective_price(&self) -> Decimal {
        self.counter_price_per_unit.unwrap_or(self.price_per_unit)
    }

    /// `round(effective_price × quantity, 2)`, half-up. Never stored.
    #[must_use]
    pub fn total_price(&self) -> Decimal {
        money::total_price(self.effective_price(), self.quantity).unwrap_or(Decimal::MAX)
    }

    #[must_use]
    pub fn revision(&self) -> OfferRevision {
        OfferRevision {
            round: self.round,
            status: self.status,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns `true` if the offer has an expiry and it is at or before `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Which side `actor` is on, if any.
    #[must_use]
    pub fn party_of(&self, actor: UserId) -> Option<Party> {
        if actor == self.buyer_id {
            Some(Party::Buyer)
        } else if actor == self.seller_id {
            Some(Party::Seller)
        } else {
            None
        }
    }

    #[must_use]
    pub fn is_party(&self, actor: UserId) -> bool {
        self.party_of(actor).is_some()
    }

    /// The other party. Caller must pass a party id.
    #[must_use]
    pub fn counterparty_of(&self, actor: UserId) -> UserId {
        if actor == self.buyer_id {
            self.seller_id
        } else {
            self.buyer_id
        }
    }

    /// Whose turn it is, derived from the last actor.
    #[must_use]
    pub fn party_to_act(&self) -> Option<UserId> {
        self.status
            .is_open()
            .then(|| self.counterparty_of(self.last_actor_id))
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Offer {
    /// A pending round-1 offer with no expiry.
    pub fn dummy(buyer_id: UserId, seller_id: UserId, price: Decimal, qty: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: OfferId::new(),
            listing_id: ListingId::new(),
            buyer_id,
            seller_id,
            price_per_unit: price,
            counter_price_per_unit: None,
            quantity: qty,
            message: None,
            status: OfferStatus::Pending,
            round: 1,
            last_actor_id: buyer_id,
            expires_at: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}

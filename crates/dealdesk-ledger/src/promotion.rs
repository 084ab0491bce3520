//! Promotion ledger: the payment lifecycle of paid listing promotions.
//!
//! ```text
//!   PENDING_PAYMENT ──paid──▶ ACTIVE ──full refund──▶ REFUNDED
//!         │                     ▲
//!         └──failed──▶ CANCELLED ┘ (a retried payment may still succeed)
//! ```

use chrono::{DateTime, Duration, Utc};
use dealdesk_types::constants::MAX_CAS_ATTEMPTS;
use dealdesk_types::{
    DealdeskError, ListingId, PaymentIntentId, PaymentStatus, Promotion, PromotionStatus, Result,
    UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::store::PromotionStore;
use crate::transition::{LedgerEvent, NoOpReason, TransitionOutcome};

/// The (payment, lifecycle) pair of a promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PromotionState {
    pub payment: PaymentStatus,
    pub status: PromotionStatus,
}

impl std::fmt::Display for PromotionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "payment={} status={}", self.payment, self.status)
    }
}

/// Apply a settlement event to a promotion.
///
/// Escrow events have no meaning for promotions; a lost dispute refunds.
#[must_use]
pub fn apply_promotion(
    state: PromotionState,
    event: LedgerEvent,
) -> TransitionOutcome<PromotionState> {
    let next = match event {
        LedgerEvent::PaymentSucceeded => match state.payment {
            PaymentStatus::Refunded => return TransitionOutcome::NoOp(NoOpReason::Superseded),
            PaymentStatus::Succeeded => return TransitionOutcome::NoOp(NoOpReason::AlreadyApplied),
            // The partial refund arrived first; the charge still activates.
            PaymentStatus::PartiallyRefunded => PromotionState {
                payment: PaymentStatus::PartiallyRefunded,
                status: PromotionStatus::Active,
            },
            PaymentStatus::Pending | PaymentStatus::Failed => PromotionState {
                payment: PaymentStatus::Succeeded,
                status: PromotionStatus::Active,
            },
        },
        LedgerEvent::PaymentFailed => match state.payment {
            PaymentStatus::Pending => PromotionState {
                payment: PaymentStatus::Failed,
                status: PromotionStatus::Cancelled,
            },
            PaymentStatus::Failed => return TransitionOutcome::NoOp(NoOpReason::AlreadyApplied),
            PaymentStatus::Succeeded | PaymentStatus::Refunded | PaymentStatus::PartiallyRefunded => {
                return TransitionOutcome::NoOp(NoOpReason::Superseded);
            }
        },
        LedgerEvent::Refunded { full: true } | LedgerEvent::DisputeLost => PromotionState {
            payment: PaymentStatus::Refunded,
            status: PromotionStatus::Refunded,
        },
        LedgerEvent::Refunded { full: false } => match state.payment {
            PaymentStatus::Refunded => return TransitionOutcome::NoOp(NoOpReason::Superseded),
            _ => PromotionState {
                payment: PaymentStatus::PartiallyRefunded,
                status: state.status,
            },
        },
        LedgerEvent::EscrowDisputed | LedgerEvent::EscrowReinstated | LedgerEvent::ReleaseEscrow => {
            return TransitionOutcome::NoOp(NoOpReason::NotApplicable);
        }
    };
    if next == state {
        TransitionOutcome::NoOp(NoOpReason::AlreadyApplied)
    } else {
        TransitionOutcome::Applied(next)
    }
}

/// The committed (or unchanged) promotion after a settlement write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionUpdate {
    pub promotion: Promotion,
    pub outcome: TransitionOutcome<PromotionState>,
}

/// Promotion ledger over a [`PromotionStore`].
pub struct PromotionLedger<S> {
    store: S,
    duration: Duration,
}

impl<S: PromotionStore> PromotionLedger<S> {
    /// `duration` is how long a promotion stays active once paid.
    pub fn new(store: S, duration: Duration) -> Self {
        Self { store, duration }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create a promotion awaiting payment on `payment_intent`.
    ///
    /// # Errors
    /// `InvalidTerms` for a non-positive amount, `Persistence` if the
    /// payment intent is already bound.
    pub fn open(
        &self,
        listing_id: ListingId,
        seller_id: UserId,
        amount: Decimal,
        payment_intent: PaymentIntentId,
        now: DateTime<Utc>,
    ) -> Result<Promotion> {
        if amount <= Decimal::ZERO {
            return Err(DealdeskError::InvalidTerms {
                reason: "promotion amount must be positive".into(),
            });
        }
        let promotion = self.store.insert(Promotion::new(
            listing_id,
            seller_id,
            dealdesk_types::money::round_money(amount),
            payment_intent,
            now,
        ))?;
        tracing::info!(
            promotion_id = %promotion.id,
            listing_id = %listing_id,
            amount = %promotion.amount,
            "Promotion opened"
        );
        Ok(promotion)
    }

    /// # Errors
    /// `Persistence`.
    pub fn find_by_payment_intent(
        &self,
        payment_intent: &PaymentIntentId,
    ) -> Result<Option<Promotion>> {
        self.store.find_by_payment_intent(payment_intent)
    }

    /// Apply a settlement event to the promotion, retrying lost CAS races.
    ///
    /// # Errors
    /// `Internal` if the promotion is missing, `Persistence`, or
    /// `ConcurrentModification` once retries are exhausted.
    pub fn apply_event(
        &self,
        promotion: &Promotion,
        event: LedgerEvent,
        now: DateTime<Utc>,
    ) -> Result<PromotionUpdate> {
        let id = promotion.id;
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self
                .store
                .get(id)?
                .ok_or_else(|| DealdeskError::Internal(format!("promotion {id} vanished")))?;
            let before = PromotionState {
                payment: current.payment_status,
                status: current.status,
            };
            let after = match apply_promotion(before, event) {
                TransitionOutcome::Applied(after) => after,
                TransitionOutcome::NoOp(reason) => {
                    return Ok(PromotionUpdate {
                        promotion: current,
                        outcome: TransitionOutcome::NoOp(reason),
                    });
                }
            };
            let mut next = current.clone();
            next.payment_status = after.payment;
            next.status = after.status;
            next.active_until = match after.status {
                PromotionStatus::Active if before.status != PromotionStatus::Active => {
                    Some(now.checked_add_signed(self.duration).ok_or_else(|| {
                        DealdeskError::Internal(format!("promotion {id} ends out of range"))
                    })?)
                }
                PromotionStatus::Active => current.active_until,
                _ => None,
            };
            next.updated_at = now;
            match self.store.compare_and_swap(current.version, next) {
                Ok(promotion) => {
                    tracing::info!(
                        promotion_id = %id,
                        event = ?event,
                        from = %before,
                        to = %after,
                        "Promotion transition applied"
                    );
                    return Ok(PromotionUpdate {
                        promotion,
                        outcome: TransitionOutcome::Applied(after),
                    });
                }
                Err(DealdeskError::ConcurrentModification) => {}
                Err(e) => return Err(e),
            }
        }
        Err(DealdeskError::ConcurrentModification)
    }
}

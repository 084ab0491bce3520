//! The order ledger: opens orders and commits settlement transitions.
//!
//! Every write is read → pure transition → compare-and-swap. Settlement
//! writes retry a bounded number of times on a lost race, since the
//! transition is recomputed from fresh state and stays correct. Fulfillment
//! writes carry the caller's `expected_version` and never retry.

use chrono::{DateTime, Utc};
use dealdesk_types::constants::MAX_CAS_ATTEMPTS;
use dealdesk_types::{
    DealdeskError, EscrowStatus, FeeSchedule, FulfillmentStatus, ListingId, ListingTerms, Offer,
    OfferId, OfferStatus, Order, OrderId, PaymentIntentId, PaymentStatus, Result,
    SettlementState, TransferId, UserId,
};
use rust_decimal::Decimal;

use crate::fulfillment::FulfillmentAction;
use crate::store::OrderStore;
use crate::transition::{self, LedgerEvent, NoOpReason, TransitionOutcome};

/// The committed (or unchanged) order after a settlement write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerUpdate {
    pub order: Order,
    pub outcome: TransitionOutcome,
}

impl LedgerUpdate {
    #[must_use]
    pub fn is_applied(&self) -> bool {
        self.outcome.is_applied()
    }
}

struct Parties {
    buyer_id: UserId,
    seller_id: UserId,
    listing_id: ListingId,
    offer_id: Option<OfferId>,
}

/// Order ledger over an [`OrderStore`].
pub struct OrderLedger<S> {
    store: S,
    fees: FeeSchedule,
}

impl<S: OrderStore> OrderLedger<S> {
    pub fn new(store: S, fees: FeeSchedule) -> Self {
        Self { store, fees }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn fees(&self) -> FeeSchedule {
        self.fees
    }

    // =================================================================
    // Opening orders
    // =================================================================

    /// Open the order for an accepted offer at its effective price.
    ///
    /// Idempotent per offer: a second call returns the existing order.
    ///
    /// # Errors
    /// `IllegalTransition` if the offer is not accepted, `InvalidTerms` if
    /// the total overflows, `Persistence` on store failure.
    pub fn open_from_offer(
        &self,
        offer: &Offer,
        shipping_price: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        if offer.status != OfferStatus::Accepted {
            return Err(DealdeskError::IllegalTransition {
                reason: format!("offer {} is {}, not accepted", offer.id, offer.status),
            });
        }
        if let Some(existing) = self.store.find_by_offer(offer.id)? {
            return Ok(existing);
        }
        let parties = Parties {
            buyer_id: offer.buyer_id,
            seller_id: offer.seller_id,
            listing_id: offer.listing_id,
            offer_id: Some(offer.id),
        };
        let order = self.price_order(
            parties,
            offer.effective_price(),
            offer.quantity,
            shipping_price,
            now,
        )?;
        let order = match self.store.insert(order) {
            Ok(order) => order,
            Err(DealdeskError::ConcurrentModification) => {
                // Another caller opened it between our lookup and insert.
                return self
                    .store
                    .find_by_offer(offer.id)?
                    .ok_or(DealdeskError::ConcurrentModification);
            }
            Err(e) => return Err(e),
        };
        tracing::info!(
            order_id = %order.id,
            offer_id = %offer.id,
            unit_price = %order.unit_price,
            quantity = %order.quantity,
            buyer_total = %order.buyer_total,
            "Order opened from accepted offer"
        );
        Ok(order)
    }

    /// Open an order for buying a listing outright at its ask price.
    ///
    /// # Errors
    /// `InvalidTerms` for a self-purchase or a quantity outside the
    /// listing's bounds, `Persistence` on store failure.
    pub fn open_direct_purchase(
        &self,
        listing: &ListingTerms,
        buyer_id: UserId,
        quantity: Decimal,
        shipping_price: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        if buyer_id == listing.seller_id {
            return Err(invalid("you cannot buy your own listing"));
        }
        if quantity <= Decimal::ZERO {
            return Err(invalid("quantity must be positive"));
        }
        if quantity < listing.min_order_quantity {
            return Err(invalid(format!(
                "quantity is below the minimum order of {}",
                listing.min_order_quantity
            )));
        }
        if quantity > listing.available_quantity {
            return Err(invalid(format!(
                "only {} available",
                listing.available_quantity
            )));
        }
        if shipping_price.is_some_and(|s| s < Decimal::ZERO) {
            return Err(invalid("shipping price cannot be negative"));
        }
        let parties = Parties {
            buyer_id,
            seller_id: listing.seller_id,
            listing_id: listing.id,
            offer_id: None,
        };
        let order = self.price_order(
            parties,
            listing.ask_price_per_unit,
            quantity,
            shipping_price,
            now,
        )?;
        let order = self.store.insert(order)?;
        tracing::info!(
            order_id = %order.id,
            listing_id = %listing.id,
            buyer_total = %order.buyer_total,
            "Order opened from direct purchase"
        );
        Ok(order)
    }

    fn price_order(
        &self,
        parties: Parties,
        unit_price: Decimal,
        quantity: Decimal,
        shipping_price: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        let b = self
            .fees
            .breakdown(unit_price, quantity, shipping_price)
            .ok_or_else(|| invalid("order total is out of range"))?;
        Ok(Order {
            id: OrderId::new(),
            buyer_id: parties.buyer_id,
            seller_id: parties.seller_id,
            listing_id: parties.listing_id,
            offer_id: parties.offer_id,
            quantity,
            unit_price,
            subtotal: b.subtotal,
            buyer_fee: b.buyer_fee,
            seller_fee: b.seller_fee,
            seller_payout: b.seller_payout,
            shipping_price: b.shipping_price,
            buyer_total: b.buyer_total,
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
        })
    }

    /// Link the provider's payment intent to an order.
    ///
    /// Re-attaching the same intent is a no-op. A different intent may
    /// replace the current one only after that payment failed.
    ///
    /// # Errors
    /// `OrderNotFound`, `IllegalTransition` if another live intent is
    /// attached, `ConcurrentModification` if retries are exhausted.
    pub fn attach_payment_intent(
        &self,
        order_id: OrderId,
        payment_intent: PaymentIntentId,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.get(order_id)?;
            match &current.payment_intent_id {
                Some(existing) if *existing == payment_intent => return Ok(current),
                Some(existing) if current.payment_status != PaymentStatus::Failed => {
                    return Err(DealdeskError::IllegalTransition {
                        reason: format!("order already has payment intent {existing}"),
                    });
                }
                _ => {}
            }
            let mut next = current.clone();
            next.payment_intent_id = Some(payment_intent.clone());
            next.updated_at = now;
            match self.store.compare_and_swap(current.version, next) {
                Ok(order) => {
                    tracing::info!(
                        order_id = %order.id,
                        payment_intent = %payment_intent,
                        "Payment intent attached"
                    );
                    return Ok(order);
                }
                Err(DealdeskError::ConcurrentModification) => {}
                Err(e) => return Err(e),
            }
        }
        Err(DealdeskError::ConcurrentModification)
    }

    // =================================================================
    // Reads
    // =================================================================

    /// # Errors
    /// `OrderNotFound`, `Persistence`.
    pub fn get(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .get(order_id)?
            .ok_or(DealdeskError::OrderNotFound(order_id))
    }

    /// Fetch an order on behalf of `viewer`, who must be its buyer or seller.
    ///
    /// # Errors
    /// `OrderNotFound`, `NotAParty`, `Persistence`.
    pub fn get_for_party(&self, order_id: OrderId, viewer: UserId) -> Result<Order> {
        let order = self.get(order_id)?;
        if !order.is_party(viewer) {
            return Err(DealdeskError::NotAParty);
        }
        Ok(order)
    }

    /// # Errors
    /// `Persistence`.
    pub fn find_by_payment_intent(&self, payment_intent: &PaymentIntentId) -> Result<Option<Order>> {
        self.store.find_by_payment_intent(payment_intent)
    }

    /// Orders whose escrow has been held since before `cutoff`.
    ///
    /// # Errors
    /// `Persistence`.
    pub fn stale_holds(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>> {
        self.store.held_since_before(cutoff)
    }

    // =================================================================
    // Settlement transitions
    // =================================================================

    /// Apply a settlement event to an order, retrying lost CAS races.
    ///
    /// A no-op is success: the order is returned unchanged.
    ///
    /// # Errors
    /// `OrderNotFound`, `Persistence`, or `ConcurrentModification` once
    /// retries are exhausted.
    pub fn apply_event(
        &self,
        order_id: OrderId,
        event: LedgerEvent,
        now: DateTime<Utc>,
    ) -> Result<LedgerUpdate> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.get(order_id)?;
            let before = current.settlement_state();
            let after = match transition::apply(before, event) {
                TransitionOutcome::Applied(after) => after,
                TransitionOutcome::NoOp(reason) => {
                    tracing::debug!(
                        order_id = %order_id,
                        event = ?event,
                        state = %before,
                        reason = ?reason,
                        "Settlement event changed nothing"
                    );
                    return Ok(LedgerUpdate {
                        order: current,
                        outcome: TransitionOutcome::NoOp(reason),
                    });
                }
            };
            let next = stamp(current.clone(), before, after, now);
            match self.store.compare_and_swap(current.version, next) {
                Ok(order) => {
                    tracing::info!(
                        order_id = %order_id,
                        event = ?event,
                        from = %before,
                        to = %after,
                        "Settlement transition applied"
                    );
                    return Ok(LedgerUpdate {
                        order,
                        outcome: TransitionOutcome::Applied(after),
                    });
                }
                Err(DealdeskError::ConcurrentModification) => {
                    tracing::debug!(order_id = %order_id, "Lost CAS race, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Err(DealdeskError::ConcurrentModification)
    }

    /// # Errors
    /// See [`Self::apply_event`].
    pub fn mark_payment_succeeded(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<LedgerUpdate> {
        self.apply_event(order_id, LedgerEvent::PaymentSucceeded, now)
    }

    /// Failed and canceled payments share this transition.
    ///
    /// # Errors
    /// See [`Self::apply_event`].
    pub fn mark_payment_failed(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<LedgerUpdate> {
        self.apply_event(order_id, LedgerEvent::PaymentFailed, now)
    }

    /// # Errors
    /// See [`Self::apply_event`].
    pub fn mark_refunded(
        &self,
        order_id: OrderId,
        full: bool,
        now: DateTime<Utc>,
    ) -> Result<LedgerUpdate> {
        self.apply_event(order_id, LedgerEvent::Refunded { full }, now)
    }

    /// # Errors
    /// See [`Self::apply_event`].
    pub fn mark_escrow_disputed(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<LedgerUpdate> {
        self.apply_event(order_id, LedgerEvent::EscrowDisputed, now)
    }

    /// # Errors
    /// See [`Self::apply_event`].
    pub fn mark_escrow_held(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<LedgerUpdate> {
        self.apply_event(order_id, LedgerEvent::EscrowReinstated, now)
    }

    /// # Errors
    /// See [`Self::apply_event`].
    pub fn mark_dispute_lost(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<LedgerUpdate> {
        self.apply_event(order_id, LedgerEvent::DisputeLost, now)
    }

    /// Release held escrow to the seller after carrier pickup.
    ///
    /// Releasing an already released order is a no-op.
    ///
    /// # Errors
    /// `IllegalTransition` unless escrow is held, payment succeeded and the
    /// order has shipped; otherwise see [`Self::apply_event`].
    pub fn release_escrow(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<LedgerUpdate> {
        let update = self.apply_event(order_id, LedgerEvent::ReleaseEscrow, now)?;
        if update.outcome == TransitionOutcome::NoOp(NoOpReason::NotApplicable) {
            return Err(DealdeskError::IllegalTransition {
                reason: format!(
                    "escrow can only be released once held, paid and shipped ({})",
                    update.order.settlement_state()
                ),
            });
        }
        Ok(update)
    }

    /// Record the provider's seller transfer for an order.
    ///
    /// The first transfer id wins; repeats are no-ops.
    ///
    /// # Errors
    /// `OrderNotFound`, `Persistence`, `ConcurrentModification`.
    pub fn record_transfer(
        &self,
        order_id: OrderId,
        transfer: TransferId,
        now: DateTime<Utc>,
    ) -> Result<LedgerUpdate> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.get(order_id)?;
            if let Some(existing) = &current.transfer_id {
                let reason = if *existing == transfer {
                    NoOpReason::AlreadyApplied
                } else {
                    tracing::warn!(
                        order_id = %order_id,
                        recorded = %existing,
                        incoming = %transfer,
                        "Second transfer for order ignored"
                    );
                    NoOpReason::Superseded
                };
                return Ok(LedgerUpdate {
                    order: current,
                    outcome: TransitionOutcome::NoOp(reason),
                });
            }
            let state = current.settlement_state();
            let mut next = current.clone();
            next.transfer_id = Some(transfer.clone());
            next.updated_at = now;
            match self.store.compare_and_swap(current.version, next) {
                Ok(order) => {
                    tracing::info!(order_id = %order_id, transfer = %transfer, "Transfer recorded");
                    return Ok(LedgerUpdate {
                        order,
                        outcome: TransitionOutcome::Applied(state),
                    });
                }
                Err(DealdeskError::ConcurrentModification) => {}
                Err(e) => return Err(e),
            }
        }
        Err(DealdeskError::ConcurrentModification)
    }

    // =================================================================
    // Fulfillment
    // =================================================================

    /// Advance the fulfillment track. The caller supplies the version it
    /// read; a stale version is rejected rather than retried.
    ///
    /// # Errors
    /// `OrderNotFound`, `ConcurrentModification` on a stale version,
    /// `IllegalTransition` for an action not allowed in the current state.
    pub fn advance_fulfillment(
        &self,
        order_id: OrderId,
        action: FulfillmentAction,
        expected_version: u64,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        let current = self.get(order_id)?;
        if current.version != expected_version {
            return Err(DealdeskError::ConcurrentModification);
        }
        let next_status = action.next_status(current.settlement_state())?;
        let mut next = current.clone();
        next.order_status = next_status;
        if action == FulfillmentAction::Ship {
            next.pickup_confirmed_at = Some(now);
        }
        next.updated_at = now;
        let order = self.store.compare_and_swap(expected_version, next)?;
        tracing::info!(
            order_id = %order_id,
            action = %action,
            from = %current.order_status,
            to = %order.order_status,
            "Fulfillment advanced"
        );
        Ok(order)
    }
}

/// Copy the new status triple onto `order` and maintain its timestamps.
fn stamp(
    mut order: Order,
    before: SettlementState,
    after: SettlementState,
    now: DateTime<Utc>,
) -> Order {
    order.set_settlement_state(after);
    if after.escrow == EscrowStatus::Held && before.escrow != EscrowStatus::Held {
        order.escrow_held_at = Some(now);
    }
    order.updated_at = now;
    order
}

fn invalid(reason: impl Into<String>) -> DealdeskError {
    DealdeskError::InvalidTerms {
        reason: reason.into(),
    }
}

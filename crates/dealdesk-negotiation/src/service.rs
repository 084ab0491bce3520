//! Negotiation service: loads an offer, applies the pure transition, and
//! commits it with compare-and-swap.
//!
//! On a lost race the service reloads and re-applies against the fresh
//! offer, up to [`MAX_CAS_ATTEMPTS`] times. The retry usually ends in a
//! gate error (the winner took the turn or closed the offer), which is
//! what the losing caller should see.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dealdesk_ledger::{OrderLedger, OrderStore};
use dealdesk_types::constants::MAX_CAS_ATTEMPTS;
use dealdesk_types::{
    Clock, DealdeskError, ListingId, Notification, NotificationKind, NotificationSink, Offer,
    OfferId, OfferStatus, Order, Result, UserId,
};
use rust_decimal::Decimal;

use crate::catalog::ListingCatalog;
use crate::machine::OfferMachine;
use crate::store::OfferStore;

/// An accepted offer and the order it opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acceptance {
    pub offer: Offer,
    pub order: Order,
}

pub struct NegotiationService<O, C, S> {
    machine: OfferMachine,
    offers: O,
    catalog: C,
    ledger: Arc<OrderLedger<S>>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
}

impl<O: OfferStore, C: ListingCatalog, S: OrderStore> NegotiationService<O, C, S> {
    pub fn new(
        machine: OfferMachine,
        offers: O,
        catalog: C,
        ledger: Arc<OrderLedger<S>>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            machine,
            offers,
            catalog,
            ledger,
            sink,
            clock,
        }
    }

    pub fn offers(&self) -> &O {
        &self.offers
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn ledger(&self) -> &Arc<OrderLedger<S>> {
        &self.ledger
    }

    // =================================================================
    // Actions
    // =================================================================

    /// # Errors
    /// `ListingNotFound`, `InvalidTerms`, `Persistence`.
    pub fn submit_offer(
        &self,
        listing_id: ListingId,
        buyer_id: UserId,
        price_per_unit: Decimal,
        quantity: Decimal,
        message: Option<String>,
    ) -> Result<Offer> {
        let listing = self.catalog.listing(listing_id)?;
        let offer = self.machine.submit_offer(
            &listing,
            buyer_id,
            price_per_unit,
            quantity,
            message,
            self.clock.now(),
        )?;
        let offer = self.offers.insert(offer)?;
        tracing::info!(
            offer_id = %offer.id,
            listing_id = %listing_id,
            buyer = %buyer_id,
            price = %price_per_unit,
            qty = %quantity,
            "Offer submitted"
        );
        self.notify_counterparty(&offer, buyer_id, NotificationKind::OfferReceived);
        Ok(offer)
    }

    /// # Errors
    /// `OfferNotFound`, gate errors, `InvalidTerms`, `ConcurrentModification`.
    pub fn counter(
        &self,
        offer_id: OfferId,
        actor: UserId,
        new_price_per_unit: Decimal,
    ) -> Result<Offer> {
        let offer = self.commit(offer_id, |offer, now| {
            self.machine.counter(offer, actor, new_price_per_unit, now)
        })?;
        tracing::info!(
            offer_id = %offer_id,
            actor = %actor,
            round = offer.round,
            price = %new_price_per_unit,
            "Offer countered"
        );
        self.notify_counterparty(&offer, actor, NotificationKind::OfferCountered);
        Ok(offer)
    }

    /// Accept the offer and open its order.
    ///
    /// # Errors
    /// `OfferNotFound`, gate errors, `ConcurrentModification`; after a
    /// committed accept, any error opening the order (retry with
    /// [`Self::ensure_order`]).
    pub fn accept(&self, offer_id: OfferId, actor: UserId) -> Result<Acceptance> {
        let offer = self.commit(offer_id, |offer, now| self.machine.accept(offer, actor, now))?;
        tracing::info!(
            offer_id = %offer_id,
            actor = %actor,
            price = %offer.effective_price(),
            total = %offer.total_price(),
            "Offer accepted"
        );
        self.notify_counterparty(&offer, actor, NotificationKind::OfferAccepted);
        let order = self.open_order(&offer)?;
        Ok(Acceptance { offer, order })
    }

    /// # Errors
    /// `OfferNotFound`, gate errors, `InvalidTerms`, `ConcurrentModification`.
    pub fn reject(&self, offer_id: OfferId, actor: UserId, reason: Option<String>) -> Result<Offer> {
        let offer = self.commit(offer_id, |offer, now| {
            self.machine.reject(offer, actor, reason.clone(), now)
        })?;
        tracing::info!(offer_id = %offer_id, actor = %actor, "Offer rejected");
        self.notify_counterparty(&offer, actor, NotificationKind::OfferRejected);
        Ok(offer)
    }

    /// # Errors
    /// `OfferNotFound`, `NotAParty`, `Terminal`, `ConcurrentModification`.
    pub fn withdraw(&self, offer_id: OfferId, actor: UserId) -> Result<Offer> {
        let offer = self.commit(offer_id, |offer, now| self.machine.withdraw(offer, actor, now))?;
        tracing::info!(offer_id = %offer_id, actor = %actor, "Offer withdrawn");
        self.notify_counterparty(&offer, actor, NotificationKind::OfferWithdrawn);
        Ok(offer)
    }

    /// Expire the offer if it is still open and past due.
    ///
    /// Returns `None` when there is nothing to do, including when a
    /// concurrent user action closed the offer first.
    ///
    /// # Errors
    /// `OfferNotFound`, `Persistence`, `ConcurrentModification`.
    pub fn expire_due(&self, offer_id: OfferId) -> Result<Option<Offer>> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let now = self.clock.now();
            let current = self.load(offer_id)?;
            if current.is_terminal() || !current.is_expired_at(now) {
                return Ok(None);
            }
            let next = self.machine.expire(&current, now)?;
            match self.offers.compare_and_swap(current.revision(), next) {
                Ok(expired) => {
                    tracing::info!(offer_id = %offer_id, round = expired.round, "Offer expired");
                    for recipient in [expired.buyer_id, expired.seller_id] {
                        self.notify(
                            Notification::new(
                                &source_key(&expired),
                                recipient,
                                NotificationKind::OfferExpired,
                            )
                            .with_offer(offer_id),
                        );
                    }
                    return Ok(Some(expired));
                }
                Err(DealdeskError::ConcurrentModification) => {
                    tracing::debug!(offer_id = %offer_id, "Expiry lost CAS race, re-evaluating");
                }
                Err(e) => return Err(e),
            }
        }
        Err(DealdeskError::ConcurrentModification)
    }

    /// Open (or fetch) the order of an accepted offer.
    ///
    /// # Errors
    /// `OfferNotFound`, `IllegalTransition` if the offer is not accepted,
    /// `Persistence`.
    pub fn ensure_order(&self, offer_id: OfferId) -> Result<Order> {
        let offer = self.load(offer_id)?;
        self.open_order(&offer)
    }

    // =================================================================
    // Reads
    // =================================================================

    /// # Errors
    /// `OfferNotFound`, `NotAParty`, `Persistence`.
    pub fn offer_for(&self, offer_id: OfferId, viewer: UserId) -> Result<Offer> {
        let offer = self.load(offer_id)?;
        if !offer.is_party(viewer) {
            return Err(DealdeskError::NotAParty);
        }
        Ok(offer)
    }

    /// # Errors
    /// `Persistence`.
    pub fn offers_for(&self, user: UserId) -> Result<Vec<Offer>> {
        self.offers.for_party(user)
    }

    // =================================================================
    // Internals
    // =================================================================

    fn load(&self, offer_id: OfferId) -> Result<Offer> {
        self.offers
            .get(offer_id)?
            .ok_or(DealdeskError::OfferNotFound(offer_id))
    }

    fn commit<F>(&self, offer_id: OfferId, mut transition: F) -> Result<Offer>
    where
        F: FnMut(&Offer, DateTime<Utc>) -> Result<Offer>,
    {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let now = self.clock.now();
            let current = self.load(offer_id)?;
            let next = transition(&current, now)?;
            match self.offers.compare_and_swap(current.revision(), next) {
                Ok(committed) => return Ok(committed),
                Err(DealdeskError::ConcurrentModification) => {
                    tracing::debug!(offer_id = %offer_id, attempt, "Offer CAS lost, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Err(DealdeskError::ConcurrentModification)
    }

    fn open_order(&self, offer: &Offer) -> Result<Order> {
        if offer.status != OfferStatus::Accepted {
            return Err(DealdeskError::IllegalTransition {
                reason: format!("offer {} is {}, not accepted", offer.id, offer.status),
            });
        }
        let order = self
            .ledger
            .open_from_offer(offer, None, self.clock.now())
            .inspect_err(|e| {
                tracing::error!(
                    offer_id = %offer.id,
                    error = %e,
                    "Accepted offer has no order yet"
                );
            })?;
        self.notify(
            Notification::new(&order.id.to_string(), order.buyer_id, NotificationKind::OrderOpened)
                .with_offer(offer.id)
                .with_order(order.id),
        );
        Ok(order)
    }

    fn notify_counterparty(&self, offer: &Offer, actor: UserId, kind: NotificationKind) {
        let recipient = offer.counterparty_of(actor);
        self.notify(Notification::new(&source_key(offer), recipient, kind).with_offer(offer.id));
    }

    fn notify(&self, notification: Notification) {
        let id = notification.id;
        let kind = notification.kind;
        if let Err(e) = self.sink.deliver(notification) {
            tracing::warn!(notification = %id, kind = %kind, error = %e, "Notification delivery failed");
        }
    }
}

/// Unique per committed offer revision.
fn source_key(offer: &Offer) -> String {
    format!("{}:r{}:{}", offer.id, offer.round, offer.status)
}

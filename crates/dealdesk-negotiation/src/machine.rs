//! The negotiation state machine.
//!
//! Every transition is a pure function from the current [`Offer`] to the
//! next one. Nothing here touches storage; the service commits the result
//! with compare-and-swap on the offer's revision.
//!
//! ## Gate
//!
//! counter / accept / reject check, in order:
//!
//! 1. the actor is the buyer or the seller (`NotAParty`)
//! 2. the offer is not terminal (`Terminal`)
//! 3. the offer's expiry has not passed (`Expired`)
//! 4. the actor did not perform the most recent action (`NotYourTurn`)
//!
//! withdraw checks only (1) against the buyer and (2): the buyer may pull
//! an offer back on either party's turn.

use chrono::{DateTime, Duration, Utc};
use dealdesk_types::{
    DealdeskError, ListingTerms, NegotiationConfig, Offer, OfferId, OfferStatus, Result, UserId,
};
use rust_decimal::Decimal;

use crate::validation::TermsValidator;

/// Pure offer transitions under one set of limits.
#[derive(Debug, Clone)]
pub struct OfferMachine {
    validator: TermsValidator,
    offer_ttl: Option<Duration>,
    response_window: Option<Duration>,
}

impl OfferMachine {
    #[must_use]
    pub fn new(config: &NegotiationConfig) -> Self {
        Self {
            validator: TermsValidator::new(config),
            offer_ttl: config.offer_ttl(),
            response_window: config.response_window(),
        }
    }

    #[must_use]
    pub fn validator(&self) -> &TermsValidator {
        &self.validator
    }

    /// Open a new offer from `buyer_id` on `listing`.
    ///
    /// # Errors
    /// `InvalidTerms` if any input fails validation.
    pub fn submit_offer(
        &self,
        listing: &ListingTerms,
        buyer_id: UserId,
        price_per_unit: Decimal,
        quantity: Decimal,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Offer> {
        let message = message
            .map(|m| m.trim().to_owned())
            .filter(|m| !m.is_empty());
        self.validator.check_opening(
            listing,
            buyer_id,
            price_per_unit,
            quantity,
            message.as_deref(),
        )?;
        let expires_at = self.offer_ttl.map(|ttl| deadline(now, ttl)).transpose()?;
        Ok(Offer {
            id: OfferId::new(),
            listing_id: listing.id,
            buyer_id,
            seller_id: listing.seller_id,
            price_per_unit,
            counter_price_per_unit: None,
            quantity,
            message,
            status: OfferStatus::Pending,
            round: 1,
            last_actor_id: buyer_id,
            expires_at,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Propose a new price-per-unit. Refreshes the expiry when a response
    /// window is configured.
    ///
    /// # Errors
    /// Gate errors, or `InvalidTerms` for a bad price.
    pub fn counter(
        &self,
        offer: &Offer,
        actor: UserId,
        new_price_per_unit: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Offer> {
        check_gate(offer, actor, now)?;
        self.validator.check_price(new_price_per_unit)?;
        let round = offer
            .round
            .checked_add(1)
            .ok_or_else(|| DealdeskError::Internal(format!("round overflow on {}", offer.id)))?;
        let mut next = offer.clone();
        next.status = OfferStatus::Countered;
        next.round = round;
        next.counter_price_per_unit = Some(new_price_per_unit);
        next.last_actor_id = actor;
        if let Some(window) = self.response_window {
            next.expires_at = Some(deadline(now, window)?);
        }
        next.updated_at = now;
        Ok(next)
    }

    /// Accept the price on the table.
    ///
    /// # Errors
    /// Gate errors.
    pub fn accept(&self, offer: &Offer, actor: UserId, now: DateTime<Utc>) -> Result<Offer> {
        check_gate(offer, actor, now)?;
        Ok(close(offer, actor, OfferStatus::Accepted, now))
    }

    /// Decline the offer, optionally with a reason.
    ///
    /// # Errors
    /// Gate errors, or `InvalidTerms` for an over-long reason.
    pub fn reject(
        &self,
        offer: &Offer,
        actor: UserId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Offer> {
        check_gate(offer, actor, now)?;
        let reason = reason
            .map(|r| r.trim().to_owned())
            .filter(|r| !r.is_empty());
        if let Some(reason) = &reason {
            self.validator.check_message(reason)?;
        }
        let mut next = close(offer, actor, OfferStatus::Rejected, now);
        next.rejection_reason = reason;
        Ok(next)
    }

    /// The buyer pulls the offer back.
    ///
    /// # Errors
    /// `NotAParty` unless `actor` is the buyer, `Terminal` if already closed.
    pub fn withdraw(&self, offer: &Offer, actor: UserId, now: DateTime<Utc>) -> Result<Offer> {
        if actor != offer.buyer_id {
            return Err(DealdeskError::NotAParty);
        }
        if offer.is_terminal() {
            return Err(DealdeskError::Terminal {
                status: offer.status,
            });
        }
        Ok(close(offer, actor, OfferStatus::Withdrawn, now))
    }

    /// Time out an open offer whose expiry has passed. The last actor is
    /// left unchanged since no party acted.
    ///
    /// # Errors
    /// `Terminal` if already closed, `IllegalTransition` if not yet due.
    pub fn expire(&self, offer: &Offer, now: DateTime<Utc>) -> Result<Offer> {
        if offer.is_terminal() {
            return Err(DealdeskError::Terminal {
                status: offer.status,
            });
        }
        if !offer.is_expired_at(now) {
            return Err(DealdeskError::IllegalTransition {
                reason: format!("offer {} is not due to expire", offer.id),
            });
        }
        let mut next = offer.clone();
        next.status = OfferStatus::Expired;
        next.updated_at = now;
        Ok(next)
    }
}

fn deadline(now: DateTime<Utc>, after: Duration) -> Result<DateTime<Utc>> {
    now.checked_add_signed(after).ok_or_else(|| {
        DealdeskError::Internal(format!("expiry {after} after {now} is out of range"))
    })
}

impl Default for OfferMachine {
    fn default() -> Self {
        Self::new(&NegotiationConfig::default())
    }
}

/// The shared counter / accept / reject gate.
///
/// # Errors
/// `NotAParty`, `Terminal`, `Expired` or `NotYourTurn`, checked in that order.
pub fn check_gate(offer: &Offer, actor: UserId, now: DateTime<Utc>) -> Result<()> {
    if !offer.is_party(actor) {
        return Err(DealdeskError::NotAParty);
    }
    if offer.is_terminal() {
        return Err(DealdeskError::Terminal {
            status: offer.status,
        });
    }
    if offer.is_expired_at(now) {
        return Err(DealdeskError::Expired);
    }
    if actor == offer.last_actor_id {
        return Err(DealdeskError::NotYourTurn);
    }
    Ok(())
}

fn close(offer: &Offer, actor: UserId, status: OfferStatus, now: DateTime<Utc>) -> Offer {
    let mut next = offer.clone();
    next.status = status;
    next.last_actor_id = actor;
    next.updated_at = now;
    next
}

//! Offer persistence with compare-and-swap on [`OfferRevision`].

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use dealdesk_types::{DealdeskError, Offer, OfferId, OfferRevision, Result, UserId};

pub trait OfferStore: Send + Sync {
    /// # Errors
    /// `Persistence` if the backend is unavailable.
    fn get(&self, id: OfferId) -> Result<Option<Offer>>;

    /// # Errors
    /// `Persistence` on a duplicate id or backend failure.
    fn insert(&self, offer: Offer) -> Result<Offer>;

    /// Commit `next` if the stored offer's revision equals `expected`.
    ///
    /// # Errors
    /// `OfferNotFound`, `ConcurrentModification` on a revision mismatch,
    /// `Persistence` on backend failure.
    fn compare_and_swap(&self, expected: OfferRevision, next: Offer) -> Result<Offer>;

    /// Open offers whose expiry is at or before `now`.
    ///
    /// # Errors
    /// `Persistence` if the backend is unavailable.
    fn expirable(&self, now: DateTime<Utc>) -> Result<Vec<Offer>>;

    /// Offers where `user` is the buyer or the seller, newest first.
    ///
    /// # Errors
    /// `Persistence` if the backend is unavailable.
    fn for_party(&self, user: UserId) -> Result<Vec<Offer>>;
}

#[derive(Debug, Default)]
pub struct InMemoryOfferStore {
    offers: Mutex<HashMap<OfferId, Offer>>,
}

impl InMemoryOfferStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> DealdeskError {
    DealdeskError::Persistence("offer store lock poisoned".into())
}

impl OfferStore for InMemoryOfferStore {
    fn get(&self, id: OfferId) -> Result<Option<Offer>> {
        let offers = self.offers.lock().map_err(|_| poisoned())?;
        Ok(offers.get(&id).cloned())
    }

    fn insert(&self, offer: Offer) -> Result<Offer> {
        let mut offers = self.offers.lock().map_err(|_| poisoned())?;
        if offers.contains_key(&offer.id) {
            return Err(DealdeskError::Persistence(format!(
                "duplicate offer id {}",
                offer.id
            )));
        }
        offers.insert(offer.id, offer.clone());
        Ok(offer)
    }

    fn compare_and_swap(&self, expected: OfferRevision, next: Offer) -> Result<Offer> {
        let mut offers = self.offers.lock().map_err(|_| poisoned())?;
        let current = offers
            .get(&next.id)
            .ok_or(DealdeskError::OfferNotFound(next.id))?;
        if current.revision() != expected {
            return Err(DealdeskError::ConcurrentModification);
        }
        offers.insert(next.id, next.clone());
        Ok(next)
    }

    fn expirable(&self, now: DateTime<Utc>) -> Result<Vec<Offer>> {
        let offers = self.offers.lock().map_err(|_| poisoned())?;
        let mut due: Vec<Offer> = offers
            .values()
            .filter(|o| o.status.is_open() && o.is_expired_at(now))
            .cloned()
            .collect();
        due.sort_by_key(|o| o.expires_at);
        Ok(due)
    }

    fn for_party(&self, user: UserId) -> Result<Vec<Offer>> {
        let offers = self.offers.lock().map_err(|_| poisoned())?;
        let mut mine: Vec<Offer> = offers
            .values()
            .filter(|o| o.is_party(user))
            .cloned()
            .collect();
        mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(mine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealdesk_types::OfferStatus;
    use rust_decimal::Decimal;

    fn offer() -> Offer {
        Offer::dummy(UserId::new(), UserId::new(), Decimal::ONE, Decimal::ONE)
    }

    #[test]
    fn cas_rejects_stale_revision() {
        let store = InMemoryOfferStore::new();
        let original = store.insert(offer()).unwrap();
        let mut a = original.clone();
        a.status = OfferStatus::Accepted;
        let mut b = original.clone();
        b.status = OfferStatus::Rejected;
        store.compare_and_swap(original.revision(), a).unwrap();
        assert!(matches!(
            store.compare_and_swap(original.revision(), b),
            Err(DealdeskError::ConcurrentModification)
        ));
        assert_eq!(
            store.get(original.id).unwrap().unwrap().status,
            OfferStatus::Accepted
        );
    }

    #[test]
    fn expirable_skips_terminal_and_future() {
        let store = InMemoryOfferStore::new();
        let now = Utc::now();
        let mut due = offer();
        due.expires_at = Some(now - chrono::Duration::seconds(1));
        let mut future = offer();
        future.expires_at = Some(now + chrono::Duration::hours(1));
        let mut closed = offer();
        closed.expires_at = Some(now - chrono::Duration::hours(1));
        closed.status = OfferStatus::Accepted;
        let due = store.insert(due).unwrap();
        store.insert(future).unwrap();
        store.insert(closed).unwrap();
        store.insert(offer()).unwrap();
        let found = store.expirable(now).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, due.id);
    }

    #[test]
    fn for_party_filters() {
        let store = InMemoryOfferStore::new();
        let mine = store.insert(offer()).unwrap();
        store.insert(offer()).unwrap();
        let found = store.for_party(mine.seller_id).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, mine.id);
    }
}

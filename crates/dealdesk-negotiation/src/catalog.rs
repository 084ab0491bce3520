//! Read-only listing lookup.

use std::collections::HashMap;
use std::sync::RwLock;

use dealdesk_types::{DealdeskError, ListingId, ListingTerms, Result};

/// The listing collaborator, consulted once per offer action.
pub trait ListingCatalog: Send + Sync {
    /// # Errors
    /// `ListingNotFound` for an unknown id, `Persistence` on backend failure.
    fn listing(&self, id: ListingId) -> Result<ListingTerms>;
}

/// Catalog backed by a map, for tests and single-node deployments.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    listings: RwLock<HashMap<ListingId, ListingTerms>>,
}

impl InMemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a listing.
    ///
    /// # Errors
    /// `Persistence` if the lock is poisoned.
    pub fn upsert(&self, terms: ListingTerms) -> Result<()> {
        self.listings
            .write()
            .map_err(|_| DealdeskError::Persistence("catalog lock poisoned".into()))?
            .insert(terms.id, terms);
        Ok(())
    }
}

impl ListingCatalog for InMemoryCatalog {
    fn listing(&self, id: ListingId) -> Result<ListingTerms> {
        self.listings
            .read()
            .map_err(|_| DealdeskError::Persistence("catalog lock poisoned".into()))?
            .get(&id)
            .cloned()
            .ok_or(DealdeskError::ListingNotFound(id))
    }
}

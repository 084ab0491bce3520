//! Read-only listing terms supplied by the catalog collaborator.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ListingId, UserId};

/// The subset of a listing the negotiation core reads, fetched once per
/// offer action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingTerms {
    pub id: ListingId,
    pub seller_id: UserId,
    /// Current ask price-per-unit.
    pub ask_price_per_unit: Decimal,
    pub available_quantity: Decimal,
    pub min_order_quantity: Decimal,
    /// Whether the seller accepts offers on this listing.
    pub accepts_offers: bool,
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl ListingTerms {
    /// An offer-accepting listing with ample stock.
    pub fn dummy(seller_id: UserId, ask: Decimal) -> Self {
        Self {
            id: ListingId::new(),
            seller_id,
            ask_price_per_unit: ask,
            available_quantity: Decimal::from(100_000),
            min_order_quantity: Decimal::ONE,
            accepts_offers: true,
        }
    }
}

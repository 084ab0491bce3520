//! Terms validation: the hard gate every price, quantity and message passes
//! before it can reach an offer.
//!
//! Fail-closed: any check that cannot be evaluated rejects the input. All
//! checks run before any state mutation.

use dealdesk_types::{DealdeskError, ListingTerms, NegotiationConfig, Result, UserId};
use rust_decimal::Decimal;

/// Validates economic inputs against sanity ceilings and listing terms.
#[derive(Debug, Clone)]
pub struct TermsValidator {
    max_price_per_unit: Decimal,
    max_quantity: Decimal,
    max_message_len: usize,
}

impl TermsValidator {
    #[must_use]
    pub fn new(config: &NegotiationConfig) -> Self {
        Self {
            max_price_per_unit: config.max_price_per_unit,
            max_quantity: config.max_quantity,
            max_message_len: config.max_message_len,
        }
    }

    /// Validate an opening offer from `buyer_id` on `listing`.
    ///
    /// # Errors
    /// `InvalidTerms` naming the first failed check.
    pub fn check_opening(
        &self,
        listing: &ListingTerms,
        buyer_id: UserId,
        price_per_unit: Decimal,
        quantity: Decimal,
        message: Option<&str>,
    ) -> Result<()> {
        if !listing.accepts_offers {
            return Err(invalid("this listing does not accept offers"));
        }
        if buyer_id == listing.seller_id {
            return Err(invalid("you cannot make an offer on your own listing"));
        }
        self.check_price(price_per_unit)?;
        self.check_quantity(quantity)?;
        if quantity < listing.min_order_quantity {
            return Err(invalid(format!(
                "quantity {quantity} is below the minimum order of {}",
                listing.min_order_quantity
            )));
        }
        if quantity > listing.available_quantity {
            return Err(invalid(format!(
                "quantity {quantity} exceeds the {} available",
                listing.available_quantity
            )));
        }
        if let Some(message) = message {
            self.check_message(message)?;
        }
        Ok(())
    }

    /// # Errors
    /// `InvalidTerms` if the price is not positive or above the ceiling.
    pub fn check_price(&self, price_per_unit: Decimal) -> Result<()> {
        if price_per_unit <= Decimal::ZERO {
            return Err(invalid("price must be positive"));
        }
        if price_per_unit > self.max_price_per_unit {
            return Err(invalid(format!(
                "price {price_per_unit} exceeds the maximum of {}",
                self.max_price_per_unit
            )));
        }
        Ok(())
    }

    /// # Errors
    /// `InvalidTerms` if the quantity is not positive or above the ceiling.
    pub fn check_quantity(&self, quantity: Decimal) -> Result<()> {
        if quantity <= Decimal::ZERO {
            return Err(invalid("quantity must be positive"));
        }
        if quantity > self.max_quantity {
            return Err(invalid(format!(
                "quantity {quantity} exceeds the maximum of {}",
                self.max_quantity
            )));
        }
        Ok(())
    }

    /// Free text attached to an offer or a rejection.
    ///
    /// # Errors
    /// `InvalidTerms` if the message is longer than the limit.
    pub fn check_message(&self, message: &str) -> Result<()> {
        let len = message.chars().count();
        if len > self.max_message_len {
            return Err(invalid(format!(
                "message is {len} characters, the limit is {}",
                self.max_message_len
            )));
        }
        Ok(())
    }
}

impl Default for TermsValidator {
    fn default() -> Self {
        Self::new(&NegotiationConfig::default())
    }
}

fn invalid(reason: impl Into<String>) -> DealdeskError {
    DealdeskError::InvalidTerms {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> ListingTerms {
        ListingTerms::dummy(UserId::new(), Decimal::new(250, 2))
    }

    fn is_invalid(r: Result<()>) -> bool {
        matches!(r, Err(DealdeskError::InvalidTerms { .. }))
    }

    #[test]
    fn valid_opening_passes() {
        let v = TermsValidator::default();
        let l = listing();
        assert!(
            v.check_opening(&l, UserId::new(), Decimal::new(250, 2), Decimal::from(1000), None)
                .is_ok()
        );
    }

    #[test]
    fn non_positive_inputs_rejected() {
        let v = TermsValidator::default();
        let l = listing();
        let buyer = UserId::new();
        assert!(is_invalid(v.check_opening(&l, buyer, Decimal::ZERO, Decimal::ONE, None)));
        assert!(is_invalid(v.check_opening(&l, buyer, Decimal::NEGATIVE_ONE, Decimal::ONE, None)));
        assert!(is_invalid(v.check_opening(&l, buyer, Decimal::ONE, Decimal::ZERO, None)));
    }

    #[test]
    fn ceilings_enforced() {
        let v = TermsValidator::default();
        let l = listing();
        let buyer = UserId::new();
        let absurd = Decimal::from(10_000_000_000_i64);
        assert!(is_invalid(v.check_opening(&l, buyer, absurd, Decimal::ONE, None)));
        assert!(is_invalid(v.check_quantity(absurd)));
    }

    #[test]
    fn listing_terms_enforced() {
        let v = TermsValidator::default();
        let mut l = listing();
        let buyer = UserId::new();
        l.min_order_quantity = Decimal::from(100);
        assert!(is_invalid(v.check_opening(&l, buyer, Decimal::ONE, Decimal::from(99), None)));
        l.available_quantity = Decimal::from(500);
        assert!(is_invalid(v.check_opening(&l, buyer, Decimal::ONE, Decimal::from(501), None)));
        l.accepts_offers = false;
        assert!(is_invalid(v.check_opening(&l, buyer, Decimal::ONE, Decimal::from(200), None)));
    }

    #[test]
    fn seller_cannot_offer_on_own_listing() {
        let v = TermsValidator::default();
        let l = listing();
        assert!(is_invalid(v.check_opening(&l, l.seller_id, Decimal::ONE, Decimal::ONE, None)));
    }

    #[test]
    fn message_length_limit() {
        let v = TermsValidator::new(&NegotiationConfig {
            max_message_len: 5,
            ..NegotiationConfig::default()
        });
        assert!(v.check_message("hello").is_ok());
        assert!(is_invalid(v.check_message("hello!")));
        // Counted in characters, not bytes.
        assert!(v.check_message("héllo").is_ok());
    }
}

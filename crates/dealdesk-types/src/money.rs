//! Fixed-point money arithmetic.
//!
//! Every amount is a [`Decimal`] rounded to [`MONEY_SCALE`] places with the
//! half-up rule (ties move away from zero; all amounts here are positive).

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::constants::{self, BPS_DENOMINATOR, MONEY_SCALE};

/// Round an amount to cents, half-up.
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// `round(price_per_unit × quantity, 2)`.
///
/// Returns `None` on overflow; callers validate against sanity ceilings
/// first, so this only trips on inputs that bypassed validation.
#[must_use]
pub fn total_price(price_per_unit: Decimal, quantity: Decimal) -> Option<Decimal> {
    price_per_unit.checked_mul(quantity).map(round_money)
}

/// Marketplace fee rates, in basis points of the subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    /// Charged to the buyer on top of the subtotal.
    pub buyer_fee_bps: u32,
    /// Withheld from the seller's payout.
    pub seller_fee_bps: u32,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            buyer_fee_bps: constants::DEFAULT_BUYER_FEE_BPS,
            seller_fee_bps: constants::DEFAULT_SELLER_FEE_BPS,
        }
    }
}

impl FeeSchedule {
    fn fee(subtotal: Decimal, bps: u32) -> Decimal {
        round_money(subtotal * Decimal::from(bps) / Decimal::from(BPS_DENOMINATOR))
    }

    /// Compute the full price breakdown of an order.
    #[must_use]
    pub fn breakdown(
        &self,
        unit_price: Decimal,
        quantity: Decimal,
        shipping_price: Option<Decimal>,
    ) -> Option<PriceBreakdown> {
        let subtotal = total_price(unit_price, quantity)?;
        let buyer_fee = Self::fee(subtotal, self.buyer_fee_bps);
        let seller_fee = Self::fee(subtotal, self.seller_fee_bps);
        let shipping = shipping_price.map(round_money);
        Some(PriceBreakdown {
            subtotal,
            buyer_fee,
            seller_fee,
            seller_payout: subtotal - seller_fee,
            buyer_total: subtotal + buyer_fee + shipping.unwrap_or(Decimal::ZERO),
            shipping_price: shipping,
        })
    }
}

/// Derived amounts for one order. All values are rounded to cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub subtotal: Decimal,
    pub buyer_fee: Decimal,
    pub seller_fee: Decimal,
    pub seller_payout: Decimal,
    pub shipping_price: Option<Decimal>,
    pub buyer_total: Decimal,
}

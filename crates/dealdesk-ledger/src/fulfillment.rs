//! Seller-driven fulfillment actions.
//!
//! ```text
//!   CONFIRMED ──confirm──▶ PROCESSING ──ship──▶ SHIPPED ──deliver──▶ DELIVERED
//!       │                      │                  ▲
//!       └────────────ship──────┼──────────────────┘
//!   PENDING | CONFIRMED | PROCESSING ──cancel──▶ CANCELLED
//! ```
//!
//! Shipping is the carrier-pickup checkpoint that makes escrow releasable,
//! so it requires a settled payment.

use dealdesk_types::{DealdeskError, FulfillmentStatus, PaymentStatus, Result, SettlementState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentAction {
    Confirm,
    Ship,
    Deliver,
    Cancel,
}

impl std::fmt::Display for FulfillmentAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Confirm => write!(f, "confirm"),
            Self::Ship => write!(f, "ship"),
            Self::Deliver => write!(f, "deliver"),
            Self::Cancel => write!(f, "cancel"),
        }
    }
}

impl FulfillmentAction {
    /// The fulfillment status this action leads to from `state`.
    ///
    /// # Errors
    /// `IllegalTransition` if the action is not allowed from `state`.
    pub fn next_status(self, state: SettlementState) -> Result<FulfillmentStatus> {
        let next = match (self, state.order) {
            (Self::Confirm, FulfillmentStatus::Confirmed) => FulfillmentStatus::Processing,
            (Self::Ship, FulfillmentStatus::Confirmed | FulfillmentStatus::Processing)
                if state.payment == PaymentStatus::Succeeded =>
            {
                FulfillmentStatus::Shipped
            }
            (Self::Deliver, FulfillmentStatus::Shipped) => FulfillmentStatus::Delivered,
            (
                Self::Cancel,
                FulfillmentStatus::Pending
                | FulfillmentStatus::Confirmed
                | FulfillmentStatus::Processing,
            ) => FulfillmentStatus::Cancelled,
            _ => {
                return Err(DealdeskError::IllegalTransition {
                    reason: format!("cannot {self} an order in state {state}"),
                });
            }
        };
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealdesk_types::EscrowStatus;

    fn paid(order: FulfillmentStatus) -> SettlementState {
        SettlementState {
            payment: PaymentStatus::Succeeded,
            order,
            escrow: EscrowStatus::Held,
        }
    }

    #[test]
    fn happy_path() {
        assert_eq!(
            FulfillmentAction::Confirm
                .next_status(paid(FulfillmentStatus::Confirmed))
                .unwrap(),
            FulfillmentStatus::Processing
        );
        assert_eq!(
            FulfillmentAction::Ship
                .next_status(paid(FulfillmentStatus::Processing))
                .unwrap(),
            FulfillmentStatus::Shipped
        );
        assert_eq!(
            FulfillmentAction::Deliver
                .next_status(paid(FulfillmentStatus::Shipped))
                .unwrap(),
            FulfillmentStatus::Delivered
        );
    }

    #[test]
    fn ship_requires_payment() {
        let unpaid = SettlementState {
            order: FulfillmentStatus::Confirmed,
            ..SettlementState::OPENED
        };
        assert!(matches!(
            FulfillmentAction::Ship.next_status(unpaid),
            Err(DealdeskError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn cannot_cancel_after_shipping() {
        assert!(
            FulfillmentAction::Cancel
                .next_status(paid(FulfillmentStatus::Shipped))
                .is_err()
        );
        assert_eq!(
            FulfillmentAction::Cancel
                .next_status(SettlementState::OPENED)
                .unwrap(),
            FulfillmentStatus::Cancelled
        );
    }

    #[test]
    fn cannot_deliver_before_shipping() {
        assert!(
            FulfillmentAction::Deliver
                .next_status(paid(FulfillmentStatus::Processing))
                .is_err()
        );
    }
}

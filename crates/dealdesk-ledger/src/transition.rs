//! Pure settlement transitions over the (payment, order, escrow) triple.
//!
//! [`apply`] is total: every (state, event) pair yields either a new state
//! or an explicit no-op. Duplicate or out-of-order provider events are
//! therefore never errors, and applying the same event twice leaves the
//! same state as applying it once.
//!
//! Monotonicity rules that make arbitrary delivery order safe:
//! - a full refund is final: escrow ends `refunded` from any state, and
//!   later successes or partial refunds are superseded
//! - `disputed` is never left except by reinstatement (→ `held`), a lost
//!   dispute or a full refund (→ `refunded`); a late success does not
//!   re-hold disputed funds
//! - `refunded` escrow is never disputed or reinstated

use dealdesk_types::{EscrowStatus, FulfillmentStatus, PaymentStatus, SettlementState};
use serde::{Deserialize, Serialize};

/// A settlement fact to apply to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerEvent {
    PaymentSucceeded,
    /// Failed or canceled payment attempt.
    PaymentFailed,
    Refunded { full: bool },
    /// Dispute opened or disputed funds withdrawn.
    EscrowDisputed,
    /// Disputed funds reinstated, or dispute closed in the seller's favour.
    EscrowReinstated,
    /// Dispute closed in the buyer's favour.
    DisputeLost,
    /// Carrier pickup confirmed; pay the seller out.
    ReleaseEscrow,
}

/// Why a transition changed nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoOpReason {
    /// The event's effect is already present (duplicate delivery).
    AlreadyApplied,
    /// A later fact already overrode this one (out-of-order delivery).
    Superseded,
    /// The event has no meaning in the current state.
    NotApplicable,
}

/// Result of a total transition function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionOutcome<S = SettlementState> {
    Applied(S),
    NoOp(NoOpReason),
}

impl<S> TransitionOutcome<S> {
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    #[must_use]
    pub fn no_op_reason(&self) -> Option<NoOpReason> {
        match self {
            Self::Applied(_) => None,
            Self::NoOp(reason) => Some(*reason),
        }
    }
}

/// `Applied(next)` unless `next == current`, in which case the event was a repeat.
fn changed(current: SettlementState, next: SettlementState) -> TransitionOutcome {
    if next == current {
        TransitionOutcome::NoOp(NoOpReason::AlreadyApplied)
    } else {
        TransitionOutcome::Applied(next)
    }
}

/// Apply `event` to `state`.
#[must_use]
pub fn apply(state: SettlementState, event: LedgerEvent) -> TransitionOutcome {
    match event {
        LedgerEvent::PaymentSucceeded => payment_succeeded(state),
        LedgerEvent::PaymentFailed => payment_failed(state),
        LedgerEvent::Refunded { full } => refunded(state, full),
        LedgerEvent::EscrowDisputed => escrow_disputed(state),
        LedgerEvent::EscrowReinstated => escrow_reinstated(state),
        LedgerEvent::DisputeLost => dispute_lost(state),
        LedgerEvent::ReleaseEscrow => release_escrow(state),
    }
}

fn payment_succeeded(state: SettlementState) -> TransitionOutcome {
    let payment = match state.payment {
        PaymentStatus::Refunded => return TransitionOutcome::NoOp(NoOpReason::Superseded),
        // A partial refund already implies the charge succeeded.
        PaymentStatus::PartiallyRefunded => PaymentStatus::PartiallyRefunded,
        PaymentStatus::Pending | PaymentStatus::Failed | PaymentStatus::Succeeded => {
            PaymentStatus::Succeeded
        }
    };
    let recovering_from_failure =
        state.payment == PaymentStatus::Failed && state.order == FulfillmentStatus::Cancelled;
    let order = if state.order.is_pre_confirmation() || recovering_from_failure {
        FulfillmentStatus::Confirmed
    } else {
        state.order
    };
    let escrow = match state.escrow {
        EscrowStatus::None => EscrowStatus::Held,
        other => other,
    };
    changed(
        state,
        SettlementState {
            payment,
            order,
            escrow,
        },
    )
}

fn payment_failed(state: SettlementState) -> TransitionOutcome {
    match state.payment {
        PaymentStatus::Succeeded | PaymentStatus::Refunded | PaymentStatus::PartiallyRefunded => {
            TransitionOutcome::NoOp(NoOpReason::Superseded)
        }
        PaymentStatus::Pending | PaymentStatus::Failed => {
            let order = if state.order.is_pre_confirmation() {
                FulfillmentStatus::Cancelled
            } else {
                state.order
            };
            changed(
                state,
                SettlementState {
                    payment: PaymentStatus::Failed,
                    order,
                    escrow: state.escrow,
                },
            )
        }
    }
}

fn refunded(state: SettlementState, full: bool) -> TransitionOutcome {
    if !full {
        if state.payment == PaymentStatus::Refunded {
            return TransitionOutcome::NoOp(NoOpReason::Superseded);
        }
        return changed(
            state,
            SettlementState {
                payment: PaymentStatus::PartiallyRefunded,
                ..state
            },
        );
    }
    changed(
        state,
        SettlementState {
            payment: PaymentStatus::Refunded,
            order: cancel_unshipped(state.order),
            escrow: EscrowStatus::Refunded,
        },
    )
}

/// Money returned to the buyer ends an order that has not shipped.
fn cancel_unshipped(order: FulfillmentStatus) -> FulfillmentStatus {
    if order.pickup_confirmed() {
        order
    } else {
        FulfillmentStatus::Cancelled
    }
}

fn escrow_disputed(state: SettlementState) -> TransitionOutcome {
    match state.escrow {
        EscrowStatus::Disputed => TransitionOutcome::NoOp(NoOpReason::AlreadyApplied),
        EscrowStatus::Refunded => TransitionOutcome::NoOp(NoOpReason::NotApplicable),
        EscrowStatus::None | EscrowStatus::Held | EscrowStatus::Released => {
            TransitionOutcome::Applied(SettlementState {
                escrow: EscrowStatus::Disputed,
                ..state
            })
        }
    }
}

fn escrow_reinstated(state: SettlementState) -> TransitionOutcome {
    match state.escrow {
        EscrowStatus::Disputed => TransitionOutcome::Applied(SettlementState {
            escrow: EscrowStatus::Held,
            ..state
        }),
        EscrowStatus::Held => TransitionOutcome::NoOp(NoOpReason::AlreadyApplied),
        // Reinstating after a full refund is undefined upstream; treated as a no-op.
        EscrowStatus::Refunded | EscrowStatus::None | EscrowStatus::Released => {
            TransitionOutcome::NoOp(NoOpReason::NotApplicable)
        }
    }
}

fn dispute_lost(state: SettlementState) -> TransitionOutcome {
    changed(
        state,
        SettlementState {
            payment: PaymentStatus::Refunded,
            order: cancel_unshipped(state.order),
            escrow: EscrowStatus::Refunded,
        },
    )
}

fn release_escrow(state: SettlementState) -> TransitionOutcome {
    match state.escrow {
        EscrowStatus::Released => TransitionOutcome::NoOp(NoOpReason::AlreadyApplied),
        EscrowStatus::Held
            if state.payment == PaymentStatus::Succeeded && state.order.pickup_confirmed() =>
        {
            TransitionOutcome::Applied(SettlementState {
                escrow: EscrowStatus::Released,
                ..state
            })
        }
        _ => TransitionOutcome::NoOp(NoOpReason::NotApplicable),
    }
}

//! # dealdesk-settlement
//!
//! **Settlement reconciler**: turns payment-provider webhooks into order,
//! escrow and promotion transitions.
//!
//! ## Architecture
//!
//! For each delivery the reconciler:
//! 1. Verifies the Ed25519 webhook signature (no mutation on failure)
//! 2. Decodes the body into a closed [`dealdesk_types::ProviderEventKind`]
//! 3. Skips exact replays through the [`IdempotencyGuard`]
//! 4. Dispatches the event to the order ledger, falling back to promotions
//! 5. Emits best-effort notifications for applied changes
//!
//! Provider events may arrive duplicated and in any order. Every ledger
//! transition is idempotent and ordering-safe, so the guard is only a fast
//! path.

pub mod accounts;
pub mod idempotency;
pub mod reconciler;
pub mod signature;

pub use accounts::{AccountRegistry, ConnectedAccount};
pub use idempotency::IdempotencyGuard;
pub use reconciler::{Ack, Acknowledgment, SettlementReconciler};
pub use signature::{
    Ed25519WebhookVerifier, SignatureHeader, SignatureVerifier, sign_webhook, signed_payload,
};

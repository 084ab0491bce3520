//! # dealdesk-ledger
//!
//! The order/escrow ledger for **DealDesk**.
//!
//! ## Components
//!
//! - [`transition`]: the pure `(state, event) → outcome` settlement table
//! - [`OrderLedger`]: opens orders and commits transitions with
//!   compare-and-swap on the order version
//! - [`FulfillmentAction`]: the seller-driven fulfillment track
//! - [`PromotionLedger`]: the same payment lifecycle for paid promotions
//! - [`OrderStore`] / [`PromotionStore`]: persistence seams, with in-memory
//!   implementations
//!
//! ## Idempotence
//!
//! Provider events may arrive duplicated and in any order. Every settlement
//! transition is total and monotone, so replaying an event never produces
//! an error or a second effect; it reports a [`NoOpReason`] instead.

pub mod fulfillment;
pub mod ledger;
pub mod promotion;
pub mod store;
pub mod transition;

pub use fulfillment::FulfillmentAction;
pub use ledger::{LedgerUpdate, OrderLedger};
pub use promotion::{PromotionLedger, PromotionState, PromotionUpdate, apply_promotion};
pub use store::{InMemoryOrderStore, InMemoryPromotionStore, OrderStore, PromotionStore};
pub use transition::{LedgerEvent, NoOpReason, TransitionOutcome, apply};

//! # dealdesk-sweeper
//!
//! Time-driven maintenance for **DealDesk**.
//!
//! ```text
//! tick ─▶ sweep_offers(now)        expirable offers ─▶ NegotiationService.expire_due()
//!      ─▶ sweep_escrow_holds(now)  stale holds      ─▶ HoldPolicy
//! ```
//!
//! [`run`] drives both passes on a fixed interval until shut down.

pub mod runner;
pub mod sweeper;

pub use runner::run;
pub use sweeper::{ExpirySweeper, HoldSweepReport, OfferSweepReport, SweepReport};

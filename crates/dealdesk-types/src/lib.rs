//! # dealdesk-types
//!
//! Shared types, errors, and configuration for the **DealDesk** engine.
//!
//! This crate is the leaf dependency of the workspace: every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`OfferId`], [`OrderId`], [`ListingId`], [`UserId`], [`PromotionId`],
//!   provider references ([`PaymentIntentId`], [`TransferId`], [`ProviderEventId`], [`AccountId`])
//! - **Offer model**: [`Offer`], [`OfferStatus`], [`OfferRevision`], [`Party`]
//! - **Order/Escrow model**: [`Order`], [`PaymentStatus`], [`FulfillmentStatus`], [`EscrowStatus`],
//!   [`SettlementState`]
//! - **Promotion model**: [`Promotion`], [`PromotionStatus`]
//! - **Provider events**: [`ProviderEvent`], [`ProviderEventKind`]
//! - **Listing terms**: [`ListingTerms`]
//! - **Notifications**: [`Notification`], [`NotificationKind`], [`NotificationSink`]
//! - **Money**: [`money::round_money`], [`money::total_price`], [`FeeSchedule`]
//! - **Configuration**: [`EngineConfig`] and its sections
//! - **Errors**: [`DealdeskError`] with `DD_ERR_` prefix codes
//! - **Clock**: [`Clock`], [`SystemClock`], [`ManualClock`]
//! - **Constants**: system-wide limits and defaults

pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod ids;
pub mod listing;
pub mod money;
pub mod notification;
pub mod offer;
pub mod order;
pub mod promotion;

// Re-export all primary types at crate root for ergonomic imports:
//   use dealdesk_types::{Offer, OfferStatus, Order, ProviderEvent, ...};

pub use clock::*;
pub use config::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use listing::*;
pub use money::FeeSchedule;
pub use notification::*;
pub use offer::*;
pub use order::*;
pub use promotion::*;

// Constants are accessed via `dealdesk_types::constants::FOO`
// (not re-exported to avoid name collisions).

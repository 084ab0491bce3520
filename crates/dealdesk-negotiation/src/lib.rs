//! # dealdesk-negotiation
//!
//! Two-party offer negotiation for **DealDesk**.
//!
//! ## Architecture
//!
//! 1. **TermsValidator**: hard gate on prices, quantities and messages
//! 2. **OfferMachine**: pure, turn-gated offer transitions
//! 3. **OfferStore**: persistence with compare-and-swap on the revision
//! 4. **ListingCatalog**: read-only listing terms
//! 5. **NegotiationService**: load → transition → CAS, then notify
//!
//! ## Action Flow
//!
//! ```text
//! actor → NegotiationService.counter()
//!       → OfferStore.get() → OfferMachine.counter() → OfferStore.compare_and_swap()
//!       → NotificationSink.deliver(counterparty)
//! ```
//!
//! An accept additionally opens the order through the ledger.

pub mod catalog;
pub mod machine;
pub mod service;
pub mod store;
pub mod validation;

pub use catalog::{InMemoryCatalog, ListingCatalog};
pub use machine::{OfferMachine, check_gate};
pub use service::{Acceptance, NegotiationService};
pub use store::{InMemoryOfferStore, OfferStore};
pub use validation::TermsValidator;

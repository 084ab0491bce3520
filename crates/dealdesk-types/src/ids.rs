//! Identifiers used throughout DealDesk.
//!
//! Local entity IDs use UUIDv7 for time-ordered lexicographic sorting.
//! Payment-provider references are opaque strings owned by the provider.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a UUIDv7-backed local identifier with a display prefix.
macro_rules! local_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            #[must_use]
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

/// Declares a provider-issued string reference.
macro_rules! provider_ref {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Local identifiers
// ---------------------------------------------------------------------------

local_id!(
    /// Unique offer identifier.
    OfferId,
    "offer:"
);

local_id!(
    /// Unique order / escrow record identifier.
    OrderId,
    "order:"
);

local_id!(
    /// Listing identifier, owned by the catalog collaborator.
    ListingId,
    "listing:"
);

local_id!(
    /// Authenticated user identifier, owned by the identity collaborator.
    UserId,
    "user:"
);

local_id!(
    /// Paid listing promotion identifier.
    PromotionId,
    "promo:"
);

local_id!(
    /// Deterministic notification identifier (see [`crate::Notification`]).
    NotificationId,
    "note:"
);

// ---------------------------------------------------------------------------
// Provider references
// ---------------------------------------------------------------------------

provider_ref!(
    /// The provider's payment-intent id. The join key between provider
    /// events and local orders/promotions.
    PaymentIntentId
);

provider_ref!(
    /// The provider's transfer id (funds moved to the seller's account).
    TransferId
);

provider_ref!(
    /// The provider's event id. Stable across redeliveries of the same event.
    ProviderEventId
);

provider_ref!(
    /// The provider's connected-account id for a seller.
    AccountId
);

provider_ref!(
    /// The provider's payout id.
    PayoutId
);

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

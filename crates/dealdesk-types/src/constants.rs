//! System-wide constants for the DealDesk engine.

/// Decimal places for every money amount (cents).
pub const MONEY_SCALE: u32 = 2;

/// Basis-point denominator for fee rates.
pub const BPS_DENOMINATOR: i64 = 10_000;

/// Default sanity ceiling for a price-per-unit (in currency units).
pub const DEFAULT_MAX_PRICE_PER_UNIT: i64 = 1_000_000;

/// Default sanity ceiling for an offered quantity.
pub const DEFAULT_MAX_QUANTITY: i64 = 10_000_000;

/// Default lifetime of a freshly submitted offer (7 days).
pub const DEFAULT_OFFER_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Default window the counterparty has to respond to a counter (48 hours).
pub const DEFAULT_RESPONSE_WINDOW_SECS: i64 = 48 * 60 * 60;

/// Maximum length of a buyer's free-text offer message.
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 2_000;

/// Default buyer fee in basis points of the subtotal.
pub const DEFAULT_BUYER_FEE_BPS: u32 = 0;

/// Default seller fee in basis points of the subtotal (5%).
pub const DEFAULT_SELLER_FEE_BPS: u32 = 500;

/// Accepted clock skew between the provider's signature timestamp and ours.
pub const DEFAULT_SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Number of processed provider event ids to remember for fast-path dedupe.
pub const DEFAULT_EVENT_CACHE_SIZE: usize = 100_000;

/// Default sweep interval.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Default grace window before an escrow hold without pickup is stale (14 days).
pub const DEFAULT_ESCROW_HOLD_GRACE_SECS: i64 = 14 * 24 * 60 * 60;

/// Default lifetime of a paid listing promotion (30 days).
pub const DEFAULT_PROMOTION_DURATION_SECS: i64 = 30 * 24 * 60 * 60;

/// Upper bound for every configured duration (ten years).
pub const MAX_DURATION_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Compare-and-swap attempts before a writer gives up.
pub const MAX_CAS_ATTEMPTS: usize = 5;

//! Configuration types for a DealDesk deployment.
//!
//! Every section has a `Default` backed by [`crate::constants`]; a JSON
//! config file only needs to name the fields it overrides.

use std::path::Path;

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{DealdeskError, FeeSchedule, Result, constants};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub negotiation: NegotiationConfig,
    pub fees: FeeSchedule,
    pub settlement: SettlementConfig,
    pub sweeper: SweeperConfig,
}

impl EngineConfig {
    /// Load and validate a JSON config file.
    ///
    /// # Errors
    /// `Io` if the file cannot be read, `Configuration` if it does not parse
    /// or fails validation.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Parse and validate a JSON config document.
    ///
    /// # Errors
    /// `Configuration` if it does not parse or fails validation.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(raw)
            .map_err(|e| DealdeskError::Configuration(format!("invalid config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the engine cannot run with.
    ///
    /// # Errors
    /// `Configuration` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let n = &self.negotiation;
        if n.max_price_per_unit <= Decimal::ZERO || n.max_quantity <= Decimal::ZERO {
            return Err(DealdeskError::Configuration(
                "negotiation ceilings must be positive".into(),
            ));
        }
        if let Some(ttl) = n.offer_ttl_secs {
            check_secs("negotiation.offer_ttl_secs", ttl)?;
        }
        if let Some(window) = n.response_window_secs {
            check_secs("negotiation.response_window_secs", window)?;
        }
        let bps = i64::from(self.fees.buyer_fee_bps.max(self.fees.seller_fee_bps));
        if bps > constants::BPS_DENOMINATOR {
            return Err(DealdeskError::Configuration(
                "fee rates cannot exceed 100%".into(),
            ));
        }
        check_secs(
            "settlement.signature_tolerance_secs",
            self.settlement.signature_tolerance_secs,
        )?;
        if self.settlement.idempotency_cache_size == 0 {
            return Err(DealdeskError::Configuration(
                "idempotency cache size must be > 0".into(),
            ));
        }
        if let Some(key) = &self.settlement.provider_public_key_hex {
            let bytes = hex::decode(key).map_err(|e| {
                DealdeskError::Configuration(format!("provider public key is not hex: {e}"))
            })?;
            if bytes.len() != 32 {
                return Err(DealdeskError::Configuration(
                    "provider public key must be 32 bytes".into(),
                ));
            }
        }
        let interval = i64::try_from(self.sweeper.interval_secs).unwrap_or(i64::MAX);
        check_secs("sweeper.interval_secs", interval)?;
        check_secs(
            "sweeper.escrow_hold_grace_secs",
            self.sweeper.escrow_hold_grace_secs,
        )?;
        check_secs(
            "sweeper.promotion_duration_secs",
            self.sweeper.promotion_duration_secs,
        )?;
        Ok(())
    }
}

/// A duration field must lie in `1..=MAX_DURATION_SECS`.
fn check_secs(field: &str, secs: i64) -> Result<()> {
    if secs <= 0 || secs > constants::MAX_DURATION_SECS {
        return Err(DealdeskError::Configuration(format!(
            "{field} must be between 1 and {} seconds, got {secs}",
            constants::MAX_DURATION_SECS
        )));
    }
    Ok(())
}

/// Seconds as a `Duration`, clamped to the configurable range so that
/// unvalidated values never panic.
fn bounded(secs: i64) -> Duration {
    let max = constants::MAX_DURATION_SECS;
    Duration::try_seconds(secs.clamp(-max, max)).unwrap_or_else(Duration::zero)
}

/// Limits and timing for the negotiation state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// Sanity ceiling for any price-per-unit.
    pub max_price_per_unit: Decimal,
    /// Sanity ceiling for any quantity.
    pub max_quantity: Decimal,
    /// Lifetime of a new offer. `None` means offers never expire.
    pub offer_ttl_secs: Option<i64>,
    /// A counter moves the expiry to now + this window, if set.
    pub response_window_secs: Option<i64>,
    pub max_message_len: usize,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            max_price_per_unit: Decimal::from(constants::DEFAULT_MAX_PRICE_PER_UNIT),
            max_quantity: Decimal::from(constants::DEFAULT_MAX_QUANTITY),
            offer_ttl_secs: Some(constants::DEFAULT_OFFER_TTL_SECS),
            response_window_secs: Some(constants::DEFAULT_RESPONSE_WINDOW_SECS),
            max_message_len: constants::DEFAULT_MAX_MESSAGE_LEN,
        }
    }
}

impl NegotiationConfig {
    #[must_use]
    pub fn offer_ttl(&self) -> Option<Duration> {
        self.offer_ttl_secs.map(bounded)
    }

    #[must_use]
    pub fn response_window(&self) -> Option<Duration> {
        self.response_window_secs.map(bounded)
    }
}

/// Webhook verification and dedupe settings.
///
/// Constructed once at startup and handed to the reconciler; never read
/// from ambient global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Hex-encoded Ed25519 public key the provider signs webhooks with.
    pub provider_public_key_hex: Option<String>,
    /// Maximum age (and future skew) of a signature timestamp.
    pub signature_tolerance_secs: i64,
    /// Processed event ids remembered for fast-path dedupe.
    pub idempotency_cache_size: usize,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            provider_public_key_hex: None,
            signature_tolerance_secs: constants::DEFAULT_SIGNATURE_TOLERANCE_SECS,
            idempotency_cache_size: constants::DEFAULT_EVENT_CACHE_SIZE,
        }
    }
}

impl SettlementConfig {
    #[must_use]
    pub fn signature_tolerance(&self) -> Duration {
        bounded(self.signature_tolerance_secs)
    }
}

/// What the sweeper does with an escrow hold that outlived its grace window.
///
/// This is a business policy; the engine only executes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldPolicy {
    /// Log and report stale holds; change nothing.
    #[default]
    ReportOnly,
    /// Move stale holds to `disputed` for manual review.
    Escalate,
    /// Release stale holds whose pickup is confirmed; report the rest.
    AutoRelease,
}

/// Expiry sweeper settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub interval_secs: u64,
    pub escrow_hold_grace_secs: i64,
    pub hold_policy: HoldPolicy,
    /// Lifetime of a promotion once its payment succeeds.
    pub promotion_duration_secs: i64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: constants::DEFAULT_SWEEP_INTERVAL_SECS,
            escrow_hold_grace_secs: constants::DEFAULT_ESCROW_HOLD_GRACE_SECS,
            hold_policy: HoldPolicy::ReportOnly,
            promotion_duration_secs: constants::DEFAULT_PROMOTION_DURATION_SECS,
        }
    }
}

impl SweeperConfig {
    #[must_use]
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs)
    }

    #[must_use]
    pub fn escrow_hold_grace(&self) -> Duration {
        bounded(self.escrow_hold_grace_secs)
    }

    #[must_use]
    pub fn promotion_duration(&self) -> Duration {
        bounded(self.promotion_duration_secs)
    }
}

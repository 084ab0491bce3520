//! Webhook authenticity.
//!
//! The provider signs `"{timestamp}.{raw body}"` with its Ed25519 key and
//! sends the result in the `Payment-Signature` header:
//!
//! ```text
//! Payment-Signature: t=1700000000,v1=<128 hex chars>[,v1=<...>]
//! ```
//!
//! Several `v1` entries may be present during key rotation; any one
//! verifying is enough. The timestamp must lie within the configured
//! tolerance of the local clock in either direction, which bounds the
//! replay window for captured requests.

use chrono::{DateTime, Duration, Utc};
use dealdesk_types::{DealdeskError, Result, SettlementConfig};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

/// Authenticates a raw webhook before anything reads its body.
pub trait SignatureVerifier: Send + Sync {
    /// # Errors
    /// `InvalidSignature` if the header is malformed, stale, or does not
    /// verify against `body`.
    fn verify(&self, header: &str, body: &[u8], now: DateTime<Utc>) -> Result<()>;
}

/// Parsed `Payment-Signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<[u8; 64]>,
}

impl SignatureHeader {
    /// # Errors
    /// `InvalidSignature` if the timestamp or every signature is missing or
    /// not decodable.
    pub fn parse(header: &str) -> Result<Self> {
        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => {
                    timestamp = Some(value.parse::<i64>().map_err(|_| {
                        invalid(format!("timestamp is not an integer: {value}"))
                    })?);
                }
                "v1" => {
                    let mut sig = [0u8; 64];
                    if hex::decode_to_slice(value, &mut sig).is_ok() {
                        signatures.push(sig);
                    }
                }
                // Unknown schemes are ignored so new ones can roll out.
                _ => {}
            }
        }
        let timestamp = timestamp.ok_or_else(|| invalid("missing timestamp"))?;
        if signatures.is_empty() {
            return Err(invalid("no v1 signature"));
        }
        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

/// The exact bytes the provider signs.
#[must_use]
pub fn signed_payload(timestamp: i64, body: &[u8]) -> Vec<u8> {
    let prefix = format!("{timestamp}.");
    let mut payload = Vec::with_capacity(prefix.len() + body.len());
    payload.extend_from_slice(prefix.as_bytes());
    payload.extend_from_slice(body);
    payload
}

/// Produce a `Payment-Signature` header value, as the provider would.
#[must_use]
pub fn sign_webhook(key: &SigningKey, timestamp: i64, body: &[u8]) -> String {
    let signature = key.sign(&signed_payload(timestamp, body));
    format!("t={timestamp},v1={}", hex::encode(signature.to_bytes()))
}

/// Verifies provider webhooks against a fixed Ed25519 public key.
#[derive(Debug, Clone)]
pub struct Ed25519WebhookVerifier {
    key: VerifyingKey,
    tolerance: Duration,
}

impl Ed25519WebhookVerifier {
    #[must_use]
    pub fn new(key: VerifyingKey, tolerance: Duration) -> Self {
        Self { key, tolerance }
    }

    /// Build from the settlement config.
    ///
    /// # Errors
    /// `Configuration` if no key is configured or it is not a valid
    /// Ed25519 public key.
    pub fn from_config(config: &SettlementConfig) -> Result<Self> {
        let hex_key = config.provider_public_key_hex.as_deref().ok_or_else(|| {
            DealdeskError::Configuration("settlement.provider_public_key_hex is not set".into())
        })?;
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex_key, &mut bytes).map_err(|e| {
            DealdeskError::Configuration(format!("provider public key is not 32 hex bytes: {e}"))
        })?;
        let key = VerifyingKey::from_bytes(&bytes).map_err(|e| {
            DealdeskError::Configuration(format!("provider public key is invalid: {e}"))
        })?;
        Ok(Self::new(key, config.signature_tolerance()))
    }
}

impl SignatureVerifier for Ed25519WebhookVerifier {
    fn verify(&self, header: &str, body: &[u8], now: DateTime<Utc>) -> Result<()> {
        let parsed = SignatureHeader::parse(header)?;
        let signed_at = DateTime::<Utc>::from_timestamp(parsed.timestamp, 0)
            .ok_or_else(|| invalid("timestamp out of range"))?;
        let skew = (now - signed_at).abs();
        if skew > self.tolerance {
            return Err(invalid(format!(
                "timestamp outside tolerance ({}s off)",
                skew.num_seconds()
            )));
        }
        let payload = signed_payload(parsed.timestamp, body);
        let verified = parsed
            .signatures
            .iter()
            .any(|sig| self.key.verify(&payload, &Signature::from_bytes(sig)).is_ok());
        if verified {
            Ok(())
        } else {
            Err(invalid("no signature matches the provider key"))
        }
    }
}

fn invalid(reason: impl Into<String>) -> DealdeskError {
    DealdeskError::InvalidSignature {
        reason: reason.into(),
    }
}

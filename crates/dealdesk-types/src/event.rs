//! Payment-provider event notifications.
//!
//! The wire envelope is a JSON object:
//!
//! ```json
//! { "id": "evt_123", "type": "payment_intent.succeeded", "created": 1700000000,
//!   "data": { "payment_intent": "pi_123" } }
//! ```
//!
//! `type` selects one variant of the closed [`ProviderEventKind`] enum.
//! Types outside that set decode to [`DecodedEvent::Unsupported`] so that
//! the provider's growing catalogue never breaks acknowledgment.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, DealdeskError, PaymentIntentId, PayoutId, ProviderEventId, Result, TransferId};

/// How a closed dispute ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeOutcome {
    Won,
    Lost,
}

/// Every provider event kind the reconciler handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ProviderEventKind {
    #[serde(rename = "payment_intent.succeeded")]
    PaymentSucceeded { payment_intent: PaymentIntentId },

    #[serde(rename = "payment_intent.payment_failed")]
    PaymentFailed {
        payment_intent: PaymentIntentId,
        #[serde(default)]
        failure_message: Option<String>,
    },

    #[serde(rename = "payment_intent.canceled")]
    PaymentCanceled { payment_intent: PaymentIntentId },

    /// `amount_refunded` is cumulative across all refunds of the charge.
    #[serde(rename = "charge.refunded")]
    ChargeRefunded {
        payment_intent: PaymentIntentId,
        amount: Decimal,
        amount_refunded: Decimal,
    },

    #[serde(rename = "charge.dispute.created")]
    DisputeOpened { payment_intent: PaymentIntentId },

    #[serde(rename = "charge.dispute.closed")]
    DisputeClosed {
        payment_intent: PaymentIntentId,
        outcome: DisputeOutcome,
    },

    #[serde(rename = "charge.dispute.funds_withdrawn")]
    DisputeFundsWithdrawn { payment_intent: PaymentIntentId },

    #[serde(rename = "charge.dispute.funds_reinstated")]
    DisputeFundsReinstated { payment_intent: PaymentIntentId },

    #[serde(rename = "transfer.created")]
    TransferCreated {
        payment_intent: PaymentIntentId,
        transfer: TransferId,
        amount: Decimal,
    },

    #[serde(rename = "payout.paid")]
    PayoutSucceeded {
        account: AccountId,
        payout: PayoutId,
        amount: Decimal,
    },

    #[serde(rename = "payout.failed")]
    PayoutFailed {
        account: AccountId,
        payout: PayoutId,
        #[serde(default)]
        failure_message: Option<String>,
    },

    #[serde(rename = "account.updated")]
    AccountUpdated {
        account: AccountId,
        charges_enabled: bool,
        payouts_enabled: bool,
    },
}

impl ProviderEventKind {
    /// Wire `type` strings of every handled kind.
    pub const TYPES: [&'static str; 12] = [
        "payment_intent.succeeded",
        "payment_intent.payment_failed",
        "payment_intent.canceled",
        "charge.refunded",
        "charge.dispute.created",
        "charge.dispute.closed",
        "charge.dispute.funds_withdrawn",
        "charge.dispute.funds_reinstated",
        "transfer.created",
        "payout.paid",
        "payout.failed",
        "account.updated",
    ];

    /// The payment intent this event concerns, for order/promotion lookup.
    #[must_use]
    pub fn payment_intent(&self) -> Option<&PaymentIntentId> {
        match self {
            Self::PaymentSucceeded { payment_intent }
            | Self::PaymentFailed { payment_intent, .. }
            | Self::PaymentCanceled { payment_intent }
            | Self::ChargeRefunded { payment_intent, .. }
            | Self::DisputeOpened { payment_intent }
            | Self::DisputeClosed { payment_intent, .. }
            | Self::DisputeFundsWithdrawn { payment_intent }
            | Self::DisputeFundsReinstated { payment_intent }
            | Self::TransferCreated { payment_intent, .. } => Some(payment_intent),
            Self::PayoutSucceeded { .. } | Self::PayoutFailed { .. } | Self::AccountUpdated { .. } => {
                None
            }
        }
    }

    /// The wire `type` string.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::PaymentSucceeded { .. } => Self::TYPES[0],
            Self::PaymentFailed { .. } => Self::TYPES[1],
            Self::PaymentCanceled { .. } => Self::TYPES[2],
            Self::ChargeRefunded { .. } => Self::TYPES[3],
            Self::DisputeOpened { .. } => Self::TYPES[4],
            Self::DisputeClosed { .. } => Self::TYPES[5],
            Self::DisputeFundsWithdrawn { .. } => Self::TYPES[6],
            Self::DisputeFundsReinstated { .. } => Self::TYPES[7],
            Self::TransferCreated { .. } => Self::TYPES[8],
            Self::PayoutSucceeded { .. } => Self::TYPES[9],
            Self::PayoutFailed { .. } => Self::TYPES[10],
            Self::AccountUpdated { .. } => Self::TYPES[11],
        }
    }
}

/// A decoded provider event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEvent {
    /// Stable across redeliveries.
    pub id: ProviderEventId,
    pub created: DateTime<Utc>,
    pub kind: ProviderEventKind,
}

/// Result of decoding a webhook body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    Known(ProviderEvent),
    /// A well-formed envelope of a type we do not handle.
    Unsupported {
        id: ProviderEventId,
        event_type: String,
    },
}

#[derive(Serialize, Deserialize)]
struct WireEvent {
    id: ProviderEventId,
    #[serde(rename = "type")]
    event_type: String,
    created: i64,
    #[serde(default)]
    data: serde_json::Value,
}

impl ProviderEvent {
    #[must_use]
    pub fn new(id: impl Into<String>, created: DateTime<Utc>, kind: ProviderEventKind) -> Self {
        Self {
            id: ProviderEventId::new(id),
            created,
            kind,
        }
    }

    /// Decode a webhook body.
    ///
    /// # Errors
    /// Returns [`DealdeskError::Serialization`] if the envelope or the data
    /// of a known type is malformed.
    pub fn decode(body: &[u8]) -> Result<DecodedEvent> {
        let wire: WireEvent = serde_json::from_slice(body)?;
        if !ProviderEventKind::TYPES.contains(&wire.event_type.as_str()) {
            return Ok(DecodedEvent::Unsupported {
                id: wire.id,
                event_type: wire.event_type,
            });
        }
        let created = DateTime::<Utc>::from_timestamp(wire.created, 0).ok_or_else(|| {
            DealdeskError::Serialization(format!("event timestamp out of range: {}", wire.created))
        })?;
        let kind: ProviderEventKind = serde_json::from_value(serde_json::json!({
            "type": wire.event_type,
            "data": wire.data,
        }))?;
        Ok(DecodedEvent::Known(Self {
            id: wire.id,
            created,
            kind,
        }))
    }

    /// Encode to the wire envelope.
    ///
    /// # Errors
    /// Returns [`DealdeskError::Serialization`] if encoding fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut tagged = serde_json::to_value(&self.kind)?;
        let data = tagged
            .get_mut("data")
            .map(serde_json::Value::take)
            .unwrap_or_default();
        let wire = WireEvent {
            id: self.id.clone(),
            event_type: self.kind.type_name().to_string(),
            created: self.created.timestamp(),
            data,
        };
        Ok(serde_json::to_vec(&wire)?)
    }
}

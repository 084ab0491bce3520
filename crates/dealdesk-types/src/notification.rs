//! Notification hand-off to the notification collaborator.
//!
//! The core never waits for delivery. Sinks are called best-effort: a
//! failing sink is logged by the caller and never rolls back the ledger
//! transition that produced the notification.
//!
//! Notification ids are deterministic, so a provider event that is
//! redelivered and reprocessed yields the same ids and the sink can drop
//! the repeats.

use std::{collections::HashSet, sync::Mutex};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{DealdeskError, NotificationId, OfferId, OrderId, PromotionId, Result, UserId};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OfferReceived,
    OfferCountered,
    OfferAccepted,
    OfferRejected,
    OfferWithdrawn,
    OfferExpired,
    OrderOpened,
    PaymentSucceeded,
    PaymentFailed,
    PaymentRefunded,
    DisputeOpened,
    DisputeResolved,
    EscrowReleased,
    EscrowHoldStale,
    TransferCreated,
    PayoutSucceeded,
    PayoutFailed,
    AccountUpdated,
    PromotionActivated,
    PromotionCancelled,
}

impl NotificationKind {
    fn tag(self) -> &'static str {
        match self {
            Self::OfferReceived => "offer_received",
            Self::OfferCountered => "offer_countered",
            Self::OfferAccepted => "offer_accepted",
            Self::OfferRejected => "offer_rejected",
            Self::OfferWithdrawn => "offer_withdrawn",
            Self::OfferExpired => "offer_expired",
            Self::OrderOpened => "order_opened",
            Self::PaymentSucceeded => "payment_succeeded",
            Self::PaymentFailed => "payment_failed",
            Self::PaymentRefunded => "payment_refunded",
            Self::DisputeOpened => "dispute_opened",
            Self::DisputeResolved => "dispute_resolved",
            Self::EscrowReleased => "escrow_released",
            Self::EscrowHoldStale => "escrow_hold_stale",
            Self::TransferCreated => "transfer_created",
            Self::PayoutSucceeded => "payout_succeeded",
            Self::PayoutFailed => "payout_failed",
            Self::AccountUpdated => "account_updated",
            Self::PromotionActivated => "promotion_activated",
            Self::PromotionCancelled => "promotion_cancelled",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// A minimal event record handed to the notification collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient: UserId,
    pub kind: NotificationKind,
    pub offer_id: Option<OfferId>,
    pub order_id: Option<OrderId>,
    pub promotion_id: Option<PromotionId>,
    /// Short human-readable detail (reason, amount, reference).
    pub detail: Option<String>,
}

impl Notification {
    /// Build a notification whose id is derived from `source_key`, the
    /// recipient and the kind.
    ///
    /// `source_key` identifies the triggering fact: a provider event id,
    /// or an offer id plus round for negotiation actions.
    #[must_use]
    pub fn new(source_key: &str, recipient: UserId, kind: NotificationKind) -> Self {
        Self {
            id: Self::derive_id(source_key, recipient, kind),
            recipient,
            kind,
            offer_id: None,
            order_id: None,
            promotion_id: None,
            detail: None,
        }
    }

    #[must_use]
    pub fn with_offer(mut self, offer_id: OfferId) -> Self {
        self.offer_id = Some(offer_id);
        self
    }

    #[must_use]
    pub fn with_order(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    #[must_use]
    pub fn with_promotion(mut self, promotion_id: PromotionId) -> Self {
        self.promotion_id = Some(promotion_id);
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// `SHA-256("dealdesk:notification:v1:" || source_key || recipient || kind)[..16]`
    #[must_use]
    pub fn derive_id(source_key: &str, recipient: UserId, kind: NotificationKind) -> NotificationId {
        let mut hasher = Sha256::new();
        hasher.update(b"dealdesk:notification:v1:");
        hasher.update(source_key.as_bytes());
        hasher.update(recipient.0.as_bytes());
        hasher.update(kind.tag().as_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash[..16]);
        NotificationId::from_bytes(bytes)
    }
}

/// Delivery hand-off. Implementations must not block for long.
pub trait NotificationSink: Send + Sync {
    /// Hand a notification off for delivery.
    ///
    /// # Errors
    /// Any error is treated as a failed side effect: logged, not retried.
    fn deliver(&self, notification: Notification) -> Result<()>;
}

/// In-memory outbox that drops repeated notification ids.
#[derive(Debug, Default)]
pub struct InMemoryOutbox {
    delivered: Mutex<Vec<Notification>>,
    seen: Mutex<HashSet<NotificationId>>,
}

impl InMemoryOutbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of delivered notifications in delivery order.
    #[must_use]
    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Delivered notifications addressed to `recipient`.
    #[must_use]
    pub fn for_recipient(&self, recipient: UserId) -> Vec<Notification> {
        self.delivered()
            .into_iter()
            .filter(|n| n.recipient == recipient)
            .collect()
    }
}

impl NotificationSink for InMemoryOutbox {
    fn deliver(&self, notification: Notification) -> Result<()> {
        let mut seen = self
            .seen
            .lock()
            .map_err(|_| DealdeskError::Internal("outbox lock poisoned".into()))?;
        if !seen.insert(notification.id) {
            return Ok(());
        }
        self.delivered
            .lock()
            .map_err(|_| DealdeskError::Internal("outbox lock poisoned".into()))?
            .push(notification);
        Ok(())
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn deliver(&self, _notification: Notification) -> Result<()> {
        Ok(())
    }
}

/// Sink that always fails. Exercises the best-effort paths in tests.
#[cfg(any(test, feature = "test-helpers"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingSink;

#[cfg(any(test, feature = "test-helpers"))]
impl NotificationSink for FailingSink {
    fn deliver(&self, _notification: Notification) -> Result<()> {
        Err(DealdeskError::Io("notification store unavailable".into()))
    }
}

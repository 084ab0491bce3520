//! Settlement reconciler: the single entry point for provider webhooks.
//!
//! ```text
//! header + raw body
//!   → SignatureVerifier.verify()      InvalidSignature → non-2xx, no mutation
//!   → ProviderEvent::decode()         Malformed / Unsupported → acknowledged
//!   → IdempotencyGuard                Duplicate → acknowledged
//!   → dispatch(kind)                  order, else promotion, else UnknownOrder
//!   → OrderLedger / PromotionLedger   idempotent CAS transition
//!   → NotificationSink                best-effort, only on an applied change
//! ```
//!
//! Only an invalid signature or a storage failure surfaces as `Err`, which
//! the webhook endpoint turns into a non-2xx so the provider redelivers.
//! Everything else is acknowledged, because redelivery could not change
//! the result.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use dealdesk_ledger::{
    LedgerEvent, NoOpReason, OrderLedger, OrderStore, PromotionLedger, PromotionStore,
    TransitionOutcome,
};
use dealdesk_types::{
    AccountId, Clock, DealdeskError, DecodedEvent, DisputeOutcome, Notification,
    NotificationKind, NotificationSink, Order, PaymentIntentId, PayoutId, Promotion,
    ProviderEvent, ProviderEventId, ProviderEventKind, Result, TransferId,
};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::accounts::AccountRegistry;
use crate::idempotency::IdempotencyGuard;
use crate::signature::SignatureVerifier;

/// How an authenticated webhook was acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "ack", rename_all = "snake_case")]
pub enum Ack {
    /// A ledger transition or side effect was committed.
    Applied,
    /// Valid, but the current state already reflects it.
    NoOp { reason: NoOpReason },
    /// Seen recently; skipped without touching the ledger.
    Duplicate,
    /// An event type the reconciler does not handle.
    Unsupported,
    /// No local order or promotion references the payment intent.
    UnknownOrder,
    /// No local seller owns the provider account.
    UnknownAccount,
    /// Authentic but undecodable body.
    Malformed,
}

impl<S> From<&TransitionOutcome<S>> for Ack {
    fn from(outcome: &TransitionOutcome<S>) -> Self {
        match outcome.no_op_reason() {
            None => Self::Applied,
            Some(reason) => Self::NoOp { reason },
        }
    }
}

/// Response body of the webhook endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Acknowledgment {
    pub event_id: Option<ProviderEventId>,
    pub event_type: Option<String>,
    #[serde(flatten)]
    pub ack: Ack,
}

impl Acknowledgment {
    fn for_event(event: &ProviderEvent, ack: Ack) -> Self {
        Self {
            event_id: Some(event.id.clone()),
            event_type: Some(event.kind.type_name().to_string()),
            ack,
        }
    }
}

pub struct SettlementReconciler<S, P> {
    verifier: Arc<dyn SignatureVerifier>,
    orders: Arc<OrderLedger<S>>,
    promotions: Arc<PromotionLedger<P>>,
    accounts: Arc<AccountRegistry>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    seen: Mutex<IdempotencyGuard>,
}

impl<S: OrderStore, P: PromotionStore> SettlementReconciler<S, P> {
    pub fn new(
        verifier: Arc<dyn SignatureVerifier>,
        orders: Arc<OrderLedger<S>>,
        promotions: Arc<PromotionLedger<P>>,
        accounts: Arc<AccountRegistry>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        idempotency_cache_size: usize,
    ) -> Self {
        Self {
            verifier,
            orders,
            promotions,
            accounts,
            sink,
            clock,
            seen: Mutex::new(IdempotencyGuard::new(idempotency_cache_size)),
        }
    }

    pub fn orders(&self) -> &Arc<OrderLedger<S>> {
        &self.orders
    }

    pub fn promotions(&self) -> &Arc<PromotionLedger<P>> {
        &self.promotions
    }

    pub fn accounts(&self) -> &Arc<AccountRegistry> {
        &self.accounts
    }

    // =================================================================
    // Entry points
    // =================================================================

    /// Verify, decode and process one webhook delivery.
    ///
    /// # Errors
    /// `InvalidSignature` (nothing was read or written), or a retryable
    /// storage error (`Persistence`, `ConcurrentModification`) after which
    /// the provider should redeliver.
    pub fn handle_webhook(&self, signature_header: &str, body: &[u8]) -> Result<Acknowledgment> {
        if let Err(e) = self.verifier.verify(signature_header, body, self.clock.now()) {
            tracing::warn!(error = %e, body_len = body.len(), "Webhook rejected");
            return Err(e);
        }
        match ProviderEvent::decode(body) {
            Ok(DecodedEvent::Known(event)) => self.handle_event(&event),
            Ok(DecodedEvent::Unsupported { id, event_type }) => {
                tracing::debug!(event_id = %id, event_type = %event_type, "Unsupported event type");
                Ok(Acknowledgment {
                    event_id: Some(id),
                    event_type: Some(event_type),
                    ack: Ack::Unsupported,
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, body_len = body.len(), "Authentic webhook failed to decode");
                Ok(Acknowledgment {
                    event_id: None,
                    event_type: None,
                    ack: Ack::Malformed,
                })
            }
        }
    }

    /// Process an already authenticated event.
    ///
    /// The event id is remembered only after processing succeeds, so a
    /// failed attempt is fully retried on redelivery.
    ///
    /// # Errors
    /// See [`Self::handle_webhook`].
    pub fn handle_event(&self, event: &ProviderEvent) -> Result<Acknowledgment> {
        if self.seen()?.contains(&event.id) {
            tracing::debug!(event_id = %event.id, "Duplicate event skipped");
            return Ok(Acknowledgment::for_event(event, Ack::Duplicate));
        }
        let ack = self.process_event(event).inspect_err(|e| {
            tracing::error!(
                event_id = %event.id,
                event_type = event.kind.type_name(),
                error = %e,
                "Event processing failed, awaiting redelivery"
            );
        })?;
        self.seen()?.record(event.id.clone());
        tracing::info!(
            event_id = %event.id,
            event_type = event.kind.type_name(),
            ack = ?ack,
            "Event acknowledged"
        );
        Ok(Acknowledgment::for_event(event, ack))
    }

    // =================================================================
    // Dispatch
    // =================================================================

    fn process_event(&self, event: &ProviderEvent) -> Result<Ack> {
        let now = self.clock.now();
        let key = event.id.as_str();
        match &event.kind {
            ProviderEventKind::PaymentSucceeded { payment_intent } => {
                self.settle(key, payment_intent, LedgerEvent::PaymentSucceeded, None, now)
            }
            ProviderEventKind::PaymentFailed {
                payment_intent,
                failure_message,
            } => self.settle(
                key,
                payment_intent,
                LedgerEvent::PaymentFailed,
                failure_message.clone(),
                now,
            ),
            ProviderEventKind::PaymentCanceled { payment_intent } => self.settle(
                key,
                payment_intent,
                LedgerEvent::PaymentFailed,
                Some("payment canceled".into()),
                now,
            ),
            ProviderEventKind::ChargeRefunded {
                payment_intent,
                amount,
                amount_refunded,
            } => {
                let full = amount_refunded >= amount;
                self.settle(
                    key,
                    payment_intent,
                    LedgerEvent::Refunded { full },
                    Some(format!("refunded {amount_refunded} of {amount}")),
                    now,
                )
            }
            ProviderEventKind::DisputeOpened { payment_intent }
            | ProviderEventKind::DisputeFundsWithdrawn { payment_intent } => {
                self.settle(key, payment_intent, LedgerEvent::EscrowDisputed, None, now)
            }
            ProviderEventKind::DisputeFundsReinstated { payment_intent } => {
                self.settle(key, payment_intent, LedgerEvent::EscrowReinstated, None, now)
            }
            ProviderEventKind::DisputeClosed {
                payment_intent,
                outcome,
            } => {
                let event = match outcome {
                    DisputeOutcome::Won => LedgerEvent::EscrowReinstated,
                    DisputeOutcome::Lost => LedgerEvent::DisputeLost,
                };
                self.settle(key, payment_intent, event, None, now)
            }
            ProviderEventKind::TransferCreated {
                payment_intent,
                transfer,
                amount,
            } => self.transfer_created(key, payment_intent, transfer, *amount, now),
            ProviderEventKind::PayoutSucceeded {
                account,
                payout,
                amount,
            } => self.payout(
                key,
                account,
                payout,
                NotificationKind::PayoutSucceeded,
                format!("payout {payout} of {amount} paid"),
            ),
            ProviderEventKind::PayoutFailed {
                account,
                payout,
                failure_message,
            } => self.payout(
                key,
                account,
                payout,
                NotificationKind::PayoutFailed,
                failure_message
                    .clone()
                    .unwrap_or_else(|| format!("payout {payout} failed")),
            ),
            ProviderEventKind::AccountUpdated {
                account,
                charges_enabled,
                payouts_enabled,
            } => self.account_updated(key, account, *charges_enabled, *payouts_enabled, now),
        }
    }

    // =================================================================
    // Handlers
    // =================================================================

    /// Apply a payment-side event to the order or promotion behind the
    /// payment intent.
    fn settle(
        &self,
        key: &str,
        payment_intent: &PaymentIntentId,
        event: LedgerEvent,
        detail: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Ack> {
        if let Some(order) = self.orders.find_by_payment_intent(payment_intent)? {
            let update = self.orders.apply_event(order.id, event, now)?;
            if update.is_applied() {
                self.notify_order(key, &update.order, event, detail);
            }
            return Ok(Ack::from(&update.outcome));
        }
        if let Some(promotion) = self.promotions.find_by_payment_intent(payment_intent)? {
            let update = self.promotions.apply_event(&promotion, event, now)?;
            if update.outcome.is_applied() {
                self.notify_promotion(key, &update.promotion, event, detail);
            }
            return Ok(Ack::from(&update.outcome));
        }
        tracing::info!(
            payment_intent = %payment_intent,
            event = ?event,
            "No local order or promotion for payment intent"
        );
        Ok(Ack::UnknownOrder)
    }

    fn transfer_created(
        &self,
        key: &str,
        payment_intent: &PaymentIntentId,
        transfer: &TransferId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Ack> {
        let Some(order) = self.orders.find_by_payment_intent(payment_intent)? else {
            tracing::info!(
                payment_intent = %payment_intent,
                transfer = %transfer,
                "Transfer for unknown payment intent"
            );
            return Ok(Ack::UnknownOrder);
        };
        let update = self.orders.record_transfer(order.id, transfer.clone(), now)?;
        if update.is_applied() {
            self.notify(
                Notification::new(key, update.order.seller_id, NotificationKind::TransferCreated)
                    .with_order(update.order.id)
                    .with_detail(format!("transfer {transfer} of {amount}")),
            );
        }
        Ok(Ack::from(&update.outcome))
    }

    fn payout(
        &self,
        key: &str,
        account: &AccountId,
        payout: &PayoutId,
        kind: NotificationKind,
        detail: String,
    ) -> Result<Ack> {
        let Some(owner) = self.accounts.owner_of(account)? else {
            tracing::info!(account = %account, payout = %payout, "Payout for unknown account");
            return Ok(Ack::UnknownAccount);
        };
        self.notify(Notification::new(key, owner, kind).with_detail(detail));
        Ok(Ack::Applied)
    }

    fn account_updated(
        &self,
        key: &str,
        account: &AccountId,
        charges_enabled: bool,
        payouts_enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<Ack> {
        let Some(before) = self.accounts.get(account)? else {
            tracing::info!(account = %account, "Update for unknown account");
            return Ok(Ack::UnknownAccount);
        };
        if before.charges_enabled == charges_enabled && before.payouts_enabled == payouts_enabled {
            return Ok(Ack::NoOp {
                reason: NoOpReason::AlreadyApplied,
            });
        }
        let Some(after) =
            self.accounts
                .update_capabilities(account, charges_enabled, payouts_enabled, now)?
        else {
            return Ok(Ack::UnknownAccount);
        };
        tracing::info!(
            account = %account,
            charges_enabled,
            payouts_enabled,
            "Account capabilities updated"
        );
        self.notify(
            Notification::new(key, after.owner, NotificationKind::AccountUpdated).with_detail(
                format!("charges_enabled={charges_enabled} payouts_enabled={payouts_enabled}"),
            ),
        );
        Ok(Ack::Applied)
    }

    // =================================================================
    // Notifications
    // =================================================================

    fn notify_order(&self, key: &str, order: &Order, event: LedgerEvent, detail: Option<String>) {
        let both = [order.buyer_id, order.seller_id];
        let (kind, recipients) = match event {
            LedgerEvent::PaymentSucceeded => (NotificationKind::PaymentSucceeded, &both[..]),
            LedgerEvent::PaymentFailed => (NotificationKind::PaymentFailed, &both[..1]),
            LedgerEvent::Refunded { .. } => (NotificationKind::PaymentRefunded, &both[..]),
            LedgerEvent::EscrowDisputed => (NotificationKind::DisputeOpened, &both[..]),
            LedgerEvent::EscrowReinstated | LedgerEvent::DisputeLost => {
                (NotificationKind::DisputeResolved, &both[..])
            }
            LedgerEvent::ReleaseEscrow => (NotificationKind::EscrowReleased, &both[1..]),
        };
        for &recipient in recipients {
            let mut notification = Notification::new(key, recipient, kind).with_order(order.id);
            if let Some(offer_id) = order.offer_id {
                notification = notification.with_offer(offer_id);
            }
            if let Some(detail) = &detail {
                notification = notification.with_detail(detail.clone());
            }
            self.notify(notification);
        }
    }

    fn notify_promotion(
        &self,
        key: &str,
        promotion: &Promotion,
        event: LedgerEvent,
        detail: Option<String>,
    ) {
        let kind = match event {
            LedgerEvent::PaymentSucceeded => NotificationKind::PromotionActivated,
            LedgerEvent::PaymentFailed => NotificationKind::PromotionCancelled,
            LedgerEvent::Refunded { .. } | LedgerEvent::DisputeLost => {
                NotificationKind::PaymentRefunded
            }
            LedgerEvent::EscrowDisputed | LedgerEvent::EscrowReinstated | LedgerEvent::ReleaseEscrow => {
                return;
            }
        };
        let mut notification =
            Notification::new(key, promotion.seller_id, kind).with_promotion(promotion.id);
        if let Some(detail) = detail {
            notification = notification.with_detail(detail);
        }
        self.notify(notification);
    }

    fn notify(&self, notification: Notification) {
        let id = notification.id;
        let kind = notification.kind;
        if let Err(e) = self.sink.deliver(notification) {
            tracing::warn!(notification = %id, kind = %kind, error = %e, "Notification delivery failed");
        }
    }

    fn seen(&self) -> Result<MutexGuard<'_, IdempotencyGuard>> {
        self.seen
            .lock()
            .map_err(|_| DealdeskError::Internal("idempotency guard lock poisoned".into()))
    }
}

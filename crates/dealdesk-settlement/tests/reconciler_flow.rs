//! Signed webhook deliveries through the reconciler against in-memory
//! ledgers.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use dealdesk_ledger::{
    FulfillmentAction, InMemoryOrderStore, InMemoryPromotionStore, NoOpReason, OrderLedger,
    PromotionLedger,
};
use dealdesk_settlement::{
    Ack, Acknowledgment, AccountRegistry, Ed25519WebhookVerifier, SettlementReconciler,
    sign_webhook,
};
use dealdesk_types::{
    AccountId, Clock, DealdeskError, DisputeOutcome, EscrowStatus, FailingSink, FeeSchedule,
    FulfillmentStatus, InMemoryOutbox, ListingId, ListingTerms, ManualClock, NotificationKind,
    NotificationSink, Order, PaymentIntentId, PaymentStatus, PayoutId, PromotionStatus,
    ProviderEvent, ProviderEventKind, Result, TransferId, UserId,
};
use ed25519_dalek::SigningKey;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rust_decimal::Decimal;

type Reconciler = SettlementReconciler<InMemoryOrderStore, InMemoryPromotionStore>;

struct Harness {
    reconciler: Reconciler,
    outbox: Arc<InMemoryOutbox>,
    clock: Arc<ManualClock>,
    key: SigningKey,
}

fn provider_key() -> SigningKey {
    SigningKey::from_bytes(&[42u8; 32])
}

fn harness_with(sink: Option<Arc<dyn NotificationSink>>, cache_size: usize) -> Harness {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
    ));
    let outbox = Arc::new(InMemoryOutbox::new());
    let sink: Arc<dyn NotificationSink> = match sink {
        Some(sink) => sink,
        None => outbox.clone(),
    };
    let key = provider_key();
    let verifier = Ed25519WebhookVerifier::new(key.verifying_key(), Duration::minutes(5));
    let reconciler = SettlementReconciler::new(
        Arc::new(verifier),
        Arc::new(OrderLedger::new(
            InMemoryOrderStore::new(),
            FeeSchedule {
                buyer_fee_bps: 0,
                seller_fee_bps: 500,
            },
        )),
        Arc::new(PromotionLedger::new(
            InMemoryPromotionStore::new(),
            Duration::days(30),
        )),
        Arc::new(AccountRegistry::new()),
        sink,
        clock.clone(),
        cache_size,
    );
    Harness {
        reconciler,
        outbox,
        clock,
        key,
    }
}

fn harness() -> Harness {
    harness_with(None, 1_000)
}

impl Harness {
    /// A direct purchase of 10 units at 3.00 awaiting `pi`.
    fn order(&self, pi: &str) -> Order {
        let listing = ListingTerms::dummy(UserId::new(), Decimal::new(300, 2));
        let ledger = self.reconciler.orders();
        let order = ledger
            .open_direct_purchase(&listing, UserId::new(), Decimal::from(10), None, self.clock.now())
            .unwrap();
        ledger
            .attach_payment_intent(order.id, PaymentIntentId::new(pi), self.clock.now())
            .unwrap()
    }

    fn reload(&self, order: &Order) -> Order {
        self.reconciler.orders().get(order.id).unwrap()
    }

    fn event(&self, id: &str, kind: ProviderEventKind) -> ProviderEvent {
        ProviderEvent::new(id, self.clock.now(), kind)
    }

    fn deliver(&self, event: &ProviderEvent) -> Result<Acknowledgment> {
        let body = event.encode().unwrap();
        let header = sign_webhook(&self.key, self.clock.now().timestamp(), &body);
        self.reconciler.handle_webhook(&header, &body)
    }

    fn deliver_raw(&self, body: &[u8]) -> Result<Acknowledgment> {
        let header = sign_webhook(&self.key, self.clock.now().timestamp(), body);
        self.reconciler.handle_webhook(&header, body)
    }
}

fn succeeded(pi: &str) -> ProviderEventKind {
    ProviderEventKind::PaymentSucceeded {
        payment_intent: PaymentIntentId::new(pi),
    }
}

fn dispute_opened(pi: &str) -> ProviderEventKind {
    ProviderEventKind::DisputeOpened {
        payment_intent: PaymentIntentId::new(pi),
    }
}

fn funds_withdrawn(pi: &str) -> ProviderEventKind {
    ProviderEventKind::DisputeFundsWithdrawn {
        payment_intent: PaymentIntentId::new(pi),
    }
}

fn funds_reinstated(pi: &str) -> ProviderEventKind {
    ProviderEventKind::DisputeFundsReinstated {
        payment_intent: PaymentIntentId::new(pi),
    }
}

fn refunded(pi: &str, amount: i64, amount_refunded: i64) -> ProviderEventKind {
    ProviderEventKind::ChargeRefunded {
        payment_intent: PaymentIntentId::new(pi),
        amount: Decimal::from(amount),
        amount_refunded: Decimal::from(amount_refunded),
    }
}

// =========================================================================
// Happy path
// =========================================================================

#[test]
fn payment_to_transfer_lifecycle() {
    let h = harness();
    let order = h.order("pi_1");

    let ack = h.deliver(&h.event("evt_1", succeeded("pi_1"))).unwrap();
    assert_eq!(ack.ack, Ack::Applied);
    let paid = h.reload(&order);
    assert_eq!(paid.payment_status, PaymentStatus::Succeeded);
    assert_eq!(paid.order_status, FulfillmentStatus::Confirmed);
    assert_eq!(paid.escrow_status, EscrowStatus::Held);
    assert_eq!(paid.escrow_held_at, Some(h.clock.now()));
    assert_eq!(h.outbox.for_recipient(order.buyer_id).len(), 1);
    assert_eq!(h.outbox.for_recipient(order.seller_id).len(), 1);

    let ledger = h.reconciler.orders();
    let shipped = ledger
        .advance_fulfillment(order.id, FulfillmentAction::Ship, paid.version, h.clock.now())
        .unwrap();
    assert!(shipped.pickup_confirmed_at.is_some());
    let released = ledger.release_escrow(order.id, h.clock.now()).unwrap();
    assert_eq!(released.order.escrow_status, EscrowStatus::Released);

    let transfer = h.event(
        "evt_2",
        ProviderEventKind::TransferCreated {
            payment_intent: PaymentIntentId::new("pi_1"),
            transfer: TransferId::new("tr_1"),
            amount: released.order.seller_payout,
        },
    );
    assert_eq!(h.deliver(&transfer).unwrap().ack, Ack::Applied);
    assert_eq!(h.reload(&order).transfer_id, Some(TransferId::new("tr_1")));
    assert_eq!(h.deliver(&transfer).unwrap().ack, Ack::Duplicate);

    let seller_kinds: Vec<_> = h
        .outbox
        .for_recipient(order.seller_id)
        .into_iter()
        .map(|n| n.kind)
        .collect();
    assert_eq!(
        seller_kinds,
        vec![NotificationKind::PaymentSucceeded, NotificationKind::TransferCreated]
    );
}

#[test]
fn acknowledgment_serializes_flat() {
    let h = harness();
    h.order("pi_1");
    let ack = h.deliver(&h.event("evt_1", succeeded("pi_1"))).unwrap();
    assert_eq!(
        serde_json::to_value(&ack).unwrap(),
        serde_json::json!({
            "event_id": "evt_1",
            "event_type": "payment_intent.succeeded",
            "ack": "applied",
        })
    );

    let replay = h.deliver(&h.event("evt_1b", succeeded("pi_1"))).unwrap();
    assert_eq!(
        serde_json::to_value(&replay).unwrap()["reason"],
        serde_json::json!("already_applied")
    );
}

// =========================================================================
// Duplicates and ordering
// =========================================================================

#[test]
fn redelivery_after_eviction_changes_nothing() {
    let h = harness_with(None, 1);
    let order = h.order("pi_1");
    let first = h.event("evt_1", succeeded("pi_1"));

    assert_eq!(h.deliver(&first).unwrap().ack, Ack::Applied);
    assert_eq!(h.deliver(&first).unwrap().ack, Ack::Duplicate);

    // Push evt_1 out of the guard.
    let other = h.event("evt_2", succeeded("pi_unrelated"));
    assert_eq!(h.deliver(&other).unwrap().ack, Ack::UnknownOrder);

    let before = h.reload(&order);
    let sent = h.outbox.delivered().len();
    assert_eq!(
        h.deliver(&first).unwrap().ack,
        Ack::NoOp {
            reason: NoOpReason::AlreadyApplied
        }
    );
    assert_eq!(h.reload(&order), before);
    assert_eq!(h.outbox.delivered().len(), sent);
}

#[test]
fn dispute_before_success_keeps_funds_disputed() {
    let h = harness();
    let order = h.order("pi_1");

    assert_eq!(h.deliver(&h.event("evt_d", dispute_opened("pi_1"))).unwrap().ack, Ack::Applied);
    assert_eq!(h.deliver(&h.event("evt_s", succeeded("pi_1"))).unwrap().ack, Ack::Applied);
    let state = h.reload(&order);
    assert_eq!(state.payment_status, PaymentStatus::Succeeded);
    assert_eq!(state.escrow_status, EscrowStatus::Disputed);

    let reinstated = h.event("evt_r", funds_reinstated("pi_1"));
    assert_eq!(h.deliver(&reinstated).unwrap().ack, Ack::Applied);
    assert_eq!(h.reload(&order).escrow_status, EscrowStatus::Held);

    let won = h.event(
        "evt_w",
        ProviderEventKind::DisputeClosed {
            payment_intent: PaymentIntentId::new("pi_1"),
            outcome: DisputeOutcome::Won,
        },
    );
    assert_eq!(
        h.deliver(&won).unwrap().ack,
        Ack::NoOp {
            reason: NoOpReason::AlreadyApplied
        }
    );
}

#[test]
fn funds_withdrawn_before_success_never_holds() {
    let h = harness();
    let order = h.order("pi_1");

    let withdrawn = h.event("evt_w", funds_withdrawn("pi_1"));
    let paid = h.event("evt_s", succeeded("pi_1"));
    assert_eq!(h.deliver(&withdrawn).unwrap().ack, Ack::Applied);
    assert_eq!(h.deliver(&paid).unwrap().ack, Ack::Applied);
    let state = h.reload(&order);
    assert_eq!(state.payment_status, PaymentStatus::Succeeded);
    assert_eq!(state.escrow_status, EscrowStatus::Disputed);

    // Redelivered by the provider under a fresh event id.
    let replay = h.event("evt_s2", succeeded("pi_1"));
    assert_eq!(
        h.deliver(&replay).unwrap().ack,
        Ack::NoOp {
            reason: NoOpReason::AlreadyApplied
        }
    );
    assert_eq!(h.reload(&order).escrow_status, EscrowStatus::Disputed);
}

/// Any delivery order of the same events, each delivered twice, ends in
/// the same state.
#[test]
fn shuffled_deliveries_converge() {
    let mut rng = StdRng::seed_from_u64(0xDEA1);
    let scenarios: Vec<Vec<ProviderEventKind>> = vec![
        vec![
            succeeded("pi_1"),
            dispute_opened("pi_1"),
            ProviderEventKind::DisputeClosed {
                payment_intent: PaymentIntentId::new("pi_1"),
                outcome: DisputeOutcome::Lost,
            },
        ],
        vec![succeeded("pi_1"), refunded("pi_1", 30, 10), refunded("pi_1", 30, 30)],
        vec![
            succeeded("pi_1"),
            dispute_opened("pi_1"),
            refunded("pi_1", 30, 30),
            funds_reinstated("pi_1"),
        ],
        vec![
            funds_withdrawn("pi_1"),
            refunded("pi_1", 30, 30),
            funds_reinstated("pi_1"),
        ],
    ];

    for kinds in scenarios {
        let mut finals = Vec::new();
        for _ in 0..12 {
            let h = harness();
            let order = h.order("pi_1");
            let mut events: Vec<ProviderEvent> = kinds
                .iter()
                .enumerate()
                .map(|(i, kind)| h.event(&format!("evt_{i}"), kind.clone()))
                .collect();
            events.extend(events.clone());
            events.shuffle(&mut rng);
            for event in &events {
                h.deliver(event).unwrap();
            }
            finals.push(h.reload(&order).settlement_state());
        }
        assert!(finals.windows(2).all(|w| w[0] == w[1]), "{finals:?}");
        assert_eq!(finals[0].payment, PaymentStatus::Refunded);
        assert_eq!(finals[0].escrow, EscrowStatus::Refunded);
        assert_eq!(finals[0].order, FulfillmentStatus::Cancelled);
    }
}

#[test]
fn partial_then_full_refund() {
    let h = harness();
    let order = h.order("pi_1");
    h.deliver(&h.event("evt_1", succeeded("pi_1"))).unwrap();

    h.deliver(&h.event("evt_2", refunded("pi_1", 30, 12))).unwrap();
    let partial = h.reload(&order);
    assert_eq!(partial.payment_status, PaymentStatus::PartiallyRefunded);
    assert_eq!(partial.escrow_status, EscrowStatus::Held);

    h.deliver(&h.event("evt_3", refunded("pi_1", 30, 30))).unwrap();
    let full = h.reload(&order);
    assert_eq!(full.payment_status, PaymentStatus::Refunded);
    assert_eq!(full.escrow_status, EscrowStatus::Refunded);
    assert_eq!(full.order_status, FulfillmentStatus::Cancelled);
}

#[test]
fn failed_payment_cancels_pending_order() {
    let h = harness();
    let order = h.order("pi_1");
    let failed = h.event(
        "evt_f",
        ProviderEventKind::PaymentFailed {
            payment_intent: PaymentIntentId::new("pi_1"),
            failure_message: Some("card declined".into()),
        },
    );
    assert_eq!(h.deliver(&failed).unwrap().ack, Ack::Applied);
    let state = h.reload(&order);
    assert_eq!(state.payment_status, PaymentStatus::Failed);
    assert_eq!(state.order_status, FulfillmentStatus::Cancelled);

    let notices = h.outbox.for_recipient(order.buyer_id);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].detail.as_deref(), Some("card declined"));
    assert!(h.outbox.for_recipient(order.seller_id).is_empty());
}

// =========================================================================
// Rejections and failures
// =========================================================================

#[test]
fn bad_signature_mutates_nothing() {
    let h = harness();
    let order = h.order("pi_1");
    let body = h.event("evt_1", succeeded("pi_1")).encode().unwrap();
    let ts = h.clock.now().timestamp();

    let forged = sign_webhook(&SigningKey::from_bytes(&[1u8; 32]), ts, &body);
    assert!(matches!(
        h.reconciler.handle_webhook(&forged, &body),
        Err(DealdeskError::InvalidSignature { .. })
    ));

    let stale = sign_webhook(&h.key, ts - 3600, &body);
    assert!(matches!(
        h.reconciler.handle_webhook(&stale, &body),
        Err(DealdeskError::InvalidSignature { .. })
    ));

    assert_eq!(h.reload(&order), order);
    assert!(h.outbox.delivered().is_empty());
}

#[test]
fn storage_failure_is_retried_in_full() {
    let h = harness();
    let order = h.order("pi_1");
    let event = h.event("evt_1", succeeded("pi_1"));

    h.reconciler.orders().store().set_unavailable(true);
    let err = h.deliver(&event).unwrap_err();
    assert!(matches!(err, DealdeskError::Persistence(_)));
    assert!(err.is_retryable());

    h.reconciler.orders().store().set_unavailable(false);
    assert_eq!(h.deliver(&event).unwrap().ack, Ack::Applied);
    assert_eq!(h.reload(&order).payment_status, PaymentStatus::Succeeded);
}

#[test]
fn unknown_malformed_and_unsupported_are_acknowledged() {
    let h = harness();
    let unknown = h.deliver(&h.event("evt_u", succeeded("pi_nobody"))).unwrap();
    assert_eq!(unknown.ack, Ack::UnknownOrder);

    let malformed = h.deliver_raw(b"{not json").unwrap();
    assert_eq!(malformed.ack, Ack::Malformed);
    assert!(malformed.event_id.is_none());

    let body = format!(
        r#"{{"id":"evt_c","type":"customer.created","created":{},"data":{{}}}}"#,
        h.clock.now().timestamp()
    );
    let unsupported = h.deliver_raw(body.as_bytes()).unwrap();
    assert_eq!(unsupported.ack, Ack::Unsupported);
    assert_eq!(unsupported.event_type.as_deref(), Some("customer.created"));

    assert!(h.outbox.delivered().is_empty());
}

#[test]
fn failing_sink_still_acknowledges() {
    let h = harness_with(Some(Arc::new(FailingSink)), 16);
    let order = h.order("pi_1");
    assert_eq!(h.deliver(&h.event("evt_1", succeeded("pi_1"))).unwrap().ack, Ack::Applied);
    assert_eq!(h.reload(&order).escrow_status, EscrowStatus::Held);
}

// =========================================================================
// Promotions and accounts
// =========================================================================

#[test]
fn promotion_payment_activates_then_refunds() {
    let h = harness();
    let seller = UserId::new();
    let promotion = h
        .reconciler
        .promotions()
        .open(
            ListingId::new(),
            seller,
            Decimal::new(1999, 2),
            PaymentIntentId::new("pi_promo"),
            h.clock.now(),
        )
        .unwrap();

    assert_eq!(h.deliver(&h.event("evt_1", succeeded("pi_promo"))).unwrap().ack, Ack::Applied);
    let active = h
        .reconciler
        .promotions()
        .find_by_payment_intent(&promotion.payment_intent_id)
        .unwrap()
        .unwrap();
    assert_eq!(active.status, PromotionStatus::Active);
    assert_eq!(active.active_until, Some(h.clock.now() + Duration::days(30)));
    assert!(active.is_live_at(h.clock.now()));

    // Escrow events do not apply to promotions.
    assert_eq!(
        h.deliver(&h.event("evt_2", dispute_opened("pi_promo"))).unwrap().ack,
        Ack::NoOp {
            reason: NoOpReason::NotApplicable
        }
    );

    h.deliver(&h.event("evt_3", refunded("pi_promo", 20, 20))).unwrap();
    let refunded = h
        .reconciler
        .promotions()
        .find_by_payment_intent(&promotion.payment_intent_id)
        .unwrap()
        .unwrap();
    assert_eq!(refunded.status, PromotionStatus::Refunded);
    assert!(refunded.active_until.is_none());

    let kinds: Vec<_> = h
        .outbox
        .for_recipient(seller)
        .into_iter()
        .map(|n| n.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![NotificationKind::PromotionActivated, NotificationKind::PaymentRefunded]
    );
}

#[test]
fn account_events_follow_the_registry() {
    let h = harness();
    let owner = UserId::new();
    let account = AccountId::new("acct_1");
    h.reconciler
        .accounts()
        .register(account.clone(), owner, h.clock.now())
        .unwrap();

    let update = |id: &str| {
        h.event(
            id,
            ProviderEventKind::AccountUpdated {
                account: account.clone(),
                charges_enabled: true,
                payouts_enabled: true,
            },
        )
    };
    assert_eq!(h.deliver(&update("evt_a1")).unwrap().ack, Ack::Applied);
    assert_eq!(
        h.deliver(&update("evt_a2")).unwrap().ack,
        Ack::NoOp {
            reason: NoOpReason::AlreadyApplied
        }
    );
    assert!(
        h.reconciler
            .accounts()
            .get(&account)
            .unwrap()
            .unwrap()
            .payouts_enabled
    );

    let paid = h.event(
        "evt_p",
        ProviderEventKind::PayoutSucceeded {
            account: account.clone(),
            payout: PayoutId::new("po_1"),
            amount: Decimal::new(261_250, 2),
        },
    );
    assert_eq!(h.deliver(&paid).unwrap().ack, Ack::Applied);

    let stranger = h.event(
        "evt_x",
        ProviderEventKind::PayoutFailed {
            account: AccountId::new("acct_unknown"),
            payout: PayoutId::new("po_2"),
            failure_message: None,
        },
    );
    assert_eq!(h.deliver(&stranger).unwrap().ack, Ack::UnknownAccount);

    let kinds: Vec<_> = h
        .outbox
        .for_recipient(owner)
        .into_iter()
        .map(|n| n.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![NotificationKind::AccountUpdated, NotificationKind::PayoutSucceeded]
    );
}

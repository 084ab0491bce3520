//! Sweeper passes over in-memory negotiation and ledger state.

use std::sync::{Arc, Barrier};

use chrono::{Duration, TimeZone, Utc};
use dealdesk_ledger::{FulfillmentAction, InMemoryOrderStore, OrderLedger, OrderStore};
use dealdesk_negotiation::{InMemoryCatalog, InMemoryOfferStore, NegotiationService, OfferMachine};
use dealdesk_sweeper::ExpirySweeper;
use dealdesk_types::{
    Clock, DealdeskError, EscrowStatus, FeeSchedule, HoldPolicy, InMemoryOutbox, ListingTerms,
    ManualClock, NegotiationConfig, NotificationKind, Offer, OfferStatus, Order, PaymentIntentId,
    SweeperConfig, UserId,
};
use rust_decimal::Decimal;
use tokio::sync::watch;

type Service = NegotiationService<InMemoryOfferStore, InMemoryCatalog, InMemoryOrderStore>;
type Sweeper = ExpirySweeper<InMemoryOfferStore, InMemoryCatalog, InMemoryOrderStore>;

struct Fixture {
    service: Arc<Service>,
    sweeper: Arc<Sweeper>,
    outbox: Arc<InMemoryOutbox>,
    clock: Arc<ManualClock>,
    listing: ListingTerms,
}

fn fixture(hold_policy: HoldPolicy) -> Fixture {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
    ));
    let outbox = Arc::new(InMemoryOutbox::new());
    let catalog = InMemoryCatalog::new();
    let listing = ListingTerms::dummy(UserId::new(), Decimal::new(300, 2));
    catalog.upsert(listing.clone()).unwrap();
    let ledger = Arc::new(OrderLedger::new(
        InMemoryOrderStore::new(),
        FeeSchedule {
            buyer_fee_bps: 0,
            seller_fee_bps: 500,
        },
    ));
    let service = Arc::new(NegotiationService::new(
        OfferMachine::new(&NegotiationConfig::default()),
        InMemoryOfferStore::new(),
        catalog,
        ledger,
        outbox.clone(),
        clock.clone(),
    ));
    let config = SweeperConfig {
        hold_policy,
        ..SweeperConfig::default()
    };
    let sweeper = Arc::new(ExpirySweeper::new(
        Arc::clone(&service),
        outbox.clone(),
        clock.clone(),
        &config,
    ));
    Fixture {
        service,
        sweeper,
        outbox,
        clock,
        listing,
    }
}

impl Fixture {
    fn offer(&self) -> Offer {
        self.service
            .submit_offer(self.listing.id, UserId::new(), Decimal::ONE, Decimal::TWO, None)
            .unwrap()
    }

    /// An accepted, paid order with escrow held from the current time.
    fn held_order(&self, pi: &str) -> Order {
        let offer = self.offer();
        let order = self
            .service
            .accept(offer.id, self.listing.seller_id)
            .unwrap()
            .order;
        let ledger = self.service.ledger();
        ledger
            .attach_payment_intent(order.id, PaymentIntentId::new(pi), self.clock.now())
            .unwrap();
        ledger
            .mark_payment_succeeded(order.id, self.clock.now())
            .unwrap()
            .order
    }

    fn count(&self, kind: NotificationKind) -> usize {
        self.outbox
            .delivered()
            .into_iter()
            .filter(|n| n.kind == kind)
            .count()
    }
}

// =========================================================================
// Offers
// =========================================================================

#[test]
fn due_offers_expire_once() {
    let f = fixture(HoldPolicy::ReportOnly);
    let first = f.offer();
    let second = f.offer();

    let early = f.sweeper.sweep_offers(f.clock.now()).unwrap();
    assert_eq!(early.scanned, 0);

    f.clock.advance(Duration::days(7));
    let report = f.sweeper.sweep_offers(f.clock.now()).unwrap();
    assert_eq!(report.scanned, 2);
    assert_eq!(report.expired.len(), 2);
    assert!(report.expired.contains(&first.id) && report.expired.contains(&second.id));
    assert_eq!(f.count(NotificationKind::OfferExpired), 4);

    let again = f.sweeper.sweep_offers(f.clock.now()).unwrap();
    assert_eq!(again.scanned, 0);

    assert!(matches!(
        f.service.accept(first.id, f.listing.seller_id),
        Err(DealdeskError::Terminal {
            status: OfferStatus::Expired
        })
    ));
}

#[test]
fn closed_offers_are_left_alone() {
    let f = fixture(HoldPolicy::ReportOnly);
    let withdrawn = f.offer();
    let pending = f.offer();
    f.clock.advance(Duration::days(7));
    f.service.withdraw(withdrawn.id, withdrawn.buyer_id).unwrap();

    let report = f.sweeper.sweep_offers(f.clock.now()).unwrap();
    assert_eq!(report.expired, vec![pending.id]);
    let stored = f.service.offer_for(withdrawn.id, withdrawn.buyer_id).unwrap();
    assert_eq!(stored.status, OfferStatus::Withdrawn);
}

#[test]
fn expiry_is_rechecked_against_the_live_clock() {
    let f = fixture(HoldPolicy::ReportOnly);
    let offer = f.offer();

    // Listed as due, but not yet due by the service clock.
    let report = f
        .sweeper
        .sweep_offers(f.clock.now() + Duration::days(8))
        .unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.skipped, 1);
    assert!(report.expired.is_empty());

    f.clock.advance(Duration::days(8));
    let report = f.sweeper.sweep_offers(f.clock.now()).unwrap();
    assert_eq!(report.expired, vec![offer.id]);
}

#[test]
fn sweeper_and_withdraw_race_has_one_winner() {
    for _ in 0..20 {
        let f = fixture(HoldPolicy::ReportOnly);
        let offer = f.offer();
        f.clock.advance(Duration::days(8));
        let barrier = Arc::new(Barrier::new(2));

        let expire = {
            let service = Arc::clone(&f.service);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                service.expire_due(offer.id).unwrap().is_some()
            })
        };
        let withdraw = {
            let service = Arc::clone(&f.service);
            let barrier = Arc::clone(&barrier);
            let buyer = offer.buyer_id;
            std::thread::spawn(move || {
                barrier.wait();
                service.withdraw(offer.id, buyer).is_ok()
            })
        };
        let expired = expire.join().unwrap();
        let withdrawn = withdraw.join().unwrap();
        assert!(expired ^ withdrawn, "exactly one of expiry and withdraw must win");

        let stored = f.service.offer_for(offer.id, offer.buyer_id).unwrap();
        let expected = if expired {
            OfferStatus::Expired
        } else {
            OfferStatus::Withdrawn
        };
        assert_eq!(stored.status, expected);
    }
}

#[test]
fn accept_racing_expiry_ends_accepted_or_expired() {
    for _ in 0..20 {
        let f = fixture(HoldPolicy::ReportOnly);
        let offer = f.offer();
        // Just short of the deadline; a third thread crosses it mid-race.
        f.clock.advance(Duration::days(7) - Duration::seconds(1));
        let barrier = Arc::new(Barrier::new(3));

        let accept = {
            let service = Arc::clone(&f.service);
            let barrier = Arc::clone(&barrier);
            let seller = f.listing.seller_id;
            std::thread::spawn(move || {
                barrier.wait();
                service.accept(offer.id, seller).is_ok()
            })
        };
        let expire = {
            let service = Arc::clone(&f.service);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                service.expire_due(offer.id).unwrap().is_some()
            })
        };
        let tick = {
            let clock = Arc::clone(&f.clock);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                clock.advance(Duration::seconds(2));
            })
        };
        let accepted = accept.join().unwrap();
        let expired = expire.join().unwrap();
        tick.join().unwrap();
        assert!(!(accepted && expired), "accept and expiry both won");

        // Neither may have won if the clock moved between them; the next
        // sweep settles it.
        f.sweeper.sweep_offers(f.clock.now()).unwrap();
        let stored = f.service.offer_for(offer.id, offer.buyer_id).unwrap();
        assert!(
            matches!(stored.status, OfferStatus::Accepted | OfferStatus::Expired),
            "{}",
            stored.status
        );
        let accepted_now = stored.status == OfferStatus::Accepted;
        assert_eq!(accepted, accepted_now);
        let order = f.service.ledger().store().find_by_offer(offer.id).unwrap();
        assert_eq!(order.is_some(), accepted_now);
    }
}

// =========================================================================
// Escrow holds
// =========================================================================

#[test]
fn holds_inside_grace_are_not_stale() {
    let f = fixture(HoldPolicy::Escalate);
    f.held_order("pi_1");
    f.clock.advance(Duration::days(13));
    let report = f.sweeper.sweep_escrow_holds(f.clock.now()).unwrap();
    assert!(report.stale.is_empty());
}

#[test]
fn report_only_changes_nothing() {
    let f = fixture(HoldPolicy::ReportOnly);
    let order = f.held_order("pi_1");
    f.clock.advance(Duration::days(15));

    let report = f.sweeper.sweep_escrow_holds(f.clock.now()).unwrap();
    assert_eq!(report.stale, vec![order.id]);
    assert_eq!(report.reported, vec![order.id]);
    let stored = f.service.ledger().get(order.id).unwrap();
    assert_eq!(stored.escrow_status, EscrowStatus::Held);
    assert_eq!(f.count(NotificationKind::EscrowHoldStale), 2);

    // Same hold, same notification ids.
    f.sweeper.sweep_escrow_holds(f.clock.now()).unwrap();
    assert_eq!(f.count(NotificationKind::EscrowHoldStale), 2);
}

#[test]
fn escalate_moves_hold_to_disputed() {
    let f = fixture(HoldPolicy::Escalate);
    let order = f.held_order("pi_1");
    f.clock.advance(Duration::days(15));

    let report = f.sweeper.sweep_escrow_holds(f.clock.now()).unwrap();
    assert_eq!(report.escalated, vec![order.id]);
    let stored = f.service.ledger().get(order.id).unwrap();
    assert_eq!(stored.escrow_status, EscrowStatus::Disputed);

    let next = f.sweeper.sweep_escrow_holds(f.clock.now()).unwrap();
    assert!(next.stale.is_empty());
}

#[test]
fn auto_release_needs_pickup() {
    let f = fixture(HoldPolicy::AutoRelease);
    let shipped = f.held_order("pi_shipped");
    let waiting = f.held_order("pi_waiting");
    let ledger = f.service.ledger();
    ledger
        .advance_fulfillment(shipped.id, FulfillmentAction::Ship, shipped.version, f.clock.now())
        .unwrap();
    f.clock.advance(Duration::days(15));

    let report = f.sweeper.sweep_escrow_holds(f.clock.now()).unwrap();
    assert_eq!(report.stale.len(), 2);
    assert_eq!(report.released, vec![shipped.id]);
    assert_eq!(report.reported, vec![waiting.id]);
    assert_eq!(
        ledger.get(shipped.id).unwrap().escrow_status,
        EscrowStatus::Released
    );
    assert_eq!(
        ledger.get(waiting.id).unwrap().escrow_status,
        EscrowStatus::Held
    );
    assert_eq!(f.count(NotificationKind::EscrowReleased), 1);
}

// =========================================================================
// Background loop
// =========================================================================

#[tokio::test]
async fn run_loop_sweeps_until_shutdown() {
    let f = fixture(HoldPolicy::ReportOnly);
    let offer = f.offer();
    f.clock.advance(Duration::days(8));

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(dealdesk_sweeper::run(
        Arc::clone(&f.sweeper),
        std::time::Duration::from_millis(10),
        rx,
    ));
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    tx.send(true).unwrap();

    let sweeps = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(sweeps >= 1);
    let stored = f.service.offer_for(offer.id, offer.buyer_id).unwrap();
    assert_eq!(stored.status, OfferStatus::Expired);
}

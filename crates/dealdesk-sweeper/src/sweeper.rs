//! Periodic cleanup of time-driven state.
//!
//! Two independent passes:
//!
//! - **Offers**: open offers whose expiry has passed are closed as
//!   `expired` through the negotiation service, so the sweeper and user
//!   actions race on the same compare-and-swap and never resurrect each
//!   other's result.
//! - **Escrow holds**: orders held longer than the grace window are handed
//!   to the configured [`HoldPolicy`].
//!
//! A failure on one record is logged and counted; the pass continues.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dealdesk_ledger::{OrderLedger, OrderStore};
use dealdesk_negotiation::{ListingCatalog, NegotiationService, OfferStore};
use dealdesk_types::{
    Clock, DealdeskError, HoldPolicy, Notification, NotificationKind, NotificationSink, OfferId,
    Order, OrderId, Result, SweeperConfig,
};

/// Outcome of one offer pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfferSweepReport {
    pub scanned: usize,
    pub expired: Vec<OfferId>,
    /// Closed by a concurrent user action before the sweeper got to it.
    pub skipped: usize,
    pub failed: usize,
}

/// Outcome of one escrow-hold pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HoldSweepReport {
    pub stale: Vec<OrderId>,
    pub escalated: Vec<OrderId>,
    pub released: Vec<OrderId>,
    /// Stale holds left untouched (report-only, or not yet picked up).
    pub reported: Vec<OrderId>,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub offers: OfferSweepReport,
    pub holds: HoldSweepReport,
}

pub struct ExpirySweeper<O, C, S> {
    negotiation: Arc<NegotiationService<O, C, S>>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    hold_grace: Duration,
    hold_policy: HoldPolicy,
}

impl<O: OfferStore, C: ListingCatalog, S: OrderStore> ExpirySweeper<O, C, S> {
    pub fn new(
        negotiation: Arc<NegotiationService<O, C, S>>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        config: &SweeperConfig,
    ) -> Self {
        Self {
            negotiation,
            sink,
            clock,
            hold_grace: config.escrow_hold_grace(),
            hold_policy: config.hold_policy,
        }
    }

    pub fn hold_policy(&self) -> HoldPolicy {
        self.hold_policy
    }

    fn ledger(&self) -> &Arc<OrderLedger<S>> {
        self.negotiation.ledger()
    }

    /// Run both passes at the clock's current time.
    pub fn sweep_once(&self) -> SweepReport {
        let now = self.clock.now();
        let offers = self.sweep_offers(now).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Offer sweep could not scan");
            OfferSweepReport::default()
        });
        let holds = self.sweep_escrow_holds(now).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Escrow hold sweep could not scan");
            HoldSweepReport::default()
        });
        SweepReport { offers, holds }
    }

    // =================================================================
    // Offers
    // =================================================================

    /// Expire every open offer due at `now`.
    ///
    /// # Errors
    /// `Persistence` if the scan itself fails.
    pub fn sweep_offers(&self, now: DateTime<Utc>) -> Result<OfferSweepReport> {
        let due = self.negotiation.offers().expirable(now)?;
        let mut report = OfferSweepReport {
            scanned: due.len(),
            ..OfferSweepReport::default()
        };
        for offer in due {
            match self.negotiation.expire_due(offer.id) {
                Ok(Some(expired)) => report.expired.push(expired.id),
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!(offer_id = %offer.id, error = %e, "Offer expiry failed");
                    report.failed += 1;
                }
            }
        }
        if report.scanned > 0 {
            tracing::info!(
                scanned = report.scanned,
                expired = report.expired.len(),
                skipped = report.skipped,
                failed = report.failed,
                "Offer sweep complete"
            );
        }
        Ok(report)
    }

    // =================================================================
    // Escrow holds
    // =================================================================

    /// Apply the hold policy to every order held since before
    /// `now - grace`.
    ///
    /// # Errors
    /// `Persistence` if the scan itself fails, `Internal` if the cutoff is
    /// out of range.
    pub fn sweep_escrow_holds(&self, now: DateTime<Utc>) -> Result<HoldSweepReport> {
        let cutoff = now.checked_sub_signed(self.hold_grace).ok_or_else(|| {
            DealdeskError::Internal(format!("hold cutoff before {now} is out of range"))
        })?;
        let stale = self.ledger().stale_holds(cutoff)?;
        let mut report = HoldSweepReport::default();
        for order in stale {
            report.stale.push(order.id);
            tracing::warn!(
                order_id = %order.id,
                held_since = ?order.escrow_held_at,
                order_status = %order.order_status,
                policy = ?self.hold_policy,
                "Escrow hold exceeded grace window"
            );
            if let Err(e) = self.apply_policy(&order, now, &mut report) {
                tracing::warn!(order_id = %order.id, error = %e, "Hold policy failed");
                report.failed += 1;
            }
        }
        Ok(report)
    }

    fn apply_policy(&self, order: &Order, now: DateTime<Utc>, report: &mut HoldSweepReport) -> Result<()> {
        match self.hold_policy {
            HoldPolicy::ReportOnly => {
                self.notify_stale(order, "escrow held past the grace window");
                report.reported.push(order.id);
            }
            HoldPolicy::Escalate => {
                let update = self.ledger().mark_escrow_disputed(order.id, now)?;
                if update.is_applied() {
                    self.notify_stale(order, "escalated for review");
                    report.escalated.push(order.id);
                } else {
                    report.reported.push(order.id);
                }
            }
            HoldPolicy::AutoRelease if order.order_status.pickup_confirmed() => {
                let update = self.ledger().release_escrow(order.id, now)?;
                if update.is_applied() {
                    self.notify(
                        Notification::new(
                            &hold_key(order),
                            order.seller_id,
                            NotificationKind::EscrowReleased,
                        )
                        .with_order(order.id),
                    );
                    report.released.push(order.id);
                } else {
                    report.reported.push(order.id);
                }
            }
            HoldPolicy::AutoRelease => {
                self.notify_stale(order, "awaiting carrier pickup");
                report.reported.push(order.id);
            }
        }
        Ok(())
    }

    fn notify_stale(&self, order: &Order, detail: &str) {
        for recipient in [order.buyer_id, order.seller_id] {
            self.notify(
                Notification::new(&hold_key(order), recipient, NotificationKind::EscrowHoldStale)
                    .with_order(order.id)
                    .with_detail(detail),
            );
        }
    }

    fn notify(&self, notification: Notification) {
        let id = notification.id;
        let kind = notification.kind;
        if let Err(e) = self.sink.deliver(notification) {
            tracing::warn!(notification = %id, kind = %kind, error = %e, "Notification delivery failed");
        }
    }
}

/// One key per hold, so repeated sweeps of the same hold dedupe.
fn hold_key(order: &Order) -> String {
    let since = order.escrow_held_at.map_or(0, |t| t.timestamp());
    format!("{}:hold:{since}", order.id)
}

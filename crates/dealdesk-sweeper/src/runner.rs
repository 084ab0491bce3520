//! Background loop driving the sweeper on the tokio runtime.

use std::sync::Arc;
use std::time::Duration;

use dealdesk_ledger::OrderStore;
use dealdesk_negotiation::{ListingCatalog, OfferStore};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::sweeper::ExpirySweeper;

/// Sweep every `interval` until `shutdown` carries `true` or its sender is
/// dropped. The first sweep runs immediately.
///
/// Returns the number of completed sweeps.
pub async fn run<O, C, S>(
    sweeper: Arc<ExpirySweeper<O, C, S>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> u64
where
    O: OfferStore + 'static,
    C: ListingCatalog + 'static,
    S: OrderStore + 'static,
{
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sweeps = 0u64;
    tracing::info!(interval_secs = interval.as_secs_f64(), policy = ?sweeper.hold_policy(), "Sweeper started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = sweeper.sweep_once();
                sweeps += 1;
                tracing::debug!(
                    sweep = sweeps,
                    offers_expired = report.offers.expired.len(),
                    stale_holds = report.holds.stale.len(),
                    "Sweep finished"
                );
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!(sweeps, "Sweeper stopped");
    sweeps
}

//! Periodic flush requests.

use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{SyncHandle, Trigger};

/// Send [`Trigger::Timer`] every `period` until cancelled or the engine is gone.
///
/// The first request fires one full period after start. A tick delayed by
/// a busy runtime is skipped rather than replayed in a burst.
pub(crate) async fn run_ticker(period: Duration, sync: SyncHandle, cancel: CancellationToken) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !sync.request(Trigger::Timer) {
                    debug!("sync engine stopped, ticker exiting");
                    return;
                }
            }
            () = cancel.cancelled() => return,
        }
    }
}

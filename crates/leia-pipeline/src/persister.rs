//! Background queue persistence.
//!
//! Producers append in memory and poke a [`Notify`]; this task turns bursts
//! of appends into as few storage writes as possible.

use std::sync::Arc;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::queue::DurableQueue;

pub(crate) async fn run_persister(queue: Arc<DurableQueue>, notify: Arc<Notify>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            () = notify.notified() => {
                if let Err(e) = queue.persist().await {
                    warn!(error = %e, queue_len = queue.len(), "failed to persist pending events");
                }
            }
            () = cancel.cancelled() => {
                debug!("persister stopping");
                return;
            }
        }
    }
}

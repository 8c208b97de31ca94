// ── Poller set ──
//
// Periodic request/response refreshes. Each poller runs in its own task,
// only while the session is running, and takes the link lock for the
// duration of one round trip.

pub mod logs;
pub mod schedulers;
pub mod thermostats;
pub mod zones;

use std::time::Duration;

use futures_util::future::BoxFuture;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::panel::Panel;

/// One periodic refresh.
pub(crate) trait Poller: Send {
    fn name(&self) -> &'static str;

    fn period(&self) -> Duration;

    fn poll<'a>(&'a mut self, panel: &'a Panel) -> BoxFuture<'a, Result<(), CoreError>>;
}

/// Drive `poller` until the session is shut down.
pub(crate) async fn run<P: Poller>(panel: Panel, mut poller: P) {
    let name = poller.name();
    debug!(poller = name, "poller started");
    loop {
        if !panel.wait_running().await {
            break;
        }

        let result = tokio::select! {
            biased;
            () = panel.cancel_token().cancelled() => break,
            result = poller.poll(&panel) => result,
        };
        if let Err(e) = result {
            warn!(poller = name, error = %e, "poll failed");
            if e.is_connection_lost() {
                panel.connection_lost(e.close_code()).await;
            }
        }

        if !panel.sleep_or_cancel(poller.period()).await {
            break;
        }
    }
    debug!(poller = name, "poller stopped");
}

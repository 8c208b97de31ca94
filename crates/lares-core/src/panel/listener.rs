// ── Inbound listener ──
//
// Reads frames while no request holds the link and routes them. Each read
// is a short slice so queued commands and pollers get the link between
// slices. A quiet socket is probed with a ping.

use std::time::Duration;

use lares_api::Error as ApiError;
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

use super::Panel;

/// Longest a single read holds the link.
const READ_SLICE: Duration = Duration::from_secs(3);
/// Silence after which the socket is pinged.
const IDLE_PING_AFTER: Duration = Duration::from_secs(20);
const PING_TIMEOUT: Duration = Duration::from_secs(5);

enum Read {
    Frame,
    Idle,
    Lost(Option<u16>),
}

pub(super) async fn listener_task(panel: Panel) {
    let mut last_frame = Instant::now();
    loop {
        if !panel.wait_running().await {
            break;
        }

        let outcome = tokio::select! {
            biased;
            () = panel.cancel_token().cancelled() => break,
            outcome = read_once(&panel) => outcome,
        };

        match outcome {
            Read::Frame => last_frame = Instant::now(),
            Read::Idle => {
                if last_frame.elapsed() >= IDLE_PING_AFTER {
                    if ping(&panel).await {
                        last_frame = Instant::now();
                    } else {
                        warn!("panel did not answer ping");
                        panel.connection_lost(None).await;
                    }
                }
            }
            Read::Lost(code) => {
                panel.connection_lost(code).await;
                last_frame = Instant::now();
            }
        }
    }
    debug!("listener task stopped");
}

async fn read_once(panel: &Panel) -> Read {
    let mut guard = panel.inner.link.lock().await;
    let Some(link) = guard.as_mut() else {
        return Read::Idle;
    };
    let result = match timeout(READ_SLICE, link.next_frame()).await {
        Ok(result) => result,
        Err(_) => return Read::Idle,
    };
    drop(guard);

    match result {
        Ok(frame) => {
            panel.inner.router.route(frame);
            Read::Frame
        }
        Err(ApiError::Deserialization { message, body }) => {
            warn!(error = %message, body = %body, "undecodable frame");
            Read::Frame
        }
        Err(e) if e.is_connection_lost() => {
            warn!(error = %e, "listener read failed");
            Read::Lost(e.close_code())
        }
        Err(e) => {
            warn!(error = %e, "listener read error");
            Read::Idle
        }
    }
}

async fn ping(panel: &Panel) -> bool {
    let mut guard = panel.inner.link.lock().await;
    let Some(link) = guard.as_mut() else {
        return true;
    };
    matches!(timeout(PING_TIMEOUT, link.ping()).await, Ok(Ok(())))
}

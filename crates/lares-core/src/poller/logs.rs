// ── Event log poller ──

use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::warn;

use super::Poller;
use crate::error::CoreError;
use crate::model::static_config::log_entries;
use crate::model::{LogEntry, StreamUpdate};
use crate::panel::{LOG_WINDOW, Panel};

const PERIOD: Duration = Duration::from_secs(5);

/// Entries of one fetched window that are newer than `last`.
#[derive(Debug, Default, PartialEq)]
pub struct LogWindow {
    /// New entries, oldest first.
    pub fresh: Vec<LogEntry>,
    /// Highest sequence in the window, the next cursor.
    pub max: Option<u64>,
    /// Entries between `last` and the window may have been missed.
    pub gap: bool,
}

/// Split a fetched window against the cursor. Entries without a numeric
/// id are ignored.
pub fn window(entries: Vec<LogEntry>, last: Option<u64>, size: u32) -> LogWindow {
    let mut numbered: Vec<(u64, LogEntry)> = entries
        .into_iter()
        .filter_map(|e| e.seq().map(|seq| (seq, e)))
        .collect();
    let min = numbered.iter().map(|(seq, _)| *seq).min();
    let max = numbered.iter().map(|(seq, _)| *seq).max();

    let gap = match (last, min, max) {
        (Some(last), Some(min), Some(max)) => {
            max.saturating_sub(last) >= u64::from(size) && last < min
        }
        _ => false,
    };

    numbered.retain(|(seq, _)| last.is_none_or(|last| *seq > last));
    numbered.sort_by_key(|(seq, _)| *seq);
    LogWindow {
        fresh: numbered.into_iter().map(|(_, e)| e).collect(),
        max,
        gap,
    }
}

pub(crate) struct LogsPoller;

impl Poller for LogsPoller {
    fn name(&self) -> &'static str {
        "logs"
    }

    fn period(&self) -> Duration {
        PERIOD
    }

    fn poll<'a>(&'a mut self, panel: &'a Panel) -> BoxFuture<'a, Result<(), CoreError>> {
        async move {
            let payload = panel
                .with_link(|link, dispatch| link.logs(LOG_WINDOW, dispatch).boxed())
                .await?;

            let mut cursor = panel.log_cursor().lock().await;
            let last = *cursor;
            let result = window(log_entries(&payload), last, LOG_WINDOW);
            if result.gap {
                warn!(
                    last = ?last,
                    max = ?result.max,
                    items = LOG_WINDOW,
                    "log window too small, some events may be missed"
                );
            }
            if result.max.is_some() {
                *cursor = result.max;
            }
            drop(cursor);

            if !result.fresh.is_empty() {
                panel.notify(&StreamUpdate::Logs(result.fresh));
            }
            Ok(())
        }
        .boxed()
    }
}

pub(crate) async fn logs_task(panel: Panel) {
    super::run(panel, LogsPoller).await;
}

// ── Scheduler poller ──
//
// Timers and holidays can be edited from the panel's own web UI and are
// never pushed, so they are re-read periodically.

use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::debug;

use super::Poller;
use crate::error::CoreError;
use crate::model::static_config::section;
use crate::model::{Holiday, SchedulerTimer, StreamUpdate};
use crate::panel::Panel;

const PERIOD: Duration = Duration::from_secs(30);

pub(crate) struct SchedulersPoller;

impl Poller for SchedulersPoller {
    fn name(&self) -> &'static str {
        "schedulers"
    }

    fn period(&self) -> Duration {
        PERIOD
    }

    fn poll<'a>(&'a mut self, panel: &'a Panel) -> BoxFuture<'a, Result<(), CoreError>> {
        async move {
            let payload = panel
                .with_link(|link, dispatch| link.read_schedulers(dispatch).boxed())
                .await?;

            let timers = section::<SchedulerTimer>(&payload, "CFG_SCHEDULER_TIMERS");
            let holidays = section::<Holiday>(&payload, "CFG_HOLIDAYS");
            if timers.is_none() && holidays.is_none() {
                debug!("scheduler read returned no sections");
                return Ok(());
            }

            panel.store().update_static(|cfg| {
                if let Some(timers) = &timers {
                    cfg.scheduler_timers.clone_from(timers);
                }
                if let Some(holidays) = holidays {
                    cfg.holidays = holidays;
                }
            });
            if let Some(timers) = timers {
                panel.notify(&StreamUpdate::Schedulers(timers));
            }
            Ok(())
        }
        .boxed()
    }
}

pub(crate) async fn schedulers_task(panel: Panel) {
    super::run(panel, SchedulersPoller).await;
}

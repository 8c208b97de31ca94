// ── Thermostat configuration poller ──
//
// Modes, seasons and setpoints change from the panel keypad and the
// vendor app without any push, so the full configuration is re-read.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::info;

use super::Poller;
use crate::error::CoreError;
use crate::model::static_config::section;
use crate::model::{StreamUpdate, ThermostatConfig};
use crate::panel::Panel;

const PERIOD: Duration = Duration::from_secs(15);

#[derive(Default)]
pub(crate) struct ThermostatsPoller {
    /// Digests of the previous fetch, kept only when change logging is on.
    last_by_id: HashMap<String, Value>,
}

impl ThermostatsPoller {
    fn log_changes(&mut self, list: &[ThermostatConfig]) {
        let current: HashMap<String, Value> = list
            .iter()
            .map(|cfg| (cfg.id.clone(), cfg.digest()))
            .collect();
        for (id, digest) in &current {
            match self.last_by_id.get(id) {
                None => info!(id = %id, config = %digest, "thermostat config new"),
                Some(prev) if prev != digest => {
                    info!(id = %id, from = %prev, to = %digest, "thermostat config change");
                }
                Some(_) => {}
            }
        }
        self.last_by_id = current;
    }
}

impl Poller for ThermostatsPoller {
    fn name(&self) -> &'static str {
        "thermostats"
    }

    fn period(&self) -> Duration {
        PERIOD
    }

    fn poll<'a>(&'a mut self, panel: &'a Panel) -> BoxFuture<'a, Result<(), CoreError>> {
        async move {
            let pin = panel.config().pin.clone();
            let payload = panel
                .with_link(move |link, dispatch| {
                    async move { link.read_thermostats(Some(&pin), dispatch).await }.boxed()
                })
                .await?;
            let Some(list) = section::<ThermostatConfig>(&payload, "CFG_THERMOSTATS") else {
                return Ok(());
            };

            panel
                .store()
                .update_static(|cfg| cfg.thermostats.clone_from(&list));
            if panel.config().debug_thermostats {
                self.log_changes(&list);
            }
            panel.notify(&StreamUpdate::ThermostatConfigs(list));
            Ok(())
        }
        .boxed()
    }
}

pub(crate) async fn thermostats_task(panel: Panel) {
    super::run(panel, ThermostatsPoller::default()).await;
}

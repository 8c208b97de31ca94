// ── Read accessors ──
//
// Static configuration joined with the realtime snapshot, in the shapes
// downstream entities consume. Each accessor waits a bounded time for the
// bootstrap and degrades to an empty result.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::error;

use super::Panel;
use crate::model::record::id_order;
use crate::model::{
    BusDevice, ClimateSensor, DomusStatus, Joined, OutputConfig, OutputStatus, OutputView,
    RealtimeSnapshot, Record, ScenarioConfig, SchedulerView, SensorKind, SensorList, StaticConfig,
    SystemView, ThermostatView,
};

/// Pair every static record with its realtime state, or an empty status
/// when the panel sent none.
fn join_all<C, S>(configs: &[C], statuses: &[S]) -> Vec<Joined<C, S>>
where
    C: Record,
    S: Record + Default,
{
    configs
        .iter()
        .map(|config| {
            let status = find(statuses, config.id()).cloned().unwrap_or_default();
            Joined {
                config: config.clone(),
                status,
            }
        })
        .collect()
}

fn find<'a, T: Record>(records: &'a [T], id: &str) -> Option<&'a T> {
    records.iter().find(|r| r.id() == id)
}

/// Outputs matching `keep` that have realtime state.
fn outputs_with_state(
    config: &StaticConfig,
    realtime: &RealtimeSnapshot,
    keep: impl Fn(&OutputConfig) -> bool,
) -> Vec<Joined<OutputConfig, OutputStatus>> {
    config
        .outputs
        .iter()
        .filter(|o| keep(o))
        .filter_map(|o| {
            find(&realtime.outputs, &o.id).map(|status| Joined {
                config: o.clone(),
                status: status.clone(),
            })
        })
        .collect()
}

/// Probe names keyed by thermostat id. Temperatures win over humidity.
fn probe_names(config: &StaticConfig) -> HashMap<String, String> {
    let mut names = HashMap::new();
    for sensor in config.humidity.iter().chain(&config.temperatures) {
        if let Some(name) = probe_name(sensor) {
            names.insert(sensor.thermostat_id().to_owned(), name);
        }
    }
    names
}

fn probe_name(sensor: &ClimateSensor) -> Option<String> {
    sensor
        .des
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_owned)
}

impl Panel {
    /// Both snapshots, after waiting up to `accessor_wait` for them.
    async fn snapshots(&self, accessor: &str) -> Option<(Arc<StaticConfig>, Arc<RealtimeSnapshot>)> {
        let store = &self.inner.store;
        if !store.is_ready() && !store.wait_ready(self.inner.config.accessor_wait).await {
            error!(accessor, "initial data not available");
            return None;
        }
        store.static_config().zip(store.realtime())
    }

    pub async fn lights(&self) -> Vec<OutputView> {
        let Some((config, realtime)) = self.snapshots("lights").await else {
            return Vec::new();
        };
        outputs_with_state(&config, &realtime, |o| o.is_category("LIGHT"))
            .into_iter()
            .map(OutputView::new)
            .collect()
    }

    pub async fn rolls(&self) -> Vec<OutputView> {
        let Some((config, realtime)) = self.snapshots("rolls").await else {
            return Vec::new();
        };
        outputs_with_state(&config, &realtime, |o| o.is_category("ROLL"))
            .into_iter()
            .map(OutputView::new)
            .collect()
    }

    /// Every non-light output with realtime state.
    pub async fn switches(&self) -> Vec<Joined<OutputConfig, OutputStatus>> {
        let Some((config, realtime)) = self.snapshots("switches").await else {
            return Vec::new();
        };
        outputs_with_state(&config, &realtime, |o| !o.is_category("LIGHT"))
    }

    /// Domotic bus sensors with their readings.
    pub async fn domus(&self) -> Vec<Joined<BusDevice, DomusStatus>> {
        let Some((config, realtime)) = self.snapshots("domus").await else {
            return Vec::new();
        };
        config
            .bus_has
            .iter()
            .filter(|d| d.typ.as_deref() == Some("DOMUS"))
            .filter_map(|d| {
                find(&realtime.domus, &d.id).map(|status| Joined {
                    config: d.clone(),
                    status: status.clone(),
                })
            })
            .collect()
    }

    pub async fn sensors(&self, kind: SensorKind) -> SensorList {
        let Some((config, realtime)) = self.snapshots("sensors").await else {
            return SensorList::empty(kind);
        };
        match kind {
            SensorKind::Zones => SensorList::Zones(join_all(&config.zones, &realtime.zones)),
            SensorKind::Partitions => {
                SensorList::Partitions(join_all(&config.partitions, &realtime.partitions))
            }
            SensorKind::PowerLines => {
                SensorList::PowerLines(join_all(&config.power_lines, &realtime.power_lines))
            }
        }
    }

    pub async fn scenarios(&self) -> Vec<ScenarioConfig> {
        self.snapshots("scenarios")
            .await
            .map(|(config, _)| config.scenarios.clone())
            .unwrap_or_default()
    }

    /// Scheduler timers with the name of the scenario each one fires.
    pub async fn schedulers(&self) -> Vec<SchedulerView> {
        let Some((config, _)) = self.snapshots("schedulers").await else {
            return Vec::new();
        };
        config
            .scheduler_timers
            .iter()
            .map(|timer| SchedulerView {
                timer: timer.clone(),
                scenario_name: timer
                    .sce
                    .as_deref()
                    .and_then(|sce| find(&config.scenarios, sce))
                    .map(|s| s.label().to_owned())
                    .filter(|l| !l.is_empty()),
            })
            .collect()
    }

    /// One entry per thermostat id known from configuration, temperature
    /// or humidity, in numeric id order.
    pub async fn thermostats(&self) -> Vec<ThermostatView> {
        let Some((config, realtime)) = self.snapshots("thermostats").await else {
            return Vec::new();
        };
        let ids: BTreeSet<(u8, u64, String)> = config
            .thermostats
            .iter()
            .map(|t| t.id.as_str())
            .chain(realtime.temperatures.iter().map(|t| t.id.as_str()))
            .chain(realtime.humidity.iter().map(|h| h.id.as_str()))
            .filter(|id| !id.is_empty())
            .map(|id| {
                let (class, n, _) = id_order(id);
                (class, n, id.to_owned())
            })
            .collect();
        let names = probe_names(&config);

        ids.into_iter()
            .map(|(_, _, id)| ThermostatView {
                name: names.get(&id).cloned(),
                config: config.thermostat(&id).cloned(),
                temperature: find(&realtime.temperatures, &id).cloned(),
                humidity: find(&realtime.humidity, &id).cloned(),
                id,
            })
            .collect()
    }

    /// `STATUS_SYSTEM` from realtime, else from the bootstrap read.
    pub async fn system(&self) -> Vec<SystemView> {
        let Some((config, realtime)) = self.snapshots("system").await else {
            return Vec::new();
        };
        let source = if realtime.system.is_empty() {
            &config.system
        } else {
            &realtime.system
        };
        source
            .iter()
            .map(|s| SystemView {
                id: s.id.clone(),
                arm: s.arm.clone().unwrap_or_else(|| Value::Object(Map::new())),
            })
            .collect()
    }

    /// Partitions a zone belongs to, decoded from its `PRT` field.
    pub fn zone_partitions(&self, zone_id: &str) -> Vec<u32> {
        let Some(config) = self.inner.store.static_config() else {
            return Vec::new();
        };
        let Some(raw) = config
            .zones
            .iter()
            .find(|z| z.id == zone_id)
            .and_then(|z| z.prt.as_deref())
        else {
            return Vec::new();
        };
        self.inner.decoder.decode(raw, &config.partition_ids())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn temperature_names_win_over_humidity() {
        let config: StaticConfig = serde_json::from_value(json!({
            "TEMPERATURES": [{"ID": "5", "ID_TH": "1", "DES": " Living "}],
            "HUMIDITY": [{"ID": "1", "DES": "Humidity living"}, {"ID": "2", "DES": "  "}],
        }))
        .unwrap();
        let names = probe_names(&config);
        assert_eq!(names.get("1").map(String::as_str), Some("Living"));
        assert!(!names.contains_key("2"));
    }

    #[test]
    fn join_defaults_missing_status() {
        let config: StaticConfig = serde_json::from_value(json!({
            "ZONES": [{"ID": "1", "DES": "Door"}, {"ID": "2", "DES": "Window"}]
        }))
        .unwrap();
        let realtime: RealtimeSnapshot = serde_json::from_value(json!({
            "STATUS_ZONES": [{"ID": "2", "STA": "A"}]
        }))
        .unwrap();
        let joined = join_all(&config.zones, &realtime.zones);
        assert_eq!(joined.len(), 2);
        assert_eq!(joined[0].status.sta, None);
        assert_eq!(joined[1].status.sta.as_deref(), Some("A"));
    }
}

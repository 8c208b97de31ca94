// ── Static configuration records ──
//
// Returned by the bootstrap bulk `READ` and refreshed section-by-section
// by the pollers and typed writes.

use lares_api::frame::{lenient_opt_string, lenient_string};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::log::LogEntry;
use super::realtime::{SystemStatus, ZoneStatus};
use super::record::{impl_record, one_or_many};
use super::thermostat::ThermostatConfig;

/// `OUTPUTS`: lights, shutters and relays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct OutputConfig {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub des: Option<String>,
    /// `LIGHT`, `ROLL`, `GEN`, ...
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub cat: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
impl_record!(OutputConfig { des, cat, typ });

impl OutputConfig {
    pub fn is_category(&self, category: &str) -> bool {
        self.cat.as_deref() == Some(category)
    }
}

/// `BUS_HAS`: devices on the domotic bus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct BusDevice {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub des: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
impl_record!(BusDevice { des, typ });

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ScenarioConfig {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub des: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub nm: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub cat: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
impl_record!(ScenarioConfig { des, nm, cat });

impl ScenarioConfig {
    /// Best human label: description, then name, then id.
    pub fn label(&self) -> &str {
        self.des
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.nm.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PowerLineConfig {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub des: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
impl_record!(PowerLineConfig { des });

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PartitionConfig {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub des: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
impl_record!(PartitionConfig { des });

/// `ZONES` as returned by `READ`. Carries both the description and the
/// live status fields, which is why the zones poller reads it instead of
/// trusting realtime pushes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ZoneConfig {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub des: Option<String>,
    /// Partition association, see [`PartitionDecoder`](super::PartitionDecoder).
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub prt: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub cat: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub sta: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub byp: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub an: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub a: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub fm: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub vas: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub ohm: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub byp_en: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
impl_record!(ZoneConfig { des, prt, cat, sta, byp, t, an, a, fm, vas, ohm, cmd, byp_en });

impl ZoneConfig {
    /// The status-only projection the zones poller diffs.
    pub fn compact(&self) -> ZoneStatus {
        ZoneStatus {
            id: self.id.clone(),
            sta: self.sta.clone(),
            byp: self.byp.clone(),
            t: self.t.clone(),
            an: self.an.clone(),
            a: self.a.clone(),
            fm: self.fm.clone(),
            vas: self.vas.clone(),
            ohm: self.ohm.clone(),
            cmd: self.cmd.clone(),
            byp_en: self.byp_en.clone(),
            extra: Map::new(),
        }
    }
}

/// `TEMPERATURES` / `HUMIDITY`: probe names, linked to a thermostat
/// through `ID_TH`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ClimateSensor {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub id_th: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub des: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
impl_record!(ClimateSensor { id_th, des });

impl ClimateSensor {
    pub fn thermostat_id(&self) -> &str {
        self.id_th.as_deref().unwrap_or(&self.id)
    }
}

/// `CFG_SCHEDULER_TIMERS`: timed scenario triggers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SchedulerTimer {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub des: Option<String>,
    /// Scenario id fired by this timer.
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub sce: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub en: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
impl_record!(SchedulerTimer { des, sce, en });

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Holiday {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
impl_record!(Holiday {});

/// `CFG_ACCOUNTS`: panel users. `DACC` is the *disabled* flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Account {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub des: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub dacc: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
impl_record!(Account { des, dacc });

impl Account {
    pub fn is_enabled(&self) -> bool {
        self.dacc.as_deref() != Some("T")
    }
}

// ── StaticConfig ─────────────────────────────────────────────────────

/// The bulk `READ` result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticConfig {
    #[serde(rename = "OUTPUTS", default, deserialize_with = "one_or_many")]
    pub outputs: Vec<OutputConfig>,
    #[serde(rename = "BUS_HAS", default, deserialize_with = "one_or_many")]
    pub bus_has: Vec<BusDevice>,
    #[serde(rename = "SCENARIOS", default, deserialize_with = "one_or_many")]
    pub scenarios: Vec<ScenarioConfig>,
    #[serde(rename = "POWER_LINES", default, deserialize_with = "one_or_many")]
    pub power_lines: Vec<PowerLineConfig>,
    #[serde(rename = "PARTITIONS", default, deserialize_with = "one_or_many")]
    pub partitions: Vec<PartitionConfig>,
    #[serde(rename = "ZONES", default, deserialize_with = "one_or_many")]
    pub zones: Vec<ZoneConfig>,
    #[serde(rename = "STATUS_SYSTEM", default, deserialize_with = "one_or_many")]
    pub system: Vec<SystemStatus>,
    #[serde(rename = "CFG_SCHEDULER_TIMERS", default, deserialize_with = "one_or_many")]
    pub scheduler_timers: Vec<SchedulerTimer>,
    #[serde(rename = "CFG_HOLIDAYS", default, deserialize_with = "one_or_many")]
    pub holidays: Vec<Holiday>,
    #[serde(rename = "TEMPERATURES", default, deserialize_with = "one_or_many")]
    pub temperatures: Vec<ClimateSensor>,
    #[serde(rename = "HUMIDITY", default, deserialize_with = "one_or_many")]
    pub humidity: Vec<ClimateSensor>,
    #[serde(rename = "CFG_THERMOSTATS", default, deserialize_with = "one_or_many")]
    pub thermostats: Vec<ThermostatConfig>,
    #[serde(rename = "CFG_ACCOUNTS", default, deserialize_with = "one_or_many")]
    pub accounts: Vec<Account>,
}

impl StaticConfig {
    pub fn from_payload(payload: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        Self::deserialize(&Value::Object(payload.clone()))
    }

    pub fn thermostat(&self, id: &str) -> Option<&ThermostatConfig> {
        self.thermostats.iter().find(|t| t.id == id)
    }

    /// Numeric partition ids, sorted and deduplicated.
    pub fn partition_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .partitions
            .iter()
            .filter_map(|p| p.id.trim().parse().ok())
            .filter(|id| *id > 0)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Decode one section of a `READ` payload. An absent section is `None`
/// so pollers can tell "empty" from "not returned".
pub fn section<T: serde::de::DeserializeOwned>(
    payload: &Map<String, Value>,
    key: &str,
) -> Option<Vec<T>> {
    payload.get(key).map(super::record::records_from_value)
}

/// Log entries from a `LOGS_RES` payload.
pub fn log_entries(payload: &Map<String, Value>) -> Vec<LogEntry> {
    section(payload, "LOGS").unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn read_payload_decodes_sections() {
        let payload = json!({
            "RESULT": "OK",
            "OUTPUTS": [{"ID": "1", "DES": "Kitchen", "CAT": "LIGHT"}, {"ID": "2", "CAT": "ROLL"}],
            "PARTITIONS": [{"ID": "2"}, {"ID": "1"}, {"ID": "x"}],
            "ZONES": {"ID": "7", "DES": "Door", "PRT": 3, "STA": "R", "BYP": "NO"},
            "CFG_ACCOUNTS": [{"ID": "1", "DACC": "T"}],
        });
        let cfg = StaticConfig::from_payload(payload.as_object().unwrap()).unwrap();

        assert_eq!(cfg.outputs.len(), 2);
        assert!(cfg.outputs[0].is_category("LIGHT"));
        assert_eq!(cfg.zones[0].prt.as_deref(), Some("3"));
        assert_eq!(cfg.partition_ids(), vec![1, 2]);
        assert!(!cfg.accounts[0].is_enabled());
        assert!(cfg.thermostats.is_empty());
    }

    #[test]
    fn zone_compact_drops_descriptive_fields() {
        let zone: ZoneConfig =
            serde_json::from_value(json!({"ID": "4", "DES": "Hall", "STA": "A", "T": "N", "X": 1}))
                .unwrap();
        let compact = serde_json::to_value(zone.compact()).unwrap();
        assert_eq!(compact, json!({"ID": "4", "STA": "A", "T": "N"}));
    }

    #[test]
    fn scenario_label_prefers_description() {
        let s: ScenarioConfig = serde_json::from_value(json!({"ID": "3", "NM": "night"})).unwrap();
        assert_eq!(s.label(), "night");
        let s: ScenarioConfig = serde_json::from_value(json!({"ID": "3", "DES": ""})).unwrap();
        assert_eq!(s.label(), "3");
    }

    #[test]
    fn absent_section_is_none() {
        let payload = json!({"ZONES": []});
        let map = payload.as_object().unwrap();
        assert_eq!(section::<ZoneConfig>(map, "ZONES"), Some(Vec::new()));
        assert!(section::<Holiday>(map, "CFG_HOLIDAYS").is_none());
    }
}

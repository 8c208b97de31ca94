// ── Realtime status records ──
//
// Pushed by the panel under `STATUS_*` keys after a realtime
// registration. Updates are usually partial: only the fields that changed
// travel, so every record merges field-by-field into the snapshot.

use lares_api::frame::{lenient_opt_string, lenient_string};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::record::{impl_record, merge_by_id, one_or_many};

/// `STATUS_OUTPUTS`: lights, shutters and generic outputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct OutputStatus {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub sta: Option<String>,
    /// Dimmer level.
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub lev: Option<String>,
    /// Shutter position.
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub pos: Option<String>,
    /// Shutter target position.
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub tpos: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
impl_record!(OutputStatus { sta, lev, pos, tpos });

/// `STATUS_BUS_HA_SENSORS`: domotic bus sensors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct DomusStatus {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    /// Sensor readings (`TEM`, `HUM`, `LHT`, `PIR`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domus: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
impl_record!(DomusStatus { domus });

/// `STATUS_POWER_LINES`: energy meters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PowerLineStatus {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub pcons: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub pprod: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub sta: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
impl_record!(PowerLineStatus { pcons, pprod, sta });

/// `STATUS_PARTITIONS`: arming state per partition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PartitionStatus {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    /// Arming mode (`D`, `DA`, `IA`, ...).
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub arm: Option<String>,
    /// Alarm state.
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub ast: Option<String>,
    /// Tamper state.
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub tst: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
impl_record!(PartitionStatus { arm, ast, tst });

/// `STATUS_ZONES` push entries and zone poller deltas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ZoneStatus {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub sta: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub byp: Option<String>,
    /// Tamper.
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    /// Anti-masking.
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub an: Option<String>,
    /// Alarm memory.
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
impl_record!(ZoneStatus { sta, byp, t, an, a, fm, vas, ohm, cmd, byp_en });

/// `STATUS_SYSTEM`: plant-wide arming and temperatures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SystemStatus {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    /// `{S, D}` arming summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arm: Option<Value>,
    /// `{IN, OUT}` temperatures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
impl_record!(SystemStatus { arm, temp });

/// `STATUS_CONNECTION`: panel uplinks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ConnectionStatus {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
impl_record!(ConnectionStatus {});

/// `STATUS_TEMPERATURES` and `STATUS_HUMIDITY` entries, keyed by
/// thermostat id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ClimateStatus {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub temp: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub hum: Option<String>,
    /// Live thermostat block (`ACT_MODEL`, `OUT_STATUS`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub therm: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
impl_record!(ClimateStatus { temp, hum, therm });

// ── RealtimeSnapshot ─────────────────────────────────────────────────

/// Cumulative realtime state: the registration snapshot with every later
/// push merged in by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealtimeSnapshot {
    #[serde(rename = "STATUS_OUTPUTS", default, deserialize_with = "one_or_many")]
    pub outputs: Vec<OutputStatus>,
    #[serde(rename = "STATUS_BUS_HA_SENSORS", default, deserialize_with = "one_or_many")]
    pub domus: Vec<DomusStatus>,
    #[serde(rename = "STATUS_POWER_LINES", default, deserialize_with = "one_or_many")]
    pub power_lines: Vec<PowerLineStatus>,
    #[serde(rename = "STATUS_PARTITIONS", default, deserialize_with = "one_or_many")]
    pub partitions: Vec<PartitionStatus>,
    #[serde(rename = "STATUS_ZONES", default, deserialize_with = "one_or_many")]
    pub zones: Vec<ZoneStatus>,
    #[serde(rename = "STATUS_SYSTEM", default, deserialize_with = "one_or_many")]
    pub system: Vec<SystemStatus>,
    #[serde(rename = "STATUS_CONNECTION", default, deserialize_with = "one_or_many")]
    pub connection: Vec<ConnectionStatus>,
    #[serde(rename = "STATUS_TEMPERATURES", default, deserialize_with = "one_or_many")]
    pub temperatures: Vec<ClimateStatus>,
    #[serde(rename = "STATUS_HUMIDITY", default, deserialize_with = "one_or_many")]
    pub humidity: Vec<ClimateStatus>,
}

impl RealtimeSnapshot {
    /// Decode the payload answering a realtime registration. Some
    /// firmwares nest the sections under the receiver name.
    pub fn from_payload(payload: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        let has_sections = payload.keys().any(|k| k.starts_with("STATUS_"));
        let nested = payload
            .values()
            .filter_map(Value::as_object)
            .find(|body| body.keys().any(|k| k.starts_with("STATUS_")));
        let source = match nested {
            Some(body) if !has_sections => body,
            _ => payload,
        };
        Self::deserialize(&Value::Object(source.clone()))
    }

    pub fn merge_outputs(&mut self, updates: &[OutputStatus]) {
        merge_by_id(&mut self.outputs, updates);
    }

    pub fn merge_domus(&mut self, updates: &[DomusStatus]) {
        merge_by_id(&mut self.domus, updates);
    }

    pub fn merge_power_lines(&mut self, updates: &[PowerLineStatus]) {
        merge_by_id(&mut self.power_lines, updates);
    }

    pub fn merge_partitions(&mut self, updates: &[PartitionStatus]) {
        merge_by_id(&mut self.partitions, updates);
    }

    pub fn merge_zones(&mut self, updates: &[ZoneStatus]) {
        merge_by_id(&mut self.zones, updates);
    }

    pub fn merge_system(&mut self, updates: &[SystemStatus]) {
        merge_by_id(&mut self.system, updates);
    }

    pub fn merge_connection(&mut self, updates: &[ConnectionStatus]) {
        merge_by_id(&mut self.connection, updates);
    }

    pub fn merge_temperatures(&mut self, updates: &[ClimateStatus]) {
        merge_by_id(&mut self.temperatures, updates);
    }

    pub fn merge_humidity(&mut self, updates: &[ClimateStatus]) {
        merge_by_id(&mut self.humidity, updates);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn snapshot_decodes_flat_payload() {
        let snap = RealtimeSnapshot::from_payload(&map(json!({
            "RESULT": "OK",
            "STATUS_OUTPUTS": [{"ID": "1", "STA": "ON"}, {"ID": 2, "STA": "OFF", "LEV": 40}],
            "STATUS_SYSTEM": {"ID": "1", "ARM": {"S": "D"}},
        })))
        .unwrap();

        assert_eq!(snap.outputs.len(), 2);
        assert_eq!(snap.outputs[1].id, "2");
        assert_eq!(snap.outputs[1].lev.as_deref(), Some("40"));
        assert_eq!(snap.system.len(), 1);
        assert!(snap.zones.is_empty());
    }

    #[test]
    fn snapshot_decodes_nested_payload() {
        let snap = RealtimeSnapshot::from_payload(&map(json!({
            "HomeAssistant": {"STATUS_ZONES": [{"ID": "3", "STA": "R", "BYP": "NO"}]}
        })))
        .unwrap();
        assert_eq!(snap.zones[0].byp.as_deref(), Some("NO"));
    }

    #[test]
    fn unknown_fields_survive_in_extra() {
        let snap = RealtimeSnapshot::from_payload(&map(json!({
            "STATUS_OUTPUTS": [{"ID": "1", "STA": "ON", "VENDOR_X": 9}]
        })))
        .unwrap();
        assert_eq!(snap.outputs[0].extra["VENDOR_X"], 9);

        let back = serde_json::to_value(&snap.outputs[0]).unwrap();
        assert_eq!(back, json!({"ID": "1", "STA": "ON", "VENDOR_X": 9}));
    }
}

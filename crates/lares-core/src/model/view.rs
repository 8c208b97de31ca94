// ── Accessor views ──
//
// Static configuration joined with realtime state. Views serialize as a
// single flat object where realtime fields win over static ones, which is
// the shape downstream consumers expect.

use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use super::realtime::{ClimateStatus, OutputStatus, PartitionStatus, PowerLineStatus, ZoneStatus};
use super::static_config::{OutputConfig, PartitionConfig, PowerLineConfig, SchedulerTimer, ZoneConfig};
use super::thermostat::ThermostatConfig;

/// Default position reported for outputs without one.
pub const DEFAULT_POSITION: u32 = 255;

fn object<T: Serialize>(value: &T) -> Result<Map<String, Value>, serde_json::Error> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

/// Shallow overlay of `layers`, later layers winning.
fn overlay(layers: &[Map<String, Value>]) -> Map<String, Value> {
    let mut out = Map::new();
    for layer in layers {
        out.extend(layer.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    out
}

// ── Joined ───────────────────────────────────────────────────────────

/// A static record with its matching realtime state.
#[derive(Debug, Clone, PartialEq)]
pub struct Joined<C, S> {
    pub config: C,
    pub status: S,
}

impl<C: Serialize, S: Serialize> Joined<C, S> {
    pub fn to_map(&self) -> Result<Map<String, Value>, serde_json::Error> {
        Ok(overlay(&[object(&self.config)?, object(&self.status)?]))
    }
}

impl<C: Serialize, S: Serialize> Serialize for Joined<C, S> {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        self.to_map().map_err(Ser::Error::custom)?.serialize(serializer)
    }
}

// ── Outputs ──────────────────────────────────────────────────────────

/// Light or shutter with normalized state: lowercase `STA` and an
/// integer `POS`.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputView {
    pub output: Joined<OutputConfig, OutputStatus>,
    pub state: String,
    pub position: u32,
}

impl OutputView {
    pub fn new(output: Joined<OutputConfig, OutputStatus>) -> Self {
        let state = output
            .status
            .sta
            .as_deref()
            .unwrap_or("off")
            .to_lowercase();
        let position = output
            .status
            .pos
            .as_deref()
            .and_then(parse_position)
            .unwrap_or(DEFAULT_POSITION);
        Self {
            output,
            state,
            position,
        }
    }

    pub fn id(&self) -> &str {
        &self.output.config.id
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_position(raw: &str) -> Option<u32> {
    let p = raw.trim().parse::<f64>().ok()?;
    (p.is_finite() && p >= 0.0).then(|| p.trunc().min(f64::from(u32::MAX)) as u32)
}

impl Serialize for OutputView {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        let mut map = self.output.to_map().map_err(Ser::Error::custom)?;
        map.insert("STA".into(), Value::String(self.state.clone()));
        map.insert("POS".into(), Value::from(self.position));
        map.serialize(serializer)
    }
}

// ── Sensors ──────────────────────────────────────────────────────────

/// Sections served by [`sensors`](crate::Panel::sensors).
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum SensorKind {
    Zones,
    Partitions,
    PowerLines,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SensorList {
    Zones(Vec<Joined<ZoneConfig, ZoneStatus>>),
    Partitions(Vec<Joined<PartitionConfig, PartitionStatus>>),
    PowerLines(Vec<Joined<PowerLineConfig, PowerLineStatus>>),
}

impl SensorList {
    pub fn empty(kind: SensorKind) -> Self {
        match kind {
            SensorKind::Zones => Self::Zones(Vec::new()),
            SensorKind::Partitions => Self::Partitions(Vec::new()),
            SensorKind::PowerLines => Self::PowerLines(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Zones(v) => v.len(),
            Self::Partitions(v) => v.len(),
            Self::PowerLines(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Schedulers ───────────────────────────────────────────────────────

/// A timer with the label of the scenario it fires.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerView {
    pub timer: SchedulerTimer,
    pub scenario_name: Option<String>,
}

impl Serialize for SchedulerView {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        let mut map = object(&self.timer).map_err(Ser::Error::custom)?;
        if let Some(name) = &self.scenario_name {
            map.insert("SCE_NAME".into(), Value::String(name.clone()));
        }
        map.serialize(serializer)
    }
}

// ── Thermostats ──────────────────────────────────────────────────────

/// Configuration, temperature and humidity for one thermostat id.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermostatView {
    pub id: String,
    /// Probe name, used when the configuration carries none.
    pub name: Option<String>,
    pub config: Option<ThermostatConfig>,
    pub temperature: Option<ClimateStatus>,
    pub humidity: Option<ClimateStatus>,
}

impl ThermostatView {
    pub fn to_map(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let mut layers = vec![[("ID".to_owned(), Value::String(self.id.clone()))].into_iter().collect()];
        if let Some(cfg) = &self.config {
            layers.push(object(cfg)?);
        }
        if let Some(temp) = &self.temperature {
            layers.push(object(temp)?);
        }
        if let Some(hum) = &self.humidity {
            layers.push(object(hum)?);
        }
        let mut map = overlay(&layers);
        if let Some(name) = &self.name {
            map.entry("DES")
                .or_insert_with(|| Value::String(name.clone()));
        }
        Ok(map)
    }
}

impl Serialize for ThermostatView {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        self.to_map().map_err(Ser::Error::custom)?.serialize(serializer)
    }
}

// ── System ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SystemView {
    pub id: String,
    /// Arming summary, `{}` when unknown.
    pub arm: Value,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn light(status: Value) -> OutputView {
        OutputView::new(Joined {
            config: serde_json::from_value(json!({"ID": "1", "DES": "Hall", "CAT": "LIGHT", "STA": "stale"}))
                .unwrap(),
            status: serde_json::from_value(status).unwrap(),
        })
    }

    #[test]
    fn output_state_is_normalized() {
        let view = light(json!({"ID": "1", "STA": "ON", "POS": "40"}));
        assert_eq!(view.state, "on");
        assert_eq!(view.position, 40);

        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(
            value,
            json!({"ID": "1", "DES": "Hall", "CAT": "LIGHT", "STA": "on", "POS": 40})
        );
    }

    #[test]
    fn output_defaults() {
        let view = light(json!({"ID": "1"}));
        assert_eq!(view.state, "off");
        assert_eq!(view.position, DEFAULT_POSITION);
    }

    #[test]
    fn thermostat_view_layers_and_name() {
        let view = ThermostatView {
            id: "2".into(),
            name: Some("Living".into()),
            config: Some(serde_json::from_value(json!({"ID": "2", "ACT_MODE": "MAN"})).unwrap()),
            temperature: Some(serde_json::from_value(json!({"ID": "2", "TEMP": "20.5"})).unwrap()),
            humidity: Some(serde_json::from_value(json!({"ID": "2", "HUM": "40"})).unwrap()),
        };
        assert_eq!(
            serde_json::to_value(&view).unwrap(),
            json!({"ID": "2", "ACT_MODE": "MAN", "TEMP": "20.5", "HUM": "40", "DES": "Living"})
        );
    }

    #[test]
    fn scheduler_view_adds_scenario_name() {
        let view = SchedulerView {
            timer: serde_json::from_value(json!({"ID": "1", "SCE": "4"})).unwrap(),
            scenario_name: Some("Night".into()),
        };
        assert_eq!(
            serde_json::to_value(&view).unwrap(),
            json!({"ID": "1", "SCE": "4", "SCE_NAME": "Night"})
        );
    }
}

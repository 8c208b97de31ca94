// ── Thermostat configuration ──
//
// `CFG_THERMOSTATS` entries carry two season profiles with full weekly
// schedules. Writes send a compact object instead of the whole thing:
// the panel ignores oversized writes on some firmwares.

use lares_api::frame::{lenient_opt_string, lenient_string, value_to_string};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Setpoint thresholds and manual setpoint inside a season profile.
pub const SETPOINT_KEYS: [&str; 4] = ["T1", "T2", "T3", "TM"];

/// Weekly schedule tables; only sent when the caller supplied them.
pub const SCHEDULE_KEYS: [&str; 9] = ["MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN", "SD1", "SD2"];

/// Keys with dedicated handling in a write patch.
const MANAGED_KEYS: [&str; 7] = ["ID", "ACT_MODE", "ACT_SEA", "MAN_HRS", "TOF", "WIN", "SUM"];

/// Nested objects merged key-by-key rather than replaced.
const NESTED_KEYS: [&str; 3] = ["WIN", "SUM", "TOF"];

/// `WIN` / `SUM` profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SeasonProfile {
    #[serde(rename = "T1", default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub t1: Option<String>,
    #[serde(rename = "T2", default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub t2: Option<String>,
    #[serde(rename = "T3", default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub t3: Option<String>,
    #[serde(rename = "TM", default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub tm: Option<String>,
    /// Schedule tables and anything else.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SeasonProfile {
    fn setpoints(&self) -> Value {
        json!({"T1": self.t1, "T2": self.t2, "T3": self.t3, "TM": self.tm})
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ThermostatConfig {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    /// `OFF`, `MAN`, `MAN_TMR`, `WEEKLY`, `SD1`, `SD2`.
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub act_mode: Option<String>,
    /// `WIN` or `SUM`.
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub act_sea: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub man_hrs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub win: Option<SeasonProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum: Option<SeasonProfile>,
    /// Hysteresis and options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tof: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ThermostatConfig {
    fn season(&self, key: &str) -> Option<&SeasonProfile> {
        match key {
            "WIN" => self.win.as_ref(),
            "SUM" => self.sum.as_ref(),
            _ => None,
        }
    }

    /// Small projection used for change logging.
    pub fn digest(&self) -> Value {
        let tof = self.tof.as_ref();
        json!({
            "ID": self.id,
            "ACT_MODE": self.act_mode,
            "ACT_SEA": self.act_sea,
            "MAN_HRS": self.man_hrs,
            "WIN": self.win.as_ref().map(SeasonProfile::setpoints),
            "SUM": self.sum.as_ref().map(SeasonProfile::setpoints),
            "TOF": {
                "T": tof.and_then(|t| t.get("T")).cloned(),
                "E": tof.and_then(|t| t.get("E")).cloned(),
            },
        })
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .map(value_to_string)
        .filter(|s| !s.trim().is_empty())
}

fn object_of<'a>(value: Option<&'a Value>) -> Option<&'a Map<String, Value>> {
    value.and_then(Value::as_object)
}

/// Build the object written to `CFG_THERMOSTATS` for `patch`, starting
/// from the last known configuration `base`.
///
/// Season profiles are only written when patched, narrowed to the
/// setpoint keys plus any schedule tables the patch itself supplied.
pub fn compact_write(id: &str, base: Option<&ThermostatConfig>, patch: &Map<String, Value>) -> Map<String, Value> {
    let tid = non_empty_str(patch.get("ID"))
        .or_else(|| base.map(|b| b.id.clone()).filter(|s| !s.is_empty()))
        .unwrap_or_else(|| id.to_owned());

    let act_mode = non_empty_str(patch.get("ACT_MODE"))
        .or_else(|| base.and_then(|b| b.act_mode.clone()).filter(|s| !s.is_empty()))
        .unwrap_or_else(|| "OFF".to_owned())
        .to_ascii_uppercase();
    let mut act_sea = non_empty_str(patch.get("ACT_SEA"))
        .or_else(|| base.and_then(|b| b.act_sea.clone()).filter(|s| !s.is_empty()))
        .unwrap_or_else(|| "WIN".to_owned())
        .to_ascii_uppercase();
    if act_sea != "WIN" && act_sea != "SUM" {
        act_sea = "WIN".to_owned();
    }

    let mut out = Map::new();
    out.insert("ID".into(), Value::String(tid));
    out.insert("ACT_MODE".into(), Value::String(act_mode));
    out.insert("ACT_SEA".into(), Value::String(act_sea));

    let man_hrs = patch
        .get("MAN_HRS")
        .filter(|v| !v.is_null())
        .cloned()
        .or_else(|| base.and_then(|b| b.man_hrs.clone()).map(Value::String));
    if let Some(man_hrs) = man_hrs {
        out.insert("MAN_HRS".into(), man_hrs);
    }

    let tof = object_of(patch.get("TOF"))
        .cloned()
        .or_else(|| base.and_then(|b| b.tof.clone()));
    if let Some(tof) = tof.filter(|t| !t.is_empty()) {
        out.insert("TOF".into(), Value::Object(tof));
    }

    for key in ["WIN", "SUM"] {
        let Some(season_patch) = object_of(patch.get(key)) else {
            continue;
        };
        let mut merged = base
            .and_then(|b| b.season(key))
            .and_then(|s| serde_json::to_value(s).ok())
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();
        merged.extend(season_patch.clone());

        let mut compact: Map<String, Value> = merged
            .into_iter()
            .filter(|(k, _)| SETPOINT_KEYS.contains(&k.as_str()))
            .collect();
        for k in SCHEDULE_KEYS {
            if let Some(table) = season_patch.get(k) {
                compact.insert(k.to_owned(), table.clone());
            }
        }
        if !compact.is_empty() {
            out.insert(key.to_owned(), Value::Object(compact));
        }
    }

    for (k, v) in patch {
        if !MANAGED_KEYS.contains(&k.as_str()) {
            out.insert(k.clone(), v.clone());
        }
    }
    out
}

/// Apply `patch` to the cached entry for `id`, merging `WIN`/`SUM`/`TOF`
/// key-by-key. An unknown id is appended as the patch itself.
pub fn merge_patch(
    cached: &[ThermostatConfig],
    id: &str,
    patch: &Map<String, Value>,
) -> Result<Vec<ThermostatConfig>, serde_json::Error> {
    let mut found = false;
    let mut merged = Vec::with_capacity(cached.len() + 1);
    for cfg in cached {
        if cfg.id != id {
            merged.push(cfg.clone());
            continue;
        }
        found = true;
        let mut current = match serde_json::to_value(cfg)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (k, v) in patch {
            match (NESTED_KEYS.contains(&k.as_str()), v.as_object()) {
                (true, Some(inner)) => {
                    let mut nested = object_of(current.get(k)).cloned().unwrap_or_default();
                    nested.extend(inner.clone());
                    current.insert(k.clone(), Value::Object(nested));
                }
                _ => {
                    current.insert(k.clone(), v.clone());
                }
            }
        }
        merged.push(serde_json::from_value(Value::Object(current))?);
    }
    if !found {
        let mut fresh = patch.clone();
        fresh
            .entry("ID")
            .or_insert_with(|| Value::String(id.to_owned()));
        merged.push(serde_json::from_value(Value::Object(fresh))?);
    }
    Ok(merged)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn base() -> ThermostatConfig {
        serde_json::from_value(json!({
            "ID": "3",
            "ACT_MODE": "WEEKLY",
            "ACT_SEA": "WIN",
            "MAN_HRS": "2",
            "WIN": {"TM": "20.0", "MON": [{"S": "1", "TY": "T1"}], "SD1": []},
            "SUM": {"T1": "26", "TM": "25.0"},
            "TOF": {"T": "0.5", "E": "F"},
        }))
        .unwrap()
    }

    fn patch(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn manual_setpoint_write_is_compact() {
        let out = compact_write(
            "3",
            Some(&base()),
            &patch(json!({"ACT_MODE": "MAN", "WIN": {"TM": "21.5"}})),
        );
        assert_eq!(
            Value::Object(out),
            json!({
                "ID": "3",
                "ACT_MODE": "MAN",
                "ACT_SEA": "WIN",
                "MAN_HRS": "2",
                "TOF": {"T": "0.5", "E": "F"},
                "WIN": {"TM": "21.5"},
            })
        );
    }

    #[test]
    fn explicit_schedule_tables_are_kept() {
        let out = compact_write(
            "3",
            Some(&base()),
            &patch(json!({"SUM": {"TUE": [{"S": "2"}]}, "LABEL": "x"})),
        );
        assert_eq!(
            out["SUM"],
            json!({"T1": "26", "TM": "25.0", "TUE": [{"S": "2"}]})
        );
        assert_eq!(out["LABEL"], "x");
        assert!(!out.contains_key("WIN"));
    }

    #[test]
    fn defaults_without_base() {
        let out = compact_write("9", None, &patch(json!({"ACT_SEA": "spring", "act": 1})));
        assert_eq!(out["ID"], "9");
        assert_eq!(out["ACT_MODE"], "OFF");
        assert_eq!(out["ACT_SEA"], "WIN");
        assert!(!out.contains_key("MAN_HRS"));
    }

    #[test]
    fn local_merge_keeps_nested_fields() {
        let merged = merge_patch(
            &[base()],
            "3",
            &patch(json!({"ACT_MODE": "MAN", "WIN": {"TM": "22"}})),
        )
        .unwrap();
        let win = merged[0].win.as_ref().unwrap();
        assert_eq!(merged[0].act_mode.as_deref(), Some("MAN"));
        assert_eq!(win.tm.as_deref(), Some("22"));
        assert!(win.extra.contains_key("MON"));
    }

    #[test]
    fn local_merge_appends_unknown_id() {
        let merged = merge_patch(&[base()], "4", &patch(json!({"ACT_MODE": "OFF"}))).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].id, "4");
    }
}

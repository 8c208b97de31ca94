// ── Event log entries ──

use lares_api::frame::{lenient_opt_string, lenient_string};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entry of the panel's main event log. `ID` is a sequence number
/// that only grows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct LogEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(rename = "TYPE", default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub ev: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub i1: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub i2: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LogEntry {
    /// Sequence number, `None` when the panel sent something unparsable.
    pub fn seq(&self) -> Option<u64> {
        self.id.trim().parse().ok()
    }
}

/// Highest sequence number in `entries`.
pub fn max_seq(entries: &[LogEntry]) -> Option<u64> {
    entries.iter().filter_map(LogEntry::seq).max()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn seq_parses_numeric_ids_only() {
        let entries: Vec<LogEntry> = serde_json::from_value(json!([
            {"ID": 41, "TYPE": "ARM", "EV": "Armed"},
            {"ID": "42"},
            {"ID": "n/a"},
        ]))
        .unwrap();
        assert_eq!(entries[0].typ.as_deref(), Some("ARM"));
        assert_eq!(entries[2].seq(), None);
        assert_eq!(max_seq(&entries), Some(42));
    }
}

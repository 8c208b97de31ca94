// ── Record plumbing shared by every panel entity ──
//
// Panel entities are flat JSON objects keyed by a string `ID`. Every
// typed record names the fields the bridge reads and keeps the rest in a
// flattened `extra` map, so nothing the panel sends is lost on a
// round-trip.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A typed panel entity that can be merged by identity.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn id(&self) -> &str;

    /// Overlay every field present in `patch`. Absent fields keep their
    /// current value, so applying the same patch twice is a no-op.
    fn merge(&mut self, patch: &Self);
}

/// Implement [`Record`] for a struct with an `id: String`, a set of
/// `Option` fields and an `extra` map.
macro_rules! impl_record {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::model::record::Record for $ty {
            fn id(&self) -> &str {
                &self.id
            }

            fn merge(&mut self, patch: &Self) {
                $(
                    if patch.$field.is_some() {
                        self.$field.clone_from(&patch.$field);
                    }
                )*
                for (key, value) in &patch.extra {
                    self.extra.insert(key.clone(), value.clone());
                }
            }
        }
    };
}
pub(crate) use impl_record;

/// Merge `updates` into `current` by id. Unknown ids are appended in
/// arrival order.
pub fn merge_by_id<T: Record>(current: &mut Vec<T>, updates: &[T]) {
    for update in updates {
        match current.iter_mut().find(|r| r.id() == update.id()) {
            Some(existing) => existing.merge(update),
            None => current.push(update.clone()),
        }
    }
}

/// Decode a section that may arrive as a list, as a single object, or as
/// something unusable. Entries that fail to decode are skipped.
pub fn records_from_value<T: DeserializeOwned>(value: &Value) -> Vec<T> {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(_) => std::slice::from_ref(value),
        _ => return Vec::new(),
    };
    items
        .iter()
        .filter_map(|item| match T::deserialize(item) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed record");
                None
            }
        })
        .collect()
}

/// `deserialize_with` adapter for [`records_from_value`].
pub fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(records_from_value(&value))
}

/// Sort key that orders numeric ids numerically and everything else
/// after them, lexically.
pub fn id_order(id: &str) -> (u8, u64, String) {
    match id.trim().parse::<u64>() {
        Ok(n) => (0, n, String::new()),
        Err(_) => (1, 0, id.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::model::OutputStatus;

    #[test]
    fn single_object_is_a_one_element_list() {
        let one: Vec<OutputStatus> = records_from_value(&json!({"ID": "1", "STA": "ON"}));
        let many: Vec<OutputStatus> = records_from_value(&json!([{"ID": "1", "STA": "ON"}]));
        assert_eq!(one, many);
        assert_eq!(one.len(), 1);
    }

    #[test]
    fn scalars_yield_nothing() {
        let none: Vec<OutputStatus> = records_from_value(&json!("STATUS_OUTPUTS"));
        assert!(none.is_empty());
    }

    #[test]
    fn partial_merge_keeps_untouched_fields() {
        let mut current: Vec<OutputStatus> =
            records_from_value(&json!([{"ID": "1", "STA": "ON", "POS": "40"}]));
        let patch: Vec<OutputStatus> = records_from_value(&json!([{"ID": "1", "POS": "60"}]));

        merge_by_id(&mut current, &patch);
        let once = current.clone();
        merge_by_id(&mut current, &patch);

        assert_eq!(current, once);
        assert_eq!(current[0].sta.as_deref(), Some("ON"));
        assert_eq!(current[0].pos.as_deref(), Some("60"));
    }

    #[test]
    fn unknown_ids_are_appended() {
        let mut current: Vec<OutputStatus> = records_from_value(&json!([{"ID": "1"}]));
        let patch: Vec<OutputStatus> = records_from_value(&json!({"ID": "2", "STA": "OFF"}));
        merge_by_id(&mut current, &patch);
        let ids: Vec<&str> = current.iter().map(Record::id).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn numeric_ids_sort_first() {
        let mut ids = vec!["10", "b", "2", "a"];
        ids.sort_by_key(|id| id_order(id));
        assert_eq!(ids, vec!["2", "10", "a", "b"]);
    }
}

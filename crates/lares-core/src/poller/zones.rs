// ── Zones poller ──
//
// Some firmwares never push bypass, tamper or mask changes through
// STATUS_ZONES, so the zone list is re-read and diffed against the
// previous read.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::debug;

use super::Poller;
use crate::error::CoreError;
use crate::model::static_config::section;
use crate::model::{StreamUpdate, ZoneConfig, ZoneStatus};
use crate::panel::Panel;

const PERIOD: Duration = Duration::from_secs(5);

/// Keep only the fields of `current` that differ from `prev`. A field that
/// disappeared is not a change. `None` when no field is left to report.
fn changed_fields(prev: &ZoneStatus, current: &ZoneStatus) -> Option<ZoneStatus> {
    let mut patch = ZoneStatus {
        id: current.id.clone(),
        ..ZoneStatus::default()
    };
    let mut changed = false;
    macro_rules! diff {
        ($($field:ident),*) => {
            $(
                if current.$field.is_some() && prev.$field != current.$field {
                    patch.$field.clone_from(&current.$field);
                    changed = true;
                }
            )*
        };
    }
    diff!(sta, byp, t, an, a, fm, vas, ohm, cmd, byp_en);
    changed.then_some(patch)
}

/// Compact status for every zone of `zones`, and the updates to emit
/// against `last`: the full projection for new zones, the changed fields
/// for known ones.
pub fn diff_zones(
    zones: &[ZoneConfig],
    last: &HashMap<String, ZoneStatus>,
) -> (HashMap<String, ZoneStatus>, Vec<ZoneStatus>) {
    let mut current = HashMap::with_capacity(zones.len());
    let mut updates = Vec::new();
    for zone in zones.iter().filter(|z| !z.id.is_empty()) {
        let compact = zone.compact();
        match last.get(&zone.id) {
            None => updates.push(compact.clone()),
            Some(prev) => updates.extend(changed_fields(prev, &compact)),
        }
        current.insert(zone.id.clone(), compact);
    }
    (current, updates)
}

#[derive(Default)]
pub(crate) struct ZonesPoller {
    last_by_id: HashMap<String, ZoneStatus>,
}

impl Poller for ZonesPoller {
    fn name(&self) -> &'static str {
        "zones"
    }

    fn period(&self) -> Duration {
        PERIOD
    }

    fn poll<'a>(&'a mut self, panel: &'a Panel) -> BoxFuture<'a, Result<(), CoreError>> {
        async move {
            let payload = panel
                .with_link(|link, dispatch| link.read_zones(dispatch).boxed())
                .await?;
            let Some(zones) = section::<ZoneConfig>(&payload, "ZONES") else {
                return Ok(());
            };

            let (current, updates) = diff_zones(&zones, &self.last_by_id);
            self.last_by_id = current;

            let store = panel.store();
            store.update_static(|cfg| cfg.zones = zones);
            if updates.is_empty() {
                return Ok(());
            }
            debug!(changed = updates.len(), "zones changed");
            store.update_realtime(|snapshot| snapshot.merge_zones(&updates));
            panel.notify(&StreamUpdate::Zones(updates));
            Ok(())
        }
        .boxed()
    }
}

pub(crate) async fn zones_task(panel: Panel) {
    super::run(panel, ZonesPoller::default()).await;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn zones(value: serde_json::Value) -> Vec<ZoneConfig> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn first_read_emits_full_projection() {
        let read = zones(json!([{"ID": "1", "DES": "Door", "STA": "R", "BYP": "NO"}]));
        let (current, updates) = diff_zones(&read, &HashMap::new());
        assert_eq!(current.len(), 1);
        assert_eq!(updates, vec![read[0].compact()]);
    }

    #[test]
    fn later_reads_emit_only_changed_fields() {
        let first = zones(json!([
            {"ID": "1", "STA": "R", "BYP": "NO", "T": "N"},
            {"ID": "2", "STA": "R", "BYP": "NO", "T": "N"},
        ]));
        let second = zones(json!([
            {"ID": "1", "STA": "R", "BYP": "NO", "T": "N"},
            {"ID": "2", "STA": "R", "BYP": "AUTO", "T": "N"},
        ]));
        let (last, _) = diff_zones(&first, &HashMap::new());
        let (_, updates) = diff_zones(&second, &last);

        assert_eq!(
            updates,
            vec![ZoneStatus {
                id: "2".into(),
                byp: Some("AUTO".into()),
                ..ZoneStatus::default()
            }]
        );
    }

    #[test]
    fn vanished_field_emits_nothing() {
        let first = zones(json!([{"ID": "1", "STA": "R", "BYP": "NO"}]));
        let second = zones(json!([{"ID": "1", "STA": "R"}]));
        let (last, _) = diff_zones(&first, &HashMap::new());
        let (current, updates) = diff_zones(&second, &last);
        assert!(updates.is_empty());
        assert_eq!(current["1"].byp, None);
    }

    #[test]
    fn unchanged_read_emits_nothing() {
        let read = zones(json!([{"ID": "1", "STA": "A"}, {"DES": "no id"}]));
        let (last, _) = diff_zones(&read, &HashMap::new());
        let (current, updates) = diff_zones(&read, &last);
        assert!(updates.is_empty());
        assert_eq!(current.len(), 1);
    }
}

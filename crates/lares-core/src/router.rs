// ── Realtime message router ──
//
// Every inbound frame that is not the reply to an in-progress request
// ends up here: command results resolve the pending table, realtime
// pushes are merged into the snapshot and fanned out to listeners.

use std::sync::Arc;

use lares_api::Frame;
use lares_api::frame::cmd;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::listeners::ListenerRegistry;
use crate::model::record::records_from_value;
use crate::model::{RealtimeSnapshot, StreamUpdate};
use crate::pending::PendingTable;
use crate::store::PanelStore;

/// Items included in verbose output samples.
const OUTPUT_SAMPLE: usize = 12;
const SYSTEM_SAMPLE: usize = 6;
const OUTPUT_SAMPLE_KEYS: [&str; 6] = ["STA", "LEV", "DIM", "POS", "TYP", "CAT"];

pub struct Router {
    listeners: ListenerRegistry,
    pending: Arc<PendingTable>,
    store: Arc<PanelStore>,
    output_debug_verbose: bool,
}

impl Router {
    pub fn new(
        listeners: ListenerRegistry,
        pending: Arc<PendingTable>,
        store: Arc<PanelStore>,
        output_debug_verbose: bool,
    ) -> Self {
        Self {
            listeners,
            pending,
            store,
            output_debug_verbose,
        }
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Fan `update` out to its listener lists.
    pub fn notify(&self, update: &StreamUpdate) {
        self.listeners.notify(update);
    }

    pub fn route(&self, frame: Frame) {
        match frame.cmd.as_str() {
            cmd::CMD_USR_RES => {
                self.pending.resolve(&frame.id, &frame.payload);
            }
            cmd::REALTIME | cmd::REALTIME_RES => {
                let body = realtime_body(&frame);
                self.apply_realtime(&body);
            }
            other => {
                tracing::debug!(cmd = %other, id = %frame.id, "dropping unrouted frame");
            }
        }
    }

    /// Merge every status section of `body` into the snapshot and notify.
    pub fn apply_realtime(&self, body: &Map<String, Value>) {
        if let Some(raw) = body.get("STATUS_OUTPUTS") {
            let updates = records(raw);
            if self.output_debug_verbose {
                log_sample(raw, "STATUS_OUTPUTS", OUTPUT_SAMPLE, |item| {
                    let mut row = Map::new();
                    row.insert("ID".into(), item.get("ID").cloned().unwrap_or(Value::Null));
                    for key in OUTPUT_SAMPLE_KEYS {
                        if let Some(v) = item.get(key) {
                            row.insert(key.into(), v.clone());
                        }
                    }
                    Value::Object(row)
                });
            }
            self.publish(updates, RealtimeSnapshot::merge_outputs, StreamUpdate::Outputs);
        }

        if let Some(raw) = body.get("STATUS_BUS_HA_SENSORS") {
            self.publish(records(raw), RealtimeSnapshot::merge_domus, StreamUpdate::Domus);
        }

        if let Some(raw) = body.get("STATUS_POWER_LINES") {
            self.publish(
                records(raw),
                RealtimeSnapshot::merge_power_lines,
                StreamUpdate::PowerLines,
            );
        }

        // some firmwares push PARTITIONS instead of STATUS_PARTITIONS
        if let Some(raw) = body
            .get("STATUS_PARTITIONS")
            .or_else(|| body.get("PARTITIONS"))
        {
            self.publish(
                records(raw),
                RealtimeSnapshot::merge_partitions,
                StreamUpdate::Partitions,
            );
        }

        if let Some(raw) = body.get("STATUS_ZONES") {
            self.publish(records(raw), RealtimeSnapshot::merge_zones, StreamUpdate::Zones);
        }

        if let Some(raw) = body.get("STATUS_SYSTEM") {
            if self.output_debug_verbose {
                log_sample(raw, "STATUS_SYSTEM", SYSTEM_SAMPLE, |item| {
                    let arm = item.get("ARM");
                    let temp = item.get("TEMP");
                    json!({
                        "ID": item.get("ID"),
                        "ARM": {"S": arm.and_then(|a| a.get("S")), "D": arm.and_then(|a| a.get("D"))},
                        "TEMP": {"IN": temp.and_then(|t| t.get("IN")), "OUT": temp.and_then(|t| t.get("OUT"))},
                    })
                });
            }
            self.publish(records(raw), RealtimeSnapshot::merge_system, StreamUpdate::Systems);
        }

        if let Some(raw) = body.get("STATUS_CONNECTION") {
            self.publish(
                records(raw),
                RealtimeSnapshot::merge_connection,
                StreamUpdate::Connection,
            );
        }

        if let Some(raw) = body.get("STATUS_TEMPERATURES") {
            self.publish(
                records(raw),
                RealtimeSnapshot::merge_temperatures,
                StreamUpdate::Climate,
            );
        }

        if let Some(raw) = body.get("STATUS_HUMIDITY") {
            self.publish(
                records(raw),
                RealtimeSnapshot::merge_humidity,
                StreamUpdate::Climate,
            );
        }
    }

    fn publish<T>(
        &self,
        updates: Vec<T>,
        merge: fn(&mut RealtimeSnapshot, &[T]),
        wrap: fn(Vec<T>) -> StreamUpdate,
    ) {
        if updates.is_empty() {
            return;
        }
        self.store.update_realtime(|snapshot| merge(snapshot, &updates));
        self.listeners.notify(&wrap(updates));
    }
}

fn records<T: DeserializeOwned>(raw: &Value) -> Vec<T> {
    records_from_value(raw)
}

/// The object carrying the status sections: the payload itself when it
/// holds them directly, else the body addressed to this client.
pub fn realtime_body(frame: &Frame) -> Map<String, Value> {
    match frame.payload_object() {
        Some(payload) if payload.keys().any(|k| k.starts_with("STATUS_")) => payload.clone(),
        _ => frame.addressed_body(),
    }
}

fn log_sample(raw: &Value, section: &str, limit: usize, row: impl Fn(&Map<String, Value>) -> Value) {
    let items: Vec<&Map<String, Value>> = match raw {
        Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
        Value::Object(item) => vec![item],
        _ => {
            tracing::info!(section, "realtime push with unexpected shape");
            return;
        }
    };
    let sample = Value::Array(items.iter().take(limit).map(|item| row(item)).collect());
    tracing::info!(section, n = items.len(), sample = %sample, "realtime push");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::command::CommandKind;
    use crate::model::StreamKind;
    use crate::pending::PendingCommand;

    fn router(listeners: ListenerRegistry) -> (Router, Arc<PendingTable>, Arc<PanelStore>) {
        let pending = Arc::new(PendingTable::new());
        let store = Arc::new(PanelStore::new());
        let router = Router::new(listeners, Arc::clone(&pending), Arc::clone(&store), true);
        (router, pending, store)
    }

    fn frame(value: Value) -> Frame {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn partial_push_merges_and_fans_out() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut listeners = ListenerRegistry::new();
        let log = Arc::clone(&seen);
        listeners.register(StreamKind::Lights, move |update| {
            log.lock().unwrap().push(update.clone());
            Ok(())
        });
        let (router, _, store) = router(listeners);

        router.route(frame(json!({
            "CMD": "REALTIME",
            "PAYLOAD": {"HomeAssistant": {"STATUS_OUTPUTS": [{"ID": "1", "STA": "ON", "POS": "100"}]}}
        })));
        let partial = json!({
            "CMD": "REALTIME",
            "PAYLOAD": {"HomeAssistant": {"STATUS_OUTPUTS": {"ID": "1", "POS": "40"}}}
        });
        router.route(frame(partial.clone()));
        router.route(frame(partial));

        let snapshot = store.realtime().unwrap();
        assert_eq!(snapshot.outputs.len(), 1);
        assert_eq!(snapshot.outputs[0].sta.as_deref(), Some("ON"));
        assert_eq!(snapshot.outputs[0].pos.as_deref(), Some("40"));
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn partitions_fallback_key() {
        let (router, _, store) = router(ListenerRegistry::new());
        router.route(frame(json!({
            "CMD": "REALTIME",
            "PAYLOAD": {"7": {"PARTITIONS": [{"ID": "1", "ARM": "D"}]}}
        })));
        assert_eq!(store.realtime().unwrap().partitions[0].arm.as_deref(), Some("D"));
    }

    #[tokio::test]
    async fn command_results_never_reach_listeners() {
        let hits = Arc::new(Mutex::new(0));
        let mut listeners = ListenerRegistry::new();
        let count = Arc::clone(&hits);
        listeners.register(StreamKind::Zones, move |_| {
            *count.lock().unwrap() += 1;
            Ok(())
        });
        let (router, pending, _) = router(listeners);

        let (entry, rx) = PendingCommand::new(
            "3",
            CommandKind::Bypass,
            tokio::time::Instant::now() + std::time::Duration::from_secs(20),
        );
        pending.insert("5", entry);

        router.route(frame(json!({
            "CMD": "CMD_USR_RES", "ID": "5",
            "PAYLOAD": {"HomeAssistant": {"RESULT": "OK", "STATUS_ZONES": [{"ID": "3"}]}}
        })));

        assert!(rx.await.unwrap());
        assert_eq!(*hits.lock().unwrap(), 0);
    }

    #[test]
    fn verbose_output_push_logs_a_sample() {
        #[derive(Clone, Default)]
        struct Sink(Arc<Mutex<Vec<u8>>>);
        impl std::io::Write for Sink {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let sink = Sink::default();
        let writer = sink.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let (router, _, store) = router(ListenerRegistry::new());

        tracing::subscriber::with_default(subscriber, || {
            router.route(frame(json!({
                "CMD": "REALTIME",
                "PAYLOAD": {"HomeAssistant": {"STATUS_OUTPUTS": [{"ID": "4", "STA": "OFF", "CAT": "LIGHT", "MOD": "x"}]}}
            })));
        });

        let logged = String::from_utf8_lossy(&sink.0.lock().unwrap()).into_owned();
        assert!(logged.contains("realtime push"), "{logged}");
        assert!(logged.contains(r#"sample=[{"ID":"4","STA":"OFF","CAT":"LIGHT"}]"#), "{logged}");
        assert_eq!(store.realtime().unwrap().outputs.len(), 1);
    }

    #[test]
    fn other_commands_are_dropped() {
        let (router, _, store) = router(ListenerRegistry::new());
        router.route(frame(json!({"CMD": "READ_RES", "ID": "9", "PAYLOAD": {"STATUS_ZONES": []}})));
        assert!(store.realtime().is_none());
    }
}

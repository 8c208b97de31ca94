// ── Pending command table ──
//
// `CMD_USR` requests are answered by a later `CMD_USR_RES` carrying the
// same correlation id. Each in-flight request parks a oneshot here until
// the router resolves it or the sweeper expires it.

use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::command::CommandKind;

/// One `CMD_USR` awaiting its result.
#[derive(Debug)]
pub struct PendingCommand {
    pub entity_id: String,
    pub kind: CommandKind,
    pub deadline: Instant,
    tx: oneshot::Sender<bool>,
}

impl PendingCommand {
    pub fn new(
        entity_id: impl Into<String>,
        kind: CommandKind,
        deadline: Instant,
    ) -> (Self, oneshot::Receiver<bool>) {
        let (tx, rx) = oneshot::channel();
        let pending = Self {
            entity_id: entity_id.into(),
            kind,
            deadline,
            tx,
        };
        (pending, rx)
    }

    /// Deliver the outcome. The waiter may already have given up.
    pub fn complete(self, ok: bool) {
        let _ = self.tx.send(ok);
    }
}

/// In-flight commands keyed by correlation id.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: DashMap<String, PendingCommand>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: impl Into<String>, pending: PendingCommand) {
        self.entries.insert(id.into(), pending);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn remove(&self, id: &str) -> Option<PendingCommand> {
        self.entries.remove(id).map(|(_, p)| p)
    }

    /// Resolve a `CMD_USR_RES` with correlation id `id` and `payload`.
    ///
    /// When nothing is registered under `id` but exactly one command is
    /// pending, that command takes the reply. This is only sound because
    /// the dispatcher keeps a single `CMD_USR` in flight.
    ///
    /// Returns the resolved correlation id and outcome.
    pub fn resolve(&self, id: &str, payload: &Value) -> Option<(String, bool)> {
        let (key, pending) = match self.entries.remove(id) {
            Some(entry) => entry,
            None => {
                let Some(only) = self.sole_key() else {
                    if self.entries.is_empty() {
                        tracing::warn!(id = %id, "command response with no pending command");
                    } else {
                        tracing::warn!(id = %id, pending = self.entries.len(), "command response for unknown id");
                    }
                    return None;
                };
                tracing::warn!(got = %id, pending = %only, "command response id mismatch, accepting reply");
                self.entries.remove(&only)?
            }
        };

        let ok = command_succeeded(payload, pending.kind);
        tracing::debug!(
            id = %key,
            entity = %pending.entity_id,
            kind = ?pending.kind,
            ok,
            "command resolved"
        );
        pending.complete(ok);
        Some((key, ok))
    }

    /// Fail and drop every entry whose deadline has passed.
    pub fn sweep(&self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.deadline <= now)
            .map(|e| e.key().clone())
            .collect();
        for id in &expired {
            if let Some(pending) = self.remove(id) {
                tracing::warn!(id = %id, entity = %pending.entity_id, "pending command expired");
                pending.complete(false);
            }
        }
        expired.len()
    }

    /// Fail every entry; used when the connection goes away.
    pub fn fail_all(&self) {
        let ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some(pending) = self.remove(&id) {
                pending.complete(false);
            }
        }
    }

    /// The key of the only entry, collected before any removal so no
    /// shard guard is held across it.
    fn sole_key(&self) -> Option<String> {
        if self.entries.len() != 1 {
            return None;
        }
        self.entries.iter().next().map(|e| e.key().clone())
    }
}

// ── Result extraction ────────────────────────────────────────────────

/// Outcome of a `CMD_USR_RES` payload for a command of `kind`.
///
/// `RESULT` is looked up at the payload root, then under the addressed
/// body, then in any nested object. Any present `RESULT` other than "OK",
/// null included, is a failure. A missing one fails closed for
/// security-sensitive commands and succeeds otherwise.
pub fn command_succeeded(payload: &Value, kind: CommandKind) -> bool {
    match find_result(payload) {
        Some(result) => result.trim().eq_ignore_ascii_case("OK"),
        None => {
            if kind.fails_closed() {
                tracing::warn!(kind = ?kind, "command response without RESULT, treating as failure");
                false
            } else {
                true
            }
        }
    }
}

fn find_result(payload: &Value) -> Option<String> {
    let root = payload.as_object()?;
    if let Some(result) = result_of(root) {
        return Some(result);
    }
    if let Some(body) = root.get(lares_api::CLIENT_NAME).and_then(Value::as_object) {
        if let Some(result) = result_of(body) {
            return Some(result);
        }
    }
    root.values()
        .filter_map(Value::as_object)
        .find_map(result_of)
}

fn result_of(map: &Map<String, Value>) -> Option<String> {
    map.get("RESULT").map(lares_api::frame::value_to_string)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio_test::{assert_pending, assert_ready, task};

    use super::*;

    fn park(table: &PendingTable, id: &str, kind: CommandKind) -> oneshot::Receiver<bool> {
        let (pending, rx) = PendingCommand::new("5", kind, Instant::now() + Duration::from_secs(20));
        table.insert(id, pending);
        rx
    }

    #[tokio::test]
    async fn matching_id_resolves() {
        let table = PendingTable::new();
        let rx = park(&table, "7", CommandKind::Output);
        assert_eq!(
            table.resolve("7", &json!({"RESULT": "OK"})),
            Some(("7".to_owned(), true))
        );
        assert!(rx.await.unwrap());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn single_pending_mismatch_is_accepted() {
        let table = PendingTable::new();
        let rx = park(&table, "7", CommandKind::Output);
        assert_eq!(
            table.resolve("99", &json!({"RESULT": " ok "})),
            Some(("7".to_owned(), true))
        );
        assert!(rx.await.unwrap());
    }

    #[test]
    fn waiter_stays_pending_until_resolved() {
        let table = PendingTable::new();
        let mut waiter = task::spawn(park(&table, "7", CommandKind::Output));
        assert_pending!(waiter.poll());

        table.resolve("7", &json!({"RESULT": "FAIL"}));
        assert!(waiter.is_woken());
        assert_eq!(assert_ready!(waiter.poll()), Ok(false));
    }

    #[test]
    fn fail_all_releases_waiters() {
        let table = PendingTable::new();
        let mut waiter = task::spawn(park(&table, "7", CommandKind::Output));
        assert_pending!(waiter.poll());

        table.fail_all();
        assert_eq!(assert_ready!(waiter.poll()), Ok(false));
        assert!(table.is_empty());
    }

    #[test]
    fn no_pending_drops_response() {
        let table = PendingTable::new();
        assert_eq!(table.resolve("3", &json!({"RESULT": "OK"})), None);
    }

    #[test]
    fn ambiguous_mismatch_is_dropped() {
        let table = PendingTable::new();
        let _a = park(&table, "7", CommandKind::Output);
        let _b = park(&table, "8", CommandKind::Output);
        assert_eq!(table.resolve("9", &json!({"RESULT": "OK"})), None);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn missing_result_fails_closed_for_security_commands() {
        let payload = json!({"OTHER": 1});
        assert!(!command_succeeded(&payload, CommandKind::Partition));
        assert!(!command_succeeded(&payload, CommandKind::Bypass));
        assert!(!command_succeeded(&payload, CommandKind::Scenario));
        assert!(command_succeeded(&payload, CommandKind::Output));
    }

    #[test]
    fn result_found_in_nested_shapes() {
        assert!(command_succeeded(
            &json!({"HomeAssistant": {"RESULT": "OK"}}),
            CommandKind::Partition
        ));
        assert!(!command_succeeded(
            &json!({"0": {"RESULT": "FAIL"}}),
            CommandKind::Output
        ));
    }

    #[test]
    fn null_result_is_a_failure() {
        assert!(!command_succeeded(&json!({"RESULT": null}), CommandKind::Output));
        assert!(!command_succeeded(
            &json!({"HomeAssistant": {"RESULT": null}}),
            CommandKind::Output
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_expires_overdue_entries() {
        let table = PendingTable::new();
        let rx = park(&table, "4", CommandKind::Scenario);
        assert_eq!(table.sweep(Instant::now()), 0);

        tokio::time::advance(Duration::from_secs(21)).await;
        assert_eq!(table.sweep(Instant::now()), 1);
        assert!(!rx.await.unwrap());
    }
}

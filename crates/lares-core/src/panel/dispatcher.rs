// ── Command dispatcher ──
//
// Drains the command queue one entry at a time. User commands are sent
// as `CMD_USR` and wait for their correlated result; typed commands are
// full write round trips that also patch the static snapshot.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use lares_api::UserAction;
use secrecy::SecretString;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};
use tracing::{debug, error, info, warn};

use super::Panel;
use crate::command::{ClearKind, PanelCommand, QueuedCommand};
use crate::error::CoreError;
use crate::model::record::merge_by_id;
use crate::model::static_config::section;
use crate::model::thermostat::{compact_write, merge_patch};
use crate::model::{Account, SchedulerTimer, StreamUpdate, ThermostatConfig};
use crate::pending::PendingCommand;

/// How long a `CMD_USR` stays in the pending table.
const PENDING_TTL: Duration = Duration::from_secs(20);
/// How long the dispatcher waits for a `CMD_USR_RES`.
const RESULT_WAIT: Duration = Duration::from_secs(15);
const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

pub(super) async fn dispatcher_task(panel: Panel, mut rx: mpsc::UnboundedReceiver<QueuedCommand>) {
    loop {
        let queued = tokio::select! {
            biased;
            () = panel.cancel_token().cancelled() => break,
            queued = rx.recv() => match queued {
                Some(queued) => queued,
                None => break,
            },
        };

        if !panel.wait_running().await {
            let _ = queued.responder.send(false);
            break;
        }
        if queued.responder.is_closed() {
            debug!(entity = %queued.entity_id, "caller gave up, skipping command");
            continue;
        }

        let QueuedCommand {
            entity_id,
            command,
            pin,
            responder,
        } = queued;
        let kind = command.kind();
        debug!(entity = %entity_id, ?kind, "executing command");

        let ok = match AssertUnwindSafe(execute(&panel, &entity_id, command, pin))
            .catch_unwind()
            .await
        {
            Ok(Ok(ok)) => ok,
            Ok(Err(e)) => {
                error!(entity = %entity_id, ?kind, error = %e, "command failed");
                if e.is_connection_lost() {
                    panel.connection_lost(e.close_code()).await;
                }
                false
            }
            Err(_) => {
                error!(entity = %entity_id, ?kind, "command panicked");
                false
            }
        };
        let _ = responder.send(ok);
    }
    debug!("dispatcher task stopped");
}

/// Expires pending `CMD_USR` entries nobody answered.
pub(super) async fn sweeper_task(panel: Panel) {
    loop {
        if !panel.sleep_or_cancel(SWEEP_INTERVAL).await {
            break;
        }
        let expired = panel.inner.pending.sweep(Instant::now());
        if expired > 0 {
            debug!(expired, "swept pending commands");
        }
    }
}

async fn execute(
    panel: &Panel,
    entity_id: &str,
    command: PanelCommand,
    pin: Option<SecretString>,
) -> Result<bool, CoreError> {
    let pin = pin.unwrap_or_else(|| panel.inner.config.pin.clone());
    let kind = command.kind();
    match command {
        PanelCommand::Output(value) => {
            let action = UserAction::SetOutput {
                output: entity_id.to_owned(),
                state: value.wire(),
            };
            user_command(panel, entity_id, kind, &action, &pin).await
        }
        PanelCommand::Scenario => {
            let action = UserAction::ExecuteScenario {
                scenario: entity_id.to_owned(),
            };
            user_command(panel, entity_id, kind, &action, &pin).await
        }
        PanelCommand::Partition { mode } => {
            let action = UserAction::ArmPartition {
                partition: entity_id.to_owned(),
                mode,
            };
            user_command(panel, entity_id, kind, &action, &pin).await
        }
        PanelCommand::Bypass { value } => {
            let action = UserAction::BypassZone {
                zone: entity_id.to_owned(),
                bypass: value,
            };
            user_command(panel, entity_id, kind, &action, &pin).await
        }
        PanelCommand::Scheduler { patch } => write_scheduler(panel, patch).await,
        PanelCommand::Thermostat { patch } => write_thermostat(panel, entity_id, &patch, &pin).await,
        PanelCommand::Account { enabled } => write_account(panel, entity_id, enabled, &pin).await,
        PanelCommand::Clear { kind } => clear(panel, kind, &pin).await,
    }
}

// ── CMD_USR ──────────────────────────────────────────────────────────

async fn user_command(
    panel: &Panel,
    entity_id: &str,
    kind: crate::command::CommandKind,
    action: &UserAction,
    pin: &SecretString,
) -> Result<bool, CoreError> {
    let pending = &panel.inner.pending;
    let (id, rx) = {
        let mut guard = panel.inner.link.lock().await;
        let link = guard.as_mut().ok_or(CoreError::NotConnected)?;
        let id = link.next_id();
        let (entry, rx) = PendingCommand::new(entity_id, kind, Instant::now() + PENDING_TTL);
        pending.insert(id.clone(), entry);
        if let Err(e) = link.send_user_command(&id, action, pin).await {
            pending.remove(&id);
            return Err(e.into());
        }
        (id, rx)
    };
    debug!(id = %id, entity = %entity_id, action = action.payload_type(), "user command sent");

    match timeout(RESULT_WAIT, rx).await {
        Ok(Ok(ok)) => Ok(ok),
        Ok(Err(_)) => Ok(false),
        Err(_) => {
            pending.remove(&id);
            warn!(id = %id, entity = %entity_id, "no result for user command");
            Ok(false)
        }
    }
}

// ── Typed writes ─────────────────────────────────────────────────────

/// `RESULT` of a write reply, trimmed and case-insensitive.
fn reply_ok(payload: &Map<String, Value>) -> bool {
    payload
        .get("RESULT")
        .and_then(Value::as_str)
        .is_some_and(|r| r.trim().eq_ignore_ascii_case("OK"))
}

async fn write_scheduler(panel: &Panel, patch: Map<String, Value>) -> Result<bool, CoreError> {
    let timer: SchedulerTimer = serde_json::from_value(Value::Object(patch.clone()))?;
    let mut sections = Map::new();
    sections.insert("CFG_SCHEDULER_TIMERS".into(), json!([patch]));

    let reply = {
        let router = &panel.inner.router;
        let mut guard = panel.inner.link.lock().await;
        let link = guard.as_mut().ok_or(CoreError::NotConnected)?;
        link.write_config("", sections, None, &mut |f| router.route(f))
            .await?
    };
    if !reply_ok(&reply) {
        warn!(id = %timer.id, "scheduler write rejected");
        return Ok(false);
    }

    let store = &panel.inner.store;
    store.update_static(|cfg| merge_by_id(&mut cfg.scheduler_timers, std::slice::from_ref(&timer)));
    if let Some(cfg) = store.static_config() {
        panel.notify(&StreamUpdate::Schedulers(cfg.scheduler_timers.clone()));
    }
    info!(id = %timer.id, "scheduler updated");
    Ok(true)
}

async fn write_thermostat(
    panel: &Panel,
    id: &str,
    patch: &Map<String, Value>,
    pin: &SecretString,
) -> Result<bool, CoreError> {
    let store = &panel.inner.store;
    let current = store.static_config();
    let base = current.as_deref().and_then(|cfg| cfg.thermostat(id));
    let record = compact_write(id, base, patch);
    let mut sections = Map::new();
    sections.insert("CFG_THERMOSTATS".into(), json!([record]));

    let router = &panel.inner.router;
    let mut guard = panel.inner.link.lock().await;
    let link = guard.as_mut().ok_or(CoreError::NotConnected)?;
    let reply = link
        .write_config("CFG_ALL", sections, Some(pin), &mut |f| router.route(f))
        .await?;
    if !reply_ok(&reply) {
        warn!(id, "thermostat write rejected");
        return Ok(false);
    }

    // Re-read on the same link; merge locally only if that fails.
    let reread = match link.read_thermostats(Some(pin), &mut |f| router.route(f)).await {
        Ok(payload) => section::<ThermostatConfig>(&payload, "CFG_THERMOSTATS"),
        Err(e) => {
            warn!(id, error = %e, "thermostat re-read failed, merging locally");
            None
        }
    };
    drop(guard);

    let list = match reread {
        Some(list) => list,
        None => {
            let existing = current.map(|cfg| cfg.thermostats.clone()).unwrap_or_default();
            merge_patch(&existing, id, patch)?
        }
    };
    store.update_static(|cfg| cfg.thermostats.clone_from(&list));
    panel.notify(&StreamUpdate::ThermostatConfigs(list));
    info!(id, "thermostat updated");
    Ok(true)
}

async fn write_account(
    panel: &Panel,
    id: &str,
    enabled: bool,
    pin: &SecretString,
) -> Result<bool, CoreError> {
    let dacc = if enabled { "F" } else { "T" };
    let mut sections = Map::new();
    sections.insert("CFG_ACCOUNTS".into(), json!([{"ID": id, "DACC": dacc}]));

    let reply = {
        let router = &panel.inner.router;
        let mut guard = panel.inner.link.lock().await;
        let link = guard.as_mut().ok_or(CoreError::NotConnected)?;
        link.write_config("CFG_ALL", sections, Some(pin), &mut |f| router.route(f))
            .await?
    };
    if !reply_ok(&reply) {
        warn!(id, enabled, "account write rejected");
        return Ok(false);
    }

    let account = Account {
        id: id.to_owned(),
        dacc: Some(dacc.to_owned()),
        ..Account::default()
    };
    panel
        .inner
        .store
        .update_static(|cfg| merge_by_id(&mut cfg.accounts, std::slice::from_ref(&account)));
    info!(id, enabled, "account updated");
    Ok(true)
}

async fn clear(panel: &Panel, kind: ClearKind, pin: &SecretString) -> Result<bool, CoreError> {
    let reply = {
        let router = &panel.inner.router;
        let mut guard = panel.inner.link.lock().await;
        let link = guard.as_mut().ok_or(CoreError::NotConnected)?;
        link.clear(&kind.to_string(), pin, &mut |f| router.route(f))
            .await?
    };
    let ok = reply_ok(&reply);
    if ok {
        info!(%kind, "panel memory cleared");
    } else {
        warn!(%kind, "clear rejected");
    }
    Ok(ok)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn write_results_are_lenient() {
        let ok: Map<String, Value> = serde_json::from_value(json!({"RESULT": " ok "})).unwrap();
        let ko: Map<String, Value> = serde_json::from_value(json!({"RESULT": "FAIL"})).unwrap();
        assert!(reply_ok(&ok));
        assert!(!reply_ok(&ko));
        assert!(!reply_ok(&Map::new()));
    }
}

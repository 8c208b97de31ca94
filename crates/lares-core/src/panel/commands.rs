// ── Command API ──
//
// Entity operations as the integration sees them. Every method queues a
// `PanelCommand` and reports whether the panel confirmed it; failures are
// logged and surface as `false`, never as errors.

use std::time::Duration;

use secrecy::SecretString;
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::Panel;
use crate::command::{ClearKind, OutputValue, PanelCommand, QueuedCommand};

/// Caller-side wait for user commands and thermostat writes.
const COMMAND_WAIT: Duration = Duration::from_secs(60);
/// Caller-side wait for scheduler, account and clear writes.
const WRITE_WAIT: Duration = Duration::from_secs(20);

/// Wire codes tried in order for a requested partition mode.
fn partition_candidates(mode: &str) -> Vec<String> {
    let normalized = mode.trim().to_ascii_uppercase();
    let codes: &[&str] = match normalized.as_str() {
        "A" | "DA" | "ARM" | "ARM_DELAY" | "DELAY" => &["A", "DA"],
        "I" | "IA" | "INSTANT" | "ARM_INSTANT" | "ARM_NOW" => &["I", "IA"],
        "D" | "DISARM" => &["D"],
        _ => &[],
    };
    if codes.is_empty() {
        return vec![normalized];
    }
    codes.iter().map(|c| (*c).to_owned()).collect()
}

impl Panel {
    /// Queue `command` for `entity_id` and wait up to a minute for its
    /// outcome.
    pub async fn send_command(
        &self,
        entity_id: &str,
        command: PanelCommand,
        pin: Option<SecretString>,
    ) -> bool {
        self.enqueue(entity_id, command, pin, COMMAND_WAIT).await
    }

    async fn enqueue(
        &self,
        entity_id: &str,
        command: PanelCommand,
        pin: Option<SecretString>,
        limit: Duration,
    ) -> bool {
        let kind = command.kind();
        let (responder, rx) = oneshot::channel();
        let queued = QueuedCommand {
            entity_id: entity_id.to_owned(),
            command,
            pin,
            responder,
        };
        if self.inner.command_tx.send(queued).is_err() {
            warn!(entity = %entity_id, ?kind, "command queue closed");
            return false;
        }
        debug!(entity = %entity_id, ?kind, "command queued");

        match tokio::time::timeout(limit, rx).await {
            Ok(Ok(true)) => true,
            Ok(Ok(false)) => {
                warn!(entity = %entity_id, ?kind, "command failed");
                false
            }
            Ok(Err(_)) => {
                warn!(entity = %entity_id, ?kind, "command dropped");
                false
            }
            Err(_) => {
                warn!(entity = %entity_id, ?kind, timeout_secs = limit.as_secs(), "command timed out");
                false
            }
        }
    }

    // ── Outputs ──────────────────────────────────────────────────────

    /// Switch an output on, at `level` when one above zero is given.
    pub async fn turn_on_output(&self, id: &str, level: Option<u32>) -> bool {
        let value = match level {
            Some(level) if level > 0 => OutputValue::Level(level),
            _ => OutputValue::from("ON"),
        };
        self.send_command(id, PanelCommand::Output(value), None).await
    }

    /// Switch an output off. Dimmers that reject `OFF` are retried with
    /// level 0.
    pub async fn turn_off_output(&self, id: &str) -> bool {
        if self
            .send_command(id, PanelCommand::Output(OutputValue::from("OFF")), None)
            .await
        {
            return true;
        }
        let is_light = self
            .inner
            .store
            .static_config()
            .is_some_and(|cfg| cfg.outputs.iter().any(|o| o.id == id && o.is_category("LIGHT")));
        if !is_light {
            return false;
        }
        warn!(id, "OFF rejected for light, retrying with level 0");
        self.send_command(id, PanelCommand::Output(OutputValue::Level(0)), None)
            .await
    }

    pub async fn raise_cover(&self, id: &str) -> bool {
        self.send_command(id, PanelCommand::Output(OutputValue::from("UP")), None)
            .await
    }

    pub async fn lower_cover(&self, id: &str) -> bool {
        self.send_command(id, PanelCommand::Output(OutputValue::from("DOWN")), None)
            .await
    }

    pub async fn stop_cover(&self, id: &str) -> bool {
        self.send_command(id, PanelCommand::Output(OutputValue::from("ALT")), None)
            .await
    }

    pub async fn set_cover_position(&self, id: &str, position: u32) -> bool {
        self.send_command(id, PanelCommand::Output(OutputValue::Level(position)), None)
            .await
    }

    // ── Scenarios & partitions ───────────────────────────────────────

    pub async fn execute_scenario(&self, id: &str, pin: Option<SecretString>) -> bool {
        self.send_command(id, PanelCommand::Scenario, pin).await
    }

    /// Arm or disarm a partition. Friendly mode names are accepted; each
    /// firmware spelling of the mode is tried until one succeeds.
    pub async fn set_partition_mode(&self, id: &str, mode: &str, pin: Option<SecretString>) -> bool {
        for code in partition_candidates(mode) {
            let command = PanelCommand::Partition { mode: code.clone() };
            if self.send_command(id, command, pin.clone()).await {
                info!(id, mode = %code, "partition mode set");
                return true;
            }
            warn!(id, mode = %code, "partition mode rejected");
        }
        false
    }

    pub async fn arm_partition(&self, id: &str, pin: Option<SecretString>) -> bool {
        self.set_partition_mode(id, "A", pin).await
    }

    pub async fn arm_partition_instant(&self, id: &str, pin: Option<SecretString>) -> bool {
        self.set_partition_mode(id, "I", pin).await
    }

    pub async fn disarm_partition(&self, id: &str, pin: Option<SecretString>) -> bool {
        self.set_partition_mode(id, "D", pin).await
    }

    // ── Zones ────────────────────────────────────────────────────────

    /// Bypass a zone. `value` is `ON`, `OFF`, `TGL` or a native code.
    pub async fn set_zone_bypass(&self, id: &str, value: &str, pin: Option<SecretString>) -> bool {
        let command = PanelCommand::Bypass {
            value: value.to_owned(),
        };
        self.send_command(id, command, pin).await
    }

    pub async fn bypass_zone_on(&self, id: &str, pin: Option<SecretString>) -> bool {
        self.set_zone_bypass(id, "ON", pin).await
    }

    pub async fn bypass_zone_off(&self, id: &str, pin: Option<SecretString>) -> bool {
        self.set_zone_bypass(id, "OFF", pin).await
    }

    pub async fn bypass_zone_toggle(&self, id: &str, pin: Option<SecretString>) -> bool {
        self.set_zone_bypass(id, "TGL", pin).await
    }

    // ── Configuration writes ─────────────────────────────────────────

    /// Write the given scheduler fields. `ID` is always set to `id`.
    pub async fn update_scheduler(&self, id: &str, patch: Map<String, Value>) -> bool {
        let mut record = Map::new();
        record.insert("ID".into(), Value::String(id.to_owned()));
        record.extend(patch.into_iter().filter(|(k, _)| k != "ID"));
        self.enqueue(id, PanelCommand::Scheduler { patch: record }, None, WRITE_WAIT)
            .await
    }

    /// Write thermostat fields. Only the touched season and the keys the
    /// patch names are sent to the panel.
    pub async fn update_thermostat(&self, id: &str, mut patch: Map<String, Value>) -> bool {
        patch
            .entry("ID")
            .or_insert_with(|| Value::String(id.to_owned()));
        self.send_command(id, PanelCommand::Thermostat { patch }, None)
            .await
    }

    pub async fn set_account_enabled(&self, id: &str, enabled: bool, pin: Option<SecretString>) -> bool {
        self.enqueue(id, PanelCommand::Account { enabled }, pin, WRITE_WAIT)
            .await
    }

    /// Clear a panel memory.
    pub async fn clear_panel(&self, kind: ClearKind, pin: Option<SecretString>) -> bool {
        self.enqueue(&kind.to_string(), PanelCommand::Clear { kind }, pin, WRITE_WAIT)
            .await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn partition_modes_expand_to_firmware_spellings() {
        assert_eq!(partition_candidates("arm"), vec!["A", "DA"]);
        assert_eq!(partition_candidates(" arm_now "), vec!["I", "IA"]);
        assert_eq!(partition_candidates("disarm"), vec!["D"]);
        assert_eq!(partition_candidates("p"), vec!["P"]);
    }
}

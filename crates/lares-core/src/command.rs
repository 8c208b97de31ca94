// ── Command API ──
//
// Every outbound operation flows through a `PanelCommand`. The dispatcher
// drains them one at a time: user commands go out as `CMD_USR` and are
// correlated later, typed commands are full write/read round trips.

use secrecy::SecretString;
use serde_json::{Map, Value};
use strum::{Display, EnumString};
use tokio::sync::oneshot;

/// A command envelope sent through the command channel.
/// Contains the command and a oneshot completion handle.
pub(crate) struct QueuedCommand {
    pub entity_id: String,
    pub command: PanelCommand,
    /// Overrides the configured PIN for this command only.
    pub pin: Option<SecretString>,
    pub responder: oneshot::Sender<bool>,
}

/// Value sent to an output: a keyword or a level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputValue {
    Text(String),
    Level(u32),
}

impl OutputValue {
    /// Keywords are uppercased, levels stringified.
    pub fn wire(&self) -> String {
        match self {
            Self::Text(s) => s.trim().to_ascii_uppercase(),
            Self::Level(n) => n.to_string(),
        }
    }
}

impl From<&str> for OutputValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for OutputValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<u32> for OutputValue {
    fn from(n: u32) -> Self {
        Self::Level(n)
    }
}

/// Panel memories that can be cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum ClearKind {
    CyclesOrMemories,
    Communications,
    FaultsMemory,
}

/// All operations the dispatcher executes.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelCommand {
    // ── User commands (CMD_USR) ──────────────────────────────────────
    Output(OutputValue),
    Scenario,
    /// Arm/disarm with a single mode code (`A`, `DA`, `I`, `IA`, `D`).
    Partition { mode: String },
    /// `AUTO`/`NO`/`TGL`; `ON`/`OFF` are mapped on the wire.
    Bypass { value: String },

    // ── Typed configuration round trips ──────────────────────────────
    Scheduler { patch: Map<String, Value> },
    Thermostat { patch: Map<String, Value> },
    Account { enabled: bool },
    Clear { kind: ClearKind },
}

impl PanelCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Output(_) => CommandKind::Output,
            Self::Scenario => CommandKind::Scenario,
            Self::Partition { .. } => CommandKind::Partition,
            Self::Bypass { .. } => CommandKind::Bypass,
            Self::Scheduler { .. } => CommandKind::Scheduler,
            Self::Thermostat { .. } => CommandKind::Thermostat,
            Self::Account { .. } => CommandKind::Account,
            Self::Clear { .. } => CommandKind::Clear,
        }
    }
}

/// Command discriminant recorded with each pending entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Output,
    Scenario,
    Partition,
    Bypass,
    Scheduler,
    Thermostat,
    Account,
    Clear,
}

impl CommandKind {
    /// Security-sensitive commands count as failed when the panel's
    /// reply carries no `RESULT`.
    pub fn fails_closed(self) -> bool {
        matches!(self, Self::Scenario | Self::Partition | Self::Bypass)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn output_values_on_the_wire() {
        assert_eq!(OutputValue::from("on").wire(), "ON");
        assert_eq!(OutputValue::from(40u32).wire(), "40");
    }

    #[test]
    fn clear_kinds_parse() {
        assert_eq!(
            ClearKind::from_str("faults_memory").unwrap(),
            ClearKind::FaultsMemory
        );
        assert_eq!(ClearKind::CyclesOrMemories.to_string(), "CYCLES_OR_MEMORIES");
    }
}

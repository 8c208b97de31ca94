// ── Runtime session configuration ──
//
// Describes how to reach one panel and how the session behaves. Carries
// the PIN but never touches disk: lares-config builds a `PanelConfig`
// and hands it in.

use std::time::Duration;

use lares_api::SecurityMode;
use secrecy::SecretString;

use crate::reconnect::ReconnectConfig;

/// Default WebSocket port of the panel.
pub const DEFAULT_PORT: u16 = 443;

/// Configuration for the session with a single panel.
#[derive(Debug, Clone)]
pub struct PanelConfig {
    pub host: String,
    pub port: u16,
    /// User PIN used for login and for commands without an override.
    pub pin: SecretString,
    /// Transport used by the first connect; reconnects reuse the last one.
    pub security: SecurityMode,
    pub reconnect: ReconnectConfig,
    /// Quiet period after the panel closes the socket cleanly (code 1000).
    pub reconnect_cooldown: Duration,
    /// Startup wait for the bootstrap snapshots.
    pub initial_data_timeout: Duration,
    /// Wait used by read accessors before giving up on initial data.
    pub accessor_wait: Duration,
    /// Log thermostat configuration changes found by the poller.
    pub debug_thermostats: bool,
    /// Log a sample of every `STATUS_OUTPUTS` push at info level.
    pub output_debug_verbose: bool,
}

impl PanelConfig {
    pub fn new(host: impl Into<String>, pin: SecretString) -> Self {
        Self {
            host: host.into(),
            pin,
            ..Self::default()
        }
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            pin: SecretString::from(String::new()),
            security: SecurityMode::Plain,
            reconnect: ReconnectConfig::default(),
            reconnect_cooldown: Duration::from_secs(8),
            initial_data_timeout: Duration::from_secs(30),
            accessor_wait: Duration::from_secs(5),
            debug_thermostats: false,
            output_debug_verbose: false,
        }
    }
}

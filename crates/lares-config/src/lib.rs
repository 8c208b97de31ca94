//! Layered configuration for the Lares tools.
//!
//! Sources, lowest to highest precedence: built-in defaults, the TOML
//! file, the add-on options JSON, `KSENIA_*` environment variables and
//! finally command-line overrides. The PIN falls back to the OS keyring
//! when no layer sets it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use lares_core::{DEFAULT_PORT, PanelConfig, ReconnectConfig, SecurityMode};

/// Options file written by the Home Assistant supervisor.
pub const ADDON_OPTIONS_PATH: &str = "/data/options.json";

const KEYRING_SERVICE: &str = "lares";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no panel host configured")]
    MissingHost,

    #[error("no PIN configured for panel '{host}'")]
    MissingPin { host: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Settings ────────────────────────────────────────────────────────

/// Effective settings after every layer is merged.
#[derive(Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Never serialized.
    #[serde(default, skip_serializing, deserialize_with = "secret_opt")]
    pub pin: Option<SecretString>,

    /// Start with `wss://` instead of `ws://`.
    #[serde(default)]
    pub secure: bool,

    #[serde(default = "default_cooldown")]
    pub reconnect_cooldown_secs: u64,

    #[serde(default = "default_initial_data_timeout")]
    pub initial_data_timeout_secs: u64,

    #[serde(default)]
    pub debug_thermostats: bool,

    #[serde(default)]
    pub output_debug_verbose: bool,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_secs: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_cooldown() -> u64 {
    8
}
fn default_initial_data_timeout() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    20
}
fn default_initial_backoff() -> u64 {
    2
}
fn default_max_backoff() -> u64 {
    60
}

/// PINs are digits; a TOML author may leave the quotes off.
fn secret_opt<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    let raw = Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    });
    Ok(raw.filter(|s| !s.is_empty()).map(SecretString::from))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            pin: None,
            secure: false,
            reconnect_cooldown_secs: default_cooldown(),
            initial_data_timeout_secs: default_initial_data_timeout(),
            debug_thermostats: false,
            output_debug_verbose: false,
            max_retries: default_max_retries(),
            initial_backoff_secs: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("pin", &self.pin.as_ref().map(|_| "[REDACTED]"))
            .field("secure", &self.secure)
            .field("reconnect_cooldown_secs", &self.reconnect_cooldown_secs)
            .field("initial_data_timeout_secs", &self.initial_data_timeout_secs)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

// ── Layers ──────────────────────────────────────────────────────────

/// Add-on options. Accepts both the plain key names and the
/// `ksenia_`-prefixed ones the supervisor UI uses.
#[derive(Debug, Default, Deserialize, Serialize)]
struct AddonOptions {
    #[serde(alias = "ksenia_host", skip_serializing_if = "Option::is_none")]
    host: Option<String>,
    #[serde(alias = "ksenia_port", skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(alias = "ksenia_pin", skip_serializing_if = "Option::is_none")]
    pin: Option<String>,
    #[serde(alias = "ksenia_secure", skip_serializing_if = "Option::is_none")]
    secure: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    debug_thermostats: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_debug_verbose: Option<bool>,
}

impl AddonOptions {
    fn read(path: &Path) -> Result<Self, ConfigError> {
        let mut options: Self = Figment::from(Json::file(path)).extract()?;
        // The supervisor writes empty strings and 0 for unset fields.
        options.host = options.host.filter(|h| !h.is_empty());
        options.pin = options.pin.filter(|p| !p.is_empty());
        options.port = options.port.filter(|p| *p != 0);
        Ok(options)
    }
}

/// Values given on the command line; `None` leaves lower layers alone.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
}

/// Where to look for the file-based layers.
#[derive(Debug, Default, Clone)]
pub struct Sources {
    /// TOML file; the platform config path when `None`.
    pub config: Option<PathBuf>,
    /// Options JSON; [`ADDON_OPTIONS_PATH`] when `None`.
    pub options: Option<PathBuf>,
}

impl Sources {
    pub fn config_file(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(config_path)
    }

    pub fn options_file(&self) -> PathBuf {
        self.options
            .clone()
            .unwrap_or_else(|| PathBuf::from(ADDON_OPTIONS_PATH))
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Platform config file path.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "lares", "lares").map_or_else(
        || PathBuf::from("lares.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Loading ─────────────────────────────────────────────────────────

/// Merge every layer into [`Settings`].
pub fn load(sources: &Sources, overrides: &Overrides) -> Result<Settings, ConfigError> {
    let config_file = sources.config_file();
    let options_file = sources.options_file();

    let mut figment = Figment::new()
        .merge(Serialized::defaults(Settings::default()))
        .merge(Toml::file(&config_file));
    if options_file.exists() {
        debug!(path = %options_file.display(), "reading add-on options");
        figment = figment.merge(Serialized::defaults(AddonOptions::read(&options_file)?));
    }
    // KSENIA_PIN is taken verbatim; other env values are type-sniffed.
    figment = figment.merge(Env::prefixed("KSENIA_").ignore(&["pin"]));
    if let Some(pin) = std::env::var("KSENIA_PIN").ok().filter(|p| !p.is_empty()) {
        figment = figment.merge(Serialized::default("pin", pin));
    }
    let figment = figment.merge(Serialized::defaults(overrides));

    let settings: Settings = figment.extract()?;
    debug!(config = %config_file.display(), ?settings, "configuration loaded");
    Ok(settings)
}

// ── PIN resolution ──────────────────────────────────────────────────

fn keyring_entry(host: &str) -> Result<keyring::Entry, ConfigError> {
    Ok(keyring::Entry::new(KEYRING_SERVICE, host)?)
}

/// Store the PIN for `host` in the OS keyring.
pub fn store_pin(host: &str, pin: &SecretString) -> Result<(), ConfigError> {
    keyring_entry(host)?.set_password(pin.expose_secret())?;
    Ok(())
}

impl Settings {
    /// The configured PIN, else the keyring entry for the host.
    pub fn resolve_pin(&self) -> Option<SecretString> {
        if let Some(pin) = &self.pin {
            return Some(pin.clone());
        }
        match keyring_entry(self.host.trim()).and_then(|e| Ok(e.get_password()?)) {
            Ok(secret) => Some(SecretString::from(secret)),
            Err(e) => {
                debug!(host = %self.host, error = %e, "no PIN in keyring");
                None
            }
        }
    }

    /// Render as TOML, without the PIN.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Build the session configuration, resolving the PIN.
    pub fn into_panel_config(self) -> Result<PanelConfig, ConfigError> {
        let host = self.host.trim().to_owned();
        if host.is_empty() {
            return Err(ConfigError::MissingHost);
        }
        let pin = self
            .resolve_pin()
            .ok_or_else(|| ConfigError::MissingPin { host: host.clone() })?;

        let mut config = PanelConfig::new(host, pin);
        config.port = self.port;
        config.security = if self.secure {
            SecurityMode::Secure
        } else {
            SecurityMode::Plain
        };
        config.reconnect = ReconnectConfig {
            initial_delay: Duration::from_secs(self.initial_backoff_secs),
            max_delay: Duration::from_secs(self.max_backoff_secs),
            max_retries: self.max_retries,
        };
        config.reconnect_cooldown = Duration::from_secs(self.reconnect_cooldown_secs);
        config.initial_data_timeout = Duration::from_secs(self.initial_data_timeout_secs);
        config.debug_thermostats = self.debug_thermostats;
        config.output_debug_verbose = self.output_debug_verbose;
        Ok(config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use figment::Jail;
    use pretty_assertions::assert_eq;

    use super::*;

    // Every test that reads the environment runs in a `Jail`, which
    // serializes them and restores the variables afterwards.
    fn sources(jail: &Jail) -> Sources {
        Sources {
            config: Some(jail.directory().join("config.toml")),
            options: Some(jail.directory().join("options.json")),
        }
    }

    #[test]
    fn defaults_apply_without_files() {
        Jail::expect_with(|jail| {
            let settings = load(&sources(jail), &Overrides::default()).map_err(|e| e.to_string())?;
            assert_eq!(settings.port, 443);
            assert_eq!(settings.reconnect_cooldown_secs, 8);
            assert_eq!(settings.initial_data_timeout_secs, 30);
            assert_eq!(settings.max_retries, 20);
            assert_eq!(settings.initial_backoff_secs, 2);
            assert_eq!(settings.max_backoff_secs, 60);
            assert!(settings.pin.is_none());
            Ok(())
        });
    }

    #[test]
    fn options_file_overrides_toml_and_accepts_prefixed_keys() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "host = \"10.0.0.1\"\nport = 80\nmax_retries = 5\n")?;
            jail.create_file(
                "options.json",
                r#"{"ksenia_host": "10.0.0.2", "ksenia_port": 0, "ksenia_pin": "123456", "debug_thermostats": true}"#,
            )?;
            let settings = load(&sources(jail), &Overrides::default()).map_err(|e| e.to_string())?;
            assert_eq!(settings.host, "10.0.0.2");
            assert_eq!(settings.port, 80);
            assert_eq!(settings.max_retries, 5);
            assert!(settings.debug_thermostats);
            assert_eq!(settings.pin.unwrap().expose_secret(), "123456");
            Ok(())
        });
    }

    #[test]
    fn environment_sits_between_files_and_flags() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "host = \"10.0.0.1\"\nport = 80\npin = 1111\n")?;
            jail.set_env("KSENIA_HOST", "10.0.0.9");
            jail.set_env("KSENIA_RECONNECT_COOLDOWN_SECS", "3");
            jail.set_env("KSENIA_PIN", "012345");
            let overrides = Overrides {
                port: Some(81),
                secure: Some(true),
                ..Overrides::default()
            };
            let settings = load(&sources(jail), &overrides).map_err(|e| e.to_string())?;
            assert_eq!(settings.host, "10.0.0.9");
            assert_eq!(settings.port, 81);
            assert!(settings.secure);
            assert_eq!(settings.reconnect_cooldown_secs, 3);
            assert_eq!(settings.pin.unwrap().expose_secret(), "012345");
            Ok(())
        });
    }

    #[test]
    fn unquoted_toml_pin_is_accepted() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "pin = 4321\n")?;
            let settings = load(&sources(jail), &Overrides::default()).map_err(|e| e.to_string())?;
            assert_eq!(settings.pin.unwrap().expose_secret(), "4321");
            Ok(())
        });
    }

    #[test]
    fn panel_config_carries_every_setting() {
        let settings = Settings {
            host: " 192.0.2.1 ".into(),
            pin: Some(SecretString::from("0000".to_owned())),
            secure: true,
            max_retries: 7,
            initial_backoff_secs: 1,
            reconnect_cooldown_secs: 12,
            output_debug_verbose: true,
            ..Settings::default()
        };
        let config = settings.into_panel_config().unwrap();
        assert_eq!(config.host, "192.0.2.1");
        assert_eq!(config.security, SecurityMode::Secure);
        assert_eq!(config.reconnect.max_retries, 7);
        assert_eq!(config.reconnect.initial_delay, Duration::from_secs(1));
        assert_eq!(config.reconnect.max_delay, Duration::from_secs(60));
        assert_eq!(config.reconnect_cooldown, Duration::from_secs(12));
        assert!(config.output_debug_verbose);
        assert_eq!(config.pin.expose_secret(), "0000");
    }

    #[test]
    fn missing_host_is_rejected() {
        let err = Settings::default().into_panel_config().unwrap_err();
        assert!(matches!(err, ConfigError::MissingHost));
    }

    #[test]
    fn rendered_settings_omit_the_pin() {
        let settings = Settings {
            host: "panel".into(),
            pin: Some(SecretString::from("987654".to_owned())),
            ..Settings::default()
        };
        let rendered = settings.to_toml().unwrap();
        assert!(rendered.contains("host = \"panel\""));
        assert!(!rendered.contains("987654"));
        assert!(!format!("{settings:?}").contains("987654"));
    }
}

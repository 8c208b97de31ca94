//! One authenticated connection to the panel and its request primitives.
//!
//! [`PanelLink`] owns the transport, the login identity and the
//! correlation-id sequence of a single connection. Every request/response
//! primitive sends one frame and then reads until its reply shows up;
//! unrelated frames that arrive in between are handed to the caller's
//! dispatch callback so realtime pushes are never lost.
//!
//! Callers serialize access to a link themselves (the core keeps it behind
//! one async mutex), so nothing here is concurrent.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value, json};
use tokio::time::Instant;

use crate::error::Error;
use crate::frame::{Frame, cmd, value_to_string};
use crate::transport::Transport;

// ── Request parameters ───────────────────────────────────────────────

/// Reply wait for ordinary requests.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Thermostat configuration reads return full weekly schedules and are slow.
pub const THERMOSTAT_READ_TIMEOUT: Duration = Duration::from_secs(15);
/// Configuration writes.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(20);

/// Sections fetched by the bootstrap bulk read.
pub const STATIC_TYPES: [&str; 13] = [
    "OUTPUTS",
    "BUS_HAS",
    "SCENARIOS",
    "POWER_LINES",
    "PARTITIONS",
    "ZONES",
    "STATUS_SYSTEM",
    "CFG_SCHEDULER_TIMERS",
    "CFG_HOLIDAYS",
    "TEMPERATURES",
    "HUMIDITY",
    "CFG_THERMOSTATS",
    "CFG_ACCOUNTS",
];

/// Streams registered for realtime push.
pub const REALTIME_TYPES: [&str; 9] = [
    "STATUS_OUTPUTS",
    "STATUS_BUS_HA_SENSORS",
    "STATUS_POWER_LINES",
    "STATUS_PARTITIONS",
    "STATUS_ZONES",
    "STATUS_SYSTEM",
    "STATUS_CONNECTION",
    "STATUS_TEMPERATURES",
    "STATUS_HUMIDITY",
];

/// Receives frames that arrived while a request was waiting for its reply.
pub type Dispatch<'a> = &'a mut (dyn FnMut(Frame) + Send);

// ── User commands ────────────────────────────────────────────────────

/// A `CMD_USR` request. These are answered asynchronously by a
/// `CMD_USR_RES` frame, so sending one does not wait for anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    SetOutput { output: String, state: String },
    ExecuteScenario { scenario: String },
    ArmPartition { partition: String, mode: String },
    BypassZone { zone: String, bypass: String },
}

impl UserAction {
    pub fn payload_type(&self) -> &'static str {
        match self {
            Self::SetOutput { .. } => "CMD_SET_OUTPUT",
            Self::ExecuteScenario { .. } => "CMD_EXE_SCENARIO",
            Self::ArmPartition { .. } => "CMD_ARM_PARTITION",
            Self::BypassZone { .. } => "CMD_BYP_ZONE",
        }
    }

    fn target(&self) -> Result<(&'static str, Value), Error> {
        Ok(match self {
            Self::SetOutput { output, state } => ("OUTPUT", json!({"ID": output, "STA": state})),
            Self::ExecuteScenario { scenario } => ("SCENARIO", json!({"ID": scenario})),
            Self::ArmPartition { partition, mode } => {
                if mode.is_empty() {
                    return Err(Error::Protocol("partition arm requires a mode".into()));
                }
                ("PARTITION", json!({"ID": partition, "MOD": mode}))
            }
            Self::BypassZone { zone, bypass } => {
                ("ZONE", json!({"ID": zone, "BYP": wire_bypass(bypass)?}))
            }
        })
    }
}

/// Map user-facing bypass values onto what current firmware accepts.
///
/// Newer panels want `AUTO`/`NO` where older ones took `ON`/`OFF`.
pub fn wire_bypass(raw: &str) -> Result<String, Error> {
    let upper = raw.trim().to_ascii_uppercase();
    let mapped = match upper.as_str() {
        "ON" | "1" => "AUTO",
        "OFF" | "0" => "NO",
        other => other,
    };
    match mapped {
        "AUTO" | "NO" | "TGL" | "ON" | "OFF" => Ok(mapped.to_owned()),
        _ => Err(Error::Protocol(format!("unsupported bypass value {raw:?}"))),
    }
}

// ── Reply matching ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Reply {
    /// Reply command; when `strict`, the correlation id must match too.
    Command { cmd: &'static str, strict: bool },
    /// Reply command with a specific payload type; any id accepted.
    Typed {
        cmd: &'static str,
        payload_type: &'static str,
    },
    /// The snapshot that answers a realtime registration.
    Realtime,
}

impl Reply {
    fn accepts(self, frame: &Frame, expected_id: &str) -> bool {
        match self {
            Self::Command { cmd, strict } => frame.cmd == cmd && (!strict || frame.id == expected_id),
            Self::Typed { cmd, payload_type } => {
                frame.cmd == cmd && frame.payload_type.eq_ignore_ascii_case(payload_type)
            }
            Self::Realtime => {
                frame.cmd == cmd::REALTIME_RES
                    || frame
                        .payload_object()
                        .is_some_and(|p| REALTIME_TYPES.iter().any(|t| p.contains_key(*t)))
            }
        }
    }
}

// ── PanelLink ────────────────────────────────────────────────────────

/// The transport of one connection plus its login identity.
pub struct PanelLink {
    transport: Box<dyn Transport>,
    login_id: i64,
    last_id: u64,
}

impl PanelLink {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            login_id: -1,
            // LOGIN always travels as ID "1"
            last_id: 1,
        }
    }

    /// Identity issued at login, `-1` before a successful login.
    pub fn login_id(&self) -> i64 {
        self.login_id
    }

    /// Allocate the next correlation id for this connection.
    pub fn next_id(&mut self) -> String {
        self.last_id += 1;
        self.last_id.to_string()
    }

    // ── Raw frame I/O ────────────────────────────────────────────────

    pub async fn send(&mut self, frame: &Frame) -> Result<(), Error> {
        tracing::trace!(cmd = %frame.cmd, id = %frame.id, ptype = %frame.payload_type, "-> panel");
        let text = frame.encode()?;
        self.transport.send_text(text).await
    }

    /// Next decoded frame. Undecodable text yields
    /// [`Error::Deserialization`], which leaves the connection usable.
    pub async fn next_frame(&mut self) -> Result<Frame, Error> {
        let text = self.transport.recv_text().await?;
        let frame = Frame::parse(&text)?;
        tracing::trace!(cmd = %frame.cmd, id = %frame.id, "<- panel");
        Ok(frame)
    }

    pub async fn ping(&mut self) -> Result<(), Error> {
        self.transport.ping().await
    }

    /// Close the socket and forget the login identity.
    pub async fn close(&mut self) {
        self.login_id = -1;
        if let Err(e) = self.transport.close().await {
            tracing::debug!(error = %e, "close on a dead socket");
        }
    }

    /// Send `request` and read until `reply` accepts a frame.
    async fn exchange(
        &mut self,
        request: Frame,
        reply: Reply,
        limit: Duration,
        dispatch: Dispatch<'_>,
    ) -> Result<Frame, Error> {
        let expected_id = request.id.clone();
        self.send(&request).await?;

        let deadline = Instant::now() + limit;
        loop {
            let frame = match tokio::time::timeout_at(deadline, self.next_frame()).await {
                Err(_) => {
                    return Err(Error::Timeout {
                        timeout_secs: limit.as_secs(),
                    });
                }
                Ok(Err(Error::Deserialization { message, .. })) => {
                    tracing::warn!(error = %message, "dropping undecodable frame");
                    continue;
                }
                Ok(Err(e)) => return Err(e),
                Ok(Ok(frame)) => frame,
            };

            if reply.accepts(&frame, &expected_id) {
                if frame.id != expected_id && !matches!(reply, Reply::Realtime) {
                    tracing::warn!(
                        cmd = %frame.cmd,
                        expected = %expected_id,
                        got = %frame.id,
                        "reply id mismatch, accepting reply"
                    );
                }
                return Ok(frame);
            }
            dispatch(frame);
        }
    }

    fn base_payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("ID_LOGIN".into(), Value::String(self.login_id.to_string()));
        payload
    }

    // ── Login ────────────────────────────────────────────────────────

    /// Exchange the PIN for a login identity. A rejected login yields `-1`.
    pub async fn login(&mut self, pin: &SecretString) -> Result<i64, Error> {
        let request = Frame::request(
            cmd::LOGIN,
            "1",
            "USER",
            json!({ "PIN": pin.expose_secret() }),
        );
        let reply = self
            .exchange(
                request,
                Reply::Command {
                    cmd: cmd::LOGIN_RES,
                    strict: false,
                },
                REQUEST_TIMEOUT,
                &mut |frame| tracing::debug!(cmd = %frame.cmd, "frame before login reply"),
            )
            .await?;

        self.login_id = if reply.result_ok() {
            reply
                .payload
                .get("ID_LOGIN")
                .map(value_to_string)
                .and_then(|id| id.trim().parse().ok())
                .unwrap_or(-1)
        } else {
            -1
        };
        Ok(self.login_id)
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Firmware and model information.
    pub async fn system_version(&mut self, dispatch: Dispatch<'_>) -> Result<Map<String, Value>, Error> {
        let request = Frame::request(
            cmd::SYSTEM_VERSION,
            self.next_id(),
            "REQUEST",
            Value::Object(self.base_payload()),
        );
        let reply = Reply::Command {
            cmd: cmd::SYSTEM_VERSION_RES,
            strict: false,
        };
        let frame = self.exchange(request, reply, REQUEST_TIMEOUT, dispatch).await?;
        Ok(into_payload(frame))
    }

    /// The newest `items` entries of the main event log.
    pub async fn logs(&mut self, items: u32, dispatch: Dispatch<'_>) -> Result<Map<String, Value>, Error> {
        let mut payload = self.base_payload();
        payload.insert("ID_LOG".into(), json!("MAIN"));
        payload.insert("ITEMS_LOG".into(), json!(items.to_string()));
        payload.insert("ITEMS_TYPE".into(), json!(["ALL"]));
        let request = Frame::request(cmd::LOGS, self.next_id(), "GET_LAST_LOGS", Value::Object(payload));
        let reply = Reply::Command {
            cmd: cmd::LOGS_RES,
            strict: false,
        };
        let frame = self.exchange(request, reply, REQUEST_TIMEOUT, dispatch).await?;
        Ok(into_payload(frame))
    }

    /// Bulk `READ` of the given sections.
    pub async fn read_types(
        &mut self,
        types: &[&str],
        dispatch: Dispatch<'_>,
    ) -> Result<Map<String, Value>, Error> {
        let mut payload = self.base_payload();
        payload.insert("ID_READ".into(), json!("1"));
        payload.insert("TYPES".into(), json!(types));
        let request = Frame::request(cmd::READ, self.next_id(), "MULTI_TYPES", Value::Object(payload));
        let reply = Reply::Command {
            cmd: cmd::READ_RES,
            strict: true,
        };
        let frame = self.exchange(request, reply, REQUEST_TIMEOUT, dispatch).await?;
        Ok(into_payload(frame))
    }

    /// Full static configuration used at bootstrap.
    pub async fn read_static(&mut self, dispatch: Dispatch<'_>) -> Result<Map<String, Value>, Error> {
        self.read_types(&STATIC_TYPES, dispatch).await
    }

    pub async fn read_zones(&mut self, dispatch: Dispatch<'_>) -> Result<Map<String, Value>, Error> {
        self.read_types(&["ZONES"], dispatch).await
    }

    pub async fn read_schedulers(&mut self, dispatch: Dispatch<'_>) -> Result<Map<String, Value>, Error> {
        self.read_types(&["CFG_SCHEDULER_TIMERS", "CFG_HOLIDAYS"], dispatch)
            .await
    }

    /// Full thermostat configuration including weekly schedules.
    pub async fn read_thermostats(
        &mut self,
        pin: Option<&SecretString>,
        dispatch: Dispatch<'_>,
    ) -> Result<Map<String, Value>, Error> {
        let mut payload = self.base_payload();
        payload.insert("ID_READ".into(), json!("1"));
        insert_pin(&mut payload, pin);
        let request = Frame::request(cmd::READ, self.next_id(), "CFG_THERMOSTATS", Value::Object(payload));
        let reply = Reply::Typed {
            cmd: cmd::READ_RES,
            payload_type: "CFG_THERMOSTATS",
        };
        let frame = self
            .exchange(request, reply, THERMOSTAT_READ_TIMEOUT, dispatch)
            .await?;
        Ok(into_payload(frame))
    }

    /// Register for realtime pushes; the reply carries the initial snapshot.
    pub async fn register_realtime(&mut self, dispatch: Dispatch<'_>) -> Result<Map<String, Value>, Error> {
        let mut payload = self.base_payload();
        payload.insert("TYPES".into(), json!(REALTIME_TYPES));
        let request = Frame::request(cmd::REALTIME, self.next_id(), "REGISTER", Value::Object(payload));
        let frame = self
            .exchange(request, Reply::Realtime, REQUEST_TIMEOUT, dispatch)
            .await?;
        Ok(into_payload(frame))
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// `WRITE_CFG` with the patch sections merged into the payload.
    pub async fn write_config(
        &mut self,
        payload_type: &str,
        patch: Map<String, Value>,
        pin: Option<&SecretString>,
        dispatch: Dispatch<'_>,
    ) -> Result<Map<String, Value>, Error> {
        let ptype = match payload_type.trim() {
            "" => "CFG_ALL".to_owned(),
            other => other.to_ascii_uppercase(),
        };
        let mut payload = self.base_payload();
        let sections: Vec<&String> = patch.keys().collect();
        tracing::info!(ptype = %ptype, ?sections, "writing panel configuration");
        payload.extend(patch);
        insert_pin(&mut payload, pin);

        let request = Frame::request(cmd::WRITE_CFG, self.next_id(), &ptype, Value::Object(payload));
        let reply = Reply::Command {
            cmd: cmd::WRITE_CFG_RES,
            strict: false,
        };
        let frame = self.exchange(request, reply, WRITE_TIMEOUT, dispatch).await?;
        Ok(into_payload(frame))
    }

    /// `CLEAR` of a panel memory (`CYCLES_OR_MEMORIES`, `COMMUNICATIONS`,
    /// `FAULTS_MEMORY`).
    pub async fn clear(
        &mut self,
        kind: &str,
        pin: &SecretString,
        dispatch: Dispatch<'_>,
    ) -> Result<Map<String, Value>, Error> {
        let ptype = kind.trim().to_ascii_uppercase();
        if ptype.is_empty() {
            return Err(Error::Protocol("clear requires a memory type".into()));
        }
        let mut payload = self.base_payload();
        insert_pin(&mut payload, Some(pin));
        let request = Frame::request(cmd::CLEAR, self.next_id(), &ptype, Value::Object(payload));
        let reply = Reply::Command {
            cmd: cmd::CLEAR_RES,
            strict: false,
        };
        let frame = self.exchange(request, reply, REQUEST_TIMEOUT, dispatch).await?;
        Ok(into_payload(frame))
    }

    /// Send a `CMD_USR` request under the given correlation id.
    pub async fn send_user_command(
        &mut self,
        id: &str,
        action: &UserAction,
        pin: &SecretString,
    ) -> Result<(), Error> {
        let (key, target) = action.target()?;
        let mut payload = self.base_payload();
        payload.insert("PIN".into(), json!(pin.expose_secret()));
        payload.insert(key.into(), target);
        let request = Frame::request(cmd::CMD_USR, id, action.payload_type(), Value::Object(payload));
        self.send(&request).await
    }
}

fn insert_pin(payload: &mut Map<String, Value>, pin: Option<&SecretString>) {
    if let Some(pin) = pin.filter(|p| !p.expose_secret().is_empty()) {
        payload.insert("PIN".into(), json!(pin.expose_secret()));
    }
}

fn into_payload(frame: Frame) -> Map<String, Value> {
    match frame.payload {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn bypass_values_map_to_current_firmware() {
        assert_eq!(wire_bypass("on").unwrap(), "AUTO");
        assert_eq!(wire_bypass("OFF").unwrap(), "NO");
        assert_eq!(wire_bypass("1").unwrap(), "AUTO");
        assert_eq!(wire_bypass("0").unwrap(), "NO");
        assert_eq!(wire_bypass("tgl").unwrap(), "TGL");
        assert!(wire_bypass("maybe").is_err());
    }

    #[test]
    fn user_action_targets() {
        let (key, body) = UserAction::SetOutput {
            output: "5".into(),
            state: "ON".into(),
        }
        .target()
        .unwrap();
        assert_eq!(key, "OUTPUT");
        assert_eq!(body, json!({"ID": "5", "STA": "ON"}));

        let (key, body) = UserAction::BypassZone {
            zone: "3".into(),
            bypass: "ON".into(),
        }
        .target()
        .unwrap();
        assert_eq!(key, "ZONE");
        assert_eq!(body["BYP"], "AUTO");

        assert!(
            UserAction::ArmPartition {
                partition: "1".into(),
                mode: String::new(),
            }
            .target()
            .is_err()
        );
    }

    #[test]
    fn strict_reply_requires_matching_id() {
        let frame = Frame::parse(r#"{"CMD":"READ_RES","ID":"9","PAYLOAD":{}}"#).unwrap();
        let strict = Reply::Command {
            cmd: cmd::READ_RES,
            strict: true,
        };
        assert!(!strict.accepts(&frame, "8"));
        assert!(strict.accepts(&frame, "9"));

        let lax = Reply::Command {
            cmd: cmd::READ_RES,
            strict: false,
        };
        assert!(lax.accepts(&frame, "8"));
    }

    #[test]
    fn realtime_reply_recognised_by_payload() {
        let frame =
            Frame::parse(r#"{"CMD":"REALTIME","ID":"4","PAYLOAD":{"STATUS_ZONES":[]}}"#).unwrap();
        assert!(Reply::Realtime.accepts(&frame, "4"));

        let push = Frame::parse(
            r#"{"CMD":"REALTIME","ID":"1","PAYLOAD":{"HomeAssistant":{"STATUS_ZONES":[]}}}"#,
        )
        .unwrap();
        assert!(!Reply::Realtime.accepts(&push, "4"));
    }
}

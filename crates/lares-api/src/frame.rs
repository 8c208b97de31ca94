//! Wire envelope shared by every panel message.
//!
//! Every frame is a flat JSON object with a `CMD` discriminator, a
//! correlation `ID`, a typed `PAYLOAD` and a trailing `CRC_16` field that
//! checksums everything before it.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

/// Sender name the panel expects; realtime pushes come back addressed to it.
pub const CLIENT_NAME: &str = "HomeAssistant";

const CRC_FIELD: &str = "\"CRC_16\":\"";
const CRC_PLACEHOLDER: &str = "0x0000";

// ── Command names ────────────────────────────────────────────────────

pub mod cmd {
    pub const LOGIN: &str = "LOGIN";
    pub const LOGIN_RES: &str = "LOGIN_RES";
    pub const REALTIME: &str = "REALTIME";
    pub const REALTIME_RES: &str = "REALTIME_RES";
    pub const SYSTEM_VERSION: &str = "SYSTEM_VERSION";
    pub const SYSTEM_VERSION_RES: &str = "SYSTEM_VERSION_RES";
    pub const READ: &str = "READ";
    pub const READ_RES: &str = "READ_RES";
    pub const LOGS: &str = "LOGS";
    pub const LOGS_RES: &str = "LOGS_RES";
    pub const WRITE_CFG: &str = "WRITE_CFG";
    pub const WRITE_CFG_RES: &str = "WRITE_CFG_RES";
    pub const CLEAR: &str = "CLEAR";
    pub const CLEAR_RES: &str = "CLEAR_RES";
    pub const CMD_USR: &str = "CMD_USR";
    pub const CMD_USR_RES: &str = "CMD_USR_RES";
}

// ── Frame ────────────────────────────────────────────────────────────

/// One message on the panel socket, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "SENDER", default, deserialize_with = "lenient_string")]
    pub sender: String,
    #[serde(rename = "RECEIVER", default, deserialize_with = "lenient_string")]
    pub receiver: String,
    #[serde(rename = "CMD", default, deserialize_with = "lenient_string")]
    pub cmd: String,
    #[serde(rename = "ID", default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(rename = "PAYLOAD_TYPE", default, deserialize_with = "lenient_string")]
    pub payload_type: String,
    #[serde(rename = "PAYLOAD", default)]
    pub payload: Value,
    #[serde(rename = "TIMESTAMP", default, deserialize_with = "lenient_string")]
    pub timestamp: String,
    #[serde(rename = "CRC_16", default, deserialize_with = "lenient_string")]
    pub crc: String,
}

impl Frame {
    /// Build an outbound request stamped with the current unix time.
    pub fn request(
        cmd: &str,
        id: impl Into<String>,
        payload_type: &str,
        payload: Value,
    ) -> Self {
        Self {
            sender: CLIENT_NAME.to_owned(),
            receiver: String::new(),
            cmd: cmd.to_owned(),
            id: id.into(),
            payload_type: payload_type.to_owned(),
            payload,
            timestamp: chrono::Utc::now().timestamp().to_string(),
            crc: CRC_PLACEHOLDER.to_owned(),
        }
    }

    /// Serialize and append the checksum.
    pub fn encode(&self) -> Result<String, Error> {
        let mut unsigned = self.clone();
        CRC_PLACEHOLDER.clone_into(&mut unsigned.crc);
        let text = serde_json::to_string(&unsigned).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: String::new(),
        })?;
        Ok(apply_crc(&text))
    }

    /// Parse an inbound text frame.
    pub fn parse(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: text.to_owned(),
        })
    }

    /// The `PAYLOAD` as an object, or `None` for any other JSON shape.
    pub fn payload_object(&self) -> Option<&Map<String, Value>> {
        self.payload.as_object()
    }

    /// The sub-object addressed to this client.
    ///
    /// Realtime pushes nest their body under the receiver name; some
    /// firmwares use a numeric receiver id instead, so the first value is
    /// taken when the well-known key is absent. Anything that is not an
    /// object yields an empty map.
    pub fn addressed_body(&self) -> Map<String, Value> {
        let Some(payload) = self.payload_object() else {
            return Map::new();
        };
        let body = payload
            .get(CLIENT_NAME)
            .or_else(|| payload.values().next());
        match body {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        }
    }

    /// `PAYLOAD.RESULT == "OK"`, the success test for typed requests.
    pub fn result_ok(&self) -> bool {
        self.payload
            .get("RESULT")
            .and_then(Value::as_str)
            .is_some_and(|r| r.trim().eq_ignore_ascii_case("OK"))
    }
}

// ── CRC ──────────────────────────────────────────────────────────────

/// Replace the `CRC_16` placeholder with the checksum of every byte up to
/// and including the value's opening quote.
pub fn apply_crc(text: &str) -> String {
    let Some(pos) = text.rfind(CRC_FIELD) else {
        return text.to_owned();
    };
    let prefix = &text[..pos + CRC_FIELD.len()];
    let crc = crc16(prefix.as_bytes());
    format!("{prefix}0x{crc:04x}\"}}")
}

/// CRC-16 (poly 0x1021, init 0xFFFF) in the register form the panel's own
/// web client uses: message bits are shifted in at the bottom.
pub fn crc16(bytes: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in bytes {
        let mut mask: u8 = 0x80;
        while mask != 0 {
            let carry = crc & 0x8000 != 0;
            crc <<= 1;
            if byte & mask != 0 {
                crc |= 1;
            }
            if carry {
                crc ^= 0x1021;
            }
            mask >>= 1;
        }
    }
    crc
}

// ── Lenient decoding ─────────────────────────────────────────────────

/// Accept strings, numbers, booleans and null where the protocol
/// nominally sends strings. Panels are inconsistent about quoting ids.
pub fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_string(&value))
}

/// Optional variant of [`lenient_string`].
pub fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Null => None,
        other => Some(value_to_string(&other)),
    }))
}

/// Render a scalar the way the panel would have quoted it.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

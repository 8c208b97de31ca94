// Request/response tests for `PanelLink` over a scripted in-memory transport.
#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use secrecy::SecretString;
use serde_json::{Value, json};

use lares_api::session::THERMOSTAT_READ_TIMEOUT;
use lares_api::{Error, Frame, PanelLink, Transport, UserAction};

// ── Helpers ─────────────────────────────────────────────────────────

/// Replays canned inbound frames and records everything sent.
struct Scripted {
    inbound: VecDeque<String>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl Transport for Scripted {
    fn send_text(&mut self, text: String) -> BoxFuture<'_, Result<(), Error>> {
        self.sent.lock().unwrap().push(text);
        Box::pin(async { Ok(()) })
    }

    fn recv_text(&mut self) -> BoxFuture<'_, Result<String, Error>> {
        let next = self.inbound.pop_front();
        Box::pin(async move {
            match next {
                Some(text) => Ok(text),
                None => std::future::pending().await,
            }
        })
    }

    fn ping(&mut self) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async { Ok(()) })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async { Ok(()) })
    }
}

fn link(inbound: &[Value]) -> (PanelLink, Arc<Mutex<Vec<String>>>) {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let transport = Scripted {
        inbound: inbound.iter().map(Value::to_string).collect(),
        sent: Arc::clone(&sent),
    };
    (PanelLink::new(Box::new(transport)), sent)
}

fn sent_frames(sent: &Arc<Mutex<Vec<String>>>) -> Vec<Frame> {
    sent.lock()
        .unwrap()
        .iter()
        .map(|t| Frame::parse(t).unwrap())
        .collect()
}

fn pin() -> SecretString {
    SecretString::from("123456".to_owned())
}

// ── Login ───────────────────────────────────────────────────────────

#[tokio::test]
async fn login_returns_issued_identity() {
    let (mut link, sent) = link(&[json!({
        "CMD": "LOGIN_RES", "ID": "1",
        "PAYLOAD": {"RESULT": "OK", "ID_LOGIN": 17}
    })]);

    assert_eq!(link.login(&pin()).await.unwrap(), 17);
    assert_eq!(link.login_id(), 17);

    let frames = sent_frames(&sent);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].cmd, "LOGIN");
    assert_eq!(frames[0].id, "1");
    assert_eq!(frames[0].payload["PIN"], "123456");
    assert!(frames[0].crc.starts_with("0x"));
    assert_ne!(frames[0].crc, "0x0000");
}

#[tokio::test]
async fn rejected_login_yields_minus_one() {
    let (mut link, _) = link(&[json!({
        "CMD": "LOGIN_RES", "ID": "1",
        "PAYLOAD": {"RESULT": "FAIL", "RESULT_DETAIL": "LOGIN_KO"}
    })]);

    assert_eq!(link.login(&pin()).await.unwrap(), -1);
}

// ── Reads ───────────────────────────────────────────────────────────

#[tokio::test]
async fn strict_read_skips_foreign_replies_and_dispatches_them() {
    // First request after construction is allocated ID "2".
    let (mut link, _) = link(&[
        json!({"CMD": "READ_RES", "ID": "99", "PAYLOAD": {"ZONES": []}}),
        json!({"CMD": "REALTIME", "ID": "1", "PAYLOAD": {"HomeAssistant": {"STATUS_ZONES": [{"ID": "1"}]}}}),
        json!({"CMD": "READ_RES", "ID": "2", "PAYLOAD": {"ZONES": [{"ID": "4", "STA": "R"}]}}),
    ]);

    let mut dispatched = Vec::new();
    let payload = link
        .read_zones(&mut |frame| dispatched.push(frame.cmd))
        .await
        .unwrap();

    assert_eq!(payload["ZONES"][0]["ID"], "4");
    assert_eq!(dispatched, vec!["READ_RES".to_owned(), "REALTIME".to_owned()]);
}

#[tokio::test]
async fn version_reply_with_other_id_is_accepted() {
    let (mut link, _) = link(&[json!({
        "CMD": "SYSTEM_VERSION_RES", "ID": "40",
        "PAYLOAD": {"RESULT": "OK", "BRAND": "KSENIA", "MODEL": "lares 4.0"}
    })]);

    let payload = link.system_version(&mut |_| {}).await.unwrap();
    assert_eq!(payload["MODEL"], "lares 4.0");
}

#[tokio::test]
async fn undecodable_frames_are_skipped() {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let transport = Scripted {
        inbound: VecDeque::from(vec![
            "{not json".to_owned(),
            json!({"CMD": "LOGS_RES", "ID": "2", "PAYLOAD": {"LOGS": [{"ID": "10"}]}}).to_string(),
        ]),
        sent: Arc::clone(&sent),
    };
    let mut link = PanelLink::new(Box::new(transport));

    let payload = link.logs(500, &mut |_| {}).await.unwrap();
    assert_eq!(payload["LOGS"][0]["ID"], "10");

    let frames = sent_frames(&sent);
    assert_eq!(frames[0].payload["ITEMS_LOG"], "500");
    assert_eq!(frames[0].payload["ID_LOG"], "MAIN");
}

#[tokio::test(start_paused = true)]
async fn thermostat_read_times_out() {
    let (mut link, _) = link(&[]);

    let started = tokio::time::Instant::now();
    let err = link.read_thermostats(Some(&pin()), &mut |_| {}).await.unwrap_err();

    assert!(matches!(err, Error::Timeout { timeout_secs: 15 }));
    assert!(started.elapsed() >= THERMOSTAT_READ_TIMEOUT);
}

#[tokio::test]
async fn thermostat_read_matches_payload_type() {
    let (mut link, sent) = link(&[
        json!({"CMD": "READ_RES", "ID": "2", "PAYLOAD_TYPE": "MULTI_TYPES", "PAYLOAD": {}}),
        json!({"CMD": "READ_RES", "ID": "7", "PAYLOAD_TYPE": "CFG_THERMOSTATS",
               "PAYLOAD": {"RESULT": "OK", "CFG_THERMOSTATS": [{"ID": "3"}]}}),
    ]);

    let payload = link.read_thermostats(Some(&pin()), &mut |_| {}).await.unwrap();
    assert_eq!(payload["CFG_THERMOSTATS"][0]["ID"], "3");
    assert_eq!(sent_frames(&sent)[0].payload["PIN"], "123456");
}

// ── Writes ──────────────────────────────────────────────────────────

#[tokio::test]
async fn write_config_merges_patch_into_payload() {
    let (mut link, sent) = link(&[json!({
        "CMD": "WRITE_CFG_RES", "ID": "2", "PAYLOAD": {"RESULT": "OK"}
    })]);

    let mut patch = serde_json::Map::new();
    patch.insert("CFG_ACCOUNTS".into(), json!([{"ID": "2", "DACC": "T"}]));
    let reply = link
        .write_config("", patch, Some(&pin()), &mut |_| {})
        .await
        .unwrap();
    assert_eq!(reply["RESULT"], "OK");

    let frame = &sent_frames(&sent)[0];
    assert_eq!(frame.cmd, "WRITE_CFG");
    assert_eq!(frame.payload_type, "CFG_ALL");
    assert_eq!(frame.payload["CFG_ACCOUNTS"][0]["DACC"], "T");
    assert_eq!(frame.payload["PIN"], "123456");
}

#[tokio::test]
async fn user_command_is_fire_and_forget() {
    let (mut link, sent) = link(&[]);

    link.send_user_command(
        "12",
        &UserAction::BypassZone {
            zone: "8".into(),
            bypass: "off".into(),
        },
        &pin(),
    )
    .await
    .unwrap();

    let frame = &sent_frames(&sent)[0];
    assert_eq!(frame.cmd, "CMD_USR");
    assert_eq!(frame.id, "12");
    assert_eq!(frame.payload_type, "CMD_BYP_ZONE");
    assert_eq!(frame.payload["ZONE"], json!({"ID": "8", "BYP": "NO"}));
}

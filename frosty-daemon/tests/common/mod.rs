//! Shared test doubles for daemon integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;

use frosty_eve_pipeline::{Notification, Transport, TransportError};
use frosty_ruleset::protocol::decode_frame;

/// Transport that records deliveries and can fail a set number of times.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Notification>>,
    attempts: AtomicUsize,
    fail_next: AtomicUsize,
}

impl RecordingTransport {
    pub fn failing(n: usize) -> Self {
        Self {
            fail_next: AtomicUsize::new(n),
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("transport lock").clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Transport for RecordingTransport {
    async fn deliver(&self, notification: &Notification) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::Timeout { stage: "DATA" });
        }
        self.sent.lock().expect("transport lock").push(notification.clone());
        Ok(())
    }
}

/// Serve a fake sensor control socket in `dir`.
///
/// Answers the handshake, `version` and `conf-get` (with `rule_path`, or NOK
/// when `None`). Every other command gets `{"return":"OK","message":"done"}`.
pub fn spawn_sensor(dir: &Path, rule_path: Option<&'static str>) -> PathBuf {
    let path = dir.join("suricata-command.socket");
    let listener = UnixListener::bind(&path).expect("bind fake sensor");

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                loop {
                    let frame = loop {
                        if let Ok(Some((value, used))) = decode_frame(&buf) {
                            buf.drain(..used);
                            break value;
                        }
                        let mut chunk = [0u8; 1024];
                        match stream.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    };
                    let reply = match frame.get("command").and_then(Value::as_str) {
                        None => json!({"return": "OK"}),
                        Some("version") => json!({"return": "OK", "message": "7.0.2 RELEASE"}),
                        Some("conf-get") => match rule_path {
                            Some(dir) => json!({"return": "OK", "message": dir}),
                            None => json!({"return": "NOK", "message": "Variable not found"}),
                        },
                        Some(_) => json!({"return": "OK", "message": "done"}),
                    };
                    let bytes = serde_json::to_vec(&reply).expect("encode reply");
                    if stream.write_all(&bytes).await.is_err() {
                        return;
                    }
                }
            });
        }
    });
    path
}

//! 센서 제어 채널
//!
//! [`ControlChannel`]은 논리적 작업 하나에만 쓰이는 일회용 연결입니다.
//! `connect` → `call`/`probe` (여러 번 가능) → `close` 순서로 사용하며,
//! 오래 유지하는 연결은 만들지 않습니다.
//!
//! # 실패 처리
//! - 응답 대기 시간 초과: [`ControlError::Timeout`], 연결을 닫음
//! - 프레임 디코딩 실패 / 응답 형태 위반 / NOK: 연결을 닫고 에러 반환
//! - 채널 내부에서는 재시도하지 않음
//!
//! 연결이 닫힌 뒤의 `call`은 [`ControlError::Protocol`]로 실패합니다.

use std::path::{Path, PathBuf};
use std::time::Duration;

use metrics::counter;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::debug;

use frosty_core::metrics as m;

use crate::error::ControlError;
use crate::protocol::{
    self, ControlRequest, ControlResponse, Handshake, ReplyStatus, decode_frame, parse_response,
};

/// 한 번에 읽는 바이트 수
const READ_CHUNK: usize = 4096;

/// 핸드셰이크를 마친 제어 채널
#[derive(Debug)]
pub struct ControlChannel {
    stream: Option<UnixStream>,
    buf: Vec<u8>,
    timeout: Duration,
    path: PathBuf,
}

impl ControlChannel {
    /// 연결하고 버전 핸드셰이크를 수행합니다. 센서가 OK를 보내지 않으면 실패합니다.
    pub async fn connect(path: &Path, timeout: Duration) -> Result<Self, ControlError> {
        let stream = match tokio::time::timeout(timeout, UnixStream::connect(path)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(ControlError::Connect {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(ControlError::Timeout {
                    command: "connect".to_owned(),
                });
            }
        };

        let mut channel = Self {
            stream: Some(stream),
            buf: Vec::with_capacity(READ_CHUNK),
            timeout,
            path: path.to_path_buf(),
        };

        let reply = channel
            .exchange("handshake", &protocol::encode(&Handshake::default())?)
            .await?;
        if reply.status != ReplyStatus::Ok {
            channel.shutdown().await;
            return Err(ControlError::Rejected {
                command: "handshake".to_owned(),
                message: reply.message_text(),
            });
        }
        debug!(path = %channel.path.display(), "control channel ready");
        Ok(channel)
    }

    /// 명령을 보내고 `message`를 반환합니다.
    ///
    /// 응답이 NOK이면 [`ControlError::Rejected`], OK인데 `message`가 없으면
    /// [`ControlError::Protocol`]입니다. 두 경우 모두 연결을 닫습니다.
    pub async fn call(&mut self, request: &ControlRequest) -> Result<Value, ControlError> {
        let reply = self.send(request).await?;
        match (reply.status, reply.message) {
            (ReplyStatus::Ok, Some(message)) => Ok(message),
            (ReplyStatus::Ok, None) => {
                self.shutdown().await;
                Err(ControlError::Protocol(format!(
                    "'{}' reply is OK but carries no message",
                    request.command
                )))
            }
            (ReplyStatus::Nok, message) => {
                self.shutdown().await;
                Err(ControlError::Rejected {
                    command: request.command.clone(),
                    message: ControlResponse {
                        status: ReplyStatus::Nok,
                        message,
                    }
                    .message_text(),
                })
            }
        }
    }

    /// NOK를 정상 응답으로 받아들이는 조회용 명령입니다.
    ///
    /// `message`가 없는 응답도 유효합니다.
    pub async fn probe(&mut self, request: &ControlRequest) -> Result<ControlResponse, ControlError> {
        self.send(request).await
    }

    /// 연결을 닫습니다.
    pub async fn close(mut self) {
        self.shutdown().await;
    }

    /// 연결이 열려 있는지 확인합니다.
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    async fn send(&mut self, request: &ControlRequest) -> Result<ControlResponse, ControlError> {
        let frame = protocol::encode(request)?;
        let result = self.exchange(&request.command, &frame).await;
        let outcome = match &result {
            Ok(reply) if reply.status == ReplyStatus::Ok => "ok",
            Ok(_) => "nok",
            Err(ControlError::Timeout { .. }) => "timeout",
            Err(_) => "error",
        };
        counter!(
            m::CONTROL_COMMANDS_TOTAL,
            m::LABEL_COMMAND => request.command.clone(),
            m::LABEL_RESULT => outcome
        )
        .increment(1);
        result
    }

    /// 프레임 하나를 보내고 응답 프레임 하나를 읽습니다.
    async fn exchange(&mut self, command: &str, frame: &[u8]) -> Result<ControlResponse, ControlError> {
        let timeout = self.timeout;
        let result = match tokio::time::timeout(timeout, self.round_trip(frame)).await {
            Ok(result) => result,
            Err(_) => Err(ControlError::Timeout {
                command: command.to_owned(),
            }),
        };
        match result {
            Ok(reply) => Ok(reply),
            Err(e) => {
                // 오래된 응답이 다음 호출에 섞이지 않도록 연결을 버립니다.
                self.shutdown().await;
                Err(e)
            }
        }
    }

    async fn round_trip(&mut self, frame: &[u8]) -> Result<ControlResponse, ControlError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| ControlError::Protocol("channel is closed".to_owned()))?;

        stream.write_all(frame).await?;
        stream.flush().await?;

        loop {
            if let Some((value, used)) = decode_frame(&self.buf)? {
                self.buf.drain(..used);
                return parse_response(value);
            }
            let mut chunk = [0u8; READ_CHUNK];
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(ControlError::Protocol(
                    "connection closed before a complete response".to_owned(),
                ));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    async fn shutdown(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::commands;
    use serde_json::json;
    use tokio::net::UnixListener;

    /// 요청 프레임 하나를 읽을 때마다 `replies`의 다음 응답을 보내는 가짜 센서
    fn fake_sensor(dir: &tempfile::TempDir, replies: Vec<&'static str>) -> PathBuf {
        let path = dir.path().join("suricata-command.socket");
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            for reply in replies {
                loop {
                    if let Ok(Some((_, used))) = decode_frame(&buf) {
                        buf.drain(..used);
                        break;
                    }
                    let mut chunk = [0u8; 1024];
                    let n = stream.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        return;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                if !reply.is_empty() {
                    stream.write_all(reply.as_bytes()).await.unwrap();
                }
            }
            // 연결 유지 (타임아웃 테스트용)
            tokio::time::sleep(Duration::from_secs(30)).await;
        });
        path
    }

    const OK: &str = r#"{"return":"OK"}"#;

    #[tokio::test]
    async fn call_returns_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = fake_sensor(&dir, vec![OK, r#"{"return":"OK","message":"7.0.2 RELEASE"}"#]);

        let mut channel = ControlChannel::connect(&path, Duration::from_secs(5)).await.unwrap();
        let message = channel.call(&ControlRequest::new(commands::VERSION)).await.unwrap();
        assert_eq!(message, json!("7.0.2 RELEASE"));
        channel.close().await;
    }

    #[tokio::test]
    async fn split_response_is_reassembled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sock");
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut chunk = [0u8; 64];
            let _ = stream.read(&mut chunk).await.unwrap();
            stream.write_all(b"{\"return\":").await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            stream.write_all(b"\"OK\"}\n").await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let channel = ControlChannel::connect(&path, Duration::from_secs(5)).await.unwrap();
        assert!(channel.is_open());
    }

    #[tokio::test]
    async fn rejected_handshake_fails_connect() {
        let dir = tempfile::tempdir().unwrap();
        let path = fake_sensor(&dir, vec![r#"{"return":"NOK","message":"bad version"}"#]);

        let err = ControlChannel::connect(&path, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, ControlError::Rejected { ref command, .. } if command == "handshake"));
    }

    #[tokio::test]
    async fn nok_in_require_ok_mode_is_rejected_and_closes() {
        let dir = tempfile::tempdir().unwrap();
        let path = fake_sensor(&dir, vec![OK, r#"{"return":"NOK","message":"reload in progress"}"#]);

        let mut channel = ControlChannel::connect(&path, Duration::from_secs(5)).await.unwrap();
        let err = channel
            .call(&ControlRequest::new(commands::RELOAD_RULES))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ControlError::Rejected { ref message, .. } if message == "reload in progress"
        ));
        assert!(!channel.is_open());

        let err = channel
            .call(&ControlRequest::new(commands::VERSION))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Protocol(_)));
    }

    #[tokio::test]
    async fn ok_without_message_is_protocol_error_in_require_ok_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = fake_sensor(&dir, vec![OK, OK]);

        let mut channel = ControlChannel::connect(&path, Duration::from_secs(5)).await.unwrap();
        let err = channel
            .call(&ControlRequest::new(commands::VERSION))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Protocol(_)));
    }

    #[tokio::test]
    async fn probe_accepts_nok_without_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = fake_sensor(&dir, vec![OK, r#"{"return":"NOK"}"#]);

        let mut channel = ControlChannel::connect(&path, Duration::from_secs(5)).await.unwrap();
        let reply = channel
            .probe(
                &ControlRequest::new(commands::CONF_GET).with_argument("variable", "missing.key"),
            )
            .await
            .unwrap();
        assert_eq!(reply.status, ReplyStatus::Nok);
        assert!(channel.is_open());
    }

    #[tokio::test]
    async fn malformed_reply_is_protocol_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = fake_sensor(&dir, vec![OK, "not json at all"]);

        let mut channel = ControlChannel::connect(&path, Duration::from_secs(5)).await.unwrap();
        let err = channel
            .call(&ControlRequest::new(commands::VERSION))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Protocol(_)));
        assert!(!channel.is_open());
    }

    #[tokio::test]
    async fn silent_sensor_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = fake_sensor(&dir, vec![OK, ""]);

        let mut channel = ControlChannel::connect(&path, Duration::from_millis(200))
            .await
            .unwrap();
        let err = channel
            .call(&ControlRequest::new(commands::RELOAD_RULES))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ControlError::Timeout { ref command } if command == "ruleset-reload-rules"
        ));
        assert!(!channel.is_open());
    }

    #[tokio::test]
    async fn missing_socket_is_connect_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ControlChannel::connect(&dir.path().join("absent"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Connect { .. }));
    }
}

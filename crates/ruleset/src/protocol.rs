//! 센서 제어 프로토콜 프레임
//!
//! 프레임은 JSON 객체 하나입니다. 구분자가 없으므로 수신측은 바이트를 누적하며
//! 완전한 JSON 값 하나가 디코딩될 때까지 읽습니다 ([`decode_frame`]).
//!
//! ```text
//! client → {"version":"0.1"}
//! server ← {"return":"OK"}
//! client → {"command":"conf-get","arguments":{"variable":"default-rule-path"}}
//! server ← {"return":"OK","message":"/etc/suricata/rules"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ControlError;

/// 핸드셰이크에서 보내는 프로토콜 버전
pub const PROTOCOL_VERSION: &str = "0.1";

/// 응답 프레임 최대 크기
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// 명령 이름
pub mod commands {
    /// 센서 버전 조회
    pub const VERSION: &str = "version";
    /// 설정 키 조회 (NOK = 설정되지 않음)
    pub const CONF_GET: &str = "conf-get";
    /// 룰 리로드
    pub const RELOAD_RULES: &str = "ruleset-reload-rules";
    /// 로드/실패 룰 수
    pub const RULESET_STATS: &str = "ruleset-stats";
    /// 실패한 룰 상세
    pub const FAILED_RULES: &str = "ruleset-failed-rules";
}

/// 핸드셰이크 프레임
#[derive(Debug, Serialize)]
pub struct Handshake<'a> {
    /// 프로토콜 버전
    pub version: &'a str,
}

impl Default for Handshake<'_> {
    fn default() -> Self {
        Self {
            version: PROTOCOL_VERSION,
        }
    }
}

/// 요청 프레임
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlRequest {
    /// 명령 이름
    pub command: String,
    /// 인자 (비어 있으면 생략)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Map<String, Value>>,
}

impl ControlRequest {
    /// 인자 없는 요청을 생성합니다.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            arguments: None,
        }
    }

    /// 인자를 하나 추가합니다.
    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }
}

/// 응답 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyStatus {
    /// 성공
    #[serde(rename = "OK")]
    Ok,
    /// 실패 (명령에 따라 "없음"을 뜻하기도 함)
    #[serde(rename = "NOK")]
    Nok,
}

/// 응답 프레임
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ControlResponse {
    /// 응답 상태
    #[serde(rename = "return")]
    pub status: ReplyStatus,
    /// 응답 내용
    #[serde(default)]
    pub message: Option<Value>,
}

impl ControlResponse {
    /// `message`를 사람이 읽을 수 있는 문자열로 변환합니다.
    pub fn message_text(&self) -> String {
        match &self.message {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "(no message)".to_owned(),
        }
    }
}

/// 프레임을 직렬화합니다.
pub fn encode<T: Serialize>(frame: &T) -> Result<Vec<u8>, ControlError> {
    serde_json::to_vec(frame).map_err(|e| ControlError::Protocol(format!("encode failed: {e}")))
}

/// 버퍼 앞쪽에서 완전한 JSON 값 하나를 디코딩합니다.
///
/// 값이 아직 완성되지 않았으면 `Ok(None)`을 반환합니다.
/// 완성되었으면 값과 소비한 바이트 수를 반환합니다.
pub fn decode_frame(buf: &[u8]) -> Result<Option<(Value, usize)>, ControlError> {
    let mut stream = serde_json::Deserializer::from_slice(buf).into_iter::<Value>();
    match stream.next() {
        None => Ok(None),
        Some(Ok(value)) => Ok(Some((value, stream.byte_offset()))),
        Some(Err(e)) if e.is_eof() => {
            if buf.len() > MAX_FRAME_LEN {
                Err(ControlError::Protocol(format!(
                    "response frame exceeds {MAX_FRAME_LEN} bytes"
                )))
            } else {
                Ok(None)
            }
        }
        Some(Err(e)) => Err(ControlError::Protocol(format!("malformed frame: {e}"))),
    }
}

/// 디코딩된 값을 응답 프레임으로 해석합니다.
pub fn parse_response(value: Value) -> Result<ControlResponse, ControlError> {
    if !value.is_object() {
        return Err(ControlError::Protocol(format!(
            "response is not an object: {value}"
        )));
    }
    serde_json::from_value(value)
        .map_err(|e| ControlError::Protocol(format!("unexpected response shape: {e}")))
}

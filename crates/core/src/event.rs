//! 이벤트 모델 -- EVE 로그 한 줄과 알림 이벤트
//!
//! [`EventRecord`]는 센서 이벤트 로그의 한 줄을 디코딩한 결과입니다.
//! 임의의 키/값 매핑이며 `event_type` 문자열 필드만 필수입니다.
//! `event_type`이 없는 레코드는 생성 자체가 불가능하므로 분류 단계를
//! 넘어 전달될 수 없습니다.
//!
//! [`AlertEvent`]는 `event_type == "alert"`로 확인된 레코드입니다.
//! 딥 링크 생성에 필요한 하위 필드(`alert.signature`, `flow_id`,
//! `flow.start`, `timestamp`)가 없더라도 알림은 버려지지 않습니다.

use std::fmt;
use std::time::SystemTime;

use serde_json::{Map, Value};

/// 알림 이벤트 타입
pub const EVENT_TYPE_ALERT: &str = "alert";

/// 레코드 디코딩 실패 사유
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// JSON 문법 오류
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    /// 최상위 값이 객체가 아님
    #[error("record is not a json object")]
    NotAnObject,

    /// `event_type` 필드가 없거나 문자열이 아님
    #[error("record has no string event_type")]
    MissingEventType,
}

/// 디코딩된 로그 레코드
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    event_type: String,
    fields: Map<String, Value>,
}

impl EventRecord {
    /// 한 줄(개행 제외)을 JSON으로 디코딩합니다.
    pub fn from_slice(line: &[u8]) -> Result<Self, RecordError> {
        let value: Value = serde_json::from_slice(line)?;
        Self::from_value(value)
    }

    /// 이미 파싱된 JSON 값에서 레코드를 생성합니다.
    pub fn from_value(value: Value) -> Result<Self, RecordError> {
        let Value::Object(fields) = value else {
            return Err(RecordError::NotAnObject);
        };
        let event_type = fields
            .get("event_type")
            .and_then(Value::as_str)
            .ok_or(RecordError::MissingEventType)?
            .to_owned();
        Ok(Self { event_type, fields })
    }

    /// 이벤트 타입
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// 알림 레코드인지 확인합니다.
    pub fn is_alert(&self) -> bool {
        self.event_type == EVENT_TYPE_ALERT
    }

    /// 점(.)으로 구분된 경로로 중첩 필드를 조회합니다. (예: `"alert.signature"`)
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// 문자열 필드를 조회합니다.
    pub fn lookup_str(&self, path: &str) -> Option<&str> {
        self.lookup(path).and_then(Value::as_str)
    }

    /// 원본 필드 매핑
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// 사람이 읽기 좋은 형태로 직렬화합니다.
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.fields).unwrap_or_else(|_| format!("{:?}", self.fields))
    }

    /// 알림 레코드이면 [`AlertEvent`]로 변환합니다.
    pub fn into_alert(self) -> Result<AlertEvent, Self> {
        if self.is_alert() {
            Ok(AlertEvent {
                record: self,
                observed_at: SystemTime::now(),
            })
        } else {
            Err(self)
        }
    }
}

/// `event_type == "alert"`인 레코드
#[derive(Debug, Clone)]
pub struct AlertEvent {
    record: EventRecord,
    /// Tailer가 로그에서 관측한 시각
    pub observed_at: SystemTime,
}

impl AlertEvent {
    /// 원본 레코드
    pub fn record(&self) -> &EventRecord {
        &self.record
    }

    /// `alert.signature`
    pub fn signature(&self) -> Option<&str> {
        self.record.lookup_str("alert.signature")
    }

    /// `alert.category`
    pub fn category(&self) -> Option<&str> {
        self.record.lookup_str("alert.category")
    }

    /// `alert.severity`
    pub fn severity(&self) -> Option<u64> {
        self.record.lookup("alert.severity").and_then(Value::as_u64)
    }

    /// `flow_id`. 숫자 또는 숫자 문자열을 허용합니다.
    pub fn flow_id(&self) -> Option<u64> {
        match self.record.lookup("flow_id")? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// `flow.start`
    pub fn flow_start(&self) -> Option<&str> {
        self.record.lookup_str("flow.start")
    }

    /// 탐지 시각 `timestamp`
    pub fn timestamp(&self) -> Option<&str> {
        self.record.lookup_str("timestamp")
    }

    /// `proto src_ip:src_port -> dest_ip:dest_port` 요약. IP가 없으면 `None`.
    pub fn endpoints(&self) -> Option<String> {
        let src = self.record.lookup_str("src_ip")?;
        let dest = self.record.lookup_str("dest_ip")?;
        let port = |key: &str| {
            self.record
                .lookup(key)
                .and_then(Value::as_u64)
                .map(|p| format!(":{p}"))
                .unwrap_or_default()
        };
        let proto = self.record.lookup_str("proto").unwrap_or("?");
        Some(format!(
            "{proto} {src}{} -> {dest}{}",
            port("src_port"),
            port("dest_port")
        ))
    }
}

impl fmt::Display for AlertEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "alert(signature={}, flow_id={})",
            self.signature().unwrap_or("<none>"),
            self.flow_id()
                .map(|id| id.to_string())
                .unwrap_or_else(|| "<none>".to_owned())
        )
    }
}

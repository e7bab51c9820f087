//! 레코드 분류와 통계
//!
//! [`classify`]는 완전한 줄 하나를 디코딩해 알림/기타 이벤트/에러로 나눕니다.
//! `event_type`이 없는 레코드와 공백뿐인 줄은 [`Classified::Invalid`]가 되어 분류 단계를 넘지 못합니다.
//!
//! [`TailerStats`]는 이벤트 타입별 카운터를 모았다가 일정 주기마다
//! 요약 로그 한 줄로 내보내고 초기화합니다.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use frosty_core::event::{AlertEvent, EventRecord, RecordError};

/// 분류 결과
#[derive(Debug)]
pub enum Classified {
    /// 알림 레코드
    Alert(AlertEvent),
    /// 알림이 아닌 레코드 (이벤트 타입)
    Other(String),
    /// 디코딩 실패
    Invalid(RecordError),
}

/// 줄 하나를 분류합니다.
pub fn classify(line: &[u8]) -> Classified {
    match EventRecord::from_slice(line) {
        Ok(record) => match record.into_alert() {
            Ok(alert) => Classified::Alert(alert),
            Err(record) => Classified::Other(record.event_type().to_owned()),
        },
        Err(e) => Classified::Invalid(e),
    }
}

/// 통계 키
pub mod keys {
    /// 읽은 완전한 줄
    pub const LINES_READ: &str = "lines-read";
    /// 디코딩 실패
    pub const BAD_JSON: &str = "bad-json";
    /// 최대 길이 초과
    pub const OVERSIZED: &str = "oversized";
    /// 큐에 넣은 알림
    pub const ALERTS: &str = "alerts";
    /// 회전 후 다시 연 횟수
    pub const REOPENS: &str = "reopens";
}

/// 주기적으로 요약되는 카운터
#[derive(Debug)]
pub struct TailerStats {
    counters: BTreeMap<String, u64>,
    interval: Duration,
    last_emit: Instant,
}

impl TailerStats {
    /// 요약 주기를 지정하여 생성합니다.
    pub fn new(interval: Duration) -> Self {
        Self {
            counters: BTreeMap::new(),
            interval,
            last_emit: Instant::now(),
        }
    }

    /// 카운터를 1 증가시킵니다.
    pub fn incr(&mut self, key: &str) {
        *self.counters.entry(key.to_owned()).or_default() += 1;
    }

    /// 이벤트 타입별 카운터를 1 증가시킵니다.
    pub fn incr_event(&mut self, event_type: &str) {
        *self
            .counters
            .entry(format!("event.{event_type}"))
            .or_default() += 1;
    }

    /// 카운터 값
    pub fn get(&self, key: &str) -> u64 {
        self.counters.get(key).copied().unwrap_or(0)
    }

    /// `key = value, ...` 형태의 요약 (키 순서 정렬)
    pub fn summary(&self) -> String {
        self.counters
            .iter()
            .map(|(k, v)| format!("{k} = {v}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// 주기가 지났으면 요약을 로그로 내보내고 초기화합니다.
    pub fn maybe_emit(&mut self) {
        if self.last_emit.elapsed() >= self.interval {
            self.emit();
        }
    }

    /// 요약을 로그로 내보내고 초기화합니다. 카운터가 비어 있으면 아무것도 하지 않습니다.
    pub fn emit(&mut self) {
        if !self.counters.is_empty() {
            tracing::info!(stats = %self.summary(), "event log stats");
            self.counters.clear();
        }
        self.last_emit = Instant::now();
    }
}

//! 이벤트 파이프라인 설정
//!
//! [`TailerConfig`]와 [`NotifierConfig`]는 core의
//! [`FrostyConfig`](frosty_core::config::FrostyConfig)에서 파생됩니다.
//! 테스트에서는 짧은 주기를 쓰기 위해 구조체를 직접 구성합니다.
//!
//! # 사용 예시
//! ```ignore
//! use frosty_core::config::FrostyConfig;
//! use frosty_eve_pipeline::config::{NotifierConfig, TailerConfig};
//!
//! let core = FrostyConfig::default();
//! let tailer = TailerConfig::from_core(&core);
//! let notifier = NotifierConfig::from_core(&core);
//! ```

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use frosty_core::config::FrostyConfig;

use crate::error::EvePipelineError;

/// Tailer 설정
#[derive(Debug, Clone)]
pub struct TailerConfig {
    /// 센서 이벤트 로그 경로
    pub event_log: PathBuf,
    /// 변경 알림 대기 상한
    pub watch_timeout: Duration,
    /// 24시간 내 허용되는 파싱 에러 수
    pub error_cap_24h: usize,
    /// 이벤트 타입별 카운터 요약 주기
    pub stats_interval: Duration,
    /// 한 줄의 최대 바이트 수
    pub max_line_length: usize,
    /// 한 번에 읽는 바이트 수
    pub read_chunk_size: usize,
    /// "too many errors" 알림 제목
    pub subject: String,
}

impl Default for TailerConfig {
    fn default() -> Self {
        Self {
            event_log: PathBuf::from("/var/log/suricata/eve.json"),
            watch_timeout: Duration::from_millis(1000),
            error_cap_24h: 10,
            stats_interval: Duration::from_secs(600),
            max_line_length: 1024 * 1024,
            read_chunk_size: 64 * 1024,
            subject: "suricata alerts".to_owned(),
        }
    }
}

impl TailerConfig {
    /// core 설정에서 Tailer 설정을 생성합니다.
    pub fn from_core(core: &FrostyConfig) -> Self {
        Self {
            event_log: PathBuf::from(&core.sensor.event_log),
            watch_timeout: Duration::from_millis(core.pipeline.watch_timeout_ms),
            error_cap_24h: core.pipeline.error_cap_24h,
            stats_interval: Duration::from_secs(core.pipeline.stats_interval_secs),
            max_line_length: core.pipeline.max_line_length,
            subject: core.notify.subject.clone(),
            ..Self::default()
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), EvePipelineError> {
        validate_log_path(&self.event_log)?;

        if self.watch_timeout.is_zero() {
            return Err(config_error("watch_timeout", "must be greater than 0"));
        }
        if self.error_cap_24h == 0 {
            return Err(config_error("error_cap_24h", "must be greater than 0"));
        }
        if self.stats_interval.is_zero() {
            return Err(config_error("stats_interval", "must be greater than 0"));
        }
        if self.max_line_length == 0 {
            return Err(config_error("max_line_length", "must be greater than 0"));
        }
        if self.read_chunk_size == 0 {
            return Err(config_error("read_chunk_size", "must be greater than 0"));
        }
        Ok(())
    }
}

/// Notifier 설정
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// 한 번 깨어날 때 한 알림 메시지로 묶는 최대 알림 수
    pub batch_limit: usize,
    /// 24시간 내 허용되는 알림 수
    pub alert_cap_24h: usize,
    /// 알림 제목
    pub subject: String,
    /// Kibana 주소 (빈 문자열이면 딥 링크 생략)
    pub dashboard_url: String,
    /// Kibana 인덱스 패턴
    pub index_pattern: String,
    /// 딥 링크 시간창 여유 (앞뒤 각각)
    pub link_window: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            batch_limit: 20,
            alert_cap_24h: 100,
            subject: "suricata alerts".to_owned(),
            dashboard_url: String::new(),
            index_pattern: "logstash-*".to_owned(),
            link_window: Duration::from_secs(300),
        }
    }
}

impl NotifierConfig {
    /// core 설정에서 Notifier 설정을 생성합니다.
    pub fn from_core(core: &FrostyConfig) -> Self {
        Self {
            batch_limit: core.pipeline.batch_limit,
            alert_cap_24h: core.pipeline.alert_cap_24h,
            subject: core.notify.subject.clone(),
            dashboard_url: core.notify.dashboard_url.clone(),
            index_pattern: core.notify.index_pattern.clone(),
            link_window: Duration::from_secs(core.notify.link_window_secs),
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), EvePipelineError> {
        if self.batch_limit == 0 {
            return Err(config_error("batch_limit", "must be greater than 0"));
        }
        if self.alert_cap_24h == 0 {
            return Err(config_error("alert_cap_24h", "must be greater than 0"));
        }
        Ok(())
    }
}

/// 로그 경로가 안전한지 검증합니다.
///
/// - 절대 경로여야 함
/// - ".." 컴포넌트를 포함하지 않아야 함
fn validate_log_path(path: &Path) -> Result<(), EvePipelineError> {
    if path.as_os_str().is_empty() {
        return Err(config_error("event_log", "must not be empty"));
    }
    if path.components().any(|c| c == Component::ParentDir) {
        return Err(config_error(
            "event_log",
            format!("'{}' contains path traversal pattern '..'", path.display()),
        ));
    }
    if !path.is_absolute() {
        return Err(config_error(
            "event_log",
            format!("'{}' must be an absolute path", path.display()),
        ));
    }
    Ok(())
}

fn config_error(field: &str, reason: impl Into<String>) -> EvePipelineError {
    EvePipelineError::Config {
        field: field.to_owned(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configs_are_valid() {
        TailerConfig::default().validate().unwrap();
        NotifierConfig::default().validate().unwrap();
    }

    #[test]
    fn from_core_preserves_values() {
        let mut core = FrostyConfig::default();
        core.sensor.event_log = "/data/suricata/eve.json".to_owned();
        core.pipeline.error_cap_24h = 3;
        core.pipeline.batch_limit = 5;
        core.notify.dashboard_url = "http://kibana:5601".to_owned();

        let tailer = TailerConfig::from_core(&core);
        assert_eq!(tailer.event_log, PathBuf::from("/data/suricata/eve.json"));
        assert_eq!(tailer.error_cap_24h, 3);
        assert_eq!(tailer.read_chunk_size, 64 * 1024);

        let notifier = NotifierConfig::from_core(&core);
        assert_eq!(notifier.batch_limit, 5);
        assert_eq!(notifier.dashboard_url, "http://kibana:5601");
        assert_eq!(notifier.link_window, Duration::from_secs(300));
    }

    #[test]
    fn relative_log_path_is_rejected() {
        let config = TailerConfig {
            event_log: PathBuf::from("eve.json"),
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("absolute"));
    }

    #[test]
    fn traversal_log_path_is_rejected() {
        let config = TailerConfig {
            event_log: PathBuf::from("/var/log/../../etc/shadow"),
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains(".."));
    }

    #[test]
    fn zero_batch_limit_is_rejected() {
        let config = NotifierConfig {
            batch_limit: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}

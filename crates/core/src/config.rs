//! 설정 관리 -- frosty.toml 파싱 및 런타임 설정
//!
//! [`FrostyConfig`]는 모든 worker의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`FROSTY_SENSOR_EVENT_LOG=/var/log/suricata/eve.json` 형식)
//! 3. 설정 파일 (`frosty.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), frosty_core::error::FrostyError> {
//! use frosty_core::config::FrostyConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = FrostyConfig::load("frosty.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = FrostyConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, FrostyError};

/// 지원하는 룰 피드 종류
pub const FEED_KIND_EMERGING_THREATS: &str = "emerging-threats";

/// frosty 통합 설정
///
/// `frosty.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 worker는 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrostyConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 센서 연결 설정
    #[serde(default)]
    pub sensor: SensorConfig,
    /// 이벤트 파이프라인 설정
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// 알림 전송 설정
    #[serde(default)]
    pub notify: NotifyConfig,
    /// 룰셋 갱신 설정
    #[serde(default)]
    pub ruleset: RulesetConfig,
    /// supervisor 설정
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl FrostyConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, FrostyError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, FrostyError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FrostyError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                FrostyError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, FrostyError> {
        toml::from_str(toml_str).map_err(|e| {
            FrostyError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `FROSTY_{SECTION}_{FIELD}`.
    /// 룰 소스 목록(`[[ruleset.sources]]`)은 파일에서만 설정합니다.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "FROSTY_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "FROSTY_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pid_file, "FROSTY_GENERAL_PID_FILE");

        // Sensor
        override_string(
            &mut self.sensor.control_socket,
            "FROSTY_SENSOR_CONTROL_SOCKET",
        );
        override_string(&mut self.sensor.event_log, "FROSTY_SENSOR_EVENT_LOG");
        override_u64(
            &mut self.sensor.command_timeout_secs,
            "FROSTY_SENSOR_COMMAND_TIMEOUT_SECS",
        );

        // Pipeline
        override_usize(
            &mut self.pipeline.queue_capacity,
            "FROSTY_PIPELINE_QUEUE_CAPACITY",
        );
        override_usize(&mut self.pipeline.batch_limit, "FROSTY_PIPELINE_BATCH_LIMIT");
        override_usize(
            &mut self.pipeline.error_cap_24h,
            "FROSTY_PIPELINE_ERROR_CAP_24H",
        );
        override_usize(
            &mut self.pipeline.alert_cap_24h,
            "FROSTY_PIPELINE_ALERT_CAP_24H",
        );
        override_u64(
            &mut self.pipeline.stats_interval_secs,
            "FROSTY_PIPELINE_STATS_INTERVAL_SECS",
        );
        override_u64(
            &mut self.pipeline.watch_timeout_ms,
            "FROSTY_PIPELINE_WATCH_TIMEOUT_MS",
        );
        override_usize(
            &mut self.pipeline.max_line_length,
            "FROSTY_PIPELINE_MAX_LINE_LENGTH",
        );

        // Notify
        override_string(&mut self.notify.smtp_host, "FROSTY_NOTIFY_SMTP_HOST");
        override_u16(&mut self.notify.smtp_port, "FROSTY_NOTIFY_SMTP_PORT");
        override_string(&mut self.notify.sender, "FROSTY_NOTIFY_SENDER");
        override_string(&mut self.notify.recipient, "FROSTY_NOTIFY_RECIPIENT");
        override_string(&mut self.notify.subject, "FROSTY_NOTIFY_SUBJECT");
        override_u64(&mut self.notify.timeout_secs, "FROSTY_NOTIFY_TIMEOUT_SECS");
        override_string(&mut self.notify.dashboard_url, "FROSTY_NOTIFY_DASHBOARD_URL");
        override_string(&mut self.notify.index_pattern, "FROSTY_NOTIFY_INDEX_PATTERN");
        override_u64(
            &mut self.notify.link_window_secs,
            "FROSTY_NOTIFY_LINK_WINDOW_SECS",
        );

        // Ruleset
        override_bool(&mut self.ruleset.enabled, "FROSTY_RULESET_ENABLED");
        override_u64(
            &mut self.ruleset.refresh_interval_secs,
            "FROSTY_RULESET_REFRESH_INTERVAL_SECS",
        );
        override_string(&mut self.ruleset.rules_dir, "FROSTY_RULESET_RULES_DIR");
        override_string(&mut self.ruleset.scratch_dir, "FROSTY_RULESET_SCRATCH_DIR");
        override_u64(
            &mut self.ruleset.http_timeout_secs,
            "FROSTY_RULESET_HTTP_TIMEOUT_SECS",
        );

        // Supervisor
        override_u64(
            &mut self.supervisor.poll_interval_ms,
            "FROSTY_SUPERVISOR_POLL_INTERVAL_MS",
        );
        override_u64(
            &mut self.supervisor.stop_timeout_secs,
            "FROSTY_SUPERVISOR_STOP_TIMEOUT_SECS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "FROSTY_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "FROSTY_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "FROSTY_METRICS_PORT");
        override_string(&mut self.metrics.endpoint, "FROSTY_METRICS_ENDPOINT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), FrostyError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.sensor.control_socket.is_empty() {
            return Err(invalid("sensor.control_socket", "must not be empty"));
        }
        if self.sensor.event_log.is_empty() {
            return Err(invalid("sensor.event_log", "must not be empty"));
        }
        if self.sensor.command_timeout_secs == 0 {
            return Err(invalid("sensor.command_timeout_secs", "must be greater than 0"));
        }

        self.pipeline.validate()?;
        self.notify.validate()?;
        self.ruleset.validate()?;

        if self.supervisor.poll_interval_ms == 0 {
            return Err(invalid("supervisor.poll_interval_ms", "must be greater than 0"));
        }
        if self.supervisor.stop_timeout_secs == 0 {
            return Err(invalid(
                "supervisor.stop_timeout_secs",
                "must be greater than 0",
            ));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid("metrics.port", "must be greater than 0"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> FrostyError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// PID 파일 경로 (빈 문자열이면 PID 파일을 만들지 않음)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            pid_file: "/var/run/frosty.pid".to_owned(),
        }
    }
}

/// 센서 연결 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// 센서 제어 소켓 경로 (Unix domain socket)
    pub control_socket: String,
    /// 센서 이벤트 로그 경로 (EVE JSON)
    pub event_log: String,
    /// 제어 명령 타임아웃 (초). 룰 리로드가 수 분 걸릴 수 있습니다.
    pub command_timeout_secs: u64,
}

impl SensorConfig {
    /// 제어 명령 타임아웃
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            control_socket: "/var/run/suricata/suricata-command.socket".to_owned(),
            event_log: "/var/log/suricata/eve.json".to_owned(),
            command_timeout_secs: 300,
        }
    }
}

/// 이벤트 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 알림 큐 용량 (가득 차면 Tailer가 대기)
    pub queue_capacity: usize,
    /// Notifier가 한 번 깨어날 때 모으는 최대 알림 수
    pub batch_limit: usize,
    /// 24시간 내 허용되는 파싱 에러 수
    pub error_cap_24h: usize,
    /// 24시간 내 허용되는 알림 수
    pub alert_cap_24h: usize,
    /// 이벤트 타입별 카운터 요약 로그 주기 (초)
    pub stats_interval_secs: u64,
    /// 파일 변경 알림 대기 상한 (밀리초)
    pub watch_timeout_ms: u64,
    /// 한 줄의 최대 바이트 수
    pub max_line_length: usize,
}

impl PipelineConfig {
    fn validate(&self) -> Result<(), FrostyError> {
        if self.queue_capacity == 0 || self.queue_capacity > 1_000_000 {
            return Err(invalid("pipeline.queue_capacity", "must be 1-1000000"));
        }
        if self.batch_limit == 0 || self.batch_limit > 1000 {
            return Err(invalid("pipeline.batch_limit", "must be 1-1000"));
        }
        if self.error_cap_24h == 0 {
            return Err(invalid("pipeline.error_cap_24h", "must be greater than 0"));
        }
        if self.alert_cap_24h == 0 {
            return Err(invalid("pipeline.alert_cap_24h", "must be greater than 0"));
        }
        if self.stats_interval_secs == 0 {
            return Err(invalid(
                "pipeline.stats_interval_secs",
                "must be greater than 0",
            ));
        }
        if self.watch_timeout_ms == 0 || self.watch_timeout_ms > 60_000 {
            return Err(invalid("pipeline.watch_timeout_ms", "must be 1-60000"));
        }
        if self.max_line_length < 1024 {
            return Err(invalid("pipeline.max_line_length", "must be at least 1024"));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            batch_limit: 20,
            error_cap_24h: 10,
            alert_cap_24h: 100,
            stats_interval_secs: 600,
            watch_timeout_ms: 1000,
            max_line_length: 1024 * 1024,
        }
    }
}

/// 알림 전송 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// SMTP 릴레이 호스트
    pub smtp_host: String,
    /// SMTP 릴레이 포트
    pub smtp_port: u16,
    /// 발신자 주소
    pub sender: String,
    /// 수신자 주소
    pub recipient: String,
    /// 알림 제목
    pub subject: String,
    /// SMTP 단계별 타임아웃 (초)
    pub timeout_secs: u64,
    /// Kibana 주소 (빈 문자열이면 딥 링크를 생략)
    pub dashboard_url: String,
    /// Kibana 인덱스 패턴
    pub index_pattern: String,
    /// 딥 링크 시간창 여유 (초, 앞뒤 각각)
    pub link_window_secs: u64,
}

impl NotifyConfig {
    /// SMTP 단계별 타임아웃
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self) -> Result<(), FrostyError> {
        if self.smtp_host.is_empty() {
            return Err(invalid("notify.smtp_host", "must not be empty"));
        }
        if self.smtp_port == 0 {
            return Err(invalid("notify.smtp_port", "must be greater than 0"));
        }
        if !self.sender.contains('@') {
            return Err(invalid("notify.sender", "must be an email address"));
        }
        if !self.recipient.contains('@') {
            return Err(invalid("notify.recipient", "must be an email address"));
        }
        if self.timeout_secs == 0 {
            return Err(invalid("notify.timeout_secs", "must be greater than 0"));
        }
        Ok(())
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            smtp_host: "127.0.0.1".to_owned(),
            smtp_port: 25,
            sender: "frosty@localhost".to_owned(),
            recipient: "root@localhost".to_owned(),
            subject: "suricata alerts".to_owned(),
            timeout_secs: 30,
            dashboard_url: String::new(),
            index_pattern: "logstash-*".to_owned(),
            link_window_secs: 300,
        }
    }
}

/// 룰셋 갱신 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesetConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 갱신 주기 (초)
    pub refresh_interval_secs: u64,
    /// 설치 디렉토리 (빈 문자열이면 센서의 `default-rule-path`를 조회)
    pub rules_dir: String,
    /// 다운로드/압축 해제용 임시 디렉토리 (빈 문자열이면 시스템 임시 디렉토리)
    pub scratch_dir: String,
    /// HTTP 요청 타임아웃 (초)
    pub http_timeout_secs: u64,
    /// 룰 소스 목록
    pub sources: Vec<RuleSourceConfig>,
}

impl RulesetConfig {
    fn validate(&self) -> Result<(), FrostyError> {
        if !self.enabled {
            return Ok(());
        }
        if self.refresh_interval_secs < 60 {
            return Err(invalid(
                "ruleset.refresh_interval_secs",
                "must be at least 60",
            ));
        }
        if self.http_timeout_secs == 0 {
            return Err(invalid("ruleset.http_timeout_secs", "must be greater than 0"));
        }
        let mut names = std::collections::HashSet::new();
        for source in &self.sources {
            if source.name.is_empty() {
                return Err(invalid("ruleset.sources.name", "must not be empty"));
            }
            if !names.insert(source.name.as_str()) {
                return Err(invalid(
                    "ruleset.sources.name",
                    format!("duplicate source '{}'", source.name),
                ));
            }
            if source.kind != FEED_KIND_EMERGING_THREATS {
                return Err(invalid(
                    "ruleset.sources.kind",
                    format!("unknown feed kind '{}'", source.kind),
                ));
            }
            if source.output_file.contains('/') {
                return Err(invalid(
                    "ruleset.sources.output_file",
                    "must be a bare file name",
                ));
            }
        }
        Ok(())
    }
}

impl Default for RulesetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh_interval_secs: 3600,
            rules_dir: String::new(),
            scratch_dir: String::new(),
            http_timeout_secs: 60,
            sources: vec![RuleSourceConfig::default()],
        }
    }
}

/// 룰 소스 하나의 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSourceConfig {
    /// 소스 이름 (RulesetVersion 키)
    pub name: String,
    /// 피드 종류
    pub kind: String,
    /// ET Pro 구독 코드 (빈 문자열이면 open 룰셋)
    pub oinkcode: String,
    /// 설치될 파일 이름 (rules_dir 기준)
    pub output_file: String,
    /// 파일 이름별 제외 부분 문자열 목록
    pub blacklist: BTreeMap<String, Vec<String>>,
}

impl Default for RuleSourceConfig {
    fn default() -> Self {
        Self {
            name: "emerging-threats".to_owned(),
            kind: FEED_KIND_EMERGING_THREATS.to_owned(),
            oinkcode: String::new(),
            output_file: "osint-suricata-et.rules".to_owned(),
            blacklist: BTreeMap::new(),
        }
    }
}

/// supervisor 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// worker 생존 확인 주기 (밀리초)
    pub poll_interval_ms: u64,
    /// worker 하나당 정지 대기 상한 (초)
    pub stop_timeout_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            stop_timeout_secs: 30,
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
    /// 엔드포인트 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key, "bool");
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                type_name,
                "failed to parse env var, ignoring"
            ),
        }
    }
}

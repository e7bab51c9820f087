//! 센서 고수준 명령
//!
//! [`SensorControl`]은 RulesetManager와 Orchestrator가 센서에 요구하는 명령만 묶은 trait입니다.
//! [`SocketSensor`]는 명령마다 [`ControlChannel`]을 새로 열고 닫습니다.
//!
//! 리로드가 OK로 끝난 뒤의 `ruleset-stats` / `ruleset-failed-rules` 조회는 보고용입니다.
//! 이 조회가 실패해도 리로드는 성공으로 취급하고 경고만 남깁니다.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use frosty_core::config::SensorConfig;

use crate::control::ControlChannel;
use crate::error::ControlError;
use crate::protocol::{ControlRequest, ReplyStatus, commands};

/// 룰 리로드 결과
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReloadReport {
    /// 로드된 룰 수 (모든 detect engine 합계)
    pub rules_loaded: u64,
    /// 로드에 실패한 룰 수
    pub rules_failed: u64,
    /// 실패한 룰 상세 (`rules_failed > 0`일 때만 조회)
    pub failures: Option<Value>,
    /// `ruleset-stats` 조회에 성공했는지. `false`이면 두 카운터는 0입니다.
    pub stats_available: bool,
}

/// 센서 제어 trait
pub trait SensorControl: Send + Sync + 'static {
    /// 센서 버전 (`major.minor.patch`)
    fn version(&self) -> impl Future<Output = Result<semver::Version, ControlError>> + Send;

    /// 설정 키 조회. 설정되지 않았으면 `None`.
    fn conf_get(
        &self,
        variable: &str,
    ) -> impl Future<Output = Result<Option<String>, ControlError>> + Send;

    /// 룰을 리로드하고 로드 결과를 확인합니다.
    fn reload_rules(&self) -> impl Future<Output = Result<ReloadReport, ControlError>> + Send;
}

/// Unix 소켓 기반 센서 제어
#[derive(Debug, Clone)]
pub struct SocketSensor {
    socket: PathBuf,
    timeout: Duration,
}

impl SocketSensor {
    /// 소켓 경로와 명령 타임아웃으로 생성합니다.
    pub fn new(socket: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            socket: socket.into(),
            timeout,
        }
    }

    /// core 설정에서 생성합니다.
    pub fn from_config(config: &SensorConfig) -> Self {
        Self::new(&config.control_socket, config.command_timeout())
    }

    async fn open(&self) -> Result<ControlChannel, ControlError> {
        ControlChannel::connect(&self.socket, self.timeout).await
    }
}

impl SensorControl for SocketSensor {
    async fn version(&self) -> Result<semver::Version, ControlError> {
        let mut channel = self.open().await?;
        let message = channel.call(&ControlRequest::new(commands::VERSION)).await?;
        channel.close().await;
        parse_version(&message)
    }

    async fn conf_get(&self, variable: &str) -> Result<Option<String>, ControlError> {
        let mut channel = self.open().await?;
        let reply = channel
            .probe(&ControlRequest::new(commands::CONF_GET).with_argument("variable", variable))
            .await?;
        channel.close().await;
        Ok(match reply.status {
            ReplyStatus::Ok => Some(reply.message_text()),
            ReplyStatus::Nok => None,
        })
    }

    async fn reload_rules(&self) -> Result<ReloadReport, ControlError> {
        let mut channel = self.open().await?;
        let started = std::time::Instant::now();
        channel
            .call(&ControlRequest::new(commands::RELOAD_RULES))
            .await?;
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "sensor rules reloaded");

        let stats = match channel
            .call(&ControlRequest::new(commands::RULESET_STATS))
            .await
        {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "rules reloaded but ruleset stats unavailable");
                channel.close().await;
                return Ok(ReloadReport::default());
            }
        };
        let (rules_loaded, rules_failed) = sum_rule_stats(&stats);

        let failures = if rules_failed > 0 {
            match channel
                .call(&ControlRequest::new(commands::FAILED_RULES))
                .await
            {
                Ok(detail) => {
                    warn!(rules_failed, detail = %detail, "sensor failed to load some rules");
                    Some(detail)
                }
                Err(e) => {
                    warn!(rules_failed, error = %e, "sensor failed to load some rules, detail unavailable");
                    None
                }
            }
        } else {
            None
        };
        channel.close().await;

        Ok(ReloadReport {
            rules_loaded,
            rules_failed,
            failures,
            stats_available: true,
        })
    }
}

/// `version` 응답 앞쪽의 시맨틱 버전
const VERSION_PATTERN: &str = r"^(\d+)\.(\d+)\.(\d+)";

/// `version` 응답에서 앞쪽의 `major.minor.patch`를 읽습니다.
pub fn parse_version(message: &Value) -> Result<semver::Version, ControlError> {
    let text = message.as_str().unwrap_or_default();
    let pattern = Regex::new(VERSION_PATTERN)
        .map_err(|e| ControlError::Protocol(format!("version pattern: {e}")))?;
    let captures = pattern.captures(text).ok_or_else(|| {
        ControlError::Protocol(format!("unexpected version format: {message}"))
    })?;
    let part = |i: usize| {
        captures
            .get(i)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .ok_or_else(|| ControlError::Protocol(format!("unexpected version format: {text}")))
    };
    Ok(semver::Version::new(part(1)?, part(2)?, part(3)?))
}

/// `ruleset-stats` 응답의 로드/실패 룰 수를 모든 detect engine에 걸쳐 합산합니다.
///
/// 응답은 객체 하나 또는 객체 배열입니다.
pub fn sum_rule_stats(stats: &Value) -> (u64, u64) {
    let engines: Vec<&Value> = match stats {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    engines.iter().fold((0, 0), |(loaded, failed), engine| {
        let field = |name: &str| engine.get(name).and_then(Value::as_u64).unwrap_or(0);
        (loaded + field("rules_loaded"), failed + field("rules_failed"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn version_prefix_is_parsed() {
        assert_eq!(
            parse_version(&json!("7.0.2 RELEASE")).unwrap(),
            semver::Version::new(7, 0, 2)
        );
        assert_eq!(
            parse_version(&json!("6.0.10-dev (abc123)")).unwrap(),
            semver::Version::new(6, 0, 10)
        );
    }

    #[test]
    fn unexpected_version_is_protocol_error() {
        assert!(matches!(
            parse_version(&json!("RELEASE 7")),
            Err(ControlError::Protocol(_))
        ));
        assert!(parse_version(&json!({"version": "7.0.2"})).is_err());
    }

    #[test]
    fn stats_are_summed_across_engines() {
        let stats = json!([
            {"id": 0, "rules_loaded": 30000, "rules_failed": 2},
            {"id": 1, "rules_loaded": 12, "rules_failed": 0}
        ]);
        assert_eq!(sum_rule_stats(&stats), (30012, 2));
        assert_eq!(
            sum_rule_stats(&json!({"rules_loaded": 5, "rules_failed": 1})),
            (5, 1)
        );
        assert_eq!(sum_rule_stats(&json!("done")), (0, 0));
    }
}

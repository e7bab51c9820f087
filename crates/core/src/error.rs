//! 에러 타입 -- 도메인별 에러 정의

/// frosty 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum FrostyError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 이벤트 파이프라인 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 룰셋 관리 에러 (센서 제어 채널 포함)
    #[error("ruleset error: {0}")]
    Ruleset(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 큐 전송 실패 (소비자 종료)
    #[error("queue closed: {0}")]
    QueueClosed(String),

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 알림 전송 실패
    #[error("delivery failed: {0}")]
    Delivery(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_to_frosty_error() {
        let err: FrostyError = ConfigError::InvalidValue {
            field: "pipeline.batch_limit".to_owned(),
            reason: "must be 1-1000".to_owned(),
        }
        .into();
        assert!(matches!(err, FrostyError::Config(_)));
        assert!(err.to_string().contains("pipeline.batch_limit"));
    }

    #[test]
    fn pipeline_error_display() {
        let err = PipelineError::QueueClosed("notifier stopped".to_owned());
        assert_eq!(err.to_string(), "queue closed: notifier stopped");
    }
}

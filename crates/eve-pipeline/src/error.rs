//! 이벤트 파이프라인 에러 타입
//!
//! [`EvePipelineError`]는 Tailer/AlertQueue/Notifier 내부에서 발생하는 에러를 표현합니다.
//! `From<EvePipelineError> for FrostyError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use frosty_core::error::{FrostyError, PipelineError};

/// 이벤트 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum EvePipelineError {
    /// 이벤트 로그를 열 수 없음
    #[error("cannot open event log {path}: {reason}")]
    Open {
        /// 로그 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 파일 변경 감시 설정 실패
    #[error("watch error: {0}")]
    Watch(String),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 알림 큐가 닫힘
    #[error("alert queue closed")]
    QueueClosed,

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<notify::Error> for EvePipelineError {
    fn from(err: notify::Error) -> Self {
        Self::Watch(err.to_string())
    }
}

impl From<EvePipelineError> for FrostyError {
    fn from(err: EvePipelineError) -> Self {
        match err {
            EvePipelineError::QueueClosed => {
                FrostyError::Pipeline(PipelineError::QueueClosed(err.to_string()))
            }
            other => FrostyError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}

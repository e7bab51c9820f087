//! 룰셋 관리 에러 타입
//!
//! - [`ControlError`]: 센서 제어 채널 (연결, 타임아웃, 프로토콜 위반, NOK 응답)
//! - [`FeedError`]: 룰 피드 메타데이터 조회와 다운로드
//! - [`RulesetError`]: 갱신 주기 전체 (설치, 리로드, 취소)
//!
//! 모두 `From<…> for FrostyError`를 구현하여 `?`로 상위 에러로 전파됩니다.

use frosty_core::error::FrostyError;

/// 제어 채널 에러
///
/// 채널 내부에서는 어떤 에러도 재시도하지 않습니다. 재시도 정책은 호출자의 몫입니다.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// 소켓 연결 실패
    #[error("control socket connect failed: {path}: {reason}")]
    Connect {
        /// 소켓 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 명령 응답 대기 시간 초과
    #[error("control command '{command}' timed out")]
    Timeout {
        /// 명령 이름
        command: String,
    },

    /// 프레임 디코딩 실패, 응답 형태 위반, 닫힌 채널 사용
    #[error("control protocol error: {0}")]
    Protocol(String),

    /// OK가 필요한 명령에 NOK 응답
    #[error("control command '{command}' rejected: {message}")]
    Rejected {
        /// 명령 이름
        command: String,
        /// 센서가 돌려준 메시지
        message: String,
    },

    /// 소켓 I/O 에러
    #[error("control socket io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 룰 피드 에러
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// HTTP 요청 실패 또는 비정상 상태 코드
    #[error("http error: {0}")]
    Http(String),

    /// `Last-Modified` 헤더 누락
    #[error("missing Last-Modified header")]
    MissingLastModified,

    /// `Last-Modified` 헤더 형식 오류 (UTC가 아닌 경우 포함)
    #[error("invalid Last-Modified header: {0}")]
    BadLastModified(String),

    /// 압축 해제 또는 룰 파일 수집 실패
    #[error("extract failed: {0}")]
    Extract(String),

    /// 정지 요청으로 다운로드 중단
    #[error("fetch cancelled")]
    Cancelled,

    /// 파일 I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        FeedError::Http(err.to_string())
    }
}

/// 룰셋 갱신 에러
#[derive(Debug, thiserror::Error)]
pub enum RulesetError {
    /// 센서 제어 실패 (리로드 포함)
    #[error(transparent)]
    Control(#[from] ControlError),

    /// 룰 파일 설치 실패
    #[error("install failed: {path}: {reason}")]
    Install {
        /// 설치 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 정지 요청으로 갱신 중단
    #[error("refresh cancelled")]
    Cancelled,
}

impl From<ControlError> for FrostyError {
    fn from(err: ControlError) -> Self {
        FrostyError::Ruleset(err.to_string())
    }
}

impl From<FeedError> for FrostyError {
    fn from(err: FeedError) -> Self {
        FrostyError::Ruleset(err.to_string())
    }
}

impl From<RulesetError> for FrostyError {
    fn from(err: RulesetError) -> Self {
        FrostyError::Ruleset(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_names_command() {
        let err = ControlError::Timeout {
            command: "ruleset-reload-rules".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "control command 'ruleset-reload-rules' timed out"
        );
    }

    #[test]
    fn control_error_is_transparent_in_ruleset_error() {
        let err: RulesetError = ControlError::Protocol("bad frame".to_owned()).into();
        assert_eq!(err.to_string(), "control protocol error: bad frame");
    }

    #[test]
    fn converts_to_frosty_error() {
        let err: FrostyError = FeedError::MissingLastModified.into();
        assert!(matches!(err, FrostyError::Ruleset(ref msg) if msg.contains("Last-Modified")));
    }
}

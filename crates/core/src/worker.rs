//! Worker 계약 -- 장기 실행 작업 단위의 공통 인터페이스
//!
//! Tailer, Notifier, RulesetManager는 모두 [`Worker`]를 구현합니다.
//! 각 worker는 하나의 tokio 태스크에서 순차 루프로 실행되며,
//! 모든 대기 지점에서 [`CancellationToken`]을 확인하여 협조적으로 종료합니다.
//!
//! # 생명주기
//! ```text
//! spawn(run) → Running → (cancel | self-stop | failure) → WorkerExit
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

/// `Send` 가능한 박싱된 Future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// worker 종료 사유
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// 외부에서 정지를 요청하여 종료함
    Requested,
    /// 속도 제한 초과 등으로 스스로 의도적으로 종료함
    ///
    /// 최종 알림은 worker가 종료 전에 이미 시도했습니다.
    SelfStopped(String),
    /// 복구 불가능한 실패로 종료함
    Failed(String),
}

impl WorkerExit {
    /// 의도된 종료인지 확인합니다 (정지 요청 또는 자체 종료).
    pub fn is_intentional(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "stop requested"),
            Self::SelfStopped(reason) => write!(f, "self-stopped: {reason}"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// 장기 실행 worker trait
///
/// `run`은 `cancel`이 취소되거나 worker가 스스로 종료할 때까지 실행됩니다.
/// 내부의 복구 가능한 에러는 `run` 밖으로 새어나가지 않아야 하며,
/// 속도 제한 초과와 복구 불가능한 설정 실패만 worker를 종료시킵니다.
pub trait Worker: Send + 'static {
    /// 로그와 상태 보고에 사용할 worker 이름
    fn name(&self) -> &'static str;

    /// worker 루프를 실행합니다.
    fn run(self, cancel: CancellationToken) -> impl Future<Output = WorkerExit> + Send;
}

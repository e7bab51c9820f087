//! 파일 변경 알림
//!
//! [`LogWatcher`]는 `notify` 감시자를 감싸 파일 이벤트를 [`WatchSignal`]로 바꿉니다.
//! 이벤트 종류는 힌트일 뿐이며, 회전 여부는 Tailer가 파일 식별자로 재검증합니다.
//!
//! 아직 읽지 않은 신호는 가장 강한 것 하나로 합쳐 보관하므로,
//! Tailer가 큐에서 오래 막혀 있어도 메모리가 늘지 않습니다.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use notify::event::{AccessKind, AccessMode, EventKind, ModifyKind};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::EvePipelineError;

/// Tailer를 깨운 이유
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WatchSignal {
    /// 대기 시간 안에 이벤트가 없음
    Idle,
    /// 내용이 추가됨
    Modified,
    /// 쓰기 핸들이 닫혔거나 경로가 이동/삭제됨 (회전 후보)
    Closed,
}

impl WatchSignal {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Modified,
            _ => Self::Closed,
        }
    }
}

/// 콜백과 Tailer 사이의 합쳐진 신호
#[derive(Debug, Default)]
struct PendingSignal {
    strongest: AtomicU8,
    wake: Notify,
}

impl PendingSignal {
    fn raise(&self, signal: WatchSignal) {
        self.strongest.fetch_max(signal as u8, Ordering::AcqRel);
        self.wake.notify_one();
    }

    fn take(&self) -> WatchSignal {
        WatchSignal::from_u8(self.strongest.swap(WatchSignal::Idle as u8, Ordering::AcqRel))
    }
}

/// 이벤트 종류를 신호로 변환합니다. 관심 없는 이벤트는 `None`.
pub fn classify_event(kind: &EventKind) -> Option<WatchSignal> {
    match kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => Some(WatchSignal::Closed),
        EventKind::Modify(ModifyKind::Name(_)) | EventKind::Remove(_) => Some(WatchSignal::Closed),
        EventKind::Modify(_) => Some(WatchSignal::Modified),
        _ => None,
    }
}

/// 로그 파일 감시자
pub struct LogWatcher {
    watcher: RecommendedWatcher,
    pending: Arc<PendingSignal>,
    path: PathBuf,
}

impl LogWatcher {
    /// `path`에 대한 감시를 시작합니다.
    pub fn new(path: &Path) -> Result<Self, EvePipelineError> {
        let pending = Arc::new(PendingSignal::default());
        let raised = Arc::clone(&pending);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Some(signal) = classify_event(&event.kind) {
                    raised.raise(signal);
                }
            }
            Err(e) => warn!(error = %e, "file watch error"),
        })?;
        watcher.watch(path, RecursiveMode::NonRecursive)?;
        Ok(Self {
            watcher,
            pending,
            path: path.to_path_buf(),
        })
    }

    /// 다음 신호를 최대 `timeout`까지 기다립니다.
    ///
    /// 이미 쌓여 있는 신호는 하나로 합치며, `Closed`가 `Modified`보다 우선합니다.
    pub async fn next(&mut self, timeout: Duration) -> WatchSignal {
        if tokio::time::timeout(timeout, self.pending.wake.notified())
            .await
            .is_err()
        {
            return WatchSignal::Idle;
        }
        self.pending.take()
    }

    /// 회전 후 같은 경로의 새 파일로 감시를 다시 설정합니다.
    ///
    /// 이전 파일에 대한 감시는 해제되며, 이미 큐에 들어온 신호는 버립니다.
    pub fn rewatch(&mut self) -> Result<(), EvePipelineError> {
        if let Err(e) = self.watcher.unwatch(&self.path) {
            debug!(error = %e, "unwatch of rotated file failed");
        }
        self.pending.take();
        self.watcher.watch(&self.path, RecursiveMode::NonRecursive)?;
        Ok(())
    }

    /// 감시 중인 경로
    pub fn path(&self) -> &Path {
        &self.path
    }
}

//! Tailer -- 센서 이벤트 로그 추적 worker
//!
//! 이벤트 로그를 따라 읽으며 완전한 줄을 분류하고, 알림 레코드를
//! [`AlertSender`]로 넘깁니다.
//!
//! # 상태 전이
//! ```text
//! opening ──(파일 끝으로 이동, 감시 설정)──> following
//! following ──(Modified / Idle)──> 새 줄 읽기 ──> following
//! following ──(Closed / Idle + 식별자 변경 또는 truncation)──> rotating
//! rotating ──(처음부터 다시 열기, 감시 재설정, 즉시 읽기)──> following
//! ```
//!
//! 회전 여부는 알림 종류가 아니라 파일 식별자(device + inode)와 크기로 판정합니다.
//! 다른 프로세스가 파일을 닫아 생기는 가짜 `Closed` 알림은 식별자가 같으므로 무시됩니다.

pub mod framing;
pub mod position;
pub mod router;
pub mod watch;

use std::sync::Arc;

use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use frosty_core::metrics as m;
use frosty_core::worker::{Worker, WorkerExit};

use crate::config::TailerConfig;
use crate::error::EvePipelineError;
use crate::queue::AlertSender;
use crate::rate::RateWindow;
use crate::transport::{Notification, Transport};

use self::framing::Frame;
use self::position::{LogPosition, PathState};
use self::router::{Classified, TailerStats, classify, keys};
use self::watch::{LogWatcher, WatchSignal};

/// 로그 줄 미리보기 최대 길이
const PREVIEW_LEN: usize = 200;

/// 이벤트 로그 추적 worker
pub struct Tailer<T: Transport> {
    config: TailerConfig,
    queue: AlertSender,
    transport: Arc<T>,
    errors: RateWindow,
    stats: TailerStats,
    scratch: Vec<u8>,
}

impl<T: Transport> Tailer<T> {
    /// 새 Tailer를 생성합니다.
    ///
    /// `transport`는 에러 상한 초과 시 마지막 알림에만 사용됩니다.
    pub fn new(
        config: TailerConfig,
        queue: AlertSender,
        transport: Arc<T>,
    ) -> Result<Self, EvePipelineError> {
        config.validate()?;
        Ok(Self {
            errors: RateWindow::daily(config.error_cap_24h),
            stats: TailerStats::new(config.stats_interval),
            scratch: Vec::with_capacity(config.read_chunk_size),
            config,
            queue,
            transport,
        })
    }

    async fn follow(&mut self, cancel: &CancellationToken) -> WorkerExit {
        let path = self.config.event_log.clone();
        let max_line = self.config.max_line_length;

        let mut position = match LogPosition::open_at_end(&path, max_line).await {
            Ok(position) => position,
            Err(e) => return WorkerExit::Failed(e.to_string()),
        };
        let mut watcher = match LogWatcher::new(&path) {
            Ok(watcher) => watcher,
            Err(e) => return WorkerExit::Failed(e.to_string()),
        };
        info!(
            path = %path.display(),
            offset = position.offset(),
            "tailing event log"
        );

        loop {
            let signal = tokio::select! {
                biased;
                _ = cancel.cancelled() => return WorkerExit::Requested,
                signal = watcher.next(self.config.watch_timeout) => signal,
            };
            self.stats.maybe_emit();

            // 이전 핸들에 남은 줄을 먼저 모두 읽습니다.
            if let Some(exit) = self.drain(&mut position, cancel).await {
                return exit;
            }
            if signal == WatchSignal::Modified {
                continue;
            }

            match position.check_path(&path).await {
                PathState::Unchanged => {
                    if signal == WatchSignal::Closed {
                        debug!("close notification without rotation, ignoring");
                    }
                }
                PathState::Missing => {
                    debug!(path = %path.display(), "event log missing, retrying on next wake");
                }
                state @ (PathState::Replaced | PathState::Truncated) => {
                    let fresh = match LogPosition::open_at_start(&path, max_line).await {
                        Ok(fresh) => fresh,
                        Err(e) => {
                            warn!(error = %e, "reopen after rotation failed, retrying on next wake");
                            continue;
                        }
                    };
                    if position.framer().pending() > 0 {
                        warn!(
                            bytes = position.framer().pending(),
                            "discarding incomplete line from rotated file"
                        );
                    }
                    info!(?state, offset = position.offset(), "event log rotated, reopening");
                    position = fresh;
                    self.stats.incr(keys::REOPENS);
                    counter!(m::TAILER_ROTATIONS_TOTAL).increment(1);

                    if let Err(e) = watcher.rewatch() {
                        warn!(error = %e, "re-establishing watch failed, falling back to polling");
                    }
                    // 감시 재설정 전에 쓰인 줄을 놓치지 않도록 바로 읽습니다.
                    if let Some(exit) = self.drain(&mut position, cancel).await {
                        return exit;
                    }
                }
            }
        }
    }

    /// EOF까지 읽고 완전한 줄을 모두 처리합니다.
    async fn drain(
        &mut self,
        position: &mut LogPosition,
        cancel: &CancellationToken,
    ) -> Option<WorkerExit> {
        loop {
            let read = position
                .fill(&mut self.scratch, self.config.read_chunk_size)
                .await;
            match read {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "event log read failed");
                    return None;
                }
            }
            while let Some(frame) = position.framer().next_frame() {
                if let Some(exit) = self.route(frame, cancel).await {
                    return Some(exit);
                }
            }
            if cancel.is_cancelled() {
                return Some(WorkerExit::Requested);
            }
        }
    }

    async fn route(&mut self, frame: Frame, cancel: &CancellationToken) -> Option<WorkerExit> {
        let line = match frame {
            Frame::Line(line) => line,
            Frame::Oversized(len) => {
                self.stats.incr(keys::OVERSIZED);
                error!(
                    bytes = len,
                    max = self.config.max_line_length,
                    "event log line too long, discarded"
                );
                return self.record_error("line exceeds maximum length").await;
            }
        };

        self.stats.incr(keys::LINES_READ);
        counter!(m::TAILER_LINES_TOTAL).increment(1);

        match classify(&line) {
            Classified::Invalid(e) => {
                self.stats.incr(keys::BAD_JSON);
                error!(
                    error = %e,
                    line = %preview(&line),
                    "failed to decode event log line"
                );
                self.record_error(&e.to_string()).await
            }
            Classified::Other(event_type) => {
                self.stats.incr_event(&event_type);
                counter!(m::TAILER_EVENTS_TOTAL, m::LABEL_EVENT_TYPE => event_type).increment(1);
                None
            }
            Classified::Alert(alert) => {
                self.stats.incr_event(frosty_core::event::EVENT_TYPE_ALERT);
                counter!(
                    m::TAILER_EVENTS_TOTAL,
                    m::LABEL_EVENT_TYPE => frosty_core::event::EVENT_TYPE_ALERT
                )
                .increment(1);

                let label = alert.to_string();
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        error!(alert = %label, "unhandled alert: stop requested while queue was full");
                        Some(WorkerExit::Requested)
                    }
                    sent = self.queue.enqueue(alert) => match sent {
                        Ok(()) => {
                            self.stats.incr(keys::ALERTS);
                            counter!(m::TAILER_ALERTS_ENQUEUED_TOTAL).increment(1);
                            None
                        }
                        Err(e) => {
                            error!(alert = %label, "unhandled alert: queue closed");
                            Some(WorkerExit::Failed(e.to_string()))
                        }
                    },
                }
            }
        }
    }

    /// 에러를 창에 기록하고, 상한을 넘으면 마지막 알림을 보낸 뒤 종료 사유를 반환합니다.
    async fn record_error(&mut self, reason: &str) -> Option<WorkerExit> {
        counter!(m::TAILER_PARSE_ERRORS_TOTAL).increment(1);
        if !self.errors.record() {
            return None;
        }

        let cap = self.errors.cap();
        error!(cap, "too many event log errors in 24 hours, stopping tailer");
        let notification = Notification::new(
            self.config.subject.clone(),
            format!(
                "frosty stopped reading {}: more than {cap} malformed lines in 24 hours.\n\
                 last error: {reason}\n",
                self.config.event_log.display()
            ),
        );
        if let Err(e) = self.transport.deliver(&notification).await {
            warn!(error = %e, "too-many-errors notification failed");
        }
        Some(WorkerExit::SelfStopped(format!(
            "more than {cap} event log errors in 24 hours"
        )))
    }
}

impl<T: Transport> Worker for Tailer<T> {
    fn name(&self) -> &'static str {
        "tailer"
    }

    async fn run(mut self, cancel: CancellationToken) -> WorkerExit {
        let exit = self.follow(&cancel).await;
        self.stats.emit();
        info!(reason = %exit, "tailer stopped");
        exit
    }
}

fn preview(line: &[u8]) -> String {
    let end = line.len().min(PREVIEW_LEN);
    let mut text = String::from_utf8_lossy(&line[..end]).into_owned();
    if line.len() > PREVIEW_LEN {
        text.push_str("...");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::Path;
    use std::time::Duration;

    use crate::queue::{self, AlertReceiver};
    use crate::transport::MockTransport;

    fn config(path: &Path) -> TailerConfig {
        TailerConfig {
            event_log: path.to_path_buf(),
            watch_timeout: Duration::from_millis(50),
            ..Default::default()
        }
    }

    fn append(path: &Path, text: &str) {
        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .unwrap();
        f.write_all(text.as_bytes()).unwrap();
        f.flush().unwrap();
    }

    fn alert_line(flow_id: u64) -> String {
        format!(
            "{{\"event_type\":\"alert\",\"alert\":{{\"signature\":\"sig {flow_id}\"}},\"flow_id\":{flow_id}}}\n"
        )
    }

    async fn next_flow_id(rx: &mut AlertReceiver) -> u64 {
        tokio::time::timeout(Duration::from_secs(5), rx.dequeue())
            .await
            .expect("alert within 5s")
            .expect("queue open")
            .flow_id()
            .expect("flow_id")
    }

    struct Running {
        rx: AlertReceiver,
        transport: Arc<MockTransport>,
        cancel: CancellationToken,
        handle: tokio::task::JoinHandle<WorkerExit>,
    }

    async fn start(config: TailerConfig) -> Running {
        let (tx, rx) = queue::bounded(64);
        let transport = Arc::new(MockTransport::default());
        let tailer = Tailer::new(config, tx, Arc::clone(&transport)).unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(tailer.run(cancel.clone()));
        // 파일 끝으로 이동하고 감시를 설정할 시간
        tokio::time::sleep(Duration::from_millis(200)).await;
        Running {
            rx,
            transport,
            cancel,
            handle,
        }
    }

    #[tokio::test]
    async fn existing_content_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eve.json");
        append(&path, &alert_line(1));

        let mut t = start(config(&path)).await;
        append(&path, &alert_line(2));
        assert_eq!(next_flow_id(&mut t.rx).await, 2);

        t.cancel.cancel();
        assert_eq!(t.handle.await.unwrap(), WorkerExit::Requested);
    }

    #[tokio::test]
    async fn partial_writes_are_reassembled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eve.json");
        append(&path, "");

        let mut t = start(config(&path)).await;
        let line = alert_line(42);
        let (head, tail) = line.split_at(20);
        append(&path, head);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(t.rx.is_empty());
        append(&path, tail);
        assert_eq!(next_flow_id(&mut t.rx).await, 42);

        t.cancel.cancel();
        t.handle.await.unwrap();
        assert!(t.transport.delivered().is_empty());
    }

    #[tokio::test]
    async fn rename_rotation_keeps_order_without_loss() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eve.json");
        append(&path, "");

        let mut t = start(config(&path)).await;
        for id in 1..=3 {
            append(&path, &alert_line(id));
        }
        std::fs::rename(&path, dir.path().join("eve.json.1")).unwrap();
        append(&path, &alert_line(4));
        append(&path, &alert_line(5));

        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(next_flow_id(&mut t.rx).await);
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(t.rx.is_empty(), "no duplicates after rotation");

        t.cancel.cancel();
        t.handle.await.unwrap();
    }

    #[tokio::test]
    async fn truncation_rotation_reads_from_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eve.json");
        append(&path, "");

        let mut t = start(config(&path)).await;
        append(&path, &alert_line(1));
        append(&path, &alert_line(2));
        assert_eq!(next_flow_id(&mut t.rx).await, 1);
        assert_eq!(next_flow_id(&mut t.rx).await, 2);

        std::fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .and_then(|f| f.set_len(0))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        append(&path, &alert_line(3));
        assert_eq!(next_flow_id(&mut t.rx).await, 3);

        t.cancel.cancel();
        t.handle.await.unwrap();
    }

    #[tokio::test]
    async fn eleventh_error_stops_tailer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eve.json");
        append(&path, "");

        let mut t = start(config(&path)).await;
        for _ in 0..10 {
            append(&path, "{not json\n");
        }
        append(&path, r#"{"no_event_type":true}"#);
        append(&path, "\n");
        // 11번째 에러 뒤의 알림은 읽히지 않음
        append(&path, &alert_line(9));
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(t.handle.is_finished(), "11th error stops the tailer");
        assert_eq!(
            t.handle.await.unwrap(),
            WorkerExit::SelfStopped("more than 10 event log errors in 24 hours".to_owned())
        );
        assert!(t.rx.try_dequeue().is_none());
        let sent = t.transport.delivered();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.contains("more than 10 malformed lines"));
    }

    #[tokio::test]
    async fn blank_lines_count_toward_error_cap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eve.json");
        append(&path, "");

        let t = start(config(&path)).await;
        append(&path, &"\n".repeat(10));
        append(&path, "   \n");
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(t.handle.is_finished(), "11th blank line stops the tailer");
        assert!(matches!(t.handle.await.unwrap(), WorkerExit::SelfStopped(_)));
        assert_eq!(t.transport.delivered().len(), 1);
    }

    #[tokio::test]
    async fn exactly_ten_bad_lines_do_not_stop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eve.json");
        append(&path, "");

        let mut t = start(config(&path)).await;
        for _ in 0..10 {
            append(&path, "garbage\n");
        }
        append(&path, &alert_line(7));
        assert_eq!(next_flow_id(&mut t.rx).await, 7);
        assert!(!t.handle.is_finished());

        t.cancel.cancel();
        assert_eq!(t.handle.await.unwrap(), WorkerExit::Requested);
        assert!(t.transport.delivered().is_empty());
    }

    #[tokio::test]
    async fn missing_log_is_setup_failure() {
        let (tx, _rx) = queue::bounded(1);
        let tailer = Tailer::new(
            config(Path::new("/nonexistent/frosty/eve.json")),
            tx,
            Arc::new(MockTransport::default()),
        )
        .unwrap();
        let exit = tailer.run(CancellationToken::new()).await;
        assert!(matches!(exit, WorkerExit::Failed(_)));
    }

    #[test]
    fn preview_truncates_long_lines() {
        let long = vec![b'x'; PREVIEW_LEN + 10];
        let text = preview(&long);
        assert_eq!(text.len(), PREVIEW_LEN + 3);
        assert!(text.ends_with("..."));
    }
}

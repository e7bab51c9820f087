//! Notifier -- 알림 큐 소비 worker
//!
//! 큐가 비어 있지 않을 때까지 기다렸다가, 한 번 깨어날 때마다 최대 `batch_limit`개의
//! 알림을 모아 하나의 알림 메시지로 전송합니다.
//!
//! # 전송 실패
//! 실패하면 전송 계층을 다시 수립하여 한 번 더 시도합니다. 같은 배치가 두 번 연속
//! 실패하면 worker는 실패로 종료하며, 이미 꺼낸 알림과 큐에 남은 알림은 모두
//! "unhandled alert"로 로그에 남깁니다.
//!
//! # 속도 제한
//! 꺼낸 알림마다 24시간 창에 한 번씩 기록합니다. 상한을 넘긴 알림이 나오면
//! 현재 배치를 전송하고 남용 알림을 한 번 보낸 뒤 스스로 종료합니다.
//!
//! # 정지 요청
//! 정지 요청을 받으면 새 유입을 막고 큐에 남은 알림을 모두 전송한 뒤 종료합니다.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use frosty_core::event::AlertEvent;
use frosty_core::metrics as m;
use frosty_core::worker::{Worker, WorkerExit};

use crate::config::NotifierConfig;
use crate::error::EvePipelineError;
use crate::format::{AlertFormatter, DashboardLink};
use crate::queue::AlertReceiver;
use crate::rate::RateWindow;
use crate::transport::{Notification, Transport, TransportError};

/// 알림 전송 worker
pub struct Notifier<T: Transport> {
    config: NotifierConfig,
    queue: AlertReceiver,
    transport: Arc<T>,
    formatter: AlertFormatter,
    alerts: RateWindow,
}

impl<T: Transport> Notifier<T> {
    /// 새 Notifier를 생성합니다.
    pub fn new(
        config: NotifierConfig,
        queue: AlertReceiver,
        transport: Arc<T>,
    ) -> Result<Self, EvePipelineError> {
        config.validate()?;
        let link = DashboardLink::new(
            &config.dashboard_url,
            &config.index_pattern,
            config.link_window,
        );
        Ok(Self {
            formatter: AlertFormatter::new(link),
            alerts: RateWindow::daily(config.alert_cap_24h),
            config,
            queue,
            transport,
        })
    }

    async fn serve(&mut self, cancel: &CancellationToken) -> WorkerExit {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.drain_on_stop().await,
                next = self.queue.dequeue() => next,
            };
            match next {
                Some(first) => {
                    if let Some(exit) = self.handle(first).await {
                        return exit;
                    }
                }
                None => {
                    info!("alert queue closed by producer, waiting for stop");
                    cancel.cancelled().await;
                    return WorkerExit::Requested;
                }
            }
        }
    }

    async fn drain_on_stop(&mut self) -> WorkerExit {
        self.queue.close();
        let remaining = self.queue.len();
        if remaining > 0 {
            info!(remaining, "draining alert queue before stop");
        }
        while let Some(first) = self.queue.try_dequeue() {
            if let Some(exit) = self.handle(first).await {
                return exit;
            }
        }
        WorkerExit::Requested
    }

    /// 배치 하나를 모아 전송합니다. worker가 끝나야 하면 종료 사유를 반환합니다.
    async fn handle(&mut self, first: AlertEvent) -> Option<WorkerExit> {
        let (batch, over_cap) = self.gather(first);

        if let Err(e) = self.deliver_with_retry(&batch).await {
            error!(error = %e, alerts = batch.len(), "alert delivery failed twice, stopping notifier");
            batch.iter().for_each(log_unhandled);
            self.abandon_queue();
            return Some(WorkerExit::Failed(format!("alert delivery failed twice: {e}")));
        }

        if over_cap {
            let cap = self.alerts.cap();
            error!(cap, "too many alerts in 24 hours, stopping notifier");
            self.send_abuse_notice(cap).await;
            self.abandon_queue();
            return Some(WorkerExit::SelfStopped(format!(
                "more than {cap} alerts in 24 hours"
            )));
        }
        None
    }

    /// `first`에 이어 대기 없이 꺼낼 수 있는 알림을 `batch_limit`까지 모읍니다.
    ///
    /// 상한을 넘긴 알림을 만나면 그 알림까지 포함하고 멈춥니다.
    fn gather(&mut self, first: AlertEvent) -> (Vec<AlertEvent>, bool) {
        let mut over_cap = self.alerts.record();
        let mut batch = vec![first];
        while !over_cap && batch.len() < self.config.batch_limit {
            let Some(alert) = self.queue.try_dequeue() else {
                break;
            };
            over_cap = self.alerts.record();
            batch.push(alert);
        }
        (batch, over_cap)
    }

    async fn deliver_with_retry(&self, batch: &[AlertEvent]) -> Result<(), TransportError> {
        let notification = Notification::new(
            self.config.subject.clone(),
            self.formatter.format_batch(batch),
        );
        let started = Instant::now();

        if let Err(first) = self.transport.deliver(&notification).await {
            counter!(m::NOTIFIER_DELIVERY_FAILURES_TOTAL).increment(1);
            warn!(error = %first, "alert delivery failed, retrying once");
            if let Err(second) = self.transport.deliver(&notification).await {
                counter!(m::NOTIFIER_DELIVERY_FAILURES_TOTAL).increment(1);
                return Err(second);
            }
        }

        histogram!(m::NOTIFIER_DELIVERY_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        counter!(m::NOTIFIER_NOTIFICATIONS_SENT_TOTAL).increment(1);
        counter!(m::NOTIFIER_ALERTS_DELIVERED_TOTAL).increment(batch.len() as u64);
        debug!(alerts = batch.len(), "alert notification delivered");
        Ok(())
    }

    async fn send_abuse_notice(&self, cap: usize) {
        let notification = Notification::new(
            self.config.subject.clone(),
            format!(
                "frosty stopped forwarding alerts: more than {cap} alerts in 24 hours.\n\
                 check the sensor and the ruleset before restarting.\n"
            ),
        );
        if let Err(e) = self.transport.deliver(&notification).await {
            warn!(error = %e, "too-many-alerts notification failed");
        }
    }

    /// 새 유입을 막고 큐에 남은 알림을 모두 로그로 남깁니다.
    fn abandon_queue(&mut self) {
        self.queue.close();
        while let Some(alert) = self.queue.try_dequeue() {
            log_unhandled(&alert);
        }
    }
}

impl<T: Transport> Worker for Notifier<T> {
    fn name(&self) -> &'static str {
        "notifier"
    }

    async fn run(mut self, cancel: CancellationToken) -> WorkerExit {
        let exit = self.serve(&cancel).await;
        info!(reason = %exit, "notifier stopped");
        exit
    }
}

fn log_unhandled(alert: &AlertEvent) {
    error!(
        signature = alert.signature().unwrap_or("-"),
        flow_id = ?alert.flow_id(),
        "unhandled alert"
    );
}

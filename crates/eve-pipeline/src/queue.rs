//! Tailer → Notifier 알림 큐
//!
//! [`bounded`]는 용량이 제한된 순서 보존 채널을 생성합니다.
//! 송신측([`AlertSender`])은 Tailer만, 수신측([`AlertReceiver`])은 Notifier만 소유합니다.
//!
//! # 배압
//! 큐가 가득 차면 `enqueue`는 빈 자리가 생길 때까지 대기합니다.
//! Tailer는 이 대기를 정지 신호와 함께 `select!`하여 정지 요청에 응답합니다.
//!
//! # 종료 시 드레인
//! Notifier는 정지 요청을 받으면 [`AlertReceiver::close`]로 새 유입을 막고
//! 이미 큐에 들어온 알림을 [`AlertReceiver::try_dequeue`]로 모두 꺼냅니다.

use metrics::gauge;
use tokio::sync::mpsc;

use frosty_core::event::AlertEvent;
use frosty_core::metrics as m;

use crate::error::EvePipelineError;

/// 알림 큐를 생성합니다.
pub fn bounded(capacity: usize) -> (AlertSender, AlertReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (AlertSender { tx }, AlertReceiver { rx })
}

/// 알림 큐 송신측 (Tailer 전용)
#[derive(Debug)]
pub struct AlertSender {
    tx: mpsc::Sender<AlertEvent>,
}

impl AlertSender {
    /// 알림을 큐에 넣습니다. 큐가 가득 차면 대기합니다.
    ///
    /// 수신측이 닫혔으면 [`EvePipelineError::QueueClosed`]를 반환합니다.
    pub async fn enqueue(&self, alert: AlertEvent) -> Result<(), EvePipelineError> {
        self.tx
            .send(alert)
            .await
            .map_err(|_| EvePipelineError::QueueClosed)?;
        gauge!(m::ALERT_QUEUE_DEPTH).increment(1.0);
        Ok(())
    }

    /// 수신측이 닫혔는지 확인합니다.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// 알림 큐 수신측 (Notifier 전용)
#[derive(Debug)]
pub struct AlertReceiver {
    rx: mpsc::Receiver<AlertEvent>,
}

impl AlertReceiver {
    /// 다음 알림을 기다립니다. 송신측이 사라지고 큐가 비면 `None`.
    pub async fn dequeue(&mut self) -> Option<AlertEvent> {
        let alert = self.rx.recv().await;
        if alert.is_some() {
            gauge!(m::ALERT_QUEUE_DEPTH).decrement(1.0);
        }
        alert
    }

    /// 대기 없이 다음 알림을 꺼냅니다.
    pub fn try_dequeue(&mut self) -> Option<AlertEvent> {
        let alert = self.rx.try_recv().ok();
        if alert.is_some() {
            gauge!(m::ALERT_QUEUE_DEPTH).decrement(1.0);
        }
        alert
    }

    /// 새 유입을 막습니다. 이미 들어온 알림은 계속 꺼낼 수 있습니다.
    pub fn close(&mut self) {
        self.rx.close();
    }

    /// 큐에 남은 알림 수
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// 큐가 비었는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

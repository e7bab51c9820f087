//! 파이프라인 조립 -- Tailer와 Notifier를 하나의 알림 큐로 연결합니다.
//!
//! 알림 큐는 전역 상태가 아니라 생성 시점에 두 worker에게만 나눠 줍니다.
//! 송신측은 Tailer, 수신측은 Notifier가 소유하므로 다른 코드는 큐에 접근할 수 없습니다.
//!
//! # 사용 예시
//! ```ignore
//! use std::sync::Arc;
//! use frosty_eve_pipeline::{EvePipelineBuilder, SmtpTransport};
//!
//! let transport = Arc::new(SmtpTransport::from_config(&core.notify));
//! let (tailer, notifier) = EvePipelineBuilder::from_core(&core)
//!     .build(transport)?;
//! ```

use std::sync::Arc;

use frosty_core::config::FrostyConfig;

use crate::config::{NotifierConfig, TailerConfig};
use crate::error::EvePipelineError;
use crate::notifier::Notifier;
use crate::queue;
use crate::tailer::Tailer;
use crate::transport::Transport;

/// 기본 알림 큐 용량
const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Tailer + Notifier 빌더
#[derive(Debug, Clone)]
pub struct EvePipelineBuilder {
    tailer: TailerConfig,
    notifier: NotifierConfig,
    queue_capacity: usize,
}

impl EvePipelineBuilder {
    /// 기본 설정으로 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            tailer: TailerConfig::default(),
            notifier: NotifierConfig::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// core 설정에서 빌더를 생성합니다.
    pub fn from_core(core: &FrostyConfig) -> Self {
        Self {
            tailer: TailerConfig::from_core(core),
            notifier: NotifierConfig::from_core(core),
            queue_capacity: core.pipeline.queue_capacity,
        }
    }

    /// Tailer 설정을 지정합니다.
    pub fn tailer_config(mut self, config: TailerConfig) -> Self {
        self.tailer = config;
        self
    }

    /// Notifier 설정을 지정합니다.
    pub fn notifier_config(mut self, config: NotifierConfig) -> Self {
        self.notifier = config;
        self
    }

    /// 알림 큐 용량을 지정합니다.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// 두 worker를 생성합니다. 같은 전송 구현을 공유합니다.
    pub fn build<T: Transport>(
        self,
        transport: Arc<T>,
    ) -> Result<(Tailer<T>, Notifier<T>), EvePipelineError> {
        if self.queue_capacity == 0 {
            return Err(EvePipelineError::Config {
                field: "queue_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        let (tx, rx) = queue::bounded(self.queue_capacity);
        let tailer = Tailer::new(self.tailer, tx, Arc::clone(&transport))?;
        let notifier = Notifier::new(self.notifier, rx, transport)?;
        Ok((tailer, notifier))
    }
}

impl Default for EvePipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

//! frosty 이벤트 파이프라인
//!
//! 센서의 EVE 이벤트 로그를 추적하여 알림을 골라내고 운영자에게 전달합니다.
//!
//! # 모듈 구성
//!
//! - [`tailer`]: 로그 추적 worker (줄 프레이밍, 회전 감지, 변경 감시, 분류)
//! - [`queue`]: Tailer → Notifier 순서 보존 알림 큐
//! - [`notifier`]: 배치 전송, 재시도, 24시간 알림 상한
//! - [`rate`]: 24시간 이동 창 카운터
//! - [`format`]: 알림 본문과 대시보드 딥 링크
//! - [`transport`]: 알림 전송 trait과 SMTP 구현
//! - [`pipeline`]: 두 worker를 하나의 큐로 연결하는 빌더
//! - [`config`]: 파이프라인 설정 (core 설정에서 파생)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! eve.json ──notify──> Tailer ──AlertQueue──> Notifier ──Transport──> 운영자
//!                        |                       |
//!              frame + classify            batch + rate limit
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod notifier;
pub mod pipeline;
pub mod queue;
pub mod rate;
pub mod tailer;
pub mod transport;

// --- 주요 타입 re-export ---

// 파이프라인
pub use pipeline::EvePipelineBuilder;

// worker
pub use notifier::Notifier;
pub use tailer::Tailer;

// 설정
pub use config::{NotifierConfig, TailerConfig};

// 에러
pub use error::EvePipelineError;

// 큐
pub use queue::{AlertReceiver, AlertSender};

// 전송
pub use transport::{Notification, SmtpTransport, Transport, TransportError};

// 포맷
pub use format::{AlertFormatter, DashboardLink};

// 속도 제한
pub use rate::RateWindow;

//! frosty 공통 크레이트
//!
//! 모든 frosty 크레이트가 공유하는 설정, 에러, 이벤트 모델, worker 계약,
//! 메트릭 이름을 정의합니다.
//!
//! # 모듈 구성
//!
//! - [`config`]: `frosty.toml` 파싱 및 환경변수 오버라이드
//! - [`error`]: 최상위 에러 타입
//! - [`event`]: EVE 로그 레코드와 알림 이벤트
//! - [`worker`]: 장기 실행 worker 계약 (`Worker`, `WorkerExit`)
//! - [`metrics`]: 메트릭 이름 상수 및 설명 등록

pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod worker;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, FrostyError, PipelineError};

// 설정
pub use config::FrostyConfig;

// 이벤트
pub use event::{AlertEvent, EventRecord, RecordError};

// worker
pub use worker::{BoxFuture, Worker, WorkerExit};

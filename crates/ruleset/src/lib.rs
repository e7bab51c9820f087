//! frosty 룰셋 크레이트
//!
//! 센서의 Unix 소켓 제어 채널과 외부 룰 피드 동기화를 담당합니다.
//!
//! # 아키텍처
//! ```text
//! RuleFeed (HEAD Last-Modified) ──▶ RulesetManager ──▶ install_atomic (rules_dir)
//!                                        │
//!                                        ▼
//!                                  SensorControl ──▶ ControlChannel ──▶ 센서 소켓
//!                                  (reload, stats, failed-rules)
//! ```
//!
//! # 모듈 구성
//!
//! - [`protocol`]: 제어 채널 JSON 메시지와 프레임 디코딩
//! - [`control`]: 연결 하나에 대한 요청/응답 교환
//! - [`sensor`]: 버전 조회, 설정 조회, 룰 리로드
//! - [`version`]: 룰셋 버전 스탬프 (Last-Modified / mtime)
//! - [`install`]: 블랙리스트, 병합, 원자적 설치
//! - [`feed`]: 룰 피드 trait과 Emerging Threats 구현
//! - [`manager`]: 주기적 동기화 worker

pub mod control;
pub mod error;
pub mod feed;
pub mod install;
pub mod manager;
pub mod protocol;
pub mod sensor;
pub mod version;

// 제어 채널
pub use control::ControlChannel;
pub use protocol::{ControlRequest, ControlResponse, ReplyStatus};
pub use sensor::{ReloadReport, SensorControl, SocketSensor};

// 에러
pub use error::{ControlError, FeedError, RulesetError};

// 피드 / 설치
pub use feed::{EmergingThreatsFeed, FetchedRuleset, RuleFeed, RuleFile};
pub use install::{Blacklist, MergeSummary};
pub use version::RulesetVersion;

// worker
pub use manager::{CycleReport, RulesetManager};

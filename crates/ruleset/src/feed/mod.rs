//! 룰 피드 -- 외부 위협 인텔리전스 소스
//!
//! [`RuleFeed`]는 두 가지 능력만 요구합니다.
//!
//! - `probe_latest`: 전체 다운로드 없이 원격의 마지막 수정 시각을 조회
//! - `fetch`: 전체 룰셋을 받아 구성 파일 목록과 버전 스탬프를 반환
//!
//! 블랙리스트 적용과 설치는 [`RulesetManager`](crate::manager::RulesetManager)가 담당하므로
//! 새 소스를 추가할 때는 구현체 하나만 추가하면 됩니다.

pub mod emerging;

use tokio_util::sync::CancellationToken;

use frosty_core::worker::BoxFuture;

use crate::error::FeedError;
use crate::install::Blacklist;
use crate::version::RulesetVersion;

pub use emerging::EmergingThreatsFeed;

/// 구성 룰 파일 하나
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFile {
    /// 파일 이름 (블랙리스트 키)
    pub name: String,
    /// 파일 내용
    pub content: String,
}

/// `fetch` 결과
#[derive(Debug, Clone)]
pub struct FetchedRuleset {
    /// 다운로드한 룰셋의 버전
    pub version: RulesetVersion,
    /// 이름 순으로 정렬된 구성 파일
    pub files: Vec<RuleFile>,
}

/// 룰 피드 trait
///
/// 여러 종류의 피드를 하나의 목록으로 보관하므로 object-safe하게 `BoxFuture`를 반환합니다.
pub trait RuleFeed: Send + Sync {
    /// 소스 이름 (버전 키, 로그 라벨)
    fn name(&self) -> &str;

    /// 설치될 파일 이름
    fn output_file(&self) -> &str;

    /// 이 소스의 블랙리스트
    fn blacklist(&self) -> &Blacklist;

    /// 원격의 마지막 수정 시각을 조회합니다.
    fn probe_latest(&self) -> BoxFuture<'_, Result<RulesetVersion, FeedError>>;

    /// 전체 룰셋을 가져옵니다.
    ///
    /// `cancel`이 취소되면 [`FeedError::Cancelled`]로 중단하며 임시 파일만 남기지 않습니다.
    fn fetch<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<FetchedRuleset, FeedError>>;
}

//! 룰셋 버전 스탬프
//!
//! [`RulesetVersion`]은 룰 소스의 "마지막 수정 시각"입니다. 원격 쪽은 HTTP
//! `Last-Modified` 헤더에서, 설치된 쪽은 설치 파일의 수정 시각에서 읽습니다.
//! 설치할 때 파일 수정 시각을 원격 스탬프로 맞추므로 재시작 후에도 비교가 유지됩니다.
//!
//! 비교는 초 단위입니다.

use std::fmt;
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::error::FeedError;

/// 룰 소스 버전 (UTC, 초 단위)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RulesetVersion(DateTime<Utc>);

impl RulesetVersion {
    /// 한 번도 설치되지 않은 소스의 버전
    pub const EPOCH: Self = Self(DateTime::<Utc>::UNIX_EPOCH);

    /// UTC 시각에서 생성합니다. 초 미만은 버립니다.
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(DateTime::from_timestamp(at.timestamp(), 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH))
    }

    /// 파일 시스템 시각에서 생성합니다.
    pub fn from_system_time(at: SystemTime) -> Self {
        Self::from_datetime(DateTime::<Utc>::from(at))
    }

    /// HTTP `Last-Modified` 헤더를 해석합니다. GMT/UTC가 아니면 거부합니다.
    pub fn parse_http_date(header: &str) -> Result<Self, FeedError> {
        let header = header.trim();
        let zone = header.rsplit(' ').next().unwrap_or_default();
        if zone != "GMT" && zone != "UTC" {
            return Err(FeedError::BadLastModified(format!(
                "'{header}' is not in UTC"
            )));
        }
        let normalised = format!("{} GMT", &header[..header.len() - zone.len()].trim_end());
        DateTime::parse_from_rfc2822(&normalised)
            .map(|at| Self::from_datetime(at.with_timezone(&Utc)))
            .map_err(|e| FeedError::BadLastModified(format!("'{header}': {e}")))
    }

    /// 설치된 파일의 버전. 파일이 없거나 읽을 수 없으면 [`Self::EPOCH`].
    pub fn of_installed(path: &Path) -> Self {
        std::fs::metadata(path)
            .and_then(|meta| meta.modified())
            .map(Self::from_system_time)
            .unwrap_or(Self::EPOCH)
    }

    /// 파일 수정 시각으로 쓸 값
    pub fn to_system_time(self) -> SystemTime {
        SystemTime::from(self.0)
    }

    /// UTC 시각
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for RulesetVersion {
    fn default() -> Self {
        Self::EPOCH
    }
}

impl fmt::Display for RulesetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%dT%H:%M:%SZ"))
    }
}

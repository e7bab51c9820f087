//! 읽기 위치 추적
//!
//! [`LogPosition`]은 현재 열린 파일 핸들, 그 파일의 식별자(device + inode),
//! 바이트 오프셋, 아직 개행을 만나지 못한 조각을 함께 보관합니다.
//! 로그 회전이 감지되면 수정되지 않고 새 값으로 교체됩니다.

use std::io::SeekFrom;
use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::framing::LineFramer;
use crate::error::EvePipelineError;

/// 파일 식별자
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileIdentity {
    /// 장치 번호
    pub dev: u64,
    /// inode 번호
    pub ino: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    fn of(meta: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            dev: meta.dev(),
            ino: meta.ino(),
        }
    }

    // inode가 없는 플랫폼에서는 truncation 감지만 동작합니다.
    #[cfg(not(unix))]
    fn of(_meta: &std::fs::Metadata) -> Self {
        Self::default()
    }
}

/// 경로 재검증 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    /// 같은 파일, 회전 없음
    Unchanged,
    /// 다른 파일로 교체됨 (rename/create 회전)
    Replaced,
    /// 같은 파일이 오프셋보다 짧아짐 (copytruncate 회전)
    Truncated,
    /// 경로에 파일이 없음
    Missing,
}

/// 현재 읽고 있는 로그 파일과 위치
#[derive(Debug)]
pub struct LogPosition {
    file: File,
    identity: FileIdentity,
    offset: u64,
    framer: LineFramer,
}

impl LogPosition {
    /// 파일을 열고 끝으로 이동합니다. 이후 추가되는 내용만 읽습니다.
    pub async fn open_at_end(path: &Path, max_line_length: usize) -> Result<Self, EvePipelineError> {
        let mut position = Self::open(path, max_line_length).await?;
        position.offset = position
            .file
            .seek(SeekFrom::End(0))
            .await
            .map_err(|e| open_error(path, &e))?;
        Ok(position)
    }

    /// 파일을 처음부터 읽도록 엽니다. 회전 직후에 사용합니다.
    pub async fn open_at_start(
        path: &Path,
        max_line_length: usize,
    ) -> Result<Self, EvePipelineError> {
        Self::open(path, max_line_length).await
    }

    async fn open(path: &Path, max_line_length: usize) -> Result<Self, EvePipelineError> {
        let file = File::open(path).await.map_err(|e| open_error(path, &e))?;
        let meta = file.metadata().await.map_err(|e| open_error(path, &e))?;
        if !meta.is_file() {
            return Err(EvePipelineError::Open {
                path: path.display().to_string(),
                reason: "not a regular file".to_owned(),
            });
        }
        Ok(Self {
            file,
            identity: FileIdentity::of(&meta),
            offset: 0,
            framer: LineFramer::new(max_line_length),
        })
    }

    /// 최대 `max` 바이트를 읽어 프레이머에 넣습니다. EOF면 0을 반환합니다.
    pub async fn fill(&mut self, scratch: &mut Vec<u8>, max: usize) -> Result<usize, EvePipelineError> {
        scratch.resize(max, 0);
        let n = self.file.read(&mut scratch[..]).await?;
        self.framer.extend(&scratch[..n]);
        self.offset += n as u64;
        Ok(n)
    }

    /// 경로가 여전히 이 핸들과 같은 파일을 가리키는지 확인합니다.
    pub async fn check_path(&self, path: &Path) -> PathState {
        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) => meta,
            Err(_) => return PathState::Missing,
        };
        if FileIdentity::of(&meta) != self.identity {
            PathState::Replaced
        } else if meta.len() < self.offset {
            PathState::Truncated
        } else {
            PathState::Unchanged
        }
    }

    /// 줄 재조립기
    pub fn framer(&mut self) -> &mut LineFramer {
        &mut self.framer
    }

    /// 현재 바이트 오프셋
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// 파일 식별자
    pub fn identity(&self) -> FileIdentity {
        self.identity
    }
}

fn open_error(path: &Path, err: &std::io::Error) -> EvePipelineError {
    EvePipelineError::Open {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

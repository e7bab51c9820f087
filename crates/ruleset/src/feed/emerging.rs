//! Emerging Threats 룰 피드
//!
//! 센서 버전에 맞는 tarball을 받아 시스템 `tar`로 풀고 `rules/*.rules`를 모읍니다.
//!
//! ```text
//! open:  https://rules.emergingthreats.net/open/suricata-<ver>/emerging.rules.tar.gz
//! pro:   https://rules.emergingthreatspro.com/<oinkcode>/suricata-<ver>/etpro.rules.tar.gz
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::LAST_MODIFIED;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use frosty_core::config::RuleSourceConfig;
use frosty_core::worker::BoxFuture;

use super::{FetchedRuleset, RuleFeed, RuleFile};
use crate::error::FeedError;
use crate::install::Blacklist;
use crate::version::RulesetVersion;

const OPEN_BASE: &str = "https://rules.emergingthreats.net/open";
const PRO_BASE: &str = "https://rules.emergingthreatspro.com";

/// Emerging Threats 피드
#[derive(Debug, Clone)]
pub struct EmergingThreatsFeed {
    name: String,
    output_file: String,
    blacklist: Blacklist,
    url: String,
    scratch_dir: PathBuf,
    client: reqwest::Client,
}

impl EmergingThreatsFeed {
    /// 소스 설정과 센서 버전으로 피드를 생성합니다.
    ///
    /// `scratch_dir`가 비어 있으면 시스템 임시 디렉토리를 사용합니다.
    pub fn new(
        source: &RuleSourceConfig,
        sensor_version: &semver::Version,
        scratch_dir: &Path,
        http_timeout: Duration,
    ) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(http_timeout)
            .user_agent(concat!("frosty/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let scratch_dir = if scratch_dir.as_os_str().is_empty() {
            std::env::temp_dir()
        } else {
            scratch_dir.to_path_buf()
        };
        Ok(Self {
            name: source.name.clone(),
            output_file: source.output_file.clone(),
            blacklist: Blacklist::new(source.blacklist.clone()),
            url: download_url(&source.oinkcode, sensor_version),
            scratch_dir,
            client,
        })
    }

    /// 다운로드 URL
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn latest(&self) -> Result<RulesetVersion, FeedError> {
        let resp = self.client.head(&self.url).send().await?.error_for_status()?;
        last_modified(resp.headers())
    }

    async fn download(&self, cancel: &CancellationToken) -> Result<FetchedRuleset, FeedError> {
        info!(url = %self.url, source = %self.name, "downloading rules");
        let workdir = tempfile::Builder::new()
            .prefix("frosty-et-")
            .tempdir_in(&self.scratch_dir)?;
        let archive = workdir.path().join("rules.tar.gz");

        let mut resp = self.client.get(&self.url).send().await?.error_for_status()?;
        let version = last_modified(resp.headers())?;

        let mut file = tokio::fs::File::create(&archive).await?;
        let mut bytes = 0u64;
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FeedError::Cancelled),
                chunk = resp.chunk() => chunk?,
            };
            let Some(chunk) = chunk else {
                break;
            };
            bytes += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);
        debug!(bytes, source = %self.name, "download complete");

        extract(&archive, workdir.path()).await?;
        let files = collect_rules(&workdir.path().join("rules")).await?;
        info!(files = files.len(), source = %self.name, "rules files found");
        Ok(FetchedRuleset { version, files })
    }
}

impl RuleFeed for EmergingThreatsFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_file(&self) -> &str {
        &self.output_file
    }

    fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    fn probe_latest(&self) -> BoxFuture<'_, Result<RulesetVersion, FeedError>> {
        Box::pin(self.latest())
    }

    fn fetch<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<FetchedRuleset, FeedError>> {
        Box::pin(self.download(cancel))
    }
}

/// 센서 버전과 구독 코드로 다운로드 URL을 만듭니다.
pub fn download_url(oinkcode: &str, sensor_version: &semver::Version) -> String {
    let ver = format!(
        "{}.{}.{}",
        sensor_version.major, sensor_version.minor, sensor_version.patch
    );
    if oinkcode.is_empty() {
        format!("{OPEN_BASE}/suricata-{ver}/emerging.rules.tar.gz")
    } else {
        format!("{PRO_BASE}/{oinkcode}/suricata-{ver}/etpro.rules.tar.gz")
    }
}

fn last_modified(headers: &reqwest::header::HeaderMap) -> Result<RulesetVersion, FeedError> {
    let value = headers
        .get(LAST_MODIFIED)
        .ok_or(FeedError::MissingLastModified)?
        .to_str()
        .map_err(|e| FeedError::BadLastModified(e.to_string()))?;
    RulesetVersion::parse_http_date(value)
}

async fn extract(archive: &Path, into: &Path) -> Result<(), FeedError> {
    let status = tokio::process::Command::new("tar")
        .arg("xf")
        .arg(archive)
        .arg("-C")
        .arg(into)
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|e| FeedError::Extract(format!("failed to run tar: {e}")))?;
    if !status.success() {
        return Err(FeedError::Extract(format!("tar exited with {status}")));
    }
    Ok(())
}

/// `dir` 안의 `*.rules` 파일을 이름 순으로 읽습니다.
pub async fn collect_rules(dir: &Path) -> Result<Vec<RuleFile>, FeedError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| FeedError::Extract(format!("{}: {e}", dir.display())))?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_rules = path.extension().is_some_and(|ext| ext == "rules");
        if !is_rules || !entry.file_type().await?.is_file() {
            continue;
        }
        let content = tokio::fs::read(&path).await?;
        files.push(RuleFile {
            name: entry.file_name().to_string_lossy().into_owned(),
            content: String::from_utf8_lossy(&content).into_owned(),
        });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

//! RulesetManager -- 룰 소스 동기화 worker
//!
//! # 갱신 주기
//! ```text
//! for feed in feeds:
//!     latest = feed.probe_latest()        실패 → 이번 주기에서 건너뜀
//!     latest <= installed[feed] → 변경 없음
//!     fetch → blacklist + merge → 원자적 설치 → installed[feed] = latest
//! 하나라도 바뀌었거나 이전 리로드가 실패했으면 → reload 한 번
//! ```
//!
//! 시작 시 한 번, 이후 `refresh_interval`마다 실행합니다.
//! 시작 주기의 리로드 실패는 worker를 종료시키고, 이후 주기의 실패는 다음 주기에 재시도합니다.
//!
//! 설치 파일의 수정 시각은 센서가 리로드를 확인한 뒤에야 원격 스탬프로 맞춥니다.
//! 그 전에는 [`RulesetVersion::EPOCH`]로 두므로, 리로드 전에 프로세스가 끝나면
//! 재시작 후 같은 소스를 다시 설치하고 리로드합니다.
//! 주기 도중 정지 요청이 오면 남은 소스는 건너뛰되, 이미 설치한 소스에 대한 리로드는 보냅니다.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use metrics::{counter, gauge};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use frosty_core::metrics as m;
use frosty_core::worker::{Worker, WorkerExit};

use crate::error::{FeedError, RulesetError};
use crate::feed::RuleFeed;
use crate::install::{install_atomic, merge, stamp_installed};
use crate::sensor::{ReloadReport, SensorControl};
use crate::version::RulesetVersion;

/// 갱신 주기 한 번의 결과
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// 새로 설치된 소스
    pub installed: Vec<String>,
    /// 조회/다운로드/설치 실패로 건너뛴 소스
    pub skipped: Vec<String>,
    /// 리로드 결과 (리로드하지 않았으면 `None`)
    pub reload: Option<ReloadReport>,
}

impl CycleReport {
    /// 이번 주기에 설치나 리로드가 있었는지 확인합니다.
    pub fn changed(&self) -> bool {
        !self.installed.is_empty() || self.reload.is_some()
    }
}

/// 룰 소스 동기화 worker
pub struct RulesetManager<S: SensorControl> {
    sensor: S,
    feeds: Vec<Box<dyn RuleFeed>>,
    rules_dir: PathBuf,
    refresh_interval: Duration,
    installed: HashMap<String, RulesetVersion>,
    /// 설치했지만 리로드가 아직 확인되지 않은 파일과 그 스탬프
    unconfirmed: Vec<(PathBuf, RulesetVersion)>,
    reload_pending: bool,
}

impl<S: SensorControl> RulesetManager<S> {
    /// 새 매니저를 생성합니다.
    pub fn new(sensor: S, rules_dir: impl Into<PathBuf>, refresh_interval: Duration) -> Self {
        Self {
            sensor,
            feeds: Vec::new(),
            rules_dir: rules_dir.into(),
            refresh_interval,
            installed: HashMap::new(),
            unconfirmed: Vec::new(),
            reload_pending: false,
        }
    }

    /// 피드를 등록합니다.
    ///
    /// 설치된 파일의 수정 시각을 읽어 마지막 설치 버전으로 사용합니다.
    pub fn add_feed(&mut self, feed: Box<dyn RuleFeed>) -> Result<(), RulesetError> {
        if self.feeds.iter().any(|f| f.name() == feed.name()) {
            return Err(RulesetError::Config {
                field: "ruleset.sources.name".to_owned(),
                reason: format!("duplicate source '{}'", feed.name()),
            });
        }
        let version = RulesetVersion::of_installed(&self.rules_dir.join(feed.output_file()));
        debug!(source = feed.name(), %version, "installed ruleset version");
        self.installed.insert(feed.name().to_owned(), version);
        self.feeds.push(feed);
        Ok(())
    }

    /// 등록된 피드 수
    pub fn feed_count(&self) -> usize {
        self.feeds.len()
    }

    /// 소스의 마지막 설치 버전. 설치된 적이 없으면 [`RulesetVersion::EPOCH`].
    pub fn installed_version(&self, source: &str) -> RulesetVersion {
        self.installed.get(source).copied().unwrap_or_default()
    }

    /// 이전 리로드가 실패하여 다음 주기에 다시 리로드해야 하는지 확인합니다.
    pub fn reload_pending(&self) -> bool {
        self.reload_pending
    }

    /// 설치 디렉토리
    pub fn rules_dir(&self) -> &Path {
        &self.rules_dir
    }

    /// 갱신 주기를 한 번 실행합니다.
    pub async fn refresh(&mut self, cancel: &CancellationToken) -> Result<CycleReport, RulesetError> {
        let mut report = CycleReport::default();
        let mut cancelled = false;

        for feed in &self.feeds {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let source = feed.name().to_owned();

            let latest = match feed.probe_latest().await {
                Ok(latest) => latest,
                Err(e) => {
                    warn!(source = %source, error = %e, "ruleset probe failed, skipping source");
                    counter!(m::RULESET_FEED_FAILURES_TOTAL, m::LABEL_SOURCE => source.clone())
                        .increment(1);
                    report.skipped.push(source);
                    continue;
                }
            };
            let current = self.installed.get(&source).copied().unwrap_or_default();
            if latest <= current {
                debug!(source = %source, %current, "ruleset up to date");
                continue;
            }

            info!(source = %source, %current, %latest, "newer ruleset available");
            let fetched = match feed.fetch(cancel).await {
                Ok(fetched) => fetched,
                Err(FeedError::Cancelled) => {
                    cancelled = true;
                    break;
                }
                Err(e) => {
                    warn!(source = %source, error = %e, "ruleset fetch failed, skipping source");
                    counter!(m::RULESET_FEED_FAILURES_TOTAL, m::LABEL_SOURCE => source.clone())
                        .increment(1);
                    report.skipped.push(source);
                    continue;
                }
            };

            let (content, summary) = merge(&fetched.files, feed.blacklist());
            let dir = self.rules_dir.clone();
            let output = feed.output_file().to_owned();
            let version = fetched.version;
            let installed = tokio::task::spawn_blocking(move || {
                install_atomic(&dir, &output, &content, RulesetVersion::EPOCH)
            })
            .await
            .map_err(|e| RulesetError::Install {
                path: feed.output_file().to_owned(),
                reason: format!("install task failed: {e}"),
            })
            .and_then(|result| result);

            match installed {
                Ok(path) => {
                    info!(
                        source = %source,
                        path = %path.display(),
                        files = summary.files,
                        rules = summary.rules,
                        blacklisted = summary.rejected,
                        %version,
                        "ruleset installed"
                    );
                    counter!(m::RULESET_INSTALLS_TOTAL, m::LABEL_SOURCE => source.clone())
                        .increment(1);
                    self.installed.insert(source.clone(), version);
                    self.unconfirmed.push((path, version));
                    report.installed.push(source);
                }
                Err(e) => {
                    warn!(source = %source, error = %e, "ruleset install failed, skipping source");
                    report.skipped.push(source);
                }
            }
        }

        if cancelled {
            if !report.installed.is_empty() {
                info!(
                    installed = report.installed.len(),
                    "stop requested mid-cycle, reloading sources already installed"
                );
                if let Err(e) = self.reload().await {
                    warn!(error = %e, "reload before stop failed");
                }
            }
            return Err(RulesetError::Cancelled);
        }

        if !report.installed.is_empty() || self.reload_pending {
            report.reload = Some(self.reload().await?);
        }
        counter!(m::RULESET_REFRESH_CYCLES_TOTAL).increment(1);
        Ok(report)
    }

    async fn reload(&mut self) -> Result<ReloadReport, RulesetError> {
        match self.sensor.reload_rules().await {
            Ok(reload) => {
                self.reload_pending = false;
                for (path, version) in self.unconfirmed.drain(..) {
                    if let Err(e) = stamp_installed(&path, version) {
                        warn!(path = %path.display(), error = %e, "failed to stamp installed ruleset");
                    }
                }
                counter!(m::RULESET_RELOADS_TOTAL, m::LABEL_RESULT => "ok").increment(1);
                if reload.stats_available {
                    gauge!(m::RULESET_RULES_LOADED).set(reload.rules_loaded as f64);
                    gauge!(m::RULESET_RULES_FAILED).set(reload.rules_failed as f64);
                }
                info!(
                    rules_loaded = reload.rules_loaded,
                    rules_failed = reload.rules_failed,
                    stats_available = reload.stats_available,
                    "sensor ruleset reloaded"
                );
                Ok(reload)
            }
            Err(e) => {
                self.reload_pending = true;
                counter!(m::RULESET_RELOADS_TOTAL, m::LABEL_RESULT => "error").increment(1);
                Err(e.into())
            }
        }
    }
}

impl<S: SensorControl> Worker for RulesetManager<S> {
    fn name(&self) -> &'static str {
        "ruleset"
    }

    async fn run(mut self, cancel: CancellationToken) -> WorkerExit {
        info!(
            feeds = self.feeds.len(),
            rules_dir = %self.rules_dir.display(),
            interval_secs = self.refresh_interval.as_secs(),
            "ruleset manager started"
        );

        match self.refresh(&cancel).await {
            Ok(report) => debug!(?report, "startup ruleset refresh complete"),
            Err(RulesetError::Cancelled) => return WorkerExit::Requested,
            Err(e) => {
                let exit = WorkerExit::Failed(format!("startup ruleset refresh failed: {e}"));
                info!(reason = %exit, "ruleset manager stopped");
                return exit;
            }
        }

        let mut interval = tokio::time::interval_at(
            tokio::time::Instant::now() + self.refresh_interval,
            self.refresh_interval,
        );
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            match self.refresh(&cancel).await {
                Ok(report) => {
                    if report.changed() {
                        debug!(?report, "ruleset refresh complete");
                    }
                }
                Err(RulesetError::Cancelled) => break,
                Err(e) => warn!(error = %e, "ruleset refresh failed, retrying next cycle"),
            }
        }

        info!(reason = %WorkerExit::Requested, "ruleset manager stopped");
        WorkerExit::Requested
    }
}

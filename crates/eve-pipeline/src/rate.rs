//! 24시간 이동 창 카운터
//!
//! [`RateWindow`]는 최근 창(기본 24시간) 안에서 관측된 시각들을 순서대로 보관하며,
//! 삽입할 때마다 창 밖의 항목을 제거합니다. 상한을 넘는 삽입은
//! 소유 worker의 종료 조건입니다.
//!
//! 파싱 에러(Tailer)와 전달된 알림(Notifier)에 대해 서로 독립적인 인스턴스를 사용합니다.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// 24시간
pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// 시간 창 안의 발생 시각 목록
#[derive(Debug, Clone)]
pub struct RateWindow {
    window: Duration,
    cap: usize,
    stamps: VecDeque<Instant>,
}

impl RateWindow {
    /// 지정한 창 길이와 상한으로 생성합니다.
    pub fn new(window: Duration, cap: usize) -> Self {
        Self {
            window,
            cap,
            stamps: VecDeque::new(),
        }
    }

    /// 24시간 창으로 생성합니다.
    pub fn daily(cap: usize) -> Self {
        Self::new(DAY, cap)
    }

    /// 현재 시각을 기록합니다. 상한을 넘으면 `true`를 반환합니다.
    pub fn record(&mut self) -> bool {
        self.record_at(Instant::now())
    }

    /// `now` 시각을 기록합니다. 상한을 넘으면 `true`를 반환합니다.
    ///
    /// 시각은 단조 증가해야 합니다.
    pub fn record_at(&mut self, now: Instant) -> bool {
        self.prune(now);
        self.stamps.push_back(now);
        self.stamps.len() > self.cap
    }

    /// `now` 기준으로 창 안에 남아 있는 항목 수
    pub fn count_at(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.stamps.len()
    }

    /// 상한
    pub fn cap(&self) -> usize {
        self.cap
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.stamps.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
    }
}

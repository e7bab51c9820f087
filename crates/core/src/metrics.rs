//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 worker는 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `frosty_`
//! - 구성 요소: `tailer_`, `notifier_`, `ruleset_`, `control_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(frosty_core::metrics::TAILER_LINES_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 이벤트 타입 레이블 키 (alert, dns, flow, ...)
pub const LABEL_EVENT_TYPE: &str = "event_type";

/// 룰 소스 이름 레이블 키
pub const LABEL_SOURCE: &str = "source";

/// 제어 명령 레이블 키
pub const LABEL_COMMAND: &str = "command";

/// 결과 레이블 키 (ok, nok, timeout, error)
pub const LABEL_RESULT: &str = "result";

// ─── Tailer 메트릭 ─────────────────────────────────────────────────

/// Tailer: 읽은 완전한 줄 수 (counter)
pub const TAILER_LINES_TOTAL: &str = "frosty_tailer_lines_total";

/// Tailer: 이벤트 타입별 레코드 수 (counter, label: event_type)
pub const TAILER_EVENTS_TOTAL: &str = "frosty_tailer_events_total";

/// Tailer: 파싱 실패 및 초과 길이 줄 수 (counter)
pub const TAILER_PARSE_ERRORS_TOTAL: &str = "frosty_tailer_parse_errors_total";

/// Tailer: 감지한 로그 회전 수 (counter)
pub const TAILER_ROTATIONS_TOTAL: &str = "frosty_tailer_rotations_total";

/// Tailer: 큐에 넣은 알림 수 (counter)
pub const TAILER_ALERTS_ENQUEUED_TOTAL: &str = "frosty_tailer_alerts_enqueued_total";

// ─── AlertQueue / Notifier 메트릭 ───────────────────────────────────

/// AlertQueue: 큐에 대기 중인 알림 수 (gauge)
pub const ALERT_QUEUE_DEPTH: &str = "frosty_alert_queue_depth";

/// Notifier: 전송 성공한 알림 메시지 수 (counter)
pub const NOTIFIER_NOTIFICATIONS_SENT_TOTAL: &str = "frosty_notifier_notifications_sent_total";

/// Notifier: 알림 메시지에 포함되어 전달된 알림 이벤트 수 (counter)
pub const NOTIFIER_ALERTS_DELIVERED_TOTAL: &str = "frosty_notifier_alerts_delivered_total";

/// Notifier: 전송 실패 시도 수 (counter)
pub const NOTIFIER_DELIVERY_FAILURES_TOTAL: &str = "frosty_notifier_delivery_failures_total";

/// Notifier: 전송 소요 시간 (histogram, 초)
pub const NOTIFIER_DELIVERY_DURATION_SECONDS: &str = "frosty_notifier_delivery_duration_seconds";

// ─── Ruleset 메트릭 ────────────────────────────────────────────────

/// Ruleset: 완료된 갱신 주기 수 (counter)
pub const RULESET_REFRESH_CYCLES_TOTAL: &str = "frosty_ruleset_refresh_cycles_total";

/// Ruleset: 설치된 룰 파일 수 (counter, label: source)
pub const RULESET_INSTALLS_TOTAL: &str = "frosty_ruleset_installs_total";

/// Ruleset: 메타데이터 조회 또는 다운로드 실패 수 (counter, label: source)
pub const RULESET_FEED_FAILURES_TOTAL: &str = "frosty_ruleset_feed_failures_total";

/// Ruleset: 리로드 명령 수 (counter, label: result)
pub const RULESET_RELOADS_TOTAL: &str = "frosty_ruleset_reloads_total";

/// Ruleset: 마지막 리로드에서 로드된 룰 수 (gauge)
pub const RULESET_RULES_LOADED: &str = "frosty_ruleset_rules_loaded";

/// Ruleset: 마지막 리로드에서 실패한 룰 수 (gauge)
pub const RULESET_RULES_FAILED: &str = "frosty_ruleset_rules_failed";

// ─── Control 채널 메트릭 ─────────────────────────────────────────────

/// Control: 제어 명령 수 (counter, labels: command, result)
pub const CONTROL_COMMANDS_TOTAL: &str = "frosty_control_commands_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "frosty_daemon_uptime_seconds";

/// Daemon: 실행 중인 worker 수 (gauge)
pub const DAEMON_WORKERS_RUNNING: &str = "frosty_daemon_workers_running";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "frosty_daemon_build_info";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 알림 전송 소요 시간 히스토그램 버킷 (초)
///
/// 10ms ~ 60s 범위 (SMTP 릴레이 왕복 포함)
pub const DELIVERY_DURATION_BUCKETS: [f64; 9] = [0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `frosty-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Tailer
    describe_counter!(
        TAILER_LINES_TOTAL,
        "Total number of complete lines read from the event log"
    );
    describe_counter!(
        TAILER_EVENTS_TOTAL,
        "Decoded event records per event_type"
    );
    describe_counter!(
        TAILER_PARSE_ERRORS_TOTAL,
        "Lines that failed to decode or exceeded the maximum line length"
    );
    describe_counter!(
        TAILER_ROTATIONS_TOTAL,
        "Number of event log rotations detected"
    );
    describe_counter!(
        TAILER_ALERTS_ENQUEUED_TOTAL,
        "Alert records handed to the notifier queue"
    );

    // AlertQueue / Notifier
    describe_gauge!(ALERT_QUEUE_DEPTH, "Alerts waiting in the notifier queue");
    describe_counter!(
        NOTIFIER_NOTIFICATIONS_SENT_TOTAL,
        "Notifications delivered to the transport"
    );
    describe_counter!(
        NOTIFIER_ALERTS_DELIVERED_TOTAL,
        "Alert events included in delivered notifications"
    );
    describe_counter!(
        NOTIFIER_DELIVERY_FAILURES_TOTAL,
        "Failed notification delivery attempts"
    );
    describe_histogram!(
        NOTIFIER_DELIVERY_DURATION_SECONDS,
        "Time to deliver one notification in seconds"
    );

    // Ruleset
    describe_counter!(
        RULESET_REFRESH_CYCLES_TOTAL,
        "Completed ruleset refresh cycles"
    );
    describe_counter!(
        RULESET_INSTALLS_TOTAL,
        "Rules files installed per source"
    );
    describe_counter!(
        RULESET_FEED_FAILURES_TOTAL,
        "Feed probe or fetch failures per source"
    );
    describe_counter!(
        RULESET_RELOADS_TOTAL,
        "Sensor rule reload commands by result"
    );
    describe_gauge!(
        RULESET_RULES_LOADED,
        "Rules loaded by the sensor after the last reload"
    );
    describe_gauge!(
        RULESET_RULES_FAILED,
        "Rules that failed to load after the last reload"
    );

    // Control
    describe_counter!(
        CONTROL_COMMANDS_TOTAL,
        "Control socket commands by command and result"
    );

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "frosty daemon uptime in seconds");
    describe_gauge!(DAEMON_WORKERS_RUNNING, "Number of running workers");
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        TAILER_LINES_TOTAL,
        TAILER_EVENTS_TOTAL,
        TAILER_PARSE_ERRORS_TOTAL,
        TAILER_ROTATIONS_TOTAL,
        TAILER_ALERTS_ENQUEUED_TOTAL,
        ALERT_QUEUE_DEPTH,
        NOTIFIER_NOTIFICATIONS_SENT_TOTAL,
        NOTIFIER_ALERTS_DELIVERED_TOTAL,
        NOTIFIER_DELIVERY_FAILURES_TOTAL,
        NOTIFIER_DELIVERY_DURATION_SECONDS,
        RULESET_REFRESH_CYCLES_TOTAL,
        RULESET_INSTALLS_TOTAL,
        RULESET_FEED_FAILURES_TOTAL,
        RULESET_RELOADS_TOTAL,
        RULESET_RULES_LOADED,
        RULESET_RULES_FAILED,
        CONTROL_COMMANDS_TOTAL,
        DAEMON_UPTIME_SECONDS,
        DAEMON_WORKERS_RUNNING,
        DAEMON_BUILD_INFO,
    ];

    #[test]
    fn all_metrics_start_with_frosty_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("frosty_"),
                "Metric '{}' does not start with 'frosty_' prefix",
                name
            );
        }
    }

    #[test]
    fn metric_names_are_unique() {
        let unique: std::collections::HashSet<_> = ALL_METRIC_NAMES.iter().collect();
        assert_eq!(unique.len(), ALL_METRIC_NAMES.len());
    }

    #[test]
    fn describe_all_does_not_panic() {
        describe_all();
    }

    #[test]
    fn delivery_duration_buckets_are_sorted() {
        let buckets = DELIVERY_DURATION_BUCKETS;
        for i in 1..buckets.len() {
            assert!(buckets[i] > buckets[i - 1]);
        }
    }
}

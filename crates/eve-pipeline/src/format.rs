//! 알림 본문 생성
//!
//! [`AlertFormatter`]는 알림 배치 하나를 사람이 읽을 수 있는 본문으로 만듭니다.
//! 알림마다 시그니처, 분류/심각도, 엔드포인트, 대시보드 딥 링크, 원본 JSON을 나열합니다.
//!
//! 딥 링크는 best-effort입니다. `flow_id`나 시각 필드가 없으면 링크만 생략되고
//! 알림 자체는 그대로 본문에 포함됩니다.

use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};

use frosty_core::event::AlertEvent;

/// 이벤트 시각. 오프셋이 있던 값은 UTC로 정규화됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventTime {
    /// UTC 기준 시각 (오프셋이 없던 값은 그대로)
    pub at: NaiveDateTime,
    /// 원본에 오프셋이 있었는지 여부
    pub had_offset: bool,
}

impl EventTime {
    /// 센서 타임스탬프를 파싱합니다.
    ///
    /// 지원 형식:
    /// - `2024-01-01T00:01:00.123456+0000` (EVE 기본 형식)
    /// - RFC 3339 (`2024-01-01T00:01:00Z`)
    /// - 오프셋 없는 `2024-01-01T00:01:00[.ffffff]`
    pub fn parse(raw: &str) -> Option<Self> {
        if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
            return Some(Self::utc(dt.with_timezone(&Utc)));
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(Self::utc(dt.with_timezone(&Utc)));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|at| Self {
                at,
                had_offset: false,
            })
    }

    fn utc(dt: DateTime<Utc>) -> Self {
        Self {
            at: dt.naive_utc(),
            had_offset: true,
        }
    }

    /// 초 단위로 렌더링합니다.
    pub fn render(&self) -> String {
        if self.had_offset {
            self.at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
        } else {
            self.at.format("%Y-%m-%dT%H:%M:%S").to_string()
        }
    }

    fn shifted(self, delta: chrono::Duration) -> Option<Self> {
        self.at.checked_add_signed(delta).map(|at| Self { at, ..self })
    }
}

/// Kibana discover 딥 링크 생성기
#[derive(Debug, Clone)]
pub struct DashboardLink {
    base_url: String,
    index_pattern: String,
    margin: chrono::Duration,
}

impl DashboardLink {
    /// 링크 생성기를 만듭니다. `base_url`이 비어 있으면 `None`.
    pub fn new(base_url: &str, index_pattern: &str, margin: Duration) -> Option<Self> {
        let base_url = base_url.trim_end_matches('/');
        if base_url.is_empty() {
            return None;
        }
        Some(Self {
            base_url: base_url.to_owned(),
            index_pattern: index_pattern.to_owned(),
            margin: chrono::Duration::from_std(margin).unwrap_or(chrono::Duration::minutes(5)),
        })
    }

    /// 알림의 시각 창 `[min - margin, max + margin]`
    ///
    /// `flow.start`와 `timestamp` 중 파싱 가능한 값만 사용합니다.
    pub fn window(&self, alert: &AlertEvent) -> Option<(EventTime, EventTime)> {
        let times: Vec<EventTime> = [alert.flow_start(), alert.timestamp()]
            .into_iter()
            .flatten()
            .filter_map(EventTime::parse)
            .collect();
        let earliest = times.iter().min()?;
        let latest = times.iter().max()?;
        Some((
            earliest.shifted(-self.margin)?,
            latest.shifted(self.margin)?,
        ))
    }

    /// 알림의 딥 링크. `flow_id` 또는 시각이 없으면 `None`.
    pub fn for_alert(&self, alert: &AlertEvent) -> Option<String> {
        let flow_id = alert.flow_id()?;
        let (from, to) = self.window(alert)?;
        Some(format!(
            "{base}/app/discover#/?_g=(filters:!(),refreshInterval:(pause:!t,value:0),\
             time:(from:'{from}',to:'{to}'))\
             &_a=(columns:!(event_type,src_ip,src_port,dest_ip,dest_port,proto,app_proto),\
             filters:!(),index:'{index}',interval:auto,sort:!(),\
             query:(language:kuery,query:'flow_id:{flow_id}'))",
            base = self.base_url,
            from = from.render(),
            to = to.render(),
            index = self.index_pattern,
        ))
    }
}

/// 알림 본문 생성기
#[derive(Debug, Clone, Default)]
pub struct AlertFormatter {
    link: Option<DashboardLink>,
}

impl AlertFormatter {
    /// 딥 링크 생성기를 지정하여 만듭니다.
    pub fn new(link: Option<DashboardLink>) -> Self {
        Self { link }
    }

    /// 알림 배치의 본문을 생성합니다.
    pub fn format_batch(&self, alerts: &[AlertEvent]) -> String {
        let mut body = String::new();
        let _ = writeln!(body, "{} alert(s)", alerts.len());
        for (i, alert) in alerts.iter().enumerate() {
            body.push('\n');
            self.format_one(&mut body, i + 1, alert);
        }
        body
    }

    fn format_one(&self, body: &mut String, index: usize, alert: &AlertEvent) {
        let _ = writeln!(
            body,
            "[{index}] {}",
            alert.signature().unwrap_or("(unsigned alert)")
        );
        if let Some(category) = alert.category() {
            match alert.severity() {
                Some(severity) => {
                    let _ = writeln!(body, "    category: {category} (severity {severity})");
                }
                None => {
                    let _ = writeln!(body, "    category: {category}");
                }
            }
        }
        if let Some(endpoints) = alert.endpoints() {
            let _ = writeln!(body, "    flow: {endpoints}");
        }
        if let Some(ts) = alert.timestamp() {
            let _ = writeln!(body, "    time: {ts}");
        }
        if let Some(url) = self.link.as_ref().and_then(|link| link.for_alert(alert)) {
            let _ = writeln!(body, "    link: {url}");
        }
        body.push_str(&alert.record().to_pretty_json());
        body.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frosty_core::event::EventRecord;
    use serde_json::json;

    fn alert(value: serde_json::Value) -> AlertEvent {
        EventRecord::from_value(value).unwrap().into_alert().unwrap()
    }

    fn link() -> DashboardLink {
        DashboardLink::new("http://127.0.0.1:5601/", "suricata-*", Duration::from_secs(300))
            .unwrap()
    }

    #[test]
    fn window_spans_five_minutes_each_side() {
        let a = alert(json!({
            "event_type": "alert",
            "alert": {"signature": "ET TROJAN"},
            "flow_id": 7,
            "flow": {"start": "2024-01-01T00:00:00"},
            "timestamp": "2024-01-01T00:01:00"
        }));
        let url = link().for_alert(&a).unwrap();
        assert!(url.starts_with("http://127.0.0.1:5601/app/discover#/?"));
        assert!(url.contains("time:(from:'2023-12-31T23:55:00',to:'2024-01-01T00:06:00')"));
        assert!(url.contains("query:'flow_id:7'"));
        assert!(url.contains("index:'suricata-*'"));
    }

    #[test]
    fn offset_timestamps_are_normalised_to_utc() {
        let a = alert(json!({
            "event_type": "alert",
            "flow_id": 1,
            "flow": {"start": "2024-01-01T02:00:00.000000+0200"},
            "timestamp": "2024-01-01T00:00:30.123456+0000"
        }));
        let (from, to) = link().window(&a).unwrap();
        assert_eq!(from.render(), "2023-12-31T23:55:00Z");
        assert_eq!(to.render(), "2024-01-01T00:05:30Z");
    }

    #[test]
    fn single_time_field_still_builds_window() {
        let a = alert(json!({
            "event_type": "alert",
            "flow_id": 1,
            "timestamp": "2024-06-01T12:00:00Z"
        }));
        let (from, to) = link().window(&a).unwrap();
        assert_eq!(from.render(), "2024-06-01T11:55:00Z");
        assert_eq!(to.render(), "2024-06-01T12:05:00Z");
    }

    #[test]
    fn missing_flow_id_omits_link() {
        let a = alert(json!({
            "event_type": "alert",
            "timestamp": "2024-01-01T00:01:00"
        }));
        assert!(link().for_alert(&a).is_none());
    }

    #[test]
    fn unparseable_time_omits_link() {
        let a = alert(json!({
            "event_type": "alert",
            "flow_id": 3,
            "timestamp": "yesterday"
        }));
        assert!(link().for_alert(&a).is_none());
    }

    #[test]
    fn empty_base_url_disables_links() {
        assert!(DashboardLink::new("", "x", Duration::from_secs(300)).is_none());
    }

    #[test]
    fn body_lists_every_alert_even_without_fields() {
        let formatter = AlertFormatter::new(Some(link()));
        let body = formatter.format_batch(&[
            alert(json!({
                "event_type": "alert",
                "alert": {"signature": "ET SCAN", "category": "Attempted Recon", "severity": 2},
                "src_ip": "10.0.0.1", "src_port": 1234,
                "dest_ip": "10.0.0.2", "dest_port": 22, "proto": "TCP"
            })),
            alert(json!({"event_type": "alert"})),
        ]);
        assert!(body.starts_with("2 alert(s)\n"));
        assert!(body.contains("[1] ET SCAN"));
        assert!(body.contains("category: Attempted Recon (severity 2)"));
        assert!(body.contains("flow: TCP 10.0.0.1:1234 -> 10.0.0.2:22"));
        assert!(body.contains("[2] (unsigned alert)"));
        assert!(!body.contains("link:"));
    }
}

//! Outage and gap shading under a chart.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::{Outage, Sample};

/// Multiple of the expected interval beyond which two adjacent samples are
/// considered a monitoring gap.
pub const GAP_FACTOR: i64 = 5;

/// A shaded window on the time axis, in ms since epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Overlay {
    pub start: i64,
    pub end: i64,
    /// The window is still open and `end` is "now".
    pub ongoing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Overlay {
    pub fn overlaps(&self, chart_start: i64, chart_end: i64) -> bool {
        self.start <= chart_end && self.end >= chart_start
    }
}

/// Turn outages into windows; an ongoing outage ends at `now`.
pub fn outage_windows(outages: &[Outage], now: DateTime<Utc>) -> Vec<Overlay> {
    outages
        .iter()
        .map(|o| Overlay {
            start: o.started_at.timestamp_millis(),
            end: o.ended_at.unwrap_or(now).timestamp_millis(),
            ongoing: o.ended_at.is_none(),
            reason: o.reason.clone(),
        })
        .collect()
}

/// Keep the windows that intersect `[chart_start, chart_end]`.
pub fn visible_overlays(windows: Vec<Overlay>, chart_start: i64, chart_end: i64) -> Vec<Overlay> {
    windows
        .into_iter()
        .filter(|w| w.overlaps(chart_start, chart_end))
        .collect()
}

/// First and last sample timestamps, in series order.
pub fn chart_window(samples: &[Sample]) -> Option<(i64, i64)> {
    let first = samples.first()?.created_at.timestamp_millis();
    let last = samples.last()?.created_at.timestamp_millis();
    Some((first.min(last), first.max(last)))
}

/// A sample backed by real probes. Buckets reporting zero data points are
/// filler produced by the stats endpoint.
fn is_real(sample: &Sample) -> bool {
    sample.data_points != Some(0)
}

/// Find monitoring gaps and drop the samples inside them.
///
/// Adjacent real samples further apart than `GAP_FACTOR * expected_interval_ms`
/// form a gap. Samples strictly inside a gap are removed from the returned
/// series; the samples bounding it are kept. Series order is preserved.
pub fn detect_gaps(samples: &[Sample], expected_interval_ms: i64) -> (Vec<Overlay>, Vec<Sample>) {
    if expected_interval_ms <= 0 {
        return (Vec::new(), samples.to_vec());
    }
    let threshold = expected_interval_ms.saturating_mul(GAP_FACTOR);

    let real: Vec<i64> = samples
        .iter()
        .filter(|s| is_real(s))
        .map(|s| s.created_at.timestamp_millis())
        .collect();

    let gaps: Vec<Overlay> = real
        .windows(2)
        .filter(|pair| pair[1] - pair[0] > threshold)
        .map(|pair| Overlay {
            start: pair[0],
            end: pair[1],
            ongoing: false,
            reason: None,
        })
        .collect();

    let kept = samples
        .iter()
        .filter(|s| {
            let t = s.created_at.timestamp_millis();
            !gaps.iter().any(|g| g.start < t && t < g.end)
        })
        .cloned()
        .collect();

    (gaps, kept)
}

/// Interval to expect between samples: the monitor's probe interval when
/// known, otherwise the smallest positive spacing in the series.
pub fn expected_interval_ms(check_interval_secs: Option<u64>, samples: &[Sample]) -> Option<i64> {
    if let Some(secs) = check_interval_secs.filter(|s| *s > 0) {
        return Some(secs as i64 * 1000);
    }

    samples
        .windows(2)
        .map(|pair| pair[1].created_at.timestamp_millis() - pair[0].created_at.timestamp_millis())
        .filter(|delta| *delta > 0)
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MonitorStatus;
    use chrono::TimeZone;

    const T0: i64 = 1_700_000_000_000;

    fn ts(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn sample(ms: i64) -> Sample {
        Sample {
            created_at: ts(ms),
            response_time: Some(100.0),
            status: MonitorStatus::Up,
            min_response_time: None,
            max_response_time: None,
            data_points: None,
        }
    }

    fn outage(start: i64, end: Option<i64>) -> Outage {
        Outage {
            started_at: ts(start),
            ended_at: end.map(ts),
            reason: Some("timeout".to_string()),
        }
    }

    #[test]
    fn test_non_overlapping_outage_is_hidden() {
        let t1 = T0 + 60_000;
        let t2 = T0 + 600_000;
        let windows = outage_windows(&[outage(T0, Some(t1))], ts(t2));
        assert!(visible_overlays(windows, t1 + 1, t2).is_empty());
    }

    #[test]
    fn test_overlapping_outage_is_shown() {
        let windows = outage_windows(&[outage(T0, Some(T0 + 60_000))], ts(T0 + 600_000));
        let visible = visible_overlays(windows, T0 - 5, T0 + 5);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].start, T0);
        assert!(!visible[0].ongoing);
    }

    #[test]
    fn test_touching_windows_overlap() {
        let windows = outage_windows(&[outage(T0, Some(T0 + 10))], ts(T0));
        assert_eq!(visible_overlays(windows.clone(), T0 + 10, T0 + 20).len(), 1);
        assert_eq!(visible_overlays(windows, T0 - 20, T0).len(), 1);
    }

    #[test]
    fn test_ongoing_outage_ends_now() {
        let now = T0 + 3_600_000;
        let windows = outage_windows(&[outage(T0, None)], ts(now));
        assert_eq!(windows[0].end, now);
        assert!(windows[0].ongoing);
        assert_eq!(visible_overlays(windows, now - 10, now + 10).len(), 1);
    }

    #[test]
    fn test_chart_window() {
        assert_eq!(chart_window(&[]), None);
        assert_eq!(
            chart_window(&[sample(T0), sample(T0 + 5), sample(T0 + 9)]),
            Some((T0, T0 + 9))
        );
    }

    #[test]
    fn test_gap_detected_between_adjacent_samples() {
        let interval = 60_000;
        let samples = vec![
            sample(T0),
            sample(T0 + interval),
            sample(T0 + interval * 10),
            sample(T0 + interval * 11),
        ];

        let (gaps, kept) = detect_gaps(&samples, interval);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].start, T0 + interval);
        assert_eq!(gaps[0].end, T0 + interval * 10);
        assert_eq!(kept.len(), 4);
    }

    #[test]
    fn test_filler_inside_gap_is_dropped() {
        let interval = 60_000;
        let mut filler = sample(T0 + interval * 5);
        filler.data_points = Some(0);
        filler.response_time = Some(0.0);

        let samples = vec![sample(T0), filler, sample(T0 + interval * 10)];
        let (gaps, kept) = detect_gaps(&samples, interval);

        assert_eq!(gaps.len(), 1);
        assert_eq!((gaps[0].start, gaps[0].end), (T0, T0 + interval * 10));
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|s| s.data_points != Some(0)));
    }

    #[test]
    fn test_gap_threshold_is_exclusive() {
        let interval = 1_000;
        let samples = vec![sample(T0), sample(T0 + 5 * interval)];
        let (gaps, _) = detect_gaps(&samples, interval);
        assert!(gaps.is_empty());
    }

    #[test]
    fn test_gap_detection_without_interval() {
        let samples = vec![sample(T0), sample(T0 + 1_000_000)];
        let (gaps, kept) = detect_gaps(&samples, 0);
        assert!(gaps.is_empty());
        assert_eq!(kept, samples);
    }

    #[test]
    fn test_expected_interval() {
        let samples = vec![sample(T0), sample(T0 + 30_000), sample(T0 + 90_000)];
        assert_eq!(expected_interval_ms(Some(60), &samples), Some(60_000));
        assert_eq!(expected_interval_ms(Some(0), &samples), Some(30_000));
        assert_eq!(expected_interval_ms(None, &samples), Some(30_000));
        assert_eq!(expected_interval_ms(None, &samples[..1]), None);
    }
}

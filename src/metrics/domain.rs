//! Axis domains for response-time charts.

use crate::api::Sample;

use super::sanitize_float;

/// Fraction of the time span added on both ends of the time axis.
pub const TIME_PADDING: f64 = 0.01;

/// Fraction of the value span added on both ends of the value axis.
pub const VALUE_PADDING: f64 = 0.1;

/// Smallest visible span of the value axis, in ms.
pub const MIN_VALUE_SPAN: f64 = 50.0;

/// Domain used for an empty time axis.
pub const EMPTY_TIME_DOMAIN: (f64, f64) = (0.0, 1.0);

/// Linear time domain over `timestamps` (ms since epoch), padded by
/// [`TIME_PADDING`]. A single timestamp yields a zero-width domain.
pub fn time_domain<I: IntoIterator<Item = i64>>(timestamps: I) -> (f64, f64) {
    let mut bounds: Option<(i64, i64)> = None;
    for ts in timestamps {
        bounds = Some(match bounds {
            Some((lo, hi)) => (lo.min(ts), hi.max(ts)),
            None => (ts, ts),
        });
    }

    let Some((lo, hi)) = bounds else {
        return EMPTY_TIME_DOMAIN;
    };

    let (lo, hi) = (lo as f64, hi as f64);
    let pad = (hi - lo) * TIME_PADDING;
    (lo - pad, hi + pad)
}

/// Time domain of a sample series.
pub fn sample_time_domain(samples: &[Sample]) -> (f64, f64) {
    time_domain(samples.iter().map(|s| s.created_at.timestamp_millis()))
}

/// Values a sample contributes to the value axis: its min/max when it is an
/// aggregate, its response time otherwise.
pub fn sample_values(sample: &Sample) -> Vec<f64> {
    let aggregate: Vec<f64> = [sample.min_response_time, sample.max_response_time]
        .into_iter()
        .flatten()
        .map(sanitize_float)
        .collect();

    if !aggregate.is_empty() {
        return aggregate;
    }
    sample
        .response_time
        .map(sanitize_float)
        .into_iter()
        .collect()
}

/// Value domain over a sample series.
///
/// The span is widened around its midpoint to at least [`MIN_VALUE_SPAN`],
/// then padded by [`VALUE_PADDING`] on both sides; the lower bound never
/// goes below 0.
pub fn value_domain(samples: &[Sample]) -> (f64, f64) {
    let values: Vec<f64> = samples.iter().flat_map(sample_values).collect();

    let (mut lo, mut hi) = if values.is_empty() {
        (0.0, 0.0)
    } else {
        values
            .iter()
            .fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(*v), hi.max(*v)))
    };

    if hi - lo < MIN_VALUE_SPAN {
        let mid = (lo + hi) / 2.0;
        lo = mid - MIN_VALUE_SPAN / 2.0;
        hi = mid + MIN_VALUE_SPAN / 2.0;
    }

    let pad = (hi - lo) * VALUE_PADDING;
    ((lo - pad).max(0.0), hi + pad)
}

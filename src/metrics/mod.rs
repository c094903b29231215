//! Aggregation and time-series correlation.
//!
//! Everything here is pure: no timers, no I/O. Functions accept whatever
//! the API handed back and never panic or produce NaN on missing fields or
//! empty input.

mod chart;
mod domain;
mod overlay;
mod rollup;

pub use chart::*;
pub use domain::*;
pub use overlay::*;
pub use rollup::*;

/// Replace NaN and infinities with 0.
pub fn sanitize_float(f: f64) -> f64 {
    if f.is_nan() || f.is_infinite() {
        0.0
    } else {
        f
    }
}

/// Read an optional number, treating absent or non-finite values as 0.
pub fn or_zero(value: Option<f64>) -> f64 {
    sanitize_float(value.unwrap_or(0.0))
}

/// Arithmetic mean, 0 for an empty input.
///
/// Values are summed in sorted order so the result does not depend on the
/// order of the input.
pub fn mean<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let mut values: Vec<f64> = values.into_iter().map(sanitize_float).collect();
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_float() {
        assert_eq!(sanitize_float(f64::NAN), 0.0);
        assert_eq!(sanitize_float(f64::INFINITY), 0.0);
        assert_eq!(sanitize_float(-3.5), -3.5);
        assert_eq!(or_zero(None), 0.0);
        assert_eq!(or_zero(Some(f64::NEG_INFINITY)), 0.0);
        assert_eq!(or_zero(Some(12.0)), 12.0);
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(Vec::<f64>::new()), 0.0);
        assert_eq!(mean([100.0]), 100.0);
        assert_eq!(mean([1.0, f64::NAN, 2.0]), 1.0);
        assert_eq!(mean([0.1, 0.2, 0.3]), mean([0.3, 0.1, 0.2]));
    }
}

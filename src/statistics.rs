//! Small numeric helpers shared by the detectors.

use chrono::{DateTime, Duration, Utc};

/// Linear-interpolated percentile of a sample, `p` in [0, 100].
/// Returns `None` for an empty sample.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("filtered to finite values"));

    let clamped = p.clamp(0.0, 100.0) / 100.0;
    let rank = clamped * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return Some(sorted[lower]);
    }
    let weight = rank - lower as f64;
    Some(sorted[lower] * (1.0 - weight) + sorted[upper] * weight)
}

/// Indices of values outside the Tukey fences (1.5 × IQR beyond Q1/Q3).
pub fn iqr_outliers(values: &[f64]) -> Vec<usize> {
    let (Some(q1), Some(q3)) = (percentile(values, 25.0), percentile(values, 75.0)) else {
        return Vec::new();
    };
    let iqr = q3 - q1;
    let low = q1 - 1.5 * iqr;
    let high = q3 + 1.5 * iqr;
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| **v < low || **v > high)
        .map(|(i, _)| i)
        .collect()
}

/// Keep only the (value, timestamp) pairs within `window` of `now`.
/// The two slices must be parallel.
pub fn filter_time_window(
    values: &[f64],
    timestamps: &[DateTime<Utc>],
    now: DateTime<Utc>,
    window: Duration,
) -> (Vec<f64>, Vec<DateTime<Utc>>) {
    debug_assert_eq!(values.len(), timestamps.len());
    let cutoff = now - window;
    values
        .iter()
        .zip(timestamps.iter())
        .filter(|(_, ts)| **ts >= cutoff)
        .map(|(v, ts)| (*v, *ts))
        .unzip()
}

/// Look up which band a value falls into. Bands are `(upper_bound, label)`
/// pairs sorted ascending; the first band whose bound is >= the value wins,
/// and values beyond every bound get the last label.
pub fn band_lookup<'a, T>(value: f64, bands: &'a [(f64, T)]) -> Option<&'a T> {
    if bands.is_empty() {
        return None;
    }
    bands
        .iter()
        .find(|(bound, _)| value <= *bound)
        .map(|(_, label)| label)
        .or_else(|| bands.last().map(|(_, label)| label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_percentile_median() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&values, 50.0), Some(3.0));
        assert_eq!(percentile(&values, 0.0), Some(1.0));
        assert_eq!(percentile(&values, 100.0), Some(5.0));
    }

    #[test]
    fn test_percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&values, 50.0), Some(2.5));
    }

    #[test]
    fn test_percentile_empty() {
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn test_iqr_outliers_flags_spike() {
        let values = [10.0, 11.0, 10.5, 9.8, 10.2, 55.0, 10.1, 9.9];
        let outliers = iqr_outliers(&values);
        assert_eq!(outliers, vec![5], "only the spike should be flagged");
    }

    #[test]
    fn test_iqr_outliers_clean_series() {
        let values = [10.0, 11.0, 10.5, 9.8, 10.2];
        assert!(iqr_outliers(&values).is_empty());
    }

    #[test]
    fn test_filter_time_window() {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let timestamps = vec![
            base - Duration::seconds(300),
            base - Duration::seconds(100),
            base,
        ];
        let values = vec![1.0, 2.0, 3.0];
        let (kept, ts) = filter_time_window(&values, &timestamps, base, Duration::seconds(120));
        assert_eq!(kept, vec![2.0, 3.0]);
        assert_eq!(ts.len(), 2);
    }

    #[test]
    fn test_band_lookup() {
        let bands = [(10_000.0, "low"), (25_000.0, "medium"), (60_000.0, "high")];
        assert_eq!(band_lookup(5_000.0, &bands), Some(&"low"));
        assert_eq!(band_lookup(10_000.0, &bands), Some(&"low"));
        assert_eq!(band_lookup(30_000.0, &bands), Some(&"high"));
        assert_eq!(band_lookup(99_000.0, &bands), Some(&"high"));
        assert_eq!(band_lookup::<&str>(1.0, &[]), None);
    }
}

// Descriptive statistics over numeric series.

/// Threshold below which standard deviation is treated as zero.
pub const STDEV_EPSILON: f64 = 1e-12;

/// Count, mean and sample standard deviation of a series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesStats {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation (n - 1 denominator); `None` below two values.
    pub stdev: Option<f64>,
}

/// Compute series statistics, or `None` for an empty slice.
pub fn series_stats(values: &[f64]) -> Option<SeriesStats> {
    let mean = mean(values)?;
    let stdev = if values.len() < 2 {
        None
    } else {
        let n = values.len() as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        Some(variance.sqrt())
    };
    Some(SeriesStats {
        count: values.len(),
        mean,
        stdev,
    })
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Absolute z-score of `value` against `stats`, or `None` when the deviation
/// is missing or approximately zero.
pub fn zscore(value: f64, stats: &SeriesStats) -> Option<f64> {
    let stdev = stats.stdev.filter(|s| *s >= STDEV_EPSILON)?;
    Some(((value - stats.mean) / stdev).abs())
}

/// Pearson correlation over paired observations.
///
/// Returns `None` with fewer than two pairs or when either side is constant.
pub fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x < STDEV_EPSILON || var_y < STDEV_EPSILON {
        return None;
    }
    Some((cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0))
}

/// Percent changes between consecutive values; a change from zero is skipped.
pub fn pct_changes(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

/// Round half away from zero to `places` decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn series_stats_uses_sample_deviation() {
        let stats = series_stats(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(stats.count, 8);
        assert!(approx(stats.mean, 5.0));
        // Sum of squared deviations is 32; 32 / 7.
        assert!(approx(stats.stdev.unwrap(), (32.0f64 / 7.0).sqrt()));
    }

    #[test]
    fn series_stats_edge_cases() {
        assert!(series_stats(&[]).is_none());
        let single = series_stats(&[3.0]).unwrap();
        assert!(approx(single.mean, 3.0));
        assert!(single.stdev.is_none());
    }

    #[test]
    fn median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn zscore_guards_zero_deviation() {
        let flat = series_stats(&[1.0, 1.0, 1.0]).unwrap();
        assert!(zscore(5.0, &flat).is_none());

        let stats = series_stats(&[1.0, 3.0]).unwrap();
        let z = zscore(0.0, &stats).unwrap();
        assert!(approx(z, 2.0 / 2f64.sqrt()));
    }

    #[test]
    fn pearson_perfect_and_inverse() {
        let up: Vec<(f64, f64)> = (0..5).map(|i| (i as f64, 2.0 * i as f64 + 1.0)).collect();
        assert!(approx(pearson(&up).unwrap(), 1.0));

        let down: Vec<(f64, f64)> = (0..5).map(|i| (i as f64, -(i as f64))).collect();
        assert!(approx(pearson(&down).unwrap(), -1.0));
    }

    #[test]
    fn pearson_undefined_for_constant_series() {
        assert!(pearson(&[(1.0, 5.0), (2.0, 5.0), (3.0, 5.0)]).is_none());
        assert!(pearson(&[(1.0, 2.0)]).is_none());
    }

    #[test]
    fn pct_changes_skip_zero_base() {
        let changes = pct_changes(&[100.0, 110.0, 0.0, 5.0]);
        assert_eq!(changes.len(), 2);
        assert!(approx(changes[0], 0.1));
        assert!(approx(changes[1], -1.0));
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(0.12345, 3), 0.123);
        assert_eq!(round_to(-0.4567, 3), -0.457);
    }
}

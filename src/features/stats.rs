//! NaN-aware summary statistics over feature contours.

/// Finite values only, sorted ascending.
pub(crate) fn finite_sorted(values: &[f64]) -> Vec<f64> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    finite.sort_by(|a, b| a.total_cmp(b));
    finite
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Population standard deviation (ddof = 0).
pub(crate) fn std_dev(values: &[f64]) -> Option<f64> {
    let mu = mean(values)?;
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let variance = finite.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / finite.len() as f64;
    Some(variance.sqrt())
}

/// Percentile in [0, 100] of ascending finite values, with linear
/// interpolation between closest ranks.
pub(crate) fn percentile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    Some(sorted[lower] * (1.0 - weight) + sorted[upper] * weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn ignores_nan_frames() {
        let contour = [f64::NAN, 100.0, 200.0, f64::NAN, 300.0];
        assert_abs_diff_eq!(mean(&contour).unwrap(), 200.0, epsilon = 1e-9);
        let sorted = finite_sorted(&contour);
        assert_abs_diff_eq!(percentile_sorted(&sorted, 50.0).unwrap(), 200.0, epsilon = 1e-9);
        let expected = (20_000.0f64 / 3.0).sqrt();
        assert_abs_diff_eq!(std_dev(&contour).unwrap(), expected, epsilon = 1e-9);
    }

    #[test]
    fn interpolates_percentiles() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_abs_diff_eq!(percentile_sorted(&values, 5.0).unwrap(), 1.2, epsilon = 1e-9);
        assert_abs_diff_eq!(percentile_sorted(&values, 95.0).unwrap(), 4.8, epsilon = 1e-9);
    }

    #[test]
    fn all_nan_is_none() {
        let contour = [f64::NAN; 4];
        assert!(mean(&contour).is_none());
        assert!(finite_sorted(&contour).is_empty());
        assert!(percentile_sorted(&[], 50.0).is_none());
        assert!(std_dev(&contour).is_none());
    }
}

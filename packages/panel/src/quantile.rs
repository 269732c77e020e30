//! Linearly interpolated quantiles over observed impact distributions.

/// Computes the `q`-quantile (0 ≤ q ≤ 1) of ascending-sorted `values` with
/// linear interpolation between order statistics, matching the behavior of
/// the usual dataframe `quantile` default.
///
/// Returns `None` for an empty slice. `q` outside `[0, 1]` is clamped.
#[must_use]
pub fn quantile_linear(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    debug_assert!(
        values.windows(2).all(|pair| pair[0] <= pair[1]),
        "values must be sorted ascending"
    );

    let q = q.clamp(0.0, 1.0);
    #[allow(clippy::cast_precision_loss)]
    let position = (values.len() - 1) as f64 * q;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let lower = position.floor() as usize;
    let fraction = position - position.floor();

    let low = values[lower];
    if lower + 1 == values.len() {
        return Some(low);
    }
    let high = values[lower + 1];
    Some(low + fraction * (high - low))
}

/// Rounds to 5 decimal places, the precision of persisted fill values.
#[must_use]
pub fn round5(value: f64) -> f64 {
    (value * 1e5).round() / 1e5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_between_order_statistics() {
        let values = [1.0, 2.0, 3.0, 4.0];
        // position = 3 × 0.05 = 0.15
        assert!((quantile_linear(&values, 0.05).unwrap() - 1.15).abs() < 1e-12);
        // position = 3 × 0.02 = 0.06
        assert!((quantile_linear(&values, 0.02).unwrap() - 1.06).abs() < 1e-12);
    }

    #[test]
    fn endpoints_are_min_and_max() {
        let values = [2.0, 5.0, 9.0];
        assert_eq!(quantile_linear(&values, 0.0), Some(2.0));
        assert_eq!(quantile_linear(&values, 1.0), Some(9.0));
    }

    #[test]
    fn single_value_is_every_quantile() {
        assert_eq!(quantile_linear(&[7.0], 0.02), Some(7.0));
        assert_eq!(quantile_linear(&[7.0], 0.95), Some(7.0));
    }

    #[test]
    fn empty_slice_has_no_quantile() {
        assert_eq!(quantile_linear(&[], 0.5), None);
    }

    #[test]
    fn out_of_range_q_is_clamped() {
        let values = [1.0, 2.0];
        assert_eq!(quantile_linear(&values, -1.0), Some(1.0));
        assert_eq!(quantile_linear(&values, 2.0), Some(2.0));
    }

    #[test]
    fn round5_truncates_to_persisted_precision() {
        assert!((round5(0.123_456_789) - 0.12346).abs() < 1e-12);
        assert!((round5(1.0) - 1.0).abs() < 1e-12);
    }
}

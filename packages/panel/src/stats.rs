//! Weighted summary statistics.

use crate::PanelError;

/// Weighted quantiles of `(value, weight)` pairs.
///
/// For each `q`, returns the smallest value whose cumulative weight (in
/// ascending value order) reaches `q` times the total weight.
///
/// # Errors
///
/// Returns [`PanelError::InvalidQuantile`] if any `q` is outside the open
/// interval (0, 1), and [`PanelError::EmptySample`] if `sample` is empty.
pub fn weighted_quantiles(sample: &[(f64, f64)], qs: &[f64]) -> Result<Vec<f64>, PanelError> {
    for &q in qs {
        if !(q > 0.0 && q < 1.0) {
            return Err(PanelError::InvalidQuantile { q });
        }
    }
    if sample.is_empty() {
        return Err(PanelError::EmptySample);
    }

    let mut sorted = sample.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

    let cumsum: Vec<f64> = sorted
        .iter()
        .scan(0.0, |acc, (_, w)| {
            *acc += w;
            Some(*acc)
        })
        .collect();
    let total = cumsum.last().copied().unwrap_or(0.0);

    Ok(qs
        .iter()
        .map(|q| {
            let cutoff = total * q;
            let idx = cumsum
                .iter()
                .position(|c| *c >= cutoff)
                .unwrap_or(sorted.len() - 1);
            sorted[idx].0
        })
        .collect())
}

/// Single weighted quantile; see [`weighted_quantiles`].
///
/// # Errors
///
/// Same as [`weighted_quantiles`].
pub fn weighted_quantile(sample: &[(f64, f64)], q: f64) -> Result<f64, PanelError> {
    weighted_quantiles(sample, &[q]).map(|v| v[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_median() {
        let sample = [(10.0, 100.0), (20.0, 300.0)];
        assert!((weighted_quantile(&sample, 0.5).unwrap() - 20.0).abs() < f64::EPSILON);
        assert!((weighted_quantile(&sample, 0.2).unwrap() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unsorted_input_is_sorted_by_value() {
        let sample = [(3.0, 1.0), (1.0, 1.0), (2.0, 1.0)];
        assert_eq!(weighted_quantiles(&sample, &[0.1, 0.5, 0.9]).unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn quantiles_must_be_inside_unit_interval() {
        let sample = [(1.0, 1.0)];
        for q in [0.0, 1.0, -0.5, 1.5, f64::NAN] {
            let err = weighted_quantile(&sample, q).unwrap_err();
            assert!(matches!(err, PanelError::InvalidQuantile { .. }));
        }
        assert_eq!(
            weighted_quantile(&sample, 1.0).unwrap_err().to_string(),
            "Quantiles must be between 0 and 1 (got 1)"
        );
    }

    #[test]
    fn empty_sample_is_an_error() {
        assert!(matches!(weighted_quantile(&[], 0.5), Err(PanelError::EmptySample)));
    }
}

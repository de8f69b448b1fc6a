use crate::error::DiagnosticError;
use anyhow::{Error, Result};
use average::Variance;
use log::debug;

/// Search window for [`mser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MserOptions {
    /// Index where the search starts.
    pub dmin: usize,
    /// Increment between candidate truncation points.
    pub dstep: usize,
    /// Index where the search stops (exclusive). `None` stops before the last element.
    pub dmax: Option<usize>,
}

impl Default for MserOptions {
    fn default() -> Self {
        Self {
            dmin: 0,
            dstep: 10,
            dmax: None,
        }
    }
}

/// Estimated equilibration time together with every squared standard error computed on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct MserEstimate {
    /// Estimated equilibration time, an index into the input series.
    pub dstar: usize,
    /// Squared standard error for each candidate `dmin, dmin + dstep, ...`.
    pub se2: Vec<f64>,
}

/// Square of the standard error, using the population variance of the series.
fn standard_error_squared(chain: &[f64]) -> f64 {
    let var: Variance = chain.iter().collect();
    var.population_variance() / chain.len() as f64
}

/// Index of the first minimum. A NaN counts as the minimum, so the first NaN wins.
fn argmin(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            return Some(i);
        }
        match best {
            Some((_, b)) if b <= v => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Estimates the equilibration time of a 1D time series using the marginal standard error rule
/// (MSER).
///
/// For candidate truncation points `d = dmin, dmin + dstep, ...` the squared standard error of
/// `chain[d..]` is computed, and the estimate is the candidate following the minimizer:
/// `min(dmin + (argmin + 1) * dstep, chain.len())`.
pub fn mser(chain: &[f64], options: MserOptions) -> Result<usize, Error> {
    Ok(mser_full(chain, options)?.dstar)
}

/// Same as [`mser`], but also returns the list of squared standard errors.
pub fn mser_full(chain: &[f64], options: MserOptions) -> Result<MserEstimate, Error> {
    let MserOptions { dmin, dstep, dmax } = options;
    if dstep == 0 {
        return Err(DiagnosticError::InvalidWindow("dstep must be positive".to_string()).into());
    }
    let length = chain.len();
    let stop = match dmax {
        Some(d) => d.min(length),
        None => length.saturating_sub(1),
    };

    let se2: Vec<f64> = (dmin..stop)
        .step_by(dstep)
        .map(|d| standard_error_squared(&chain[d..]))
        .collect();

    let best = argmin(&se2).ok_or_else(|| {
        DiagnosticError::InvalidWindow(format!(
            "no candidates between {} and {} for a series of length {}",
            dmin, stop, length
        ))
    })?;

    let dstar = (dmin + (best + 1) * dstep).min(length);
    debug!("mser: {} candidates, minimum at index {}, dstar={}", se2.len(), best, dstar);
    Ok(MserEstimate { dstar, se2 })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Elevated mean for `burn_in` steps, then a plateau; both with +-0.5 alternating noise.
    fn step_series(burn_in: usize, length: usize) -> Vec<f64> {
        (0..length)
            .map(|t| {
                let noise = if t % 2 == 0 { 0.5 } else { -0.5 };
                if t < burn_in {
                    5.0 + noise
                } else {
                    noise
                }
            })
            .collect()
    }

    #[test]
    fn test_detects_end_of_transient() {
        let chain = step_series(100, 1000);
        let d = mser(&chain, MserOptions::default()).unwrap();
        assert!(d >= 100);
        assert_eq!(d, 110);
    }

    #[test]
    fn test_full_output() {
        let chain = step_series(100, 1000);
        let est = mser_full(&chain, MserOptions::default()).unwrap();
        // 0, 10, ..., 990: the last element is never a candidate by default.
        assert_eq!(est.se2.len(), 100);
        assert_abs_diff_eq!(est.se2[10], 0.25 / 900.0, epsilon = 1e-12);

        let mean = chain.iter().sum::<f64>() / 1000.0;
        let var = chain.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / 1000.0;
        assert_abs_diff_eq!(est.se2[0], var / 1000.0, epsilon = 1e-12);
        assert_eq!(est.dstar, mser(&chain, MserOptions::default()).unwrap());
    }

    #[test]
    fn test_custom_window() {
        let chain = step_series(100, 1000);
        let options = MserOptions {
            dmin: 50,
            dstep: 25,
            dmax: Some(500),
        };
        let est = mser_full(&chain, options).unwrap();
        // Candidates 50, 75, ..., 475; the minimum is at d = 100.
        assert_eq!(est.se2.len(), 18);
        assert_eq!(est.dstar, 125);
    }

    #[test]
    fn test_dstar_clamped_to_length() {
        // Monotonically shrinking variance puts the minimum at the last candidate.
        let chain: Vec<f64> = (0..20).map(|t| 1.0 / (t as f64 + 1.0)).collect();
        let est = mser_full(&chain, MserOptions { dmin: 0, dstep: 7, dmax: None }).unwrap();
        assert_eq!(est.se2.len(), 3);
        assert_eq!(est.dstar, 20);
    }

    #[test]
    fn test_invalid_window() {
        let chain = step_series(10, 100);
        let err = mser(&chain, MserOptions { dstep: 0, ..Default::default() }).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DiagnosticError>(),
            Some(DiagnosticError::InvalidWindow(_))
        ));
        let options = MserOptions {
            dmin: 200,
            ..Default::default()
        };
        assert!(mser(&chain, options).is_err());
        assert!(mser(&[], MserOptions::default()).is_err());
    }

    #[test]
    fn test_argmin_first_nan_wins() {
        assert_eq!(argmin(&[1.0, f64::NAN, 0.5]), Some(1));
        assert_eq!(argmin(&[1.0, 0.5, 0.5, 2.0]), Some(1));
        assert_eq!(argmin(&[]), None);
    }

    #[test]
    fn test_nan_in_series() {
        // Every tail up to d = 5 contains the NaN, so the first candidate is reported.
        let mut chain = step_series(0, 40);
        chain[5] = f64::NAN;
        let options = MserOptions {
            dstep: 1,
            ..Default::default()
        };
        let est = mser_full(&chain, options).unwrap();
        assert!(est.se2[0].is_nan());
        assert_eq!(est.dstar, 1);
    }
}

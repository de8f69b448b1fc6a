use crate::error::DiagnosticError;
use crate::{Array1, Array2, Array3};
use anyhow::{anyhow, Error, Result};
use nalgebra::DMatrix;
use std::borrow::Cow;

/// Position of the time (step) axis in a chain ensemble.
///
/// Samplers disagree on layout: emcee stores `(steps, walkers, params)` while ptemcee, for a
/// single temperature, stores `(walkers, steps, params)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeAxis {
    /// Shape `(steps, walkers, params)`.
    First,
    /// Shape `(walkers, steps, params)`.
    #[default]
    Second,
}

/// Returns the `(outer, middle, inner)` extents of a nested array after checking that it is
/// rectangular.
pub fn shape(arr: &Array3) -> Result<(usize, usize, usize), Error> {
    let outer = arr.len();
    let middle = arr.first().map_or(0, |a| a.len());
    let inner = arr.first().and_then(|a| a.first()).map_or(0, |a| a.len());
    for (i, block) in arr.iter().enumerate() {
        if block.len() != middle {
            return Err(DiagnosticError::InconsistentShape(format!(
                "entry {} has {} rows, expected {}",
                i,
                block.len(),
                middle
            ))
            .into());
        }
        if let Some(row) = block.iter().find(|row| row.len() != inner) {
            return Err(DiagnosticError::InconsistentShape(format!(
                "entry {} has a row of length {}, expected {}",
                i,
                row.len(),
                inner
            ))
            .into());
        }
    }
    Ok((outer, middle, inner))
}

/// Swaps the two leading axes, turning `(a, b, c)` into `(b, a, c)`.
pub fn swap_leading_axes(arr: &Array3) -> Result<Array3, Error> {
    let (outer, middle, _) = shape(arr)?;
    let swapped = (0..middle)
        .map(|j| (0..outer).map(|i| arr[i][j].clone()).collect())
        .collect();
    Ok(swapped)
}

/// Brings a chain ensemble to `(walkers, steps, params)`, borrowing when no swap is needed.
pub(crate) fn walker_major(chains: &Array3, time_axis: TimeAxis) -> Result<Cow<'_, Array3>, Error> {
    match time_axis {
        TimeAxis::Second => {
            shape(chains)?;
            Ok(Cow::Borrowed(chains))
        }
        TimeAxis::First => Ok(Cow::Owned(swap_leading_axes(chains)?)),
    }
}

/// Brings a chain ensemble to `(steps, walkers, params)`, borrowing when no swap is needed.
pub(crate) fn time_major(chains: &Array3, time_axis: TimeAxis) -> Result<Cow<'_, Array3>, Error> {
    match time_axis {
        TimeAxis::First => {
            shape(chains)?;
            Ok(Cow::Borrowed(chains))
        }
        TimeAxis::Second => Ok(Cow::Owned(swap_leading_axes(chains)?)),
    }
}

/// Stacks observations (one per row) into an `n x p` matrix.
fn observation_matrix(observations: &[Array1]) -> Result<DMatrix<f64>, Error> {
    if observations.is_empty() {
        return Err(anyhow!("Can't build a matrix from zero observations"));
    }
    let p = observations[0].len();
    if observations.iter().any(|o| o.len() != p) {
        return Err(
            DiagnosticError::InconsistentShape("observations differ in length".to_string()).into(),
        );
    }
    Ok(DMatrix::from_fn(observations.len(), p, |i, j| observations[i][j]))
}

/// Compute the mean of each variable, with observations stored as rows.
pub fn column_means(observations: &[Array1]) -> Result<Array1, Error> {
    let x = observation_matrix(observations)?;
    Ok(x.row_mean().iter().copied().collect())
}

/// Compute the `p x p` sample covariance of observations stored as rows (variables as columns),
/// dividing by `n - ddof`.
pub fn sample_covariance(observations: &[Array1], ddof: usize) -> Result<DMatrix<f64>, Error> {
    let n = observations.len();
    if n <= ddof {
        return Err(anyhow!(
            "Need more than {} observations for a covariance, got {}",
            ddof,
            n
        ));
    }
    let x = observation_matrix(observations)?;
    let means = x.row_mean();
    let centered = DMatrix::from_fn(x.nrows(), x.ncols(), |i, j| x[(i, j)] - means[j]);
    Ok(centered.tr_mul(&centered) / (n - ddof) as f64)
}

/// Collects all samples of an ensemble into a single list of observations.
pub fn flatten(chains: &Array3) -> Array2 {
    chains.iter().flatten().cloned().collect()
}

#[cfg(test)]
pub(crate) fn normal_chains(seed: u64, centers: &[f64], n: usize, p: usize, sd: f64) -> Array3 {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use statrs::distribution::Normal;

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    centers
        .iter()
        .map(|&center| {
            let dist = Normal::new(center, sd).unwrap();
            (0..n)
                .map(|_| (0..p).map(|_| rng.sample(&dist)).collect())
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_rejects_ragged() {
        let ok = vec![vec![vec![1.0, 2.0]; 3]; 2];
        assert_eq!(shape(&ok).unwrap(), (2, 3, 2));

        let short_chain = vec![vec![vec![1.0]; 3], vec![vec![1.0]; 2]];
        let err = shape(&short_chain).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DiagnosticError>(),
            Some(DiagnosticError::InconsistentShape(_))
        ));

        let short_row = vec![vec![vec![1.0, 2.0], vec![1.0]]];
        assert!(shape(&short_row).is_err());

        let empty: Array3 = vec![];
        assert_eq!(shape(&empty).unwrap(), (0, 0, 0));
    }

    #[test]
    fn test_swap_leading_axes() {
        // (2 walkers, 3 steps, 1 param)
        let chains = vec![
            vec![vec![1.0], vec![2.0], vec![3.0]],
            vec![vec![4.0], vec![5.0], vec![6.0]],
        ];
        let swapped = swap_leading_axes(&chains).unwrap();
        assert_eq!(shape(&swapped).unwrap(), (3, 2, 1));
        assert_eq!(swapped[0], vec![vec![1.0], vec![4.0]]);
        assert_eq!(swapped[2], vec![vec![3.0], vec![6.0]]);
        assert_eq!(swap_leading_axes(&swapped).unwrap(), chains);
    }

    #[test]
    fn test_axis_normalization_borrows_when_possible() {
        let chains = vec![vec![vec![0.0]; 4]; 2];
        assert!(matches!(
            walker_major(&chains, TimeAxis::Second).unwrap(),
            Cow::Borrowed(_)
        ));
        assert!(matches!(
            time_major(&chains, TimeAxis::First).unwrap(),
            Cow::Borrowed(_)
        ));
        assert_eq!(time_major(&chains, TimeAxis::Second).unwrap().len(), 4);
    }

    #[test]
    fn test_stats() {
        // Numbers computed with numpy: np.cov(x, rowvar=False, ddof=1)
        let obs = vec![
            vec![2.13829088, 1.0],
            vec![-1.06214379, 3.0],
            vec![-0.79265699, 2.0],
            vec![-0.21300888, 0.0],
        ];
        let means = column_means(&obs).unwrap();
        assert_abs_diff_eq!(means[0], 0.0176203050, epsilon = 1e-8);
        assert_abs_diff_eq!(means[1], 1.5, epsilon = 1e-12);

        let cov = sample_covariance(&obs, 1).unwrap();
        assert_abs_diff_eq!(cov[(1, 1)], 5.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(cov[(0, 1)], cov[(1, 0)], epsilon = 1e-12);

        let biased = sample_covariance(&obs, 0).unwrap();
        assert_abs_diff_eq!(biased[(1, 1)], 1.25, epsilon = 1e-12);

        assert!(sample_covariance(&obs[..1], 1).is_err());
        assert!(column_means(&[]).is_err());
    }

    #[test]
    fn test_flatten() {
        let chains = vec![vec![vec![1.0], vec![2.0]], vec![vec![3.0], vec![4.0]]];
        assert_eq!(
            flatten(&chains),
            vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]]
        );
    }
}

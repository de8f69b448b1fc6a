use crate::error::DiagnosticError;
use crate::utils::{column_means, sample_covariance, shape, walker_major, TimeAxis};
use crate::{Array2, Array3};
use anyhow::{Error, Result};
use log::debug;
use nalgebra::DMatrix;

/// Output of [`potential_scale_reduction_factor_with_diagnostics`].
#[derive(Debug, Clone, PartialEq)]
pub struct RhatDiagnostics {
    /// Potential scale reduction factor.
    pub rhat: f64,
    /// Largest singular value of `W^-1 B/n`.
    pub lambda1: f64,
    /// Mean of the within-chain covariance matrices, `W`.
    pub within: DMatrix<f64>,
    /// Covariance of the chain means, `B/n`.
    pub between_over_n: DMatrix<f64>,
}

/// Computes the multivariate potential scale reduction factor (Rhat) proposed by
/// Brooks and Gelman (1998):
///
/// ```text
/// Rhat = 1 - 1/n + (1 + 1/m) * lambda1
/// ```
///
/// where `m` is the number of chains, `n` the number of steps per chain and `lambda1` the
/// largest singular value of `W^-1 B/n`. Values close to 1 indicate that all chains sample
/// the same distribution.
///
/// If the samples come from parallel tempering, pass the chains of a single temperature.
///
/// # Arguments
/// * `chains` - Chain ensemble of shape `(walkers, steps, params)`, or
///              `(steps, walkers, params)` together with [`TimeAxis::First`]
/// * `time_axis` - Axis holding the time series
pub fn potential_scale_reduction_factor(
    chains: &Array3,
    time_axis: TimeAxis,
) -> Result<f64, Error> {
    Ok(potential_scale_reduction_factor_with_diagnostics(chains, time_axis)?.rhat)
}

/// Same as [`potential_scale_reduction_factor`], but also returns the within-chain (`W`) and
/// between-chain (`B/n`) covariance matrices.
pub fn potential_scale_reduction_factor_with_diagnostics(
    chains: &Array3,
    time_axis: TimeAxis,
) -> Result<RhatDiagnostics, Error> {
    let chains = walker_major(chains, time_axis)?;
    let (m, n, p) = shape(&chains)?;
    if m < 2 {
        return Err(DiagnosticError::InsufficientChains(m).into());
    }
    if n < 2 {
        return Err(DiagnosticError::InsufficientSteps(n).into());
    }
    if p == 0 {
        let msg = "chains have no parameters".to_string();
        return Err(DiagnosticError::InconsistentShape(msg).into());
    }

    let within = within_chain_covariance(&chains)?;
    let between_over_n = between_chain_covariance(&chains)?;
    let lambda1 = largest_singular_value(&within, &between_over_n)?;
    debug!("rhat: m={}, n={}, p={}, lambda1={}", m, n, p, lambda1);

    let (m, n) = (m as f64, n as f64);
    let rhat = 1.0 - 1.0 / n + (1.0 + 1.0 / m) * lambda1;

    Ok(RhatDiagnostics {
        rhat,
        lambda1,
        within,
        between_over_n,
    })
}

/// Mean over chains of each chain's own sample covariance.
fn within_chain_covariance(chains: &Array3) -> Result<DMatrix<f64>, Error> {
    let mut covs = chains.iter().map(|chain| sample_covariance(chain, 1));
    let mut total = match covs.next() {
        Some(first) => first?,
        None => return Err(DiagnosticError::InsufficientChains(0).into()),
    };
    for cov in covs {
        total += cov?;
    }
    Ok(total / chains.len() as f64)
}

/// Sample covariance of the per-chain time means.
fn between_chain_covariance(chains: &Array3) -> Result<DMatrix<f64>, Error> {
    let chain_means = chains
        .iter()
        .map(|chain| column_means(chain))
        .collect::<Result<Array2, Error>>()?;
    sample_covariance(&chain_means, 1)
}

/// Solves `W V = B/n` by least squares and returns the largest singular value of `V`.
///
/// `V` is generally not symmetric. Its SVD is taken as solved.
fn largest_singular_value(
    within: &DMatrix<f64>,
    between_over_n: &DMatrix<f64>,
) -> Result<f64, Error> {
    if within.iter().any(|x| !x.is_finite()) {
        return Err(DiagnosticError::SingularCovariance("non-finite entries".to_string()).into());
    }
    let svd = within.clone().svd(true, true);
    let s_max = svd.singular_values.iter().copied().fold(0.0, f64::max);
    if s_max <= 0.0 {
        let msg = "all singular values are zero".to_string();
        return Err(DiagnosticError::SingularCovariance(msg).into());
    }
    // Same cutoff as LAPACK gelsd with rcond = -1.
    let v = svd
        .solve(between_over_n, f64::EPSILON * s_max)
        .map_err(|e| DiagnosticError::SingularCovariance(e.to_string()))?;
    if v.iter().any(|x| !x.is_finite()) {
        let msg = "solution is not finite".to_string();
        return Err(DiagnosticError::SingularCovariance(msg).into());
    }
    Ok(v.singular_values().iter().copied().fold(0.0, f64::max))
}

use crate::error::DiagnosticError;
use crate::utils::{column_means, flatten, sample_covariance, shape, time_major, TimeAxis};
use crate::{Array1, Array3};
use anyhow::{anyhow, Error, Result};
use log::{debug, warn};
use nalgebra::{DMatrix, SymmetricEigen};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::borrow::Cow;
use std::sync::Arc;

/// Tuning of the integrated autocorrelation time estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutocorrOptions {
    /// Rotate the samples into the eigenbasis of their covariance first, see
    /// [`decorrelate_chains`].
    pub decorrelate: bool,
    /// Step size for the automatic window: the window is the smallest lag `M` with
    /// `M >= c * tau(M)`.
    pub c: f64,
    /// Minimum number of autocorrelation times the chain must span.
    pub tol: f64,
    /// Log a warning instead of failing when the chain is too short.
    pub quiet: bool,
}

impl Default for AutocorrOptions {
    fn default() -> Self {
        Self {
            decorrelate: false,
            c: 5.0,
            tol: 50.0,
            quiet: false,
        }
    }
}

/// Estimates the integrated autocorrelation time of each parameter of a multi-chain ensemble.
///
/// The autocorrelation function is averaged over walkers and summed up to an automatically
/// chosen window (Sokal 1989, as in Goodman & Weare ensemble samplers).
///
/// # Arguments
/// * `chains` - Chain ensemble of shape `(walkers, steps, params)`, or
///              `(steps, walkers, params)` together with [`TimeAxis::First`]
/// * `time_axis` - Axis holding the time series
/// * `options` - Window and tolerance settings
pub fn autocorr(
    chains: &Array3,
    time_axis: TimeAxis,
    options: &AutocorrOptions,
) -> Result<Array1, Error> {
    let mut chains = time_major(chains, time_axis)?;
    if options.decorrelate {
        chains = Cow::Owned(decorrelate_chains(&chains)?);
    }
    integrated_time(&chains, options)
}

/// Shifts and rotates the samples so that the resulting parameters are approximately
/// uncorrelated.
///
/// All samples are pooled to compute their mean and covariance. Every sample is then centered
/// and expressed in the eigenbasis of that covariance, eigenvalues in ascending order.
/// The layout of the ensemble is preserved.
pub fn decorrelate_chains(chains: &Array3) -> Result<Array3, Error> {
    let (_, _, ndim) = shape(chains)?;
    let pooled = flatten(chains);
    let mean = column_means(&pooled)?;
    let cov = sample_covariance(&pooled, 1)?;

    let eig = SymmetricEigen::new(cov);
    let mut order: Vec<usize> = (0..ndim).collect();
    order.sort_by(|&a, &b| eig.eigenvalues[a].total_cmp(&eig.eigenvalues[b]));
    let basis = DMatrix::from_fn(ndim, ndim, |i, j| eig.eigenvectors[(i, order[j])]);

    let rotated: Array3 = chains
        .iter()
        .map(|block| {
            block
                .iter()
                .map(|sample| {
                    (0..ndim)
                        .map(|j| {
                            sample
                                .iter()
                                .zip(&mean)
                                .enumerate()
                                .map(|(i, (x, mu))| (x - mu) * basis[(i, j)])
                                .sum::<f64>()
                        })
                        .collect()
                })
                .collect()
        })
        .collect();
    Ok(rotated)
}

/// Forward and inverse FFT plans for autocorrelating series of a fixed length.
///
/// Series are zero-padded to a power of two of at least `2n` so the circular correlation
/// computed by the FFT has no wrap-around.
struct AutocorrPlan {
    n: usize,
    n_padded: usize,
    fft: Arc<dyn Fft<f64>>,
    ifft: Arc<dyn Fft<f64>>,
}

impl AutocorrPlan {
    fn new(n: usize) -> Self {
        let n_padded = (2 * n).next_power_of_two();
        let mut planner = FftPlanner::new();
        Self {
            n,
            n_padded,
            fft: planner.plan_fft_forward(n_padded),
            ifft: planner.plan_fft_inverse(n_padded),
        }
    }

    /// Biased autocovariance normalized by its value at lag 0.
    fn autocorrelation(&self, series: &[f64]) -> Result<Array1, Error> {
        if series.len() != self.n {
            return Err(anyhow!(
                "Planned for series of length {}, got {}",
                self.n,
                series.len()
            ));
        }
        let mean = series.iter().sum::<f64>() / self.n as f64;
        let mut buf: Vec<Complex<f64>> = series
            .iter()
            .map(|x| Complex::new(x - mean, 0.0))
            .chain(std::iter::repeat(Complex::new(0.0, 0.0)).take(self.n_padded - self.n))
            .collect();
        self.fft.process(&mut buf);
        buf.iter_mut().for_each(|z| *z *= z.conj());
        self.ifft.process(&mut buf);

        // rustfft does not normalize; the common 1/n_padded factor cancels below.
        let var = buf[0].re;
        if var.is_nan() || var <= 0.0 {
            return Err(anyhow!("Autocorrelation undefined for a series with zero variance"));
        }
        Ok(buf.iter().take(self.n).map(|z| z.re / var).collect())
    }
}

/// Normalized autocorrelation function of a 1D series, for lags `0..series.len()`.
///
/// Computed with an FFT, so the cost grows as `n log n`.
pub fn autocorr_function(series: &[f64]) -> Result<Array1, Error> {
    if series.len() < 2 {
        return Err(DiagnosticError::InsufficientSteps(series.len()).into());
    }
    AutocorrPlan::new(series.len()).autocorrelation(series)
}

/// Smallest lag `M` with `M >= c * taus[M]`.
///
/// A window that never closes falls back to lag 0, and one that never opens to the last lag.
fn auto_window(taus: &[f64], c: f64) -> usize {
    let within: Vec<bool> = taus
        .iter()
        .enumerate()
        .map(|(i, &tau)| (i as f64) < c * tau)
        .collect();
    if within.iter().any(|&w| w) {
        within.iter().position(|&w| !w).unwrap_or(0)
    } else {
        taus.len() - 1
    }
}

/// Integrated autocorrelation time per parameter of a time-major ensemble
/// `(steps, walkers, params)`.
pub fn integrated_time(chains: &Array3, options: &AutocorrOptions) -> Result<Array1, Error> {
    let (n_t, n_w, n_d) = shape(chains)?;
    if n_t < 2 {
        return Err(DiagnosticError::InsufficientSteps(n_t).into());
    }
    if n_w == 0 || n_d == 0 {
        let msg = "no walkers or parameters".to_string();
        return Err(DiagnosticError::InconsistentShape(msg).into());
    }

    let plan = AutocorrPlan::new(n_t);
    let mut tau_est = Vec::with_capacity(n_d);
    for d in 0..n_d {
        let mut f = vec![0.0; n_t];
        for k in 0..n_w {
            let series: Array1 = chains.iter().map(|step| step[k][d]).collect();
            if series.iter().all(|&x| x == series[0]) {
                return Err(DiagnosticError::ConstantChain { walker: k, param: d }.into());
            }
            for (acc, rho) in f.iter_mut().zip(plan.autocorrelation(&series)?) {
                *acc += rho;
            }
        }

        let mut cumsum = 0.0;
        let taus: Array1 = f
            .iter()
            .map(|rho| {
                cumsum += rho / n_w as f64;
                2.0 * cumsum - 1.0
            })
            .collect();
        let window = auto_window(&taus, options.c);
        debug!("integrated_time: param {} window={} tau={}", d, window, taus[window]);
        tau_est.push(taus[window]);
    }

    let n_flagged = tau_est
        .iter()
        .filter(|&&tau| options.tol * tau > n_t as f64)
        .count();
    if n_flagged > 0 {
        let err = DiagnosticError::ChainTooShort {
            tol: options.tol,
            n_flagged,
            threshold: n_t as f64 / options.tol,
            tau: tau_est.clone(),
        };
        if !options.quiet {
            return Err(err.into());
        }
        warn!("{}", err);
    }
    Ok(tau_est)
}

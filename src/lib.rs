//! A Rust library implementing convergence diagnostics for multi-chain MCMC output, such as the
//! multivariate Gelman Rubin potential scale reduction factor (R hat), equilibration time via the
//! marginal standard error rule, and integrated autocorrelation time. A few toy regression models
//! with weighted least squares costs are included as well.
//!
//! Like other MCMC diagnostics crates, this one is sampler agnostic: it works on plain nested
//! vectors holding the draws of any ensemble or multi-chain sampler (e.g. emcee, ptemcee, Stan).
#[macro_use]
extern crate approx;

/// Integrated autocorrelation time and chain decorrelation
pub mod autocorr;
/// Marginal standard error rule (MSER) for burn-in estimation
pub mod equilibration;
/// Error kinds raised by the diagnostics and models
pub mod error;
/// Regression models with weighted least squares costs
pub mod model;
/// Multivariate Gelman-Rubin potential scale reduction (Rhat)
pub mod rhat;
/// Axis handling and summary statistics shared by the diagnostics
pub mod utils;

pub use error::DiagnosticError;
pub use utils::TimeAxis;

/// One-dimensional vector of numeric values
pub type Array1 = Vec<f64>;
/// Two dimensional vector of vectors of numeric values
pub type Array2 = Vec<Array1>;
/// Three dimensional nesting used for chain ensembles, e.g. `(walkers, steps, params)`
pub type Array3 = Vec<Array2>;

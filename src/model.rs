use crate::error::DiagnosticError;
use crate::Array1;
use anyhow::{Error, Result};
use nalgebra::{DMatrix, DVector};
use std::fmt;
use std::sync::Arc;

/// Maps parameters from whatever space they are sampled in to the space used by a model.
pub type Transform = Arc<dyn Fn(&[f64]) -> Array1 + Send + Sync>;

/// Error bars of the data a model is compared against.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorBars {
    /// Same error bar for every data point.
    Uniform(f64),
    /// One error bar per data point.
    PerPoint(Array1),
}

impl Default for ErrorBars {
    fn default() -> Self {
        ErrorBars::Uniform(1.0)
    }
}

/// Configuration shared by every model: dimensions, data, error bars and parameter transform.
#[derive(Clone)]
pub struct ModelConfig {
    n_params: usize,
    n_predictions: usize,
    data: Option<Array1>,
    data_error: ErrorBars,
    transform: Option<Transform>,
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("n_params", &self.n_params)
            .field("n_predictions", &self.n_predictions)
            .field("data", &self.data)
            .field("data_error", &self.data_error)
            .field("transform", &self.transform.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl ModelConfig {
    /// Configuration for `n_params` parameters and `n_predictions` predictions, with no data,
    /// unit error bars and the identity transform.
    pub fn new(n_params: usize, n_predictions: usize) -> Self {
        Self {
            n_params,
            n_predictions,
            data: None,
            data_error: ErrorBars::default(),
            transform: None,
        }
    }

    /// Number of parameters, `N`.
    pub fn n_params(&self) -> usize {
        self.n_params
    }

    /// Number of predictions, `M`.
    pub fn n_predictions(&self) -> usize {
        self.n_predictions
    }

    /// Data values, one per prediction, if set.
    pub fn data(&self) -> Option<&Array1> {
        self.data.as_ref()
    }

    /// Error bars of the data.
    pub fn data_error(&self) -> &ErrorBars {
        &self.data_error
    }

    /// Applies the parameter transform (identity when unset) and checks the result has `N`
    /// entries.
    pub fn transform_params(&self, params: &[f64]) -> Result<Array1, Error> {
        let x = match &self.transform {
            Some(transform) => transform(params),
            None => params.to_vec(),
        };
        if x.len() != self.n_params {
            return Err(DiagnosticError::ParameterMismatch {
                expected: self.n_params,
                actual: x.len(),
            }
            .into());
        }
        Ok(x)
    }

    /// Check that the data and the corresponding error bars are set and consistent.
    fn check_data(&self) -> Result<&Array1, Error> {
        let data = self.data.as_ref().ok_or(DiagnosticError::MissingData)?;
        if data.len() != self.n_predictions {
            return Err(DiagnosticError::ShapeMismatch {
                what: "data points",
                expected: self.n_predictions,
                actual: data.len(),
            }
            .into());
        }
        if let ErrorBars::PerPoint(errors) = &self.data_error {
            if errors.is_empty() {
                return Err(DiagnosticError::MissingErrorBars.into());
            }
            if errors.len() != self.n_predictions {
                return Err(DiagnosticError::ShapeMismatch {
                    what: "error bars",
                    expected: self.n_predictions,
                    actual: errors.len(),
                }
                .into());
            }
        }
        Ok(data)
    }
}

/// A model making `M` predictions from `N` parameters, with a weighted least squares cost.
pub trait Model {
    /// Shared configuration of the model.
    fn config(&self) -> &ModelConfig;

    /// Mutable access to the configuration, used by the builder methods.
    fn config_mut(&mut self) -> &mut ModelConfig;

    /// Evaluate the model at the given parameters.
    fn predict(&self, params: &[f64]) -> Result<Array1, Error>;

    /// Residual `(data - prediction) / error` at the given parameters.
    fn residual(&self, params: &[f64]) -> Result<Array1, Error> {
        let config = self.config();
        let data = config.check_data()?;
        let preds = self.predict(params)?;
        let residual = data
            .iter()
            .zip(&preds)
            .enumerate()
            .map(|(i, (d, p))| {
                let error = match config.data_error() {
                    ErrorBars::Uniform(e) => *e,
                    ErrorBars::PerPoint(errors) => errors[i],
                };
                (d - p) / error
            })
            .collect();
        Ok(residual)
    }

    /// Weighted least squares cost, half the squared norm of the residual.
    fn cost(&self, params: &[f64]) -> Result<f64, Error> {
        let res = self.residual(params)?;
        Ok(0.5 * res.iter().map(|r| r * r).sum::<f64>())
    }

    /// Sets the data values, one per prediction.
    fn with_data(mut self, data: Array1) -> Self
    where
        Self: Sized,
    {
        self.config_mut().data = Some(data);
        self
    }

    /// Sets the error bars of the data.
    fn with_error_bars(mut self, data_error: ErrorBars) -> Self
    where
        Self: Sized,
    {
        self.config_mut().data_error = data_error;
        self
    }

    /// Sets the transform applied to the parameters before prediction.
    fn with_transform<F>(mut self, transform: F) -> Self
    where
        Self: Sized,
        F: Fn(&[f64]) -> Array1 + Send + Sync + 'static,
    {
        self.config_mut().transform = Some(Arc::new(transform));
        self
    }
}

/// Linear model with monomial basis functions,
///
/// ```text
/// f(theta; t) = sum_{n=0}^{N-1} theta_n t^n = J theta
/// ```
///
/// where `J` is the design matrix.
#[derive(Debug, Clone)]
pub struct LinearModel {
    config: ModelConfig,
    t: Array1,
    design: DMatrix<f64>,
}

impl LinearModel {
    /// Linear model with `n_params` monomials evaluated at the independent variables `t`.
    pub fn new(n_params: usize, t: Array1) -> Self {
        let design = DMatrix::from_fn(t.len(), n_params, |i, n| t[i].powi(n as i32));
        Self {
            config: ModelConfig::new(n_params, t.len()),
            t,
            design,
        }
    }

    /// Independent variable values the model predicts at.
    pub fn t(&self) -> &[f64] {
        &self.t
    }

    /// Design matrix `J`, of shape `(M, N)`.
    pub fn design_matrix(&self) -> &DMatrix<f64> {
        &self.design
    }
}

impl Model for LinearModel {
    fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn config_mut(&mut self) -> &mut ModelConfig {
        &mut self.config
    }

    fn predict(&self, params: &[f64]) -> Result<Array1, Error> {
        let x = DVector::from_vec(self.config.transform_params(params)?);
        Ok((&self.design * x).iter().copied().collect())
    }
}

/// Fractional model,
///
/// ```text
/// f(theta; t) = 1 / (sum_{n=0}^{N-1} theta_n t^n + t^N)
/// ```
#[derive(Debug, Clone)]
pub struct FractionalModel {
    config: ModelConfig,
    t: Array1,
}

impl FractionalModel {
    /// Fractional model with `n_params` coefficients evaluated at the independent variables `t`.
    pub fn new(n_params: usize, t: Array1) -> Self {
        Self {
            config: ModelConfig::new(n_params, t.len()),
            t,
        }
    }

    /// Independent variable values the model predicts at.
    pub fn t(&self) -> &[f64] {
        &self.t
    }
}

impl Model for FractionalModel {
    fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn config_mut(&mut self) -> &mut ModelConfig {
        &mut self.config
    }

    fn predict(&self, params: &[f64]) -> Result<Array1, Error> {
        let x = self.config.transform_params(params)?;
        let n = self.config.n_params() as i32;
        Ok(self
            .t
            .iter()
            .map(|&t| {
                let denom: f64 = x
                    .iter()
                    .enumerate()
                    .map(|(i, xi)| xi * t.powi(i as i32))
                    .sum();
                1.0 / (denom + t.powi(n))
            })
            .collect())
    }
}

/// Normalized sum of decaying exponentials,
///
/// ```text
/// f(theta; t) = 1/N sum_{n=0}^{N-1} exp(-theta_n t)
/// ```
#[derive(Debug, Clone)]
pub struct ExponentialModel {
    config: ModelConfig,
    t: Array1,
}

impl ExponentialModel {
    /// Sum of `n_params` exponentials evaluated at the independent variables `t`.
    pub fn new(n_params: usize, t: Array1) -> Self {
        Self {
            config: ModelConfig::new(n_params, t.len()),
            t,
        }
    }

    /// Independent variable values the model predicts at.
    pub fn t(&self) -> &[f64] {
        &self.t
    }
}

impl Model for ExponentialModel {
    fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn config_mut(&mut self) -> &mut ModelConfig {
        &mut self.config
    }

    fn predict(&self, params: &[f64]) -> Result<Array1, Error> {
        let x = self.config.transform_params(params)?;
        let n = self.config.n_params() as f64;
        Ok(self
            .t
            .iter()
            .map(|&t| x.iter().map(|xi| (-xi * t).exp()).sum::<f64>() / n)
            .collect())
    }
}

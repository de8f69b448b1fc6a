use thiserror::Error;

/// Error kinds raised by this crate.
///
/// Public functions return [`anyhow::Result`]; the kind can be recovered with
/// `err.downcast_ref::<DiagnosticError>()`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiagnosticError {
    #[error("At least 2 chains are needed, got {0}")]
    InsufficientChains(usize),
    #[error("At least 2 steps per chain are needed, got {0}")]
    InsufficientSteps(usize),
    #[error("Within-chain covariance is singular: {0}")]
    SingularCovariance(String),
    #[error("Chains must be rectangular: {0}")]
    InconsistentShape(String),
    #[error("Invalid MSER search window: {0}")]
    InvalidWindow(String),
    #[error(
        "The chain is shorter than {tol} times the integrated autocorrelation time for \
         {n_flagged} parameter(s). N/{tol} = {threshold:.0}; tau: {tau:?}"
    )]
    ChainTooShort {
        tol: f64,
        n_flagged: usize,
        threshold: f64,
        tau: Vec<f64>,
    },
    #[error("No autocorrelation when elements are all constant (walker={walker}, param={param})")]
    ConstantChain { walker: usize, param: usize },
    #[error("Please set the values of the data")]
    MissingData,
    #[error("Please set the error bars of the data")]
    MissingErrorBars,
    #[error("Expected {expected} parameters, got {actual}")]
    ParameterMismatch { expected: usize, actual: usize },
    #[error("Expected {expected} {what}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}

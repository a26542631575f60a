//! Error taxonomy shared by all analysis stages.
//!
//! Only genuine faults are errors. Expected negative outcomes of the analysis
//! (an infeasible sign condition, an exhausted witness search) are ordinary
//! result variants and never travel through this type.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrnError {
    /// Structural defect of the input network. Fatal, no partial result.
    #[error("Malformed network: {0}")]
    MalformedNetwork(String),
    /// External solver could not be invoked or is misconfigured.
    #[error("Solver error: {0}")]
    SolverError(String),
    /// A numerical result left its sanity bounds (negative or non-finite values, overflow).
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),
    /// Equation string or network file could not be read.
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Invalid configuration: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type CrnResult<T> = Result<T, CrnError>;

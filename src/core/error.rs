use thiserror::Error;

/// Failure outcomes of a solve. None of these are faults; each is a normal
/// result the caller renders for the user.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    #[error("unsupported target `{0}`")]
    UnsupportedTarget(String),

    #[error("missing required input `{field}`")]
    MissingInput { field: &'static str },

    /// An iterative procedure used up its budget without meeting tolerance.
    #[error("{procedure} did not converge after {iterations} iterations (residual {residual})")]
    NonConvergence {
        procedure: &'static str,
        iterations: u32,
        residual: f64,
    },

    #[error("target corpus is unreachable within {months} months")]
    Unreachable { months: u32 },

    #[error("horizon of {horizon_years} years exceeds the {limit}-month limit")]
    HorizonTooLong { horizon_years: f64, limit: u32 },

    #[error("division by zero in {context}")]
    DivisionDegenerate { context: &'static str },

    #[error("invalid solver configuration: {0}")]
    InvalidConfig(String),
}

impl SolveError {
    /// Stable camelCase name of the variant, used by the HTTP API.
    pub fn kind(&self) -> &'static str {
        match self {
            SolveError::UnsupportedTarget(_) => "unsupportedTarget",
            SolveError::MissingInput { .. } => "missingInput",
            SolveError::NonConvergence { .. } => "nonConvergence",
            SolveError::Unreachable { .. } => "unreachable",
            SolveError::HorizonTooLong { .. } => "horizonTooLong",
            SolveError::DivisionDegenerate { .. } => "divisionDegenerate",
            SolveError::InvalidConfig(_) => "invalidConfig",
        }
    }

    pub(crate) fn non_convergence(procedure: &'static str, iterations: u32, residual: f64) -> Self {
        Self::NonConvergence {
            procedure,
            iterations,
            residual,
        }
    }
}

pub type Result<T> = std::result::Result<T, SolveError>;

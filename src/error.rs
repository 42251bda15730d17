use thiserror::Error;

pub type PlannerResult<T> = std::result::Result<T, PlannerError>;

/// Failures of a planning run.
///
/// Every variant aborts the run without producing a plan. All of them are
/// recoverable at the next hourly tick, which retries with fresh inputs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlannerError {
    /// The current-hour price or solar forecast is missing entirely.
    #[error("Insufficient forecast data: {0}")]
    InsufficientForecastData(String),
    /// A parameter is outside its allowed range. Fatal at startup.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// The linear program has no feasible point for the given inputs.
    #[error("Infeasible configuration: {0}")]
    InfeasibleConfiguration(String),
    /// The LP backend failed numerically, timed out, or is not available.
    #[error("Solver error: {0}")]
    SolverError(String),
}

impl PlannerError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InsufficientForecastData(_) => "insufficient_forecast_data",
            Self::InvalidConfiguration(_) => "invalid_configuration",
            Self::InfeasibleConfiguration(_) => "infeasible_configuration",
            Self::SolverError(_) => "solver_error",
        }
    }
}

mod engine;
mod error;
mod solver;
mod types;

pub use engine::{
    annuity_factor, project_corpus, simulate_corpus, solve_horizon_years, solve_initial_investment,
    solve_monthly_contribution, solve_rate_of_return, solve_stepup_percent, stepup_future_value,
};
pub use error::{Result, SolveError};
pub use solver::{solve, solve_named, validate_config};
pub use types::{
    ContributionStrategy, Estimate, InvestmentScenario, PlanInputs, Solution, SolveTarget,
    SolveWarning, SolverConfig, ZeroRatePolicy,
};

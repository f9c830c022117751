use tracing::debug;

use super::engine::{
    project_corpus, solve_horizon_years, solve_initial_investment, solve_monthly_contribution,
    solve_rate_of_return, solve_stepup_percent,
};
use super::error::{Result, SolveError};
use super::types::{InvestmentScenario, PlanInputs, Solution, SolveTarget, SolverConfig};

/// Solves for `target` from the other five fields of `scenario`.
///
/// The value in the returned [`Solution`] is rounded to two decimal places.
/// Percent targets (rate, step-up) come back as whole percent.
pub fn solve(
    target: SolveTarget,
    scenario: &InvestmentScenario,
    config: &SolverConfig,
) -> Result<Solution> {
    validate_config(config)?;
    let inputs = resolve_inputs(target, scenario)?;

    let estimate = match target {
        SolveTarget::TargetCorpus => project_corpus(&inputs, config)?,
        SolveTarget::InitialInvestment => solve_initial_investment(&inputs, config)?,
        SolveTarget::AnnualRateOfReturn => solve_rate_of_return(&inputs, config)?,
        SolveTarget::HorizonYears => solve_horizon_years(&inputs, config)?,
        SolveTarget::MonthlyContribution => solve_monthly_contribution(&inputs, config)?,
        SolveTarget::AnnualStepupPercent => solve_stepup_percent(&inputs, config)?,
    };

    debug!(
        solve_target = %target,
        raw = estimate.value,
        iterations = estimate.iterations,
        "solve finished"
    );
    Ok(Solution {
        target,
        value: round_to_cents(estimate.value),
        iterations: estimate.iterations,
        warning: estimate.warning,
    })
}

/// Parses a target name and solves; unknown names yield `UnsupportedTarget`.
pub fn solve_named(
    target: &str,
    scenario: &InvestmentScenario,
    config: &SolverConfig,
) -> Result<Solution> {
    solve(target.parse()?, scenario, config)
}

/// Fills a [`PlanInputs`] from the scenario. Every field other than `target`
/// must be present; the target's own slot is ignored.
fn resolve_inputs(target: SolveTarget, scenario: &InvestmentScenario) -> Result<PlanInputs> {
    let field = |field: SolveTarget| -> Result<f64> {
        if field == target {
            return Ok(0.0);
        }
        scenario.get(field).ok_or(SolveError::MissingInput {
            field: field.field_name(),
        })
    };

    Ok(PlanInputs {
        initial_investment: field(SolveTarget::InitialInvestment)?,
        annual_rate_of_return: field(SolveTarget::AnnualRateOfReturn)?,
        horizon_years: field(SolveTarget::HorizonYears)?,
        monthly_contribution: field(SolveTarget::MonthlyContribution)?,
        annual_stepup_percent: field(SolveTarget::AnnualStepupPercent)?,
        target_corpus: field(SolveTarget::TargetCorpus)?,
    })
}

fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn validate_config(config: &SolverConfig) -> Result<()> {
    if !config.rate_tolerance.is_finite() || config.rate_tolerance <= 0.0 {
        return Err(SolveError::InvalidConfig(
            "rate_tolerance must be > 0".to_string(),
        ));
    }
    if config.max_horizon_months == 0 {
        return Err(SolveError::InvalidConfig(
            "max_horizon_months must be > 0".to_string(),
        ));
    }
    if config.max_contribution_iterations == 0 {
        return Err(SolveError::InvalidConfig(
            "max_contribution_iterations must be > 0".to_string(),
        ));
    }
    if !(config.contribution_damping > 0.0 && config.contribution_damping <= 1.0) {
        return Err(SolveError::InvalidConfig(
            "contribution_damping must be in (0, 1]".to_string(),
        ));
    }
    if !config.contribution_tolerance.is_finite() || config.contribution_tolerance <= 0.0 {
        return Err(SolveError::InvalidConfig(
            "contribution_tolerance must be > 0".to_string(),
        ));
    }
    if !config.newton_initial_guess.is_finite() {
        return Err(SolveError::InvalidConfig(
            "newton_initial_guess must be finite".to_string(),
        ));
    }
    if !config.newton_step.is_finite() || config.newton_step <= 0.0 {
        return Err(SolveError::InvalidConfig(
            "newton_step must be > 0".to_string(),
        ));
    }
    if !config.newton_tolerance.is_finite() || config.newton_tolerance <= 0.0 {
        return Err(SolveError::InvalidConfig(
            "newton_tolerance must be > 0".to_string(),
        ));
    }
    if config.max_newton_iterations == 0 {
        return Err(SolveError::InvalidConfig(
            "max_newton_iterations must be > 0".to_string(),
        ));
    }
    Ok(())
}

use tracing::{debug, warn};

use super::error::{Result, SolveError};
use super::types::{
    ContributionStrategy, Estimate, PlanInputs, SolveWarning, SolverConfig, ZeroRatePolicy,
};

const RATE_SEARCH_MIN: f64 = 0.0;
const RATE_SEARCH_MAX: f64 = 1.0;
/// Largest fraction of the current guess one damped step may remove.
const MAX_CONTRIBUTION_BACKOFF: f64 = 0.5;

/// Future value of a level payment of 1 made at the end of each of `months`
/// periods. At a zero rate the factor is either its limit (`months`) or an
/// error, depending on `policy`.
pub fn annuity_factor(monthly_rate: f64, months: u32, policy: ZeroRatePolicy) -> Result<f64> {
    if monthly_rate == 0.0 {
        return match policy {
            ZeroRatePolicy::Limit => Ok(months as f64),
            ZeroRatePolicy::Reject => Err(SolveError::DivisionDegenerate {
                context: "annuity factor at a zero monthly rate",
            }),
        };
    }
    let exponent = i32::try_from(months).map_err(|_| SolveError::HorizonTooLong {
        horizon_years: months as f64 / 12.0,
        limit: i32::MAX as u32,
    })?;
    Ok(((1.0 + monthly_rate).powi(exponent) - 1.0) / monthly_rate)
}

/// Whole months of the plan, bounded by `max_horizon_months`.
fn plan_months(inputs: &PlanInputs, config: &SolverConfig) -> Result<u32> {
    let months = inputs.total_months()?;
    if months > config.max_horizon_months {
        warn!(months, limit = config.max_horizon_months, "horizon exceeds the month budget");
        return Err(SolveError::HorizonTooLong {
            horizon_years: inputs.horizon_years,
            limit: config.max_horizon_months,
        });
    }
    Ok(months)
}

/// Month-by-month projection with contributions made at the start of each
/// month; the contribution grows by `stepup_factor` after every 12th month.
/// With a unit step-up factor this equals the closed-form projection.
pub fn simulate_corpus(
    principal: f64,
    monthly_rate: f64,
    months: u32,
    contribution: f64,
    stepup_factor: f64,
) -> f64 {
    let mut corpus = principal;
    let mut current = contribution;
    for month in 1..=months {
        corpus = (corpus + current) * (1.0 + monthly_rate);
        if month % 12 == 0 {
            current *= stepup_factor;
        }
    }
    corpus
}

/// Value of the contributions alone, each deposited at the end of its month.
fn contribution_value(
    monthly_rate: f64,
    months: u32,
    contribution: f64,
    stepup_factor: f64,
) -> f64 {
    let mut total = 0.0;
    let mut current = contribution;
    for month in 1..=months {
        total = total * (1.0 + monthly_rate) + current;
        if month % 12 == 0 {
            current *= stepup_factor;
        }
    }
    total
}

fn closed_form_corpus(
    inputs: &PlanInputs,
    monthly_rate: f64,
    months: u32,
    policy: ZeroRatePolicy,
) -> Result<f64> {
    let factor = annuity_factor(monthly_rate, months, policy)?;
    let growth = (1.0 + monthly_rate).powi(months as i32);
    Ok(inputs.initial_investment * growth
        + inputs.monthly_contribution * factor * (1.0 + monthly_rate))
}

fn corpus_at_rate(
    inputs: &PlanInputs,
    monthly_rate: f64,
    months: u32,
    config: &SolverConfig,
) -> Result<f64> {
    if config.apply_stepup_in_forward_model {
        return Ok(simulate_corpus(
            inputs.initial_investment,
            monthly_rate,
            months,
            inputs.monthly_contribution,
            inputs.stepup_factor(),
        ));
    }
    closed_form_corpus(inputs, monthly_rate, months, config.zero_rate_policy)
}

pub fn project_corpus(inputs: &PlanInputs, config: &SolverConfig) -> Result<Estimate> {
    let months = plan_months(inputs, config)?;
    let corpus = corpus_at_rate(inputs, inputs.monthly_rate(), months, config)?;
    debug!(corpus, stepup = config.apply_stepup_in_forward_model, "projected corpus");
    Ok(Estimate::exact(corpus))
}

/// Lump sum needed today so that, together with the stepped-up contributions,
/// the plan reaches the target. Contributions compound monthly while the lump
/// sum is discounted annually. A negative result means the contributions alone
/// overshoot the target.
pub fn solve_initial_investment(inputs: &PlanInputs, config: &SolverConfig) -> Result<Estimate> {
    let contributions = contribution_value(
        inputs.monthly_rate(),
        plan_months(inputs, config)?,
        inputs.monthly_contribution,
        inputs.stepup_factor(),
    );
    let annual_rate = inputs.annual_rate_of_return / 100.0;
    let required =
        (inputs.target_corpus - contributions) / (1.0 + annual_rate).powf(inputs.horizon_years);
    debug!(contributions, required, "solved initial investment");
    Ok(Estimate::exact(required))
}

pub fn solve_rate_of_return(inputs: &PlanInputs, config: &SolverConfig) -> Result<Estimate> {
    let months = plan_months(inputs, config)?;
    let mut low = RATE_SEARCH_MIN;
    let mut high = RATE_SEARCH_MAX;
    let mut iterations = 0;
    // The midpoint never reaches zero, so the closed form is always defined here.
    let search_config = SolverConfig {
        zero_rate_policy: ZeroRatePolicy::Limit,
        ..*config
    };

    while high - low >= config.rate_tolerance {
        iterations += 1;
        let rate = (low + high) * 0.5;
        let projected = corpus_at_rate(inputs, rate / 12.0, months, &search_config)?;
        if projected < inputs.target_corpus {
            low = rate;
        } else {
            high = rate;
        }
    }

    let rate = (low + high) * 0.5;
    let warning = rate_bound_warning(inputs, rate, months, &search_config)?;
    if let Some(warning) = warning {
        warn!(rate, %warning, "rate search ended at a bound");
    }
    debug!(rate, iterations, "solved rate of return");
    Ok(Estimate {
        value: rate * 100.0,
        iterations,
        warning,
    })
}

fn rate_bound_warning(
    inputs: &PlanInputs,
    rate: f64,
    months: u32,
    config: &SolverConfig,
) -> Result<Option<SolveWarning>> {
    let near_max = RATE_SEARCH_MAX - rate <= config.rate_tolerance;
    let near_min = rate - RATE_SEARCH_MIN <= config.rate_tolerance;
    let corpus_at = |rate: f64| corpus_at_rate(inputs, rate / 12.0, months, config);
    if near_max && corpus_at(RATE_SEARCH_MAX)? < inputs.target_corpus {
        return Ok(Some(SolveWarning::RateAtSearchBound));
    }
    if near_min && corpus_at(RATE_SEARCH_MIN)? > inputs.target_corpus {
        return Ok(Some(SolveWarning::RateAtSearchBound));
    }
    Ok(None)
}

/// Runs the plan forward one month at a time until the corpus reaches the
/// target. Contributions are deposited at the end of each month.
pub fn solve_horizon_years(inputs: &PlanInputs, config: &SolverConfig) -> Result<Estimate> {
    let monthly_rate = inputs.monthly_rate();
    let stepup_factor = inputs.stepup_factor();
    let mut corpus = inputs.initial_investment;
    let mut current = inputs.monthly_contribution;
    let mut months: u32 = 0;

    while corpus < inputs.target_corpus {
        if months >= config.max_horizon_months {
            warn!(months, corpus, target = inputs.target_corpus, "horizon search exhausted");
            return Err(SolveError::Unreachable { months });
        }
        corpus = corpus * (1.0 + monthly_rate) + current;
        months += 1;
        if months % 12 == 0 {
            current *= stepup_factor;
        }
    }

    debug!(months, "solved horizon");
    Ok(Estimate {
        value: months as f64 / 12.0,
        iterations: months,
        warning: None,
    })
}

pub fn solve_monthly_contribution(inputs: &PlanInputs, config: &SolverConfig) -> Result<Estimate> {
    match config.contribution_strategy {
        ContributionStrategy::DampedSearch => damped_contribution_search(inputs, config),
        ContributionStrategy::ClosedForm => closed_form_contribution(inputs, config),
    }
}

fn damped_contribution_search(inputs: &PlanInputs, config: &SolverConfig) -> Result<Estimate> {
    let months = plan_months(inputs, config)?;
    if months == 0 {
        return Err(SolveError::DivisionDegenerate {
            context: "contribution search over a zero-month horizon",
        });
    }

    let monthly_rate = inputs.monthly_rate();
    let stepup_factor = inputs.stepup_factor();
    let target = inputs.target_corpus;
    let principal_only =
        simulate_corpus(inputs.initial_investment, monthly_rate, months, 0.0, stepup_factor);
    if principal_only >= target {
        debug!(principal_only, "principal alone meets the target");
        return Ok(Estimate::exact(0.0));
    }
    // The gap is measured against what the contributions have to cover, so a
    // dominant lump sum does not shrink the steps to nothing.
    let span = target - principal_only;

    // Start well below the root; the multiplicative update grows the guess
    // into it from underneath. An overshoot at most halves the guess, which
    // keeps it positive.
    let mut guess = target / (months as f64 * 12.0);
    let mut gap = f64::INFINITY;
    for iteration in 0..config.max_contribution_iterations {
        let projected = simulate_corpus(
            inputs.initial_investment,
            monthly_rate,
            months,
            guess,
            stepup_factor,
        );
        gap = target - projected;
        if gap.abs() < config.contribution_tolerance {
            debug!(guess, iteration, "solved monthly contribution");
            return Ok(Estimate {
                value: guess.max(0.0),
                iterations: iteration,
                warning: None,
            });
        }
        let step = (gap / span * config.contribution_damping).max(-MAX_CONTRIBUTION_BACKOFF);
        guess += guess * step;
    }

    warn!(guess, gap, "contribution search did not converge");
    Err(SolveError::non_convergence(
        "contribution search",
        config.max_contribution_iterations,
        gap.abs(),
    ))
}

fn closed_form_contribution(inputs: &PlanInputs, config: &SolverConfig) -> Result<Estimate> {
    let monthly_rate = inputs.monthly_rate();
    let months = plan_months(inputs, config)?;
    let principal_value = inputs.initial_investment * (1.0 + monthly_rate).powi(months as i32);
    let factor = annuity_factor(monthly_rate, months, config.zero_rate_policy)?;
    let denominator = factor * (1.0 + monthly_rate);
    if denominator == 0.0 {
        return Err(SolveError::DivisionDegenerate {
            context: "contribution formula over a zero-month horizon",
        });
    }
    let required = ((inputs.target_corpus - principal_value) / denominator).max(0.0);
    debug!(required, "solved monthly contribution (closed form)");
    Ok(Estimate::exact(required))
}

/// Future value of the contributions when each year's payments are grown by
/// `stepup` (a fraction) over the previous year. Each year's twelve payments
/// are treated as one deposit at the start of that year; the lump sum is not
/// part of this model.
pub fn stepup_future_value(
    monthly_contribution: f64,
    monthly_rate: f64,
    horizon_years: f64,
    stepup: f64,
) -> f64 {
    let whole_years = horizon_years.floor().max(0.0) as u32;
    let mut current = monthly_contribution;
    let mut total = 0.0;
    for year in 0..whole_years {
        let months_remaining = (horizon_years - year as f64) * 12.0;
        total += current * 12.0 * (1.0 + monthly_rate).powf(months_remaining);
        current *= 1.0 + stepup;
    }
    total
}

pub fn solve_stepup_percent(inputs: &PlanInputs, config: &SolverConfig) -> Result<Estimate> {
    plan_months(inputs, config)?;
    let monthly_rate = inputs.monthly_rate();
    let residual = |stepup: f64| {
        stepup_future_value(
            inputs.monthly_contribution,
            monthly_rate,
            inputs.horizon_years,
            stepup,
        ) - inputs.target_corpus
    };

    let h = config.newton_step;
    let mut stepup = config.newton_initial_guess;
    let mut value = residual(stepup);
    for iteration in 0..config.max_newton_iterations {
        if value.abs() < config.newton_tolerance {
            debug!(stepup, iteration, "solved step-up");
            return Ok(Estimate {
                value: stepup * 100.0,
                iterations: iteration,
                warning: None,
            });
        }

        let slope = (residual(stepup + h) - residual(stepup - h)) / (2.0 * h);
        if slope == 0.0 || !slope.is_finite() {
            warn!(stepup, slope, "step-up search hit a flat or invalid derivative");
            return Err(SolveError::non_convergence(
                "step-up Newton-Raphson",
                iteration,
                value.abs(),
            ));
        }
        stepup -= value / slope;
        value = residual(stepup);
    }

    if value.abs() < config.newton_tolerance {
        return Ok(Estimate {
            value: stepup * 100.0,
            iterations: config.max_newton_iterations,
            warning: None,
        });
    }
    warn!(stepup, residual = value, "step-up search did not converge");
    Err(SolveError::non_convergence(
        "step-up Newton-Raphson",
        config.max_newton_iterations,
        value.abs(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{Just, prop_assert, prop_assume, prop_oneof, proptest};

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn sample_inputs() -> PlanInputs {
        PlanInputs {
            initial_investment: 100_000.0,
            annual_rate_of_return: 12.0,
            horizon_years: 10.0,
            monthly_contribution: 5_000.0,
            annual_stepup_percent: 0.0,
            target_corpus: 0.0,
        }
    }

    fn project(inputs: &PlanInputs) -> f64 {
        project_corpus(inputs, &SolverConfig::default())
            .expect("projection")
            .value
    }

    #[test]
    fn project_corpus_matches_regression_oracle() {
        let corpus = project(&sample_inputs());
        assert_close(corpus, 1_491_734.071_217, 1e-3);
    }

    #[test]
    fn project_corpus_ignores_stepup_by_default() {
        let mut inputs = sample_inputs();
        inputs.annual_stepup_percent = 10.0;
        assert_close(project(&inputs), 1_491_734.071_217, 1e-3);
    }

    #[test]
    fn stepup_simulation_matches_closed_form_without_stepup() {
        let inputs = sample_inputs();
        let config = SolverConfig {
            apply_stepup_in_forward_model: true,
            ..SolverConfig::default()
        };
        let simulated = project_corpus(&inputs, &config).expect("projection").value;
        assert_close(simulated, project(&inputs), 1e-6);
    }

    #[test]
    fn stepup_flag_raises_projection_when_stepup_positive() {
        let mut inputs = sample_inputs();
        inputs.annual_stepup_percent = 10.0;
        let config = SolverConfig {
            apply_stepup_in_forward_model: true,
            ..SolverConfig::default()
        };
        let simulated = project_corpus(&inputs, &config).expect("projection").value;
        assert!(simulated > project(&inputs));
    }

    #[test]
    fn zero_rate_uses_limit_of_annuity_factor() {
        let mut inputs = sample_inputs();
        inputs.annual_rate_of_return = 0.0;
        assert_close(project(&inputs), 100_000.0 + 5_000.0 * 120.0, 1e-9);
    }

    #[test]
    fn zero_rate_is_rejected_under_reject_policy() {
        let mut inputs = sample_inputs();
        inputs.annual_rate_of_return = 0.0;
        let config = SolverConfig {
            zero_rate_policy: ZeroRatePolicy::Reject,
            ..SolverConfig::default()
        };
        let err = project_corpus(&inputs, &config).expect_err("zero rate must be rejected");
        assert!(matches!(err, SolveError::DivisionDegenerate { .. }));
    }

    #[test]
    fn initial_investment_discounts_annually() {
        let mut inputs = sample_inputs();
        inputs.annual_stepup_percent = 10.0;
        inputs.target_corpus = 2_000_000.0;
        let estimate =
            solve_initial_investment(&inputs, &SolverConfig::default()).expect("solve");
        assert_close(estimate.value, 106_103.53, 0.01);
    }

    #[test]
    fn initial_investment_is_negative_when_contributions_overshoot() {
        let mut inputs = sample_inputs();
        inputs.target_corpus = 1_000.0;
        let estimate =
            solve_initial_investment(&inputs, &SolverConfig::default()).expect("solve");
        assert!(estimate.value < 0.0);
    }

    #[test]
    fn rate_search_recovers_known_rate() {
        let mut inputs = sample_inputs();
        inputs.target_corpus = project(&inputs);
        let estimate = solve_rate_of_return(&inputs, &SolverConfig::default()).expect("solve");
        assert_close(estimate.value, 12.0, 1e-4);
        assert!(estimate.iterations <= 20);
        assert!(estimate.warning.is_none());
    }

    #[test]
    fn rate_search_warns_when_target_needs_more_than_full_rate() {
        let mut inputs = sample_inputs();
        inputs.target_corpus = 1e15;
        let estimate = solve_rate_of_return(&inputs, &SolverConfig::default()).expect("solve");
        assert_close(estimate.value, 100.0, 1e-3);
        assert_eq!(estimate.warning, Some(SolveWarning::RateAtSearchBound));
    }

    #[test]
    fn rate_search_warns_when_target_below_zero_rate_value() {
        let mut inputs = sample_inputs();
        inputs.target_corpus = 10.0;
        let estimate = solve_rate_of_return(&inputs, &SolverConfig::default()).expect("solve");
        assert_close(estimate.value, 0.0, 1e-3);
        assert_eq!(estimate.warning, Some(SolveWarning::RateAtSearchBound));
    }

    #[test]
    fn horizon_round_trip_lands_within_one_month() {
        let mut inputs = sample_inputs();
        inputs.target_corpus = project(&inputs);
        let estimate = solve_horizon_years(&inputs, &SolverConfig::default()).expect("solve");
        assert_close(estimate.value, 10.0, 1.0 / 12.0 + 1e-9);
    }

    #[test]
    fn horizon_is_zero_when_principal_already_meets_target() {
        let mut inputs = sample_inputs();
        inputs.target_corpus = 50_000.0;
        let estimate = solve_horizon_years(&inputs, &SolverConfig::default()).expect("solve");
        assert_close(estimate.value, 0.0, 0.0);
    }

    #[test]
    fn horizon_reports_unreachable_instead_of_looping() {
        let inputs = PlanInputs {
            initial_investment: 100.0,
            annual_rate_of_return: 0.0,
            horizon_years: 0.0,
            monthly_contribution: 0.0,
            annual_stepup_percent: 0.0,
            target_corpus: 1_000_000.0,
        };
        let config = SolverConfig::default();
        let err = solve_horizon_years(&inputs, &config).expect_err("must not converge");
        assert_eq!(
            err,
            SolveError::Unreachable {
                months: config.max_horizon_months
            }
        );
    }

    #[test]
    fn horizon_applies_stepup_every_twelve_months() {
        let inputs = PlanInputs {
            initial_investment: 0.0,
            annual_rate_of_return: 0.0,
            horizon_years: 0.0,
            monthly_contribution: 100.0,
            annual_stepup_percent: 100.0,
            target_corpus: 1_400.0,
        };
        // 12 * 100 in year one, then 200 per month.
        let estimate = solve_horizon_years(&inputs, &SolverConfig::default()).expect("solve");
        assert_eq!(estimate.iterations, 13);
    }

    #[test]
    fn damped_search_recovers_known_contribution_with_stepup() {
        let mut inputs = sample_inputs();
        inputs.initial_investment = 0.0;
        inputs.annual_rate_of_return = 10.0;
        inputs.horizon_years = 15.0;
        inputs.annual_stepup_percent = 10.0;
        inputs.target_corpus = simulate_corpus(0.0, 10.0 / 1200.0, 180, 7_000.0, 1.1);

        let estimate =
            solve_monthly_contribution(&inputs, &SolverConfig::default()).expect("solve");
        assert_close(estimate.value, 7_000.0, 70.0);
    }

    #[test]
    fn damped_search_returns_zero_when_principal_suffices() {
        let mut inputs = sample_inputs();
        inputs.target_corpus = 200_000.0;
        let estimate =
            solve_monthly_contribution(&inputs, &SolverConfig::default()).expect("solve");
        assert_close(estimate.value, 0.0, 0.0);
    }

    #[test]
    fn damped_search_reports_non_convergence_when_budget_too_small() {
        let mut inputs = sample_inputs();
        inputs.target_corpus = project(&inputs);
        let config = SolverConfig {
            max_contribution_iterations: 3,
            ..SolverConfig::default()
        };
        let err = solve_monthly_contribution(&inputs, &config).expect_err("budget too small");
        assert!(matches!(
            err,
            SolveError::NonConvergence { iterations: 3, .. }
        ));
    }

    #[test]
    fn damped_search_rejects_zero_month_horizon() {
        let mut inputs = sample_inputs();
        inputs.horizon_years = 0.05;
        inputs.target_corpus = 1e6;
        let err = solve_monthly_contribution(&inputs, &SolverConfig::default())
            .expect_err("no months to contribute in");
        assert!(matches!(err, SolveError::DivisionDegenerate { .. }));
    }

    #[test]
    fn damped_search_stays_positive_under_steep_stepup() {
        let mut inputs = sample_inputs();
        inputs.initial_investment = 0.0;
        inputs.annual_rate_of_return = 15.0;
        inputs.horizon_years = 30.0;
        inputs.annual_stepup_percent = 20.0;
        inputs.target_corpus = simulate_corpus(0.0, 15.0 / 1200.0, 360, 5_000.0, 1.2);

        let estimate =
            solve_monthly_contribution(&inputs, &SolverConfig::default()).expect("solve");
        assert!(estimate.value.is_finite());
        assert_close(estimate.value, 5_000.0, 50.0);
    }

    #[test]
    fn damped_search_converges_when_principal_dominates() {
        let mut inputs = sample_inputs();
        inputs.initial_investment = 1_000_000.0;
        inputs.target_corpus = simulate_corpus(1_000_000.0, 0.01, 120, 50.0, 1.0);

        let estimate =
            solve_monthly_contribution(&inputs, &SolverConfig::default()).expect("solve");
        assert_close(estimate.value, 50.0, 0.5);
    }

    #[test]
    fn oversized_horizon_is_rejected_instead_of_wrapping() {
        let mut inputs = sample_inputs();
        inputs.horizon_years = 2e8;
        let err = project_corpus(&inputs, &SolverConfig::default())
            .expect_err("month count does not fit the exponent");
        assert!(matches!(err, SolveError::HorizonTooLong { .. }));
        assert_eq!(err.kind(), "horizonTooLong");
        assert!(matches!(
            inputs.total_months(),
            Err(SolveError::HorizonTooLong { limit, .. }) if limit == i32::MAX as u32
        ));
    }

    #[test]
    fn horizon_beyond_month_budget_is_rejected_by_every_procedure() {
        let mut inputs = sample_inputs();
        inputs.horizon_years = 1_001.0;
        inputs.target_corpus = 1e9;
        let config = SolverConfig::default();
        let expected = SolveError::HorizonTooLong {
            horizon_years: 1_001.0,
            limit: config.max_horizon_months,
        };

        assert_eq!(project_corpus(&inputs, &config), Err(expected.clone()));
        assert_eq!(solve_initial_investment(&inputs, &config), Err(expected.clone()));
        assert_eq!(solve_rate_of_return(&inputs, &config), Err(expected.clone()));
        assert_eq!(solve_monthly_contribution(&inputs, &config), Err(expected.clone()));
        assert_eq!(solve_stepup_percent(&inputs, &config), Err(expected));
    }

    #[test]
    fn annuity_factor_rejects_months_beyond_exponent_range() {
        let err = annuity_factor(0.01, u32::MAX, ZeroRatePolicy::Limit)
            .expect_err("exponent would wrap");
        assert!(matches!(err, SolveError::HorizonTooLong { .. }));
    }

    #[test]
    fn closed_form_contribution_inverts_projection() {
        let mut inputs = sample_inputs();
        inputs.target_corpus = project(&inputs);
        let config = SolverConfig {
            contribution_strategy: ContributionStrategy::ClosedForm,
            ..SolverConfig::default()
        };
        let estimate = solve_monthly_contribution(&inputs, &config).expect("solve");
        assert_close(estimate.value, 5_000.0, 1e-6);
    }

    #[test]
    fn closed_form_contribution_clamps_to_zero() {
        let mut inputs = sample_inputs();
        inputs.target_corpus = 1.0;
        let config = SolverConfig {
            contribution_strategy: ContributionStrategy::ClosedForm,
            ..SolverConfig::default()
        };
        let estimate = solve_monthly_contribution(&inputs, &config).expect("solve");
        assert_close(estimate.value, 0.0, 0.0);
    }

    #[test]
    fn newton_recovers_known_stepup() {
        let mut inputs = sample_inputs();
        inputs.target_corpus = stepup_future_value(5_000.0, 0.01, 10.0, 0.07);
        let estimate = solve_stepup_percent(&inputs, &SolverConfig::default()).expect("solve");
        assert_close(estimate.value / 100.0, 0.07, 1e-4);
    }

    #[test]
    fn newton_reports_flat_derivative_for_sub_year_horizon() {
        let mut inputs = sample_inputs();
        inputs.horizon_years = 0.5;
        inputs.target_corpus = 1_000.0;
        let err = solve_stepup_percent(&inputs, &SolverConfig::default())
            .expect_err("step-up has no effect");
        assert!(matches!(err, SolveError::NonConvergence { .. }));
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_projection_is_monotone(
            principal in 0u32..500_000,
            contribution in 0u32..20_000,
            rate_bp in 0u32..2_500,
            years in 0u32..35,
            bump_rate_bp in 1u32..500,
            bump_contribution in 1u32..1_000,
            bump_years in 1u32..5
        ) {
            let inputs = PlanInputs {
                initial_investment: principal as f64,
                annual_rate_of_return: rate_bp as f64 / 100.0,
                horizon_years: years as f64,
                monthly_contribution: contribution as f64,
                annual_stepup_percent: 0.0,
                target_corpus: 0.0,
            };
            let base = project(&inputs);

            let higher_rate = PlanInputs {
                annual_rate_of_return: inputs.annual_rate_of_return + bump_rate_bp as f64 / 100.0,
                ..inputs
            };
            let higher_contribution = PlanInputs {
                monthly_contribution: inputs.monthly_contribution + bump_contribution as f64,
                ..inputs
            };
            let longer = PlanInputs {
                horizon_years: inputs.horizon_years + bump_years as f64,
                ..inputs
            };

            let slack = base.abs() * 1e-12;
            prop_assert!(project(&higher_rate) + slack >= base);
            prop_assert!(project(&higher_contribution) + slack >= base);
            prop_assert!(project(&longer) + slack >= base);
        }
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_rate_search_is_bounded_and_round_trips(
            principal in 0u32..500_000,
            contribution in 0u32..20_000,
            rate_bp in 1u32..3_000,
            years in 1u32..31
        ) {
            prop_assume!(principal > 0 || contribution > 0);
            let mut inputs = PlanInputs {
                initial_investment: principal as f64,
                annual_rate_of_return: rate_bp as f64 / 100.0,
                horizon_years: years as f64,
                monthly_contribution: contribution as f64,
                annual_stepup_percent: 0.0,
                target_corpus: 0.0,
            };
            inputs.target_corpus = project(&inputs);

            let estimate = solve_rate_of_return(&inputs, &SolverConfig::default())
                .expect("rate search always terminates");
            prop_assert!(estimate.iterations <= 20);
            prop_assert!((0.0..=100.0).contains(&estimate.value));
            prop_assert!((estimate.value - inputs.annual_rate_of_return).abs() <= 1e-4);
        }

        #[test]
        fn prop_horizon_round_trips_within_one_month(
            principal in 0u32..500_000,
            contribution in 1u32..20_000,
            rate_bp in 0u32..3_000,
            years in 1u32..31
        ) {
            let mut inputs = PlanInputs {
                initial_investment: principal as f64,
                annual_rate_of_return: rate_bp as f64 / 100.0,
                horizon_years: years as f64,
                monthly_contribution: contribution as f64,
                annual_stepup_percent: 0.0,
                target_corpus: 0.0,
            };
            inputs.target_corpus = project(&inputs);

            let estimate = solve_horizon_years(&inputs, &SolverConfig::default())
                .expect("reachable target");
            prop_assert!((estimate.value - inputs.horizon_years).abs() <= 1.0 / 12.0 + 1e-9);
        }

        #[test]
        fn prop_newton_recovers_stepup(
            contribution in 100u32..20_000,
            rate_bp in 0u32..1_500,
            years in 2u32..31,
            stepup_bp in 0u32..2_000
        ) {
            let stepup = stepup_bp as f64 / 10_000.0;
            let mut inputs = PlanInputs {
                initial_investment: 0.0,
                annual_rate_of_return: rate_bp as f64 / 100.0,
                horizon_years: years as f64,
                monthly_contribution: contribution as f64,
                annual_stepup_percent: 0.0,
                target_corpus: 0.0,
            };
            inputs.target_corpus = stepup_future_value(
                inputs.monthly_contribution,
                inputs.monthly_rate(),
                inputs.horizon_years,
                stepup,
            );

            let estimate = solve_stepup_percent(&inputs, &SolverConfig::default())
                .expect("Newton converges on a convex model");
            prop_assert!((estimate.value / 100.0 - stepup).abs() <= 1e-4);
        }

        #[test]
        fn prop_damped_search_recovers_contribution_within_one_percent(
            contribution in 500u32..20_000,
            rate_bp in 100u32..3_000,
            years in 1u32..31,
            stepup_bp in 0u32..2_001,
            principal in prop_oneof![Just(0u32), 0u32..50_000, 500_000u32..2_000_000]
        ) {
            let stepup_percent = stepup_bp as f64 / 100.0;
            let principal = principal as f64;
            let mut inputs = PlanInputs {
                initial_investment: principal,
                annual_rate_of_return: rate_bp as f64 / 100.0,
                horizon_years: years as f64,
                monthly_contribution: 0.0,
                annual_stepup_percent: stepup_percent,
                target_corpus: 0.0,
            };
            inputs.target_corpus = simulate_corpus(
                principal,
                inputs.monthly_rate(),
                inputs.total_months().expect("months"),
                contribution as f64,
                inputs.stepup_factor(),
            );

            let estimate = solve_monthly_contribution(&inputs, &SolverConfig::default())
                .expect("damped search converges");
            let relative = (estimate.value - contribution as f64).abs() / contribution as f64;
            prop_assert!(relative <= 0.01);
        }
    }
}

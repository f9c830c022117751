use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::error::SolveError;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SolveTarget {
    TargetCorpus,
    InitialInvestment,
    AnnualRateOfReturn,
    HorizonYears,
    MonthlyContribution,
    AnnualStepupPercent,
}

impl SolveTarget {
    pub const ALL: [SolveTarget; 6] = [
        SolveTarget::TargetCorpus,
        SolveTarget::InitialInvestment,
        SolveTarget::AnnualRateOfReturn,
        SolveTarget::HorizonYears,
        SolveTarget::MonthlyContribution,
        SolveTarget::AnnualStepupPercent,
    ];

    /// Name used on the request side (`corpus`, `years`, `sip_amount`, ...).
    pub fn request_name(self) -> &'static str {
        match self {
            SolveTarget::TargetCorpus => "corpus",
            SolveTarget::InitialInvestment => "initial_investment",
            SolveTarget::AnnualRateOfReturn => "rate_of_return",
            SolveTarget::HorizonYears => "years",
            SolveTarget::MonthlyContribution => "sip_amount",
            SolveTarget::AnnualStepupPercent => "stepup_percentage",
        }
    }

    pub fn field_name(self) -> &'static str {
        match self {
            SolveTarget::TargetCorpus => "target_corpus",
            SolveTarget::InitialInvestment => "initial_investment",
            SolveTarget::AnnualRateOfReturn => "annual_rate_of_return",
            SolveTarget::HorizonYears => "horizon_years",
            SolveTarget::MonthlyContribution => "monthly_contribution",
            SolveTarget::AnnualStepupPercent => "annual_stepup_percent",
        }
    }
}

impl fmt::Display for SolveTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.request_name())
    }
}

impl FromStr for SolveTarget {
    type Err = SolveError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized: String = raw
            .trim()
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect();

        let target = match normalized.as_str() {
            "corpus" | "target_corpus" | "expected_corpus" => SolveTarget::TargetCorpus,
            "initial_investment" => SolveTarget::InitialInvestment,
            "rate_of_return" | "annual_rate_of_return" => SolveTarget::AnnualRateOfReturn,
            "years" | "horizon_years" | "number_of_years" => SolveTarget::HorizonYears,
            "sip_amount" | "monthly_contribution" => SolveTarget::MonthlyContribution,
            "stepup_percentage" | "step_up_percentage" | "annual_stepup_percent" => {
                SolveTarget::AnnualStepupPercent
            }
            _ => return Err(SolveError::UnsupportedTarget(raw.to_string())),
        };
        Ok(target)
    }
}

/// The six quantities of the plan. Percentages are whole percent (8.5 means 8.5%).
///
/// Any field may be absent; the solver only requires the five that are not
/// being solved for.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InvestmentScenario {
    pub initial_investment: Option<f64>,
    pub annual_rate_of_return: Option<f64>,
    pub horizon_years: Option<f64>,
    pub monthly_contribution: Option<f64>,
    pub annual_stepup_percent: Option<f64>,
    pub target_corpus: Option<f64>,
}

impl InvestmentScenario {
    pub fn get(&self, field: SolveTarget) -> Option<f64> {
        match field {
            SolveTarget::TargetCorpus => self.target_corpus,
            SolveTarget::InitialInvestment => self.initial_investment,
            SolveTarget::AnnualRateOfReturn => self.annual_rate_of_return,
            SolveTarget::HorizonYears => self.horizon_years,
            SolveTarget::MonthlyContribution => self.monthly_contribution,
            SolveTarget::AnnualStepupPercent => self.annual_stepup_percent,
        }
    }
}

/// Fully specified plan parameters, as consumed by the individual procedures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanInputs {
    pub initial_investment: f64,
    pub annual_rate_of_return: f64,
    pub horizon_years: f64,
    pub monthly_contribution: f64,
    pub annual_stepup_percent: f64,
    pub target_corpus: f64,
}

impl PlanInputs {
    pub fn monthly_rate(&self) -> f64 {
        self.annual_rate_of_return / 100.0 / 12.0
    }

    /// Whole months in the horizon. Horizons whose month count does not fit
    /// an `i32` exponent are rejected.
    pub fn total_months(&self) -> Result<u32, SolveError> {
        let months = (self.horizon_years * 12.0).floor().max(0.0);
        if !months.is_finite() || months > i32::MAX as f64 {
            return Err(SolveError::HorizonTooLong {
                horizon_years: self.horizon_years,
                limit: i32::MAX as u32,
            });
        }
        Ok(months as u32)
    }

    pub fn stepup_factor(&self) -> f64 {
        1.0 + self.annual_stepup_percent / 100.0
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum ZeroRatePolicy {
    /// Use the limit of the annuity factor as the rate goes to zero (`months`).
    #[default]
    Limit,
    /// Report the zero rate as `DivisionDegenerate`.
    Reject,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum ContributionStrategy {
    /// Damped multiplicative search over the step-up simulation.
    #[default]
    DampedSearch,
    /// Rearranged level-annuity formula; ignores step-up.
    ClosedForm,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverConfig {
    pub apply_stepup_in_forward_model: bool,
    pub zero_rate_policy: ZeroRatePolicy,
    pub contribution_strategy: ContributionStrategy,
    pub rate_tolerance: f64,
    pub max_horizon_months: u32,
    pub max_contribution_iterations: u32,
    pub contribution_damping: f64,
    pub contribution_tolerance: f64,
    pub newton_initial_guess: f64,
    pub newton_step: f64,
    pub newton_tolerance: f64,
    pub max_newton_iterations: u32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            apply_stepup_in_forward_model: false,
            zero_rate_policy: ZeroRatePolicy::Limit,
            contribution_strategy: ContributionStrategy::DampedSearch,
            rate_tolerance: 1e-6,
            max_horizon_months: 12_000,
            max_contribution_iterations: 1_000,
            contribution_damping: 0.5,
            contribution_tolerance: 0.01,
            newton_initial_guess: 0.05,
            newton_step: 1e-5,
            newton_tolerance: 1e-6,
            max_newton_iterations: 100,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SolveWarning {
    /// Bisection ended pinned to 0% or 100% without matching the target.
    RateAtSearchBound,
}

impl fmt::Display for SolveWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveWarning::RateAtSearchBound => {
                f.write_str("target is not reachable within the 0%-100% search range")
            }
        }
    }
}

/// Raw output of one procedure, before rounding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub value: f64,
    pub iterations: u32,
    pub warning: Option<SolveWarning>,
}

impl Estimate {
    pub fn exact(value: f64) -> Self {
        Self {
            value,
            iterations: 0,
            warning: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
    pub target: SolveTarget,
    pub value: f64,
    pub iterations: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<SolveWarning>,
}

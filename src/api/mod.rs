use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    ContributionStrategy, InvestmentScenario, Solution, SolveError, SolveTarget, SolverConfig,
    ZeroRatePolicy, solve_named,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliZeroRatePolicy {
    Limit,
    Reject,
}

impl From<CliZeroRatePolicy> for ZeroRatePolicy {
    fn from(value: CliZeroRatePolicy) -> Self {
        match value {
            CliZeroRatePolicy::Limit => ZeroRatePolicy::Limit,
            CliZeroRatePolicy::Reject => ZeroRatePolicy::Reject,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliContributionStrategy {
    DampedSearch,
    ClosedForm,
}

impl From<CliContributionStrategy> for ContributionStrategy {
    fn from(value: CliContributionStrategy) -> Self {
        match value {
            CliContributionStrategy::DampedSearch => ContributionStrategy::DampedSearch,
            CliContributionStrategy::ClosedForm => ContributionStrategy::ClosedForm,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiZeroRatePolicy {
    Limit,
    #[serde(alias = "error")]
    Reject,
}

impl From<ApiZeroRatePolicy> for CliZeroRatePolicy {
    fn from(value: ApiZeroRatePolicy) -> Self {
        match value {
            ApiZeroRatePolicy::Limit => CliZeroRatePolicy::Limit,
            ApiZeroRatePolicy::Reject => CliZeroRatePolicy::Reject,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiContributionStrategy {
    #[serde(alias = "dampedSearch", alias = "damped_search", alias = "iterative")]
    DampedSearch,
    #[serde(alias = "closedForm", alias = "closed_form")]
    ClosedForm,
}

impl From<ApiContributionStrategy> for CliContributionStrategy {
    fn from(value: ApiContributionStrategy) -> Self {
        match value {
            ApiContributionStrategy::DampedSearch => CliContributionStrategy::DampedSearch,
            ApiContributionStrategy::ClosedForm => CliContributionStrategy::ClosedForm,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SolvePayload {
    target: Option<String>,

    initial_investment: Option<f64>,
    rate_of_return: Option<f64>,
    years: Option<f64>,
    sip_amount: Option<f64>,
    stepup_percentage: Option<f64>,
    corpus: Option<f64>,

    apply_stepup_in_forward_model: Option<bool>,
    zero_rate_policy: Option<ApiZeroRatePolicy>,
    contribution_strategy: Option<ApiContributionStrategy>,
    max_horizon_months: Option<u32>,
    max_contribution_iterations: Option<u32>,
    max_newton_iterations: Option<u32>,
}

#[derive(Parser, Debug)]
#[command(
    name = "sipcalc",
    about = "SIP calculator: solve for corpus, initial investment, rate, years, SIP amount or step-up"
)]
pub struct Cli {
    #[arg(
        long,
        help = "Quantity to solve for: corpus, initial_investment, rate_of_return, years, sip_amount or stepup_percentage"
    )]
    target: String,
    #[arg(long, help = "Lump sum invested at the start")]
    initial_investment: Option<f64>,
    #[arg(long, help = "Expected annual return in percent, e.g. 12")]
    rate_of_return: Option<f64>,
    #[arg(long, help = "Investment horizon in years, may be fractional")]
    years: Option<f64>,
    #[arg(long, help = "Monthly contribution")]
    sip_amount: Option<f64>,
    #[arg(long, help = "Annual increase of the monthly contribution in percent")]
    stepup_percentage: Option<f64>,
    #[arg(long, help = "Target corpus at the end of the horizon")]
    corpus: Option<f64>,
    #[arg(
        long,
        default_value_t = false,
        help = "Apply the annual step-up when projecting the corpus and searching for the rate"
    )]
    apply_stepup_in_forward_model: bool,
    #[arg(
        long,
        value_enum,
        default_value_t = CliZeroRatePolicy::Limit,
        help = "Zero return: use the limiting annuity factor or report an error"
    )]
    zero_rate_policy: CliZeroRatePolicy,
    #[arg(long, value_enum, default_value_t = CliContributionStrategy::DampedSearch)]
    contribution_strategy: CliContributionStrategy,
    #[arg(long, default_value_t = 12_000, help = "Month budget for the years search")]
    max_horizon_months: u32,
    #[arg(long, default_value_t = 1_000)]
    max_contribution_iterations: u32,
    #[arg(long, default_value_t = 100)]
    max_newton_iterations: u32,
}

#[derive(Debug)]
struct ApiRequest {
    target: String,
    scenario: InvestmentScenario,
    config: SolverConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SolveResponse {
    target: &'static str,
    value: f64,
    iterations: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
}

impl From<Solution> for SolveResponse {
    fn from(solution: Solution) -> Self {
        Self {
            target: solution.target.request_name(),
            value: solution.value,
            iterations: solution.iterations,
            warning: solution.warning.map(|w| w.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TargetsResponse {
    targets: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    kind: &'static str,
}

const INVALID_INPUT: &str = "invalidInput";

const MAX_HORIZON_MONTHS_LIMIT: u32 = 60_000;
const MAX_CONTRIBUTION_ITERATIONS_LIMIT: u32 = 10_000;
const MAX_NEWTON_ITERATIONS_LIMIT: u32 = 1_000;

/// Which surface a validation message should name fields for.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum NameStyle {
    Flag,
    PayloadKey,
}

/// A request field as it is spelled on the command line and in the payload.
#[derive(Copy, Clone, Debug)]
struct FieldName {
    flag: &'static str,
    key: &'static str,
}

impl FieldName {
    const fn new(flag: &'static str, key: &'static str) -> Self {
        Self { flag, key }
    }

    fn label(self, style: NameStyle) -> &'static str {
        match style {
            NameStyle::Flag => self.flag,
            NameStyle::PayloadKey => self.key,
        }
    }
}

const INITIAL_INVESTMENT: FieldName = FieldName::new("--initial-investment", "initialInvestment");
const RATE_OF_RETURN: FieldName = FieldName::new("--rate-of-return", "rateOfReturn");
const YEARS: FieldName = FieldName::new("--years", "years");
const SIP_AMOUNT: FieldName = FieldName::new("--sip-amount", "sipAmount");
const STEPUP_PERCENTAGE: FieldName = FieldName::new("--stepup-percentage", "stepupPercentage");
const CORPUS: FieldName = FieldName::new("--corpus", "corpus");
const MAX_HORIZON_MONTHS: FieldName = FieldName::new("--max-horizon-months", "maxHorizonMonths");
const MAX_CONTRIBUTION_ITERATIONS: FieldName =
    FieldName::new("--max-contribution-iterations", "maxContributionIterations");
const MAX_NEWTON_ITERATIONS: FieldName =
    FieldName::new("--max-newton-iterations", "maxNewtonIterations");

fn build_request(cli: Cli, style: NameStyle) -> Result<ApiRequest, String> {
    let fields = [
        (INITIAL_INVESTMENT, cli.initial_investment),
        (RATE_OF_RETURN, cli.rate_of_return),
        (YEARS, cli.years),
        (SIP_AMOUNT, cli.sip_amount),
        (STEPUP_PERCENTAGE, cli.stepup_percentage),
        (CORPUS, cli.corpus),
    ];
    for (field, value) in fields {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                return Err(format!("{} must be a finite number >= 0", field.label(style)));
            }
        }
    }

    let budgets = [
        (MAX_HORIZON_MONTHS, cli.max_horizon_months, MAX_HORIZON_MONTHS_LIMIT),
        (
            MAX_CONTRIBUTION_ITERATIONS,
            cli.max_contribution_iterations,
            MAX_CONTRIBUTION_ITERATIONS_LIMIT,
        ),
        (MAX_NEWTON_ITERATIONS, cli.max_newton_iterations, MAX_NEWTON_ITERATIONS_LIMIT),
    ];
    for (field, value, limit) in budgets {
        if value == 0 || value > limit {
            return Err(format!("{} must be in 1..={limit}", field.label(style)));
        }
    }

    Ok(ApiRequest {
        target: cli.target,
        scenario: InvestmentScenario {
            initial_investment: cli.initial_investment,
            annual_rate_of_return: cli.rate_of_return,
            horizon_years: cli.years,
            monthly_contribution: cli.sip_amount,
            annual_stepup_percent: cli.stepup_percentage,
            target_corpus: cli.corpus,
        },
        config: SolverConfig {
            apply_stepup_in_forward_model: cli.apply_stepup_in_forward_model,
            zero_rate_policy: cli.zero_rate_policy.into(),
            contribution_strategy: cli.contribution_strategy.into(),
            max_horizon_months: cli.max_horizon_months,
            max_contribution_iterations: cli.max_contribution_iterations,
            max_newton_iterations: cli.max_newton_iterations,
            ..SolverConfig::default()
        },
    })
}

/// Parses the command line, solves once and renders the outcome as text.
pub fn run_cli() -> Result<String, String> {
    run_cli_with(Cli::parse())
}

fn run_cli_with(cli: Cli) -> Result<String, String> {
    let request = build_request(cli, NameStyle::Flag)?;
    let solution = solve_named(&request.target, &request.scenario, &request.config)
        .map_err(|e| e.to_string())?;
    Ok(render_solution(&solution))
}

fn render_solution(solution: &Solution) -> String {
    match solution.warning {
        Some(warning) => format!("{}: {:.2} ({warning})", solution.target, solution.value),
        None => format!("{}: {:.2}", solution.target, solution.value),
    }
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router();

    let listener = TcpListener::bind(addr).await?;
    info!("SIP calculator HTTP API listening on http://{addr}");
    info!("Local access: http://127.0.0.1:{port}/api/solve");

    axum::serve(listener, app).await
}

fn router() -> Router {
    Router::new()
        .route(
            "/api/solve",
            get(solve_get_handler).post(solve_post_handler),
        )
        .route("/api/targets", get(targets_handler))
        .fallback(not_found_handler)
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "notFound", "Not found")
}

async fn targets_handler() -> Response {
    json_response(
        StatusCode::OK,
        TargetsResponse {
            targets: SolveTarget::ALL.iter().map(|t| t.request_name()).collect(),
        },
    )
}

async fn solve_get_handler(Query(payload): Query<SolvePayload>) -> Response {
    solve_handler_impl(payload).await
}

async fn solve_post_handler(Json(payload): Json<SolvePayload>) -> Response {
    solve_handler_impl(payload).await
}

async fn solve_handler_impl(payload: SolvePayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, INVALID_INPUT, &msg),
    };

    let target = request.target.clone();
    let solved = tokio::task::spawn_blocking(move || {
        solve_named(&request.target, &request.scenario, &request.config)
    })
    .await;

    match solved {
        Ok(Ok(solution)) => {
            info!(solve_target = %solution.target, value = solution.value, "solved");
            json_response(StatusCode::OK, SolveResponse::from(solution))
        }
        Ok(Err(err)) => {
            warn!(solve_target = %target, kind = err.kind(), "solve failed: {err}");
            solve_error_response(&err)
        }
        Err(err) => {
            warn!(solve_target = %target, "solve worker failed: {err}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "solve worker failed",
            )
        }
    }
}

fn solve_error_response(err: &SolveError) -> Response {
    error_response(StatusCode::BAD_REQUEST, err.kind(), &err.to_string())
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, kind: &'static str, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
            kind,
        },
    )
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<SolvePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: SolvePayload) -> Result<ApiRequest, String> {
    let Some(target) = payload.target else {
        return Err("target is required".to_string());
    };

    let mut cli = default_cli_for_api(target);
    cli.initial_investment = payload.initial_investment;
    cli.rate_of_return = payload.rate_of_return;
    cli.years = payload.years;
    cli.sip_amount = payload.sip_amount;
    cli.stepup_percentage = payload.stepup_percentage;
    cli.corpus = payload.corpus;

    if let Some(v) = payload.apply_stepup_in_forward_model {
        cli.apply_stepup_in_forward_model = v;
    }
    if let Some(v) = payload.zero_rate_policy {
        cli.zero_rate_policy = v.into();
    }
    if let Some(v) = payload.contribution_strategy {
        cli.contribution_strategy = v.into();
    }
    if let Some(v) = payload.max_horizon_months {
        cli.max_horizon_months = v;
    }
    if let Some(v) = payload.max_contribution_iterations {
        cli.max_contribution_iterations = v;
    }
    if let Some(v) = payload.max_newton_iterations {
        cli.max_newton_iterations = v;
    }

    build_request(cli, NameStyle::PayloadKey)
}

fn default_cli_for_api(target: String) -> Cli {
    let defaults = SolverConfig::default();
    Cli {
        target,
        initial_investment: None,
        rate_of_return: None,
        years: None,
        sip_amount: None,
        stepup_percentage: None,
        corpus: None,
        apply_stepup_in_forward_model: defaults.apply_stepup_in_forward_model,
        zero_rate_policy: CliZeroRatePolicy::Limit,
        contribution_strategy: CliContributionStrategy::DampedSearch,
        max_horizon_months: defaults.max_horizon_months,
        max_contribution_iterations: defaults.max_contribution_iterations,
        max_newton_iterations: defaults.max_newton_iterations,
    }
}

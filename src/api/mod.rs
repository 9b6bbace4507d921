mod export;
mod state;

use axum::{
    Router,
    extract::{Json, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{ArgAction, Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    AnnualReturn, Metrics, ReturnTable, SimulationConfig, WithdrawalPolicy, WithdrawalTiming,
    YearRow, compute_metrics, simulate,
};

pub use export::{CSV_HEADER, metrics_lines, render_table, rows_to_csv};
pub use state::LatestRun;

const MAX_SIMULATED_YEARS: i32 = 1_000;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliWithdrawalTiming {
    Start,
    End,
}

impl From<CliWithdrawalTiming> for WithdrawalTiming {
    fn from(value: CliWithdrawalTiming) -> Self {
        match value {
            CliWithdrawalTiming::Start => WithdrawalTiming::Start,
            CliWithdrawalTiming::End => WithdrawalTiming::End,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliWithdrawalMode {
    None,
    Fixed,
    Percent,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Table,
    Csv,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiWithdrawalTiming {
    #[serde(alias = "START", alias = "begin", alias = "yearStart")]
    Start,
    #[serde(alias = "END", alias = "yearEnd")]
    End,
}

impl From<ApiWithdrawalTiming> for CliWithdrawalTiming {
    fn from(value: ApiWithdrawalTiming) -> Self {
        match value {
            ApiWithdrawalTiming::Start => CliWithdrawalTiming::Start,
            ApiWithdrawalTiming::End => CliWithdrawalTiming::End,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiWithdrawalMode {
    #[serde(alias = "NONE")]
    None,
    #[serde(alias = "FIXED")]
    Fixed,
    #[serde(alias = "PERCENT", alias = "pct")]
    Percent,
}

impl From<ApiWithdrawalMode> for CliWithdrawalMode {
    fn from(value: ApiWithdrawalMode) -> Self {
        match value {
            ApiWithdrawalMode::None => CliWithdrawalMode::None,
            ApiWithdrawalMode::Fixed => CliWithdrawalMode::Fixed,
            ApiWithdrawalMode::Percent => CliWithdrawalMode::Percent,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BacktestPayload {
    initial_capital: Option<f64>,
    volatile_allocation: Option<f64>,
    cash_yield: Option<f64>,
    rebalance: Option<bool>,
    start_year: Option<i32>,
    end_year: Option<i32>,
    withdrawal_timing: Option<ApiWithdrawalTiming>,
    withdrawal_mode: Option<ApiWithdrawalMode>,
    withdrawal_fixed: Option<f64>,
    withdrawal_percent: Option<f64>,
    returns_csv: Option<String>,
}

#[derive(Parser, Debug)]
#[command(
    name = "backtest",
    about = "Historical two-bucket backtest (volatile asset + cash) with withdrawals and rebalancing",
    after_help = "Run `backtest serve [port]` to start the HTTP API instead."
)]
struct Cli {
    #[arg(long, default_value_t = 1_000_000.0)]
    initial_capital: f64,
    #[arg(
        long,
        default_value_t = 60.0,
        help = "Share of initial capital placed in the volatile asset, in percent"
    )]
    volatile_allocation: f64,
    #[arg(long, default_value_t = 2.0, help = "Annual cash yield in percent")]
    cash_yield: f64,
    #[arg(
        long,
        default_value_t = true,
        action = ArgAction::Set,
        help = "Reset buckets to the target allocation at the end of every year"
    )]
    rebalance: bool,
    #[arg(long, default_value_t = 2000)]
    start_year: i32,
    #[arg(long, default_value_t = 2025)]
    end_year: i32,
    #[arg(
        long,
        value_enum,
        default_value_t = CliWithdrawalTiming::End,
        help = "Withdraw before (start) or after (end) the year's return is applied"
    )]
    withdrawal_timing: CliWithdrawalTiming,
    #[arg(long, value_enum, default_value_t = CliWithdrawalMode::None)]
    withdrawal_mode: CliWithdrawalMode,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Yearly withdrawal amount, used when --withdrawal-mode=fixed"
    )]
    withdrawal_fixed: f64,
    #[arg(
        long,
        default_value_t = 4.0,
        help = "Yearly withdrawal as percent of the portfolio, used when --withdrawal-mode=percent"
    )]
    withdrawal_percent: f64,
    #[arg(
        long,
        conflicts_with = "prices_file",
        help = "Two-column `year,percent` file replacing the built-in QQQ returns"
    )]
    returns_file: Option<PathBuf>,
    #[arg(
        long,
        help = "Daily price history (Date,...,Close) reduced to calendar-year returns"
    )]
    prices_file: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    #[arg(long, help = "Also write the yearly rows as CSV to this path")]
    csv_out: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub config: SimulationConfig,
    pub rows: Vec<YearRow>,
    pub metrics: Metrics,
}

impl RunReport {
    pub fn run(config: SimulationConfig) -> Self {
        let rows = simulate(&config);
        let metrics = compute_metrics(&rows, config.initial_capital);
        Self {
            config,
            rows,
            metrics,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReturnsResponse {
    source: &'static str,
    returns: Vec<AnnualReturn>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_config(cli: &Cli, returns: ReturnTable) -> Result<SimulationConfig, String> {
    if !cli.initial_capital.is_finite() || cli.initial_capital < 0.0 {
        return Err("--initial-capital must be >= 0".to_string());
    }

    if !(0.0..=100.0).contains(&cli.volatile_allocation) {
        return Err("--volatile-allocation must be between 0 and 100".to_string());
    }

    if !cli.cash_yield.is_finite() || cli.cash_yield <= -100.0 {
        return Err("--cash-yield must be > -100".to_string());
    }

    if cli.start_year > cli.end_year {
        return Err("--start-year must be <= --end-year".to_string());
    }

    if i64::from(cli.end_year) - i64::from(cli.start_year) >= i64::from(MAX_SIMULATED_YEARS) {
        return Err(format!(
            "--start-year and --end-year may span at most {MAX_SIMULATED_YEARS} years"
        ));
    }

    if !cli.withdrawal_fixed.is_finite() || cli.withdrawal_fixed < 0.0 {
        return Err("--withdrawal-fixed must be >= 0".to_string());
    }

    if !(0.0..=100.0).contains(&cli.withdrawal_percent) {
        return Err("--withdrawal-percent must be between 0 and 100".to_string());
    }

    let withdrawal = match cli.withdrawal_mode {
        CliWithdrawalMode::None => WithdrawalPolicy::None,
        CliWithdrawalMode::Fixed => WithdrawalPolicy::Fixed(cli.withdrawal_fixed),
        CliWithdrawalMode::Percent => WithdrawalPolicy::Percent(cli.withdrawal_percent / 100.0),
    };

    Ok(SimulationConfig {
        initial_capital: cli.initial_capital,
        volatile_allocation: cli.volatile_allocation / 100.0,
        cash_yield: cli.cash_yield / 100.0,
        rebalance: cli.rebalance,
        start_year: cli.start_year,
        end_year: cli.end_year,
        withdrawal_timing: cli.withdrawal_timing.into(),
        withdrawal,
        returns,
    })
}

fn load_returns(cli: &Cli) -> Result<ReturnTable, String> {
    if let Some(path) = &cli.returns_file {
        let text = fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        return ReturnTable::parse_two_column(&text)
            .map_err(|e| format!("--returns-file {}: {e}", path.display()));
    }
    if let Some(path) = &cli.prices_file {
        let text = fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        return ReturnTable::from_price_history(&text)
            .map_err(|e| format!("--prices-file {}: {e}", path.display()));
    }
    Ok(ReturnTable::builtin_qqq())
}

fn warn_on_uncovered_years(config: &SimulationConfig) {
    let missing = (config.start_year..=config.end_year)
        .filter(|year| !config.returns.contains(*year))
        .count();
    if missing > 0 {
        warn!(
            missing,
            start_year = config.start_year,
            end_year = config.end_year,
            "years without return data are simulated as flat"
        );
    }
}

/// Parses command-line flags, runs one backtest and prints it.
pub fn run_cli() -> Result<(), String> {
    let cli = Cli::parse();
    let returns = load_returns(&cli)?;
    let config = build_config(&cli, returns)?;
    warn_on_uncovered_years(&config);

    let report = RunReport::run(config);
    info!(
        years = report.metrics.years,
        final_value = report.metrics.final_value,
        "backtest finished"
    );

    if let Some(path) = &cli.csv_out {
        let csv = rows_to_csv(&report.rows).map_err(|e| format!("failed to encode csv: {e}"))?;
        fs::write(path, csv).map_err(|e| format!("failed to write {}: {e}", path.display()))?;
        info!(path = %path.display(), "wrote csv");
    }

    let rendered = match cli.output {
        OutputFormat::Table => render_table(&report.rows, &report.metrics),
        OutputFormat::Csv => {
            rows_to_csv(&report.rows).map_err(|e| format!("failed to encode csv: {e}"))?
        }
        OutputFormat::Json => serde_json::to_string_pretty(&report)
            .map_err(|e| format!("failed to serialize report: {e}"))?,
    };
    println!("{}", rendered.trim_end());
    Ok(())
}

pub fn router(latest: LatestRun) -> Router {
    Router::new()
        .route(
            "/api/backtest",
            get(backtest_get_handler).post(backtest_post_handler),
        )
        .route("/api/backtest.csv", get(latest_csv_handler))
        .route("/api/returns", get(returns_handler))
        .fallback(not_found_handler)
        .with_state(latest)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(LatestRun::default());

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "backtest HTTP API listening");
    info!("Local access: http://127.0.0.1:{port}/api/backtest");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn backtest_get_handler(
    State(latest): State<LatestRun>,
    Query(payload): Query<BacktestPayload>,
) -> Response {
    backtest_handler_impl(&latest, payload)
}

async fn backtest_post_handler(
    State(latest): State<LatestRun>,
    Json(payload): Json<BacktestPayload>,
) -> Response {
    backtest_handler_impl(&latest, payload)
}

fn backtest_handler_impl(latest: &LatestRun, payload: BacktestPayload) -> Response {
    let config = match config_from_payload(payload) {
        Ok(config) => config,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    warn_on_uncovered_years(&config);

    let report = latest.replace(RunReport::run(config));
    info!(
        years = report.metrics.years,
        final_value = report.metrics.final_value,
        "backtest served"
    );
    json_response(StatusCode::OK, &*report)
}

async fn latest_csv_handler(State(latest): State<LatestRun>) -> Response {
    let Some(report) = latest.current() else {
        return error_response(StatusCode::NOT_FOUND, "No backtest has been run yet");
    };
    let csv = match rows_to_csv(&report.rows) {
        Ok(csv) => csv,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("failed to encode csv: {e}"),
            );
        }
    };
    with_cache_control((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"backtest_results.csv\"",
            ),
        ],
        csv,
    ))
}

async fn returns_handler() -> Response {
    json_response(
        StatusCode::OK,
        ReturnsResponse {
            source: "QQQ",
            returns: ReturnTable::builtin_qqq().entries(),
        },
    )
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
    );
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    with_cache_control((status, Json(body)))
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

fn config_from_payload(payload: BacktestPayload) -> Result<SimulationConfig, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.initial_capital {
        cli.initial_capital = v;
    }
    if let Some(v) = payload.volatile_allocation {
        cli.volatile_allocation = v;
    }
    if let Some(v) = payload.cash_yield {
        cli.cash_yield = v;
    }
    if let Some(v) = payload.rebalance {
        cli.rebalance = v;
    }
    if let Some(v) = payload.start_year {
        cli.start_year = v;
    }
    if let Some(v) = payload.end_year {
        cli.end_year = v;
    }
    if let Some(v) = payload.withdrawal_timing {
        cli.withdrawal_timing = v.into();
    }
    if let Some(v) = payload.withdrawal_mode {
        cli.withdrawal_mode = v.into();
    }
    if let Some(v) = payload.withdrawal_fixed {
        cli.withdrawal_fixed = v;
    }
    if let Some(v) = payload.withdrawal_percent {
        cli.withdrawal_percent = v;
    }

    let returns = match payload.returns_csv.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => {
            ReturnTable::parse_two_column(text).map_err(|e| format!("returnsCsv: {e}"))?
        }
        _ => ReturnTable::builtin_qqq(),
    };

    build_config(&cli, returns).map_err(|msg| msg.replace("--", ""))
}

fn default_cli_for_api() -> Cli {
    Cli {
        initial_capital: 1_000_000.0,
        volatile_allocation: 60.0,
        cash_yield: 2.0,
        rebalance: true,
        start_year: 2000,
        end_year: 2025,
        withdrawal_timing: CliWithdrawalTiming::End,
        withdrawal_mode: CliWithdrawalMode::None,
        withdrawal_fixed: 0.0,
        withdrawal_percent: 4.0,
        returns_file: None,
        prices_file: None,
        output: OutputFormat::Table,
        csv_out: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn config_from_json(json: &str) -> Result<SimulationConfig, String> {
        let payload = serde_json::from_str::<BacktestPayload>(json)
            .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
        config_from_payload(payload)
    }

    fn sample_cli() -> Cli {
        default_cli_for_api()
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        String::from_utf8(bytes.to_vec()).expect("body should be utf-8")
    }

    #[test]
    fn cli_defaults_match_api_defaults() {
        let parsed = Cli::try_parse_from(["backtest"]).expect("defaults parse");
        let api = default_cli_for_api();
        assert_approx(parsed.initial_capital, api.initial_capital);
        assert_approx(parsed.volatile_allocation, api.volatile_allocation);
        assert_approx(parsed.cash_yield, api.cash_yield);
        assert_eq!(parsed.rebalance, api.rebalance);
        assert_eq!(parsed.start_year, api.start_year);
        assert_eq!(parsed.end_year, api.end_year);
        assert_eq!(parsed.withdrawal_timing, api.withdrawal_timing);
        assert_eq!(parsed.withdrawal_mode, api.withdrawal_mode);
        assert_approx(parsed.withdrawal_percent, api.withdrawal_percent);
        assert_eq!(parsed.output, api.output);
    }

    #[test]
    fn cli_parses_flags_and_converts_percentages() {
        let cli = Cli::try_parse_from([
            "backtest",
            "--initial-capital",
            "250000",
            "--volatile-allocation",
            "80",
            "--cash-yield",
            "3.5",
            "--rebalance",
            "false",
            "--withdrawal-timing",
            "start",
            "--withdrawal-mode",
            "percent",
            "--withdrawal-percent",
            "5",
            "--output",
            "csv",
        ])
        .expect("flags parse");
        let config = build_config(&cli, ReturnTable::builtin_qqq()).expect("valid config");

        assert_approx(config.initial_capital, 250_000.0);
        assert_approx(config.volatile_allocation, 0.8);
        assert_approx(config.cash_yield, 0.035);
        assert!(!config.rebalance);
        assert_eq!(config.withdrawal_timing, WithdrawalTiming::Start);
        assert_eq!(config.withdrawal, WithdrawalPolicy::Percent(0.05));
        assert_eq!(cli.output, OutputFormat::Csv);
    }

    #[test]
    fn cli_rejects_both_return_sources() {
        let err = Cli::try_parse_from([
            "backtest",
            "--returns-file",
            "a.csv",
            "--prices-file",
            "b.csv",
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn build_config_maps_fixed_mode_to_amount() {
        let mut cli = sample_cli();
        cli.withdrawal_mode = CliWithdrawalMode::Fixed;
        cli.withdrawal_fixed = 40_000.0;
        let config = build_config(&cli, ReturnTable::new()).expect("valid config");
        assert_eq!(config.withdrawal, WithdrawalPolicy::Fixed(40_000.0));
        assert_eq!(config.withdrawal_timing, WithdrawalTiming::End);
    }

    #[test]
    fn build_config_rejects_allocation_out_of_range() {
        let mut cli = sample_cli();
        cli.volatile_allocation = 120.0;
        let err = build_config(&cli, ReturnTable::new()).expect_err("must reject");
        assert!(err.contains("--volatile-allocation"));
    }

    #[test]
    fn build_config_rejects_reversed_year_range() {
        let mut cli = sample_cli();
        cli.start_year = 2010;
        cli.end_year = 2009;
        let err = build_config(&cli, ReturnTable::new()).expect_err("must reject");
        assert!(err.contains("--start-year"));
    }

    #[test]
    fn build_config_rejects_negative_amounts_and_huge_ranges() {
        let mut cli = sample_cli();
        cli.initial_capital = -1.0;
        assert!(
            build_config(&cli, ReturnTable::new())
                .expect_err("negative capital")
                .contains("--initial-capital")
        );

        let mut cli = sample_cli();
        cli.withdrawal_fixed = -5.0;
        assert!(
            build_config(&cli, ReturnTable::new())
                .expect_err("negative withdrawal")
                .contains("--withdrawal-fixed")
        );

        let mut cli = sample_cli();
        cli.withdrawal_percent = 101.0;
        assert!(
            build_config(&cli, ReturnTable::new())
                .expect_err("percent above 100")
                .contains("--withdrawal-percent")
        );

        let mut cli = sample_cli();
        cli.start_year = i32::MIN;
        cli.end_year = i32::MAX;
        assert!(
            build_config(&cli, ReturnTable::new())
                .expect_err("range too wide")
                .contains("at most")
        );
    }

    #[test]
    fn config_from_json_parses_web_keys() {
        let json = r#"{
          "initialCapital": 500000,
          "volatileAllocation": 70,
          "cashYield": 1.5,
          "rebalance": false,
          "startYear": 2005,
          "endYear": 2015,
          "withdrawalTiming": "start",
          "withdrawalMode": "fixed",
          "withdrawalFixed": 20000
        }"#;
        let config = config_from_json(json).expect("json should parse");

        assert_approx(config.initial_capital, 500_000.0);
        assert_approx(config.volatile_allocation, 0.7);
        assert_approx(config.cash_yield, 0.015);
        assert!(!config.rebalance);
        assert_eq!(config.start_year, 2005);
        assert_eq!(config.end_year, 2015);
        assert_eq!(config.withdrawal_timing, WithdrawalTiming::Start);
        assert_eq!(config.withdrawal, WithdrawalPolicy::Fixed(20_000.0));
        assert_eq!(config.returns, ReturnTable::builtin_qqq());
    }

    #[test]
    fn config_from_json_uses_uploaded_returns() {
        let json = r#"{ "returnsCsv": "2000,5\n2001,-5\n", "startYear": 2000, "endYear": 2001 }"#;
        let config = config_from_json(json).expect("json should parse");
        assert_eq!(config.returns.len(), 2);
        assert_approx(config.returns.rate_percent(2001), -5.0);
    }

    #[test]
    fn config_from_json_reports_bad_upload_and_strips_flag_prefix() {
        let err = config_from_json(r#"{ "returnsCsv": "2000,abc" }"#).expect_err("bad csv");
        assert!(err.starts_with("returnsCsv: line 1"));

        let err = config_from_json(r#"{ "volatileAllocation": 150 }"#).expect_err("bad alloc");
        assert_eq!(err, "volatile-allocation must be between 0 and 100");
    }

    #[test]
    fn run_report_serialization_contains_expected_fields() {
        let mut cli = sample_cli();
        cli.start_year = 2008;
        cli.end_year = 2009;
        let config = build_config(&cli, ReturnTable::builtin_qqq()).expect("valid config");
        let json = serde_json::to_string(&RunReport::run(config)).expect("serializes");
        assert!(json.contains("\"rows\""));
        assert!(json.contains("\"metrics\""));
        assert!(json.contains("\"volatileReturnPercent\""));
        assert!(json.contains("\"maxDrawdownPercent\""));
        assert!(json.contains("\"irrPercent\""));
        assert!(json.contains("\"withdrawalTiming\":\"end\""));
        assert!(json.contains("\"withdrawal\":{\"mode\":\"none\"}"));
    }

    #[tokio::test]
    async fn get_backtest_runs_from_query_string() {
        let app = router(LatestRun::default());
        let response = app
            .oneshot(
                Request::get(
                    "/api/backtest?initialCapital=10000&volatileAllocation=100&cashYield=0\
                     &rebalance=false&startYear=2013&endYear=2013",
                )
                .body(Body::empty())
                .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).map(|v| v.as_bytes()),
            Some(&b"no-store"[..])
        );
        let body: serde_json::Value =
            serde_json::from_str(&body_string(response).await).expect("json body");
        let rows = body["rows"].as_array().expect("rows array");
        assert_eq!(rows.len(), 1);
        assert_approx(rows[0]["total"].as_f64().expect("total"), 13_243.0);
        assert_approx(
            body["metrics"]["totalReturnPercent"].as_f64().expect("metric"),
            32.43,
        );
    }

    #[tokio::test]
    async fn post_backtest_stores_latest_run_for_csv_download() {
        let latest = LatestRun::default();
        let app = router(latest.clone());

        let missing = app
            .clone()
            .oneshot(
                Request::get("/api/backtest.csv")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let posted = app
            .clone()
            .oneshot(
                Request::post("/api/backtest")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"startYear":2000,"endYear":2002,"withdrawalMode":"percent"}"#,
                    ))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(posted.status(), StatusCode::OK);
        assert_eq!(latest.current().map(|r| r.rows.len()), Some(3));

        let csv = app
            .oneshot(
                Request::get("/api/backtest.csv")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(csv.status(), StatusCode::OK);
        let text = body_string(csv).await;
        assert!(text.starts_with(CSV_HEADER));
        assert_eq!(text.lines().count(), 4);
    }

    #[tokio::test]
    async fn invalid_payload_is_a_bad_request() {
        let app = router(LatestRun::default());
        let response = app
            .oneshot(
                Request::get("/api/backtest?startYear=2020&endYear=2010")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_string(response).await;
        assert!(body.contains("start-year must be <= end-year"));
    }

    #[tokio::test]
    async fn returns_endpoint_lists_builtin_table_and_unknown_paths_404() {
        let app = router(LatestRun::default());
        let response = app
            .clone()
            .oneshot(
                Request::get("/api/returns")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value =
            serde_json::from_str(&body_string(response).await).expect("json body");
        assert_eq!(body["source"], "QQQ");
        assert_eq!(body["returns"].as_array().map(Vec::len), Some(28));
        assert_eq!(body["returns"][0]["year"], 1999);

        let missing = app
            .oneshot(Request::get("/nope").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}

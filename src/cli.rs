//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{Backtest, BacktestConfig, BacktestResult};
use crate::domain::config_validation::{
    parse_date, parse_key, validate_backtest_config, validate_data_config,
};
use crate::domain::error::BacktestError;
use crate::domain::timeline;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "systrader", about = "Single-instrument signal backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest over a CSV of prices and raw signals
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Overrides `[data] input`
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Overrides `[report] output_dir`
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            input,
            output,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config, input.as_deref())
            } else {
                run_backtest(&config, input.as_deref(), output.as_deref())
            }
        }
        Command::Validate { config } => run_validate(&config),
    }
}

fn fail(err: &BacktestError) -> ExitCode {
    log::error!("{err}");
    eprintln!("error: {err}");
    ExitCode::from(err)
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        fail(&BacktestError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        })
    })
}

/// Converts the `[backtest]` section into a validated [`BacktestConfig`].
pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, BacktestError> {
    validate_backtest_config(adapter)?;
    let defaults = BacktestConfig::default();

    let holidays = match adapter.get_string("backtest", "holidays") {
        Some(list) => list
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| parse_date(s, "backtest", "holidays"))
            .collect::<Result<BTreeSet<_>, _>>()?,
        None => BTreeSet::new(),
    };

    let config = BacktestConfig {
        initial_equity: adapter.get_decimal("backtest", "initial_equity", defaults.initial_equity),
        commission: adapter.get_decimal("backtest", "commission", defaults.commission),
        slippage_bps: adapter.get_decimal("backtest", "slippage_bps", defaults.slippage_bps),
        sizing_mode: parse_key(adapter, "backtest", "sizing_mode")?.unwrap_or_default(),
        reversal_lag: parse_key(adapter, "backtest", "reversal_lag")?.unwrap_or_default(),
        allow_reversal: adapter.get_bool("backtest", "allow_reversal", defaults.allow_reversal),
        signal_priority: parse_key(adapter, "backtest", "signal_priority")?.unwrap_or_default(),
        execution_price: parse_key(adapter, "backtest", "execution_price")?.unwrap_or_default(),
        calendar: parse_key(adapter, "backtest", "calendar")?.unwrap_or_default(),
        holidays,
        warmup_bars: usize::try_from(adapter.get_int("backtest", "warmup_bars", 0))
            .unwrap_or(defaults.warmup_bars),
        start_date: parse_key(adapter, "backtest", "start_date")?,
        end_date: parse_key(adapter, "backtest", "end_date")?,
    };
    config.validate()?;
    Ok(config)
}

/// Builds the CSV data source from `[data]`, with `input` taking precedence
/// over the configured path.
pub fn build_data_adapter(
    adapter: &dyn ConfigPort,
    input: Option<&Path>,
) -> Result<CsvAdapter, BacktestError> {
    validate_data_config(adapter)?;
    let path = match input {
        Some(p) => p.to_path_buf(),
        None => adapter
            .get_string("data", "input")
            .map(PathBuf::from)
            .ok_or_else(|| BacktestError::ConfigMissing {
                section: "data".into(),
                key: "input".into(),
            })?,
    };

    let csv = CsvAdapter::new(path);
    Ok(match parse_key::<Decimal>(adapter, "data", "position_size")? {
        Some(size) => csv.with_position_size(size),
        None => csv,
    })
}

/// Fetches, runs and optionally reports one backtest through the ports.
pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    report_port: &dyn ReportPort,
    backtest: &Backtest,
    output_dir: Option<&Path>,
) -> Result<BacktestResult, BacktestError> {
    let config = backtest.config();
    let bars = data_port.fetch_bars(config.start_date, config.end_date)?;
    eprintln!("Running backtest over {} bars", bars.len());

    let result = backtest.run(bars)?;
    print_summary(&result);

    if let Some(dir) = output_dir {
        report_port.write(&result, dir)?;
        eprintln!("\nReports written to: {}", dir.display());
    }
    Ok(result)
}

fn resolve_output(adapter: &dyn ConfigPort, output: Option<&Path>) -> Option<PathBuf> {
    output
        .map(Path::to_path_buf)
        .or_else(|| adapter.get_string("report", "output_dir").map(PathBuf::from))
}

fn run_backtest(config_path: &Path, input: Option<&Path>, output: Option<&Path>) -> ExitCode {
    // Stage 1: Load config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    // Stage 2: Build and validate the backtest
    let backtest = match build_backtest_config(&adapter).and_then(Backtest::new) {
        Ok(b) => b,
        Err(e) => return fail(&e),
    };

    // Stage 3: Resolve data source and report destination
    let data_port = match build_data_adapter(&adapter, input) {
        Ok(d) => d,
        Err(e) => return fail(&e),
    };
    let output_dir = resolve_output(&adapter, output);

    // Stage 4: Run
    match run_backtest_pipeline(
        &data_port,
        &CsvReportAdapter,
        &backtest,
        output_dir.as_deref(),
    ) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => fail(&e),
    }
}

fn print_summary(result: &BacktestResult) {
    let closed = result.trades().iter().filter(|t| !t.is_open()).count();
    let wins = result.trades().iter().filter(|t| t.is_win()).count();

    eprintln!("\n=== Results ===");
    eprintln!("Total P&L:        {}", result.total_pnl().round_dp(2));
    eprintln!("Final Equity:     {}", result.final_equity().round_dp(2));
    eprintln!("Max Drawdown:     {}", result.max_drawdown().round_dp(2));
    eprintln!("Trades:           {} ({} closed, {} winning)", result.trades().len(), closed, wins);
    if let Some(open) = result.open_trade() {
        eprintln!(
            "Open Trade:       #{} {} {} since {} (unrealized {})",
            open.trade_number,
            open.direction,
            open.units,
            open.entry_date,
            open.pnl.round_dp(2)
        );
    }
    if !result.monthly().is_empty() {
        eprintln!("\n=== Monthly ===");
        for m in result.monthly() {
            eprintln!(
                "  {}-{:02}:  {} ({}%), {} closed",
                m.year,
                m.month,
                m.pnl.round_dp(2),
                m.return_pct.round_dp(2),
                m.trades_closed
            );
        }
    }
}

pub fn run_dry_run(config_path: &Path, input: Option<&Path>) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let config = match build_backtest_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    eprintln!("Config validated successfully");
    describe_config(&config);

    let data_port = match build_data_adapter(&adapter, input) {
        Ok(d) => d,
        Err(e) => return fail(&e),
    };
    let bars = match data_port.fetch_bars(config.start_date, config.end_date) {
        Ok(b) => b,
        Err(e) => return fail(&e),
    };
    if bars.len() < config.minimum_bars() {
        return fail(&BacktestError::InsufficientData {
            bars: bars.len(),
            minimum: config.minimum_bars(),
        });
    }
    if let Err(e) = timeline::check_continuity(&bars, config.calendar, &config.holidays) {
        return fail(&e);
    }

    if let (Some(first), Some(last)) = (bars.first(), bars.last()) {
        eprintln!("\nData: {} bars from {} to {}", bars.len(), first.date, last.date);
    }
    eprintln!("Dry run complete, no backtest executed");
    ExitCode::SUCCESS
}

fn describe_config(config: &BacktestConfig) {
    eprintln!("  initial_equity:  {}", config.initial_equity);
    eprintln!("  commission:      {}", config.commission);
    eprintln!("  slippage_bps:    {}", config.slippage_bps);
    eprintln!("  sizing_mode:     {}", config.sizing_mode);
    eprintln!("  reversal_lag:    {}", config.reversal_lag);
    eprintln!("  allow_reversal:  {}", config.allow_reversal);
    eprintln!("  signal_priority: {}", config.signal_priority);
    eprintln!("  execution_price: {}", config.execution_price);
    eprintln!("  calendar:        {}", config.calendar);
    eprintln!("  holidays:        {}", config.holidays.len());
    eprintln!("  warmup_bars:     {}", config.warmup_bars);
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let config = match build_backtest_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    if let Err(e) = validate_data_config(&adapter) {
        return fail(&e);
    }

    describe_config(&config);
    eprintln!("\nConfig is valid");
    ExitCode::SUCCESS
}

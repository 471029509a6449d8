#![allow(dead_code)]

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::cell::RefCell;
use std::path::{Path, PathBuf};

use systrader::domain::backtest::{BacktestConfig, BacktestResult};
use systrader::domain::error::BacktestError;
use systrader::domain::price_bar::PriceBar;
use systrader::domain::timeline::TradingCalendar;
use systrader::ports::data_port::DataPort;
use systrader::ports::report_port::ReportPort;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn parse_date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// A bar whose high and low bracket open and close by one unit.
pub fn make_bar(
    date_str: &str,
    open: Decimal,
    close: Decimal,
    entry: i8,
    exit: i8,
    stop: i8,
    size: Decimal,
) -> PriceBar {
    PriceBar {
        date: parse_date(date_str),
        open,
        high: open.max(close) + dec!(1),
        low: open.min(close) - dec!(1),
        close,
        raw_entry_signal: entry,
        raw_exit_signal: exit,
        raw_stop_signal: stop,
        position_size: size,
    }
}

/// Consecutive calendar days from `start`, flat prices, one bar per
/// `(entry, exit, stop)` triple.
pub fn bars_from_signals(start: &str, signals: &[(i8, i8, i8)], size: Decimal) -> Vec<PriceBar> {
    let first = parse_date(start);
    signals
        .iter()
        .enumerate()
        .map(|(i, &(entry, exit, stop))| PriceBar {
            date: first + Duration::days(i as i64),
            open: dec!(100),
            high: dec!(101),
            low: dec!(99),
            close: dec!(100),
            raw_entry_signal: entry,
            raw_exit_signal: exit,
            raw_stop_signal: stop,
            position_size: size,
        })
        .collect()
}

/// `count` weekday bars from `start` with a close that drifts up by one
/// per bar. Entry, exit and stop columns are left at zero.
pub fn generate_weekday_bars(start: &str, count: usize, base_price: Decimal) -> Vec<PriceBar> {
    let mut bars = Vec::with_capacity(count);
    let mut current = parse_date(start);
    let mut price = base_price;
    while bars.len() < count {
        if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            bars.push(PriceBar {
                date: current,
                open: price,
                high: price + dec!(2),
                low: price - dec!(1),
                close: price + dec!(1),
                raw_entry_signal: 0,
                raw_exit_signal: 0,
                raw_stop_signal: 0,
                position_size: dec!(10),
            });
            price += dec!(1);
        }
        current += Duration::days(1);
    }
    bars
}

pub fn daily_config() -> BacktestConfig {
    BacktestConfig {
        calendar: TradingCalendar::Daily,
        ..BacktestConfig::default()
    }
}

pub fn frictionless_config() -> BacktestConfig {
    BacktestConfig {
        slippage_bps: Decimal::ZERO,
        ..daily_config()
    }
}

pub struct MockDataPort {
    bars: Vec<PriceBar>,
    fail_with: Option<String>,
}

impl MockDataPort {
    pub fn new(bars: Vec<PriceBar>) -> Self {
        Self {
            bars,
            fail_with: None,
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            bars: Vec::new(),
            fail_with: Some(reason.to_string()),
        }
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>, BacktestError> {
        if let Some(reason) = &self.fail_with {
            return Err(BacktestError::DataSource {
                reason: reason.clone(),
            });
        }
        Ok(self
            .bars
            .iter()
            .filter(|b| start_date.is_none_or(|s| b.date >= s))
            .filter(|b| end_date.is_none_or(|e| b.date <= e))
            .cloned()
            .collect())
    }
}

/// Records every report request instead of touching the filesystem.
#[derive(Default)]
pub struct MockReportPort {
    pub writes: RefCell<Vec<(PathBuf, usize, Decimal)>>,
}

impl MockReportPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_count(&self) -> usize {
        self.writes.borrow().len()
    }
}

impl ReportPort for MockReportPort {
    fn write(&self, result: &BacktestResult, output_dir: &Path) -> Result<(), BacktestError> {
        self.writes.borrow_mut().push((
            output_dir.to_path_buf(),
            result.rows().len(),
            result.total_pnl(),
        ));
        Ok(())
    }
}

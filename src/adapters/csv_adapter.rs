//! CSV price bar adapter. Columns are addressed by header name.

use crate::domain::error::BacktestError;
use crate::domain::price_bar::PriceBar;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use csv::StringRecord;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::fs;
use std::path::PathBuf;

const DATE_FORMAT: &str = "%Y-%m-%d";

struct Columns {
    date: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    entry: usize,
    exit: usize,
    stop: usize,
    position_size: Option<usize>,
}

impl Columns {
    fn locate(headers: &StringRecord, size_fallback: bool) -> Result<Self, BacktestError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let require = |name: &str| find(name).ok_or_else(|| BacktestError::missing_column(name));

        let position_size = match find("position_size") {
            Some(index) => Some(index),
            None if size_fallback => None,
            None => return Err(BacktestError::missing_column("position_size")),
        };

        Ok(Columns {
            date: require("date")?,
            open: require("open")?,
            high: require("high")?,
            low: require("low")?,
            close: require("close")?,
            entry: require("raw_entry_signal")?,
            exit: require("raw_exit_signal")?,
            stop: require("raw_stop_signal")?,
            position_size,
        })
    }
}

pub struct CsvAdapter {
    path: PathBuf,
    default_position_size: Option<Decimal>,
}

impl CsvAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            default_position_size: None,
        }
    }

    /// Unit size used when the file has no `position_size` column.
    pub fn with_position_size(mut self, size: Decimal) -> Self {
        self.default_position_size = Some(size);
        self
    }

    fn parse_row(
        &self,
        record: &StringRecord,
        columns: &Columns,
        line: u64,
    ) -> Result<PriceBar, BacktestError> {
        let field = |index: usize, name: &str| {
            record
                .get(index)
                .map(str::trim)
                .ok_or_else(|| BacktestError::DataSource {
                    reason: format!("line {line}: missing {name} value"),
                })
        };
        let price = |index: usize, name: &str| -> Result<Decimal, BacktestError> {
            field(index, name)?
                .parse::<Decimal>()
                .map_err(|e| BacktestError::DataSource {
                    reason: format!("line {line}: invalid {name} value: {e}"),
                })
        };

        let date_str = field(columns.date, "date")?;
        let date = NaiveDate::parse_from_str(date_str, DATE_FORMAT).map_err(|e| {
            BacktestError::DataSource {
                reason: format!("line {line}: invalid date '{date_str}': {e}"),
            }
        })?;

        // Any number other than -1, 0 or 1 is a signal error, not a
        // malformed file.
        let signal = |index: usize, name: &str| -> Result<i8, BacktestError> {
            let raw = field(index, name)?;
            if raw.is_empty() {
                return Ok(0);
            }
            let value = raw.parse::<Decimal>().map_err(|e| BacktestError::DataSource {
                reason: format!("line {line}: invalid {name} value '{raw}': {e}"),
            })?;
            value
                .fract()
                .is_zero()
                .then(|| value.to_i8())
                .flatten()
                .filter(|v| (-1..=1).contains(v))
                .ok_or_else(|| BacktestError::InvalidSignal {
                    date,
                    column: name.to_string(),
                    value,
                })
        };

        let position_size = match (columns.position_size, self.default_position_size) {
            (Some(index), _) => price(index, "position_size")?,
            (None, Some(size)) => size,
            (None, None) => return Err(BacktestError::missing_column("position_size")),
        };

        Ok(PriceBar {
            date,
            open: price(columns.open, "open")?,
            high: price(columns.high, "high")?,
            low: price(columns.low, "low")?,
            close: price(columns.close, "close")?,
            raw_entry_signal: signal(columns.entry, "raw_entry_signal")?,
            raw_exit_signal: signal(columns.exit, "raw_exit_signal")?,
            raw_stop_signal: signal(columns.stop, "raw_stop_signal")?,
            position_size,
        })
    }
}

impl DataPort for CsvAdapter {
    fn fetch_bars(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>, BacktestError> {
        let content = fs::read_to_string(&self.path).map_err(|e| BacktestError::DataSource {
            reason: format!("failed to read {}: {}", self.path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| BacktestError::DataSource {
                reason: format!("CSV header error: {}", e),
            })?
            .clone();
        let columns = Columns::locate(&headers, self.default_position_size.is_some())?;

        let mut bars = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| BacktestError::DataSource {
                reason: format!("CSV parse error: {}", e),
            })?;
            let line = record.position().map_or(0, |p| p.line());
            let bar = self.parse_row(&record, &columns, line)?;

            if start_date.is_some_and(|start| bar.date < start)
                || end_date.is_some_and(|end| bar.date > end)
            {
                continue;
            }
            bars.push(bar);
        }

        bars.sort_by_key(|b| b.date);
        log::debug!("loaded {} bars from {}", bars.len(), self.path.display());
        Ok(bars)
    }
}

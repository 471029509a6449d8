//! Domain error types.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::timeline::TradingCalendar;

/// Top-level error type for systrader.
///
/// Every pipeline stage fails fast with one of these; nothing is retried and
/// no partial result is returned.
#[derive(Debug, thiserror::Error)]
pub enum BacktestError {
    #[error("invalid {column} value {value} on {date}: expected -1, 0 or 1")]
    InvalidSignal {
        date: NaiveDate,
        column: String,
        value: Decimal,
    },

    #[error("invalid parameter [{section}] {key}: {reason}")]
    InvalidParameter {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data gap: {reason}")]
    DataGap {
        date: Option<NaiveDate>,
        column: Option<String>,
        reason: String,
    },

    #[error("insufficient data: have {bars} bars, need {minimum}")]
    InsufficientData { bars: usize, minimum: usize },

    #[error("invalid bar on {date}: {reason}")]
    InvalidBar { date: NaiveDate, reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BacktestError {
    pub fn missing_date(date: NaiveDate, calendar: TradingCalendar) -> Self {
        BacktestError::DataGap {
            date: Some(date),
            column: None,
            reason: format!(
                "expected {calendar} trading date {date} is missing{}",
                calendar.gap_hint()
            ),
        }
    }

    pub fn missing_column(column: &str) -> Self {
        BacktestError::DataGap {
            date: None,
            column: Some(column.to_string()),
            reason: format!("required column '{column}' is missing"),
        }
    }

    pub fn invalid_parameter(section: &str, key: &str, reason: impl Into<String>) -> Self {
        BacktestError::InvalidParameter {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&BacktestError> for std::process::ExitCode {
    fn from(err: &BacktestError) -> Self {
        let code: u8 = match err {
            BacktestError::Io(_) => 1,
            BacktestError::ConfigParse { .. }
            | BacktestError::ConfigMissing { .. }
            | BacktestError::InvalidParameter { .. } => 2,
            BacktestError::DataSource { .. } => 3,
            BacktestError::InvalidSignal { .. } => 4,
            BacktestError::DataGap { .. }
            | BacktestError::InsufficientData { .. }
            | BacktestError::InvalidBar { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

//! Configuration validation.
//!
//! Validates every `[backtest]` and `[data]` key before a backtest runs.
//! Absent keys fall back to defaults; present keys must parse and be in range.

use crate::domain::error::BacktestError;
use crate::domain::position::{ReversalLag, SizingMode};
use crate::domain::price_bar::ExecutionPrice;
use crate::domain::signal::SignalPriority;
use crate::domain::timeline::TradingCalendar;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    validate_initial_equity(config)?;
    validate_commission(config)?;
    validate_slippage(config)?;
    validate_choices(config)?;
    validate_allow_reversal(config)?;
    validate_warmup(config)?;
    validate_dates(config)?;
    validate_holidays(config)?;
    Ok(())
}

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    if let Some(size) = parse_key::<Decimal>(config, "data", "position_size")? {
        if size < Decimal::ZERO {
            return Err(BacktestError::invalid_parameter(
                "data",
                "position_size",
                "position_size must be non-negative",
            ));
        }
    }
    Ok(())
}

/// Parses `[section] key` when present. A value that does not parse is an
/// `InvalidParameter` naming the key.
pub fn parse_key<T>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<T>, BacktestError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| BacktestError::invalid_parameter(section, key, format!("'{raw}': {e}"))),
    }
}

pub fn parse_date(value: &str, section: &str, key: &str) -> Result<NaiveDate, BacktestError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        BacktestError::invalid_parameter(
            section,
            key,
            format!("invalid date '{}', expected YYYY-MM-DD", value.trim()),
        )
    })
}

/// Accepts true/yes/1 and false/no/0, case-insensitively.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn parse_optional_date(
    config: &dyn ConfigPort,
    key: &str,
) -> Result<Option<NaiveDate>, BacktestError> {
    match config.get_string("backtest", key) {
        Some(s) if !s.trim().is_empty() => parse_date(&s, "backtest", key).map(Some),
        _ => Ok(None),
    }
}

fn validate_initial_equity(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    if let Some(value) = parse_key::<Decimal>(config, "backtest", "initial_equity")? {
        if value <= Decimal::ZERO {
            return Err(BacktestError::invalid_parameter(
                "backtest",
                "initial_equity",
                "initial_equity must be positive",
            ));
        }
    }
    Ok(())
}

fn validate_commission(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    if let Some(value) = parse_key::<Decimal>(config, "backtest", "commission")? {
        if value < Decimal::ZERO {
            return Err(BacktestError::invalid_parameter(
                "backtest",
                "commission",
                "commission must be non-negative",
            ));
        }
    }
    Ok(())
}

fn validate_slippage(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    if let Some(value) = parse_key::<Decimal>(config, "backtest", "slippage_bps")? {
        if value < Decimal::ZERO {
            return Err(BacktestError::invalid_parameter(
                "backtest",
                "slippage_bps",
                "slippage_bps must be non-negative",
            ));
        }
    }
    Ok(())
}

fn validate_choices(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    parse_key::<SizingMode>(config, "backtest", "sizing_mode")?;
    parse_key::<ReversalLag>(config, "backtest", "reversal_lag")?;
    parse_key::<SignalPriority>(config, "backtest", "signal_priority")?;
    parse_key::<ExecutionPrice>(config, "backtest", "execution_price")?;
    parse_key::<TradingCalendar>(config, "backtest", "calendar")?;
    Ok(())
}

fn validate_allow_reversal(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    match config.get_string("backtest", "allow_reversal") {
        Some(raw) if parse_bool(&raw).is_none() => Err(BacktestError::invalid_parameter(
            "backtest",
            "allow_reversal",
            format!("'{raw}' is not a boolean"),
        )),
        _ => Ok(()),
    }
}

fn validate_warmup(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    parse_key::<usize>(config, "backtest", "warmup_bars")?;
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    let start_date = parse_optional_date(config, "start_date")?;
    let end_date = parse_optional_date(config, "end_date")?;

    if let (Some(start), Some(end)) = (start_date, end_date) {
        if start >= end {
            return Err(BacktestError::invalid_parameter(
                "backtest",
                "start_date",
                "start_date must be before end_date",
            ));
        }
    }
    Ok(())
}

fn validate_holidays(config: &dyn ConfigPort) -> Result<(), BacktestError> {
    if let Some(list) = config.get_string("backtest", "holidays") {
        for item in list.split(',').filter(|s| !s.trim().is_empty()) {
            parse_date(item, "backtest", "holidays")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    fn assert_invalid(content: &str, expected_key: &str) {
        let config = make_config(content);
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(
            matches!(err, BacktestError::InvalidParameter { ref key, .. } if key == expected_key),
            "expected invalid {expected_key}, got {err}"
        );
    }

    #[test]
    fn valid_backtest_config_passes() {
        let config = make_config(
            r#"
[backtest]
initial_equity = 100000
commission = 1.0
slippage_bps = 10
sizing_mode = equity_proportional
reversal_lag = same_day
allow_reversal = no
signal_priority = exit_first
execution_price = close
calendar = daily
holidays = 2024-01-01, 2024-12-25
warmup_bars = 20
start_date = 2020-01-01
end_date = 2024-12-31
"#,
        );
        assert!(validate_backtest_config(&config).is_ok());
    }

    #[test]
    fn empty_section_uses_defaults() {
        let config = make_config("[backtest]\n");
        assert!(validate_backtest_config(&config).is_ok());
        assert!(validate_data_config(&config).is_ok());
    }

    #[test]
    fn initial_equity_must_be_positive() {
        assert_invalid("[backtest]\ninitial_equity = 0\n", "initial_equity");
        assert_invalid("[backtest]\ninitial_equity = -100\n", "initial_equity");
    }

    #[test]
    fn initial_equity_must_be_numeric() {
        assert_invalid("[backtest]\ninitial_equity = plenty\n", "initial_equity");
    }

    #[test]
    fn commission_negative_fails() {
        assert_invalid("[backtest]\ncommission = -5\n", "commission");
    }

    #[test]
    fn slippage_negative_fails() {
        assert_invalid("[backtest]\nslippage_bps = -0.5\n", "slippage_bps");
    }

    #[test]
    fn unknown_sizing_mode_fails() {
        assert_invalid("[backtest]\nsizing_mode = martingale\n", "sizing_mode");
    }

    #[test]
    fn unknown_reversal_lag_fails() {
        assert_invalid("[backtest]\nreversal_lag = later\n", "reversal_lag");
    }

    #[test]
    fn unknown_signal_priority_fails() {
        assert_invalid("[backtest]\nsignal_priority = entry_first\n", "signal_priority");
    }

    #[test]
    fn unknown_execution_price_fails() {
        assert_invalid("[backtest]\nexecution_price = vwap\n", "execution_price");
    }

    #[test]
    fn unknown_calendar_fails() {
        assert_invalid("[backtest]\ncalendar = lunar\n", "calendar");
    }

    #[test]
    fn allow_reversal_must_be_boolean() {
        assert_invalid("[backtest]\nallow_reversal = maybe\n", "allow_reversal");
    }

    #[test]
    fn warmup_bars_negative_fails() {
        assert_invalid("[backtest]\nwarmup_bars = -1\n", "warmup_bars");
    }

    #[test]
    fn invalid_start_date_format_fails() {
        assert_invalid("[backtest]\nstart_date = 2020/01/01\n", "start_date");
    }

    #[test]
    fn start_date_after_end_date_fails() {
        assert_invalid(
            "[backtest]\nstart_date = 2024-12-31\nend_date = 2020-01-01\n",
            "start_date",
        );
    }

    #[test]
    fn single_date_bound_is_allowed() {
        let config = make_config("[backtest]\nend_date = 2024-06-30\n");
        assert!(validate_backtest_config(&config).is_ok());
    }

    #[test]
    fn bad_holiday_fails() {
        assert_invalid("[backtest]\nholidays = 2024-01-01,christmas\n", "holidays");
    }

    #[test]
    fn negative_data_position_size_fails() {
        let config = make_config("[data]\nposition_size = -10\n");
        let err = validate_data_config(&config).unwrap_err();
        assert!(
            matches!(err, BacktestError::InvalidParameter { ref section, ref key, .. }
                if section == "data" && key == "position_size")
        );
    }

    #[test]
    fn parse_key_reports_raw_value() {
        let config = make_config("[backtest]\nwarmup_bars = ten\n");
        let err = parse_key::<usize>(&config, "backtest", "warmup_bars").unwrap_err();
        assert!(err.to_string().contains("'ten'"));
    }
}

//! Daily price bar carrying the raw signal columns.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

use super::error::BacktestError;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub raw_entry_signal: i8,
    pub raw_exit_signal: i8,
    pub raw_stop_signal: i8,
    pub position_size: Decimal,
}

/// Which quoted price a position change on a given day is filled at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionPrice {
    #[default]
    Open,
    Close,
}

impl FromStr for ExecutionPrice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(ExecutionPrice::Open),
            "close" => Ok(ExecutionPrice::Close),
            other => Err(format!("unknown execution price '{other}' (expected open or close)")),
        }
    }
}

impl fmt::Display for ExecutionPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionPrice::Open => write!(f, "open"),
            ExecutionPrice::Close => write!(f, "close"),
        }
    }
}

impl PriceBar {
    pub fn fill_price(&self, basis: ExecutionPrice) -> Decimal {
        match basis {
            ExecutionPrice::Open => self.open,
            ExecutionPrice::Close => self.close,
        }
    }

    /// Prices must be positive with `low <= open, close <= high`.
    pub fn validate(&self) -> Result<(), BacktestError> {
        let prices = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ];
        for (name, value) in prices {
            if value <= Decimal::ZERO {
                return Err(BacktestError::InvalidBar {
                    date: self.date,
                    reason: format!("{name} price {value} must be positive"),
                });
            }
        }
        if self.low > self.high {
            return Err(BacktestError::InvalidBar {
                date: self.date,
                reason: format!("low {} is above high {}", self.low, self.high),
            });
        }
        if self.open < self.low || self.open > self.high {
            return Err(BacktestError::InvalidBar {
                date: self.date,
                reason: format!("open {} outside [{}, {}]", self.open, self.low, self.high),
            });
        }
        if self.close < self.low || self.close > self.high {
            return Err(BacktestError::InvalidBar {
                date: self.date,
                reason: format!("close {} outside [{}, {}]", self.close, self.low, self.high),
            });
        }
        Ok(())
    }
}

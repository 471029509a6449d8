//! Trade numbering and the reconstructable trade aggregate.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::ops::Range;

use super::position::{PositionedSeries, position_sign};
use super::price_bar::PriceBar;
use super::signal::{CombinedSignal, Direction};

/// One maximal run of dates sharing a non-zero trade number.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub trade_number: u32,
    pub direction: Direction,
    pub units: Decimal,
    pub entry_date: NaiveDate,
    pub entry_price: Decimal,
    pub exit_date: Option<NaiveDate>,
    pub exit_price: Option<Decimal>,
    pub gross_pnl: Decimal,
    pub commission: Decimal,
    pub slippage: Decimal,
    pub pnl: Decimal,
}

impl Trade {
    pub fn is_open(&self) -> bool {
        self.exit_date.is_none()
    }

    pub fn is_win(&self) -> bool {
        self.pnl > Decimal::ZERO
    }

    pub fn is_loss(&self) -> bool {
        self.pnl < Decimal::ZERO
    }

    /// Calendar days from entry to exit, `None` while open.
    pub fn duration_days(&self) -> Option<i64> {
        self.exit_date
            .map(|exit| (exit - self.entry_date).num_days())
    }
}

/// Positioned series plus the trade number column. Only [`TradeNumberer`]
/// builds this.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberedSeries {
    positioned: PositionedSeries,
    trade_numbers: Vec<u32>,
}

impl NumberedSeries {
    pub fn bars(&self) -> &[PriceBar] {
        self.positioned.bars()
    }

    pub fn signals(&self) -> &[CombinedSignal] {
        self.positioned.signals()
    }

    pub fn positions(&self) -> &[Decimal] {
        self.positioned.positions()
    }

    pub fn trade_numbers(&self) -> &[u32] {
        &self.trade_numbers
    }

    pub fn trade_count(&self) -> u32 {
        self.trade_numbers.iter().copied().max().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.trade_numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trade_numbers.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TradeNumberer;

impl TradeNumberer {
    /// Stamps every date with its trade number. The counter advances when a
    /// position opens from flat and when a same-day reversal flips the sign.
    pub fn number(&self, positioned: PositionedSeries) -> NumberedSeries {
        let mut counter = 0u32;
        let mut previous_sign = 0i8;

        let trade_numbers = positioned
            .positions()
            .iter()
            .map(|&position| {
                let sign = position_sign(position);
                if sign != 0 && sign != previous_sign {
                    counter += 1;
                }
                previous_sign = sign;
                if sign == 0 { 0 } else { counter }
            })
            .collect::<Vec<_>>();

        log::debug!("numbered {counter} trades over {} dates", trade_numbers.len());

        NumberedSeries {
            positioned,
            trade_numbers,
        }
    }
}

/// `(trade_number, index range)` for every non-zero run, in order.
pub fn trade_runs(trade_numbers: &[u32]) -> Vec<(u32, Range<usize>)> {
    let mut runs: Vec<(u32, Range<usize>)> = Vec::new();
    for (index, &number) in trade_numbers.iter().enumerate() {
        if number == 0 {
            continue;
        }
        match runs.last_mut() {
            Some((last, range)) if *last == number && range.end == index => range.end += 1,
            _ => runs.push((number, index..index + 1)),
        }
    }
    runs
}

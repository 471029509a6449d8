//! Calendar-month summary of a profit series.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use super::profit::ProfitSeries;

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlySummary {
    pub year: i32,
    pub month: u32,
    pub pnl: Decimal,
    pub start_equity: Decimal,
    pub end_equity: Decimal,
    /// Month P&L as a percentage of start equity, four decimal places.
    pub return_pct: Decimal,
    pub trades_opened: usize,
    pub trades_closed: usize,
    pub wins: usize,
    pub losses: usize,
}

impl MonthlySummary {
    fn empty(year: i32, month: u32, start_equity: Decimal) -> Self {
        MonthlySummary {
            year,
            month,
            pnl: Decimal::ZERO,
            start_equity,
            end_equity: start_equity,
            return_pct: Decimal::ZERO,
            trades_opened: 0,
            trades_closed: 0,
            wins: 0,
            losses: 0,
        }
    }
}

fn month_key(date: NaiveDate) -> (i32, u32) {
    (date.year(), date.month())
}

/// Groups daily P&L by `(year, month)`, in calendar order. Only months that
/// appear in the series are reported. Closed trades count toward the month
/// they exit in.
pub fn aggregate(series: &ProfitSeries, initial_equity: Decimal) -> Vec<MonthlySummary> {
    let mut months: BTreeMap<(i32, u32), MonthlySummary> = BTreeMap::new();
    let mut equity = initial_equity;

    for day in series.daily() {
        let (year, month) = month_key(day.date);
        let summary = months
            .entry((year, month))
            .or_insert_with(|| MonthlySummary::empty(year, month, equity));
        summary.pnl += day.daily_pnl;
        summary.end_equity = day.equity;
        equity = day.equity;
    }

    for trade in series.trades() {
        if let Some(summary) = months.get_mut(&month_key(trade.entry_date)) {
            summary.trades_opened += 1;
        }
        let Some(exit_date) = trade.exit_date else {
            continue;
        };
        if let Some(summary) = months.get_mut(&month_key(exit_date)) {
            summary.trades_closed += 1;
            if trade.is_win() {
                summary.wins += 1;
            } else if trade.is_loss() {
                summary.losses += 1;
            }
        }
    }

    months
        .into_values()
        .map(|mut summary| {
            if !summary.start_equity.is_zero() {
                summary.return_pct =
                    (summary.pnl / summary.start_equity * Decimal::ONE_HUNDRED).round_dp(4);
            }
            summary
        })
        .collect()
}

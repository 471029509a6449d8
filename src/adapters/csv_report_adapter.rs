//! CSV report adapter implementing ReportPort.
//!
//! Writes `daily.csv` (every enriched row), `trades.csv` (the trade ledger)
//! and `monthly.csv` (the monthly summary) into the output directory.

use std::fs;
use std::path::Path;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::BacktestError;
use crate::ports::report_port::ReportPort;

pub const DAILY_FILE: &str = "daily.csv";
pub const TRADES_FILE: &str = "trades.csv";
pub const MONTHLY_FILE: &str = "monthly.csv";

pub struct CsvReportAdapter;

fn csv_error(e: csv::Error) -> BacktestError {
    BacktestError::Io(e.into())
}

fn or_blank<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

impl CsvReportAdapter {
    fn write_daily(result: &BacktestResult, path: &Path) -> Result<(), BacktestError> {
        let mut wtr = csv::Writer::from_path(path).map_err(csv_error)?;
        wtr.write_record([
            "date",
            "open",
            "high",
            "low",
            "close",
            "raw_entry_signal",
            "raw_exit_signal",
            "raw_stop_signal",
            "position_size",
            "combined_signal",
            "signal_source",
            "end_of_day_position",
            "trade_number",
            "gross_pnl",
            "commission",
            "slippage",
            "daily_pnl",
            "cumulative_pnl",
            "equity",
            "drawdown",
        ])
        .map_err(csv_error)?;

        for row in result.rows() {
            wtr.write_record([
                row.bar.date.to_string(),
                row.bar.open.to_string(),
                row.bar.high.to_string(),
                row.bar.low.to_string(),
                row.bar.close.to_string(),
                row.bar.raw_entry_signal.to_string(),
                row.bar.raw_exit_signal.to_string(),
                row.bar.raw_stop_signal.to_string(),
                row.bar.position_size.to_string(),
                row.combined_signal.to_string(),
                row.signal_source.to_string(),
                row.end_of_day_position.to_string(),
                row.trade_number.to_string(),
                row.gross_pnl.to_string(),
                row.commission.to_string(),
                row.slippage.to_string(),
                row.daily_pnl.to_string(),
                row.cumulative_pnl.to_string(),
                row.equity.to_string(),
                row.drawdown.to_string(),
            ])
            .map_err(csv_error)?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_trades(result: &BacktestResult, path: &Path) -> Result<(), BacktestError> {
        let mut wtr = csv::Writer::from_path(path).map_err(csv_error)?;
        wtr.write_record([
            "trade_number",
            "direction",
            "units",
            "entry_date",
            "entry_price",
            "exit_date",
            "exit_price",
            "gross_pnl",
            "commission",
            "slippage",
            "pnl",
            "status",
        ])
        .map_err(csv_error)?;

        for trade in result.trades() {
            wtr.write_record([
                trade.trade_number.to_string(),
                trade.direction.to_string(),
                trade.units.to_string(),
                trade.entry_date.to_string(),
                trade.entry_price.to_string(),
                or_blank(trade.exit_date),
                or_blank(trade.exit_price),
                trade.gross_pnl.to_string(),
                trade.commission.to_string(),
                trade.slippage.to_string(),
                trade.pnl.to_string(),
                if trade.is_open() { "open" } else { "closed" }.to_string(),
            ])
            .map_err(csv_error)?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_monthly(result: &BacktestResult, path: &Path) -> Result<(), BacktestError> {
        let mut wtr = csv::Writer::from_path(path).map_err(csv_error)?;
        wtr.write_record([
            "year",
            "month",
            "pnl",
            "start_equity",
            "end_equity",
            "return_pct",
            "trades_opened",
            "trades_closed",
            "wins",
            "losses",
        ])
        .map_err(csv_error)?;

        for m in result.monthly() {
            wtr.write_record([
                m.year.to_string(),
                m.month.to_string(),
                m.pnl.to_string(),
                m.start_equity.to_string(),
                m.end_equity.to_string(),
                m.return_pct.to_string(),
                m.trades_opened.to_string(),
                m.trades_closed.to_string(),
                m.wins.to_string(),
                m.losses.to_string(),
            ])
            .map_err(csv_error)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, result: &BacktestResult, output_dir: &Path) -> Result<(), BacktestError> {
        fs::create_dir_all(output_dir)?;
        Self::write_daily(result, &output_dir.join(DAILY_FILE))?;
        Self::write_trades(result, &output_dir.join(TRADES_FILE))?;
        Self::write_monthly(result, &output_dir.join(MONTHLY_FILE))?;
        log::info!("wrote reports to {}", output_dir.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backtest::{BacktestConfig, run_backtest};
    use crate::domain::price_bar::PriceBar;
    use crate::domain::timeline::TradingCalendar;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn result() -> BacktestResult {
        let bars = [(1, 0), (0, 0), (0, -1), (1, 0)]
            .iter()
            .enumerate()
            .map(|(i, &(entry, exit))| PriceBar {
                date: NaiveDate::from_ymd_opt(2024, 1, 29).unwrap()
                    + chrono::Duration::days(i as i64),
                open: dec!(10),
                high: dec!(12),
                low: dec!(9),
                close: dec!(11),
                raw_entry_signal: entry,
                raw_exit_signal: exit,
                raw_stop_signal: 0,
                position_size: dec!(5),
            })
            .collect();
        let config = BacktestConfig {
            calendar: TradingCalendar::Daily,
            ..BacktestConfig::default()
        };
        run_backtest(bars, &config).unwrap()
    }

    #[test]
    fn writes_three_reports() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("reports");
        CsvReportAdapter.write(&result(), &out).unwrap();

        let daily = fs::read_to_string(out.join(DAILY_FILE)).unwrap();
        assert_eq!(daily.lines().count(), 5);
        assert!(daily.starts_with("date,open,high,low,close"));
        assert!(daily.contains("2024-01-29"));

        let trades = fs::read_to_string(out.join(TRADES_FILE)).unwrap();
        let lines: Vec<_> = trades.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("1,long,5,2024-01-29,10,2024-01-31,10,"));
        assert!(lines[1].ends_with(",closed"));
        assert!(lines[2].starts_with("2,long,5,2024-02-01,10,,,"));
        assert!(lines[2].ends_with(",open"));

        let monthly = fs::read_to_string(out.join(MONTHLY_FILE)).unwrap();
        assert_eq!(monthly.lines().count(), 3);
        assert!(monthly.contains("\n2024,2,"));
    }
}

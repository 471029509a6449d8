//! Backtest configuration and the pipeline that drives the four stages.
//!
//! `SignalNormalizer -> PositionEngine -> TradeNumberer -> ProfitAccumulator`,
//! preceded by bar validation and timeline checks, followed by the monthly
//! summary.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeSet;

use super::error::BacktestError;
use super::monthly::{self, MonthlySummary};
use super::position::{PositionEngine, ReversalLag, SizingMode};
use super::price_bar::{ExecutionPrice, PriceBar};
use super::profit::{ProfitAccumulator, ProfitSeries};
use super::signal::{SignalNormalizer, SignalPriority, SignalSource};
use super::timeline::{self, TradingCalendar};
use super::trade::{Trade, TradeNumberer};

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_equity: Decimal,
    /// Currency charged per opening or closing event.
    pub commission: Decimal,
    pub slippage_bps: Decimal,
    pub sizing_mode: SizingMode,
    pub reversal_lag: ReversalLag,
    pub allow_reversal: bool,
    pub signal_priority: SignalPriority,
    pub execution_price: ExecutionPrice,
    pub calendar: TradingCalendar,
    pub holidays: BTreeSet<NaiveDate>,
    pub warmup_bars: usize,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_equity: Decimal::from(100_000),
            commission: Decimal::ZERO,
            slippage_bps: Decimal::from(5),
            sizing_mode: SizingMode::default(),
            reversal_lag: ReversalLag::default(),
            allow_reversal: true,
            signal_priority: SignalPriority::default(),
            execution_price: ExecutionPrice::default(),
            calendar: TradingCalendar::default(),
            holidays: BTreeSet::new(),
            warmup_bars: 0,
            start_date: None,
            end_date: None,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), BacktestError> {
        if self.initial_equity <= Decimal::ZERO {
            return Err(BacktestError::invalid_parameter(
                "backtest",
                "initial_equity",
                format!("must be positive, got {}", self.initial_equity),
            ));
        }
        if self.commission < Decimal::ZERO {
            return Err(BacktestError::invalid_parameter(
                "backtest",
                "commission",
                format!("must be non-negative, got {}", self.commission),
            ));
        }
        if self.slippage_bps < Decimal::ZERO {
            return Err(BacktestError::invalid_parameter(
                "backtest",
                "slippage_bps",
                format!("must be non-negative, got {}", self.slippage_bps),
            ));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start >= end {
                return Err(BacktestError::invalid_parameter(
                    "backtest",
                    "start_date",
                    format!("start_date {start} must be before end_date {end}"),
                ));
            }
        }
        Ok(())
    }

    /// Fewest bars a run accepts: the warm-up window plus one tradable date.
    pub fn minimum_bars(&self) -> usize {
        self.warmup_bars + 1
    }
}

/// One input row with every column the pipeline appended.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRow {
    pub bar: PriceBar,
    pub combined_signal: i8,
    pub signal_source: SignalSource,
    pub end_of_day_position: Decimal,
    pub trade_number: u32,
    pub gross_pnl: Decimal,
    pub commission: Decimal,
    pub slippage: Decimal,
    pub daily_pnl: Decimal,
    pub cumulative_pnl: Decimal,
    pub equity: Decimal,
    pub drawdown: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    series: ProfitSeries,
    monthly: Vec<MonthlySummary>,
}

impl BacktestResult {
    pub fn series(&self) -> &ProfitSeries {
        &self.series
    }

    pub fn rows(&self) -> Vec<EnrichedRow> {
        let s = &self.series;
        s.bars()
            .iter()
            .zip(s.signals())
            .zip(s.positions())
            .zip(s.trade_numbers())
            .zip(s.daily())
            .map(|((((bar, signal), position), number), day)| EnrichedRow {
                bar: bar.clone(),
                combined_signal: signal.value,
                signal_source: signal.source,
                end_of_day_position: *position,
                trade_number: *number,
                gross_pnl: day.gross_pnl,
                commission: day.commission,
                slippage: day.slippage,
                daily_pnl: day.daily_pnl,
                cumulative_pnl: day.cumulative_pnl,
                equity: day.equity,
                drawdown: day.drawdown,
            })
            .collect()
    }

    pub fn trades(&self) -> &[Trade] {
        self.series.trades()
    }

    pub fn open_trade(&self) -> Option<&Trade> {
        self.series.open_trade()
    }

    pub fn monthly(&self) -> &[MonthlySummary] {
        &self.monthly
    }

    pub fn total_pnl(&self) -> Decimal {
        self.series.total_pnl()
    }

    pub fn final_equity(&self) -> Decimal {
        self.series.final_equity()
    }

    pub fn max_drawdown(&self) -> Decimal {
        self.series.max_drawdown()
    }
}

/// A validated configuration ready to run against any number of series.
#[derive(Debug, Clone)]
pub struct Backtest {
    config: BacktestConfig,
}

impl Backtest {
    pub fn new(config: BacktestConfig) -> Result<Self, BacktestError> {
        config.validate()?;
        Ok(Backtest { config })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Runs the pipeline over the bars inside the configured date window.
    pub fn run(&self, mut bars: Vec<PriceBar>) -> Result<BacktestResult, BacktestError> {
        let config = &self.config;

        bars.retain(|b| {
            config.start_date.is_none_or(|s| b.date >= s)
                && config.end_date.is_none_or(|e| b.date <= e)
        });
        if bars.len() < config.minimum_bars() {
            return Err(BacktestError::InsufficientData {
                bars: bars.len(),
                minimum: config.minimum_bars(),
            });
        }
        for bar in &bars {
            bar.validate()?;
        }
        timeline::check_continuity(&bars, config.calendar, &config.holidays)?;

        let normalized = SignalNormalizer::new(config.signal_priority).normalize(bars)?;
        let positioned = PositionEngine::new(config).run(normalized)?;
        let numbered = TradeNumberer.number(positioned);
        let series = ProfitAccumulator::new(config).accumulate(numbered)?;
        let monthly = monthly::aggregate(&series, config.initial_equity);

        log::info!(
            "backtest complete: {} dates, {} trades, pnl {}, final equity {}",
            series.len(),
            series.trades().len(),
            series.total_pnl(),
            series.final_equity()
        );

        Ok(BacktestResult { series, monthly })
    }
}

/// Validates `config` and runs it once over `bars`.
pub fn run_backtest(
    bars: Vec<PriceBar>,
    config: &BacktestConfig,
) -> Result<BacktestResult, BacktestError> {
    Backtest::new(config.clone())?.run(bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bar(day: u32, entry: i8, exit: i8) -> PriceBar {
        PriceBar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: dec!(10),
            high: dec!(11),
            low: dec!(9),
            close: dec!(10),
            raw_entry_signal: entry,
            raw_exit_signal: exit,
            raw_stop_signal: 0,
            position_size: dec!(1),
        }
    }

    fn daily_config() -> BacktestConfig {
        BacktestConfig {
            calendar: TradingCalendar::Daily,
            ..BacktestConfig::default()
        }
    }

    #[test]
    fn defaults() {
        let c = BacktestConfig::default();
        assert_eq!(c.initial_equity, dec!(100000));
        assert_eq!(c.commission, dec!(0));
        assert_eq!(c.slippage_bps, dec!(5));
        assert_eq!(c.sizing_mode, SizingMode::Fixed);
        assert_eq!(c.reversal_lag, ReversalLag::NextDay);
        assert!(c.allow_reversal);
        assert_eq!(c.signal_priority, SignalPriority::StopFirst);
        assert_eq!(c.execution_price, ExecutionPrice::Open);
        assert_eq!(c.calendar, TradingCalendar::Weekdays);
        assert_eq!(c.minimum_bars(), 1);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn negative_commission_is_rejected() {
        let config = BacktestConfig {
            commission: dec!(-1),
            ..BacktestConfig::default()
        };
        let err = Backtest::new(config).unwrap_err();
        assert!(matches!(err, BacktestError::InvalidParameter { ref key, .. } if key == "commission"));
    }

    #[test]
    fn non_positive_equity_is_rejected() {
        let config = BacktestConfig {
            initial_equity: dec!(0),
            ..BacktestConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_date_range_is_rejected() {
        let config = BacktestConfig {
            start_date: NaiveDate::from_ymd_opt(2024, 2, 1),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..BacktestConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn too_few_bars_is_insufficient_data() {
        let config = BacktestConfig {
            warmup_bars: 3,
            ..daily_config()
        };
        let err = run_backtest(vec![bar(1, 0, 0), bar(2, 0, 0)], &config).unwrap_err();
        assert!(matches!(err, BacktestError::InsufficientData { bars: 2, minimum: 4 }));
    }

    #[test]
    fn start_date_drops_earlier_bars() {
        let config = BacktestConfig {
            start_date: NaiveDate::from_ymd_opt(2024, 1, 3),
            ..daily_config()
        };
        let bars = (1..=5).map(|d| bar(d, 0, 0)).collect();
        let result = run_backtest(bars, &config).unwrap();
        let rows = result.rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].bar.date, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
    }

    #[test]
    fn end_date_drops_later_bars() {
        let config = BacktestConfig {
            end_date: NaiveDate::from_ymd_opt(2024, 1, 2),
            ..daily_config()
        };
        let bars = vec![bar(1, 1, 0), bar(2, 0, 0), bar(3, 0, -1), bar(4, 0, 0)];
        let result = run_backtest(bars, &config).unwrap();
        let rows = result.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].bar.date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert!(result.open_trade().is_some());
    }

    #[test]
    fn window_outside_the_data_is_insufficient_data() {
        let config = BacktestConfig {
            start_date: NaiveDate::from_ymd_opt(2024, 2, 1),
            ..daily_config()
        };
        let err = run_backtest(vec![bar(1, 0, 0), bar(2, 0, 0)], &config).unwrap_err();
        assert!(matches!(err, BacktestError::InsufficientData { bars: 0, .. }));
    }

    #[test]
    fn oversized_position_fails_instead_of_panicking() {
        let mut bars = vec![bar(1, 1, 0), bar(2, 0, 0)];
        for b in &mut bars {
            b.position_size = dec!(50000000000000000000000000000);
        }
        let err = run_backtest(bars, &daily_config()).unwrap_err();
        assert!(matches!(err, BacktestError::InvalidParameter { ref key, .. } if key == "position_size"));
    }

    #[test]
    fn empty_input_is_insufficient_data() {
        let err = run_backtest(Vec::new(), &daily_config()).unwrap_err();
        assert!(matches!(err, BacktestError::InsufficientData { bars: 0, .. }));
    }

    #[test]
    fn invalid_bar_stops_the_run() {
        let mut bars = vec![bar(1, 0, 0), bar(2, 0, 0)];
        bars[1].close = dec!(20);
        let err = run_backtest(bars, &daily_config()).unwrap_err();
        assert!(matches!(err, BacktestError::InvalidBar { .. }));
    }

    #[test]
    fn rows_carry_every_column() {
        let result = run_backtest(
            vec![bar(1, 1, 0), bar(2, 0, 0), bar(3, 0, -1)],
            &daily_config(),
        )
        .unwrap();
        let rows = result.rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].combined_signal, 1);
        assert_eq!(rows[0].signal_source, SignalSource::Entry);
        assert_eq!(rows[0].end_of_day_position, dec!(1));
        assert_eq!(rows[0].trade_number, 1);
        assert_eq!(rows[2].combined_signal, -1);
        assert_eq!(rows[2].trade_number, 0);
        assert_eq!(rows[2].cumulative_pnl, result.total_pnl());
        assert_eq!(result.trades().len(), 1);
        assert!(result.open_trade().is_none());
        assert_eq!(result.monthly().len(), 1);
    }

    #[test]
    fn backtest_is_reusable() {
        let backtest = Backtest::new(daily_config()).unwrap();
        let bars = vec![bar(1, 1, 0), bar(2, 0, 0), bar(3, 0, -1)];
        let first = backtest.run(bars.clone()).unwrap();
        let second = backtest.run(bars).unwrap();
        assert_eq!(first, second);
    }
}

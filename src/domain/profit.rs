//! Profit accumulation: daily P&L with transaction costs, equity, drawdown
//! and the per-trade ledger.
//!
//! For date t with previous position `p0`, current position `p1`, previous
//! close `c0`, close `c1` and fill price `f`:
//!
//! - a carried position earns `p0 * (c1 - c0) + (p1 - p0) * (c1 - f)` and
//!   pays slippage on the resize delta only;
//! - a closing leg earns `p0 * (f - c0)` and pays one commission plus
//!   slippage on `|p0|`;
//! - an opening leg earns `p1 * (c1 - f)` and pays one commission plus
//!   slippage on `|p1|`.
//!
//! Every leg is booked against exactly one trade, so the sum of trade P&L
//! always equals cumulative P&L.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::backtest::BacktestConfig;
use super::error::BacktestError;
use super::position::position_sign;
use super::price_bar::PriceBar;
use super::signal::{CombinedSignal, Direction};
use super::trade::{NumberedSeries, Trade};

const BPS_DIVISOR: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Cost of filling `units` at `price` with a basis-point slippage penalty.
/// `None` when the product leaves the decimal range.
pub fn slippage_cost(units: Decimal, price: Decimal, slippage_bps: Decimal) -> Option<Decimal> {
    units
        .abs()
        .checked_mul(price)?
        .checked_mul(slippage_bps)?
        .checked_div(BPS_DIVISOR)
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct Leg {
    gross: Decimal,
    commission: Decimal,
    slippage: Decimal,
}

impl Leg {
    fn net(&self) -> Option<Decimal> {
        self.gross
            .checked_sub(self.commission)?
            .checked_sub(self.slippage)
    }

    fn plus(self, other: Leg) -> Option<Leg> {
        Some(Leg {
            gross: self.gross.checked_add(other.gross)?,
            commission: self.commission.checked_add(other.commission)?,
            slippage: self.slippage.checked_add(other.slippage)?,
        })
    }
}

fn overflow(date: NaiveDate) -> BacktestError {
    BacktestError::invalid_parameter(
        "data",
        "position_size",
        format!("position value on {date} exceeds the decimal range"),
    )
}

/// Profit columns for one date.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyPnl {
    pub date: NaiveDate,
    pub gross_pnl: Decimal,
    pub commission: Decimal,
    pub slippage: Decimal,
    pub daily_pnl: Decimal,
    pub cumulative_pnl: Decimal,
    pub equity: Decimal,
    pub drawdown: Decimal,
}

/// Numbered series plus profit columns and the trade ledger. Only
/// [`ProfitAccumulator`] builds this.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfitSeries {
    numbered: NumberedSeries,
    daily: Vec<DailyPnl>,
    trades: Vec<Trade>,
    initial_equity: Decimal,
}

impl ProfitSeries {
    pub fn bars(&self) -> &[PriceBar] {
        self.numbered.bars()
    }

    pub fn signals(&self) -> &[CombinedSignal] {
        self.numbered.signals()
    }

    pub fn positions(&self) -> &[Decimal] {
        self.numbered.positions()
    }

    pub fn trade_numbers(&self) -> &[u32] {
        self.numbered.trade_numbers()
    }

    pub fn daily(&self) -> &[DailyPnl] {
        &self.daily
    }

    /// Every trade in opening order; an open trade, if any, is last.
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn closed_trades(&self) -> impl Iterator<Item = &Trade> {
        self.trades.iter().filter(|t| !t.is_open())
    }

    pub fn open_trade(&self) -> Option<&Trade> {
        self.trades.last().filter(|t| t.is_open())
    }

    pub fn initial_equity(&self) -> Decimal {
        self.initial_equity
    }

    pub fn total_pnl(&self) -> Decimal {
        self.daily
            .last()
            .map_or(Decimal::ZERO, |d| d.cumulative_pnl)
    }

    pub fn final_equity(&self) -> Decimal {
        self.initial_equity + self.total_pnl()
    }

    /// Most negative drawdown over the series, zero if equity never fell.
    pub fn max_drawdown(&self) -> Decimal {
        self.daily
            .iter()
            .map(|d| d.drawdown)
            .min()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn len(&self) -> usize {
        self.daily.len()
    }

    pub fn is_empty(&self) -> bool {
        self.daily.is_empty()
    }
}

#[derive(Debug, Default)]
struct Ledger {
    closed: Vec<Trade>,
    open: Option<Trade>,
}

impl Ledger {
    fn book(&mut self, leg: Leg) -> Option<()> {
        match self.open.as_mut() {
            Some(trade) => {
                let booked = Leg {
                    gross: trade.gross_pnl,
                    commission: trade.commission,
                    slippage: trade.slippage,
                }
                .plus(leg)?;
                trade.gross_pnl = booked.gross;
                trade.commission = booked.commission;
                trade.slippage = booked.slippage;
                trade.pnl = booked.net()?;
            }
            None => log::warn!("dropping unattributed leg {leg:?}"),
        }
        Some(())
    }

    fn close(&mut self, date: NaiveDate, price: Decimal) {
        if let Some(mut trade) = self.open.take() {
            trade.exit_date = Some(date);
            trade.exit_price = Some(price);
            log::debug!(
                "closed trade {} ({}) on {date}: pnl {}",
                trade.trade_number,
                trade.direction,
                trade.pnl
            );
            self.closed.push(trade);
        }
    }

    fn into_trades(self) -> Vec<Trade> {
        let mut trades = self.closed;
        trades.extend(self.open);
        trades
    }
}

pub struct ProfitAccumulator<'a> {
    config: &'a BacktestConfig,
}

impl<'a> ProfitAccumulator<'a> {
    pub fn new(config: &'a BacktestConfig) -> Self {
        Self { config }
    }

    pub fn accumulate(&self, numbered: NumberedSeries) -> Result<ProfitSeries, BacktestError> {
        let initial_equity = self.config.initial_equity;
        let mut ledger = Ledger::default();
        let mut daily = Vec::with_capacity(numbered.len());
        let mut cumulative = Decimal::ZERO;
        let mut peak = initial_equity;
        let mut previous: Option<(Decimal, Decimal)> = None;

        for (index, bar) in numbered.bars().iter().enumerate() {
            let p1 = numbered.positions()[index];
            let (p0, c0) = previous.unwrap_or((Decimal::ZERO, bar.close));
            let fill = bar.fill_price(self.config.execution_price);
            let too_large = || overflow(bar.date);

            let mut day = Leg::default();
            let (s0, s1) = (position_sign(p0), position_sign(p1));

            if s0 != 0 && s0 == s1 {
                let carried = self.carried_leg(p0, p1, c0, bar.close, fill).ok_or_else(too_large)?;
                ledger.book(carried).ok_or_else(too_large)?;
                day = day.plus(carried).ok_or_else(too_large)?;
            } else {
                if s0 != 0 {
                    let closing = self.closing_leg(p0, c0, fill).ok_or_else(too_large)?;
                    ledger.book(closing).ok_or_else(too_large)?;
                    ledger.close(bar.date, fill);
                    day = day.plus(closing).ok_or_else(too_large)?;
                }
                if let Some(direction) = Direction::from_sign(s1) {
                    let opening = self.opening_leg(p1, bar.close, fill).ok_or_else(too_large)?;
                    ledger.open = Some(Trade {
                        trade_number: numbered.trade_numbers()[index],
                        direction,
                        units: p1.abs(),
                        entry_date: bar.date,
                        entry_price: fill,
                        exit_date: None,
                        exit_price: None,
                        gross_pnl: Decimal::ZERO,
                        commission: Decimal::ZERO,
                        slippage: Decimal::ZERO,
                        pnl: Decimal::ZERO,
                    });
                    ledger.book(opening).ok_or_else(too_large)?;
                    day = day.plus(opening).ok_or_else(too_large)?;
                }
            }

            let (daily_pnl, cumulative_next, equity) = day
                .net()
                .and_then(|net| {
                    let total = cumulative.checked_add(net)?;
                    Some((net, total, initial_equity.checked_add(total)?))
                })
                .ok_or_else(too_large)?;
            cumulative = cumulative_next;
            peak = peak.max(equity);

            daily.push(DailyPnl {
                date: bar.date,
                gross_pnl: day.gross,
                commission: day.commission,
                slippage: day.slippage,
                daily_pnl,
                cumulative_pnl: cumulative,
                equity,
                drawdown: equity - peak,
            });
            previous = Some((p1, bar.close));
        }

        let trades = ledger.into_trades();
        log::debug!(
            "accumulated {} dates, {} trades, cumulative pnl {cumulative}",
            daily.len(),
            trades.len()
        );

        Ok(ProfitSeries {
            numbered,
            daily,
            trades,
            initial_equity,
        })
    }

    fn carried_leg(
        &self,
        p0: Decimal,
        p1: Decimal,
        c0: Decimal,
        c1: Decimal,
        fill: Decimal,
    ) -> Option<Leg> {
        let resize = p1 - p0;
        Some(Leg {
            gross: p0
                .checked_mul(c1 - c0)?
                .checked_add(resize.checked_mul(c1 - fill)?)?,
            commission: Decimal::ZERO,
            slippage: slippage_cost(resize, fill, self.config.slippage_bps)?,
        })
    }

    fn closing_leg(&self, p0: Decimal, c0: Decimal, fill: Decimal) -> Option<Leg> {
        Some(Leg {
            gross: p0.checked_mul(fill - c0)?,
            commission: self.config.commission,
            slippage: slippage_cost(p0, fill, self.config.slippage_bps)?,
        })
    }

    fn opening_leg(&self, p1: Decimal, c1: Decimal, fill: Decimal) -> Option<Leg> {
        Some(Leg {
            gross: p1.checked_mul(c1 - fill)?,
            commission: self.config.commission,
            slippage: slippage_cost(p1, fill, self.config.slippage_bps)?,
        })
    }
}

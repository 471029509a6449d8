//! Position engine: turns combined signals into an end-of-day position
//! series through a FLAT / LONG / SHORT state machine.

use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

use super::backtest::BacktestConfig;
use super::error::BacktestError;
use super::price_bar::PriceBar;
use super::signal::{CombinedSignal, Direction, NormalizedSeries, SignalSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionState {
    Flat,
    Long,
    Short,
}

impl PositionState {
    pub fn of(position: Decimal) -> Self {
        if position.is_zero() {
            PositionState::Flat
        } else if position.is_sign_negative() {
            PositionState::Short
        } else {
            PositionState::Long
        }
    }

    pub fn direction(self) -> Option<Direction> {
        match self {
            PositionState::Flat => None,
            PositionState::Long => Some(Direction::Long),
            PositionState::Short => Some(Direction::Short),
        }
    }
}

/// -1, 0 or 1 for a signed position.
pub fn position_sign(position: Decimal) -> i8 {
    PositionState::of(position).direction().map_or(0, Direction::sign)
}

/// How the magnitude of a held position is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizingMode {
    /// The entry-date `position_size` is held for the life of the trade.
    #[default]
    Fixed,
    /// The per-date `position_size` (sized from equity upstream) is re-read
    /// every held date.
    EquityProportional,
}

impl FromStr for SizingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fixed" => Ok(SizingMode::Fixed),
            "equity_proportional" => Ok(SizingMode::EquityProportional),
            other => Err(format!(
                "unknown sizing mode '{other}' (expected fixed or equity_proportional)"
            )),
        }
    }
}

impl fmt::Display for SizingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizingMode::Fixed => write!(f, "fixed"),
            SizingMode::EquityProportional => write!(f, "equity_proportional"),
        }
    }
}

/// When the opposite leg of a reversal is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReversalLag {
    SameDay,
    #[default]
    NextDay,
}

impl FromStr for ReversalLag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "same_day" => Ok(ReversalLag::SameDay),
            "next_day" => Ok(ReversalLag::NextDay),
            other => Err(format!(
                "unknown reversal lag '{other}' (expected same_day or next_day)"
            )),
        }
    }
}

impl fmt::Display for ReversalLag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReversalLag::SameDay => write!(f, "same_day"),
            ReversalLag::NextDay => write!(f, "next_day"),
        }
    }
}

/// Normalized series plus the end-of-day position column. Only
/// [`PositionEngine`] builds this.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionedSeries {
    normalized: NormalizedSeries,
    positions: Vec<Decimal>,
}

impl PositionedSeries {
    pub fn bars(&self) -> &[PriceBar] {
        self.normalized.bars()
    }

    pub fn signals(&self) -> &[CombinedSignal] {
        self.normalized.signals()
    }

    pub fn positions(&self) -> &[Decimal] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct EngineState {
    position: Decimal,
    pending_entry: Option<Direction>,
}

pub struct PositionEngine<'a> {
    config: &'a BacktestConfig,
}

impl<'a> PositionEngine<'a> {
    pub fn new(config: &'a BacktestConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, normalized: NormalizedSeries) -> Result<PositionedSeries, BacktestError> {
        let mut state = EngineState::default();
        let mut positions = Vec::with_capacity(normalized.len());

        for (index, (bar, signal)) in normalized
            .bars()
            .iter()
            .zip(normalized.signals())
            .enumerate()
        {
            if bar.position_size < Decimal::ZERO {
                return Err(BacktestError::invalid_parameter(
                    "data",
                    "position_size",
                    format!("negative size {} on {}", bar.position_size, bar.date),
                ));
            }

            if index < self.config.warmup_bars {
                positions.push(Decimal::ZERO);
                continue;
            }

            state = self.step(state, bar, *signal);
            positions.push(state.position);
        }

        log::debug!(
            "position engine produced {} positions ({} non-flat)",
            positions.len(),
            positions.iter().filter(|p| !p.is_zero()).count()
        );

        Ok(PositionedSeries {
            normalized,
            positions,
        })
    }

    fn step(&self, state: EngineState, bar: &PriceBar, signal: CombinedSignal) -> EngineState {
        let signal = match state.pending_entry {
            Some(direction) if signal.is_hold() => CombinedSignal::entry(direction.sign()),
            _ => signal,
        };
        let current = PositionState::of(state.position).direction();

        match (current, signal.source, signal.direction()) {
            (_, SignalSource::Flatten, _) => flat(),

            (None, SignalSource::Entry, Some(direction)) => {
                open(direction, bar.position_size, bar)
            }
            (None, _, _) => flat(),

            (Some(held), SignalSource::Exit | SignalSource::Stop, Some(order))
                if order == held.opposite() =>
            {
                flat()
            }

            (Some(held), SignalSource::Entry, Some(direction))
                if direction == held.opposite() && self.config.allow_reversal =>
            {
                match self.config.reversal_lag {
                    ReversalLag::SameDay => {
                        open(direction, bar.position_size, bar)
                    }
                    ReversalLag::NextDay => EngineState {
                        position: Decimal::ZERO,
                        pending_entry: Some(direction),
                    },
                }
            }

            (Some(held), _, _) => self.hold(held, state.position, bar),
        }
    }

    fn hold(&self, held: Direction, position: Decimal, bar: &PriceBar) -> EngineState {
        let position = match self.config.sizing_mode {
            SizingMode::Fixed => position,
            SizingMode::EquityProportional => signed(held, bar.position_size),
        };
        EngineState {
            position,
            pending_entry: None,
        }
    }
}

fn flat() -> EngineState {
    EngineState::default()
}

fn open(direction: Direction, size: Decimal, bar: &PriceBar) -> EngineState {
    if size.is_zero() {
        log::debug!("ignoring {direction} entry on {} with zero position size", bar.date);
    }
    EngineState {
        position: signed(direction, size),
        pending_entry: None,
    }
}

fn signed(direction: Direction, size: Decimal) -> Decimal {
    if size.is_zero() {
        return Decimal::ZERO;
    }
    match direction {
        Direction::Long => size,
        Direction::Short => -size,
    }
}

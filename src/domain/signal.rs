//! Signal normalization: merges raw entry, exit and stop columns into one
//! combined signal per date.
//!
//! Raw values are -1, 0 or 1. An entry of +1 opens a long and -1 opens a
//! short. Exit and stop values name the order that closes a position: -1
//! sells (closes a long), +1 buys (closes a short).

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

use super::error::BacktestError;
use super::price_bar::PriceBar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn from_sign(value: i8) -> Option<Self> {
        match value {
            1 => Some(Direction::Long),
            -1 => Some(Direction::Short),
            _ => None,
        }
    }

    pub fn sign(self) -> i8 {
        match self {
            Direction::Long => 1,
            Direction::Short => -1,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

/// Which raw column produced the combined signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalSource {
    None,
    Entry,
    Exit,
    Stop,
    /// Stop and exit tied in opposite directions; close whatever is held.
    Flatten,
}

impl SignalSource {
    pub fn is_risk(self) -> bool {
        matches!(self, SignalSource::Exit | SignalSource::Stop | SignalSource::Flatten)
    }
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalSource::None => "none",
            SignalSource::Entry => "entry",
            SignalSource::Exit => "exit",
            SignalSource::Stop => "stop",
            SignalSource::Flatten => "flatten",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CombinedSignal {
    pub value: i8,
    pub source: SignalSource,
}

impl CombinedSignal {
    pub const HOLD: CombinedSignal = CombinedSignal {
        value: 0,
        source: SignalSource::None,
    };

    pub const FLATTEN: CombinedSignal = CombinedSignal {
        value: 0,
        source: SignalSource::Flatten,
    };

    pub fn entry(value: i8) -> Self {
        CombinedSignal {
            value,
            source: SignalSource::Entry,
        }
    }

    pub fn direction(&self) -> Option<Direction> {
        Direction::from_sign(self.value)
    }

    pub fn is_hold(&self) -> bool {
        self.source == SignalSource::None
    }
}

/// Ranking of the risk-management columns. Entries always rank last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignalPriority {
    #[default]
    StopFirst,
    ExitFirst,
    Equal,
}

impl FromStr for SignalPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stop_first" => Ok(SignalPriority::StopFirst),
            "exit_first" => Ok(SignalPriority::ExitFirst),
            "equal" => Ok(SignalPriority::Equal),
            other => Err(format!(
                "unknown signal priority '{other}' (expected stop_first, exit_first or equal)"
            )),
        }
    }
}

impl fmt::Display for SignalPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalPriority::StopFirst => write!(f, "stop_first"),
            SignalPriority::ExitFirst => write!(f, "exit_first"),
            SignalPriority::Equal => write!(f, "equal"),
        }
    }
}

/// Price bars paired with their combined signal. Only [`SignalNormalizer`]
/// builds this.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSeries {
    bars: Vec<PriceBar>,
    signals: Vec<CombinedSignal>,
}

impl NormalizedSeries {
    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn signals(&self) -> &[CombinedSignal] {
        &self.signals
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SignalNormalizer {
    priority: SignalPriority,
}

impl SignalNormalizer {
    pub fn new(priority: SignalPriority) -> Self {
        Self { priority }
    }

    pub fn combine(
        &self,
        date: NaiveDate,
        entry: i8,
        exit: i8,
        stop: i8,
    ) -> Result<CombinedSignal, BacktestError> {
        let entry = check_domain(date, "raw_entry_signal", entry)?;
        let exit = check_domain(date, "raw_exit_signal", exit)?;
        let stop = check_domain(date, "raw_stop_signal", stop)?;

        if let Some(risk) = self.risk_signal(exit, stop) {
            return Ok(risk);
        }
        if entry != 0 {
            return Ok(CombinedSignal::entry(entry));
        }
        Ok(CombinedSignal::HOLD)
    }

    fn risk_signal(&self, exit: i8, stop: i8) -> Option<CombinedSignal> {
        let stop_signal = (stop != 0).then_some(CombinedSignal {
            value: stop,
            source: SignalSource::Stop,
        });
        let exit_signal = (exit != 0).then_some(CombinedSignal {
            value: exit,
            source: SignalSource::Exit,
        });

        match self.priority {
            SignalPriority::StopFirst => stop_signal.or(exit_signal),
            SignalPriority::ExitFirst => exit_signal.or(stop_signal),
            SignalPriority::Equal => match (stop_signal, exit_signal) {
                (Some(s), Some(e)) if s.value != e.value => Some(CombinedSignal::FLATTEN),
                (s, e) => s.or(e),
            },
        }
    }

    pub fn normalize(&self, bars: Vec<PriceBar>) -> Result<NormalizedSeries, BacktestError> {
        let signals = bars
            .iter()
            .map(|bar| {
                self.combine(
                    bar.date,
                    bar.raw_entry_signal,
                    bar.raw_exit_signal,
                    bar.raw_stop_signal,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!(
            "normalized {} signals ({} non-hold)",
            signals.len(),
            signals.iter().filter(|s| !s.is_hold()).count()
        );

        Ok(NormalizedSeries { bars, signals })
    }
}

fn check_domain(date: NaiveDate, column: &str, value: i8) -> Result<i8, BacktestError> {
    match value {
        -1..=1 => Ok(value),
        _ => Err(BacktestError::InvalidSignal {
            date,
            column: column.to_string(),
            value: Decimal::from(value),
        }),
    }
}

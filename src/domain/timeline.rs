//! Date ordering and gap detection for the input series.

use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::error::BacktestError;
use super::price_bar::PriceBar;

/// Which calendar days are expected to carry a bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TradingCalendar {
    /// Monday to Friday. Exchange holidays are not known and must be listed
    /// in the holiday set, otherwise a closed weekday reads as a data gap.
    #[default]
    Weekdays,
    /// Every calendar day.
    Daily,
}

impl TradingCalendar {
    pub fn is_trading_day(self, date: NaiveDate, holidays: &BTreeSet<NaiveDate>) -> bool {
        if holidays.contains(&date) {
            return false;
        }
        match self {
            TradingCalendar::Weekdays => !matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
            TradingCalendar::Daily => true,
        }
    }

    pub(crate) fn gap_hint(self) -> &'static str {
        match self {
            TradingCalendar::Weekdays => {
                "; if the market was closed, list the date under [backtest] holidays"
            }
            TradingCalendar::Daily => "",
        }
    }
}

impl FromStr for TradingCalendar {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weekdays" => Ok(TradingCalendar::Weekdays),
            "daily" => Ok(TradingCalendar::Daily),
            other => Err(format!("unknown calendar '{other}' (expected weekdays or daily)")),
        }
    }
}

impl fmt::Display for TradingCalendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingCalendar::Weekdays => write!(f, "weekdays"),
            TradingCalendar::Daily => write!(f, "daily"),
        }
    }
}

/// Fails on the first out-of-order date or the first expected trading day
/// missing between two consecutive bars.
pub fn check_continuity(
    bars: &[PriceBar],
    calendar: TradingCalendar,
    holidays: &BTreeSet<NaiveDate>,
) -> Result<(), BacktestError> {
    for pair in bars.windows(2) {
        let (prev, next) = (pair[0].date, pair[1].date);
        if next <= prev {
            return Err(BacktestError::DataGap {
                date: Some(next),
                column: Some("date".into()),
                reason: format!("date {next} does not follow {prev}"),
            });
        }
        if let Some(missing) = prev
            .iter_days()
            .skip(1)
            .take_while(|d| *d < next)
            .find(|d| calendar.is_trading_day(*d, holidays))
        {
            return Err(BacktestError::missing_date(missing, calendar));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bar(date: NaiveDate) -> PriceBar {
        PriceBar {
            date,
            open: dec!(1),
            high: dec!(1),
            low: dec!(1),
            close: dec!(1),
            raw_entry_signal: 0,
            raw_exit_signal: 0,
            raw_stop_signal: 0,
            position_size: dec!(0),
        }
    }

    fn d(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, month, day).unwrap()
    }

    #[test]
    fn weekend_is_not_a_gap() {
        // Friday 2024-01-05 then Monday 2024-01-08
        let bars = vec![bar(d(1, 4)), bar(d(1, 5)), bar(d(1, 8))];
        assert!(check_continuity(&bars, TradingCalendar::Weekdays, &BTreeSet::new()).is_ok());
    }

    #[test]
    fn weekend_is_a_gap_on_daily_calendar() {
        let bars = vec![bar(d(1, 5)), bar(d(1, 8))];
        let err = check_continuity(&bars, TradingCalendar::Daily, &BTreeSet::new()).unwrap_err();
        assert!(matches!(err, BacktestError::DataGap { date: Some(date), .. } if date == d(1, 6)));
    }

    #[test]
    fn missing_weekday_fails_with_its_date() {
        let bars = vec![bar(d(1, 2)), bar(d(1, 3)), bar(d(1, 5))];
        let err = check_continuity(&bars, TradingCalendar::Weekdays, &BTreeSet::new()).unwrap_err();
        assert!(matches!(err, BacktestError::DataGap { date: Some(date), .. } if date == d(1, 4)));
    }

    #[test]
    fn weekday_gap_points_at_the_holiday_list() {
        // Martin Luther King Jr. Day, 2024-01-15
        let bars = vec![bar(d(1, 12)), bar(d(1, 16))];
        let err = check_continuity(&bars, TradingCalendar::Weekdays, &BTreeSet::new()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("2024-01-15"), "{message}");
        assert!(message.contains("weekdays"), "{message}");
        assert!(message.contains("[backtest] holidays"), "{message}");

        let holidays = BTreeSet::from([d(1, 15)]);
        assert!(check_continuity(&bars, TradingCalendar::Weekdays, &holidays).is_ok());
    }

    #[test]
    fn daily_gap_has_no_holiday_hint() {
        let bars = vec![bar(d(1, 1)), bar(d(1, 3))];
        let err = check_continuity(&bars, TradingCalendar::Daily, &BTreeSet::new()).unwrap_err();
        assert!(!err.to_string().contains("holidays"));
    }

    #[test]
    fn holiday_is_skipped() {
        let holidays = BTreeSet::from([d(1, 1)]);
        let bars = vec![bar(d(12, 29).with_year(2023).unwrap()), bar(d(1, 2))];
        assert!(check_continuity(&bars, TradingCalendar::Weekdays, &holidays).is_ok());
    }

    #[test]
    fn duplicate_date_fails() {
        let bars = vec![bar(d(1, 2)), bar(d(1, 2))];
        let err = check_continuity(&bars, TradingCalendar::Daily, &BTreeSet::new()).unwrap_err();
        assert!(matches!(err, BacktestError::DataGap { column: Some(ref c), .. } if c == "date"));
    }

    #[test]
    fn calendar_parses() {
        assert_eq!("Weekdays".parse::<TradingCalendar>(), Ok(TradingCalendar::Weekdays));
        assert_eq!("daily".parse::<TradingCalendar>(), Ok(TradingCalendar::Daily));
        assert!("lunar".parse::<TradingCalendar>().is_err());
    }
}

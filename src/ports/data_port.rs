//! Price bar source port trait.

use crate::domain::error::BacktestError;
use crate::domain::price_bar::PriceBar;
use chrono::NaiveDate;

pub trait DataPort {
    /// Bars in date order, restricted to `[start_date, end_date]` where given.
    fn fetch_bars(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>, BacktestError>;
}

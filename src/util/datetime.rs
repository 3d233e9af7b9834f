use anyhow::{anyhow, Result};
use chrono::{DateTime, Datelike, Local, NaiveDate, Weekday};

/// A trait representing the weekend concept.
pub trait Weekend {
    /// Returns `true` if the date is on a Saturday or Sunday, and `false` otherwise.
    fn is_weekend(&self) -> bool;
}

impl Weekend for DateTime<Local> {
    fn is_weekend(&self) -> bool {
        matches!(self.weekday(), Weekday::Sat | Weekday::Sun)
    }
}

impl Weekend for NaiveDate {
    fn is_weekend(&self) -> bool {
        matches!(self.weekday(), Weekday::Sat | Weekday::Sun)
    }
}

/// 解析 `%Y-%m-%d` 格式的日期
pub fn parse_ymd(date_str: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d")
        .map_err(|why| anyhow!("Failed to parse date string '{}' because {:?}", date_str, why))
}

/// 回傳 start 到 end(含)之間的工作日
pub fn weekdays_between(start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>> {
    if start > end {
        return Err(anyhow!("start date {} is after end date {}", start, end));
    }

    Ok(start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| !d.is_weekend())
        .collect())
}

use crate::error::{PipelineError, Result};
use chrono::{DateTime, Datelike, NaiveDate, Utc};

const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

pub fn first_day_of_month(year: i32, month: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
        PipelineError::Validation(format!("Invalid calendar month {}/{}", month, year))
    })
}

pub fn last_day_of_month(year: i32, month: u32) -> Result<NaiveDate> {
    let (next_year, next_month) = next_month_of(year, month);

    first_day_of_month(next_year, next_month)?
        .pred_opt()
        .ok_or_else(|| {
            PipelineError::Validation(format!("Invalid calendar month {}/{}", month, year))
        })
}

/// Inclusive `[first instant, last instant]` of a calendar month, at
/// millisecond resolution. An expense stamped `23:59:59.999` on the last day
/// falls inside; one millisecond later belongs to the next month.
pub fn month_window(year: i32, month: u32) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let start = first_day_of_month(year, month)?
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| PipelineError::Validation("Invalid month start".to_string()))?;

    let end = last_day_of_month(year, month)?
        .and_hms_milli_opt(23, 59, 59, 999)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| PipelineError::Validation("Invalid month end".to_string()))?;

    Ok((start, end))
}

pub fn next_month_of(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

pub fn prev_month_of(year: i32, month: u32) -> (i32, u32) {
    if month <= 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

/// Steps `offset` months back from `(year, month)`, rolling over year
/// boundaries as many times as needed.
pub fn months_back(year: i32, month: u32, offset: u32) -> (i32, u32) {
    let mut m = month as i64 - offset as i64;
    let mut y = year;
    while m <= 0 {
        m += 12;
        y -= 1;
    }
    (y, m as u32)
}

pub fn month_label(month: u32) -> &'static str {
    MONTH_LABELS
        .get((month as usize).wrapping_sub(1))
        .copied()
        .unwrap_or("???")
}

/// `spent / allocated * 100`, or 0 when nothing was allocated.
pub fn percentage_used(spent: f64, allocated: f64) -> f64 {
    if allocated > 0.0 {
        spent / allocated * 100.0
    } else {
        0.0
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Parses a period string in the format "YYYY-MM"
/// Returns (year, month)
pub fn parse_period_string(period: &str) -> Result<(i32, u32)> {
    let start_str = format!("{}-01", period.trim());
    let date = NaiveDate::parse_from_str(&start_str, "%Y-%m-%d").map_err(|_| {
        PipelineError::Validation(format!(
            "Invalid period format: {}. Expected YYYY-MM",
            period
        ))
    })?;

    Ok((date.year(), date.month()))
}

/// Source of "now". The trend walk and report timestamps read from this so
/// tests can pin the calendar.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    pub fn at_date(date: NaiveDate) -> Self {
        Self(date.and_time(chrono::NaiveTime::default()).and_utc())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

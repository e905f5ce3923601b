//! Dosage arithmetic: daily dose counts, course end dates, remaining tablets.
//!
//! Two layers are provided. The typed functions ([`end_date`], [`remaining`])
//! and the `try_*` string functions return [`DosageError`] on bad input. The
//! lenient string functions ([`compute_end_date`], [`remaining_tablets`]) never
//! fail: malformed input yields the start date unchanged or zero tablets, which
//! is what listings and exports display for damaged rows.

use chrono::{Days, NaiveDate};
use thiserror::Error;

use crate::models::{Frequency, DATE_FORMAT};

/// Dosage calculation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DosageError {
    #[error("Unrecognised frequency code: {0:?} (expected OD, BD, TDS or QID)")]
    UnknownFrequency(String),

    #[error("Invalid date {0:?} (expected YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("Quantity must be a positive integer, got {0}")]
    InvalidQuantity(i64),

    #[error("Computed date is out of range")]
    DateOutOfRange,
}

pub type DosageResult<T> = Result<T, DosageError>;

/// Today's date in local time.
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(value: &str) -> DosageResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| DosageError::InvalidDate(value.to_string()))
}

/// Format a date as `YYYY-MM-DD`.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Tablets per day for a frequency code. Unrecognised codes count as once daily.
pub fn daily_dose_count(code: &str) -> u32 {
    Frequency::from_code(code)
        .map(|f| f.daily_count())
        .unwrap_or(1)
}

/// Last day of a course: `start + ceil(quantity / daily) - 1` days.
pub fn end_date(start: NaiveDate, quantity: u32, frequency: Frequency) -> DosageResult<NaiveDate> {
    if quantity == 0 {
        return Err(DosageError::InvalidQuantity(0));
    }
    let days_needed = quantity.div_ceil(frequency.daily_count());
    start
        .checked_add_days(Days::new(u64::from(days_needed - 1)))
        .ok_or(DosageError::DateOutOfRange)
}

/// Tablets left on `today` for a course running `start..=end`.
pub fn remaining(
    start: NaiveDate,
    end: NaiveDate,
    quantity: u32,
    frequency: Frequency,
    today: NaiveDate,
) -> u32 {
    if today > end {
        return 0;
    }
    let elapsed_days = (today - start).num_days().max(0);
    let taken = elapsed_days.saturating_mul(i64::from(frequency.daily_count()));
    let left = (i64::from(quantity) - taken).max(0);
    // left <= quantity, so it fits
    left as u32
}

/// Strict string form of [`end_date`].
pub fn try_compute_end_date(start: &str, quantity: i64, code: &str) -> DosageResult<String> {
    let start = parse_date(start)?;
    let quantity = positive_quantity(quantity)?;
    let frequency: Frequency = code.parse()?;
    end_date(start, quantity, frequency).map(format_date)
}

/// Strict string form of [`remaining`].
pub fn try_remaining_tablets(
    start: &str,
    end: &str,
    quantity: i64,
    code: &str,
    today: NaiveDate,
) -> DosageResult<u32> {
    let start = parse_date(start)?;
    let end = parse_date(end)?;
    let quantity = u32::try_from(quantity).map_err(|_| DosageError::InvalidQuantity(quantity))?;
    let frequency: Frequency = code.parse()?;
    Ok(remaining(start, end, quantity, frequency, today))
}

/// End date for display and form auto-fill.
///
/// Returns `start` unchanged when it does not parse or the quantity is not
/// positive. Unknown frequency codes are treated as once daily.
pub fn compute_end_date(start: &str, quantity: i64, code: &str) -> String {
    let frequency = Frequency::from_code(code).unwrap_or(Frequency::Once);
    parse_date(start)
        .and_then(|s| Ok((s, positive_quantity(quantity)?)))
        .and_then(|(s, q)| end_date(s, q, frequency))
        .map(format_date)
        .unwrap_or_else(|_| start.to_string())
}

/// Remaining tablets for display. Malformed dates yield 0; unknown frequency
/// codes are treated as once daily.
pub fn remaining_tablets(start: &str, end: &str, quantity: i64, code: &str, today: NaiveDate) -> i64 {
    let (Ok(start), Ok(end)) = (parse_date(start), parse_date(end)) else {
        return 0;
    };
    if today > end {
        return 0;
    }
    let daily = i64::from(daily_dose_count(code));
    let taken = (today - start).num_days().max(0).saturating_mul(daily);
    quantity.saturating_sub(taken).max(0)
}

fn positive_quantity(quantity: i64) -> DosageResult<u32> {
    u32::try_from(quantity)
        .ok()
        .filter(|q| *q > 0)
        .ok_or(DosageError::InvalidQuantity(quantity))
}

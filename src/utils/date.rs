use crate::errors::{AppError, AppResult};
use chrono::{Datelike, NaiveDate, Utc};

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Strict `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| AppError::InvalidDate(s.to_string()))
}

/// Inclusive date bounds for a period expression.
/// Accepts `YYYY-MM-DD` (single day), `YYYY-MM` (whole month) or `YYYY`
/// (whole year).
pub fn period_bounds(p: &str) -> AppResult<(NaiveDate, NaiveDate)> {
    // YYYY-MM-DD
    if let Ok(d) = parse_date(p) {
        return Ok((d, d));
    }

    // YYYY-MM
    if let Ok(first) = NaiveDate::parse_from_str(&(p.to_string() + "-01"), "%Y-%m-%d") {
        return Ok((first, last_day_of_month(first.year(), first.month())));
    }

    // YYYY
    if let Ok(year) = p.parse::<i32>()
        && let Some(first) = NaiveDate::from_ymd_opt(year, 1, 1)
        && let Some(last) = NaiveDate::from_ymd_opt(year, 12, 31)
    {
        return Ok((first, last));
    }

    Err(AppError::InvalidDate(p.to_string()))
}

/// Bounds for a `start:end` range, where each side is itself a period
/// expression (the range spans from the start of the first to the end of
/// the second).
pub fn range_bounds(start: &str, end: &str) -> AppResult<(NaiveDate, NaiveDate)> {
    let (s, _) = period_bounds(start)?;
    let (_, e) = period_bounds(end)?;
    Ok((s, e))
}

/// Bounds for the current month.
pub fn current_month_bounds() -> (NaiveDate, NaiveDate) {
    let t = today();
    let first = NaiveDate::from_ymd_opt(t.year(), t.month(), 1).unwrap_or(t);
    (first, last_day_of_month(t.year(), t.month()))
}

fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let (ny, nm) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(ny, nm, 1)
        .and_then(|d| d.pred_opt())
        .unwrap_or_else(|| today())
}

/// All days between two bounds, inclusive. Used when a summary rebuild has
/// to walk a range day by day.
pub fn days_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut d = start;
    while d <= end {
        out.push(d);
        match d.succ_opt() {
            Some(next) => d = next,
            None => break,
        }
    }
    out
}

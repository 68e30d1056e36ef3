use chrono::{Duration, NaiveDate};

use crate::error::{ReportError, ReportResult};
use crate::ingest::parse_date_text;

/// Longest range a single report can cover.
pub const MAX_WINDOW_DAYS: usize = 7;

/// Inclusive range of report dates, validated to hold 1..=7 days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> ReportResult<Self> {
        if end < start {
            return Err(ReportError::invalid(format!(
                "end date {end} is before start date {start}"
            )));
        }
        let days = (end - start).num_days() + 1;
        if days > MAX_WINDOW_DAYS as i64 {
            return Err(ReportError::invalid(format!(
                "date range cannot exceed {MAX_WINDOW_DAYS} days (got {days})"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse the two request fields and validate the range.
    pub fn parse(start: &str, end: &str) -> ReportResult<Self> {
        let start_date = parse_date_text(start)
            .map_err(|err| ReportError::invalid(format!("start_date: {err}")))?;
        let end_date =
            parse_date_text(end).map_err(|err| ReportError::invalid(format!("end_date: {err}")))?;
        Self::new(start_date, end_date)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn len(&self) -> usize {
        ((self.end - self.start).num_days() + 1) as usize
    }

    /// Dates paired with their 1-based position in the window.
    pub fn days(&self) -> impl Iterator<Item = (usize, NaiveDate)> + '_ {
        (0..self.len()).map(move |offset| (offset + 1, self.start + Duration::days(offset as i64)))
    }
}

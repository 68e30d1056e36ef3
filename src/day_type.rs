use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::calendar::HolidayCalendar;

/// Calendar type of a report date. Drives sheet selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayType {
    Workday,
    Saturday,
    Sunday,
    Holiday,
}

impl DayType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DayType::Workday => "workday",
            DayType::Saturday => "saturday",
            DayType::Sunday => "sunday",
            DayType::Holiday => "holiday",
        }
    }
}

impl fmt::Display for DayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Divisor turning a day's total kilometers into a trips figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceFactor(u32);

impl ServiceFactor {
    pub const WORKDAY: ServiceFactor = ServiceFactor(209);
    pub const SATURDAY: ServiceFactor = ServiceFactor(173);
    pub const SUNDAY: ServiceFactor = ServiceFactor(106);
    pub const WEEKDAY_HOLIDAY: ServiceFactor = ServiceFactor(106);

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn divide(&self, amount: f64) -> f64 {
        amount / f64::from(self.0)
    }
}

impl fmt::Display for ServiceFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayClassification {
    pub day_type: DayType,
    pub factor: ServiceFactor,
}

/// Day type used to pick destination sheets.
///
/// A holiday wins over every weekday, weekends included.
pub fn sheet_day_type(date: NaiveDate, calendar: &HolidayCalendar) -> DayType {
    if calendar.is_holiday(date) {
        return DayType::Holiday;
    }
    match date.weekday() {
        Weekday::Sat => DayType::Saturday,
        Weekday::Sun => DayType::Sunday,
        _ => DayType::Workday,
    }
}

/// Service factor for a date.
///
/// Holidays only change the factor from Monday to Friday; Saturday keeps
/// 173 and Sunday 106 whatever the calendar says. Kept separate from
/// [`sheet_day_type`] on purpose, the two rules disagree on weekend holidays.
pub fn service_factor(date: NaiveDate, calendar: &HolidayCalendar) -> ServiceFactor {
    match date.weekday() {
        Weekday::Sat => ServiceFactor::SATURDAY,
        Weekday::Sun => ServiceFactor::SUNDAY,
        _ if calendar.is_holiday(date) => ServiceFactor::WEEKDAY_HOLIDAY,
        _ => ServiceFactor::WORKDAY,
    }
}

pub fn classify(date: NaiveDate, calendar: &HolidayCalendar) -> DayClassification {
    DayClassification {
        day_type: sheet_day_type(date, calendar),
        factor: service_factor(date, calendar),
    }
}

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::window::DateWindow;

/// Year the Emiliani law started moving most holidays to the next Monday.
const EMILIANI_FROM_YEAR: i32 = 1984;

/// Public holidays for Colombia, precomputed for a span of years.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolidayCalendar {
    holidays: HashSet<NaiveDate>,
}

impl HolidayCalendar {
    pub fn colombia(start_year: i32, end_year: i32) -> Self {
        let (start, end) = if start_year <= end_year {
            (start_year, end_year)
        } else {
            (end_year, start_year)
        };

        let mut calendar = Self {
            holidays: HashSet::new(),
        };
        for year in start..=end {
            calendar.add_colombian_holidays(year);
        }
        calendar
    }

    /// Calendar covering every year the window touches, plus extra dates.
    pub fn for_window(window: &DateWindow, extra: &[NaiveDate]) -> Self {
        let mut calendar = Self::colombia(window.start().year(), window.end().year());
        calendar.add_holidays(extra);
        calendar
    }

    pub fn custom<I>(holidays: I) -> Self
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        Self {
            holidays: holidays.into_iter().collect(),
        }
    }

    fn add_colombian_holidays(&mut self, year: i32) {
        let emiliani = year >= EMILIANI_FROM_YEAR;

        // Fixed dates
        for (month, day) in [(1, 1), (5, 1), (7, 20), (8, 7), (12, 8), (12, 25)] {
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                self.holidays.insert(date);
            }
        }

        // Epiphany, St Joseph, Sts Peter and Paul, Assumption, Columbus Day,
        // All Saints, Independence of Cartagena
        for (month, day) in [(1, 6), (3, 19), (6, 29), (8, 15), (10, 12), (11, 1), (11, 11)] {
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                let observed = if emiliani {
                    Self::next_monday(date)
                } else {
                    date
                };
                self.holidays.insert(observed);
            }
        }

        let Some(easter) = Self::easter_sunday(year) else {
            return;
        };
        // Maundy Thursday, Good Friday
        self.holidays.insert(easter - Duration::days(3));
        self.holidays.insert(easter - Duration::days(2));

        // Ascension, Corpus Christi, Sacred Heart
        for offset in [39, 60, 68] {
            let date = easter + Duration::days(offset);
            let observed = if emiliani {
                Self::next_monday(date)
            } else {
                date
            };
            self.holidays.insert(observed);
        }
    }

    /// The date itself when it is a Monday, otherwise the following Monday.
    fn next_monday(date: NaiveDate) -> NaiveDate {
        let mut current = date;
        while current.weekday() != Weekday::Mon {
            current = current + Duration::days(1);
        }
        current
    }

    /// Gregorian Easter Sunday (anonymous Gregorian algorithm).
    fn easter_sunday(year: i32) -> Option<NaiveDate> {
        let a = year % 19;
        let b = year / 100;
        let c = year % 100;
        let d = b / 4;
        let e = b % 4;
        let f = (b + 8) / 25;
        let g = (b - f + 1) / 3;
        let h = (19 * a + b - d - g + 15) % 30;
        let i = c / 4;
        let k = c % 4;
        let l = (32 + 2 * e + 2 * i - h - k) % 7;
        let m = (a + 11 * h + 22 * l) / 451;
        let month = (h + l - 7 * m + 114) / 31;
        let day = (h + l - 7 * m + 114) % 31 + 1;
        NaiveDate::from_ymd_opt(year, month as u32, day as u32)
    }

    /// Add a single holiday
    pub fn add_holiday(&mut self, date: NaiveDate) {
        self.holidays.insert(date);
    }

    /// Add multiple holidays at once
    pub fn add_holidays(&mut self, dates: &[NaiveDate]) {
        self.holidays.extend(dates);
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }

    /// Holidays between `start` and `end` (inclusive), sorted
    pub fn holidays_in_range(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        let mut days: Vec<NaiveDate> = self
            .holidays
            .iter()
            .copied()
            .filter(|date| *date >= start && *date <= end)
            .collect();
        days.sort();
        days
    }

    pub fn len(&self) -> usize {
        self.holidays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holidays.is_empty()
    }
}

use serde::{Deserialize, Serialize};

use crate::day_type::DayType;

/// Naming convention of the destination sheets in a report template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetNaming {
    pub km_prefix: String,
    pub users_prefix: String,
    /// Inserted between prefix and day index for workday sheets.
    pub workday_marker: String,
    pub saturday_suffix: String,
    pub sunday_suffix: String,
    pub holiday_suffix: String,
    pub summary_prefix: String,
}

impl Default for SheetNaming {
    fn default() -> Self {
        Self {
            km_prefix: "KILOMETROS".to_string(),
            users_prefix: "USUARIOS".to_string(),
            workday_marker: "HABIL".to_string(),
            saturday_suffix: "6".to_string(),
            sunday_suffix: "7".to_string(),
            holiday_suffix: "8".to_string(),
            summary_prefix: "Hoja".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetSelection {
    pub km: String,
    pub users: String,
    pub summary: String,
}

impl SheetNaming {
    fn day_suffix(&self, day_type: DayType, day_index: usize) -> String {
        match day_type {
            DayType::Workday => format!("{}{}", self.workday_marker, day_index),
            DayType::Saturday => self.saturday_suffix.clone(),
            DayType::Sunday => self.sunday_suffix.clone(),
            DayType::Holiday => self.holiday_suffix.clone(),
        }
    }

    /// Sheets that receive data for the `day_index`-th (1-based) date of a window.
    pub fn select(&self, day_type: DayType, day_index: usize) -> SheetSelection {
        let suffix = self.day_suffix(day_type, day_index);
        SheetSelection {
            km: format!("{}{}", self.km_prefix, suffix),
            users: format!("{}{}", self.users_prefix, suffix),
            summary: format!("{}{}", self.summary_prefix, day_index),
        }
    }
}

/// [`SheetNaming::select`] with the stock template names.
pub fn select_sheet_names(day_type: DayType, day_index: usize) -> SheetSelection {
    SheetNaming::default().select(day_type, day_index)
}

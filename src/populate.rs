use chrono::NaiveDate;
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::debug;

use crate::aggregate::{DaySummary, RecordTable};
use crate::calendar::HolidayCalendar;
use crate::config::ReportConfig;
use crate::day_type::classify;
use crate::error::ReportResult;
use crate::routes::RouteCatalog;
use crate::template::{CellRef, CellValue, ReportTemplate, TemplateSheet};
use crate::window::DateWindow;

pub const DATE_CELL: CellRef = CellRef::new(0, 0);
pub const KM_PER_FACTOR_CELL: CellRef = CellRef::new(2, 0);
pub const KM_TOTAL_CELL: CellRef = CellRef::new(2, 1);
pub const NET_KM_PER_FACTOR_CELL: CellRef = CellRef::new(4, 0);
pub const NET_KM_CELL: CellRef = CellRef::new(4, 1);
pub const PASSENGERS_CELL: CellRef = CellRef::new(7, 1);

/// Share of the daily kilometers discounted in the net figure.
pub const KM_DISCOUNT_RATE: f64 = 0.02;

const ROUTE_VALUE_COLUMN: u16 = 1;

pub type SheetGrid = Vec<Vec<Option<CellValue>>>;

/// Touched sheets and their cell grids, in the order they were first written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetDump {
    sheets: Vec<(String, SheetGrid)>,
}

impl SheetDump {
    fn capture(template: &ReportTemplate, touched: &[String]) -> Self {
        let sheets = touched
            .iter()
            .filter_map(|name| template.sheet(name).map(|s| (name.clone(), s.grid())))
            .collect();
        Self { sheets }
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }
}

impl Serialize for SheetDump {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.sheets.len()))?;
        for (name, grid) in &self.sheets {
            map.serialize_entry(name, grid)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone)]
pub struct PopulatedReport {
    pub template: ReportTemplate,
    pub touched: Vec<String>,
    pub dump: SheetDump,
}

fn mark_touched(touched: &mut Vec<String>, name: &str) {
    if !touched.iter().any(|t| t == name) {
        touched.push(name.to_string());
    }
}

fn write_route_sheet(sheet: &mut TemplateSheet, date_text: &str, summary: &DaySummary) {
    sheet.set(DATE_CELL, date_text);
    for (position, route_total) in summary.by_route.iter().enumerate() {
        let cell = CellRef::new(RouteCatalog::row_for(position) - 1, ROUTE_VALUE_COLUMN);
        sheet.set(cell, route_total.total);
    }
}

/// Write every day of `window` into the template and hide the sheets that
/// received nothing.
pub fn populate(
    mut template: ReportTemplate,
    km_records: &RecordTable,
    user_records: &RecordTable,
    window: &DateWindow,
    routes: &RouteCatalog,
    calendar: &HolidayCalendar,
    config: &ReportConfig,
) -> ReportResult<PopulatedReport> {
    let mut touched: Vec<String> = Vec::new();

    for (day_index, date) in window.days() {
        let classification = classify(date, calendar);
        let selection = config
            .sheet_naming
            .select(classification.day_type, day_index);
        let date_text = format_date(date);
        debug!(
            %date,
            day_index,
            day_type = %classification.day_type,
            factor = %classification.factor,
            "populating day"
        );

        let km = km_records.summarize_day(date, routes)?;
        let users = user_records.summarize_day(date, routes)?;

        if let Some(sheet) = template.sheet_mut(&selection.km) {
            write_route_sheet(sheet, &date_text, &km);
            mark_touched(&mut touched, &selection.km);
        }

        if let Some(sheet) = template.sheet_mut(&selection.users) {
            write_route_sheet(sheet, &date_text, &users);
            mark_touched(&mut touched, &selection.users);
        }

        if let Some(sheet) = template.sheet_mut(&selection.summary) {
            sheet.set(DATE_CELL, date_text.as_str());
            if users.has_records {
                let passengers = if config.halve_passenger_total {
                    users.total / 2.0
                } else {
                    users.total
                };
                sheet.set(PASSENGERS_CELL, passengers);
            }
            if km.has_records {
                let net_km = km.total - km.total * KM_DISCOUNT_RATE;
                sheet.set(KM_TOTAL_CELL, km.total);
                sheet.set(KM_PER_FACTOR_CELL, classification.factor.divide(km.total));
                sheet.set(NET_KM_CELL, net_km);
                sheet.set(NET_KM_PER_FACTOR_CELL, classification.factor.divide(net_km));
            }
            mark_touched(&mut touched, &selection.summary);
        }
    }

    for sheet in template.sheets_mut() {
        let visible = touched.iter().any(|name| name == sheet.name());
        sheet.set_visible(visible);
    }

    let dump = SheetDump::capture(&template, &touched);
    Ok(PopulatedReport {
        template,
        touched,
        dump,
    })
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Record;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn template_with(names: &[&str]) -> ReportTemplate {
        let mut template = ReportTemplate::new();
        for name in names {
            template.add_sheet(*name).set(CellRef::new(1, 0), "header");
        }
        template
    }

    fn routes() -> RouteCatalog {
        RouteCatalog::new(["C6-001", "C6-002"])
    }

    #[test]
    fn single_workday_fills_three_sheets() {
        let template = template_with(&["Hoja1", "KILOMETROSHABIL1", "USUARIOSHABIL1", "Hoja2"]);
        let km = RecordTable::new("Km", &[Record::new(d(2024, 1, 15), "C6-002", 1000.0)]).unwrap();
        let users = RecordTable::new(
            "Pax",
            &[
                Record::new(d(2024, 1, 15), "C6-001", 10.0),
                Record::new(d(2024, 1, 15), "C6-001", 20.0),
            ],
        )
        .unwrap();
        let window = DateWindow::new(d(2024, 1, 15), d(2024, 1, 15)).unwrap();
        let report = populate(
            template,
            &km,
            &users,
            &window,
            &routes(),
            &HolidayCalendar::custom([]),
            &ReportConfig::default(),
        )
        .unwrap();

        assert_eq!(
            report.touched,
            vec!["KILOMETROSHABIL1", "USUARIOSHABIL1", "Hoja1"]
        );
        let km_sheet = report.template.sheet("KILOMETROSHABIL1").unwrap();
        assert_eq!(km_sheet.get(CellRef::new(3, 1)), Some(&CellValue::Number(0.0)));
        assert_eq!(km_sheet.get(CellRef::new(4, 1)), Some(&CellValue::Number(1000.0)));

        let summary = report.template.sheet("Hoja1").unwrap();
        assert_eq!(summary.get(DATE_CELL), Some(&CellValue::Text("2024-01-15".into())));
        assert_eq!(summary.get(PASSENGERS_CELL), Some(&CellValue::Number(15.0)));
        assert_eq!(summary.get(KM_TOTAL_CELL), Some(&CellValue::Number(1000.0)));
        assert_eq!(summary.get(NET_KM_CELL), Some(&CellValue::Number(980.0)));

        assert!(!report.template.sheet("Hoja2").unwrap().is_visible());
        assert_eq!(report.dump.len(), 3);
    }

    #[test]
    fn summary_cells_skip_days_without_records() {
        let template = template_with(&["Hoja1"]);
        let empty = RecordTable::new("Km", &[]).unwrap();
        let window = DateWindow::new(d(2024, 1, 15), d(2024, 1, 15)).unwrap();
        let report = populate(
            template,
            &empty,
            &empty,
            &window,
            &routes(),
            &HolidayCalendar::custom([]),
            &ReportConfig::default(),
        )
        .unwrap();
        let summary = report.template.sheet("Hoja1").unwrap();
        assert!(summary.get(DATE_CELL).is_some());
        assert!(summary.get(PASSENGERS_CELL).is_none());
        assert!(summary.get(KM_TOTAL_CELL).is_none());
    }

    #[test]
    fn dump_serializes_in_touched_order() {
        let mut template = ReportTemplate::new();
        template.add_sheet("Zeta").set(CellRef::new(0, 1), 2.0);
        template.add_sheet("Alpha").set(CellRef::new(0, 0), "x");
        let dump = SheetDump::capture(&template, &["Zeta".to_string(), "Alpha".to_string()]);
        let json = serde_json::to_string(&dump).unwrap();
        assert_eq!(json, r#"{"Zeta":[[null,2.0]],"Alpha":[["x"]]}"#);
    }
}

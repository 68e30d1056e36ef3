mod common;

use std::io::Cursor;

use calamine::{Data, Reader, SheetType, SheetVisible, Xlsx, open_workbook_from_rs};
use common::{
    d, package_part, row, styled_template_workbook, template_on_disk, template_workbook,
    typed_row, upload_workbook, write_file,
};
use tempfile::TempDir;
use serde_json::Value;
use transit_report::{
    CellRef, CellValue, ReportConfig, ReportTemplate, generate_report, read_upload,
};

fn config_with_template(path: &std::path::Path) -> ReportConfig {
    ReportConfig::default().with_template(path)
}

fn summary_value(json: &Value, sheet: &str, cell: &str) -> Value {
    let cell = CellRef::parse(cell).unwrap();
    json[sheet][cell.row as usize][cell.col as usize].clone()
}

#[test]
fn workday_report_fills_route_and_summary_sheets() {
    let (_dir, template) = template_on_disk();
    let upload = upload_workbook(
        &[
            row("2024-01-15", "C6-001", 10.0),
            row("2024-01-15", "C6-002", 20.0),
        ],
        &[
            row("2024-01-15", "C6-001", 600.0),
            row("2024-01-15", "C6-002A", 350.0),
            row("2024-01-15", "NO-EXISTE", 50.0),
        ],
    );
    let config = config_with_template(&template);
    let report = generate_report(&upload, "2024-01-15", "2024-01-15", &config).unwrap();

    assert_eq!(
        report.touched,
        vec!["KILOMETROSHABIL1", "USUARIOSHABIL1", "Hoja1"]
    );

    let json = serde_json::to_value(&report.dump).unwrap();
    assert_eq!(summary_value(&json, "Hoja1", "A1"), "2024-01-15");
    assert_eq!(summary_value(&json, "Hoja1", "B8"), 15.0);
    assert_eq!(summary_value(&json, "Hoja1", "B3"), 1000.0);
    assert_eq!(summary_value(&json, "Hoja1", "B5"), 980.0);
    let a3 = summary_value(&json, "Hoja1", "A3").as_f64().unwrap();
    let a5 = summary_value(&json, "Hoja1", "A5").as_f64().unwrap();
    assert!((a3 - 1000.0 / 209.0).abs() < 1e-9);
    assert!((a5 - 980.0 / 209.0).abs() < 1e-9);
    assert_eq!(summary_value(&json, "Hoja1", "B10"), "=B3+B5");

    assert_eq!(summary_value(&json, "KILOMETROSHABIL1", "A1"), "2024-01-15");
    assert_eq!(summary_value(&json, "KILOMETROSHABIL1", "A4"), "C6-001");
    assert_eq!(summary_value(&json, "KILOMETROSHABIL1", "B4"), 600.0);
    assert_eq!(summary_value(&json, "KILOMETROSHABIL1", "B5"), 0.0);
    assert_eq!(summary_value(&json, "KILOMETROSHABIL1", "B6"), 350.0);
    let km_rows = json["KILOMETROSHABIL1"].as_array().unwrap();
    assert_eq!(km_rows.len(), 35);
    assert_eq!(km_rows[1], serde_json::json!([null, null]));
}

#[test]
fn typed_dates_lose_their_time_of_day() {
    let (_dir, template) = template_on_disk();
    let upload = upload_workbook(
        &[typed_row(d(2024, 1, 15), "C6-001", 40.0)],
        &[typed_row(d(2024, 1, 15), "C6-001", 209.0)],
    );
    let report = generate_report(
        &upload,
        "2024-01-15",
        "2024-01-15",
        &config_with_template(&template),
    )
    .unwrap();
    let json = serde_json::to_value(&report.dump).unwrap();
    assert_eq!(summary_value(&json, "Hoja1", "B8"), 20.0);
    assert_eq!(summary_value(&json, "Hoja1", "A3"), 1.0);
}

#[test]
fn full_week_touches_weekend_sheets_and_hides_the_rest() {
    let (_dir, template) = template_on_disk();
    // 2024-01-08 (Monday) is a holiday; the week ends on Sunday 2024-01-14.
    let users: Vec<_> = (8..=14)
        .map(|day| row(&format!("2024-01-{day:02}"), "C6-001", 2.0 * f64::from(day)))
        .collect();
    let upload = upload_workbook(&users, &[]);
    let report = generate_report(
        &upload,
        "2024-01-08",
        "2024-01-14",
        &config_with_template(&template),
    )
    .unwrap();

    let expected = [
        "USUARIOS8",
        "Hoja1",
        "KILOMETROS8",
        "KILOMETROSHABIL2",
        "USUARIOSHABIL2",
        "Hoja2",
    ];
    assert_eq!(&report.touched[..2], &["KILOMETROS8", "USUARIOS8"]);
    for name in expected {
        assert!(report.touched.iter().any(|t| t == name), "{name} not touched");
    }
    for name in ["KILOMETROS6", "USUARIOS6", "KILOMETROS7", "USUARIOS7", "Hoja7"] {
        assert!(report.touched.iter().any(|t| t == name), "{name} not touched");
    }
    assert!(!report.touched.iter().any(|t| t == "KILOMETROSHABIL1"));
    assert!(!report.touched.iter().any(|t| t == "KILOMETROSHABIL6"));

    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(report.workbook.clone())).unwrap();
    let visibility: Vec<(String, bool)> = workbook
        .sheets_metadata()
        .iter()
        .map(|s| (s.name.clone(), s.visible == SheetVisible::Visible))
        .collect();
    assert_eq!(visibility.len(), common::template_sheet_names().len());
    for (name, visible) in &visibility {
        let touched = report.touched.iter().any(|t| t == name);
        assert_eq!(*visible, touched, "visibility of {name}");
    }

    let hoja6 = workbook.worksheet_range("Hoja6").unwrap();
    assert_eq!(
        hoja6.get_value((0, 0)),
        Some(&Data::String("2024-01-13".to_string()))
    );
    assert_eq!(hoja6.get_value((7, 1)), Some(&Data::Float(13.0)));
}

#[test]
fn eight_day_range_is_rejected_before_reading_the_template() {
    let upload = upload_workbook(&[], &[]);
    let config = ReportConfig::default().with_template("/nonexistent/template.xlsx");
    let err = generate_report(&upload, "2024-01-15", "2024-01-22", &config).unwrap_err();
    assert!(err.is_client_error());
    assert!(err.to_string().contains("7 days"));
}

#[test]
fn missing_template_is_a_server_error() {
    let upload = upload_workbook(&[], &[]);
    let config = ReportConfig::default().with_template("/nonexistent/template.xlsx");
    let err = generate_report(&upload, "2024-01-15", "2024-01-21", &config).unwrap_err();
    assert!(!err.is_client_error());
}

#[test]
fn missing_kilometers_sheet_is_a_client_error() {
    let upload = common::upload_without_kilometers(&[row("2024-01-15", "C6-001", 1.0)]);
    let err = read_upload(&upload, &ReportConfig::default()).unwrap_err();
    assert!(err.is_client_error());
    assert!(err.to_string().contains("Data Kilometros"));
}

#[test]
fn dumps_are_deterministic() {
    let (_dir, template) = template_on_disk();
    let upload = upload_workbook(
        &[row("2024-01-13", "C6-003", 7.0)],
        &[row("2024-01-14", "C6-003", 70.0)],
    );
    let config = config_with_template(&template);
    let first = generate_report(&upload, "2024-01-12", "2024-01-14", &config).unwrap();
    let second = generate_report(&upload, "2024-01-12", "2024-01-14", &config).unwrap();
    assert_eq!(
        serde_json::to_string(&first.dump).unwrap(),
        serde_json::to_string(&second.dump).unwrap()
    );
}

#[test]
fn template_formulas_survive_export() {
    let template = ReportTemplate::from_xlsx_bytes(&template_workbook()).unwrap();
    let hoja1 = template.sheet("Hoja1").unwrap();
    assert_eq!(
        hoja1.get(CellRef::parse("B10").unwrap()),
        Some(&CellValue::Formula("=B3+B5".to_string()))
    );
    let bytes = transit_report::write_xlsx(&template).unwrap();
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes)).unwrap();
    let formulas = workbook.worksheet_formula("Hoja1").unwrap();
    assert_eq!(formulas.get_value((9, 1)), Some(&"B3+B5".to_string()));
}

fn cell_style(sheet_xml: &str, cell: &str) -> Option<String> {
    let marker = format!("<c r=\"{cell}\" s=\"");
    let start = sheet_xml.find(&marker)? + marker.len();
    let len = sheet_xml[start..].find('"')?;
    Some(sheet_xml[start..start + len].to_string())
}

#[test]
fn template_layout_survives_population() {
    let dir = TempDir::new().unwrap();
    let source = styled_template_workbook();
    let template = write_file(dir.path(), "PlantillaSegunda.xlsx", &source);
    let upload = upload_workbook(
        &[row("2024-01-15", "C6-001", 10.0)],
        &[row("2024-01-15", "C6-001", 1000.0)],
    );
    let report = generate_report(
        &upload,
        "2024-01-15",
        "2024-01-15",
        &config_with_template(&template),
    )
    .unwrap();

    let before = package_part(&source, "xl/worksheets/sheet1.xml");
    let after = package_part(&report.workbook, "xl/worksheets/sheet1.xml");
    assert!(after.contains(r#"<mergeCell ref="D1:G1"/>"#));
    assert!(after.contains(r#"customWidth="1""#));
    let style = cell_style(&before, "B3").expect("styled B3 in the template");
    assert_eq!(cell_style(&after, "B3"), Some(style));
    assert!(after.contains("<v>1000</v>"));
    let styles = package_part(&report.workbook, "xl/styles.xml");
    assert!(styles.contains(r#"formatCode="0.000""#));

    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(report.workbook.clone())).unwrap();
    let chart = workbook
        .sheets_metadata()
        .iter()
        .find(|sheet| sheet.typ == SheetType::ChartSheet)
        .cloned()
        .expect("chart sheet kept");
    assert_eq!(chart.visible, SheetVisible::Hidden);
    let hoja1 = workbook.worksheet_range("Hoja1").unwrap();
    assert_eq!(hoja1.get_value((2, 1)), Some(&Data::Float(1000.0)));
    assert_eq!(
        hoja1.get_value((0, 0)),
        Some(&Data::String("2024-01-15".to_string()))
    );
    assert_eq!(
        hoja1.get_value((0, 3)),
        Some(&Data::String("Resumen diario".to_string()))
    );
    let formulas = workbook.worksheet_formula("Hoja1").unwrap();
    assert_eq!(formulas.get_value((9, 1)), Some(&"B3+B5".to_string()));
}

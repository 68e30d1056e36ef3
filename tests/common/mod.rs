#![allow(dead_code)]

use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rust_xlsxwriter::{Chart, ChartType, Format, Workbook, Worksheet};
use tempfile::TempDir;

/// Date cell as it may appear in an uploaded sheet.
#[derive(Debug, Clone)]
pub enum DateCell {
    Text(String),
    Typed(NaiveDate),
}

#[derive(Debug, Clone)]
pub struct Row {
    pub date: DateCell,
    pub route: String,
    pub value: f64,
}

pub fn row(date: &str, route: &str, value: f64) -> Row {
    Row {
        date: DateCell::Text(date.to_string()),
        route: route.to_string(),
        value,
    }
}

pub fn typed_row(date: NaiveDate, route: &str, value: f64) -> Row {
    Row {
        date: DateCell::Typed(date),
        route: route.to_string(),
        value,
    }
}

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn write_data_sheet(sheet: &mut Worksheet, metric: &str, rows: &[Row]) {
    let date_format = Format::new().set_num_format("yyyy-mm-dd");
    let headers = ["Id", "Fecha", "Empresa", "Servicio", "Tipo", "Sentido", "Ruta", metric];
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string(0, col as u16, *header).unwrap();
    }
    for (idx, data) in rows.iter().enumerate() {
        let r = idx as u32 + 1;
        sheet.write_number(r, 0, f64::from(r)).unwrap();
        match &data.date {
            DateCell::Text(text) => {
                sheet.write_string(r, 1, text).unwrap();
            }
            DateCell::Typed(date) => {
                let datetime = date.and_hms_opt(6, 30, 0).unwrap();
                sheet
                    .write_datetime_with_format(r, 1, &datetime, &date_format)
                    .unwrap();
            }
        }
        sheet.write_string(r, 6, &data.route).unwrap();
        sheet.write_number(r, 7, data.value).unwrap();
    }
}

/// Upload workbook holding both data sheets.
pub fn upload_workbook(users: &[Row], kilometers: &[Row]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    write_data_sheet(
        workbook.add_worksheet().set_name("Data Usuarios").unwrap(),
        "Pax",
        users,
    );
    write_data_sheet(
        workbook.add_worksheet().set_name("Data Kilometros").unwrap(),
        "Km",
        kilometers,
    );
    workbook.save_to_buffer().unwrap()
}

/// Upload workbook that only has the passenger sheet.
pub fn upload_without_kilometers(users: &[Row]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    write_data_sheet(
        workbook.add_worksheet().set_name("Data Usuarios").unwrap(),
        "Pax",
        users,
    );
    workbook.save_to_buffer().unwrap()
}

/// Every sheet name of the stock report template, in workbook order.
pub fn template_sheet_names() -> Vec<String> {
    let mut names = Vec::new();
    for n in 1..=7 {
        names.push(format!("Hoja{n}"));
    }
    for prefix in ["KILOMETROS", "USUARIOS"] {
        for n in 1..=7 {
            names.push(format!("{prefix}HABIL{n}"));
        }
        for suffix in ["6", "7", "8"] {
            names.push(format!("{prefix}{suffix}"));
        }
    }
    names
}

/// Template with the stock sheet families, a label column on the route
/// sheets and a formula on every summary sheet.
pub fn template_workbook() -> Vec<u8> {
    let mut workbook = stock_sheets();
    workbook.save_to_buffer().unwrap()
}

/// Stock template plus layout a plain value copy would lose: a merged
/// title, a custom number format on `Hoja1!B3`, a wide column and a
/// trailing chart sheet.
pub fn styled_template_workbook() -> Vec<u8> {
    let mut workbook = stock_sheets();
    let km_format = Format::new().set_num_format("0.000");
    let hoja1 = workbook.worksheet_from_name("Hoja1").unwrap();
    hoja1
        .merge_range(0, 3, 0, 6, "Resumen diario", &Format::new().set_bold())
        .unwrap();
    hoja1.write_number_with_format(2, 1, 0.0, &km_format).unwrap();
    hoja1.set_column_width(3, 30).unwrap();

    let mut chart = Chart::new(ChartType::Column);
    chart.add_series().set_values("Hoja1!$B$3:$B$5");
    workbook.add_chartsheet().insert_chart(0, 0, &chart).unwrap();
    workbook.save_to_buffer().unwrap()
}

/// Uncompressed text of one part of an xlsx package.
pub fn package_part(xlsx: &[u8], name: &str) -> String {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(xlsx)).unwrap();
    let mut text = String::new();
    archive
        .by_name(name)
        .unwrap()
        .read_to_string(&mut text)
        .unwrap();
    text
}

fn stock_sheets() -> Workbook {
    let mut workbook = Workbook::new();
    for name in template_sheet_names() {
        let sheet = workbook.add_worksheet().set_name(&name).unwrap();
        if name.starts_with("Hoja") {
            sheet.write_string(1, 0, "Km por factor").unwrap();
            sheet.write_string(1, 1, "Km").unwrap();
            sheet.write_formula(9, 1, "=B3+B5").unwrap();
        } else {
            sheet.write_string(2, 0, "Ruta").unwrap();
            sheet.write_string(3, 0, "C6-001").unwrap();
        }
    }
    workbook
}

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Temp dir holding the stock template; keep the `TempDir` alive.
pub fn template_on_disk() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "PlantillaSegunda.xlsx", &template_workbook());
    (dir, path)
}

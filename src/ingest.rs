use calamine::{Data, Range, Reader, Sheets, open_workbook_auto_from_rs};
use chrono::{NaiveDate, NaiveTime};
use std::io::{Cursor, Read, Seek};
use tracing::{debug, warn};

use crate::aggregate::{Record, RecordTable};
use crate::config::{ColumnSpec, ReportConfig, TableLayout};
use crate::error::{DateParseError, ReportError, ReportResult};

/// The two record tables carried by an upload.
#[derive(Debug, Clone)]
pub struct UploadedTables {
    pub users: RecordTable,
    pub kilometers: RecordTable,
}

/// Row accounting for one input sheet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub rows_read: usize,
    pub records: usize,
    pub sentinel_rows: usize,
    pub dropped_dates: usize,
}

/// Parse a date written as text: `YYYY-MM-DD` or `DD-MM-YY`, optionally
/// followed by a time of day that is then ignored.
pub fn parse_date_text(raw: &str) -> Result<NaiveDate, DateParseError> {
    let text = raw.trim();
    let date_part = match text.split_once([' ', 'T']) {
        Some((date, time)) if is_time_of_day(time.trim()) => date,
        Some(_) => return Err(DateParseError::new(raw)),
        None => text,
    };
    let bytes = date_part.as_bytes();
    let parsed = if bytes.len() == 10 && bytes[4] == b'-' && bytes[7] == b'-' {
        NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
    } else if bytes.len() == 8 && bytes[2] == b'-' && bytes[5] == b'-' {
        NaiveDate::parse_from_str(date_part, "%d-%m-%y")
    } else {
        return Err(DateParseError::new(raw));
    };
    parsed.map_err(|_| DateParseError::new(raw))
}

fn is_time_of_day(text: &str) -> bool {
    ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"]
        .iter()
        .any(|format| NaiveTime::parse_from_str(text, format).is_ok())
}

/// Read a date cell. Typed dates lose their time of day.
pub fn parse_date_cell(cell: &Data) -> Result<NaiveDate, DateParseError> {
    match cell {
        Data::DateTime(value) => value
            .as_datetime()
            .map(|dt| dt.date())
            .ok_or_else(|| DateParseError::new(value.as_f64().to_string())),
        Data::DateTimeIso(text) | Data::String(text) => parse_date_text(text),
        other => Err(DateParseError::new(other.to_string())),
    }
}

/// Numeric metric of a cell; NaN and infinities count as blank.
fn metric_value(cell: &Data) -> Option<f64> {
    let value = match cell {
        Data::Int(value) => *value as f64,
        Data::Float(value) => *value,
        Data::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

fn route_value(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::String(text) => text.clone(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

/// Column position of `spec` in `headers`: by name, else by fallback index.
fn resolve_column(
    headers: &[String],
    width: usize,
    spec: &ColumnSpec,
    sheet: &str,
) -> ReportResult<usize> {
    if let Some(idx) = headers.iter().position(|header| *header == spec.name) {
        return Ok(idx);
    }
    if spec.fallback_index < width {
        debug!(
            sheet,
            column = %spec.name,
            index = spec.fallback_index,
            "column not found by name, using fallback position"
        );
        return Ok(spec.fallback_index);
    }
    Err(ReportError::invalid(format!(
        "sheet '{sheet}' has no '{}' column and no column at position {}",
        spec.name,
        spec.fallback_index + 1
    )))
}

/// Turn a sheet range into a record table following `layout`.
///
/// Column positions are absolute (column A = 0) and the header is the
/// first row of the sheet, even when the used range starts further down.
pub fn read_table(
    range: &Range<Data>,
    layout: &TableLayout,
) -> ReportResult<(RecordTable, IngestStats)> {
    let (row0, col0) = range.start().unwrap_or((0, 0));
    let col0 = col0 as usize;
    let width = if range.is_empty() {
        0
    } else {
        col0 + range.width()
    };

    let mut rows = range.rows();
    let mut headers = vec![String::new(); width];
    if row0 == 0 {
        if let Some(header_row) = rows.next() {
            for (c, cell) in header_row.iter().enumerate() {
                headers[col0 + c] = header_text(cell);
            }
        }
    }

    let sheet = layout.sheet_name.as_str();
    let date_idx = resolve_column(&headers, width, &layout.date, sheet)?;
    let route_idx = resolve_column(&headers, width, &layout.route, sheet)?;
    let metric_idx = resolve_column(&headers, width, &layout.metric, sheet)?;

    let cell_at = |row: &[Data], idx: usize| -> Data {
        idx.checked_sub(col0)
            .and_then(|c| row.get(c))
            .cloned()
            .unwrap_or(Data::Empty)
    };

    let mut stats = IngestStats::default();
    let mut records = Vec::new();
    for row in rows {
        stats.rows_read += 1;
        let date_cell = cell_at(row, date_idx);
        if let Data::String(label) = &date_cell {
            if layout.sentinel_labels.iter().any(|s| s == label) {
                stats.sentinel_rows += 1;
                continue;
            }
        }
        let date = match parse_date_cell(&date_cell) {
            Ok(date) => date,
            Err(err) => {
                if !matches!(date_cell, Data::Empty) {
                    debug!(sheet, error = %err, "dropping row with unparseable date");
                }
                stats.dropped_dates += 1;
                continue;
            }
        };
        records.push(Record {
            date,
            route: route_value(&cell_at(row, route_idx)),
            value: metric_value(&cell_at(row, metric_idx)),
        });
    }
    stats.records = records.len();

    let table = RecordTable::new(layout.metric.name.clone(), &records)?;
    Ok((table, stats))
}

fn read_sheet<RS: Read + Seek>(
    workbook: &mut Sheets<RS>,
    layout: &TableLayout,
) -> ReportResult<RecordTable> {
    let sheet = layout.sheet_name.as_str();
    if !workbook.sheet_names().iter().any(|name| name == sheet) {
        return Err(ReportError::invalid(format!(
            "uploaded workbook has no '{sheet}' sheet"
        )));
    }
    let range = workbook
        .worksheet_range(sheet)
        .map_err(|err| ReportError::invalid(format!("cannot read sheet '{sheet}': {err}")))?;
    let (table, stats) = read_table(&range, layout)?;
    if stats.dropped_dates > 0 {
        warn!(
            sheet,
            dropped = stats.dropped_dates,
            "rows without a usable date were skipped"
        );
    }
    debug!(
        sheet,
        rows = stats.rows_read,
        records = stats.records,
        sentinels = stats.sentinel_rows,
        "input sheet read"
    );
    Ok(table)
}

/// Read `Data Usuarios` and `Data Kilometros` from an uploaded workbook
/// (xlsx, xls or ods).
pub fn read_upload(bytes: &[u8], config: &ReportConfig) -> ReportResult<UploadedTables> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|err| {
        ReportError::invalid(format!("uploaded file is not a readable spreadsheet: {err}"))
    })?;
    let users = read_sheet(&mut workbook, &config.users)?;
    let kilometers = read_sheet(&mut workbook, &config.kilometers)?;
    Ok(UploadedTables { users, kilometers })
}

use calamine::{Data, Range, Reader, SheetType, SheetVisible, Xlsx, open_workbook_from_rs};
use chrono::NaiveDateTime;
use serde::ser::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use crate::error::{ReportError, ReportResult};

/// Zero-based cell coordinate; displayed in A1 notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellRef {
    pub row: u32,
    pub col: u16,
}

impl CellRef {
    pub const fn new(row: u32, col: u16) -> Self {
        Self { row, col }
    }

    /// Parse an A1 reference such as `B8` or `AA12`.
    pub fn parse(reference: &str) -> Option<Self> {
        let reference = reference.trim();
        let split = reference.find(|c: char| c.is_ascii_digit())?;
        let (letters, digits) = reference.split_at(split);
        if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }
        let mut col: u32 = 0;
        for c in letters.chars() {
            col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
            if col > u32::from(u16::MAX) {
                return None;
            }
        }
        let row: u32 = digits.parse().ok()?;
        if row == 0 {
            return None;
        }
        Some(Self::new(row - 1, (col - 1) as u16))
    }

    fn column_letters(&self) -> String {
        let mut n = u32::from(self.col) + 1;
        let mut letters = Vec::new();
        while n > 0 {
            let rem = ((n - 1) % 26) as u8;
            letters.push((b'A' + rem) as char);
            n = (n - 1) / 26;
        }
        letters.iter().rev().collect()
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.column_letters(), self.row + 1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Bool(bool),
    DateTime(NaiveDateTime),
    /// Formula text including the leading `=`.
    Formula(String),
}

impl CellValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(text) | CellValue::Formula(text) => Some(text),
            _ => None,
        }
    }

    fn from_data(data: &Data) -> Option<Self> {
        match data {
            Data::Empty | Data::Error(_) => None,
            Data::Int(value) => Some(CellValue::Number(*value as f64)),
            Data::Float(value) => Some(CellValue::Number(*value)),
            Data::String(text) => Some(CellValue::Text(text.clone())),
            Data::Bool(value) => Some(CellValue::Bool(*value)),
            Data::DateTime(value) => Some(
                value
                    .as_datetime()
                    .map(CellValue::DateTime)
                    .unwrap_or(CellValue::Number(value.as_f64())),
            ),
            Data::DateTimeIso(text) | Data::DurationIso(text) => Some(CellValue::Text(text.clone())),
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Number(value) => serializer.serialize_f64(*value),
            CellValue::Text(text) | CellValue::Formula(text) => serializer.serialize_str(text),
            CellValue::Bool(value) => serializer.serialize_bool(*value),
            CellValue::DateTime(value) => {
                serializer.serialize_str(&value.format("%Y-%m-%dT%H:%M:%S").to_string())
            }
        }
    }
}

/// One named sheet of a template: sparse cells plus a visibility flag.
///
/// Cells set after loading are tracked so export only rewrites those.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSheet {
    name: String,
    cells: BTreeMap<CellRef, CellValue>,
    written: BTreeSet<CellRef>,
    visible: bool,
}

impl TemplateSheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: BTreeMap::new(),
            written: BTreeSet::new(),
            visible: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn set(&mut self, cell: CellRef, value: impl Into<CellValue>) {
        self.cells.insert(cell, value.into());
        self.written.insert(cell);
    }

    pub fn get(&self, cell: CellRef) -> Option<&CellValue> {
        self.cells.get(&cell)
    }

    /// Cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (CellRef, &CellValue)> {
        self.cells.iter().map(|(cell, value)| (*cell, value))
    }

    pub(crate) fn written_cells(&self) -> impl Iterator<Item = (CellRef, &CellValue)> {
        self.written
            .iter()
            .filter_map(|cell| self.cells.get(cell).map(|value| (*cell, value)))
    }

    /// Row-major grid from `A1` to the last used row and column.
    pub fn grid(&self) -> Vec<Vec<Option<CellValue>>> {
        let Some(max_row) = self.cells.keys().map(|cell| cell.row).max() else {
            return Vec::new();
        };
        let max_col = self.cells.keys().map(|cell| cell.col).max().unwrap_or(0);
        let mut grid = vec![vec![None; usize::from(max_col) + 1]; max_row as usize + 1];
        for (cell, value) in &self.cells {
            grid[cell.row as usize][usize::from(cell.col)] = Some(value.clone());
        }
        grid
    }

    fn load(name: String, values: &Range<Data>, formulas: &Range<String>) -> Self {
        let mut sheet = Self::new(name);
        if let Some((row0, col0)) = values.start() {
            for (r, row) in values.rows().enumerate() {
                for (c, data) in row.iter().enumerate() {
                    if let Some(value) = CellValue::from_data(data) {
                        let cell = CellRef::new(row0 + r as u32, (col0 as usize + c) as u16);
                        sheet.cells.insert(cell, value);
                    }
                }
            }
        }
        if let Some((row0, col0)) = formulas.start() {
            for (r, row) in formulas.rows().enumerate() {
                for (c, formula) in row.iter().enumerate() {
                    if formula.trim().is_empty() {
                        continue;
                    }
                    let cell = CellRef::new(row0 + r as u32, (col0 as usize + c) as u16);
                    sheet
                        .cells
                        .insert(cell, CellValue::Formula(format!("={formula}")));
                }
            }
        }
        sheet
    }
}

/// In-memory report workbook. Loaded fresh for every report.
///
/// Keeps the source package so export can patch it instead of rebuilding.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReportTemplate {
    sheets: Vec<TemplateSheet>,
    package: Vec<u8>,
}

impl ReportTemplate {
    #[cfg(test)]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub fn open<P: AsRef<Path>>(path: P) -> ReportResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|err| {
            ReportError::Template(format!("cannot open template {}: {err}", path.display()))
        })?;
        Self::from_xlsx_bytes(&bytes)
    }

    pub fn from_xlsx_bytes(bytes: &[u8]) -> ReportResult<Self> {
        let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))
            .map_err(|err| ReportError::Template(format!("cannot read template: {err}")))?;
        let mut template = Self::from_workbook(&mut workbook)?;
        template.package = bytes.to_vec();
        Ok(template)
    }

    /// The xlsx bytes the template was read from.
    pub(crate) fn package(&self) -> &[u8] {
        &self.package
    }

    fn from_workbook<RS: Read + Seek>(workbook: &mut Xlsx<RS>) -> ReportResult<Self> {
        let listed: Vec<(String, bool)> = workbook
            .sheets_metadata()
            .iter()
            .filter(|sheet| sheet.typ == SheetType::WorkSheet)
            .map(|sheet| (sheet.name.clone(), sheet.visible == SheetVisible::Visible))
            .collect();

        let mut template = Self::default();
        for (name, visible) in listed {
            let values = workbook.worksheet_range(&name)?;
            let formulas = workbook.worksheet_formula(&name)?;
            let mut sheet = TemplateSheet::load(name, &values, &formulas);
            sheet.set_visible(visible);
            template.sheets.push(sheet);
        }
        if template.sheets.is_empty() {
            return Err(ReportError::Template("template has no worksheets".into()));
        }
        Ok(template)
    }

    /// Append an empty sheet, or return the existing one with that name.
    #[cfg(test)]
    pub(crate) fn add_sheet(&mut self, name: impl Into<String>) -> &mut TemplateSheet {
        let name = name.into();
        if let Some(idx) = self.sheets.iter().position(|s| s.name == name) {
            return &mut self.sheets[idx];
        }
        self.sheets.push(TemplateSheet::new(name));
        let last = self.sheets.len() - 1;
        &mut self.sheets[last]
    }

    pub fn sheet(&self, name: &str) -> Option<&TemplateSheet> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut TemplateSheet> {
        self.sheets.iter_mut().find(|sheet| sheet.name == name)
    }

    pub fn sheets(&self) -> &[TemplateSheet] {
        &self.sheets
    }

    pub fn sheets_mut(&mut self) -> impl Iterator<Item = &mut TemplateSheet> {
        self.sheets.iter_mut()
    }
}

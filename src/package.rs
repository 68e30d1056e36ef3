//! In-place editing of the template's xlsx package.
//!
//! Only the parts that change are rewritten: the worksheets that received
//! cells, the sheet states in `xl/workbook.xml` and the calculation chain.
//! Styles, merged ranges, column widths, drawings and chart sheets are
//! copied through untouched.

use chrono::{NaiveDate, NaiveDateTime};
use quick_xml::escape::unescape;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{ReportError, ReportResult};
use crate::template::{CellRef, CellValue, ReportTemplate};

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const CALC_CHAIN_PART: &str = "xl/calcChain.xml";

type XmlWriter = Writer<Vec<u8>>;
type RowCells<'a> = BTreeMap<u16, &'a CellValue>;

struct Part {
    name: String,
    data: Vec<u8>,
}

struct SheetEntry {
    name: String,
    rel_id: Option<String>,
}

/// Rewrite the template package with the cells written since it was loaded.
pub(crate) fn rewrite_package(template: &ReportTemplate) -> ReportResult<Vec<u8>> {
    let mut parts = read_parts(template.package())?;

    let workbook_xml = part_data(&parts, WORKBOOK_PART)
        .ok_or_else(|| ReportError::Template(format!("template has no {WORKBOOK_PART}")))?;
    let entries = list_sheets(workbook_xml)?;
    let targets = match part_data(&parts, WORKBOOK_RELS_PART) {
        Some(rels) => relationship_targets(rels)?,
        None => HashMap::new(),
    };

    let visible: Vec<bool> = entries
        .iter()
        .map(|entry| template.sheet(&entry.name).is_some_and(|sheet| sheet.is_visible()))
        .collect();
    let active = visible
        .iter()
        .position(|flag| *flag)
        .ok_or_else(|| ReportError::processing("no worksheet would remain visible"))?;

    let mut sheet_parts: HashMap<String, (&str, bool)> = HashMap::new();
    for (idx, entry) in entries.iter().enumerate() {
        let Some(target) = entry.rel_id.as_ref().and_then(|id| targets.get(id)) else {
            return Err(ReportError::Template(format!(
                "sheet '{}' has no package part",
                entry.name
            )));
        };
        sheet_parts.insert(target.clone(), (entry.name.as_str(), idx == active));
    }

    let has_calc_chain = parts.iter().any(|part| part.name == CALC_CHAIN_PART);
    parts.retain(|part| part.name != CALC_CHAIN_PART);

    for part in &mut parts {
        let patched = match part.name.as_str() {
            WORKBOOK_PART => patch_workbook_xml(&part.data, &visible, active)?,
            WORKBOOK_RELS_PART if has_calc_chain => drop_empty_elements(&part.data, |e| {
                Ok(e.local_name().as_ref() == b"Relationship"
                    && find_attr(e, b"Target")?
                        .is_some_and(|target| resolve_target(&target) == CALC_CHAIN_PART))
            })?,
            CONTENT_TYPES_PART if has_calc_chain => drop_empty_elements(&part.data, |e| {
                Ok(e.local_name().as_ref() == b"Override"
                    && find_attr(e, b"PartName")?
                        .is_some_and(|name| name.trim_start_matches('/') == CALC_CHAIN_PART))
            })?,
            name => match sheet_parts.get(name) {
                Some((sheet_name, selected)) => {
                    let cells: BTreeMap<CellRef, &CellValue> = template
                        .sheet(sheet_name)
                        .map(|sheet| sheet.written_cells().collect())
                        .unwrap_or_default();
                    debug!(sheet = %sheet_name, cells = cells.len(), "patching worksheet part");
                    patch_sheet_xml(&part.data, &cells, *selected)?
                }
                None => continue,
            },
        };
        part.data = patched;
    }

    write_parts(&parts)
}

fn read_parts(bytes: &[u8]) -> ReportResult<Vec<Part>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut parts = Vec::with_capacity(archive.len());
    for idx in 0..archive.len() {
        let mut file = archive.by_index(idx)?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)?;
        parts.push(Part { name, data });
    }
    Ok(parts)
}

fn write_parts(parts: &[Part]) -> ReportResult<Vec<u8>> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for part in parts {
        zip.start_file(part.name.as_str(), options)?;
        zip.write_all(&part.data)?;
    }
    Ok(zip.finish()?.into_inner())
}

fn part_data<'a>(parts: &'a [Part], name: &str) -> Option<&'a [u8]> {
    parts
        .iter()
        .find(|part| part.name == name)
        .map(|part| part.data.as_slice())
}

/// Relationship targets are relative to `xl/` unless they start with `/`.
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{target}"),
    }
}

fn attr_text(attr: &Attribute<'_>) -> ReportResult<String> {
    let raw = std::str::from_utf8(&attr.value)
        .map_err(|err| ReportError::Template(format!("attribute is not utf-8: {err}")))?;
    let text = unescape(raw)
        .map_err(|err| ReportError::Template(format!("bad attribute escape: {err}")))?;
    Ok(text.into_owned())
}

/// Attribute lookup by local name, so `r:id` matches `id`.
fn find_attr(e: &BytesStart<'_>, key: &[u8]) -> ReportResult<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.local_name().as_ref() == key {
            return Ok(Some(attr_text(&attr)?));
        }
    }
    Ok(None)
}

fn copy_without(e: &BytesStart<'_>, dropped: &[&[u8]]) -> ReportResult<BytesStart<'static>> {
    let mut out = e.clone().into_owned();
    out.clear_attributes();
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if dropped.contains(&attr.key.local_name().as_ref()) {
            continue;
        }
        out.push_attribute(attr);
    }
    Ok(out)
}

fn list_sheets(xml: &[u8]) -> ReportResult<Vec<SheetEntry>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut sheets = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let name = find_attr(&e, b"name")?
                    .ok_or_else(|| ReportError::Template("workbook sheet without a name".into()))?;
                let rel_id = find_attr(&e, b"id")?;
                sheets.push(SheetEntry { name, rel_id });
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(sheets)
}

fn relationship_targets(xml: &[u8]) -> ReportResult<HashMap<String, String>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut targets = HashMap::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let external = find_attr(&e, b"TargetMode")?.as_deref() == Some("External");
                if let (false, Some(id), Some(target)) =
                    (external, find_attr(&e, b"Id")?, find_attr(&e, b"Target")?)
                {
                    targets.insert(id, resolve_target(&target));
                }
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(targets)
}

fn patch_workbook_xml(xml: &[u8], visible: &[bool], active: usize) -> ReportResult<Vec<u8>> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut buf = Vec::new();
    let mut sheet_idx = 0usize;
    loop {
        let event = reader.read_event_into(&mut buf)?;
        let (e, empty) = match event {
            Event::Eof => break,
            Event::Start(e) => (e, false),
            Event::Empty(e) => (e, true),
            other => {
                writer.write_event(other)?;
                buf.clear();
                continue;
            }
        };
        let local = e.local_name().as_ref().to_vec();
        let out = match local.as_slice() {
            b"sheet" => {
                let mut out = copy_without(&e, &[b"state"])?;
                if !visible.get(sheet_idx).copied().unwrap_or(false) {
                    out.push_attribute(("state", "hidden"));
                }
                sheet_idx += 1;
                out
            }
            b"workbookView" => {
                let mut out = copy_without(&e, &[b"activeTab", b"firstSheet"])?;
                let tab = active.to_string();
                out.push_attribute(("activeTab", tab.as_str()));
                out
            }
            b"calcPr" => {
                let mut out = copy_without(&e, &[b"fullCalcOnLoad"])?;
                out.push_attribute(("fullCalcOnLoad", "1"));
                out
            }
            _ => e.into_owned(),
        };
        writer.write_event(if empty { Event::Empty(out) } else { Event::Start(out) })?;
        buf.clear();
    }
    Ok(writer.into_inner())
}

fn drop_empty_elements<F>(xml: &[u8], dropped: F) -> ReportResult<Vec<u8>>
where
    F: Fn(&BytesStart<'_>) -> ReportResult<bool>,
{
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Empty(e) if dropped(&e)? => {}
            event => writer.write_event(event)?,
        }
        buf.clear();
    }
    Ok(writer.into_inner())
}

fn patch_sheet_xml(
    xml: &[u8],
    cells: &BTreeMap<CellRef, &CellValue>,
    selected: bool,
) -> ReportResult<Vec<u8>> {
    let mut pending: BTreeMap<u32, RowCells<'_>> = BTreeMap::new();
    for (cell, value) in cells {
        pending.entry(cell.row).or_default().insert(cell.col, *value);
    }
    let extent = cells.keys().next().map(|first| {
        cells.keys().fold((*first, *first), |(lo, hi), cell| {
            (
                CellRef::new(lo.row.min(cell.row), lo.col.min(cell.col)),
                CellRef::new(hi.row.max(cell.row), hi.col.max(cell.col)),
            )
        })
    });

    let mut patcher = SheetPatcher {
        writer: Writer::new(Vec::with_capacity(xml.len() + cells.len() * 64)),
        pending,
        row_cells: BTreeMap::new(),
        current_row: 0,
        last_row: None,
        last_col: None,
        in_sheet_data: false,
        skipping_cell: false,
        selected,
        extent,
    };

    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        let event = reader.read_event_into(&mut buf)?;
        if patcher.skipping_cell {
            if let Event::End(e) = &event {
                if e.local_name().as_ref() == b"c" {
                    patcher.skipping_cell = false;
                }
            }
            buf.clear();
            continue;
        }
        match event {
            Event::Eof => break,
            Event::Start(e) => patcher.open(e, false)?,
            Event::Empty(e) => patcher.open(e, true)?,
            Event::End(e) => patcher.close(e)?,
            other => patcher.writer.write_event(other)?,
        }
        buf.clear();
    }
    Ok(patcher.writer.into_inner())
}

/// Streaming merge of written cells into one worksheet part.
struct SheetPatcher<'a> {
    writer: XmlWriter,
    pending: BTreeMap<u32, RowCells<'a>>,
    row_cells: RowCells<'a>,
    current_row: u32,
    last_row: Option<u32>,
    last_col: Option<u16>,
    in_sheet_data: bool,
    skipping_cell: bool,
    selected: bool,
    extent: Option<(CellRef, CellRef)>,
}

impl SheetPatcher<'_> {
    fn open(&mut self, e: BytesStart<'_>, empty: bool) -> ReportResult<()> {
        let local = e.local_name().as_ref().to_vec();
        match local.as_slice() {
            b"sheetView" => {
                let mut out = copy_without(&e, &[b"tabSelected"])?;
                if self.selected {
                    out.push_attribute(("tabSelected", "1"));
                }
                self.emit(out, empty)
            }
            b"dimension" => {
                let out = self.widen_dimension(&e)?;
                self.emit(out, empty)
            }
            b"sheetData" => {
                let end = e.to_end().into_owned();
                self.writer.write_event(Event::Start(e))?;
                if empty {
                    self.flush_rows(None)?;
                    self.writer.write_event(Event::End(end))?;
                } else {
                    self.in_sheet_data = true;
                }
                Ok(())
            }
            b"row" if self.in_sheet_data => self.open_row(e, empty),
            b"c" if self.in_sheet_data => self.open_cell(e, empty),
            _ => self.emit(e, empty),
        }
    }

    fn close(&mut self, e: BytesEnd<'_>) -> ReportResult<()> {
        let local = e.local_name().as_ref().to_vec();
        match local.as_slice() {
            b"row" if self.in_sheet_data => self.flush_row_cells(None)?,
            b"sheetData" => {
                self.flush_rows(None)?;
                self.in_sheet_data = false;
            }
            _ => {}
        }
        self.writer.write_event(Event::End(e))?;
        Ok(())
    }

    fn emit(&mut self, e: BytesStart<'_>, empty: bool) -> ReportResult<()> {
        self.writer
            .write_event(if empty { Event::Empty(e) } else { Event::Start(e) })?;
        Ok(())
    }

    fn open_row(&mut self, e: BytesStart<'_>, empty: bool) -> ReportResult<()> {
        let row = match find_attr(&e, b"r")? {
            Some(number) => number
                .trim()
                .parse::<u32>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .ok_or_else(|| ReportError::Template(format!("invalid row number '{number}'")))?,
            None => self.last_row.map_or(0, |row| row + 1),
        };
        self.flush_rows(Some(row))?;
        self.current_row = row;
        self.last_row = Some(row);
        self.last_col = None;
        self.row_cells = self.pending.remove(&row).unwrap_or_default();
        if self.row_cells.is_empty() {
            return self.emit(e, empty);
        }

        // Cached spans no longer cover the new cells.
        let out = copy_without(&e, &[b"spans"])?;
        let end = e.to_end().into_owned();
        self.writer.write_event(Event::Start(out))?;
        if empty {
            self.flush_row_cells(None)?;
            self.writer.write_event(Event::End(end))?;
        }
        Ok(())
    }

    fn open_cell(&mut self, e: BytesStart<'_>, empty: bool) -> ReportResult<()> {
        let col = match find_attr(&e, b"r")? {
            Some(reference) => CellRef::parse(&reference)
                .map(|cell| cell.col)
                .ok_or_else(|| ReportError::Template(format!("invalid cell '{reference}'")))?,
            None => self.last_col.map_or(0, |col| col + 1),
        };
        self.flush_row_cells(Some(col))?;
        self.last_col = Some(col);
        match self.row_cells.remove(&col) {
            Some(value) => {
                let style = find_attr(&e, b"s")?;
                let cell = CellRef::new(self.current_row, col);
                write_cell(&mut self.writer, cell, value, style.as_deref())?;
                self.skipping_cell = !empty;
                Ok(())
            }
            None => self.emit(e, empty),
        }
    }

    /// Write the pending cells of the current row left of `limit`.
    fn flush_row_cells(&mut self, limit: Option<u16>) -> ReportResult<()> {
        while let Some(entry) = self.row_cells.first_entry() {
            if limit.is_some_and(|limit| *entry.key() >= limit) {
                break;
            }
            let (col, value) = entry.remove_entry();
            write_cell(&mut self.writer, CellRef::new(self.current_row, col), value, None)?;
        }
        Ok(())
    }

    /// Write whole pending rows above `limit`.
    fn flush_rows(&mut self, limit: Option<u32>) -> ReportResult<()> {
        while let Some(entry) = self.pending.first_entry() {
            if limit.is_some_and(|limit| *entry.key() >= limit) {
                break;
            }
            let (row, cells) = entry.remove_entry();
            let number = (row + 1).to_string();
            let mut start = BytesStart::new("row");
            start.push_attribute(("r", number.as_str()));
            self.writer.write_event(Event::Start(start))?;
            for (col, value) in cells {
                write_cell(&mut self.writer, CellRef::new(row, col), value, None)?;
            }
            self.writer.write_event(Event::End(BytesEnd::new("row")))?;
        }
        Ok(())
    }

    fn widen_dimension(&self, e: &BytesStart<'_>) -> ReportResult<BytesStart<'static>> {
        let Some((mut lo, mut hi)) = self.extent else {
            return Ok(e.clone().into_owned());
        };
        if let Some(current) = find_attr(e, b"ref")? {
            let mut bounds = current.split(':').filter_map(CellRef::parse);
            if let Some(first) = bounds.next() {
                let last = bounds.next().unwrap_or(first);
                lo = CellRef::new(lo.row.min(first.row), lo.col.min(first.col));
                hi = CellRef::new(hi.row.max(last.row), hi.col.max(last.col));
            }
        }
        let range = if lo == hi {
            lo.to_string()
        } else {
            format!("{lo}:{hi}")
        };
        let mut out = copy_without(e, &[b"ref"])?;
        out.push_attribute(("ref", range.as_str()));
        Ok(out)
    }
}

/// Days since the 1900 date system epoch, as stored in `<v>`.
fn excel_serial(datetime: &NaiveDateTime) -> f64 {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap_or_default();
    (*datetime - epoch).num_milliseconds() as f64 / 86_400_000.0
}

fn write_text_element(writer: &mut XmlWriter, tag: &str, text: &str) -> ReportResult<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

fn write_cell(
    writer: &mut XmlWriter,
    cell: CellRef,
    value: &CellValue,
    style: Option<&str>,
) -> ReportResult<()> {
    let reference = cell.to_string();
    let mut start = BytesStart::new("c");
    start.push_attribute(("r", reference.as_str()));
    if let Some(style) = style {
        start.push_attribute(("s", style));
    }
    match value {
        CellValue::Number(number) if number.is_finite() => {
            writer.write_event(Event::Start(start))?;
            write_text_element(writer, "v", &number.to_string())?;
        }
        CellValue::Number(_) => {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }
        CellValue::Text(text) => {
            start.push_attribute(("t", "inlineStr"));
            writer.write_event(Event::Start(start))?;
            writer.write_event(Event::Start(BytesStart::new("is")))?;
            let mut run = BytesStart::new("t");
            run.push_attribute(("xml:space", "preserve"));
            writer.write_event(Event::Start(run))?;
            writer.write_event(Event::Text(BytesText::new(text)))?;
            writer.write_event(Event::End(BytesEnd::new("t")))?;
            writer.write_event(Event::End(BytesEnd::new("is")))?;
        }
        CellValue::Bool(flag) => {
            start.push_attribute(("t", "b"));
            writer.write_event(Event::Start(start))?;
            write_text_element(writer, "v", if *flag { "1" } else { "0" })?;
        }
        CellValue::DateTime(datetime) => {
            writer.write_event(Event::Start(start))?;
            write_text_element(writer, "v", &excel_serial(datetime).to_string())?;
        }
        CellValue::Formula(formula) => {
            writer.write_event(Event::Start(start))?;
            write_text_element(writer, "f", formula.trim_start_matches('='))?;
        }
    }
    writer.write_event(Event::End(BytesEnd::new("c")))?;
    Ok(())
}

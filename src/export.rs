use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;

use crate::error::{ReportError, ReportResult};
use crate::package;
use crate::populate::SheetDump;
use crate::template::ReportTemplate;

pub const SUCCESS_MESSAGE: &str = "Archivo procesado con éxito";
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const DOWNLOAD_FILE_NAME: &str = "archivo_procesado.xlsx";

/// JSON body returned for a processed upload.
#[derive(Debug, Clone, Serialize)]
pub struct ReportResponse {
    pub excel_data: SheetDump,
    pub excel_file: String,
    pub message: String,
}

impl ReportResponse {
    pub fn new(dump: SheetDump, workbook: &[u8]) -> Self {
        Self {
            excel_data: dump,
            excel_file: STANDARD.encode(workbook),
            message: SUCCESS_MESSAGE.to_string(),
        }
    }
}

/// Patch the template package with the written cells and sheet visibility.
pub fn write_xlsx(template: &ReportTemplate) -> ReportResult<Vec<u8>> {
    if !template.sheets().iter().any(|sheet| sheet.is_visible()) {
        return Err(ReportError::processing("no worksheet would remain visible"));
    }
    package::rewrite_package(template)
}

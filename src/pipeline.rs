use tracing::info;

use crate::aggregate::RecordTable;
use crate::calendar::HolidayCalendar;
use crate::config::ReportConfig;
use crate::error::ReportResult;
use crate::export::{ReportResponse, write_xlsx};
use crate::ingest::read_upload;
use crate::populate::{SheetDump, populate};
use crate::template::ReportTemplate;
use crate::window::DateWindow;

/// Artifacts of one report run.
#[derive(Debug, Clone)]
pub struct GeneratedReport {
    pub window: DateWindow,
    pub workbook: Vec<u8>,
    pub dump: SheetDump,
    pub touched: Vec<String>,
}

impl GeneratedReport {
    pub fn into_response(self) -> ReportResponse {
        ReportResponse::new(self.dump, &self.workbook)
    }
}

/// Uploaded spreadsheet plus request dates in, finished report out.
///
/// The template is read from `config.template_path` on every call.
pub fn generate_report(
    upload: &[u8],
    start_date: &str,
    end_date: &str,
    config: &ReportConfig,
) -> ReportResult<GeneratedReport> {
    let window = DateWindow::parse(start_date, end_date)?;
    let tables = read_upload(upload, config)?;
    let template = ReportTemplate::open(&config.template_path)?;
    generate_from_template(template, window, &tables.kilometers, &tables.users, config)
}

/// Same as [`generate_report`] with an already loaded template and tables.
pub fn generate_from_template(
    template: ReportTemplate,
    window: DateWindow,
    kilometers: &RecordTable,
    users: &RecordTable,
    config: &ReportConfig,
) -> ReportResult<GeneratedReport> {
    let calendar = HolidayCalendar::for_window(&window, &config.extra_holidays);
    let populated = populate(
        template,
        kilometers,
        users,
        &window,
        &config.routes,
        &calendar,
        config,
    )?;
    let workbook = write_xlsx(&populated.template)?;

    info!(
        start = %window.start(),
        end = %window.end(),
        days = window.len(),
        touched = populated.touched.len(),
        bytes = workbook.len(),
        "report generated"
    );

    Ok(GeneratedReport {
        window,
        workbook,
        dump: populated.dump,
        touched: populated.touched,
    })
}

pub mod aggregate;
pub mod calendar;
pub mod config;
pub mod day_type;
pub mod error;
pub mod export;
pub mod ingest;
mod package;
pub mod pipeline;
pub mod populate;
pub mod routes;
pub mod sheets;
pub mod template;
pub mod window;

#[cfg(feature = "http_api")]
pub mod http_api;

pub use aggregate::{DaySummary, Record, RecordTable, RouteTotal};
pub use calendar::HolidayCalendar;
pub use config::{
    ColumnSpec, ReportConfig, TableLayout, load_config_from_json, save_config_to_json,
};
pub use day_type::{
    DayClassification, DayType, ServiceFactor, classify, service_factor, sheet_day_type,
};
pub use error::{DateParseError, ReportError, ReportResult};
pub use export::{ReportResponse, write_xlsx};
pub use ingest::{UploadedTables, parse_date_text, read_upload};
pub use pipeline::{GeneratedReport, generate_from_template, generate_report};
pub use populate::{PopulatedReport, SheetDump, populate};
pub use routes::RouteCatalog;
pub use sheets::{SheetNaming, SheetSelection, select_sheet_names};
pub use template::{CellRef, CellValue, ReportTemplate, TemplateSheet};
pub use window::{DateWindow, MAX_WINDOW_DAYS};

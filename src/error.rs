use polars::prelude::PolarsError;
use serde_json::Error as SerdeJsonError;
use std::fmt;
use std::io;

#[derive(Debug)]
pub enum ReportError {
    /// Caller-side problem: missing sheet or column, bad date range, unreadable upload.
    InvalidInput(String),
    Template(String),
    Spreadsheet(calamine::Error),
    Package(zip::result::ZipError),
    Xml(quick_xml::Error),
    DataFrame(PolarsError),
    Io(io::Error),
    Serialization(SerdeJsonError),
    Processing(String),
}

impl ReportError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ReportError::InvalidInput(message.into())
    }

    pub fn processing(message: impl Into<String>) -> Self {
        ReportError::Processing(message.into())
    }

    /// Validation failures map to 400, everything else to 500.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ReportError::InvalidInput(_))
    }

    pub fn status_code(&self) -> u16 {
        if self.is_client_error() { 400 } else { 500 }
    }
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            ReportError::Template(msg) => write!(f, "template error: {msg}"),
            ReportError::Spreadsheet(err) => write!(f, "spreadsheet read error: {err}"),
            ReportError::Package(err) => write!(f, "xlsx package error: {err}"),
            ReportError::Xml(err) => write!(f, "xlsx xml error: {err}"),
            ReportError::DataFrame(err) => write!(f, "dataframe error: {err}"),
            ReportError::Io(err) => write!(f, "io error: {err}"),
            ReportError::Serialization(err) => write!(f, "serialization error: {err}"),
            ReportError::Processing(msg) => write!(f, "processing error: {msg}"),
        }
    }
}

impl std::error::Error for ReportError {}

impl From<calamine::Error> for ReportError {
    fn from(value: calamine::Error) -> Self {
        Self::Spreadsheet(value)
    }
}

impl From<calamine::XlsxError> for ReportError {
    fn from(value: calamine::XlsxError) -> Self {
        Self::Spreadsheet(calamine::Error::Xlsx(value))
    }
}

impl From<zip::result::ZipError> for ReportError {
    fn from(value: zip::result::ZipError) -> Self {
        Self::Package(value)
    }
}

impl From<quick_xml::Error> for ReportError {
    fn from(value: quick_xml::Error) -> Self {
        Self::Xml(value)
    }
}

impl From<PolarsError> for ReportError {
    fn from(value: PolarsError) -> Self {
        Self::DataFrame(value)
    }
}

impl From<io::Error> for ReportError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<SerdeJsonError> for ReportError {
    fn from(value: SerdeJsonError) -> Self {
        Self::Serialization(value)
    }
}

pub type ReportResult<T> = Result<T, ReportError>;

/// A single date cell that could not be read as a calendar date.
///
/// Never surfaced to callers: ingestion drops the row and keeps going.
#[derive(Debug, Clone, PartialEq)]
pub struct DateParseError {
    raw: String,
}

impl DateParseError {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for DateParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unparseable date '{}'", self.raw)
    }
}

impl std::error::Error for DateParseError {}

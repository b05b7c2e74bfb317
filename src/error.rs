use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("no contribution limits are configured for year {0}")]
    UnsupportedYear(i32),

    #[error("failed to format the report date: {0}")]
    ReportDate(#[from] time::error::Format),

    #[error("spreadsheet service authentication failed: {0}")]
    SinkAuthentication(String),

    #[error("spreadsheet service write failed: {0}")]
    SinkWrite(String),

    #[error("failed to persist the report workbook: {0}")]
    FilePersistence(String),
}

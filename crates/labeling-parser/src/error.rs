use thiserror::Error;

/// Failure modes of template-driven parsing and the binary / overview
/// writer.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("io error reading `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("spreadsheet error: {0}")]
    Calamine(#[from] calamine::Error),

    #[error("sheet `{0}` not found in workbook")]
    SheetNotFound(String),

    #[error("invalid column locator `{0}`")]
    InvalidLocator(String),

    #[error("column index {0} is out of range (row has {1} columns)")]
    ColumnOutOfRange(usize, usize),

    #[error("x column did not resolve to a numeric series")]
    NonNumericX,

    #[error("failed to parse x value `{0}` as a time: {1}")]
    TimeParseFailure(String, String),

    #[error("mandatory channel `{0}` was not found")]
    ChannelMissing(String),

    #[error("file has no data rows after header/skip")]
    EmptyFile,

    #[error("unsupported file type `{0}`")]
    UnsupportedFileType(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("writing output failed: {0}")]
    WriteFailed(String),
}

pub type Result<T> = std::result::Result<T, ParseError>;

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to open document container: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("malformed document XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("document part '{0}' is missing")]
    MissingPart(String),

    #[error("document part '{part}' is not valid UTF-8")]
    InvalidEncoding { part: String },

    #[error("{what} exceeds the limit of {limit}")]
    LimitExceeded { what: &'static str, limit: usize },

    #[error("invalid option: {0}")]
    InvalidOption(String),
}

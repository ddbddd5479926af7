use thiserror::Error;

#[derive(Error, Debug)]
pub enum VigieError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O failed on {path}: {source}")]
    FileError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing failed: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Registry row {row} is malformed: {reason}")]
    MalformedRow { row: usize, reason: String },

    #[error("HTTP client setup failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl VigieError {
    pub(crate) fn file(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        VigieError::FileError {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, VigieError>;

use thiserror::Error;
use std::path::PathBuf;

#[derive(Error, Debug)]
pub enum DataHubError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Date parsing error: {0}")]
    DateError(String),

    #[error("Number parsing error: {0}")]
    NumberError(String),

    #[error("Dataset {} cannot be merged: {reason}", .path.display())]
    MergeError { path: PathBuf, reason: String },

    #[error("Dataset directory is locked by another run: {}", .0.display())]
    Locked(PathBuf),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Data error: {0}")]
    DataError(String),
}

pub type Result<T> = std::result::Result<T, DataHubError>;

// 用于从字符串创建错误
impl From<String> for DataHubError {
    fn from(s: String) -> Self {
        DataHubError::DataError(s)
    }
}

impl From<&str> for DataHubError {
    fn from(s: &str) -> Self {
        DataHubError::DataError(s.to_string())
    }
}

//! Error types, one enum per layer.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to read key '{key}' from {path}: {source}")]
    Read {
        key: String,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write key '{key}' to {path}: {source}")]
    Write {
        key: String,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize value for key '{key}': {source}")]
    Serialize {
        key: String,
        source: serde_json::Error,
    },

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("invalid request: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("transport error: {0}")]
    Transport(#[from] hyper::Error),

    #[error("service responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("task parsing is disabled")]
    Disabled,

    #[error("parser returned no usable title")]
    EmptyTitle,

    #[error("parser timed out after {0} ms")]
    Timeout(u64),

    #[error("parser request failed: {0}")]
    Http(#[from] HttpError),

    #[error("invalid parser endpoint '{0}'")]
    InvalidEndpoint(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine a data directory; pass --data-dir or set TODOLAB_DATA_DIR")]
    NoDataDir,

    #[error("failed to create data directory {path}: {source}")]
    CreateDataDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("task title must not be empty")]
    EmptyTitle,

    #[error("no task matches id '{0}'")]
    UnknownTask(String),

    #[error("id '{prefix}' is ambiguous ({count} tasks match)")]
    AmbiguousTask { prefix: String, count: usize },

    #[error("nothing to update")]
    EmptyPatch,

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

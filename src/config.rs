use crate::error::ConfigError;
use std::env;
use std::fs;
use std::path::PathBuf;

pub const DATA_DIR_ENV: &str = "TODOLAB_DATA_DIR";
pub const PARSER_URL_ENV: &str = "TODOLAB_PARSER_URL";
pub const LOG_ENV: &str = "TODOLAB_LOG";

/// Process-level configuration resolved from flags and the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub parser_endpoint: Option<String>,
    pub log_filter: String,
}

impl Config {
    /// Data directory precedence: `--data-dir`, then `TODOLAB_DATA_DIR`, then
    /// the platform data directory.
    pub fn resolve(cli_data_dir: Option<PathBuf>, verbose: bool) -> Result<Self, ConfigError> {
        let data_dir = match cli_data_dir.or_else(|| env_path(DATA_DIR_ENV)) {
            Some(dir) => dir,
            None => default_data_dir()?,
        };
        let parser_endpoint = env::var(PARSER_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty());
        let log_filter = if verbose {
            "debug".to_string()
        } else {
            env::var(LOG_ENV).unwrap_or_else(|_| "warn".to_string())
        };
        Ok(Self {
            data_dir,
            parser_endpoint,
            log_filter,
        })
    }

    pub fn ensure_data_dir(&self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.data_dir).map_err(|source| ConfigError::CreateDataDir {
            path: self.data_dir.clone(),
            source,
        })
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    env::var_os(name)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn default_data_dir() -> Result<PathBuf, ConfigError> {
    let base = dirs::data_dir().ok_or(ConfigError::NoDataDir)?;
    Ok(base.join("todolab"))
}

use crate::task_model::Filter;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_PARSER_TIMEOUT_MS: u64 = 5_000;

/// User preferences persisted under the settings key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub parse_enabled: bool,
    pub parser_endpoint: Option<String>,
    pub parser_timeout_ms: u64,
    pub default_filter: Filter,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            parse_enabled: true,
            parser_endpoint: None,
            parser_timeout_ms: DEFAULT_PARSER_TIMEOUT_MS,
            default_filter: Filter::All,
        }
    }
}

impl Settings {
    pub fn parser_timeout(&self) -> Duration {
        Duration::from_millis(self.parser_timeout_ms)
    }
}

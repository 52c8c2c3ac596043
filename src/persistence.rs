//! Bridges in-memory collections to a [`KeyValueStore`].
//!
//! Loads fail soft: a missing or unreadable key yields an empty collection and
//! a record that cannot be decoded is skipped on its own. Saves replace the
//! whole key and log failures instead of returning them.

use crate::error::StorageError;
use crate::settings::Settings;
use crate::storage::{KeyValueStore, CHAT_HISTORY_KEY, SETTINGS_KEY, TASKS_KEY};
use crate::task_model::{ChatMessage, Task};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

pub const MAX_CHAT_HISTORY: usize = 100;

#[derive(Clone)]
pub struct PersistenceAdapter {
    store: Arc<dyn KeyValueStore>,
    history_limit: usize,
}

impl PersistenceAdapter {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            history_limit: MAX_CHAT_HISTORY,
        }
    }

    pub fn load_tasks(&self) -> Vec<Task> {
        self.load_records::<Task>(TASKS_KEY)
            .into_iter()
            .filter(|task| {
                let keep = !task.title.trim().is_empty();
                if !keep {
                    tracing::warn!(id = %task.id, "skipping stored task with empty title");
                }
                keep
            })
            .collect()
    }

    pub fn load_messages(&self) -> Vec<ChatMessage> {
        self.load_records(CHAT_HISTORY_KEY)
    }

    pub fn load_settings(&self) -> Settings {
        let Some(raw) = self.read_key(SETTINGS_KEY) else {
            return Settings::default();
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("stored settings are unreadable, using defaults: {}", e);
                Settings::default()
            }
        }
    }

    pub fn save_tasks(&self, tasks: &[Task]) {
        self.write_logged(TASKS_KEY, tasks);
    }

    /// Keeps only the newest messages, in their original order.
    pub fn save_messages(&self, messages: &[ChatMessage]) {
        let start = messages.len().saturating_sub(self.history_limit);
        self.write_logged(CHAT_HISTORY_KEY, &messages[start..]);
    }

    pub fn save_settings(&self, settings: &Settings) {
        self.write_logged(SETTINGS_KEY, settings);
    }

    fn read_key(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("failed to read '{}': {}", key, e);
                None
            }
        }
    }

    fn load_records<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        let Some(raw) = self.read_key(key) else {
            return Vec::new();
        };
        let records = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(records)) => records,
            Ok(other) => {
                tracing::warn!("expected a JSON array under '{}', found {}", key, json_kind(&other));
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!("stored value under '{}' is not valid JSON: {}", key, e);
                return Vec::new();
            }
        };

        let total = records.len();
        let loaded: Vec<T> = records
            .into_iter()
            .enumerate()
            .filter_map(|(index, record)| match serde_json::from_value(record) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::warn!("skipping corrupt record {} under '{}': {}", index, key, e);
                    None
                }
            })
            .collect();
        tracing::debug!(key, loaded = loaded.len(), total, "restored collection");
        loaded
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let json = serde_json::to_string(value).map_err(|source| StorageError::Serialize {
            key: key.to_string(),
            source,
        })?;
        self.store.set(key, &json)
    }

    fn write_logged<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        if let Err(e) = self.write(key, value) {
            tracing::error!("failed to persist '{}': {}", key, e);
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

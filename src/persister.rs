//! Background write queue.
//!
//! Snapshots are full-collection replacements, so when several are queued for
//! the same collection only the newest is written. Writes run one at a time.

use crate::persistence::PersistenceAdapter;
use crate::settings::Settings;
use crate::task_model::{ChatMessage, Task};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub enum Snapshot {
    Tasks(Vec<Task>),
    Messages(Vec<ChatMessage>),
    Settings(Settings),
}

#[derive(Default)]
struct Pending {
    tasks: Option<Vec<Task>>,
    messages: Option<Vec<ChatMessage>>,
    settings: Option<Settings>,
}

impl Pending {
    fn absorb(&mut self, snapshot: Snapshot) {
        match snapshot {
            Snapshot::Tasks(tasks) => self.tasks = Some(tasks),
            Snapshot::Messages(messages) => self.messages = Some(messages),
            Snapshot::Settings(settings) => self.settings = Some(settings),
        }
    }
}

pub struct Persister {
    tx: UnboundedSender<Snapshot>,
    worker: JoinHandle<()>,
}

impl Persister {
    /// Must be called from within a tokio runtime.
    pub fn spawn(adapter: PersistenceAdapter) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run(adapter, rx));
        Self { tx, worker }
    }

    pub fn submit(&self, snapshot: Snapshot) {
        if self.tx.send(snapshot).is_err() {
            tracing::error!("persistence worker has stopped; dropping snapshot");
        }
    }

    /// Waits until every submitted snapshot has been written.
    pub async fn flush(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            tracing::error!("persistence worker failed: {}", e);
        }
    }
}

async fn run(adapter: PersistenceAdapter, mut rx: UnboundedReceiver<Snapshot>) {
    while let Some(first) = rx.recv().await {
        let mut pending = Pending::default();
        pending.absorb(first);
        while let Ok(next) = rx.try_recv() {
            pending.absorb(next);
        }

        let adapter = adapter.clone();
        let written = tokio::task::spawn_blocking(move || {
            if let Some(tasks) = pending.tasks {
                adapter.save_tasks(&tasks);
            }
            if let Some(messages) = pending.messages {
                adapter.save_messages(&messages);
            }
            if let Some(settings) = pending.settings {
                adapter.save_settings(&settings);
            }
        })
        .await;
        if let Err(e) = written {
            tracing::error!("persistence write panicked: {}", e);
        }
    }
    tracing::debug!("persistence worker drained");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::storage::{KeyValueStore, MemoryStore, TASKS_KEY};
    use chrono::{TimeZone, Utc};

    fn task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            title: format!("task {}", id),
            completed: false,
            created_at: Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(),
            due_date: None,
            priority: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_last_snapshot_wins() {
        let store = Arc::new(MemoryStore::new());
        let adapter = PersistenceAdapter::new(store.clone());
        let persister = Persister::spawn(adapter.clone());

        persister.submit(Snapshot::Tasks(vec![task("1")]));
        persister.submit(Snapshot::Tasks(vec![task("1"), task("2")]));
        persister.submit(Snapshot::Tasks(vec![task("2")]));
        persister.flush().await;

        let ids: Vec<String> = adapter.load_tasks().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["2".to_string()]);
        assert!(store.get(TASKS_KEY).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_flush_with_nothing_submitted() {
        let adapter = PersistenceAdapter::new(Arc::new(MemoryStore::new()));
        let persister = Persister::spawn(adapter.clone());
        persister.flush().await;
        assert!(adapter.load_tasks().is_empty());
    }
}

//! Composition root: the single owner of application state.
//!
//! Every mutation goes through [`App::dispatch`], which runs the reducer and
//! hands changed collections to the background [`Persister`]. The parser call
//! in [`App::add_task`] is the only await point; its result is applied after
//! the await, so dropping the future mid-call applies nothing. The loading
//! flag is lowered by `LoadingGuard` on every exit path, including a drop.

use crate::clock::{Clock, IdGenerator};
use crate::error::AppError;
use crate::persistence::PersistenceAdapter;
use crate::persister::{Persister, Snapshot};
use crate::settings::Settings;
use crate::state::{Action, AppState, Changes, Store};
use crate::task_model::{Role, Task, TaskAttrs};
use crate::task_parser::{parse_or_literal, ParsedTask, TaskParser};

pub struct App {
    store: Store,
    persister: Persister,
    parser: Box<dyn TaskParser>,
    settings: Settings,
}

impl App {
    /// Restores persisted state. Must be called from within a tokio runtime.
    pub fn open(
        adapter: PersistenceAdapter,
        clock: Box<dyn Clock>,
        ids: Box<dyn IdGenerator>,
        parser: Box<dyn TaskParser>,
        settings: Settings,
    ) -> Self {
        let tasks = adapter.load_tasks();
        let messages = adapter.load_messages();
        tracing::debug!(tasks = tasks.len(), messages = messages.len(), "restored state");

        let mut store = Store::new(clock, ids);
        store.dispatch(Action::ReplaceTasks(tasks));
        store.dispatch(Action::ReplaceMessages(messages));
        store.dispatch(Action::SetFilter(settings.default_filter));

        Self {
            store,
            persister: Persister::spawn(adapter),
            parser,
            settings,
        }
    }

    pub fn state(&self) -> &AppState {
        self.store.state()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn clock(&self) -> &dyn Clock {
        self.store.clock()
    }

    pub fn dispatch(&mut self, action: Action) -> Changes {
        let changes = self.store.dispatch(action);
        if changes.tasks {
            self.persister
                .submit(Snapshot::Tasks(self.store.state().tasks.clone()));
        }
        if changes.messages {
            self.persister
                .submit(Snapshot::Messages(self.store.state().messages.clone()));
        }
        changes
    }

    /// Creates a task from free text, falling back to the literal input when
    /// parsing fails. Returns the new task's id.
    pub async fn add_task(&mut self, input: &str) -> Result<String, AppError> {
        if input.trim().is_empty() {
            return Err(AppError::EmptyTitle);
        }
        let parsed = self.parse_input(input).await;
        self.add_parsed(parsed)
    }

    /// Runs the parser with the loading flag raised. Never fails; see
    /// [`parse_or_literal`].
    pub async fn parse_input(&mut self, input: &str) -> ParsedTask {
        let guard = LoadingGuard::raise(self);
        let app = &*guard.app;
        let parsed =
            parse_or_literal(app.parser.as_ref(), input, app.settings.parser_timeout()).await;
        drop(guard);
        parsed
    }

    /// Creates a task from already-structured input without consulting the parser.
    pub fn add_parsed(&mut self, parsed: ParsedTask) -> Result<String, AppError> {
        if parsed.title.trim().is_empty() {
            return Err(AppError::EmptyTitle);
        }
        let (title, attrs) = parsed.into_attrs();
        self.add_with_attrs(title, attrs)
    }

    pub fn add_with_attrs(&mut self, title: String, attrs: TaskAttrs) -> Result<String, AppError> {
        if title.trim().is_empty() {
            return Err(AppError::EmptyTitle);
        }
        let changes = self.dispatch(Action::AddTask { title, attrs });
        match self.state().tasks.last() {
            Some(task) if changes.tasks => Ok(task.id.clone()),
            _ => Err(AppError::EmptyTitle),
        }
    }

    /// Records the exchange in the transcript and turns the text into a task.
    pub async fn send_chat(&mut self, input: &str) -> Result<Task, AppError> {
        if input.trim().is_empty() {
            return Err(AppError::EmptyTitle);
        }
        self.dispatch(Action::AddMessage {
            role: Role::User,
            content: input.trim().to_string(),
        });
        let id = self.add_task(input).await?;
        let task = self
            .state()
            .task(&id)
            .cloned()
            .ok_or_else(|| AppError::UnknownTask(id.clone()))?;
        self.dispatch(Action::AddMessage {
            role: Role::Assistant,
            content: describe_added(&task),
        });
        Ok(task)
    }

    /// Accepts a full id or a unique prefix of one.
    pub fn resolve_task_id(&self, query: &str) -> Result<String, AppError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::UnknownTask(query.to_string()));
        }
        if let Some(task) = self.state().task(query) {
            return Ok(task.id.clone());
        }
        let matches: Vec<&Task> = self
            .state()
            .tasks
            .iter()
            .filter(|t| t.id.starts_with(query))
            .collect();
        match matches.as_slice() {
            [task] => Ok(task.id.clone()),
            [] => Err(AppError::UnknownTask(query.to_string())),
            many => Err(AppError::AmbiguousTask {
                prefix: query.to_string(),
                count: many.len(),
            }),
        }
    }

    pub fn update_settings(&mut self, settings: Settings) {
        self.persister.submit(Snapshot::Settings(settings.clone()));
        self.settings = settings;
    }

    /// Waits for queued writes to land.
    pub async fn shutdown(self) {
        self.persister.flush().await;
    }
}

/// Holds the loading flag up for as long as it lives.
struct LoadingGuard<'a> {
    app: &'a mut App,
}

impl<'a> LoadingGuard<'a> {
    fn raise(app: &'a mut App) -> Self {
        app.dispatch(Action::SetLoading(true));
        Self { app }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.app.dispatch(Action::SetLoading(false));
    }
}

fn describe_added(task: &Task) -> String {
    let mut reply = format!("Added \"{}\"", task.title);
    if let Some(due) = task.due_date {
        reply.push_str(&format!(", due {}", due.format("%Y-%m-%d")));
    }
    if let Some(priority) = task.priority {
        reply.push_str(&format!(", {} priority", priority));
    }
    reply.push('.');
    reply
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{SequentialIds, SteppingClock};
    use crate::error::ParseError;
    use crate::storage::MemoryStore;
    use crate::task_model::{Filter, Priority};
    use crate::task_parser::{DisabledParser, RuleTaskParser};
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;

    fn clock() -> SteppingClock {
        SteppingClock::new(
            Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap(),
            Duration::seconds(1),
        )
    }

    fn open_app(store: Arc<MemoryStore>, parser: Box<dyn TaskParser>, settings: Settings) -> App {
        App::open(
            PersistenceAdapter::new(store),
            Box::new(clock()),
            Box::new(SequentialIds::new("id")),
            parser,
            settings,
        )
    }

    fn rule_parser() -> Box<dyn TaskParser> {
        Box::new(RuleTaskParser::new(Arc::new(clock())).unwrap())
    }

    #[tokio::test]
    async fn test_add_task_parses_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let mut app = open_app(store.clone(), rule_parser(), Settings::default());

        let id = app.add_task("pay invoice due:2024-06-20 !high").await.unwrap();
        assert!(!app.state().loading);
        let task = app.state().task(&id).unwrap().clone();
        assert_eq!(task.title, "pay invoice");
        assert_eq!(task.priority, Some(Priority::High));
        app.shutdown().await;

        let restored = PersistenceAdapter::new(store).load_tasks();
        assert_eq!(restored, vec![task]);
    }

    struct SlowParser;

    #[async_trait::async_trait]
    impl TaskParser for SlowParser {
        async fn parse(&self, input: &str) -> Result<ParsedTask, ParseError> {
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            Ok(ParsedTask::literal(input))
        }
    }

    #[tokio::test]
    async fn test_abandoned_add_clears_loading_and_adds_nothing() {
        let mut app = open_app(Arc::new(MemoryStore::new()), Box::new(SlowParser), Settings::default());

        let outcome =
            tokio::time::timeout(std::time::Duration::from_millis(50), app.add_task("late")).await;
        assert!(outcome.is_err());
        assert!(app.state().tasks.is_empty());
        assert!(!app.state().loading);
        app.shutdown().await;
    }

    #[tokio::test]
    async fn test_add_task_rejects_blank_input() {
        let mut app = open_app(Arc::new(MemoryStore::new()), Box::new(DisabledParser), Settings::default());
        assert!(matches!(app.add_task("   ").await, Err(AppError::EmptyTitle)));
        assert!(app.state().tasks.is_empty());
    }

    #[tokio::test]
    async fn test_send_chat_records_both_sides() {
        let mut app = open_app(Arc::new(MemoryStore::new()), rule_parser(), Settings::default());
        let task = app.send_chat("book flights !medium").await.unwrap();
        assert_eq!(task.title, "book flights");

        let messages = &app.state().messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "book flights !medium");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "Added \"book flights\", medium priority.");
    }

    #[tokio::test]
    async fn test_open_restores_state_and_default_filter() {
        let store = Arc::new(MemoryStore::new());
        let mut app = open_app(store.clone(), Box::new(DisabledParser), Settings::default());
        app.add_task("first").await.unwrap();
        app.send_chat("second").await.unwrap();
        app.shutdown().await;

        let settings = Settings {
            default_filter: Filter::Active,
            ..Settings::default()
        };
        let app = open_app(store, Box::new(DisabledParser), settings);
        let titles: Vec<&str> = app.state().tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["first", "second"]);
        assert_eq!(app.state().messages.len(), 2);
        assert_eq!(app.state().filter, Filter::Active);
        app.shutdown().await;
    }

    #[tokio::test]
    async fn test_resolve_task_id() {
        let mut app = open_app(Arc::new(MemoryStore::new()), Box::new(DisabledParser), Settings::default());
        for title in ["a", "b"] {
            app.add_task(title).await.unwrap();
        }
        assert_eq!(app.resolve_task_id("id-2").unwrap(), "id-2");
        assert!(matches!(
            app.resolve_task_id("id-"),
            Err(AppError::AmbiguousTask { count: 2, .. })
        ));
        assert!(matches!(app.resolve_task_id("zzz"), Err(AppError::UnknownTask(_))));
        app.shutdown().await;
    }

    #[tokio::test]
    async fn test_update_settings_persists() {
        let store = Arc::new(MemoryStore::new());
        let mut app = open_app(store.clone(), Box::new(DisabledParser), Settings::default());
        let settings = Settings {
            parse_enabled: false,
            ..Settings::default()
        };
        app.update_settings(settings.clone());
        app.shutdown().await;
        assert_eq!(PersistenceAdapter::new(store).load_settings(), settings);
    }
}

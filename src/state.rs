use crate::clock::{Clock, IdGenerator};
use crate::task_model::{ChatMessage, Filter, Role, Task, TaskAttrs, TaskPatch};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppState {
    pub tasks: Vec<Task>,
    pub filter: Filter,
    pub messages: Vec<ChatMessage>,
    pub loading: bool,
}

impl AppState {
    pub fn filtered_tasks(&self) -> Vec<&Task> {
        filtered_tasks(&self.tasks, self.filter)
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    AddTask { title: String, attrs: TaskAttrs },
    ToggleTask { id: String },
    DeleteTask { id: String },
    UpdateTask { id: String, patch: TaskPatch },
    SetFilter(Filter),
    ReplaceTasks(Vec<Task>),
    AddMessage { role: Role, content: String },
    ReplaceMessages(Vec<ChatMessage>),
    SetLoading(bool),
}

/// External inputs the reducer is allowed to consult.
pub struct Context<'a> {
    pub clock: &'a dyn Clock,
    pub ids: &'a mut dyn IdGenerator,
}

pub fn filtered_tasks(tasks: &[Task], filter: Filter) -> Vec<&Task> {
    tasks.iter().filter(|t| filter.matches(t)).collect()
}

// Unknown ids and blank titles fall through as no-ops.
pub fn reduce(state: &AppState, action: Action, ctx: &mut Context<'_>) -> AppState {
    let mut next = state.clone();
    match action {
        Action::AddTask { title, attrs } => {
            if title.trim().is_empty() {
                return next;
            }
            next.tasks.push(Task {
                id: ctx.ids.next_id(),
                title,
                completed: false,
                created_at: ctx.clock.now(),
                due_date: attrs.due_date,
                priority: attrs.priority,
                notes: attrs.notes,
            });
        }
        Action::ToggleTask { id } => {
            if let Some(task) = next.tasks.iter_mut().find(|t| t.id == id) {
                task.completed = !task.completed;
            }
        }
        Action::DeleteTask { id } => {
            if let Some(index) = next.tasks.iter().position(|t| t.id == id) {
                next.tasks.remove(index);
            }
        }
        Action::UpdateTask { id, patch } => {
            if let Some(task) = next.tasks.iter_mut().find(|t| t.id == id) {
                apply_patch(task, patch);
            }
        }
        Action::SetFilter(filter) => next.filter = filter,
        Action::ReplaceTasks(tasks) => next.tasks = tasks,
        Action::AddMessage { role, content } => {
            next.messages.push(ChatMessage {
                id: ctx.ids.next_id(),
                role,
                content,
                timestamp: ctx.clock.now(),
            });
        }
        Action::ReplaceMessages(messages) => next.messages = messages,
        Action::SetLoading(loading) => next.loading = loading,
    }
    next
}

fn apply_patch(task: &mut Task, patch: TaskPatch) {
    if let Some(title) = patch.title {
        if !title.trim().is_empty() {
            task.title = title;
        }
    }
    if let Some(due_date) = patch.due_date {
        task.due_date = due_date;
    }
    if let Some(priority) = patch.priority {
        task.priority = priority;
    }
    if let Some(notes) = patch.notes {
        task.notes = notes;
    }
}

/// Which persisted collections a dispatch touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Changes {
    pub tasks: bool,
    pub messages: bool,
}

impl Changes {
    pub fn any(&self) -> bool {
        self.tasks || self.messages
    }
}

/// Owns the application state together with its injected clock and id source.
pub struct Store {
    state: AppState,
    clock: Box<dyn Clock>,
    ids: Box<dyn IdGenerator>,
}

impl Store {
    pub fn new(clock: Box<dyn Clock>, ids: Box<dyn IdGenerator>) -> Self {
        Self::with_state(AppState::default(), clock, ids)
    }

    pub fn with_state(state: AppState, clock: Box<dyn Clock>, ids: Box<dyn IdGenerator>) -> Self {
        Self { state, clock, ids }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn dispatch(&mut self, action: Action) -> Changes {
        tracing::trace!(?action, "dispatch");
        let mut ctx = Context {
            clock: self.clock.as_ref(),
            ids: self.ids.as_mut(),
        };
        let next = reduce(&self.state, action, &mut ctx);
        let changes = Changes {
            tasks: next.tasks != self.state.tasks,
            messages: next.messages != self.state.messages,
        };
        self.state = next;
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{SequentialIds, SteppingClock};
    use crate::task_model::Priority;
    use chrono::{Duration, TimeZone, Utc};

    fn test_store() -> Store {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        Store::new(
            Box::new(SteppingClock::new(start, Duration::minutes(1))),
            Box::new(SequentialIds::new("t")),
        )
    }

    fn add(store: &mut Store, title: &str) -> String {
        store.dispatch(Action::AddTask {
            title: title.to_string(),
            attrs: TaskAttrs::default(),
        });
        store.state().tasks.last().unwrap().id.clone()
    }

    #[test]
    fn test_add_task_assigns_id_and_timestamp() {
        let mut store = test_store();
        let changes = store.dispatch(Action::AddTask {
            title: "Buy milk".to_string(),
            attrs: TaskAttrs {
                priority: Some(Priority::Low),
                ..TaskAttrs::default()
            },
        });
        assert!(changes.tasks);
        assert!(!changes.messages);
        let task = &store.state().tasks[0];
        assert_eq!(task.id, "t-1");
        assert_eq!(task.title, "Buy milk");
        assert!(!task.completed);
        assert_eq!(task.created_at, Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap());
        assert_eq!(task.priority, Some(Priority::Low));
    }

    #[test]
    fn test_add_task_with_blank_title_is_noop() {
        let mut store = test_store();
        let changes = store.dispatch(Action::AddTask {
            title: "   ".to_string(),
            attrs: TaskAttrs::default(),
        });
        assert!(!changes.any());
        assert!(store.state().tasks.is_empty());
    }

    #[test]
    fn test_toggle_twice_restores_state() {
        let mut store = test_store();
        let id = add(&mut store, "A");
        store.dispatch(Action::ToggleTask { id: id.clone() });
        assert!(store.state().task(&id).unwrap().completed);
        store.dispatch(Action::ToggleTask { id: id.clone() });
        assert!(!store.state().task(&id).unwrap().completed);
    }

    #[test]
    fn test_unknown_id_is_noop() {
        let mut store = test_store();
        add(&mut store, "A");
        let before = store.state().clone();
        let changes = store.dispatch(Action::ToggleTask { id: "missing".to_string() });
        assert!(!changes.any());
        store.dispatch(Action::DeleteTask { id: "missing".to_string() });
        store.dispatch(Action::UpdateTask {
            id: "missing".to_string(),
            patch: TaskPatch {
                title: Some("X".to_string()),
                ..TaskPatch::default()
            },
        });
        assert_eq!(store.state(), &before);
    }

    #[test]
    fn test_update_merges_and_clears_fields() {
        let mut store = test_store();
        let due = Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap();
        store.dispatch(Action::AddTask {
            title: "Draft".to_string(),
            attrs: TaskAttrs {
                due_date: Some(due),
                priority: Some(Priority::High),
                notes: Some("first pass".to_string()),
            },
        });
        let original = store.state().tasks[0].clone();

        store.dispatch(Action::UpdateTask {
            id: original.id.clone(),
            patch: TaskPatch {
                title: Some("Final".to_string()),
                due_date: Some(None),
                priority: None,
                notes: Some(Some("second pass".to_string())),
            },
        });

        let updated = &store.state().tasks[0];
        assert_eq!(updated.id, original.id);
        assert_eq!(updated.created_at, original.created_at);
        assert_eq!(updated.completed, original.completed);
        assert_eq!(updated.title, "Final");
        assert_eq!(updated.due_date, None);
        assert_eq!(updated.priority, Some(Priority::High));
        assert_eq!(updated.notes.as_deref(), Some("second pass"));
    }

    #[test]
    fn test_update_ignores_blank_title() {
        let mut store = test_store();
        let id = add(&mut store, "Keep me");
        store.dispatch(Action::UpdateTask {
            id: id.clone(),
            patch: TaskPatch {
                title: Some("".to_string()),
                ..TaskPatch::default()
            },
        });
        assert_eq!(store.state().task(&id).unwrap().title, "Keep me");
    }

    #[test]
    fn test_delete_removes_only_matching_task() {
        let mut store = test_store();
        let a = add(&mut store, "A");
        let b = add(&mut store, "B");
        let c = add(&mut store, "C");
        store.dispatch(Action::ToggleTask { id: c.clone() });
        let before: Vec<Task> = store.state().tasks.clone();

        store.dispatch(Action::DeleteTask { id: b });

        let after = &store.state().tasks;
        assert_eq!(after.len(), 2);
        assert_eq!(after[0], before[0]);
        assert_eq!(after[1], before[2]);
        assert_eq!(after[0].id, a);
    }

    #[test]
    fn test_filtered_view() {
        let mut store = test_store();
        let a = add(&mut store, "A");
        let b = add(&mut store, "B");
        store.dispatch(Action::ToggleTask { id: b.clone() });

        let ids = |filter: Filter, store: &Store| -> Vec<String> {
            filtered_tasks(&store.state().tasks, filter)
                .into_iter()
                .map(|t| t.id.clone())
                .collect()
        };
        assert_eq!(ids(Filter::Active, &store), vec![a.clone()]);
        assert_eq!(ids(Filter::Completed, &store), vec![b.clone()]);
        assert_eq!(ids(Filter::All, &store), vec![a, b]);

        store.dispatch(Action::SetFilter(Filter::Completed));
        assert_eq!(store.state().filtered_tasks().len(), 1);
    }

    #[test]
    fn test_messages_and_loading() {
        let mut store = test_store();
        let changes = store.dispatch(Action::AddMessage {
            role: Role::User,
            content: "hello".to_string(),
        });
        assert!(changes.messages);
        assert_eq!(store.state().messages[0].id, "t-1");

        let changes = store.dispatch(Action::SetLoading(true));
        assert!(!changes.any());
        assert!(store.state().loading);

        store.dispatch(Action::ReplaceMessages(Vec::new()));
        assert!(store.state().messages.is_empty());
    }

    #[test]
    fn test_replay_is_deterministic() {
        let actions = vec![
            Action::AddTask { title: "A".to_string(), attrs: TaskAttrs::default() },
            Action::AddTask { title: "B".to_string(), attrs: TaskAttrs::default() },
            Action::ToggleTask { id: "t-1".to_string() },
            Action::AddMessage { role: Role::Assistant, content: "ok".to_string() },
            Action::DeleteTask { id: "t-2".to_string() },
            Action::SetFilter(Filter::Active),
        ];
        let mut first = test_store();
        let mut second = test_store();
        for action in actions {
            first.dispatch(action.clone());
            second.dispatch(action);
        }
        assert_eq!(first.state(), second.state());
    }
}

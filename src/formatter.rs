use crate::task_model::{ChatMessage, Task};

fn status_char(task: &Task) -> char {
    if task.completed {
        'x'
    } else {
        ' '
    }
}

// The leading "- " marker is added by the caller.
fn format_task_core_content(task: &Task) -> String {
    let mut parts: Vec<String> = vec![format!("[{}] {}", status_char(task), task.title)];

    if let Some(priority) = task.priority {
        parts.push(format!("({})", priority));
    }
    if let Some(due_date) = task.due_date {
        parts.push(format!("due:{}", due_date.format("%Y-%m-%d")));
    }
    parts.push(format!("id:{}", task.short_id()));

    parts.join(" ")
}

pub fn format_task_line(task: &Task) -> String {
    let mut lines = vec![format!("- {}", format_task_core_content(task))];
    if let Some(notes) = task.notes.as_deref().filter(|n| !n.is_empty()) {
        lines.push(format!("    note:\"{}\"", notes.replace('"', "\"\"")));
    }
    lines.join("\n")
}

pub fn format_task_list<'a, I>(tasks: I) -> String
where
    I: IntoIterator<Item = &'a Task>,
{
    tasks
        .into_iter()
        .map(format_task_line)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("[{}] {}: {}", m.timestamp.format("%Y-%m-%d %H:%M"), m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

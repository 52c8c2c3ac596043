//! Free-text to structured task conversion.
//!
//! Parsers are black boxes to the rest of the crate. Callers go through
//! [`parse_or_literal`], which never loses the user's input: any failure turns
//! into a task titled with the raw text.

use crate::clock::Clock;
use crate::error::ParseError;
use crate::http_client::JsonClient;
use crate::task_model::{Priority, TaskAttrs};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use hyper::Uri;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTask {
    pub title: String,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Option<Priority>,
}

impl ParsedTask {
    pub fn literal(input: &str) -> Self {
        Self {
            title: input.trim().to_string(),
            due_date: None,
            priority: None,
        }
    }

    pub fn into_attrs(self) -> (String, TaskAttrs) {
        let attrs = TaskAttrs {
            due_date: self.due_date,
            priority: self.priority,
            notes: None,
        };
        (self.title, attrs)
    }
}

#[async_trait]
pub trait TaskParser: Send + Sync {
    async fn parse(&self, input: &str) -> Result<ParsedTask, ParseError>;
}

pub async fn parse_or_literal(
    parser: &dyn TaskParser,
    input: &str,
    timeout: std::time::Duration,
) -> ParsedTask {
    let result = match tokio::time::timeout(timeout, parser.parse(input)).await {
        Ok(result) => result,
        Err(_) => Err(ParseError::Timeout(timeout.as_millis() as u64)),
    };
    match result {
        Ok(parsed) if !parsed.title.trim().is_empty() => parsed,
        Ok(_) => {
            tracing::warn!("parser returned an empty title; keeping input as written");
            ParsedTask::literal(input)
        }
        Err(ParseError::Disabled) => ParsedTask::literal(input),
        Err(e) => {
            tracing::warn!("task parsing failed, keeping input as written: {}", e);
            ParsedTask::literal(input)
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledParser;

#[async_trait]
impl TaskParser for DisabledParser {
    async fn parse(&self, _input: &str) -> Result<ParsedTask, ParseError> {
        Err(ParseError::Disabled)
    }
}

// Date forms: YYYY-MM-DD, YYYY/MM/DD, MM/DD or M/D (current year), today, tomorrow.
const DUE_TOKEN_RE_STR: &str =
    r#"^(?i)due:(?P<due_val>\d{4}[-/]\d{1,2}[-/]\d{1,2}|\d{1,2}/\d{1,2}|today|tomorrow)$"#;
const PRIORITY_TOKEN_RE_STR: &str = r#"^(?i)!(?P<priority_val>low|med|medium|high)$"#;

/// Resolves a due-date expression relative to `today`.
pub fn parse_due_text(s: &str, today: NaiveDate) -> Option<NaiveDate> {
    let s = s.trim();
    match s.to_ascii_lowercase().as_str() {
        "today" => return Some(today),
        "tomorrow" => return Some(today + Duration::days(1)),
        _ => {}
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y/%m/%d") {
        return Some(date);
    }
    if s.matches('/').count() == 1 {
        let parts: Vec<&str> = s.split('/').collect();
        if let (Ok(month), Ok(day)) = (parts[0].parse::<u32>(), parts[1].parse::<u32>()) {
            return NaiveDate::from_ymd_opt(today.year(), month, day);
        }
    }
    None
}

pub fn start_of_day(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Local, offline parser that understands `due:<date>` and `!<priority>` tokens.
pub struct RuleTaskParser {
    clock: Arc<dyn Clock>,
    due_re: Regex,
    priority_re: Regex,
}

impl RuleTaskParser {
    pub fn new(clock: Arc<dyn Clock>) -> Result<Self, regex::Error> {
        Ok(Self {
            clock,
            due_re: Regex::new(DUE_TOKEN_RE_STR)?,
            priority_re: Regex::new(PRIORITY_TOKEN_RE_STR)?,
        })
    }

    fn parse_now(&self, input: &str) -> Result<ParsedTask, ParseError> {
        let today = self.clock.now().date_naive();
        let mut title_words: Vec<&str> = Vec::new();
        let mut due_date = None;
        let mut priority = None;

        for word in input.split_whitespace() {
            if let Some(due) = self
                .due_re
                .captures(word)
                .and_then(|caps| caps.name("due_val"))
                .and_then(|m| parse_due_text(m.as_str(), today))
            {
                due_date = start_of_day(due);
                continue;
            }
            if let Some(parsed) = self
                .priority_re
                .captures(word)
                .and_then(|caps| caps.name("priority_val"))
                .and_then(|m| m.as_str().parse::<Priority>().ok())
            {
                priority = Some(parsed);
                continue;
            }
            title_words.push(word);
        }

        if title_words.is_empty() {
            return Err(ParseError::EmptyTitle);
        }
        Ok(ParsedTask {
            title: title_words.join(" "),
            due_date,
            priority,
        })
    }
}

#[async_trait]
impl TaskParser for RuleTaskParser {
    async fn parse(&self, input: &str) -> Result<ParsedTask, ParseError> {
        self.parse_now(input)
    }
}

#[derive(Serialize)]
struct ParseRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ParseResponse {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    due_date: Option<String>,
    #[serde(default)]
    priority: Option<String>,
}

/// Delegates parsing to a remote service speaking
/// `{"text": ..}` -> `{"title": .., "dueDate": .., "priority": ..}`.
pub struct HttpTaskParser {
    client: JsonClient,
    endpoint: Uri,
}

impl HttpTaskParser {
    pub fn new(endpoint: &str) -> Result<Self, ParseError> {
        let endpoint: Uri = endpoint
            .parse()
            .map_err(|_| ParseError::InvalidEndpoint(endpoint.to_string()))?;
        if endpoint.host().is_none() {
            return Err(ParseError::InvalidEndpoint(endpoint.to_string()));
        }
        Ok(Self {
            client: JsonClient::new(),
            endpoint,
        })
    }
}

fn parse_remote_due(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(start_of_day)
}

#[async_trait]
impl TaskParser for HttpTaskParser {
    async fn parse(&self, input: &str) -> Result<ParsedTask, ParseError> {
        let response: ParseResponse = self
            .client
            .post_json(&self.endpoint, &ParseRequest { text: input })
            .await?;

        let title = response
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ParseError::EmptyTitle)?;

        let due_date = response.due_date.as_deref().and_then(|raw| {
            let parsed = parse_remote_due(raw);
            if parsed.is_none() {
                tracing::warn!("ignoring unparseable dueDate '{}' from parser", raw);
            }
            parsed
        });
        let priority = response.priority.as_deref().and_then(|raw| match raw.parse() {
            Ok(priority) => Some(priority),
            Err(e) => {
                tracing::warn!("ignoring priority from parser: {}", e);
                None
            }
        });

        Ok(ParsedTask {
            title,
            due_date,
            priority,
        })
    }
}

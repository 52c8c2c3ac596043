use clap::{Parser, Subcommand};
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use todolab::app::App;
use todolab::clock::{SystemClock, UuidGenerator};
use todolab::config::Config;
use todolab::error::AppError;
use todolab::formatter;
use todolab::persistence::PersistenceAdapter;
use todolab::settings::Settings;
use todolab::state::Action;
use todolab::storage::FileStore;
use todolab::task_model::{Filter, Priority, TaskAttrs, TaskPatch};
use todolab::task_parser::{
    self, DisabledParser, HttpTaskParser, ParsedTask, RuleTaskParser, TaskParser,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Local task list with natural-language task entry", long_about = None)]
struct Cli {
    #[arg(long, global = true, help = "Directory holding tasks, chat history and settings")]
    data_dir: Option<PathBuf>,

    #[arg(long, short = 'v', global = true, help = "Enable debug logging on stderr")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Add a task from free text")]
    Add {
        #[arg(required = true, help = "Task text. Use '-' to read it from stdin.")]
        text: Vec<String>,
        #[arg(long, help = "Use the text as the title without parsing it")]
        no_parse: bool,
        #[arg(long, help = "Due date (YYYY-MM-DD, YYYY/MM/DD, M/D, today, tomorrow)")]
        due: Option<String>,
        #[arg(long, help = "Priority (low, medium, high)")]
        priority: Option<Priority>,
        #[arg(long, help = "Free-form notes")]
        notes: Option<String>,
    },
    #[command(about = "List tasks")]
    List {
        #[arg(long, short = 'f', help = "Filter (all, active, completed). Defaults to the saved setting.")]
        filter: Option<Filter>,
    },
    #[command(about = "Mark a task done, or not done again")]
    Toggle {
        #[arg(help = "Task id or unique prefix")]
        id: String,
    },
    #[command(about = "Delete a task")]
    Delete {
        #[arg(help = "Task id or unique prefix")]
        id: String,
    },
    #[command(about = "Change attributes of a task")]
    Edit {
        #[arg(help = "Task id or unique prefix")]
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, conflicts_with = "clear_due")]
        due: Option<String>,
        #[arg(long)]
        clear_due: bool,
        #[arg(long, conflicts_with = "clear_priority")]
        priority: Option<Priority>,
        #[arg(long)]
        clear_priority: bool,
        #[arg(long, conflicts_with = "clear_notes")]
        notes: Option<String>,
        #[arg(long)]
        clear_notes: bool,
    },
    #[command(about = "Tell the assistant about a task; it is recorded in the chat history")]
    Chat {
        #[arg(required = true, help = "Message text. Use '-' to read it from stdin.")]
        text: Vec<String>,
    },
    #[command(about = "Show the chat history")]
    History {
        #[arg(long, short = 'n', help = "Show only the most recent N messages")]
        limit: Option<usize>,
    },
    #[command(about = "Show or change settings")]
    Settings {
        #[command(subcommand)]
        action: Option<SettingsCommand>,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    #[command(about = "Print current settings")]
    Show,
    #[command(about = "Update settings")]
    Set {
        #[arg(long)]
        parse_enabled: Option<bool>,
        #[arg(long, conflicts_with = "clear_endpoint", help = "URL of a remote task parser")]
        endpoint: Option<String>,
        #[arg(long)]
        clear_endpoint: bool,
        #[arg(long)]
        timeout_ms: Option<u64>,
        #[arg(long)]
        default_filter: Option<Filter>,
    },
}

fn init_tracing(filter: &str) {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn read_text(words: &[String]) -> Result<String, AppError> {
    if let [only] = words {
        if only == "-" {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            return Ok(buf.trim().to_string());
        }
    }
    Ok(words.join(" "))
}

fn build_parser(settings: &Settings, config: &Config) -> Box<dyn TaskParser> {
    if !settings.parse_enabled {
        return Box::new(DisabledParser);
    }
    let endpoint = config
        .parser_endpoint
        .as_deref()
        .or(settings.parser_endpoint.as_deref());
    if let Some(endpoint) = endpoint {
        match HttpTaskParser::new(endpoint) {
            Ok(parser) => return Box::new(parser),
            Err(e) => tracing::warn!("{}; using local parsing instead", e),
        }
    }
    match RuleTaskParser::new(Arc::new(SystemClock)) {
        Ok(parser) => Box::new(parser),
        Err(e) => {
            tracing::warn!("local parser unavailable: {}", e);
            Box::new(DisabledParser)
        }
    }
}

fn parse_due_flag(app: &App, raw: &str) -> Result<chrono::DateTime<chrono::Utc>, AppError> {
    let today = app.clock().now().date_naive();
    task_parser::parse_due_text(raw, today)
        .and_then(task_parser::start_of_day)
        .ok_or_else(|| AppError::InvalidValue(format!("unrecognized due date '{}'", raw)))
}

fn print_task(app: &App, id: &str) -> Result<(), AppError> {
    let task = app
        .state()
        .task(id)
        .ok_or_else(|| AppError::UnknownTask(id.to_string()))?;
    println!("{}", formatter::format_task_line(task));
    Ok(())
}

fn print_settings(settings: &Settings) {
    println!("parse_enabled: {}", settings.parse_enabled);
    println!(
        "parser_endpoint: {}",
        settings.parser_endpoint.as_deref().unwrap_or("(none)")
    );
    println!("parser_timeout_ms: {}", settings.parser_timeout_ms);
    println!("default_filter: {}", settings.default_filter);
}

async fn execute(app: &mut App, command: Commands) -> Result<(), AppError> {
    match command {
        Commands::Add { text, no_parse, due, priority, notes } => {
            let text = read_text(&text)?;
            if text.trim().is_empty() {
                return Err(AppError::EmptyTitle);
            }
            let parsed = if no_parse {
                ParsedTask::literal(&text)
            } else {
                app.parse_input(&text).await
            };
            let due_date = match due {
                Some(raw) => Some(parse_due_flag(app, &raw)?),
                None => parsed.due_date,
            };
            let attrs = TaskAttrs {
                due_date,
                priority: priority.or(parsed.priority),
                notes,
            };
            let id = app.add_with_attrs(parsed.title, attrs)?;
            print_task(app, &id)?;
        }
        Commands::List { filter } => {
            if let Some(filter) = filter {
                app.dispatch(Action::SetFilter(filter));
            }
            let visible = app.state().filtered_tasks();
            if visible.is_empty() {
                println!("No tasks.");
            } else {
                println!("{}", formatter::format_task_list(visible));
            }
        }
        Commands::Toggle { id } => {
            let id = app.resolve_task_id(&id)?;
            app.dispatch(Action::ToggleTask { id: id.clone() });
            print_task(app, &id)?;
        }
        Commands::Delete { id } => {
            let id = app.resolve_task_id(&id)?;
            let title = app.state().task(&id).map(|t| t.title.clone()).unwrap_or_default();
            app.dispatch(Action::DeleteTask { id });
            println!("Deleted: {}", title);
        }
        Commands::Edit {
            id,
            title,
            due,
            clear_due,
            priority,
            clear_priority,
            notes,
            clear_notes,
        } => {
            let id = app.resolve_task_id(&id)?;
            if title.as_deref().is_some_and(|t| t.trim().is_empty()) {
                return Err(AppError::EmptyTitle);
            }
            let due_date = match due {
                Some(raw) => Some(Some(parse_due_flag(app, &raw)?)),
                None if clear_due => Some(None),
                None => None,
            };
            let patch = TaskPatch {
                title,
                due_date,
                priority: if clear_priority { Some(None) } else { priority.map(Some) },
                notes: if clear_notes { Some(None) } else { notes.map(Some) },
            };
            if patch.is_empty() {
                return Err(AppError::EmptyPatch);
            }
            app.dispatch(Action::UpdateTask { id: id.clone(), patch });
            print_task(app, &id)?;
        }
        Commands::Chat { text } => {
            let text = read_text(&text)?;
            app.send_chat(&text).await?;
            if let Some(reply) = app.state().messages.last() {
                println!("{}", reply.content);
            }
        }
        Commands::History { limit } => {
            let messages = &app.state().messages;
            let start = limit.map_or(0, |n| messages.len().saturating_sub(n));
            let shown = &messages[start..];
            if shown.is_empty() {
                println!("No messages.");
            } else {
                println!("{}", formatter::format_transcript(shown));
            }
        }
        Commands::Settings { action } => match action.unwrap_or(SettingsCommand::Show) {
            SettingsCommand::Show => print_settings(app.settings()),
            SettingsCommand::Set {
                parse_enabled,
                endpoint,
                clear_endpoint,
                timeout_ms,
                default_filter,
            } => {
                let mut settings = app.settings().clone();
                if let Some(enabled) = parse_enabled {
                    settings.parse_enabled = enabled;
                }
                if let Some(endpoint) = endpoint {
                    HttpTaskParser::new(&endpoint)
                        .map_err(|e| AppError::InvalidValue(e.to_string()))?;
                    settings.parser_endpoint = Some(endpoint);
                }
                if clear_endpoint {
                    settings.parser_endpoint = None;
                }
                if let Some(timeout_ms) = timeout_ms {
                    settings.parser_timeout_ms = timeout_ms;
                }
                if let Some(filter) = default_filter {
                    settings.default_filter = filter;
                }
                print_settings(&settings);
                app.update_settings(settings);
            }
        },
    }
    Ok(())
}

async fn run(command: Commands, config: Config) -> Result<(), AppError> {
    config.ensure_data_dir()?;
    let adapter = PersistenceAdapter::new(Arc::new(FileStore::new(config.data_dir.clone())));
    let settings = adapter.load_settings();
    let parser = build_parser(&settings, &config);
    tracing::debug!(data_dir = %config.data_dir.display(), "opening task store");

    let mut app = App::open(
        adapter,
        Box::new(SystemClock),
        Box::new(UuidGenerator),
        parser,
        settings,
    );
    let result = execute(&mut app, command).await;
    app.shutdown().await;
    result
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match Config::resolve(cli.data_dir, cli.verbose) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.log_filter);

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

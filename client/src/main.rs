//! tasksync - command-line client for a shared task list.
//!
//! # Commands
//!
//! - `tasksync run`: Interactive session that stays in sync with other clients
//! - `tasksync list`: Print the store's task list once
//! - `tasksync add <text>`: Create a task
//! - `tasksync done <index>`: Complete the task at `index`
//!
//! # Environment Variables
//!
//! See the [`config`](tasksync_client::config) module for available options.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tasksync_client::config::Config;
use tasksync_client::engine::{self, Notifier, SyncHandle};
use tasksync_client::error::validate_task_text;
use tasksync_client::store::StoreClient;
use tasksync_client::types::{CompleteRequest, CreateRequest, TaskItem, View};

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// tasksync - shared task list client.
///
/// Talks to a tasksync store over HTTP and follows its notification
/// channel so that changes made elsewhere show up immediately.
#[derive(Parser, Debug)]
#[command(name = "tasksync")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    TASKSYNC_STORE_URL             Store URL (required)
    TASKSYNC_NOTIFY_URL            Notification WebSocket URL (default: derived)
    TASKSYNC_CHANNEL               Notification channel (default: todo)
    TASKSYNC_REQUEST_TIMEOUT_SECS  Per-request timeout (default: 30)
    TASKSYNC_ECHO_MODE             correlated or single-slot (default: correlated)
    TASKSYNC_COMPLETE_FAILURE      surface or silent (default: surface)

EXAMPLES:
    export TASKSYNC_STORE_URL=http://localhost:5200

    # Follow the list interactively
    tasksync run

    # One-shot commands
    tasksync add Buy milk and eggs
    tasksync done 0
    tasksync list
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Start an interactive session.
    ///
    /// Reads commands from stdin: `add <text>`, `done <index>`, `list`,
    /// `refresh` and `quit`. Any other line is submitted as a new task.
    Run,

    /// Print the task list.
    List,

    /// Create a task.
    Add {
        /// Task text, more than 5 characters.
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Mark a task complete.
    Done {
        /// Position of the task, as shown by `list`.
        index: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config = Config::from_env().context("Failed to load configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(async move {
        match cli.command {
            Command::Run => run_interactive(config).await,
            Command::List => run_list(&config).await,
            Command::Add { text } => run_add(&config, text.join(" ")).await,
            Command::Done { index } => run_done(&config, index).await,
        }
    })
}

async fn run_list(config: &Config) -> Result<()> {
    let store = store_client(config)?;
    let tasks = store
        .fetch_items()
        .await
        .context("Failed to fetch task list")?;
    print_tasks(&tasks);
    Ok(())
}

async fn run_add(config: &Config, text: String) -> Result<()> {
    let store = store_client(config)?;

    if let Err(e) = validate_task_text(&text) {
        bail!("{e}");
    }

    store
        .create_item(&CreateRequest {
            title: text.clone(),
            client_token: None,
        })
        .await
        .context("Failed to add task")?;
    println!("Added: {text}");
    Ok(())
}

async fn run_done(config: &Config, index: usize) -> Result<()> {
    let store = store_client(config)?;
    store
        .complete_item(&CompleteRequest {
            index,
            id: None,
            client_token: None,
        })
        .await
        .with_context(|| format!("Failed to complete task {index}"))?;
    println!("Completed task {index}");
    Ok(())
}

async fn run_interactive(config: Config) -> Result<()> {
    info!(
        store = %config.store_url,
        notify = %config.notify_url,
        channel = %config.channel,
        echo_mode = %config.echo_mode,
        "Starting tasksync"
    );

    let notifier: Arc<dyn Notifier> = Arc::new(|message: &str| eprintln!("! {message}"));
    let client = engine::start(&config, notifier).context("Failed to start sync client")?;

    let mut views = client.handle.subscribe_view();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let shutdown_signal = wait_for_shutdown();
    tokio::pin!(shutdown_signal);

    loop {
        tokio::select! {
            () = &mut shutdown_signal => {
                info!("Shutdown signal received");
                break;
            }
            changed = views.changed() => {
                if changed.is_err() {
                    warn!("Sync engine stopped unexpectedly");
                    break;
                }
                let view = views.borrow_and_update().clone();
                print_view(&view);
            }
            line = lines.next_line() => {
                match line.context("Failed to read stdin")? {
                    Some(line) => {
                        if !handle_line(&client.handle, line.trim()).await? {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    let shutdown = tokio::time::timeout(
        Duration::from_secs(SHUTDOWN_TIMEOUT_SECS),
        client.shutdown(),
    );
    if shutdown.await.is_err() {
        warn!("Shutdown timed out");
    }

    info!("tasksync stopped");
    Ok(())
}

/// Dispatches one interactive command. Returns `false` to end the session.
async fn handle_line(handle: &SyncHandle, line: &str) -> Result<bool> {
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    match verb {
        "" => {}
        "quit" | "exit" => return Ok(false),
        "list" => print_view(&handle.view()),
        "refresh" => handle.refresh().await?,
        "add" => handle.create_task(rest).await?,
        "done" => match rest.parse::<usize>() {
            Ok(index) => handle.complete_task(index).await?,
            Err(_) => eprintln!("! usage: done <index>"),
        },
        _ => {
            handle.set_input(line).await?;
            handle.submit_input().await?;
        }
    }
    Ok(true)
}

fn store_client(config: &Config) -> Result<StoreClient> {
    StoreClient::new(config.store_url.clone(), config.request_timeout)
        .context("Failed to create HTTP client")
}

fn print_view(view: &View) {
    if !view.hydrated {
        println!("(loading)");
        return;
    }
    print_tasks(&view.tasks);
}

fn print_tasks(tasks: &[TaskItem]) {
    if tasks.is_empty() {
        println!("(no tasks)");
        return;
    }
    for (index, task) in tasks.iter().enumerate() {
        let mark = if task.completed { "x" } else { " " };
        println!("{index:>3}. [{mark}] {}", task.text);
    }
}

/// Initializes the tracing subscriber. Logs go to stderr so they never mix
/// with the task list on stdout.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .init();
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

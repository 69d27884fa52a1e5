//! `mole`: watch, search and export ngrok tunnel traffic from the terminal.
//!
//! Usage:
//! ```text
//! mole watch --filter 'status == 500 || duration > 1s'
//! mole sessions
//! mole show session_1714557600000000000 --search checkout
//! mole export-session -o traffic.json
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use mole_core::app::{self, Event, Inspector};
use mole_core::config::{InspectorConfig, ENV_API_URL, ENV_DB_PATH};
use mole_core::feed::{CaptureFeed, NgrokClient};
use mole_core::inspect::visible_set;
use mole_core::logging::init_logging;
use mole_core::models::{search_fields, CapturedRequest, FilterChain};
use mole_core::session::SessionManager;
use mole_core::storage::{default_export_filename, RequestStore};

#[derive(Parser, Debug)]
#[command(name = "mole", about = "Inspect traffic flowing through an ngrok tunnel", version)]
struct Cli {
    /// ngrok agent API address
    #[arg(long, env = ENV_API_URL, global = true)]
    api_url: Option<String>,

    /// History database path (default: ~/.mole/history.db)
    #[arg(long, env = ENV_DB_PATH, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Follow live traffic, recording it into the history database
    Watch {
        /// Filter chain, e.g. `method == POST && status != 200`
        #[arg(short, long)]
        filter: Option<String>,
        /// Free-text search
        #[arg(short, long)]
        search: Option<String>,
    },
    /// List recorded sessions, newest first
    Sessions,
    /// Print the requests of a recorded session
    Show {
        session_id: String,
        #[arg(short, long)]
        filter: Option<String>,
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Search recorded requests across all sessions
    Search {
        query: String,
        #[arg(short, long, default_value_t = 100)]
        limit: u32,
    },
    /// List starred requests
    Starred,
    /// Toggle the star on a recorded request
    Star { request_id: String },
    /// Export a session as JSON (the live session when no id is given)
    ExportSession {
        session_id: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Export selected requests as a JSON array
    ExportRequests {
        #[arg(required = true)]
        request_ids: Vec<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete old requests from the history database
    Cleanup {
        #[arg(long)]
        keep_days: Option<u32>,
        #[arg(long)]
        keep_count: Option<u32>,
    },
    /// Delete a recorded session and its requests
    DeleteSession { session_id: String },
    /// Ask ngrok to replay a captured request
    Replay { request_id: String },
    /// Show history database counts
    Stats,
    /// List filterable fields
    Fields { query: Option<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = InspectorConfig::default().with_overrides(cli.api_url, cli.db);
    init_logging(config.data_dir())?;

    match cli.command {
        Commands::Watch { filter, search } => watch(config, filter, search).await,
        Commands::Sessions => {
            let store = open_store(&config);
            for session in store.get_sessions()? {
                let count = store.count_session_requests(&session.id)?;
                let ended = session
                    .ended_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "open".to_string());
                println!(
                    "{}  {}  {} → {}  {} requests",
                    session.id,
                    session.tunnel_url,
                    session.started_at.format("%Y-%m-%d %H:%M:%S"),
                    ended,
                    count
                );
            }
            Ok(())
        }
        Commands::Show {
            session_id,
            filter,
            search,
        } => {
            let store = open_store(&config);
            let chain = parse_chain(filter.as_deref())?;
            let mut manager = SessionManager::new();
            let requests = manager
                .load_session(&store, &session_id)
                .with_context(|| format!("loading session {session_id}"))?;
            for req in visible_set(requests, &chain, search.as_deref().unwrap_or("")) {
                print_request(req);
            }
            Ok(())
        }
        Commands::Search { query, limit } => {
            let store = open_store(&config);
            for req in store.search_requests(&query, limit)? {
                print_request(&req);
            }
            Ok(())
        }
        Commands::Starred => {
            let store = open_store(&config);
            for req in store.get_starred_requests()? {
                print_request(&req);
            }
            Ok(())
        }
        Commands::Star { request_id } => {
            let store = open_store(&config);
            let starred = store
                .toggle_star(&request_id)
                .with_context(|| format!("starring {request_id}"))?;
            println!("{} {}", request_id, if starred { "starred" } else { "unstarred" });
            Ok(())
        }
        Commands::ExportSession { session_id, output } => {
            let store = open_history(&config)?;
            let output = output.unwrap_or_else(|| PathBuf::from(default_export_filename()));
            // Outside of `watch` no session is open, so fall back to the newest one
            let session_id = match session_id {
                Some(id) => id,
                None => store
                    .get_sessions()?
                    .into_iter()
                    .next()
                    .map(|s| s.id)
                    .context("no recorded sessions")?,
            };
            let count = store
                .export_session(&session_id, &output)
                .with_context(|| format!("exporting session {session_id}"))?;
            println!("Exported {} requests to {}", count, output.display());
            Ok(())
        }
        Commands::ExportRequests {
            request_ids,
            output,
        } => {
            let store = open_history(&config)?;
            let output = output.unwrap_or_else(|| PathBuf::from(default_export_filename()));
            let count = store
                .export_requests(&request_ids, &output)
                .context("exporting requests")?;
            println!("Exported {} requests to {}", count, output.display());
            Ok(())
        }
        Commands::Cleanup {
            keep_days,
            keep_count,
        } => {
            let store = open_store(&config);
            let report = store.cleanup(
                keep_days.unwrap_or(config.keep_days),
                keep_count.unwrap_or(config.keep_count),
            )?;
            println!(
                "Removed {} requests and {} sessions",
                report.requests_deleted, report.sessions_deleted
            );
            Ok(())
        }
        Commands::DeleteSession { session_id } => {
            let mut store = open_store(&config);
            store.delete_session(&session_id)?;
            println!("Deleted {session_id}");
            Ok(())
        }
        Commands::Replay { request_id } => {
            let client = NgrokClient::new(config.api_url.as_str())?;
            client
                .replay(&request_id)
                .await
                .with_context(|| format!("replaying {request_id}"))?;
            println!("Replayed {request_id}");
            Ok(())
        }
        Commands::Stats => {
            let store = open_store(&config);
            let stats = store.stats()?;
            if let Some(path) = store.db_path() {
                println!("Database: {}", path.display());
            }
            println!("Sessions: {}", stats.sessions);
            println!("Requests: {}", stats.requests);
            println!("Starred:  {}", stats.starred);
            Ok(())
        }
        Commands::Fields { query } => {
            for spec in search_fields(query.as_deref().unwrap_or("")) {
                println!(
                    "{:<36} {:<40} {}",
                    spec.name,
                    spec.field.key(),
                    spec.field
                        .operators()
                        .iter()
                        .map(|op| op.as_str())
                        .collect::<Vec<_>>()
                        .join(" ")
                );
            }
            Ok(())
        }
    }
}

fn open_store(config: &InspectorConfig) -> RequestStore {
    RequestStore::open_or_disabled(&config.db_path)
}

fn open_history(config: &InspectorConfig) -> Result<RequestStore> {
    let store = open_store(config);
    if !store.is_enabled() {
        bail!("history database {} is unavailable", config.db_path.display());
    }
    Ok(store)
}

fn parse_chain(filter: Option<&str>) -> Result<FilterChain> {
    match filter {
        Some(text) => text
            .parse::<FilterChain>()
            .with_context(|| format!("parsing filter `{text}`")),
        None => Ok(FilterChain::new()),
    }
}

fn print_request(req: &CapturedRequest) {
    println!(
        "{}  {:<7} {:>3} {:>8}  {}{}  [{}]",
        req.timestamp.format("%H:%M:%S"),
        req.method,
        req.status_code,
        req.duration_str(),
        req.path,
        if req.starred { " ★" } else { "" },
        req.id
    );
}

async fn watch(config: InspectorConfig, filter: Option<String>, search: Option<String>) -> Result<()> {
    let chain = parse_chain(filter.as_deref())?;
    let client = NgrokClient::new(config.api_url.as_str())?;
    if !client.is_available().await {
        eprintln!(
            "ngrok agent API is not reachable at {}; waiting for it to come up",
            client.base_url()
        );
    }

    let store = open_store(&config);
    if !store.is_enabled() {
        eprintln!("History is disabled; traffic will not be recorded");
    }
    let inspector = Inspector::new(config, store);

    let (tx, rx) = mpsc::channel(16);
    tx.send(Event::SetFilters(chain)).await?;
    tx.send(Event::SetSearch(search.unwrap_or_default())).await?;

    let quit = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = quit.send(Event::Quit).await;
        }
    });

    let mut seen = HashSet::new();
    let mut last_error: Option<String> = None;
    let feed: Arc<dyn CaptureFeed> = Arc::new(client);
    let inspector = app::run(inspector, feed, rx, |state| {
        // The feed lists newest first; print in arrival order
        for req in state.visible().into_iter().rev() {
            if seen.insert(req.id.clone()) {
                print_request(req);
            }
        }
        if state.last_error() != last_error.as_deref() {
            if let Some(err) = state.last_error() {
                eprintln!("error: {err}");
            }
            last_error = state.last_error().map(str::to_string);
        }
    })
    .await?;

    drop(tx);
    inspector.shutdown().context("closing history database")?;
    Ok(())
}

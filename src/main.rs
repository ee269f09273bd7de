use anyhow::Result;
use clap::{Parser, Subcommand};
use mentionboard::format::{chunk_message, format_full_leaderboard};
use mentionboard::{
    Config, PaginatedFetcher, QueryService, RefreshCoordinator, RefreshOutcome, RefreshScheduler,
    SnapshotStore, TwitterSearch,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Delay between consecutive chunks of one long reply.
const CHUNK_DELAY: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "mentionboard")]
#[command(about = "Leaderboard of who mentions a handle the most", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to config file (default: <config dir>/mentionboard/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Tracked handle, overriding the config file
    #[arg(long, global = true)]
    handle: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the top-10 leaderboard, refreshing first if the cache is stale
    Leaderboard {
        /// Print every ranked user with display names
        #[arg(long)]
        all: bool,
    },
    /// Print rank and mention count for one user
    Stats { user: String },
    /// Run a single refresh
    Refresh {
        /// Rescan the whole history instead of only new mentions
        #[arg(long)]
        full: bool,
    },
    /// Keep the cache warm in the background and answer commands from stdin
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("mentionboard=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(handle) = cli.handle {
        config.target_handle = handle.trim_start_matches('@').to_string();
    }

    let search = TwitterSearch::new(config.api_base.clone(), Config::bearer_token()?);
    let coordinator = Arc::new(RefreshCoordinator::new(
        &config.target_handle,
        PaginatedFetcher::new(search, config.page_delay()),
        SnapshotStore::new(config.snapshot_path()),
        config.refresh_policy(),
    ));
    let queries = QueryService::new(coordinator.clone());

    match cli.command {
        Command::Leaderboard { all: true } => {
            let snapshot = queries.current_snapshot().await;
            println!("{}", format_full_leaderboard(&*snapshot));
        }
        Command::Leaderboard { all: false } => {
            println!("{}", queries.get_leaderboard().await);
        }
        Command::Stats { user } => {
            println!("{}", queries.get_personal_stats(&user).await.render());
        }
        Command::Refresh { full } => match coordinator.refresh(full).await? {
            RefreshOutcome::Skipped { .. } => println!("Refresh already in progress."),
            RefreshOutcome::Completed {
                kind,
                new_mentions,
                snapshot,
                persisted,
            } => {
                println!(
                    "{:?} refresh: {} new mentions, {} total, {} users{}",
                    kind,
                    new_mentions,
                    snapshot.total_mentions,
                    snapshot.unique_users(),
                    if persisted { "" } else { " (not saved to disk)" }
                );
            }
        },
        Command::Serve => serve(&config, coordinator, queries).await?,
    }

    Ok(())
}

async fn serve(
    config: &Config,
    coordinator: Arc<RefreshCoordinator<TwitterSearch>>,
    queries: QueryService<TwitterSearch>,
) -> Result<()> {
    let scheduler = RefreshScheduler::spawn(coordinator, config.incremental_check_interval());
    info!(handle = %config.target_handle, "Serving; type /help for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        };
        let Some(line) = line else { break };

        let reply = match parse_command(&line) {
            Some(ChatCommand::Leaderboard) => queries.get_leaderboard().await,
            Some(ChatCommand::Stats(user)) => queries.get_personal_stats(user).await.render(),
            Some(ChatCommand::StatsUsage) => "❌ Usage: /stats [handle]".to_string(),
            Some(ChatCommand::Help) => help_text(&config.target_handle),
            None => continue,
        };
        deliver(&reply).await;
    }

    scheduler.shutdown().await;
    Ok(())
}

#[derive(Debug, PartialEq)]
enum ChatCommand<'a> {
    Leaderboard,
    Stats(&'a str),
    StatsUsage,
    Help,
}

fn parse_command(line: &str) -> Option<ChatCommand<'_>> {
    let line = line.trim();
    let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    match command {
        "/leaderboard" => Some(ChatCommand::Leaderboard),
        "/stats" if rest.trim().is_empty() => Some(ChatCommand::StatsUsage),
        "/stats" => Some(ChatCommand::Stats(rest.trim())),
        "/help" | "/start" => Some(ChatCommand::Help),
        _ => None,
    }
}

fn help_text(target_handle: &str) -> String {
    format!(
        "📖 Help:\n\nCommands:\n• /leaderboard - Top 10 accounts mentioning @{target_handle}\n• /stats [handle] - Your rank and mention count\n• /help - Show this help message"
    )
}

async fn deliver(text: &str) {
    let chunks = chunk_message(text);
    let last = chunks.len().saturating_sub(1);
    for (index, chunk) in chunks.iter().enumerate() {
        println!("{chunk}");
        if index < last {
            tokio::time::sleep(CHUNK_DELAY).await;
        }
    }
}

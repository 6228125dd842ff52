//! offsearch - query a search service with an offline result cache
//!
//! Prints the result payload for a query to stdout. Results come from the
//! local cache when the query has been answered before, so repeated queries
//! keep working without a network connection.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use offsearch::cli::{CacheCommand, Cli, CliError, Command};
use offsearch::{CacheStore, Config, Dispatcher, Outcome};

/// Sets up logging to stderr so stdout carries only results.
/// `RUST_LOG` overrides the verbosity chosen with `-v`.
fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Runs a single query through the dispatcher and prints the outcome
async fn run_query(config: &Config, text: &str) -> Result<ExitCode, CliError> {
    let dispatcher = Dispatcher::new(config)?;
    let outcome = dispatcher.handle(text).await;
    dispatcher.shutdown().await;

    match outcome {
        Outcome::NoResult => {
            eprintln!("No result");
            Ok(ExitCode::FAILURE)
        }
        hit => {
            if let Some(source) = hit.source() {
                eprintln!("(from {})", source);
            }
            println!("{}", hit.into_payload().unwrap_or_default());
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_health(config: &Config) -> Result<ExitCode, CliError> {
    let dispatcher = Dispatcher::new(config)?;
    let health = dispatcher.health().await?;

    println!("{}: {} documents indexed", health.status, health.docs);
    Ok(if health.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn run_cache(config: &Config, command: CacheCommand) -> Result<ExitCode, CliError> {
    let store = CacheStore::with_dir(config.resolve_cache_dir()?, config.max_entries);

    match command {
        CacheCommand::Path => {
            println!("{}", store.dir().display());
        }
        CacheCommand::List => {
            let entries = store.entries()?;
            for entry in &entries {
                println!(
                    "{}  {:>8}  {}",
                    entry.modified.format("%Y-%m-%d %H:%M:%S"),
                    entry.size,
                    entry.key
                );
            }
            eprintln!("{} of {} entries used", entries.len(), store.max_entries());
        }
        CacheCommand::Clear => {
            let removed = store.clear()?;
            println!("Removed {} cached queries", removed);
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let config = cli.resolve_config(Config::from_env())?;

    match cli.command {
        Command::Query { text } => run_query(&config, &text).await,
        Command::Health => run_health(&config).await,
        Command::Cache(command) => run_cache(&config, command),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_filter());

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(2)
        }
    }
}

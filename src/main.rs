//! httpcache - fetch URLs through a persistent HTTP response cache
//!
//! Loads the cache file, runs one command and saves the cache file again.
//! Requests are only in flight between the load and the save.

use std::error::Error;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use httpcache::cache::{load_from_file, save_to_file, CacheStore};
use httpcache::cli::{build_request, summarize, Cli, Command, FetchArgs, RunConfig};
use httpcache::{CacheStatus, CachingExecutor, HttpResponse, ReqwestExecutor};

/// Installs the stderr log subscriber
///
/// `RUST_LOG` wins over the `-v` count.
fn init_tracing(verbose: u8, json: bool) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Loads the cache file into a fresh store and applies the TTL override
fn open_store(config: &RunConfig) -> Result<CacheStore, Box<dyn Error>> {
    let store = CacheStore::default();
    load_from_file(&store, &config.cache_file)?;
    if let Some(ttl) = config.ttl {
        store.set_ttl(ttl);
    }
    Ok(store)
}

/// Saves the store, creating the cache directory if needed
fn persist_store(store: &CacheStore, path: &Path) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    save_to_file(store, path)?;
    Ok(())
}

/// Writes the response (optionally with its head) to stdout
fn print_response(response: &HttpResponse, include_head: bool) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    if include_head {
        writeln!(stdout, "{:?} {}", response.version(), response.status())?;
        for (name, value) in response.headers() {
            write!(stdout, "{}: ", name)?;
            stdout.write_all(value.as_bytes())?;
            writeln!(stdout)?;
        }
        writeln!(stdout)?;
    }
    stdout.write_all(response.body())?;
    stdout.flush()
}

async fn fetch(config: &RunConfig, args: &FetchArgs) -> Result<ExitCode, Box<dyn Error>> {
    // Validate arguments before touching the cache file
    let request = build_request(args)?;

    let store = Arc::new(open_store(config)?);
    let executor = CachingExecutor::new(Arc::clone(&store), ReqwestExecutor::default());
    let response = executor.round_trip(request).await?;
    drop(executor);

    if response.extensions().get::<CacheStatus>() == Some(&CacheStatus::Miss) {
        persist_store(&store, &config.cache_file)?;
    }

    print_response(&response, args.include)?;
    if response.status().is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn list(config: &RunConfig, json: bool) -> Result<ExitCode, Box<dyn Error>> {
    let store = open_store(config)?;
    let mut stdout = io::stdout().lock();
    for summary in summarize(&store) {
        if json {
            writeln!(stdout, "{}", serde_json::to_string(&summary)?)?;
        } else {
            writeln!(stdout, "{}", summary.to_line())?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn clear(config: &RunConfig) -> Result<ExitCode, Box<dyn Error>> {
    let store = open_store(config)?;
    let removed = store.len();
    store.clear();
    persist_store(&store, &config.cache_file)?;
    println!("Removed {} cached entries", removed);
    Ok(ExitCode::SUCCESS)
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn Error>> {
    let config = RunConfig::from_cli(&cli)?;
    match &cli.command {
        Command::Fetch(args) => fetch(&config, args).await,
        Command::List { json } => list(&config, *json),
        Command::Clear => clear(&config),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

//! Command-line interface for the httpcache binary
//!
//! Parses CLI arguments with clap, resolves the run configuration (cache file
//! location and TTL override) and builds the outgoing request for `fetch`.

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use directories::ProjectDirs;
use http::{HeaderName, HeaderValue, Method, Uri};
use serde::Serialize;
use thiserror::Error;

use crate::cache::CacheStore;
use crate::message::HttpRequest;

/// File name of the default cache file inside the cache directory
const CACHE_FILE_NAME: &str = "cache.bin";

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// A `-H` argument is not of the form `Name: value`
    #[error("Invalid header: '{0}'. Expected 'Name: value'")]
    InvalidHeader(String),

    #[error("Invalid method: '{0}'")]
    InvalidMethod(String),

    /// The URL is not absolute (scheme and host are required)
    #[error("Invalid URL: '{0}'. Expected an absolute http(s) URL")]
    InvalidUrl(String),

    #[error("Could not determine a cache directory; pass --cache-file")]
    NoCacheDir,
}

/// httpcache - fetch URLs through a persistent response cache
#[derive(Parser, Debug)]
#[command(name = "httpcache")]
#[command(about = "Fetch URLs through a persistent HTTP response cache")]
#[command(version)]
pub struct Cli {
    /// Cache file to load before and save after the command
    #[arg(long, global = true, value_name = "PATH")]
    pub cache_file: Option<PathBuf>,

    /// Store-wide TTL in seconds, 0 disables expiry
    ///
    /// Overrides the TTL saved in the cache file.
    #[arg(long, global = true, value_name = "SECONDS")]
    pub ttl: Option<u64>,

    /// Increase log verbosity (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch a URL through the cache and print the response body
    Fetch(FetchArgs),
    /// List cached entries
    List {
        /// Print one JSON object per entry
        #[arg(long)]
        json: bool,
    },
    /// Remove every cached entry
    Clear,
}

/// Arguments of the `fetch` command
#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Absolute URL to fetch
    pub url: String,

    /// Request method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// Request header, repeatable
    ///
    /// Examples:
    ///   -H "Accept: application/json"
    ///   -H "Authorization: Bearer token"
    #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
    pub headers: Vec<String>,

    /// Request body
    #[arg(short = 'd', long)]
    pub data: Option<String>,

    /// Print the status line and headers before the body
    #[arg(short, long)]
    pub include: bool,
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Cache file loaded before and saved after the command
    pub cache_file: PathBuf,
    /// TTL to apply after loading, if given
    pub ttl: Option<Duration>,
}

impl RunConfig {
    /// Creates a RunConfig from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(RunConfig)` with an explicit or XDG-derived cache file
    /// * `Err(CliError::NoCacheDir)` if no cache file was given and no cache
    ///   directory can be determined
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let cache_file = match &cli.cache_file {
            Some(path) => path.clone(),
            None => default_cache_file().ok_or(CliError::NoCacheDir)?,
        };
        Ok(Self {
            cache_file,
            ttl: cli.ttl.map(Duration::from_secs),
        })
    }
}

/// Returns `<XDG cache dir>/httpcache/cache.bin`, if a home directory exists
pub fn default_cache_file() -> Option<PathBuf> {
    let project_dirs = ProjectDirs::from("", "", "httpcache")?;
    Some(project_dirs.cache_dir().join(CACHE_FILE_NAME))
}

/// Parses a `Name: value` header argument
pub fn parse_header_arg(s: &str) -> Result<(HeaderName, HeaderValue), CliError> {
    let invalid = || CliError::InvalidHeader(s.to_string());
    let (name, value) = s.split_once(':').ok_or_else(invalid)?;
    let name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|_| invalid())?;
    let value = HeaderValue::from_str(value.trim()).map_err(|_| invalid())?;
    Ok((name, value))
}

/// Builds the outgoing request for `fetch`
pub fn build_request(args: &FetchArgs) -> Result<HttpRequest, CliError> {
    let method = Method::from_bytes(args.method.to_ascii_uppercase().as_bytes())
        .map_err(|_| CliError::InvalidMethod(args.method.clone()))?;

    let uri: Uri = args
        .url
        .parse()
        .map_err(|_| CliError::InvalidUrl(args.url.clone()))?;
    if uri.scheme().is_none() || uri.authority().is_none() {
        return Err(CliError::InvalidUrl(args.url.clone()));
    }

    let body = args.data.clone().map(Bytes::from).unwrap_or_default();
    let mut request = HttpRequest::new(body);
    *request.method_mut() = method;
    *request.uri_mut() = uri;
    for header in &args.headers {
        let (name, value) = parse_header_arg(header)?;
        request.headers_mut().append(name, value);
    }
    Ok(request)
}

/// Summary of one cache entry, as printed by `list`
#[derive(Debug, Clone, Serialize)]
pub struct EntrySummary {
    pub method: String,
    pub url: String,
    pub headers_hash: String,
    pub cached_at: DateTime<Utc>,
    pub fresh: bool,
    /// Recorded status code, if the record decodes
    pub status: Option<u16>,
    pub response_bytes: usize,
}

impl EntrySummary {
    /// One-line human readable form
    pub fn to_line(&self) -> String {
        let status = self
            .status
            .map(|code| code.to_string())
            .unwrap_or_else(|| "???".to_string());
        format!(
            "{} {} {} {} {}",
            status,
            self.method,
            self.url,
            self.cached_at.to_rfc3339(),
            if self.fresh { "fresh" } else { "stale" }
        )
    }
}

/// Summarizes every entry of `store`, sorted by URL then method
pub fn summarize(store: &CacheStore) -> Vec<EntrySummary> {
    let now = Utc::now();
    let mut summaries = Vec::with_capacity(store.len());
    store.for_each(|key, record| {
        summaries.push(EntrySummary {
            method: key.method().to_string(),
            url: key.url().to_string(),
            headers_hash: key.headers_hash().to_string(),
            cached_at: record.timestamp(),
            fresh: store.is_fresh_at(record, now),
            status: record.decode().ok().map(|response| response.status().as_u16()),
            response_bytes: record.response_bytes().len(),
        });
    });
    summaries.sort_by(|a, b| a.url.cmp(&b.url).then_with(|| a.method.cmp(&b.method)));
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Record, RequestKey};

    fn fetch_args(args: &[&str]) -> FetchArgs {
        let mut argv = vec!["httpcache", "fetch"];
        argv.extend_from_slice(args);
        match Cli::parse_from(argv).command {
            Command::Fetch(fetch) => fetch,
            other => panic!("Expected fetch, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_header_arg_trims_whitespace() {
        let (name, value) = parse_header_arg("Accept:   application/json ").unwrap();
        assert_eq!(name, "accept");
        assert_eq!(value, "application/json");
    }

    #[test]
    fn test_parse_header_arg_keeps_colons_in_value() {
        let (name, value) = parse_header_arg("Referer: https://example.com:8443/x").unwrap();
        assert_eq!(name, "referer");
        assert_eq!(value, "https://example.com:8443/x");
    }

    #[test]
    fn test_parse_header_arg_invalid() {
        let result = parse_header_arg("no colon here");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Invalid header"));
        assert!(err.to_string().contains("no colon here"));

        assert!(parse_header_arg("bad name: value").is_err());
    }

    #[test]
    fn test_cli_parse_fetch_defaults() {
        let args = fetch_args(&["https://example.com/a"]);
        assert_eq!(args.url, "https://example.com/a");
        assert_eq!(args.method, "GET");
        assert!(args.headers.is_empty());
        assert!(args.data.is_none());
        assert!(!args.include);
    }

    #[test]
    fn test_cli_parse_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "httpcache",
            "list",
            "--json",
            "--ttl",
            "30",
            "--cache-file",
            "/tmp/c.bin",
            "-vv",
        ]);
        assert_eq!(cli.ttl, Some(30));
        assert_eq!(cli.cache_file, Some(PathBuf::from("/tmp/c.bin")));
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Command::List { json: true }));
    }

    #[test]
    fn test_run_config_from_cli_with_explicit_file() {
        let cli = Cli::parse_from([
            "httpcache",
            "--cache-file",
            "/tmp/x.bin",
            "--ttl",
            "0",
            "clear",
        ]);
        let config = RunConfig::from_cli(&cli).unwrap();
        assert_eq!(config.cache_file, PathBuf::from("/tmp/x.bin"));
        assert_eq!(config.ttl, Some(Duration::ZERO));
    }

    #[test]
    fn test_run_config_without_ttl_keeps_loaded_ttl() {
        let cli = Cli::parse_from(["httpcache", "--cache-file", "/tmp/x.bin", "clear"]);
        let config = RunConfig::from_cli(&cli).unwrap();
        assert!(config.ttl.is_none());
    }

    #[test]
    fn test_default_cache_file_is_xdg_compliant() {
        if let Some(path) = default_cache_file() {
            let path_str = path.to_string_lossy();
            assert!(path_str.contains("httpcache"), "Cache path should contain project name");
            assert!(path_str.ends_with(CACHE_FILE_NAME));
        }
        // Test passes if no home directory is available (e.g. in CI)
    }

    #[test]
    fn test_build_request() {
        let args = fetch_args(&[
            "https://example.com/search?q=1",
            "-X",
            "post",
            "-H",
            "Accept: text/plain",
            "-H",
            "X-Trace: 1",
            "-d",
            "body",
        ]);

        let request = build_request(&args).unwrap();

        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.uri(), "https://example.com/search?q=1");
        assert_eq!(request.headers()["accept"], "text/plain");
        assert_eq!(request.headers()["x-trace"], "1");
        assert_eq!(request.body(), &Bytes::from_static(b"body"));
    }

    #[test]
    fn test_build_request_rejects_relative_url() {
        let args = fetch_args(&["/just/a/path"]);
        assert!(matches!(build_request(&args), Err(CliError::InvalidUrl(_))));
    }

    #[test]
    fn test_build_request_rejects_bad_method() {
        let args = fetch_args(&["https://example.com/", "-X", "GE T"]);
        assert!(matches!(build_request(&args), Err(CliError::InvalidMethod(_))));
    }

    #[test]
    fn test_summarize_reports_status_and_freshness() {
        let store = CacheStore::new(Duration::from_secs(60));
        let request = http::Request::builder()
            .uri("https://example.com/b")
            .body(Bytes::new())
            .unwrap();
        let response = http::Response::builder()
            .status(201)
            .body(Bytes::from_static(b"made"))
            .unwrap();
        store.put(RequestKey::from_request(&request), Record::encode(&request, &response));
        store.put(
            RequestKey::new("GET", "https://example.com/a", "h"),
            Record::from_parts(Utc::now() - chrono::Duration::hours(1), "bad", "bad"),
        );

        let summaries = summarize(&store);

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].url, "https://example.com/a");
        assert_eq!(summaries[0].status, None);
        assert!(!summaries[0].fresh);
        assert!(summaries[0].to_line().starts_with("??? GET https://example.com/a "));
        assert_eq!(summaries[1].status, Some(201));
        assert!(summaries[1].fresh);
        assert!(summaries[1].to_line().ends_with(" fresh"));

        let json = serde_json::to_string(&summaries[1]).unwrap();
        assert!(json.contains("\"url\":\"https://example.com/b\""));
        assert!(json.contains("\"status\":201"));
    }
}

//! warrantycache - drive the warranty tracker's offline asset cache from the command line.
//!
//! Installs the configured generation from the origin, runs individual
//! requests through the cache the way a page would, and inspects or clears
//! the stored generations.

use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use warrantycache_core::{
    CacheConfig, Destination, FetchOutcome, Fetcher, HttpFetcher, Method, OfflineCacheManager,
    Request, Response,
};

/// Log file written next to the cache stores
const LOG_FILE: &str = "warrantycache.log";

const ENV_HELP: &str = "\
Environment:
  WARRANTYCACHE_ORIGIN    Origin the assets are served from
  WARRANTYCACHE_VERSION   Generation version
  RUST_LOG                Log filter (default: warn)";

#[derive(Parser, Debug)]
#[command(name = "warrantycache")]
#[command(about = "Drive the warranty tracker's offline asset cache")]
#[command(version, arg_required_else_help = true, after_help = ENV_HELP)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Install the configured generation and activate it
    Install,
    /// Run one request through the cache
    Fetch(FetchArgs),
    /// Show generations and cached entries
    Status,
    /// Delete every cached generation
    Clear,
}

#[derive(Args, Debug, PartialEq, Eq)]
struct FetchArgs {
    /// Absolute URL, or a path joined onto the configured origin
    target: String,

    /// Treat the request as a page navigation
    #[arg(long)]
    navigate: bool,

    /// Request destination; guessed from the URL when omitted
    #[arg(long = "as", value_enum, value_name = "DESTINATION")]
    destination: Option<DestinationArg>,

    /// HTTP method
    #[arg(long, default_value = "GET", value_parser = parse_method)]
    method: Method,

    /// Extra request header, may be repeated
    #[arg(short = 'H', long = "header", value_name = "NAME:VALUE", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Write the response body to stdout
    #[arg(long = "body")]
    print_body: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum DestinationArg {
    Document,
    Script,
    Style,
    Image,
    Font,
    Manifest,
    Empty,
}

impl From<DestinationArg> for Destination {
    fn from(arg: DestinationArg) -> Self {
        match arg {
            DestinationArg::Document => Destination::Document,
            DestinationArg::Script => Destination::Script,
            DestinationArg::Style => Destination::Style,
            DestinationArg::Image => Destination::Image,
            DestinationArg::Font => Destination::Font,
            DestinationArg::Manifest => Destination::Manifest,
            DestinationArg::Empty => Destination::Empty,
        }
    }
}

fn parse_method(value: &str) -> std::result::Result<Method, String> {
    Method::from_bytes(value.to_ascii_uppercase().as_bytes())
        .map_err(|_| format!("invalid HTTP method: {}", value))
}

fn parse_header(value: &str) -> std::result::Result<(String, String), String> {
    match value.split_once(':') {
        Some((name, v)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), v.trim().to_string()))
        }
        _ => Err(format!("expected NAME:VALUE, got {}", value)),
    }
}

/// Initialize the tracing subscriber for logging.
/// Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug).
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir.filter(|dir| std::fs::create_dir_all(dir).is_ok()) {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let (mut config, load_error) = match CacheConfig::load() {
        Ok(c) => (c, None),
        Err(e) => (CacheConfig::default(), Some(e)),
    };
    config.apply_env()?;

    let _guard = init_tracing(config.storage_dir().ok().as_deref());
    if let Some(e) = load_error {
        warn!(error = %e, "Failed to load config, using defaults");
    }
    info!(cache = %config.cache_name(), origin = %config.origin, "warrantycache starting");

    let manager = OfflineCacheManager::from_config(config)?;
    let result = run(&manager, cli.command).await;

    // Let background cache refreshes finish before the runtime shuts down
    manager.flush().await;
    result
}

async fn run(manager: &OfflineCacheManager, command: Command) -> Result<()> {
    match command {
        Command::Install => install(manager).await,
        Command::Fetch(args) => fetch(manager, args).await,
        Command::Status => status(manager).await,
        Command::Clear => {
            let count = manager.clear().await?;
            eprintln!("Deleted {} generation(s)", count);
            Ok(())
        }
    }
}

async fn install(manager: &OfflineCacheManager) -> Result<()> {
    let name = manager.cache_name().to_string();
    eprintln!(
        "Installing {} ({} assets from {})...",
        name,
        manager.config().manifest.len(),
        manager.config().origin
    );

    let count = manager
        .install()
        .await
        .with_context(|| format!("Failed to install {}", name))?;
    let deleted = manager.activate().await?;

    eprintln!("✓ Cached {} assets", count);
    for old in deleted {
        eprintln!("  removed stale generation {}", old);
    }
    Ok(())
}

async fn fetch(manager: &OfflineCacheManager, args: FetchArgs) -> Result<()> {
    let url = manager
        .config()
        .origin
        .join(&args.target)
        .with_context(|| format!("Invalid URL or path: {}", args.target))?;

    if !manager.resume().await? {
        warn!(cache = %manager.cache_name(), "Generation not installed, requests go straight to network");
        eprintln!(
            "Note: {} is not installed; run `warrantycache install` first",
            manager.cache_name()
        );
    }

    let mut request = if args.navigate {
        Request::navigate(url)
    } else {
        Request::get(url)
    };
    request = request.with_method(args.method);
    if let Some(destination) = args.destination {
        request = request.with_destination(destination.into());
    }
    for (name, value) in args.headers {
        request = request.with_header(name, value);
    }

    let response = match manager.handle_fetch(request.clone()).await? {
        FetchOutcome::Respond(response) => response,
        FetchOutcome::PassThrough => {
            let fetcher = HttpFetcher::with_timeout(std::time::Duration::from_secs(
                manager.config().request_timeout_secs,
            ))?;
            fetcher.fetch(&request).await?
        }
    };

    print_response(&response);
    if args.print_body {
        io::stdout().write_all(&response.body)?;
    }
    Ok(())
}

fn print_response(response: &Response) {
    eprintln!(
        "{} {} ({}, {} bytes)",
        response.status,
        response.status_text,
        response.source,
        response.body.len()
    );
    if let Some(content_type) = response.content_type() {
        eprintln!("  content-type: {}", content_type);
    }
}

async fn status(manager: &OfflineCacheManager) -> Result<()> {
    let active = manager.resume().await?;
    println!("Generation: {} ({})", manager.cache_name(), manager.state().await);
    if !active {
        println!("  not installed");
    }

    let generations = manager.generations().await?;
    println!("Stores:");
    if generations.is_empty() {
        println!("  (none)");
    }
    for name in &generations {
        let marker = if name == manager.cache_name() { "*" } else { " " };
        println!(" {} {}", marker, name);
    }

    let entries = manager.entries().await?;
    if !entries.is_empty() {
        println!("Entries:");
    }
    for (key, entry) in entries {
        println!(
            "  {:>3}  {:>8}  {:>10}  {}",
            entry.status,
            entry.body.len(),
            entry.age_display(),
            key
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<Command, clap::Error> {
        Cli::try_parse_from(std::iter::once("warrantycache").chain(args.iter().copied()))
            .map(|cli| cli.command)
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse(&["install"]).unwrap(), Command::Install);
        assert_eq!(parse(&["status"]).unwrap(), Command::Status);
        assert_eq!(parse(&["clear"]).unwrap(), Command::Clear);
        assert!(parse(&["serve"]).is_err());
        assert!(parse(&[]).is_err());
    }

    #[test]
    fn test_parse_fetch_options() {
        let cmd = parse(&[
            "fetch",
            "/status.html",
            "--navigate",
            "--as",
            "document",
            "--method",
            "head",
            "-H",
            "Accept: text/html",
            "--header",
            "x-trace:1",
            "--body",
        ])
        .unwrap();
        assert_eq!(
            cmd,
            Command::Fetch(FetchArgs {
                target: "/status.html".to_string(),
                navigate: true,
                destination: Some(DestinationArg::Document),
                method: Method::HEAD,
                headers: vec![
                    ("Accept".to_string(), "text/html".to_string()),
                    ("x-trace".to_string(), "1".to_string()),
                ],
                print_body: true,
            })
        );
    }

    #[test]
    fn test_fetch_defaults() {
        match parse(&["fetch", "/auth.js?v=7"]).unwrap() {
            Command::Fetch(args) => {
                assert_eq!(args.method, Method::GET);
                assert_eq!(args.destination, None);
                assert!(args.headers.is_empty());
                assert!(!args.navigate && !args.print_body);
            }
            other => panic!("expected fetch, got {:?}", other),
        }
    }

    #[test]
    fn test_destination_maps_onto_core_type() {
        assert_eq!(Destination::from(DestinationArg::Style), Destination::Style);
        assert_eq!(Destination::from(DestinationArg::Empty), Destination::Empty);
    }

    #[test]
    fn test_parse_fetch_errors() {
        assert!(parse(&["fetch"]).is_err());
        assert!(parse(&["fetch", "/a", "/b"]).is_err());
        assert!(parse(&["fetch", "/a", "--as", "video"]).is_err());
        assert!(parse(&["fetch", "/a", "--as"]).is_err());
        assert!(parse(&["fetch", "/a", "--verbose"]).is_err());
        assert!(parse(&["fetch", "/a", "-H", "no-colon"]).is_err());
    }
}

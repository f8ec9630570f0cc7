//! mcp-suite: stdio tool server with API-key session management
//!
//! Reads one JSON request per line from stdin and writes one JSON response per
//! line to stdout. Logs go to stderr.

mod backend;
mod config;
mod tools;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use backend::HostBackend;
use config::ServerConfig;
use suite_mcp::{McpServer, StdioTransport};

/// Stdio tool server with API-key session management.
#[derive(Parser, Debug)]
#[command(name = "mcp-suite")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server name reported in logs (overrides MCP_SERVER_NAME)
    #[arg(long)]
    name: Option<String>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Determines the log level from CLI arguments.
fn log_level(verbose: u8, quiet: bool) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Installs the tracing subscriber. Stdout carries protocol frames, so logs go to stderr.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(log_level(args.verbose, args.quiet));

    let mut config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Configuration error");
            return ExitCode::FAILURE;
        }
    };
    if let Some(name) = args.name {
        config.name = name;
    }

    info!(
        name = %config.name,
        version = env!("CARGO_PKG_VERSION"),
        "Starting server"
    );

    let backend = match HostBackend::new(config.clone()).await {
        Ok(backend) => backend,
        Err(e) => {
            error!(error = %e, "Failed to set up server");
            return ExitCode::FAILURE;
        }
    };

    let mut server = McpServer::new(config.name, env!("CARGO_PKG_VERSION"), StdioTransport::stdio())
        .with_backend(Arc::new(backend));

    let outcome = tokio::select! {
        result = server.run() => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    match outcome {
        Some(Ok(stats)) => {
            info!(
                handled = stats.handled,
                malformed = stats.malformed,
                "Server shut down gracefully"
            );
            ExitCode::SUCCESS
        }
        Some(Err(e)) => {
            error!(error = %e, "Server error");
            server.shutdown().await;
            ExitCode::FAILURE
        }
        None => {
            info!("Interrupted");
            server.shutdown().await;
            ExitCode::SUCCESS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn test_log_level() {
        assert_eq!(log_level(0, false), Level::WARN);
        assert_eq!(log_level(2, false), Level::DEBUG);
        assert_eq!(log_level(5, false), Level::TRACE);
        assert_eq!(log_level(3, true), Level::ERROR);
    }
}

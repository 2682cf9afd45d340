//! Probe protocol diagnostic CLI.
//!
//! # Commands
//!
//! - `handshake` - Run the handshake against an agent and print the directives
//! - `decode` - Parse a captured agent response

use std::io::{self, Read};
use std::path::PathBuf;

use bf_probe::{
    ApmResponse, Connection, Directives, Handshake, ProbeConfig, Response, SessionConfig, VERSION,
};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "bf-probe")]
#[command(version = VERSION)]
#[command(about = "Probe-side agent handshake client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the handshake and print the merged directives as JSON
    Handshake {
        /// Signed query: <challenge>&signature=<sig>&<args>
        #[arg(short, long)]
        query: String,

        /// Agent socket (default: config file, BLACKFIRE_AGENT_SOCKET, platform default)
        #[arg(short, long)]
        socket: Option<String>,

        /// Timeout of each socket operation, in seconds
        #[arg(short, long)]
        timeout: Option<f64>,

        /// Configuration payload to offer the agent
        #[arg(long)]
        blackfire_yml: Option<PathBuf>,

        /// TOML config file (default: <config dir>/blackfire/probe.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,
    },

    /// Parse a captured agent response and print it as JSON
    Decode {
        /// Response file (or - for stdin)
        input: Option<String>,

        /// Parse as a multi-section (APM) response
        #[arg(long)]
        apm: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Handshake {
            query,
            socket,
            timeout,
            blackfire_yml,
            config,
            verbose,
        } => cmd_handshake(&query, socket, timeout, blackfire_yml, config, verbose),

        Commands::Decode { input, apm } => cmd_decode(input, apm),
    }
}

fn cmd_handshake(
    query: &str,
    socket: Option<String>,
    timeout: Option<f64>,
    blackfire_yml: Option<PathBuf>,
    config_path: Option<PathBuf>,
    verbose: bool,
) -> anyhow::Result<()> {
    // Initialize logging
    let log_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let mut config = match config_path.or_else(ProbeConfig::default_path) {
        Some(path) if path.exists() => ProbeConfig::from_file(path)?,
        _ => ProbeConfig::default(),
    };
    config = config.merge(ProbeConfig::from_env());
    if let Some(socket) = socket {
        config.agent.socket = socket;
    }
    if let Some(secs) = timeout {
        config.agent.timeout_secs = secs;
    }

    let session = SessionConfig::from_query(query)?;
    let yml = blackfire_yml.map(std::fs::read_to_string).transpose()?;
    let handshake = Handshake::new(&session).with_blackfire_yml(yml.as_deref());

    tracing::info!(
        "Connecting to {} (timeout {:?})",
        config.agent.socket,
        config.agent.timeout()
    );
    let mut conn = Connection::new(&config.agent.socket, config.agent.timeout())?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(conn.connect(Some(&handshake)))?;

    let response = conn
        .agent_response()
        .ok_or_else(|| anyhow::anyhow!("handshake finished without a response"))?;
    let output = json!({
        "status": response.status_val(),
        "args": response.args(),
        "timespan": response.timespan_selectors(),
        "constants": response.constants(),
        "instrumented_functions": response.instrumented_functions(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    conn.close();
    Ok(())
}

fn cmd_decode(input: Option<String>, apm: bool) -> anyhow::Result<()> {
    let data = read_input(input)?;

    let output: Value = if apm {
        let response = ApmResponse::from_bytes(&data)?;
        json!({
            "status": response.status_val(),
            "update_config": response.update_config(),
            "args": response.args(),
            "key_pages": response.key_pages(),
            "timespan": response.timespan_selectors(),
            "instrumented_functions": response.instrumented_functions(),
        })
    } else {
        let response = Response::from_bytes(&data)?;
        json!({
            "ok": response.is_ok(),
            "status": response.status_val(),
            "args": response.args(),
            "timespan": response.timespan_selectors(),
            "constants": response.constants(),
            "instrumented_functions": response.instrumented_functions(),
        })
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

// Helper functions

fn read_input(input: Option<String>) -> anyhow::Result<Vec<u8>> {
    match input.as_deref() {
        Some(path) if path != "-" => Ok(std::fs::read(path)?),
        _ => {
            let mut buffer = Vec::new();
            io::stdin().read_to_end(&mut buffer)?;
            Ok(buffer)
        }
    }
}

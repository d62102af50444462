// src/bin/focusbridge.rs

use anyhow::{Context, Result};
use clap::Parser;
use focusbridge::core::config::CoreConfig;
use focusbridge::core::pipeline::OperationPipeline;
use focusbridge::models::OperationRequest;
use focusbridge::system::osascript::OsaRunner;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// focusbridge: a stdin/stdout adapter around the automation core.
/// Reads one JSON operation request per line and writes one result
/// envelope per line. Exits cleanly when stdin closes.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Path to an alternative configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Disable result caching for this process.
    #[arg(long)]
    no_cache: bool,

    /// Override the execution timeout, in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Override the scripting name of the target application.
    #[arg(long)]
    target: Option<String>,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    if let Err(e) = run(Cli::parse()).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config =
        CoreConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if cli.no_cache {
        config.cache_enabled = false;
    }
    if let Some(secs) = cli.timeout_secs {
        config.exec_timeout = Duration::from_secs(secs);
    }
    if let Some(target) = cli.target {
        config.target_app = target;
    }

    let pipeline = OperationPipeline::from_config(&config, Arc::new(OsaRunner));
    log::info!(
        "focusbridge ready (target: '{}', cache: {}).",
        config.target_app,
        if config.cache_enabled { "on" } else { "off" }
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<OperationRequest>(&line) {
            Ok(request) => {
                let envelope = pipeline.dispatch(request).await;
                serde_json::to_string(&envelope)
                    .unwrap_or_else(|e| adapter_error(&format!("envelope serialization: {e}")))
            }
            // Malformed framing is an adapter problem, not a core one; the
            // core only ever sees validated requests.
            Err(e) => {
                log::warn!("Rejected malformed request line: {e}");
                adapter_error(&format!("malformed request: {e}"))
            }
        };
        stdout.write_all(response.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    log::info!("stdin closed; shutting down.");
    Ok(())
}

fn adapter_error(message: &str) -> String {
    json!({
        "success": false,
        "error": { "kind": "invalid_request", "message": message }
    })
    .to_string()
}

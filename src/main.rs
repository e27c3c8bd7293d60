use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use parley_gateway::api::ApiServerBuilder;
use parley_gateway::engines::probe_engines;
use parley_gateway::voice::detect_turn;
use parley_gateway::{Config, Engines};

/// Parley - real-time voice conversation gateway
#[derive(Parser)]
#[command(name = "parley", version, about)]
struct Cli {
    /// Port to listen on (overrides config and environment)
    #[arg(long)]
    port: Option<u16>,

    /// Path to the TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Check that every external engine is reachable
    Check,
    /// Print the turn decision for a transcript
    AnalyzeTurn {
        /// Transcribed text to classify
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,parley_gateway=info",
        1 => "info,parley_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    if let Some(Command::AnalyzeTurn { text }) = &cli.command {
        let decision = detect_turn(text);
        let output = serde_json::json!({
            "state": decision.state,
            "confidence": decision.confidence,
            "should_respond": decision.should_respond(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(ExitCode::SUCCESS);
    }

    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "loaded configuration");

    if matches!(cli.command, Some(Command::Check)) {
        return Ok(check(&config).await);
    }

    let port = cli.port.unwrap_or(config.server.port);
    tracing::info!(port, "starting parley gateway");

    let engines = Engines::from_config(&config)?;
    ApiServerBuilder::new(config, engines)
        .port(port)
        .build()
        .run()
        .await?;

    Ok(ExitCode::SUCCESS)
}

/// Probe every engine and report one line per engine
async fn check(config: &Config) -> ExitCode {
    println!("Checking engines...");
    let status = probe_engines(config).await;

    for (name, ok) in status.entries() {
        let verdict = if ok { "PASS" } else { "FAIL" };
        println!("  {name:<8} {verdict}");
    }

    if status.all_ok() {
        println!("All engines available");
        ExitCode::SUCCESS
    } else {
        println!("Some engines are unavailable");
        ExitCode::FAILURE
    }
}

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tabtally::config::{self, TallyConfig};
use tabtally::replay::{self, TraceStep};

#[derive(Parser)]
#[command(name = "tabtally", version, about = "Per-tab URL-change tally coordinator")]
struct Cli {
    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a recorded platform-event trace against a simulated host
    /// and print every UI push as a JSON line.
    Replay {
        trace: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Validate a configuration file and print the resolved values.
    CheckConfig { path: PathBuf },
}

fn init_logging(level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Command::Replay { trace, config } => {
            let config = match config {
                Some(path) => config::load_from_path(&path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => TallyConfig::default(),
            };
            let raw = std::fs::read_to_string(&trace)
                .with_context(|| format!("reading trace {}", trace.display()))?;
            let steps: Vec<TraceStep> =
                serde_json::from_str(&raw).context("parsing trace file")?;

            let (coordinator, host) = replay::build_simulated(&config)?;
            let messages = replay::run(&coordinator, &host, &config.ui_origin, steps).await;

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            for message in messages {
                serde_json::to_writer(&mut out, &message)?;
                writeln!(out)?;
            }
            Ok(())
        }
        Command::CheckConfig { path } => {
            let config = config::load_from_path(&path)
                .with_context(|| format!("loading config {}", path.display()))?;
            config.engine_config().context("validating config")?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

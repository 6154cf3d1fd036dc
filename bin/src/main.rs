//! Tarifa CLI binary.
//!
//! Provides a command-line interface over the factor expression engine,
//! the signal generator, and the rotation/portfolio backtesters.

mod cmd;
mod data;

use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tarifa_traits::AssetType;
use tracing_subscriber::EnvFilter;

use cmd::backtest::{BacktestKind, OutputFormat};
use cmd::signals::FilterPreset;

/// ETF or A-share equity universe.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Mode {
    Etf,
    Ashare,
}

impl From<Mode> for AssetType {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Etf => Self::Etf,
            Mode::Ashare => Self::AShare,
        }
    }
}

#[derive(Parser)]
#[command(name = "tarifa")]
#[command(about = "Strategy evaluation and backtest engine for Chinese-market ETFs and A-shares", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate buy/sell/hold signals for one strategy on a single date.
    Signals {
        /// Directory of TOML strategy declarations.
        #[arg(long, default_value = "strategies")]
        strategies_dir: PathBuf,

        /// Directory of bars.json / classification.json / fundamentals.json.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Strategy file name (without extension).
        name: String,

        /// ETF or A-share universe.
        #[arg(long, value_enum, default_value = "etf")]
        mode: Mode,

        /// Date to generate signals for (YYYY-MM-DD). Defaults to the
        /// strategy's declared end date.
        #[arg(long)]
        date: Option<String>,

        /// Smart Filter preset.
        #[arg(long, value_enum, default_value = "balanced")]
        filter: FilterPreset,
    },

    /// Run a strategy through the rotation or portfolio backtester.
    Backtest {
        /// Directory of TOML strategy declarations.
        #[arg(long, default_value = "strategies")]
        strategies_dir: PathBuf,

        /// Directory of bars.json / classification.json / fundamentals.json.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Strategy file name (without extension).
        name: String,

        /// ETF or A-share universe.
        #[arg(long, value_enum, default_value = "etf")]
        mode: Mode,

        /// Which backtester drives the run.
        #[arg(long, value_enum, default_value = "rotation")]
        r#type: BacktestKind,

        /// Output format.
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Load and validate every strategy in a directory without running it.
    Validate {
        /// Directory of TOML strategy declarations.
        #[arg(long, default_value = "strategies")]
        strategies_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(std::io::stderr).init();

    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Signals { strategies_dir, data_dir, name, mode, date, filter } => {
            cmd::signals::run(strategies_dir, data_dir, name, mode.into(), date, filter).await?;
        }
        Commands::Backtest { strategies_dir, data_dir, name, mode, r#type, format } => {
            cmd::backtest::run(strategies_dir, data_dir, name, mode.into(), r#type, format).await?;
        }
        Commands::Validate { strategies_dir } => {
            cmd::validate::run(strategies_dir)?;
        }
    }

    Ok(())
}

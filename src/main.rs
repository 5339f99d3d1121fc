//! Rustsignal - model-driven trading signal for a single pair
//!
//! Loads an exported classifier and its cutoffs, scores the most recent
//! candles from the local database and prints `buy`, `sell` or `hold`.
//!
//! # Usage
//! ```sh
//! cargo run -- run --pair BTCUSDT --model neural_net_model
//! cargo run -- series --candle-time 2024-03-01T12:00:00+00:00
//! cargo run -- models
//! ```
//!
//! # Environment Variables
//! - `DATABASE_URL` - Candle database (default: sqlite://./database.sqlite)
//! - `MODELS_DIR` - Generated models directory (default: ./models/generated)
//! - `SIGNAL_BACKEND` - `model` or `stub` (default: model)
//! - `LOG_LEVEL` / `INFERENCE_LOG_LEVEL` - Log verbosity (default: info / error)

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use rustsignal::application::ml::random_signal::random_signal;
use rustsignal::application::{SignalPipeline, SignalRequest};
use rustsignal::config::{Config, SignalBackend};
use rustsignal::domain::types::Pair;
use rustsignal::infrastructure::observability::init_tracing;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the signal for the most recent candle
    Run(SignalArgs),
    /// Print the signal of every fetched candle, oldest first
    Series(SignalArgs),
    /// List generated models, newest first
    Models,
}

#[derive(Args, Debug, Default)]
struct SignalArgs {
    /// Trading pair (defaults to PAIR)
    #[arg(long)]
    pair: Option<Pair>,

    /// Model directory name under MODELS_DIR (defaults to MODEL_NAME)
    #[arg(long)]
    model: Option<String>,

    /// Ignore candles opened after this RFC 3339 timestamp
    #[arg(long)]
    candle_time: Option<DateTime<Utc>>,
}

impl SignalArgs {
    fn into_request(self, config: &Config) -> SignalRequest {
        SignalRequest {
            pair: self.pair.unwrap_or_else(|| config.model.default_pair.clone()),
            model_name: self
                .model
                .unwrap_or_else(|| config.model.default_model.clone()),
            candle_time: self.candle_time,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Arguments first, so --help works whatever the environment holds
    let cli = Cli::parse();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(&config.observability)?;

    let pipeline = SignalPipeline::from_config(&config);

    match cli.command.unwrap_or(Command::Run(SignalArgs::default())) {
        Command::Run(args) => {
            let request = args.into_request(&config);
            let signal = match config.model.backend {
                SignalBackend::Model => pipeline.run(&request).await?,
                SignalBackend::Stub => {
                    warn!("SIGNAL_BACKEND=stub: emitting a random placeholder signal");
                    random_signal(&mut rand::rng())
                }
            };
            match signal.position_decision() {
                Some(decision) => info!("{} maps to position decision {:?}", signal, decision),
                None => info!("{} leaves the position unchanged", signal),
            }
            println!("{}", signal);
        }
        Command::Series(args) => {
            if config.model.backend == SignalBackend::Stub {
                anyhow::bail!("The stub backend only supports the run command");
            }
            let request = args.into_request(&config);
            let signals = pipeline.run_series(&request).await?;
            info!("Evaluated {} candles for {}", signals.len(), request.pair);
            for timed in signals {
                println!("{}\t{}", timed.open_time.to_rfc3339(), timed.signal);
            }
        }
        Command::Models => {
            for model in pipeline.store().list()? {
                println!(
                    "{:<4}\t{}\t{}\t{}\t{}",
                    model.status(),
                    model.pair,
                    model.name,
                    model.created_at.to_rfc3339(),
                    model.error
                );
            }
        }
    }

    Ok(())
}

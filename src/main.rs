//! Algorand Vanity Address Marketplace Miner CLI
//!
//! Usage:
//!   algo-vanity --addr <REWARDS_ADDRESS>                 # Mine on testnet
//!   algo-vanity --addr <ADDR> --max-length 5 -w 8        # Only short prefixes, 8 threads
//!   algo-vanity --addr <ADDR> --generator command --generator-cmd ./vanitygen

use std::fs;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use algo_vanity::config::GeneratorKind;
use algo_vanity::ledger::{AlgodClient, Ledger};
use algo_vanity::miner::SUBSIDY_PROGRAM_TEMPLATE;
use algo_vanity::search::{CommandGenerator, Engine, Generator, NativeGenerator};
use algo_vanity::{Config, Miner, MiningLoop};

/// Key-rate measurement time when sizing batches automatically.
const OPTIMIZE_BUDGET: Duration = Duration::from_millis(500);

fn main() {
    let config = Config::parse();

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration error: {}", e);
        process::exit(1);
    }

    setup_tracing(&config.log_level);

    if let Err(e) = run(&config) {
        error!(error = %e, "Miner failed to start");
        process::exit(1);
    }
}

fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let settings = config.settings()?;

    let template = match &config.subsidy_program {
        Some(path) => fs::read_to_string(path)?,
        None => SUBSIDY_PROGRAM_TEMPLATE.to_string(),
    };

    info!(
        algod = %config.algod,
        app_id = config.appid,
        rewards = %settings.rewards,
        "Algorand Vanity Address Miner"
    );

    let ledger: Arc<dyn Ledger> = Arc::new(AlgodClient::new(&config.algod, &config.algod_token)?);
    let miner = Miner::new(ledger, config.appid, &template)?;

    let generator = build_generator(config)?;
    let mut mining = MiningLoop::new(&miner, generator, settings);

    // Set up ctrl-c handler
    ctrlc_handler(mining.stop_flag_clone());

    mining.run();
    Ok(())
}

fn build_generator(config: &Config) -> Result<Box<dyn Generator>, Box<dyn std::error::Error>> {
    let generator: Box<dyn Generator> = match config.generator {
        GeneratorKind::Native => {
            let engine = Engine::new(config.worker_count())?;
            info!(workers = engine.workers(), batch = config.batch, "Using native search engine");
            Box::new(NativeGenerator::new(engine, config.batch, OPTIMIZE_BUDGET))
        }
        GeneratorKind::Command => {
            let program = config
                .generator_cmd
                .clone()
                .ok_or("--generator command requires --generator-cmd")?;
            info!(program = %program.display(), batch = config.batch, "Using external search tool");
            Box::new(CommandGenerator::new(
                program,
                config.generator_args.clone(),
                config.batch,
            ))
        }
    };
    Ok(generator)
}

fn setup_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn ctrlc_handler(stop_flag: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        stop_flag.store(true, Ordering::Relaxed);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }
}

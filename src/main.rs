use clap::{Parser, Subcommand};
use fortunate::batch_sizer::BatchSizerConfig;
use fortunate::checkpoint::{CheckpointLoad, CheckpointStore, CheckpointSummary, DEFAULT_CHECKPOINT_FILE};
use fortunate::config::{ExpeditionConfig, DEFAULT_ROUNDS};
use fortunate::oracle::MillerRabin;
use fortunate::orchestrator::{Expedition, StopSignal};
use fortunate::primes::PrimorialSpace;
use fortunate::state::IndexRange;
use fortunate::ExpeditionError;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "fortunate")]
#[command(about = "Checkpointed parallel search for Fortunate numbers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute F(first)..=F(last), resuming from a checkpoint if asked
    Run {
        first: u64,
        /// Defaults to FIRST
        last: Option<u64>,
        /// Continue from the checkpoint when its range matches
        #[arg(long)]
        resume: bool,
        /// Worker threads (default: available parallelism)
        #[arg(long)]
        workers: Option<usize>,
        #[arg(long, default_value = DEFAULT_CHECKPOINT_FILE)]
        checkpoint: PathBuf,
        /// Markdown file recording worker assignments per answer
        #[arg(long)]
        log: Option<PathBuf>,
        /// Miller-Rabin rounds
        #[arg(long, default_value_t = DEFAULT_ROUNDS)]
        rounds: u32,
        /// Target seconds per batch
        #[arg(long, default_value_t = 5.0)]
        target_secs: f64,
        #[arg(long, default_value_t = 10)]
        min_width: u64,
        #[arg(long, default_value_t = 5000)]
        max_width: u64,
        #[arg(long, default_value_t = 100)]
        initial_width: u64,
    },
    /// Show what a checkpoint holds
    Status {
        #[arg(long, default_value = DEFAULT_CHECKPOINT_FILE)]
        checkpoint: PathBuf,
    },
}

fn main() -> Result<(), ExpeditionError> {
    fortunate::init_tracing("fortunate");
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            first,
            last,
            resume,
            workers,
            checkpoint,
            log,
            rounds,
            target_secs,
            min_width,
            max_width,
            initial_width,
        } => {
            if !target_secs.is_finite() || target_secs <= 0.0 {
                return Err(ExpeditionError::Config(format!(
                    "target seconds must be positive, got {}",
                    target_secs
                )));
            }
            let mut config = ExpeditionConfig::new(IndexRange::new(first, last.unwrap_or(first)));
            config.workers = workers;
            config.checkpoint_path = checkpoint;
            config.resume = resume;
            config.log_path = log;
            config.rounds = rounds;
            config.sizer = BatchSizerConfig {
                initial_width,
                min_width,
                max_width,
                target: Duration::from_secs_f64(target_secs),
                ..BatchSizerConfig::default()
            };
            run(config)
        }
        Commands::Status { checkpoint } => {
            status(checkpoint);
            Ok(())
        }
    }
}

fn run(config: ExpeditionConfig) -> Result<(), ExpeditionError> {
    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || handler_stop.stop())
        .map_err(|e| ExpeditionError::Config(format!("failed to set signal handler: {}", e)))?;

    let range = config.range;
    let checkpoint = config.checkpoint_path.clone();
    let space = Arc::new(PrimorialSpace);
    let oracle = Arc::new(MillerRabin::new(config.rounds)?);

    let mut expedition = Expedition::new(config, space.as_ref(), stop.clone())?;
    let answers = expedition.run(space, oracle)?;

    for (index, answer) in &answers {
        println!("F({}) = {}", index, answer);
    }
    if answers.len() < range.len() {
        println!(
            "Paused with {}/{} results. Resume with: fortunate run {} {} --resume --checkpoint {}",
            answers.len(),
            range.len(),
            range.first_index,
            range.last_index,
            checkpoint.display()
        );
    }
    Ok(())
}

fn status(path: PathBuf) {
    let store = CheckpointStore::new(path);
    match store.load() {
        CheckpointLoad::Missing => println!("No checkpoint found at {}", store.path().display()),
        CheckpointLoad::Corrupt(reason) => {
            println!("Checkpoint at {} is corrupted: {}", store.path().display(), reason)
        }
        CheckpointLoad::Loaded(state) => print!(
            "{}",
            CheckpointSummary {
                path: store.path(),
                state: &state,
            }
        ),
    }
}

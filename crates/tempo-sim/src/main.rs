use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use clap::{ArgAction, Parser, Subcommand};
use log::{Level, LevelFilter, Log, Metadata, Record};
use tempo_core::{ChannelCommunicator, ParallelContext, TempoError};
use tempo_mcmc::RunConfig;

use commands::{
    estimate::{self, EstimateArgs},
    mcmc::{self, McmcArgs},
    power::{self, PowerArgs},
};

mod commands;
mod setup;

#[derive(Parser, Debug)]
#[command(name = "tempo-sim", about = "Tempered MCMC and marginal-likelihood CLI")]
struct Cli {
    /// Raise the log level (`-v` info, `-vv` debug, `-vvv` trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sample the posterior of the reference model and write the cold-chain trace.
    Mcmc(McmcArgs),
    /// Estimate the marginal likelihood with an adaptive or fixed stone ladder.
    PowerPosterior(PowerArgs),
    /// Recompute path-sampling and stepping-stone estimates from a summary file.
    Estimate(EstimateArgs),
}

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        match record.level() {
            Level::Info => eprintln!("{}", record.args()),
            level => eprintln!("[{level}] {}: {}", record.target(), record.args()),
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.command {
        Command::Mcmc(args) => mcmc::run(&args),
        Command::PowerPosterior(args) => power::run(&args),
        Command::Estimate(args) => estimate::run(&args),
    }
}

/// Reads a run configuration and points every output into `out_dir`.
fn load_config(path: &Path, out_dir: &Path) -> Result<RunConfig, Box<dyn Error>> {
    let mut config = RunConfig::load(path)?;
    config.output.run_directory = out_dir.to_path_buf();
    if config.power.filename.is_relative() {
        config.power.filename = out_dir.join(&config.power.filename);
    }
    if let Some(checkpoint) = config.checkpoint.path.as_mut() {
        if checkpoint.is_relative() {
            *checkpoint = out_dir.join(&*checkpoint);
        }
    }
    Ok(config)
}

fn write_json<P: AsRef<Path>, T: serde::Serialize>(
    path: P,
    value: &T,
) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

/// Runs `job` once per rank, each on its own thread, and collects the results
/// in rank order.
fn on_ranks<T, F>(processes: usize, job: F) -> Result<Vec<T>, Box<dyn Error>>
where
    T: Send + 'static,
    F: Fn(Arc<ChannelCommunicator>, ParallelContext) -> Result<T, TempoError>
        + Send
        + Sync
        + 'static,
{
    let job = Arc::new(job);
    let handles: Vec<_> = ChannelCommunicator::group(processes)
        .into_iter()
        .map(|comm| {
            let job = Arc::clone(&job);
            thread::spawn(move || {
                let comm = Arc::new(comm);
                let context = ParallelContext::from_communicator(comm.as_ref());
                job(comm, context)
            })
        })
        .collect();
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        let result = handle.join().map_err(|_| "rank thread panicked")?;
        results.push(result?);
    }
    Ok(results)
}

/// Copies an input file into the run directory under `name`.
///
/// An input that already is the target is left untouched.
fn copy_input(from: &Path, out_dir: &Path, name: &str) -> Result<PathBuf, Box<dyn Error>> {
    let target = out_dir.join(name);
    if let (Ok(source), Ok(existing)) = (fs::canonicalize(from), fs::canonicalize(&target)) {
        if source == existing {
            return Ok(target);
        }
    }
    fs::copy(from, &target).map_err(|err| {
        format!(
            "could not copy {} into {}: {err}",
            from.display(),
            target.display()
        )
    })?;
    Ok(target)
}

//! YAML configuration schema and defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempo_core::{ErrorInfo, TempoError};

use crate::analysis::StoppingRule;
use crate::mcmcmc::{HeatLadder, SwapMode};
use crate::schedule::ScheduleKind;

/// YAML-configurable parameters of an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Sampling generations (per stone for power-posterior runs).
    pub generations: u64,
    /// Burn-in generations run before sampling.
    #[serde(default)]
    pub burn_in: u64,
    /// Generations between two tuning steps during burn-in.
    #[serde(default = "default_tuning_interval")]
    pub tuning_interval: u64,
    /// Move schedule used by every chain.
    #[serde(default)]
    pub schedule: ScheduleKind,
    /// Sampler driving the analysis.
    #[serde(default)]
    pub sampler: SamplerKind,
    /// Metropolis-coupled settings, used when `sampler` is `mcmcmc`.
    #[serde(default)]
    pub mc3: Mc3Config,
    /// Power-posterior settings.
    #[serde(default)]
    pub power: PowerConfig,
    /// Additional stopping rules checked once per generation.
    #[serde(default)]
    pub stopping: StoppingConfig,
    /// Checkpointing behaviour.
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    /// Master seed and substream policy.
    #[serde(default)]
    pub seed_policy: SeedPolicy,
    /// Rank layout.
    #[serde(default)]
    pub parallel: ParallelConfig,
    /// Output locations.
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_tuning_interval() -> u64 {
    100
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            generations: 1000,
            burn_in: 0,
            tuning_interval: default_tuning_interval(),
            schedule: ScheduleKind::default(),
            sampler: SamplerKind::default(),
            mc3: Mc3Config::default(),
            power: PowerConfig::default(),
            stopping: StoppingConfig::default(),
            checkpoint: CheckpointConfig::default(),
            seed_policy: SeedPolicy::default(),
            parallel: ParallelConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl RunConfig {
    /// Parses a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, TempoError> {
        serde_yaml::from_str(yaml).map_err(|err| {
            TempoError::Config(ErrorInfo::new("config-parse", err.to_string()))
        })
    }

    /// Reads and parses a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self, TempoError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|err| TempoError::io("config-read", err, path))?;
        Self::from_yaml_str(&contents).map_err(|err| match err {
            TempoError::Config(info) => {
                TempoError::Config(info.with_context("path", path.display().to_string()))
            }
            other => other,
        })
    }

    /// Serialises the configuration back to YAML.
    pub fn to_yaml(&self) -> Result<String, TempoError> {
        serde_yaml::to_string(self)
            .map_err(|err| TempoError::Serde(ErrorInfo::new("config-serialize", err.to_string())))
    }

    /// Rejects configurations that cannot produce a valid run.
    ///
    /// Called before any chain is built so failures surface before sampling.
    pub fn validate(&self) -> Result<(), TempoError> {
        if self.generations == 0 {
            return Err(invalid("generations", "at least one generation is required"));
        }
        if self.tuning_interval == 0 {
            return Err(invalid("tuning_interval", "tuning interval must be positive"));
        }
        if self.sampler == SamplerKind::Mcmcmc {
            self.mc3.validate()?;
        }
        if self.parallel.processes == 0 || self.parallel.processors_per_likelihood == 0 {
            return Err(invalid("parallel", "process counts must be positive"));
        }
        if self.parallel.processors_per_likelihood > 1 && self.sampler != SamplerKind::Mcmcmc {
            return Err(invalid(
                "parallel.processors_per_likelihood",
                "only coupled chains can be shared between processes",
            ));
        }
        Ok(())
    }

    /// Additional checks for power-posterior analyses.
    pub fn validate_power(&self) -> Result<(), TempoError> {
        self.validate()?;
        self.power.validate(self.generations)
    }
}

/// Sampler variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SamplerKind {
    /// Single Metropolis-Hastings chain.
    #[default]
    Mcmc,
    /// Metropolis-coupled chains.
    Mcmcmc,
    /// Greedy search accepting only improvements.
    HillClimber,
}

/// Metropolis-coupled MCMC settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mc3Config {
    /// Number of chains, one of them cold.
    #[serde(default = "default_chains")]
    pub chains: usize,
    /// Cycles between swap events.
    #[serde(default = "default_swap_interval")]
    pub swap_interval: u64,
    /// Cycles between random-pair swap events when both modes are enabled.
    #[serde(default = "default_swap_interval")]
    pub swap_interval2: u64,
    /// Which pairs are proposed for swapping.
    #[serde(default)]
    pub swap_mode: SwapMode,
    /// Heat ladder.
    #[serde(default)]
    pub ladder: HeatLadder,
    /// Tune the ladder during burn-in.
    #[serde(default = "default_tune_heat")]
    pub tune_heat: bool,
    /// Neighbour-swap acceptance rate the tuning aims for.
    #[serde(default = "default_tune_heat_target")]
    pub tune_heat_target: f64,
}

fn default_chains() -> usize {
    4
}

fn default_swap_interval() -> u64 {
    1
}

fn default_tune_heat() -> bool {
    true
}

fn default_tune_heat_target() -> f64 {
    0.23
}

impl Default for Mc3Config {
    fn default() -> Self {
        Self {
            chains: default_chains(),
            swap_interval: default_swap_interval(),
            swap_interval2: default_swap_interval(),
            swap_mode: SwapMode::default(),
            ladder: HeatLadder::default(),
            tune_heat: default_tune_heat(),
            tune_heat_target: default_tune_heat_target(),
        }
    }
}

impl Mc3Config {
    /// Checks chain count, swap cadence, ladder and tuning target.
    pub fn validate(&self) -> Result<(), TempoError> {
        if self.chains == 0 {
            return Err(invalid("mc3.chains", "at least one chain is required"));
        }
        if self.swap_interval == 0 || self.swap_interval2 == 0 {
            return Err(invalid("mc3.swap_interval", "swap intervals must be positive"));
        }
        if !(self.tune_heat_target > 0.0 && self.tune_heat_target < 1.0) {
            return Err(invalid(
                "mc3.tune_heat_target",
                "target acceptance must lie strictly between 0 and 1",
            ));
        }
        self.ladder.validate(self.chains)
    }
}

/// How the stone ladder is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PowerMode {
    /// Refine the ladder where the quadrature error is largest.
    #[default]
    Adaptive,
    /// Fixed ladder from `cats`/`alpha` or explicit powers.
    Fixed,
}

/// Power-posterior settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerConfig {
    /// Ladder construction.
    #[serde(default)]
    pub mode: PowerMode,
    /// Number of intervals of a fixed ladder.
    #[serde(default = "default_cats")]
    pub cats: usize,
    /// Shape of a fixed ladder; powers are `((K-i)/K)^(1/alpha)`.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Explicit powers for a fixed ladder.
    #[serde(default)]
    pub powers: Option<Vec<f64>>,
    /// Generations between two recorded likelihood samples.
    #[serde(default = "default_sample_freq")]
    pub sample_freq: u64,
    /// Convergence tolerance of the adaptive estimate.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Upper bound on adaptation passes.
    #[serde(default = "default_max_refinements")]
    pub max_refinements: usize,
    /// Summary file; stone files are derived from it.
    #[serde(default = "default_power_filename")]
    pub filename: PathBuf,
}

fn default_cats() -> usize {
    50
}

fn default_alpha() -> f64 {
    0.2
}

fn default_sample_freq() -> u64 {
    100
}

fn default_tolerance() -> f64 {
    0.01
}

fn default_max_refinements() -> usize {
    32
}

fn default_power_filename() -> PathBuf {
    PathBuf::from("powp.out")
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            mode: PowerMode::default(),
            cats: default_cats(),
            alpha: default_alpha(),
            powers: None,
            sample_freq: default_sample_freq(),
            tolerance: default_tolerance(),
            max_refinements: default_max_refinements(),
            filename: default_power_filename(),
        }
    }
}

impl PowerConfig {
    /// Fatal checks made before any stone runs.
    pub fn validate(&self, generations: u64) -> Result<(), TempoError> {
        if self.sample_freq == 0 {
            return Err(invalid("power.sample_freq", "sample frequency must be positive"));
        }
        if generations < self.sample_freq {
            return Err(TempoError::Config(
                ErrorInfo::new(
                    "sample-freq-exceeds-generations",
                    "Trying to run a power posterior analysis for fewer generations than the sample frequency, no samples will be stored",
                )
                .with_context("generations", generations.to_string())
                .with_context("sample_freq", self.sample_freq.to_string()),
            ));
        }
        if self.filename.extension().is_none() {
            return Err(TempoError::Config(
                ErrorInfo::new(
                    "missing-extension",
                    "Please provide a filename with an extension",
                )
                .with_context("filename", self.filename.display().to_string())
                .with_hint("use a name such as powp.out"),
            ));
        }
        if !(self.tolerance > 0.0) {
            return Err(invalid("power.tolerance", "tolerance must be positive"));
        }
        if self.mode == PowerMode::Fixed {
            match &self.powers {
                Some(powers) if powers.iter().any(|p| !(0.0..=1.0).contains(p)) => {
                    return Err(invalid("power.powers", "powers must lie in [0, 1]"));
                }
                Some(powers) if powers.len() < 2 => {
                    return Err(invalid("power.powers", "at least two powers are required"));
                }
                Some(powers) if !powers.contains(&1.0) || !powers.contains(&0.0) => {
                    return Err(invalid("power.powers", "the ladder must contain powers 0 and 1"));
                }
                None if self.cats == 0 || !(self.alpha > 0.0) => {
                    return Err(invalid("power.cats", "cats and alpha must be positive"));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Stopping rules beyond the generation count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoppingConfig {
    /// Wall-clock limit in seconds.
    #[serde(default)]
    pub max_time_secs: Option<u64>,
}

impl StoppingConfig {
    /// Rules checked by [`crate::McmcAnalysis::run`] next to the generation limit.
    pub fn rules(&self) -> Vec<StoppingRule> {
        self.max_time_secs
            .map(|secs| StoppingRule::MaxTime(Duration::from_secs(secs)))
            .into_iter()
            .collect()
    }
}

/// Checkpointing configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Generations between checkpoints.
    #[serde(default)]
    pub interval: Option<u64>,
    /// Checkpoint file.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Master seed and substream policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedPolicy {
    /// Master seed every substream derives from.
    #[serde(default = "default_master_seed")]
    pub master_seed: u64,
    /// Free-form label recorded in manifests.
    #[serde(default = "default_seed_label")]
    pub label: String,
}

fn default_master_seed() -> u64 {
    0x5eed
}

fn default_seed_label() -> String {
    "default".to_string()
}

impl Default for SeedPolicy {
    fn default() -> Self {
        Self {
            master_seed: default_master_seed(),
            label: default_seed_label(),
        }
    }
}

/// Rank layout of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// Number of ranks.
    #[serde(default = "default_processes")]
    pub processes: usize,
    /// Ranks cooperating on one power-posterior sampler.
    #[serde(default = "default_processes")]
    pub processors_per_likelihood: usize,
}

fn default_processes() -> usize {
    1
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            processes: default_processes(),
            processors_per_likelihood: default_processes(),
        }
    }
}

/// Output locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory holding every file of the run.
    #[serde(default = "default_run_directory")]
    pub run_directory: PathBuf,
    /// Trace file name inside the run directory.
    #[serde(default = "default_trace_file")]
    pub trace_file: String,
    /// Interval between two trace rows.
    #[serde(default = "default_print_interval")]
    pub print_interval: u64,
}

fn default_run_directory() -> PathBuf {
    PathBuf::from("runs/default")
}

fn default_trace_file() -> String {
    "trace.log".to_string()
}

fn default_print_interval() -> u64 {
    10
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            run_directory: default_run_directory(),
            trace_file: default_trace_file(),
            print_interval: default_print_interval(),
        }
    }
}

impl OutputConfig {
    /// Full path of the trace file.
    pub fn trace_path(&self) -> PathBuf {
        self.run_directory.join(&self.trace_file)
    }
}

fn invalid(field: &str, message: &str) -> TempoError {
    TempoError::Config(ErrorInfo::new("invalid-config", message).with_context("field", field))
}

#![deny(missing_docs)]

//! Tempered MCMC engine: moves and schedules, single chains, Metropolis-coupled
//! chains and the analysis driver that runs them.

pub mod analysis;
pub mod chain;
pub mod checkpoint;
pub mod config;
pub mod determinism;
pub mod manifest;
pub mod mcmcmc;
pub mod monitor;
pub mod moves;
pub mod proposals;
pub mod sampler;
pub mod schedule;

pub use analysis::{McmcAnalysis, RunReport, StoppingRule};
pub use chain::{Chain, MAX_INIT_ATTEMPTS};
pub use checkpoint::{ChainCheckpoint, SamplerCheckpoint};
pub use config::{
    CheckpointConfig, Mc3Config, OutputConfig, ParallelConfig, PowerConfig, PowerMode, RunConfig,
    SamplerKind, SeedPolicy, StoppingConfig,
};
pub use manifest::{digest_file, RunManifest};
pub use mcmcmc::{compute_heat, swap_ln_ratio, HeatLadder, Mcmcmc, SwapMode, SwapStats};
pub use monitor::{with_file_extension, ChainState, Monitor, TraceMonitor};
pub use moves::{
    metropolis_accept, tune_toward, AcceptanceRule, GibbsSampler, Heats, Move, MoveKind,
    MoveSummary, Proposal, LN_REJECT_THRESHOLD,
};
pub use proposals::{NormalGibbs, ScaleProposal, SlideProposal};
pub use sampler::MonteCarloSampler;
pub use schedule::{MoveSchedule, ScheduleKind};

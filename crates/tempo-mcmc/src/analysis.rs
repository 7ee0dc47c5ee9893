//! Burn-in and sampling driver with stopping rules and checkpoints.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use tempo_core::{Communicator, LocalCommunicator, Model, ParallelContext, TempoError};

use crate::moves::MoveSummary;
use crate::sampler::MonteCarloSampler;

/// External condition ending the sampling phase, checked once per generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoppingRule {
    /// Stop once this many generations completed.
    MaxIterations(u64),
    /// Stop once the wall-clock budget is spent.
    MaxTime(Duration),
}

impl StoppingRule {
    fn is_met(&self, generation: u64, started: Instant) -> bool {
        match self {
            StoppingRule::MaxIterations(limit) => generation >= *limit,
            StoppingRule::MaxTime(limit) => started.elapsed() >= *limit,
        }
    }
}

/// Outcome of [`McmcAnalysis::run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Generation reached.
    pub generations: u64,
    /// Rule that ended the run.
    pub stopped_by: StoppingRule,
    /// Wall-clock duration of the sampling phase.
    pub elapsed: Duration,
    /// Checkpoints written, oldest first.
    pub checkpoints: Vec<PathBuf>,
    /// Move statistics by chain index on this rank.
    pub operator_summary: Vec<(usize, Vec<MoveSummary>)>,
}

/// Burn-in and sampling driver around a [`MonteCarloSampler`].
#[derive(Debug)]
pub struct McmcAnalysis<M: Model, C: Communicator = LocalCommunicator> {
    sampler: MonteCarloSampler<M, C>,
    comm: Arc<C>,
    context: ParallelContext,
    master_seed: u64,
    checkpoint: Option<(u64, PathBuf)>,
}

impl<M: Model, C: Communicator> McmcAnalysis<M, C> {
    /// Creates the driver; only the active rank of `context` reports progress.
    pub fn new(
        sampler: MonteCarloSampler<M, C>,
        comm: Arc<C>,
        context: ParallelContext,
        master_seed: u64,
    ) -> Self {
        Self {
            sampler,
            comm,
            context,
            master_seed,
            checkpoint: None,
        }
    }

    /// Writes a checkpoint every `interval` generations.
    pub fn with_checkpoints(mut self, interval: u64, path: impl Into<PathBuf>) -> Self {
        if interval > 0 {
            self.checkpoint = Some((interval, path.into()));
        }
        self
    }

    /// Sampler driven by the analysis.
    pub fn sampler(&self) -> &MonteCarloSampler<M, C> {
        &self.sampler
    }

    /// Mutable sampler access.
    pub fn sampler_mut(&mut self) -> &mut MonteCarloSampler<M, C> {
        &mut self.sampler
    }

    fn progress(&self, len: u64) -> ProgressBar {
        if self.context.is_active() {
            ProgressBar::new(len)
        } else {
            ProgressBar::hidden()
        }
    }

    /// Runs the burn-in phase and clears the counters it accumulated.
    pub fn burnin(&mut self, generations: u64, tuning_interval: u64) -> Result<(), TempoError> {
        if generations == 0 {
            return Ok(());
        }
        if self.context.is_active() {
            log::info!("Running burn-in phase of {generations} generations");
        }
        let bar = self.progress(generations);
        for k in 1..=generations {
            self.sampler.next_cycle(false)?;
            if tuning_interval > 0 && k % tuning_interval == 0 && k != generations {
                self.sampler.tune();
            }
            bar.inc(1);
        }
        bar.finish();
        if self.context.is_active() {
            for (chain, moves) in self.sampler.operator_summary() {
                for summary in moves {
                    log::info!(
                        "chain {chain} {:<16} weight {:>5.1} tried {:>8} accepted {:>8} ratio {:.3} {}",
                        summary.name,
                        summary.weight,
                        summary.tried,
                        summary.accepted,
                        summary.acceptance_ratio,
                        summary.parameters
                    );
                }
            }
        }
        self.sampler.reset();
        Ok(())
    }

    /// Samples until `generations` or any extra stopping rule is reached.
    ///
    /// A sampler past generation zero (restored from a checkpoint) appends to
    /// its monitor files instead of truncating them.
    pub fn run(
        &mut self,
        generations: u64,
        rules: &[StoppingRule],
    ) -> Result<RunReport, TempoError> {
        let resuming = self.sampler.generation() > 0;
        if self.context.is_active() {
            log::info!("{}", self.sampler.strategy_description());
        }
        self.sampler.start_monitors(resuming)?;
        if !resuming {
            self.sampler.monitor(0)?;
        }
        let rules: Vec<StoppingRule> = std::iter::once(StoppingRule::MaxIterations(generations))
            .chain(rules.iter().copied())
            .collect();
        let started = Instant::now();
        let bar = self.progress(generations.saturating_sub(self.sampler.generation()));
        let mut checkpoints = Vec::new();
        let stopped_by = loop {
            if let Some(rule) = self.agreed_stop(&rules, started)? {
                break rule;
            }
            let generation = self.sampler.next_cycle(true)?;
            self.sampler.monitor(generation)?;
            if let Some((interval, path)) = &self.checkpoint {
                if generation % interval == 0 {
                    let path = self.checkpoint_path(path);
                    self.sampler.checkpoint(self.master_seed).store(&path)?;
                    checkpoints.push(path);
                }
            }
            bar.inc(1);
        };
        bar.finish();
        self.sampler.finish_monitors()?;
        self.comm
            .barrier_among(self.context.active_pid, self.context.ranks())?;
        Ok(RunReport {
            generations: self.sampler.generation(),
            stopped_by,
            elapsed: started.elapsed(),
            checkpoints,
            operator_summary: self.sampler.operator_summary(),
        })
    }

    /// First met rule as decided by the active rank.
    ///
    /// Every rank of the group must leave the loop on the same generation, so
    /// clock-based rules are evaluated once and broadcast as a rule index.
    fn agreed_stop(
        &self,
        rules: &[StoppingRule],
        started: Instant,
    ) -> Result<Option<StoppingRule>, TempoError> {
        let generation = self.sampler.generation();
        let met = rules.iter().position(|rule| rule.is_met(generation, started));
        if self.context.num_processes <= 1 {
            return Ok(met.map(|index| rules[index]));
        }
        let decision = match met {
            Some(index) if self.context.is_active() => index as f64,
            _ => -1.0,
        };
        let mut flag = vec![decision];
        self.comm
            .broadcast(self.context.active_pid, self.context.ranks(), &mut flag)?;
        Ok(flag
            .first()
            .filter(|&&value| value >= 0.0)
            .and_then(|&value| rules.get(value as usize))
            .copied())
    }

    fn checkpoint_path(&self, base: &std::path::Path) -> PathBuf {
        if self.context.num_processes > 1 {
            crate::monitor::with_file_extension(base, &format!("_rank_{}", self.context.pid), false)
        } else {
            base.to_path_buf()
        }
    }
}

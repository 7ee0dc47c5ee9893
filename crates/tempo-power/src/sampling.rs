//! Sampling one stone and spreading the stones of a ladder over process groups.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indicatif::ProgressBar;
use tempo_core::{Communicator, ErrorInfo, Model, ParallelContext, Partition, TempoError};
use tempo_mcmc::determinism::stone_seed;
use tempo_mcmc::MonteCarloSampler;

use crate::stone::{stone_file_name, Stone, StoneLadder, StoneWriter};

/// Generation counts shared by every stone of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoneSchedule {
    /// Sampling generations per stone.
    pub generations: u64,
    /// Burn-in generations per stone.
    pub burn_in: u64,
    /// Generations between tuning steps during burn-in.
    pub tuning_interval: u64,
    /// Generations between two recorded likelihoods.
    pub sample_freq: u64,
}

impl StoneSchedule {
    /// Fails when sampling would never record a likelihood.
    pub fn validate(&self) -> Result<(), TempoError> {
        if self.sample_freq == 0 || self.generations < self.sample_freq {
            return Err(TempoError::Config(
                ErrorInfo::new(
                    "sample-freq-exceeds-generations",
                    "Trying to run a power posterior analysis for fewer generations than the sample frequency, no samples will be stored",
                )
                .with_context("generations", self.generations.to_string())
                .with_context("sample_freq", self.sample_freq.to_string()),
            ));
        }
        Ok(())
    }
}

/// Context of the group of `processors_per_likelihood` ranks that `context.pid`
/// samples with.
pub fn likelihood_group(context: ParallelContext, processors_per_likelihood: usize) -> ParallelContext {
    let size = processors_per_likelihood.max(1);
    let offset = context.pid.saturating_sub(context.active_pid);
    let first = context.active_pid + offset / size * size;
    let last = (first + size).min(context.active_pid + context.num_processes);
    context.with_active(first, last - first)
}

/// Mean of the recorded log-likelihoods.
///
/// An empty sample has no mean and is reported as an error.
pub fn average_ln_likelihood(samples: &[f64]) -> Result<f64, TempoError> {
    if samples.is_empty() {
        return Err(TempoError::Config(ErrorInfo::new(
            "zero-samples",
            "no likelihood was recorded for the stone",
        )));
    }
    Ok(samples.iter().sum::<f64>() / samples.len() as f64)
}

/// Runs the stones of a ladder from clones of one prototype sampler.
///
/// Every stone restarts from the prototype with random streams derived from
/// the master seed and the stone index, so the estimates do not depend on the
/// order the stones run in or on the number of processes.
#[derive(Debug)]
pub struct StoneRunner<M: Model, C: Communicator> {
    prototype: MonteCarloSampler<M, C>,
    comm: Arc<C>,
    context: ParallelContext,
    group: ParallelContext,
    group_size: usize,
    filename: PathBuf,
    schedule: StoneSchedule,
    master_seed: u64,
}

impl<M: Model, C: Communicator> StoneRunner<M, C> {
    /// `context` spans every rank of the run; the sampler must have been
    /// built for the group returned by [`likelihood_group`].
    pub fn new(
        prototype: MonteCarloSampler<M, C>,
        comm: Arc<C>,
        context: ParallelContext,
        processors_per_likelihood: usize,
        filename: PathBuf,
        schedule: StoneSchedule,
        master_seed: u64,
    ) -> Self {
        Self {
            prototype,
            comm,
            group: likelihood_group(context, processors_per_likelihood),
            group_size: processors_per_likelihood.max(1),
            context,
            filename,
            schedule,
            master_seed,
        }
    }

    /// Rank layout of the whole run.
    pub fn context(&self) -> ParallelContext {
        self.context
    }

    /// Summary file the stone files derive from.
    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// Communicator of the run.
    pub fn communicator(&self) -> &Arc<C> {
        &self.comm
    }

    fn groups(&self) -> usize {
        self.context.num_processes.div_ceil(self.group_size).max(1)
    }

    fn group_index(&self) -> usize {
        (self.group.active_pid - self.context.active_pid) / self.group_size
    }

    /// Samples every dirty stone and stores the averages in `ladder`.
    ///
    /// Dirty stones are split into contiguous blocks over the process groups.
    /// Afterwards every rank holds the same averages.
    pub fn run_dirty(&self, ladder: &mut StoneLadder) -> Result<(), TempoError> {
        let dirty = ladder.dirty_positions();
        let (groups, group_index) = (self.groups(), self.group_index());
        let blocks = ParallelContext {
            pid: group_index,
            num_processes: groups,
            active_pid: 0,
        }
        .partition(dirty.len());
        let mut results = Vec::new();
        for &item in blocks.items_of(group_index) {
            let position = dirty[item];
            let stone = ladder.stones()[position].clone();
            let average = self.run_stone(&stone, ladder.len())?;
            results.push(position as f64);
            results.push(average);
        }
        let results = self.share_results(results, &blocks)?;
        for pair in results.chunks_exact(2) {
            ladder.set_average(pair[0] as usize, pair[1]);
        }
        Ok(())
    }

    fn share_results(&self, mut local: Vec<f64>, blocks: &Partition) -> Result<Vec<f64>, TempoError> {
        if self.context.num_processes <= 1 {
            return Ok(local);
        }
        let root = self.context.active_pid;
        if self.context.pid == root {
            for group in blocks.owning_ranks().into_iter().filter(|&g| g != 0) {
                local.extend(self.comm.recv(root + group * self.group_size)?);
            }
        } else if self.group.is_active() && !blocks.items_of(self.group_index()).is_empty() {
            self.comm.send(root, &local)?;
        }
        self.comm.broadcast(root, self.context.ranks(), &mut local)?;
        Ok(local)
    }

    /// Burn-in then sampling of one stone; returns the mean log-likelihood.
    ///
    /// The group's active rank writes the samples to the stone file.
    pub fn run_stone(&self, stone: &Stone, ladder_len: usize) -> Result<f64, TempoError> {
        let path = stone_file_name(&self.filename, stone)?;
        let mut sampler = self.prototype.clone();
        sampler.reseed(stone_seed(self.master_seed, stone.index));
        sampler.set_likelihood_heat(stone.power);
        sampler.add_file_extension(&stone.file_extension(), false);
        sampler.reset();

        let active = self.group.is_active();
        if active {
            let width = ladder_len.to_string().len();
            log::info!("Step {:>width$}: power {}", stone.index, stone.power);
        }
        let StoneSchedule {
            generations,
            burn_in,
            tuning_interval,
            sample_freq,
        } = self.schedule;
        let bar = if active {
            ProgressBar::new(burn_in + generations)
        } else {
            ProgressBar::hidden()
        };

        for k in 1..=burn_in {
            sampler.next_cycle(false)?;
            if tuning_interval > 0 && k % tuning_interval == 0 && k != burn_in {
                sampler.tune();
            }
            bar.inc(1);
        }

        let mut writer = if active {
            Some(StoneWriter::create(&path)?)
        } else {
            None
        };
        sampler.start_monitors(false)?;
        sampler.monitor(0)?;
        let mut samples = Vec::new();
        for k in 1..=generations {
            sampler.next_cycle(true)?;
            sampler.monitor(k)?;
            if k % sample_freq == 0 {
                let ln_likelihood = sampler.model_ln_probability(true)?;
                samples.push(ln_likelihood);
                if let Some(writer) = writer.as_mut() {
                    writer.record(k, stone.power, ln_likelihood)?;
                }
            }
            bar.inc(1);
        }
        bar.finish_and_clear();
        if let Some(writer) = writer {
            writer.finish()?;
        }
        sampler.finish_monitors()?;
        average_ln_likelihood(&samples)
    }
}

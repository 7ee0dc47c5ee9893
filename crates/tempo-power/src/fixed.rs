//! Power posterior over a fixed ladder.

use std::path::Path;
use std::sync::Arc;

use tempo_core::{Communicator, Model, ParallelContext, TempoError};
use tempo_mcmc::{MonteCarloSampler, PowerConfig};

use crate::sampling::{StoneRunner, StoneSchedule};
use crate::stone::{require_extension, summarize_stones, StoneLadder};

/// Powers `((K - i) / K)^(1 / alpha)` for `i = 0..=K`, from 1 down to 0.
pub fn fixed_powers(cats: usize, alpha: f64) -> Vec<f64> {
    let k = cats as f64;
    (0..=cats)
        .map(|i| ((k - i as f64) / k).powf(1.0 / alpha))
        .collect()
}

/// Power posterior over a ladder fixed up front.
#[derive(Debug)]
pub struct PowerPosteriorAnalysis<M: Model, C: Communicator> {
    runner: StoneRunner<M, C>,
    ladder: StoneLadder,
}

impl<M: Model, C: Communicator> PowerPosteriorAnalysis<M, C> {
    /// Uses `config.powers` when given, the `cats`/`alpha` ladder otherwise.
    pub fn new(
        sampler: MonteCarloSampler<M, C>,
        comm: Arc<C>,
        context: ParallelContext,
        processors_per_likelihood: usize,
        config: &PowerConfig,
        schedule: StoneSchedule,
        master_seed: u64,
    ) -> Result<Self, TempoError> {
        require_extension(&config.filename)?;
        schedule.validate()?;
        let powers = config
            .powers
            .clone()
            .unwrap_or_else(|| fixed_powers(config.cats, config.alpha));
        Ok(Self {
            runner: StoneRunner::new(
                sampler,
                comm,
                context,
                processors_per_likelihood,
                config.filename.clone(),
                schedule,
                master_seed,
            ),
            ladder: StoneLadder::from_powers(&powers)?,
        })
    }

    /// Stones of the analysis.
    pub fn ladder(&self) -> &StoneLadder {
        &self.ladder
    }

    /// Summary file.
    pub fn filename(&self) -> &Path {
        self.runner.filename()
    }

    /// Samples every stone, then writes the summary file.
    pub fn run_all(&mut self) -> Result<(), TempoError> {
        let context = self.runner.context();
        if context.is_active() {
            log::info!(
                "Running power posterior analysis over {} stones ...",
                self.ladder.len()
            );
        }
        self.runner.run_dirty(&mut self.ladder)?;
        if context.is_active() {
            summarize_stones(self.runner.filename(), &self.ladder)?;
        }
        self.runner
            .communicator()
            .barrier_among(context.active_pid, context.ranks())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::fixed_powers;
    use approx::assert_relative_eq;

    #[test]
    fn fixed_ladder_runs_from_one_to_zero() {
        let powers = fixed_powers(4, 0.5);
        assert_eq!(powers.len(), 5);
        assert_relative_eq!(powers[0], 1.0);
        assert_relative_eq!(powers[2], 0.25);
        assert_relative_eq!(powers[4], 0.0);
    }
}

//! Adaptive power posterior: refine the stone ladder where the quadrature
//! error is largest until the marginal-likelihood estimate settles.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tempo_core::{Communicator, Model, ParallelContext, TempoError};
use tempo_mcmc::{MonteCarloSampler, PowerConfig};

use crate::quadrature::{simpsons_rule, trapezoid_rule};
use crate::sampling::{StoneRunner, StoneSchedule};
use crate::stone::{require_extension, summarize_stones, StoneLadder};

/// Phase of an adaptive run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LadderState {
    /// Nothing sampled yet.
    Idle,
    /// Sampling the dirty stones.
    RunningStone,
    /// Estimating and placing new stones.
    Adapting,
    /// The estimate moved less than the tolerance.
    Converged,
}

/// Simpson estimate over a ladder and the triple fitting it worst.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Adaptation {
    /// Sum of the Simpson estimates of every triple.
    pub estimate: f64,
    /// Position of the middle stone of the worst triple.
    pub worst: usize,
    /// `|trapezoid - simpson|` of the worst triple.
    pub worst_error: f64,
}

/// First estimate: trapezoids over the two segments of the initial ladder.
pub fn first_pass_estimate(ladder: &StoneLadder) -> f64 {
    let stones = ladder.stones();
    if stones.len() < 3 {
        return f64::NAN;
    }
    let (a, c, b) = (&stones[0], &stones[1], &stones[2]);
    trapezoid_rule(a.average_ln_likelihood, c.average_ln_likelihood, a.power, c.power)
        + trapezoid_rule(c.average_ln_likelihood, b.average_ln_likelihood, c.power, b.power)
}

/// Integrates the ladder triple by triple (`(0,1,2)`, `(2,3,4)`, ...).
///
/// Ties keep the first worst triple.
pub fn adapt(ladder: &StoneLadder) -> Adaptation {
    let stones = ladder.stones();
    let mut result = Adaptation {
        estimate: 0.0,
        worst: 1,
        worst_error: f64::NEG_INFINITY,
    };
    let mut i = 1;
    while i + 1 < stones.len() {
        let (a, c, b) = (&stones[i - 1], &stones[i], &stones[i + 1]);
        let (fa, fc, fb) = (
            a.average_ln_likelihood,
            c.average_ln_likelihood,
            b.average_ln_likelihood,
        );
        let trapezoid = trapezoid_rule(fa, fc, a.power, c.power) + trapezoid_rule(fc, fb, c.power, b.power);
        let simpson = simpsons_rule(fa, fb, fc, a.power, b.power, c.power);
        let error = (trapezoid - simpson).abs();
        if error > result.worst_error {
            result.worst_error = error;
            result.worst = i;
        }
        result.estimate += simpson;
        i += 2;
    }
    result
}

/// Thermodynamic integration over an adaptively refined stone ladder.
#[derive(Debug)]
pub struct AdaptivePowerPosterior<M: Model, C: Communicator> {
    runner: StoneRunner<M, C>,
    ladder: StoneLadder,
    tolerance: f64,
    max_refinements: usize,
    state: LadderState,
    estimates: Vec<f64>,
    last: Option<Adaptation>,
}

impl<M: Model, C: Communicator> AdaptivePowerPosterior<M, C> {
    /// Sets up the analysis; the filename must carry an extension.
    ///
    /// `context` spans every rank. `sampler` must have been built for the
    /// group of `processors_per_likelihood` ranks this process belongs to
    /// (see [`crate::likelihood_group`]).
    #[allow(clippy::too_many_arguments)]
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
            ladder: StoneLadder::initial(),
            tolerance: config.tolerance,
            max_refinements: config.max_refinements,
            state: LadderState::Idle,
            estimates: Vec::new(),
            last: None,
        })
    }

    /// Current ladder.
    pub fn ladder(&self) -> &StoneLadder {
        &self.ladder
    }

    /// Current phase.
    pub fn state(&self) -> LadderState {
        self.state
    }

    /// Successive marginal-likelihood estimates, the first-pass one first.
    pub fn estimates(&self) -> &[f64] {
        &self.estimates
    }

    /// Summary file written once the ladder converged.
    pub fn filename(&self) -> PathBuf {
        self.runner.filename().to_path_buf()
    }

    /// Samples the dirty stones.
    pub fn run_stones(&mut self) -> Result<(), TempoError> {
        self.state = LadderState::RunningStone;
        self.runner.run_dirty(&mut self.ladder)
    }

    /// Integrates the current ladder and remembers the worst triple.
    pub fn adapt(&mut self) -> Adaptation {
        self.state = LadderState::Adapting;
        let adaptation = adapt(&self.ladder);
        self.last = Some(adaptation);
        adaptation
    }

    /// Splits the worst triple found by the last [`Self::adapt`].
    pub fn add_stones(&mut self) -> Result<[f64; 2], TempoError> {
        let worst = self.last.map(|a| a.worst).unwrap_or(1);
        let added = self.ladder.split(worst)?;
        log::debug!("added stones at {} and {}", added[0], added[1]);
        Ok(added)
    }

    /// Runs until the estimate changes by less than the tolerance, then writes
    /// the summary file. Returns the final estimate.
    pub fn run_all(&mut self) -> Result<f64, TempoError> {
        let context = self.runner.context();
        if context.is_active() {
            log::info!("Running adaptive power posterior analysis ...");
        }
        self.run_stones()?;
        let mut previous = first_pass_estimate(&self.ladder);
        self.estimates.push(previous);
        let mut refinements = 0;
        let estimate = loop {
            let current = self.adapt().estimate;
            self.estimates.push(current);
            let diff = (current - previous).abs();
            if context.is_active() {
                log::info!(
                    "{} stones: estimate {current:.6}, change {diff:.6}",
                    self.ladder.len()
                );
            }
            if diff < self.tolerance {
                break current;
            }
            if refinements >= self.max_refinements {
                log::warn!(
                    "stopping after {refinements} refinements without reaching tolerance {}",
                    self.tolerance
                );
                break current;
            }
            self.add_stones()?;
            refinements += 1;
            self.run_stones()?;
            previous = current;
        };
        self.state = LadderState::Converged;
        if context.is_active() {
            self.summarize_stones()?;
        }
        self.runner
            .communicator()
            .barrier_among(context.active_pid, context.ranks())?;
        Ok(estimate)
    }

    /// Concatenates the stone files into the summary file.
    pub fn summarize_stones(&self) -> Result<usize, TempoError> {
        summarize_stones(self.runner.filename(), &self.ladder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ladder_with(values: &[f64]) -> StoneLadder {
        let mut ladder = StoneLadder::initial();
        for (position, value) in values.iter().enumerate() {
            ladder.set_average(position, *value);
        }
        ladder
    }

    #[test]
    fn first_pass_uses_two_trapezoids() {
        let ladder = ladder_with(&[-10.0, -20.0, -40.0]);
        assert_relative_eq!(first_pass_estimate(&ladder), -22.5);
    }

    #[test]
    fn adaptation_reports_the_single_triple() {
        let ladder = ladder_with(&[-10.0, -20.0, -40.0]);
        let adaptation = adapt(&ladder);
        assert_eq!(adaptation.worst, 1);
        // parabola through the three points
        assert_relative_eq!(adaptation.estimate, -130.0 / 6.0, epsilon = 1e-12);
        assert_relative_eq!(adaptation.worst_error, 22.5 - 130.0 / 6.0, epsilon = 1e-12);
    }
}

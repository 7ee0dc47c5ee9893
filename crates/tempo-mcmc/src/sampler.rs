//! Closed set of samplers.

use tempo_core::{Communicator, LocalCommunicator, Model, RngHandle, TempoError};

use crate::chain::Chain;
use crate::checkpoint::{ChainCheckpoint, SamplerCheckpoint};
use crate::determinism;
use crate::mcmcmc::Mcmcmc;
use crate::moves::{AcceptanceRule, MoveSummary};

/// Closed set of samplers driven by the analyses.
#[derive(Debug)]
pub enum MonteCarloSampler<M: Model, C: Communicator = LocalCommunicator> {
    /// A single Metropolis-Hastings chain.
    Mcmc(Chain<M>),
    /// Metropolis-coupled chains.
    Mcmcmc(Mcmcmc<M, C>),
    /// A single chain accepting only non-decreasing moves.
    HillClimber(Chain<M>),
}

impl<M: Model, C: Communicator> Clone for MonteCarloSampler<M, C> {
    fn clone(&self) -> Self {
        match self {
            MonteCarloSampler::Mcmc(chain) => MonteCarloSampler::Mcmc(chain.clone()),
            MonteCarloSampler::Mcmcmc(mc3) => MonteCarloSampler::Mcmcmc(mc3.clone()),
            MonteCarloSampler::HillClimber(chain) => MonteCarloSampler::HillClimber(chain.clone()),
        }
    }
}

impl<M: Model, C: Communicator> MonteCarloSampler<M, C> {
    /// Wraps a chain as a plain MCMC sampler.
    pub fn mcmc(chain: Chain<M>) -> Self {
        MonteCarloSampler::Mcmc(chain.with_rule(AcceptanceRule::Metropolis))
    }

    /// Wraps a chain as a hill climber.
    pub fn hill_climber(chain: Chain<M>) -> Self {
        MonteCarloSampler::HillClimber(chain.with_rule(AcceptanceRule::Greedy))
    }

    /// Restarts every random stream from substreams of `master_seed`.
    pub fn reseed(&mut self, master_seed: u64) {
        match self {
            MonteCarloSampler::Mcmc(chain) | MonteCarloSampler::HillClimber(chain) => chain.reseed(
                RngHandle::from_seed(determinism::chain_seed(master_seed, chain.index())),
            ),
            MonteCarloSampler::Mcmcmc(mc3) => mc3.reseed(master_seed),
        }
    }

    /// Re-initialises the sampler from a computable state.
    pub fn initialize(&mut self, prior_only: bool) -> Result<(), TempoError> {
        match self {
            MonteCarloSampler::Mcmc(chain) | MonteCarloSampler::HillClimber(chain) => {
                chain.initialize(prior_only)
            }
            MonteCarloSampler::Mcmcmc(mc3) => mc3.initialize(prior_only),
        }
    }

    /// Runs one cycle and returns the generation.
    pub fn next_cycle(&mut self, advance: bool) -> Result<u64, TempoError> {
        match self {
            MonteCarloSampler::Mcmc(chain) | MonteCarloSampler::HillClimber(chain) => {
                chain.next_cycle(advance)
            }
            MonteCarloSampler::Mcmcmc(mc3) => mc3.next_cycle(advance),
        }
    }

    /// Tunes moves (and the heat ladder of coupled chains).
    pub fn tune(&mut self) {
        match self {
            MonteCarloSampler::Mcmc(chain) | MonteCarloSampler::HillClimber(chain) => chain.tune(),
            MonteCarloSampler::Mcmcmc(mc3) => mc3.tune(),
        }
    }

    /// Burn-in of `generations` cycles with tuning every `tuning_interval`.
    pub fn burnin(&mut self, generations: u64, tuning_interval: u64) -> Result<(), TempoError> {
        match self {
            MonteCarloSampler::Mcmc(chain) | MonteCarloSampler::HillClimber(chain) => {
                chain.burnin(generations, tuning_interval)
            }
            MonteCarloSampler::Mcmcmc(mc3) => mc3.burnin(generations, tuning_interval),
        }
    }

    /// Clears counters and the generation.
    pub fn reset(&mut self) {
        match self {
            MonteCarloSampler::Mcmc(chain) | MonteCarloSampler::HillClimber(chain) => chain.reset(),
            MonteCarloSampler::Mcmcmc(mc3) => mc3.reset(),
        }
    }

    /// Completed generations.
    pub fn generation(&self) -> u64 {
        match self {
            MonteCarloSampler::Mcmc(chain) | MonteCarloSampler::HillClimber(chain) => {
                chain.generation()
            }
            MonteCarloSampler::Mcmcmc(mc3) => mc3.generation(),
        }
    }

    /// Sets the power applied to the likelihood.
    pub fn set_likelihood_heat(&mut self, heat: f64) {
        match self {
            MonteCarloSampler::Mcmc(chain) | MonteCarloSampler::HillClimber(chain) => {
                chain.set_likelihood_heat(heat)
            }
            MonteCarloSampler::Mcmcmc(mc3) => mc3.set_likelihood_heat(heat),
        }
    }

    /// Unheated log probability of the sampled (cold) state.
    pub fn model_ln_probability(&mut self, likelihood_only: bool) -> Result<f64, TempoError> {
        match self {
            MonteCarloSampler::Mcmc(chain) | MonteCarloSampler::HillClimber(chain) => {
                Ok(chain.model_ln_probability(likelihood_only))
            }
            MonteCarloSampler::Mcmcmc(mc3) => mc3.model_ln_probability(likelihood_only),
        }
    }

    /// Records the sampled state.
    pub fn monitor(&mut self, generation: u64) -> Result<(), TempoError> {
        match self {
            MonteCarloSampler::Mcmc(chain) | MonteCarloSampler::HillClimber(chain) => {
                chain.monitor(generation)
            }
            MonteCarloSampler::Mcmcmc(mc3) => mc3.monitor(generation),
        }
    }

    /// Opens monitor outputs.
    pub fn start_monitors(&mut self, append: bool) -> Result<(), TempoError> {
        match self {
            MonteCarloSampler::Mcmc(chain) | MonteCarloSampler::HillClimber(chain) => {
                chain.start_monitors(append)
            }
            MonteCarloSampler::Mcmcmc(mc3) => mc3.start_monitors(append),
        }
    }

    /// Closes monitor outputs.
    pub fn finish_monitors(&mut self) -> Result<(), TempoError> {
        match self {
            MonteCarloSampler::Mcmc(chain) | MonteCarloSampler::HillClimber(chain) => {
                chain.finish_monitors()
            }
            MonteCarloSampler::Mcmcmc(mc3) => mc3.finish_monitors(),
        }
    }

    /// Derives monitor paths for a replicate or stone.
    pub fn add_file_extension(&mut self, extension: &str, directory: bool) {
        match self {
            MonteCarloSampler::Mcmc(chain) | MonteCarloSampler::HillClimber(chain) => {
                chain.add_file_extension(extension, directory)
            }
            MonteCarloSampler::Mcmcmc(mc3) => mc3.add_file_extension(extension, directory),
        }
    }

    /// Human-readable sampling strategy.
    pub fn strategy_description(&self) -> String {
        match self {
            MonteCarloSampler::Mcmc(chain) | MonteCarloSampler::HillClimber(chain) => {
                chain.strategy_description()
            }
            MonteCarloSampler::Mcmcmc(mc3) => mc3.strategy_description(),
        }
    }

    /// Per-move statistics by chain index.
    pub fn operator_summary(&self) -> Vec<(usize, Vec<MoveSummary>)> {
        match self {
            MonteCarloSampler::Mcmc(chain) | MonteCarloSampler::HillClimber(chain) => {
                vec![(chain.index(), chain.operator_summary())]
            }
            MonteCarloSampler::Mcmcmc(mc3) => mc3.operator_summary(),
        }
    }

    /// Captures the restartable state held by this rank.
    pub fn checkpoint(&self, master_seed: u64) -> SamplerCheckpoint {
        match self {
            MonteCarloSampler::Mcmc(chain) | MonteCarloSampler::HillClimber(chain) => {
                SamplerCheckpoint {
                    generation: chain.generation(),
                    master_seed,
                    chain_heats: vec![chain.heats().posterior],
                    heat_ranks: vec![0],
                    active_chain_index: 0,
                    chains: vec![ChainCheckpoint::capture(chain)],
                }
            }
            MonteCarloSampler::Mcmcmc(mc3) => SamplerCheckpoint {
                generation: mc3.generation(),
                master_seed,
                chain_heats: mc3.chain_heats().to_vec(),
                heat_ranks: mc3.heat_ranks().to_vec(),
                active_chain_index: mc3.active_chain_index(),
                chains: (0..mc3.num_chains())
                    .filter_map(|index| mc3.chain(index))
                    .map(ChainCheckpoint::capture)
                    .collect(),
            },
        }
    }

    /// Restores a state captured by [`MonteCarloSampler::checkpoint`].
    pub fn restore(&mut self, checkpoint: &SamplerCheckpoint) -> Result<(), TempoError> {
        match self {
            MonteCarloSampler::Mcmc(chain) | MonteCarloSampler::HillClimber(chain) => {
                match checkpoint.chains.first() {
                    Some(saved) => saved.restore_into(chain),
                    None => Err(crate::checkpoint::empty_checkpoint()),
                }
            }
            MonteCarloSampler::Mcmcmc(mc3) => {
                let values: Vec<_> = checkpoint
                    .chains
                    .iter()
                    .map(|saved| (saved.index, saved.values.clone()))
                    .collect();
                mc3.restore_state(
                    &checkpoint.chain_heats,
                    &checkpoint.heat_ranks,
                    checkpoint.active_chain_index,
                    &values,
                )?;
                mc3.set_generation(checkpoint.generation);
                Ok(())
            }
        }
    }
}

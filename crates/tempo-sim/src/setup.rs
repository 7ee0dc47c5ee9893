//! Reference model description and the samplers built from it.

use std::error::Error;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tempo_core::normal::{NormalMeanModel, NormalMeanSpec, MU};
use tempo_core::{Communicator, ParallelContext, RngHandle, TempoError};
use tempo_mcmc::determinism::chain_seed;
use tempo_mcmc::{
    Chain, Mcmcmc, MonteCarloSampler, Monitor, Move, NormalGibbs, RunConfig, SamplerKind,
    ScaleProposal, SlideProposal, TraceMonitor,
};

/// Model file: hyper-parameters, data and the moves applied to `mu`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFile {
    pub model: NormalMeanSpec,
    #[serde(default = "default_moves")]
    pub moves: Vec<MoveSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum MoveSpec {
    Slide {
        delta: f64,
        #[serde(default = "default_weight")]
        weight: f64,
    },
    Scale {
        lambda: f64,
        #[serde(default = "default_weight")]
        weight: f64,
    },
    Gibbs {
        #[serde(default = "default_weight")]
        weight: f64,
    },
}

fn default_weight() -> f64 {
    1.0
}

fn default_moves() -> Vec<MoveSpec> {
    vec![
        MoveSpec::Slide {
            delta: 1.0,
            weight: 2.0,
        },
        MoveSpec::Scale {
            lambda: 0.5,
            weight: 1.0,
        },
    ]
}

impl ModelFile {
    /// Reads a YAML (or JSON) model file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    pub fn build_model(&self) -> Result<NormalMeanModel, TempoError> {
        NormalMeanModel::new(self.model.clone())
    }

    fn build_moves(&self) -> Vec<Move<NormalMeanModel>> {
        self.moves
            .iter()
            .map(|spec| match *spec {
                MoveSpec::Slide { delta, weight } => {
                    Move::metropolis_hastings(Box::new(SlideProposal::new(MU, delta)), weight)
                }
                MoveSpec::Scale { lambda, weight } => {
                    Move::metropolis_hastings(Box::new(ScaleProposal::new(MU, lambda)), weight)
                }
                MoveSpec::Gibbs { weight } => Move::gibbs(Box::new(NormalGibbs::new(MU)), weight),
            })
            .collect()
    }

    /// Builds the configured sampler for the ranks of `context`, with a trace
    /// of `mu` at `trace`.
    pub fn build_sampler<C: Communicator>(
        &self,
        config: &RunConfig,
        comm: Arc<C>,
        context: ParallelContext,
        trace: &Path,
    ) -> Result<MonteCarloSampler<NormalMeanModel, C>, TempoError> {
        let seed = config.seed_policy.master_seed;
        let interval = config.output.print_interval;
        let monitors: Vec<Box<dyn Monitor<NormalMeanModel>>> =
            vec![Box::new(TraceMonitor::new(trace, vec![MU], interval))];
        let model = self.build_model()?;
        let moves = self.build_moves();
        match config.sampler {
            SamplerKind::Mcmcmc => Ok(MonteCarloSampler::Mcmcmc(Mcmcmc::new(
                model,
                moves,
                monitors,
                config.schedule,
                &config.mc3,
                comm,
                context,
                seed,
            )?)),
            kind => {
                let chain = Chain::new(
                    model,
                    moves,
                    monitors,
                    config.schedule,
                    RngHandle::from_seed(chain_seed(seed, 0)),
                )?;
                Ok(match kind {
                    SamplerKind::HillClimber => MonteCarloSampler::hill_climber(chain),
                    _ => MonteCarloSampler::mcmc(chain),
                })
            }
        }
    }
}

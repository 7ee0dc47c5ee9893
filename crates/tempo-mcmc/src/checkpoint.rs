//! Checkpoint payloads and JSON persistence.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempo_core::{ErrorInfo, Model, TempoError};

use crate::chain::Chain;
use crate::moves::Heats;

/// Restartable state of one chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainCheckpoint {
    /// Chain index within its sampler.
    pub index: usize,
    /// Generation reached.
    pub generation: u64,
    /// Heats at checkpoint time.
    pub heats: Heats,
    /// Free node values, by node name, as produced by the model.
    pub values: Vec<(String, String)>,
}

impl ChainCheckpoint {
    /// Captures the state of a chain.
    pub fn capture<M: Model>(chain: &Chain<M>) -> Self {
        Self {
            index: chain.index(),
            generation: chain.generation(),
            heats: chain.heats(),
            values: chain.values(),
        }
    }

    /// Writes the captured state back into a chain of the same model.
    pub fn restore_into<M: Model>(&self, chain: &mut Chain<M>) -> Result<(), TempoError> {
        chain.set_posterior_heat(self.heats.posterior);
        chain.set_prior_heat(self.heats.prior);
        chain.set_likelihood_heat(self.heats.likelihood);
        chain.set_values(&self.values)?;
        chain.set_generation(self.generation);
        Ok(())
    }
}

/// Checkpoint of a sampler as seen by one rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerCheckpoint {
    /// Generation reached.
    pub generation: u64,
    /// Master seed of the run.
    pub master_seed: u64,
    /// Heat per chain index.
    pub chain_heats: Vec<f64>,
    /// Chain index per heat rank.
    pub heat_ranks: Vec<usize>,
    /// Chain currently at heat 1.
    pub active_chain_index: usize,
    /// Chains owned by the rank that wrote the checkpoint.
    pub chains: Vec<ChainCheckpoint>,
}

impl SamplerCheckpoint {
    /// Restores the payload from disk.
    pub fn load(path: &Path) -> Result<Self, TempoError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            TempoError::Serde(
                ErrorInfo::new("checkpoint-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        serde_json::from_str(&contents).map_err(|err| {
            TempoError::Serde(
                ErrorInfo::new("checkpoint-parse", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }

    /// Writes the payload to disk.
    pub fn store(&self, path: &Path) -> Result<(), TempoError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                TempoError::Serde(
                    ErrorInfo::new("checkpoint-mkdir", err.to_string())
                        .with_context("path", parent.display().to_string()),
                )
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|err| {
            TempoError::Serde(
                ErrorInfo::new("checkpoint-serialize", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        fs::write(path, json).map_err(|err| {
            TempoError::Serde(
                ErrorInfo::new("checkpoint-write", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }
}

pub(crate) fn empty_checkpoint() -> TempoError {
    TempoError::Serde(ErrorInfo::new(
        "empty-checkpoint",
        "checkpoint contained no chains",
    ))
}

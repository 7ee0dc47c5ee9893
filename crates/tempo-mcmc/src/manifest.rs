//! Run manifest serialization helpers.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempo_core::{ErrorInfo, TempoError};

use crate::config::RunConfig;

/// Output file recorded in a manifest together with its content digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDigest {
    /// Path relative to the run directory when possible.
    pub path: PathBuf,
    /// Hex-encoded SHA-256 of the file contents.
    pub sha256: String,
}

/// Structured manifest describing a completed analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    /// Configuration used for the run.
    pub config: RunConfig,
    /// Master seed every substream derives from.
    pub master_seed: u64,
    /// Seed label captured from the configuration.
    pub seed_label: String,
    /// Files produced by the run.
    pub outputs: Vec<OutputDigest>,
    /// Estimates or other scalar results keyed by name.
    #[serde(default)]
    pub results: Vec<(String, f64)>,
}

/// Hex SHA-256 digest of a file.
pub fn digest_file(path: &Path) -> Result<String, TempoError> {
    let bytes = fs::read(path).map_err(|err| TempoError::io("digest-read", err, path))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

impl RunManifest {
    /// Creates a manifest with no outputs yet.
    pub fn new(config: &RunConfig) -> Self {
        Self {
            config: config.clone(),
            master_seed: config.seed_policy.master_seed,
            seed_label: config.seed_policy.label.clone(),
            outputs: Vec::new(),
            results: Vec::new(),
        }
    }

    /// Digests `path` and records it relative to the run directory.
    pub fn record_output(&mut self, path: &Path) -> Result<(), TempoError> {
        let sha256 = digest_file(path)?;
        let relative = path
            .strip_prefix(&self.config.output.run_directory)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf());
        self.outputs.push(OutputDigest {
            path: relative,
            sha256,
        });
        Ok(())
    }

    /// Records a named scalar result.
    pub fn record_result(&mut self, name: impl Into<String>, value: f64) {
        self.results.push((name.into(), value));
    }

    /// Writes the manifest to a JSON file.
    pub fn write(&self, path: &Path) -> Result<(), TempoError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                TempoError::Serde(
                    ErrorInfo::new("manifest-mkdir", err.to_string())
                        .with_context("path", parent.display().to_string()),
                )
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|err| {
            TempoError::Serde(
                ErrorInfo::new("manifest-serialize", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        fs::write(path, json).map_err(|err| {
            TempoError::Serde(
                ErrorInfo::new("manifest-write", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }

    /// Loads a manifest from disk.
    pub fn load(path: &Path) -> Result<Self, TempoError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            TempoError::Serde(
                ErrorInfo::new("manifest-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        serde_json::from_str(&contents).map_err(|err| {
            TempoError::Serde(
                ErrorInfo::new("manifest-parse", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }
}

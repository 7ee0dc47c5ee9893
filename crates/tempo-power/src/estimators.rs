//! Marginal-likelihood estimators over sampled power posteriors.

use std::cell::OnceCell;
use std::path::Path;

use csv::ReaderBuilder;
use tempo_core::{ErrorInfo, TempoError};

use crate::stone::{wrap_csv, StoneRow};

/// Log-likelihood samples per power, powers in decreasing order.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerSamples {
    powers: Vec<f64>,
    samples: Vec<Vec<f64>>,
}

impl PowerSamples {
    /// Pairs each power with its samples.
    pub fn new(powers: Vec<f64>, samples: Vec<Vec<f64>>) -> Result<Self, TempoError> {
        if powers.len() != samples.len() {
            return Err(TempoError::Config(
                ErrorInfo::new("sample-shape", "one sample vector is needed per power")
                    .with_context("powers", powers.len().to_string())
                    .with_context("samples", samples.len().to_string()),
            ));
        }
        if let Some(power) = powers
            .iter()
            .zip(&samples)
            .find(|(_, s)| s.is_empty())
            .map(|(p, _)| *p)
        {
            return Err(TempoError::Config(
                ErrorInfo::new("zero-samples", "a power has no samples")
                    .with_context("power", power.to_string()),
            ));
        }
        if powers.windows(2).any(|w| !(w[0] > w[1])) {
            return Err(TempoError::Config(
                ErrorInfo::new("unsorted-powers", "powers must be strictly decreasing")
                    .with_context("powers", format!("{powers:?}")),
            ));
        }
        Ok(Self { powers, samples })
    }

    /// Reads a `state\tpower\tlikelihood` file and groups the rows by power.
    pub fn read(path: &Path) -> Result<Self, TempoError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_path(path)
            .map_err(|err| wrap_csv("samples-read", err, path))?;
        let mut groups: Vec<(f64, Vec<f64>)> = Vec::new();
        for row in reader.deserialize::<StoneRow>() {
            let row = row.map_err(|err| wrap_csv("samples-parse", err, path))?;
            match groups.iter_mut().find(|(p, _)| *p == row.power) {
                Some((_, values)) => values.push(row.likelihood),
                None => groups.push((row.power, vec![row.likelihood])),
            }
        }
        if groups.is_empty() {
            return Err(TempoError::Serde(
                ErrorInfo::new("empty-samples", "the file holds no samples")
                    .with_context("path", path.display().to_string()),
            ));
        }
        groups.sort_by(|a, b| b.0.total_cmp(&a.0));
        let (powers, samples) = groups.into_iter().unzip();
        Self::new(powers, samples)
    }

    /// Powers in decreasing order.
    pub fn powers(&self) -> &[f64] {
        &self.powers
    }

    /// Samples of each power.
    pub fn samples(&self) -> &[Vec<f64>] {
        &self.samples
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Thermodynamic integration of the expected log-likelihood over power.
#[derive(Debug, Clone)]
pub struct PathSampler {
    samples: PowerSamples,
    estimate: OnceCell<f64>,
}

impl PathSampler {
    /// Wraps the samples; nothing is computed yet.
    pub fn new(samples: PowerSamples) -> Self {
        Self {
            samples,
            estimate: OnceCell::new(),
        }
    }

    /// Mean log-likelihood at each power.
    pub fn path_values(&self) -> Vec<f64> {
        self.samples.samples().iter().map(|s| mean(s)).collect()
    }

    /// Trapezoid integral of the path values, computed once.
    pub fn marginal_likelihood(&self) -> f64 {
        *self.estimate.get_or_init(|| {
            let values = self.path_values();
            let powers = self.samples.powers();
            (0..powers.len().saturating_sub(1))
                .map(|i| (values[i] + values[i + 1]) * (powers[i] - powers[i + 1]) / 2.0)
                .sum()
        })
    }
}

/// Stepping-stone estimator: a product of importance-sampling ratios between
/// consecutive powers.
#[derive(Debug, Clone)]
pub struct SteppingStoneSampler {
    samples: PowerSamples,
    estimate: OnceCell<f64>,
}

impl SteppingStoneSampler {
    /// Wraps the samples; nothing is computed yet.
    pub fn new(samples: PowerSamples) -> Self {
        Self {
            samples,
            estimate: OnceCell::new(),
        }
    }

    /// Log marginal likelihood, computed once.
    ///
    /// The largest sample is factored out of each ratio before
    /// exponentiating.
    pub fn marginal_likelihood(&self) -> f64 {
        *self.estimate.get_or_init(|| {
            let powers = self.samples.powers();
            let samples = self.samples.samples();
            let mut marginal = 0.0;
            for i in 1..powers.len() {
                let step = powers[i - 1] - powers[i];
                let max = samples[i].iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let ratios: Vec<f64> = samples[i].iter().map(|s| ((s - max) * step).exp()).collect();
                marginal += mean(&ratios).ln() + step * max;
            }
            marginal
        })
    }
}

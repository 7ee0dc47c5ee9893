//! Conjugate normal-mean model used to drive and validate the engine.
//!
//! `mu ~ N(prior_mean, prior_sd²)` and every observation
//! `y_i ~ N(mu, sigma²)` with `sigma` known. The marginal likelihood and the
//! power-posterior expectations are available in closed form.

use std::f64::consts::PI;

use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, TempoError};
use crate::model::{Model, NodeId, ScalarModel, VersionedCache};
use crate::rng::RngHandle;

/// Handle of the mean parameter.
pub const MU: NodeId = NodeId::from_raw(0);
/// Handle of the clamped observations.
pub const DATA: NodeId = NodeId::from_raw(1);

/// Hyper-parameters and data of a [`NormalMeanModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalMeanSpec {
    /// Prior mean of `mu`.
    pub prior_mean: f64,
    /// Prior standard deviation of `mu`.
    pub prior_sd: f64,
    /// Known observation standard deviation.
    pub sigma: f64,
    /// Observed values.
    pub observations: Vec<f64>,
}

/// Conjugate normal-mean model with cached node probabilities.
#[derive(Debug, Clone)]
pub struct NormalMeanModel {
    spec: NormalMeanSpec,
    mu: VersionedCache<f64>,
    mu_ln_prob: VersionedCache<f64>,
    data_ln_prob: VersionedCache<f64>,
}

impl NormalMeanModel {
    /// Builds the model with `mu` initialised to the prior mean.
    pub fn new(spec: NormalMeanSpec) -> Result<Self, TempoError> {
        if !(spec.prior_sd > 0.0 && spec.sigma > 0.0) {
            return Err(TempoError::Model(
                ErrorInfo::new("invalid-scale", "standard deviations must be positive")
                    .with_context("prior_sd", spec.prior_sd.to_string())
                    .with_context("sigma", spec.sigma.to_string()),
            ));
        }
        let start = spec.prior_mean;
        Ok(Self {
            spec,
            mu: VersionedCache::new(start),
            mu_ln_prob: VersionedCache::empty(),
            data_ln_prob: VersionedCache::empty(),
        })
    }

    /// Model hyper-parameters and data.
    pub fn spec(&self) -> &NormalMeanSpec {
        &self.spec
    }

    fn mu_value(&self) -> f64 {
        self.mu.get().copied().unwrap_or(self.spec.prior_mean)
    }

    fn summary(&self) -> (f64, f64, f64) {
        let n = self.spec.observations.len() as f64;
        if n == 0.0 {
            return (0.0, 0.0, 0.0);
        }
        let mean = self.spec.observations.iter().sum::<f64>() / n;
        let ss = self
            .spec
            .observations
            .iter()
            .map(|y| (y - mean).powi(2))
            .sum::<f64>();
        (n, mean, ss)
    }

    /// Posterior `(mean, variance)` of `mu` when the likelihood is raised to `beta`.
    pub fn power_posterior(&self, beta: f64) -> (f64, f64) {
        let (n, mean, _) = self.summary();
        let prior_precision = 1.0 / self.spec.prior_sd.powi(2);
        let data_precision = beta * n / self.spec.sigma.powi(2);
        let precision = prior_precision + data_precision;
        let location = (self.spec.prior_mean * prior_precision + data_precision * mean) / precision;
        (location, 1.0 / precision)
    }

    /// Expected log-likelihood under the power posterior at `beta`.
    pub fn expected_ln_likelihood(&self, beta: f64) -> f64 {
        let (n, mean, ss) = self.summary();
        let (location, variance) = self.power_posterior(beta);
        let sigma2 = self.spec.sigma.powi(2);
        -0.5 * n * (2.0 * PI * sigma2).ln()
            - (ss + n * ((location - mean).powi(2) + variance)) / (2.0 * sigma2)
    }

    /// Exact log marginal likelihood of the observations.
    pub fn exact_ln_marginal_likelihood(&self) -> f64 {
        let (n, mean, ss) = self.summary();
        let sigma2 = self.spec.sigma.powi(2);
        let tau2 = self.spec.prior_sd.powi(2);
        -0.5 * n * (2.0 * PI * sigma2).ln() - ss / (2.0 * sigma2)
            + 0.5 * (sigma2 / (sigma2 + n * tau2)).ln()
            - n * (mean - self.spec.prior_mean).powi(2) / (2.0 * (sigma2 + n * tau2))
    }
}

fn normal_ln_pdf(x: f64, mean: f64, sd: f64) -> f64 {
    let z = (x - mean) / sd;
    -0.5 * z * z - sd.ln() - 0.5 * (2.0 * PI).ln()
}

impl Model for NormalMeanModel {
    fn node_ids(&self) -> Vec<NodeId> {
        vec![MU, DATA]
    }

    fn name(&self, node: NodeId) -> &str {
        match node {
            MU => "mu",
            _ => "y",
        }
    }

    fn is_clamped(&self, node: NodeId) -> bool {
        node == DATA
    }

    fn is_stochastic(&self, _node: NodeId) -> bool {
        true
    }

    fn contains(&self, node: NodeId) -> bool {
        node == MU || node == DATA
    }

    fn ln_probability(&mut self, node: NodeId) -> f64 {
        let mu = self.mu_value();
        if node == MU {
            if let Some(&cached) = self.mu_ln_prob.get() {
                return cached;
            }
            let value = normal_ln_pdf(mu, self.spec.prior_mean, self.spec.prior_sd);
            self.mu_ln_prob.fill(value);
            value
        } else {
            if let Some(&cached) = self.data_ln_prob.get() {
                return cached;
            }
            let sigma = self.spec.sigma;
            let value = self
                .spec
                .observations
                .iter()
                .map(|&y| normal_ln_pdf(y, mu, sigma))
                .sum();
            self.data_ln_prob.fill(value);
            value
        }
    }

    fn touch(&mut self, node: NodeId) {
        if node == MU {
            self.mu_ln_prob.invalidate();
        }
        self.data_ln_prob.invalidate();
    }

    fn keep(&mut self, node: NodeId) {
        if node == MU {
            self.mu.commit();
            self.mu_ln_prob.commit();
        }
        self.data_ln_prob.commit();
    }

    fn restore(&mut self, node: NodeId) {
        if node == MU {
            self.mu.rollback();
            self.mu_ln_prob.rollback();
        }
        self.data_ln_prob.rollback();
    }

    fn redraw(&mut self, node: NodeId, rng: &mut RngHandle) {
        if node != MU {
            return;
        }
        if let Ok(prior) = Normal::new(self.spec.prior_mean, self.spec.prior_sd) {
            let value = prior.sample(rng.inner_mut());
            self.set_value(MU, value);
        }
    }

    fn set_value_from_str(&mut self, node: NodeId, value: &str) -> Result<(), TempoError> {
        if node != MU {
            return Err(TempoError::Model(
                ErrorInfo::new("clamped-node", "cannot assign a value to observed data")
                    .with_context("node", self.name(node).to_string()),
            ));
        }
        let parsed: f64 = value.trim().parse().map_err(|_| {
            TempoError::Model(
                ErrorInfo::new("unparsable-value", "expected a real number")
                    .with_context("node", "mu")
                    .with_context("value", value.to_string()),
            )
        })?;
        self.set_value(MU, parsed);
        Ok(())
    }

    fn value_string(&self, node: NodeId) -> String {
        if node == MU {
            self.mu_value().to_string()
        } else {
            self.spec
                .observations
                .iter()
                .map(f64::to_string)
                .collect::<Vec<_>>()
                .join(",")
        }
    }
}

impl ScalarModel for NormalMeanModel {
    fn value(&self, _node: NodeId) -> f64 {
        self.mu_value()
    }

    fn set_value(&mut self, node: NodeId, value: f64) {
        if node == MU {
            self.mu.set(value);
            self.touch(MU);
        }
    }

    fn conditional_normal(&self, node: NodeId, likelihood_heat: f64) -> Option<(f64, f64)> {
        (node == MU).then(|| self.power_posterior(likelihood_heat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn model() -> NormalMeanModel {
        NormalMeanModel::new(NormalMeanSpec {
            prior_mean: 0.0,
            prior_sd: 2.0,
            sigma: 1.0,
            observations: vec![0.3, 1.1, 0.8, 1.6],
        })
        .unwrap()
    }

    #[test]
    fn restore_rolls_back_value_and_probabilities() {
        let mut m = model();
        m.touch_all();
        let before = m.ln_posterior();
        m.keep_all();
        m.set_value(MU, 5.0);
        assert!(m.ln_posterior() < before);
        m.restore(MU);
        assert_relative_eq!(m.value(MU), 0.0);
        assert_relative_eq!(m.ln_posterior(), before);
    }

    #[test]
    fn prior_and_likelihood_split_over_clamped_nodes() {
        let mut m = model();
        m.set_value(MU, 0.5);
        let prior = normal_ln_pdf(0.5, 0.0, 2.0);
        let likelihood: f64 = [0.3, 1.1, 0.8, 1.6]
            .iter()
            .map(|&y| normal_ln_pdf(y, 0.5, 1.0))
            .sum();
        assert_relative_eq!(m.ln_prior(), prior, epsilon = 1e-12);
        assert_relative_eq!(m.ln_likelihood(), likelihood, epsilon = 1e-12);
        assert_relative_eq!(m.ln_posterior(), prior + likelihood, epsilon = 1e-12);
    }

    #[test]
    fn expected_likelihood_at_zero_power_is_prior_expectation() {
        let m = model();
        let (location, variance) = m.power_posterior(0.0);
        assert_relative_eq!(location, 0.0);
        assert_relative_eq!(variance, 4.0);
        assert!(m.expected_ln_likelihood(0.0) < m.expected_ln_likelihood(1.0));
    }

    #[test]
    fn exact_marginal_matches_single_observation_density() {
        let m = NormalMeanModel::new(NormalMeanSpec {
            prior_mean: 1.0,
            prior_sd: 1.0,
            sigma: 1.0,
            observations: vec![2.0],
        })
        .unwrap();
        // y ~ N(1, 2)
        let expected = normal_ln_pdf(2.0, 1.0, 2f64.sqrt());
        assert_relative_eq!(m.exact_ln_marginal_likelihood(), expected, epsilon = 1e-12);
    }
}

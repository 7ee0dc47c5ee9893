//! Built-in proposals for models with real scalar nodes.

use rand_distr::{Distribution, Normal};
use tempo_core::{NodeId, RngHandle, ScalarModel};

use crate::moves::{tune_toward, GibbsSampler, Heats, Proposal};

const DEFAULT_TARGET_ACCEPTANCE: f64 = 0.44;

/// Sliding-window proposal `x' = x + delta·(u − 0.5)`.
#[derive(Debug, Clone)]
pub struct SlideProposal {
    node: NodeId,
    delta: f64,
    target: f64,
}

impl SlideProposal {
    /// Creates a slide proposal with window width `delta`.
    pub fn new(node: NodeId, delta: f64) -> Self {
        Self {
            node,
            delta,
            target: DEFAULT_TARGET_ACCEPTANCE,
        }
    }

    /// Current window width.
    pub fn delta(&self) -> f64 {
        self.delta
    }
}

impl<M: ScalarModel> Proposal<M> for SlideProposal {
    fn name(&self) -> &str {
        "slide"
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![self.node]
    }

    fn propose(&mut self, model: &mut M, rng: &mut RngHandle) -> f64 {
        let current = model.value(self.node);
        let proposed = current + self.delta * (rng.uniform01() - 0.5);
        model.set_value(self.node, proposed);
        0.0
    }

    fn tune(&mut self, acceptance_rate: f64) {
        self.delta = tune_toward(self.delta, acceptance_rate, self.target);
    }

    fn parameter_summary(&self) -> String {
        format!("delta = {:.4}", self.delta)
    }

    fn box_clone(&self) -> Box<dyn Proposal<M>> {
        Box::new(self.clone())
    }
}

/// Multiplier proposal `x' = x·exp(lambda·(u − 0.5))` for positive values.
#[derive(Debug, Clone)]
pub struct ScaleProposal {
    node: NodeId,
    lambda: f64,
    target: f64,
}

impl ScaleProposal {
    /// Creates a scale proposal with tuning parameter `lambda`.
    pub fn new(node: NodeId, lambda: f64) -> Self {
        Self {
            node,
            lambda,
            target: DEFAULT_TARGET_ACCEPTANCE,
        }
    }
}

impl<M: ScalarModel> Proposal<M> for ScaleProposal {
    fn name(&self) -> &str {
        "scale"
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![self.node]
    }

    fn propose(&mut self, model: &mut M, rng: &mut RngHandle) -> f64 {
        let ln_factor = self.lambda * (rng.uniform01() - 0.5);
        let current = model.value(self.node);
        model.set_value(self.node, current * ln_factor.exp());
        ln_factor
    }

    fn tune(&mut self, acceptance_rate: f64) {
        self.lambda = tune_toward(self.lambda, acceptance_rate, self.target);
    }

    fn parameter_summary(&self) -> String {
        format!("lambda = {:.4}", self.lambda)
    }

    fn box_clone(&self) -> Box<dyn Proposal<M>> {
        Box::new(self.clone())
    }
}

/// Exact draw from a Gaussian full conditional, tempered by the posterior heat.
///
/// Assumes an untempered prior (`prior` heat of one).
#[derive(Debug, Clone)]
pub struct NormalGibbs {
    node: NodeId,
}

impl NormalGibbs {
    /// Creates the sampler for `node`.
    pub fn new(node: NodeId) -> Self {
        Self { node }
    }
}

impl<M: ScalarModel> GibbsSampler<M> for NormalGibbs {
    fn name(&self) -> &str {
        "normal-gibbs"
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![self.node]
    }

    fn sample(&mut self, model: &mut M, heats: &Heats, rng: &mut RngHandle) {
        let Some((mean, variance)) = model.conditional_normal(self.node, heats.likelihood) else {
            log::debug!("node has no Gaussian full conditional; gibbs step skipped");
            return;
        };
        let sd = (variance / heats.posterior.max(f64::MIN_POSITIVE)).sqrt();
        if let Ok(conditional) = Normal::new(mean, sd) {
            let value = conditional.sample(rng.inner_mut());
            model.set_value(self.node, value);
        }
    }

    fn box_clone(&self) -> Box<dyn GibbsSampler<M>> {
        Box::new(self.clone())
    }
}

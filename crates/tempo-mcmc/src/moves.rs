//! Moves, heats and the acceptance rule.

use serde::{Deserialize, Serialize};
use tempo_core::{Model, NodeId, RngHandle};

/// Proposals whose log acceptance ratio falls below this are rejected without drawing.
pub const LN_REJECT_THRESHOLD: f64 = -300.0;

/// Exponents applied to the parts of the joint density a chain samples from.
///
/// The chain targets `[prior^prior_heat · likelihood^likelihood_heat]^posterior_heat`.
/// `posterior_heat` is the coupled-chain temperature, `likelihood_heat` the
/// power of a power-posterior stone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Heats {
    /// Inverse temperature of the whole tempered density (MC³).
    pub posterior: f64,
    /// Power applied to the likelihood (stone power).
    pub likelihood: f64,
    /// Power applied to the prior.
    pub prior: f64,
}

impl Default for Heats {
    fn default() -> Self {
        Self {
            posterior: 1.0,
            likelihood: 1.0,
            prior: 1.0,
        }
    }
}

impl Heats {
    /// Log density targeted before the posterior heat is applied.
    pub fn ln_target(&self, ln_prior: f64, ln_likelihood: f64) -> f64 {
        let lik = if self.likelihood == 0.0 {
            0.0
        } else {
            self.likelihood * ln_likelihood
        };
        self.prior * ln_prior + lik
    }
}

/// Rule deciding whether a proposal with log ratio `lnR` is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AcceptanceRule {
    /// Metropolis-Hastings: accept with probability `min(1, exp(lnR))`.
    #[default]
    Metropolis,
    /// Hill climbing: accept only non-decreasing moves.
    Greedy,
}

/// Metropolis decision for a log acceptance ratio.
///
/// No uniform is drawn when the outcome is certain.
pub fn metropolis_accept(ln_r: f64, rng: &mut RngHandle) -> bool {
    if ln_r >= 0.0 {
        true
    } else if ln_r < LN_REJECT_THRESHOLD || ln_r.is_nan() {
        false
    } else {
        rng.uniform01() < ln_r.exp()
    }
}

/// Multiplicative update of a tuning parameter toward a target acceptance rate.
///
/// Rates above the target enlarge the parameter, rates below shrink it.
pub fn tune_toward(value: f64, rate: f64, target: f64) -> f64 {
    if rate > target {
        value * (1.0 + (rate - target) / (1.0 - target))
    } else {
        value / (2.0 - rate / target)
    }
}

/// Metropolis-Hastings proposal mechanism acting on a few nodes.
pub trait Proposal<M: Model>: Send {
    /// Short name used in operator summaries.
    fn name(&self) -> &str;

    /// Nodes changed by the proposal.
    fn nodes(&self) -> Vec<NodeId>;

    /// Perturbs the model and returns the log Hastings ratio.
    ///
    /// The proposal must touch what it changes; the move keeps or restores
    /// the same nodes afterwards.
    fn propose(&mut self, model: &mut M, rng: &mut RngHandle) -> f64;

    /// Adjusts tuning parameters given the acceptance rate of the last period.
    fn tune(&mut self, _acceptance_rate: f64) {}

    /// Current tuning parameters, for reporting.
    fn parameter_summary(&self) -> String {
        String::new()
    }

    /// Clones the proposal behind a box.
    fn box_clone(&self) -> Box<dyn Proposal<M>>;
}

/// Move that draws directly from a full conditional and is always accepted.
pub trait GibbsSampler<M: Model>: Send {
    /// Short name used in operator summaries.
    fn name(&self) -> &str;

    /// Nodes resampled by the move.
    fn nodes(&self) -> Vec<NodeId>;

    /// Resamples the nodes under the given heats.
    fn sample(&mut self, model: &mut M, heats: &Heats, rng: &mut RngHandle);

    /// Clones the sampler behind a box.
    fn box_clone(&self) -> Box<dyn GibbsSampler<M>>;
}

impl<M: Model> Clone for Box<dyn Proposal<M>> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

impl<M: Model> Clone for Box<dyn GibbsSampler<M>> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Mechanism behind a [`Move`].
#[derive(Clone)]
pub enum MoveKind<M: Model> {
    /// Propose, then accept or reject.
    MetropolisHastings(Box<dyn Proposal<M>>),
    /// Draw from the full conditional.
    Gibbs(Box<dyn GibbsSampler<M>>),
}

/// Weighted proposal operator with acceptance bookkeeping.
#[derive(Clone)]
pub struct Move<M: Model> {
    kind: MoveKind<M>,
    weight: f64,
    delay: u64,
    auto_tune: bool,
    tried: u64,
    accepted: u64,
    tried_period: u64,
    accepted_period: u64,
}

impl<M: Model> std::fmt::Debug for Move<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Move")
            .field("name", &self.name())
            .field("weight", &self.weight)
            .field("tried", &self.tried)
            .field("accepted", &self.accepted)
            .finish_non_exhaustive()
    }
}

/// Acceptance statistics of a move, as printed in operator summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveSummary {
    /// Move name.
    pub name: String,
    /// Relative weight.
    pub weight: f64,
    /// Proposals attempted since the last reset.
    pub tried: u64,
    /// Proposals accepted since the last reset.
    pub accepted: u64,
    /// Acceptance ratio (0 when never tried).
    pub acceptance_ratio: f64,
    /// Tuning parameters.
    pub parameters: String,
}

impl<M: Model> Move<M> {
    /// Wraps a Metropolis-Hastings proposal.
    pub fn metropolis_hastings(proposal: Box<dyn Proposal<M>>, weight: f64) -> Self {
        Self::new(MoveKind::MetropolisHastings(proposal), weight)
    }

    /// Wraps a Gibbs sampler.
    pub fn gibbs(sampler: Box<dyn GibbsSampler<M>>, weight: f64) -> Self {
        Self::new(MoveKind::Gibbs(sampler), weight)
    }

    fn new(kind: MoveKind<M>, weight: f64) -> Self {
        Self {
            kind,
            weight: weight.max(0.0),
            delay: 0,
            auto_tune: true,
            tried: 0,
            accepted: 0,
            tried_period: 0,
            accepted_period: 0,
        }
    }

    /// Keeps the move inactive for the first `delay` generations.
    pub fn with_delay(mut self, delay: u64) -> Self {
        self.delay = delay;
        self
    }

    /// Enables or disables automatic tuning.
    pub fn with_auto_tune(mut self, auto_tune: bool) -> Self {
        self.auto_tune = auto_tune;
        self
    }

    /// Move name.
    pub fn name(&self) -> &str {
        match &self.kind {
            MoveKind::MetropolisHastings(p) => p.name(),
            MoveKind::Gibbs(g) => g.name(),
        }
    }

    /// Nodes the move acts on.
    pub fn nodes(&self) -> Vec<NodeId> {
        match &self.kind {
            MoveKind::MetropolisHastings(p) => p.nodes(),
            MoveKind::Gibbs(g) => g.nodes(),
        }
    }

    /// Relative frequency of the move within an iteration.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Whether the move bypasses the acceptance step.
    pub fn is_gibbs(&self) -> bool {
        matches!(self.kind, MoveKind::Gibbs(_))
    }

    /// Whether the move may be scheduled at `generation`.
    pub fn is_active(&self, generation: u64) -> bool {
        generation >= self.delay
    }

    /// Proposals attempted since the last reset.
    pub fn tried(&self) -> u64 {
        self.tried
    }

    /// Proposals accepted since the last reset.
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Performs one proposal and returns whether it was accepted.
    ///
    /// Metropolis-Hastings moves compute
    /// `lnR = lnHastings + posterior_heat · Δ(prior_heat·lnPrior + likelihood_heat·lnLikelihood)`.
    pub fn perform(
        &mut self,
        model: &mut M,
        heats: &Heats,
        rule: AcceptanceRule,
        rng: &mut RngHandle,
    ) -> bool {
        self.tried += 1;
        self.tried_period += 1;
        let accepted = match &mut self.kind {
            MoveKind::Gibbs(sampler) => {
                sampler.sample(model, heats, rng);
                for node in sampler.nodes() {
                    model.keep(node);
                }
                true
            }
            MoveKind::MetropolisHastings(proposal) => {
                let before = heats.ln_target(model.ln_prior(), model.ln_likelihood());
                let ln_hastings = proposal.propose(model, rng);
                let after = heats.ln_target(model.ln_prior(), model.ln_likelihood());
                let ln_r = ln_hastings + heats.posterior * (after - before);
                let accept = match rule {
                    AcceptanceRule::Metropolis => metropolis_accept(ln_r, rng),
                    AcceptanceRule::Greedy => ln_r >= 0.0,
                };
                for node in proposal.nodes() {
                    if accept {
                        model.keep(node);
                    } else {
                        model.restore(node);
                    }
                }
                accept
            }
        };
        if accepted {
            self.accepted += 1;
            self.accepted_period += 1;
        }
        accepted
    }

    /// Tunes the proposal from the acceptance rate since the last call.
    pub fn auto_tune(&mut self) {
        if !self.auto_tune || self.tried_period == 0 {
            return;
        }
        let rate = self.accepted_period as f64 / self.tried_period as f64;
        if let MoveKind::MetropolisHastings(proposal) = &mut self.kind {
            proposal.tune(rate);
        }
        self.tried_period = 0;
        self.accepted_period = 0;
    }

    /// Clears all acceptance counters.
    pub fn reset_counters(&mut self) {
        self.tried = 0;
        self.accepted = 0;
        self.tried_period = 0;
        self.accepted_period = 0;
    }

    /// Snapshot of the move statistics.
    pub fn summary(&self) -> MoveSummary {
        let acceptance_ratio = if self.tried == 0 {
            0.0
        } else {
            self.accepted as f64 / self.tried as f64
        };
        let parameters = match &self.kind {
            MoveKind::MetropolisHastings(p) => p.parameter_summary(),
            MoveKind::Gibbs(_) => String::new(),
        };
        MoveSummary {
            name: self.name().to_string(),
            weight: self.weight,
            tried: self.tried,
            accepted: self.accepted,
            acceptance_ratio,
            parameters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certain_outcomes_do_not_consume_randomness() {
        let mut rng = RngHandle::from_seed(3);
        let mut reference = RngHandle::from_seed(3);
        assert!(metropolis_accept(0.0, &mut rng));
        assert!(metropolis_accept(12.0, &mut rng));
        assert!(!metropolis_accept(-301.0, &mut rng));
        assert!(!metropolis_accept(f64::NAN, &mut rng));
        assert_eq!(rng.uniform01(), reference.uniform01());
    }

    #[test]
    fn tuning_moves_toward_target() {
        assert!(tune_toward(1.0, 0.9, 0.44) > 1.0);
        assert!(tune_toward(1.0, 0.1, 0.44) < 1.0);
        assert!((tune_toward(1.0, 0.44, 0.44) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_likelihood_heat_ignores_infinite_likelihood() {
        let heats = Heats {
            likelihood: 0.0,
            ..Heats::default()
        };
        assert_eq!(heats.ln_target(-2.0, f64::NEG_INFINITY), -2.0);
    }
}

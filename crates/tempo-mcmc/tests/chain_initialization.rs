use tempo_core::normal::{NormalMeanModel, NormalMeanSpec, DATA, MU};
use tempo_core::{Model, NodeId, RngHandle, ScalarModel, TempoError};

use tempo_mcmc::{Chain, Move, ScheduleKind, SlideProposal, MAX_INIT_ATTEMPTS};

/// Model whose joint probability is never finite.
#[derive(Debug, Clone, Default)]
struct Degenerate {
    value: f64,
}

const X: NodeId = NodeId::from_raw(0);

impl Model for Degenerate {
    fn node_ids(&self) -> Vec<NodeId> {
        vec![X]
    }

    fn name(&self, _node: NodeId) -> &str {
        "x"
    }

    fn is_clamped(&self, _node: NodeId) -> bool {
        false
    }

    fn is_stochastic(&self, _node: NodeId) -> bool {
        true
    }

    fn ln_probability(&mut self, _node: NodeId) -> f64 {
        f64::NEG_INFINITY
    }

    fn touch(&mut self, _node: NodeId) {}

    fn keep(&mut self, _node: NodeId) {}

    fn restore(&mut self, _node: NodeId) {}

    fn redraw(&mut self, _node: NodeId, rng: &mut RngHandle) {
        self.value = rng.uniform01();
    }

    fn set_value_from_str(&mut self, _node: NodeId, value: &str) -> Result<(), TempoError> {
        self.value = value.parse().unwrap_or(0.0);
        Ok(())
    }

    fn value_string(&self, _node: NodeId) -> String {
        self.value.to_string()
    }
}

impl ScalarModel for Degenerate {
    fn value(&self, _node: NodeId) -> f64 {
        self.value
    }

    fn set_value(&mut self, _node: NodeId, value: f64) {
        self.value = value;
    }
}

fn normal_model() -> NormalMeanModel {
    NormalMeanModel::new(NormalMeanSpec {
        prior_mean: 3.0,
        prior_sd: 1.0,
        sigma: 1.0,
        observations: vec![2.5, 3.5],
    })
    .unwrap()
}

#[test]
fn non_computable_start_fails_after_bounded_retries() {
    let moves = vec![Move::metropolis_hastings(
        Box::new(SlideProposal::new(X, 1.0)),
        1.0,
    )];
    let err = Chain::new(
        Degenerate::default(),
        moves,
        Vec::new(),
        ScheduleKind::Random,
        RngHandle::from_seed(1),
    )
    .unwrap_err();
    assert_eq!(err.info().code, "no-computable-start");
    assert_eq!(
        err.info().message,
        "Unable to find a starting state with computable probability"
    );
    assert_eq!(
        err.info().context.get("attempts").map(String::as_str),
        Some(MAX_INIT_ATTEMPTS.to_string().as_str())
    );
}

#[test]
fn moves_on_foreign_nodes_are_rejected() {
    let foreign = NodeId::from_raw(7);
    let moves = vec![Move::metropolis_hastings(
        Box::new(SlideProposal::new(foreign, 1.0)),
        1.0,
    )];
    let err = Chain::new(
        normal_model(),
        moves,
        Vec::new(),
        ScheduleKind::Random,
        RngHandle::from_seed(1),
    )
    .unwrap_err();
    assert_eq!(err.info().code, "unknown-node");
}

#[test]
fn inactive_chain_starts_from_prior_draw() {
    let moves = vec![Move::metropolis_hastings(
        Box::new(SlideProposal::new(MU, 1.0)),
        1.0,
    )];
    let mut chain = Chain::new(
        normal_model(),
        moves,
        Vec::new(),
        ScheduleKind::Random,
        RngHandle::from_seed(8),
    )
    .unwrap();
    assert_eq!(chain.model().value(MU), 3.0);
    chain.set_active(false);
    chain.initialize(false).unwrap();
    assert_ne!(chain.model().value(MU), 3.0);
    assert!(chain.ln_probability().is_finite());
    assert_eq!(chain.generation(), 0);
}

#[test]
fn likelihood_only_probability_ignores_prior() {
    let moves = vec![Move::metropolis_hastings(
        Box::new(SlideProposal::new(MU, 1.0)),
        1.0,
    )];
    let mut chain = Chain::new(
        normal_model(),
        moves,
        Vec::new(),
        ScheduleKind::Random,
        RngHandle::from_seed(8),
    )
    .unwrap();
    let joint = chain.model_ln_probability(false);
    let likelihood = chain.model_ln_probability(true);
    let prior = chain.model_mut().ln_probability(MU);
    assert!((joint - likelihood - prior).abs() < 1e-12);
    assert!((likelihood - chain.model_mut().ln_probability(DATA)).abs() < 1e-12);
}

#[test]
fn zero_likelihood_heat_samples_the_prior() {
    let moves = vec![Move::metropolis_hastings(
        Box::new(SlideProposal::new(MU, 2.0)),
        1.0,
    )];
    let mut chain = Chain::new(
        normal_model(),
        moves,
        Vec::new(),
        ScheduleKind::Random,
        RngHandle::from_seed(21),
    )
    .unwrap();
    chain.set_likelihood_heat(0.0);
    let prior = chain.model_mut().ln_probability(MU);
    assert!((chain.ln_probability() - prior).abs() < 1e-12);
    chain.burnin(200, 50).unwrap();
    let mut sum = 0.0;
    for _ in 0..4000 {
        chain.next_cycle(true).unwrap();
        sum += chain.model().value(MU);
    }
    let mean = sum / 4000.0;
    assert!((mean - 3.0).abs() < 0.25, "prior mean estimate {mean}");
}

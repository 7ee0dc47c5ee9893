use std::fs;
use std::sync::Arc;

use tempfile::tempdir;
use tempo_core::normal::{NormalMeanModel, NormalMeanSpec, MU};
use tempo_core::{LocalCommunicator, ParallelContext, RngHandle, ScalarModel};

use tempo_mcmc::{
    Chain, HeatLadder, Mc3Config, McmcAnalysis, Mcmcmc, MonteCarloSampler, Move,
    SamplerCheckpoint, ScheduleKind, SlideProposal,
};

fn model() -> NormalMeanModel {
    NormalMeanModel::new(NormalMeanSpec {
        prior_mean: 0.0,
        prior_sd: 1.0,
        sigma: 0.5,
        observations: vec![0.4, 0.1, 0.6],
    })
    .unwrap()
}

fn chain(seed: u64) -> Chain<NormalMeanModel> {
    Chain::new(
        model(),
        vec![Move::metropolis_hastings(
            Box::new(SlideProposal::new(MU, 0.8)),
            1.0,
        )],
        Vec::new(),
        ScheduleKind::Random,
        RngHandle::from_seed(seed),
    )
    .unwrap()
}

#[test]
fn analysis_writes_checkpoints_at_the_interval() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ckpt/state.json");
    let sampler = MonteCarloSampler::<_, LocalCommunicator>::mcmc(chain(3));
    let mut analysis = McmcAnalysis::new(
        sampler,
        Arc::new(LocalCommunicator::new()),
        ParallelContext::single(),
        77,
    )
    .with_checkpoints(25, &path);
    let report = analysis.run(100, &[]).unwrap();
    assert_eq!(report.generations, 100);
    assert_eq!(report.checkpoints.len(), 4);

    let saved = SamplerCheckpoint::load(&path).unwrap();
    assert_eq!(saved.generation, 100);
    assert_eq!(saved.master_seed, 77);
    assert_eq!(saved.chains.len(), 1);
    assert_eq!(saved.chains[0].values[0].0, "mu");
}

#[test]
fn restored_sampler_resumes_from_saved_state() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");
    let mut original = MonteCarloSampler::<_, LocalCommunicator>::mcmc(chain(9));
    for _ in 0..40 {
        original.next_cycle(true).unwrap();
    }
    original.checkpoint(1).store(&path).unwrap();

    let mut resumed = MonteCarloSampler::<_, LocalCommunicator>::mcmc(chain(10));
    resumed.restore(&SamplerCheckpoint::load(&path).unwrap()).unwrap();
    assert_eq!(resumed.generation(), 40);
    let (MonteCarloSampler::Mcmc(a), MonteCarloSampler::Mcmc(b)) = (&original, &resumed) else {
        panic!("sampler kind changed");
    };
    assert_eq!(a.model().value(MU), b.model().value(MU));
    assert_eq!(a.ln_probability(), b.ln_probability());
    assert_eq!(
        original.model_ln_probability(false).unwrap(),
        resumed.model_ln_probability(false).unwrap()
    );
}

#[test]
fn coupled_checkpoint_keeps_the_ladder_state() {
    let config = Mc3Config {
        chains: 3,
        ladder: HeatLadder::Incremental { delta: 0.5 },
        ..Mc3Config::default()
    };
    let build = || {
        Mcmcmc::new(
            model(),
            vec![Move::metropolis_hastings(
                Box::new(SlideProposal::new(MU, 0.8)),
                1.0,
            )],
            Vec::new(),
            ScheduleKind::Random,
            &config,
            Arc::new(LocalCommunicator::new()),
            ParallelContext::single(),
            5,
        )
        .unwrap()
    };
    let mut original = MonteCarloSampler::Mcmcmc(build());
    for _ in 0..60 {
        original.next_cycle(true).unwrap();
    }
    let saved = original.checkpoint(5);
    assert_eq!(saved.chains.len(), 3);

    let mut resumed = MonteCarloSampler::Mcmcmc(build());
    resumed.restore(&saved).unwrap();
    let (MonteCarloSampler::Mcmcmc(a), MonteCarloSampler::Mcmcmc(b)) = (&original, &resumed) else {
        panic!("sampler kind changed");
    };
    assert_eq!(a.chain_heats(), b.chain_heats());
    assert_eq!(a.heat_ranks(), b.heat_ranks());
    assert_eq!(a.active_chain_index(), b.active_chain_index());
    assert_eq!(b.generation(), 60);
    for index in 0..3 {
        let restored = b.chain(index).unwrap();
        assert_eq!(restored.values(), a.chain(index).unwrap().values());
        assert_eq!(restored.is_active(), index == a.active_chain_index());
    }
}

#[test]
fn unreadable_checkpoints_report_their_path() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing.json");
    let err = SamplerCheckpoint::load(&missing).unwrap_err();
    assert_eq!(err.info().code, "checkpoint-read");

    let garbled = dir.path().join("garbled.json");
    fs::write(&garbled, "{ not json").unwrap();
    let err = SamplerCheckpoint::load(&garbled).unwrap_err();
    assert_eq!(err.info().code, "checkpoint-parse");
    assert_eq!(
        err.info().context.get("path"),
        Some(&garbled.display().to_string())
    );
}

#[test]
fn empty_checkpoint_cannot_restore_a_chain() {
    let mut sampler = MonteCarloSampler::<_, LocalCommunicator>::mcmc(chain(1));
    let mut saved = sampler.checkpoint(0);
    saved.chains.clear();
    let err = sampler.restore(&saved).unwrap_err();
    assert_eq!(err.info().code, "empty-checkpoint");
}

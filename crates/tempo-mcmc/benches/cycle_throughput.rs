use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tempo_core::normal::{NormalMeanModel, NormalMeanSpec, MU};
use tempo_core::{LocalCommunicator, ParallelContext, RngHandle};
use tempo_mcmc::{Chain, Mc3Config, Mcmcmc, Move, ScheduleKind, SlideProposal};

fn model() -> NormalMeanModel {
    let observations = (0..64).map(|i| (i as f64 * 0.37).sin()).collect();
    NormalMeanModel::new(NormalMeanSpec {
        prior_mean: 0.0,
        prior_sd: 1.0,
        sigma: 1.0,
        observations,
    })
    .expect("model")
}

fn moves() -> Vec<Move<NormalMeanModel>> {
    vec![Move::metropolis_hastings(
        Box::new(SlideProposal::new(MU, 0.3)),
        4.0,
    )]
}

fn bench_chain(c: &mut Criterion) {
    let mut chain = Chain::new(
        model(),
        moves(),
        Vec::new(),
        ScheduleKind::Random,
        RngHandle::from_seed(1),
    )
    .expect("chain");
    c.bench_function("chain_cycle", |b| {
        b.iter(|| black_box(chain.next_cycle(true).expect("cycle")));
    });
}

fn bench_coupled(c: &mut Criterion) {
    let mut mc3 = Mcmcmc::new(
        model(),
        moves(),
        Vec::new(),
        ScheduleKind::Random,
        &Mc3Config::default(),
        Arc::new(LocalCommunicator::new()),
        ParallelContext::single(),
        1,
    )
    .expect("mc3");
    c.bench_function("mcmcmc_cycle_4_chains", |b| {
        b.iter(|| black_box(mc3.next_cycle(true).expect("cycle")));
    });
}

criterion_group!(benches, bench_chain, bench_coupled);
criterion_main!(benches);

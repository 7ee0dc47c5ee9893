use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::tempdir;
use tempo_core::normal::{NormalMeanModel, NormalMeanSpec, MU};
use tempo_core::{LocalCommunicator, ParallelContext, RngHandle};

use tempo_mcmc::determinism::chain_seed;
use tempo_mcmc::{
    Chain, McmcAnalysis, MonteCarloSampler, Monitor, Move, ScaleProposal, ScheduleKind,
    SlideProposal, StoppingRule, TraceMonitor,
};

fn model() -> NormalMeanModel {
    NormalMeanModel::new(NormalMeanSpec {
        prior_mean: 1.0,
        prior_sd: 2.0,
        sigma: 1.0,
        observations: vec![2.1, 1.7, 2.6, 1.9],
    })
    .unwrap()
}

fn run(trace: &Path, master_seed: u64) -> String {
    let monitors: Vec<Box<dyn Monitor<NormalMeanModel>>> =
        vec![Box::new(TraceMonitor::new(trace, vec![MU], 5))];
    let chain = Chain::new(
        model(),
        vec![
            Move::metropolis_hastings(Box::new(SlideProposal::new(MU, 0.7)), 2.0),
            Move::metropolis_hastings(Box::new(ScaleProposal::new(MU, 0.5)), 1.0),
        ],
        monitors,
        ScheduleKind::Random,
        RngHandle::from_seed(chain_seed(master_seed, 0)),
    )
    .unwrap();
    let mut analysis = McmcAnalysis::new(
        MonteCarloSampler::<_, LocalCommunicator>::mcmc(chain),
        Arc::new(LocalCommunicator::new()),
        ParallelContext::single(),
        master_seed,
    );
    analysis.burnin(100, 20).unwrap();
    analysis.run(200, &[]).unwrap();
    fs::read_to_string(trace).unwrap()
}

#[test]
fn same_seed_gives_identical_traces() {
    let dir = tempdir().unwrap();
    let first = run(&dir.path().join("a.log"), 42);
    let second = run(&dir.path().join("b.log"), 42);
    assert_eq!(first, second);
    let other = run(&dir.path().join("c.log"), 43);
    assert_ne!(first, other);
}

#[test]
fn trace_has_header_and_one_row_per_interval() {
    let dir = tempdir().unwrap();
    let trace = run(&dir.path().join("trace.log"), 7);
    let mut lines = trace.lines();
    assert_eq!(
        lines.next(),
        Some("Iteration\tPosterior\tLikelihood\tPrior\tmu")
    );
    let rows: Vec<_> = lines.collect();
    assert_eq!(rows.len(), 41);
    assert!(rows[0].starts_with("0\t"));
    assert!(rows[40].starts_with("200\t"));
}

#[test]
fn iteration_limit_wins_over_a_generous_time_limit() {
    let chain = Chain::new(
        model(),
        vec![Move::metropolis_hastings(
            Box::new(SlideProposal::new(MU, 0.7)),
            1.0,
        )],
        Vec::new(),
        ScheduleKind::Random,
        RngHandle::from_seed(3),
    )
    .unwrap();
    let mut analysis = McmcAnalysis::new(
        MonteCarloSampler::<_, LocalCommunicator>::mcmc(chain),
        Arc::new(LocalCommunicator::new()),
        ParallelContext::single(),
        3,
    );
    let report = analysis
        .run(
            500,
            &[
                StoppingRule::MaxIterations(50),
                StoppingRule::MaxTime(std::time::Duration::from_secs(3600)),
            ],
        )
        .unwrap();
    assert_eq!(report.generations, 50);
    assert_eq!(report.stopped_by, StoppingRule::MaxIterations(50));
}

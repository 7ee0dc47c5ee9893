use tempo_core::normal::{NormalMeanModel, NormalMeanSpec, MU};
use tempo_core::RngHandle;

use tempo_mcmc::{Chain, Move, MoveSchedule, ScheduleKind, SlideProposal};

fn model() -> NormalMeanModel {
    NormalMeanModel::new(NormalMeanSpec {
        prior_mean: 0.0,
        prior_sd: 1.0,
        sigma: 1.0,
        observations: vec![0.2, -0.4, 0.9],
    })
    .unwrap()
}

fn slide(weight: f64) -> Move<NormalMeanModel> {
    Move::metropolis_hastings(Box::new(SlideProposal::new(MU, 0.5)), weight)
}

#[test]
fn weight_two_move_is_tried_twice_per_cycle() {
    let mut chain = Chain::new(
        model(),
        vec![slide(2.0)],
        Vec::new(),
        ScheduleKind::Random,
        RngHandle::from_seed(11),
    )
    .unwrap();
    assert_eq!(chain.moves_per_iteration(), 2.0);
    let generation = chain.next_cycle(true).unwrap();
    assert_eq!(generation, 1);
    assert_eq!(chain.moves()[0].tried(), 2);
    chain.next_cycle(false).unwrap();
    assert_eq!(chain.moves()[0].tried(), 4);
    assert_eq!(chain.generation(), 1);
}

#[test]
fn single_random_schedule_makes_one_proposal() {
    let mut chain = Chain::new(
        model(),
        vec![slide(3.0), slide(1.0)],
        Vec::new(),
        ScheduleKind::Single,
        RngHandle::from_seed(5),
    )
    .unwrap();
    assert_eq!(chain.moves_per_iteration(), 1.0);
    for _ in 0..10 {
        chain.next_cycle(true).unwrap();
    }
    let tried: u64 = chain.moves().iter().map(Move::tried).sum();
    assert_eq!(tried, 10);
}

#[test]
fn sequential_schedule_consumes_whole_weights_in_order() {
    let moves = vec![slide(2.0), slide(1.0)];
    let mut schedule = MoveSchedule::new(ScheduleKind::Sequential, &moves);
    let mut rng = RngHandle::from_seed(1);
    let picks: Vec<usize> = (0..6)
        .map(|_| schedule.next_move(&moves, 0, &mut rng).unwrap())
        .collect();
    assert_eq!(picks, vec![0, 0, 1, 0, 0, 1]);
}

#[test]
fn sequential_fractional_weight_is_a_bernoulli_draw() {
    let moves = vec![slide(1.0), slide(0.5)];
    let mut schedule = MoveSchedule::new(ScheduleKind::Sequential, &moves);
    let mut rng = RngHandle::from_seed(99);
    let picks: Vec<usize> = (0..400)
        .map(|_| schedule.next_move(&moves, 0, &mut rng).unwrap())
        .collect();
    let second = picks.iter().filter(|&&i| i == 1).count();
    // expected share of the half-weight move is 1/3
    assert!(second > 90 && second < 180, "second move picked {second} times");
}

#[test]
fn delayed_moves_are_skipped_until_active() {
    let moves = vec![slide(1.0).with_delay(10), slide(1.0)];
    let mut schedule = MoveSchedule::new(ScheduleKind::Random, &moves);
    let mut rng = RngHandle::from_seed(3);
    for _ in 0..50 {
        assert_eq!(schedule.next_move(&moves, 2, &mut rng).unwrap(), 1);
    }
    let mut seen_first = false;
    for _ in 0..200 {
        seen_first |= schedule.next_move(&moves, 10, &mut rng).unwrap() == 0;
    }
    assert!(seen_first);
}

#[test]
fn schedules_fail_when_no_move_is_active() {
    let moves = vec![slide(1.0).with_delay(5)];
    let mut rng = RngHandle::from_seed(3);
    for kind in [ScheduleKind::Random, ScheduleKind::Sequential, ScheduleKind::Single] {
        let mut schedule = MoveSchedule::new(kind, &moves);
        let err = schedule.next_move(&moves, 0, &mut rng).unwrap_err();
        assert_eq!(err.info().code, "no-active-moves");
    }
}

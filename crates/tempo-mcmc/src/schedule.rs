//! Move schedules.

use serde::{Deserialize, Serialize};
use tempo_core::{ErrorInfo, Model, RngHandle, TempoError};

use crate::moves::Move;

/// Move schedule variant selected in the run configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ScheduleKind {
    /// Weighted random draws, `Σweights` proposals per iteration.
    #[default]
    Random,
    /// Each move in turn for its weight's worth of proposals.
    Sequential,
    /// One weighted random proposal per iteration.
    Single,
}

impl ScheduleKind {
    /// Name used in strategy descriptions.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleKind::Random => "random",
            ScheduleKind::Sequential => "sequential",
            ScheduleKind::Single => "single",
        }
    }
}

/// Policy choosing the next move of an iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum MoveSchedule {
    /// Linear scan of cumulative weights with a uniform draw on `[0, total)`.
    Random {
        /// Sum of all move weights.
        total_weight: f64,
    },
    /// Consumes each move's weight budget before moving on.
    Sequential {
        /// Index of the move being consumed.
        current: usize,
        /// Proposals already issued for the current move.
        used: f64,
    },
    /// Draws exactly one move among those active.
    SingleRandom,
}

impl MoveSchedule {
    /// Builds the schedule for a set of moves.
    pub fn new<M: Model>(kind: ScheduleKind, moves: &[Move<M>]) -> Self {
        match kind {
            ScheduleKind::Random => MoveSchedule::Random {
                total_weight: moves.iter().map(Move::weight).sum(),
            },
            ScheduleKind::Sequential => MoveSchedule::Sequential {
                current: 0,
                used: 0.0,
            },
            ScheduleKind::Single => MoveSchedule::SingleRandom,
        }
    }

    /// Variant tag of the schedule.
    pub fn kind(&self) -> ScheduleKind {
        match self {
            MoveSchedule::Random { .. } => ScheduleKind::Random,
            MoveSchedule::Sequential { .. } => ScheduleKind::Sequential,
            MoveSchedule::SingleRandom => ScheduleKind::Single,
        }
    }

    /// Expected number of proposals per iteration.
    pub fn moves_per_iteration<M: Model>(&self, moves: &[Move<M>]) -> f64 {
        match self {
            MoveSchedule::Random { total_weight } => *total_weight,
            MoveSchedule::Sequential { .. } => moves.iter().map(Move::weight).sum(),
            MoveSchedule::SingleRandom => 1.0,
        }
    }

    /// Picks the index of the next move to perform at `generation`.
    ///
    /// Fails when no move with positive weight is active, instead of spinning.
    pub fn next_move<M: Model>(
        &mut self,
        moves: &[Move<M>],
        generation: u64,
        rng: &mut RngHandle,
    ) -> Result<usize, TempoError> {
        match self {
            MoveSchedule::Random { total_weight } => {
                if moves.iter().all(|m| m.is_active(generation)) && *total_weight > 0.0 {
                    let u = rng.uniform01() * *total_weight;
                    Ok(scan(moves.iter().map(Move::weight), u, moves.len()))
                } else {
                    draw_active(moves, generation, rng)
                }
            }
            MoveSchedule::Sequential { current, used } => {
                next_sequential(moves, generation, current, used, rng)
            }
            MoveSchedule::SingleRandom => draw_active(moves, generation, rng),
        }
    }
}

fn scan(weights: impl Iterator<Item = f64>, u: f64, len: usize) -> usize {
    let mut cumulative = 0.0;
    let mut last_positive = 0;
    for (index, weight) in weights.enumerate() {
        if weight > 0.0 {
            last_positive = index;
        }
        cumulative += weight;
        if u < cumulative {
            return index;
        }
    }
    // rounding can leave u == total
    last_positive.min(len.saturating_sub(1))
}

fn draw_active<M: Model>(
    moves: &[Move<M>],
    generation: u64,
    rng: &mut RngHandle,
) -> Result<usize, TempoError> {
    let active_weight = |m: &Move<M>| {
        if m.is_active(generation) {
            m.weight()
        } else {
            0.0
        }
    };
    let total: f64 = moves.iter().map(active_weight).sum();
    if total <= 0.0 {
        return Err(no_active_moves(generation, moves.len()));
    }
    let u = rng.uniform01() * total;
    Ok(scan(moves.iter().map(active_weight), u, moves.len()))
}

fn next_sequential<M: Model>(
    moves: &[Move<M>],
    generation: u64,
    current: &mut usize,
    used: &mut f64,
    rng: &mut RngHandle,
) -> Result<usize, TempoError> {
    if moves.is_empty() {
        return Err(no_active_moves(generation, 0));
    }
    let mut visited = 0usize;
    let mut saw_candidate = false;
    loop {
        if *current >= moves.len() {
            *current = 0;
        }
        let candidate = &moves[*current];
        if candidate.is_active(generation) && candidate.weight() > 0.0 {
            saw_candidate = true;
            let remaining = candidate.weight() - *used;
            if remaining >= 1.0 {
                *used += 1.0;
                return Ok(*current);
            }
            if remaining > 0.0 {
                // fractional remainder: a single Bernoulli draw decides
                *used = candidate.weight();
                if rng.uniform01() < remaining {
                    return Ok(*current);
                }
            }
        }
        *current += 1;
        *used = 0.0;
        visited += 1;
        if visited >= moves.len() && !saw_candidate {
            return Err(no_active_moves(generation, moves.len()));
        }
    }
}

fn no_active_moves(generation: u64, moves: usize) -> TempoError {
    TempoError::Config(
        ErrorInfo::new("no-active-moves", "no move with positive weight is active")
            .with_context("generation", generation.to_string())
            .with_context("moves", moves.to_string()),
    )
}

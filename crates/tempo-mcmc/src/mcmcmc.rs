//! Metropolis-coupled MCMC: chains at decreasing heats run in lock-step and
//! periodically exchange their heats.
//!
//! Chains are partitioned over the ranks of a [`ParallelContext`]; each rank
//! materialises only the chains it owns. Swap decisions are taken by the
//! active rank from values gathered from the owners, then broadcast so every
//! rank applies the identical outcome to its replicated ladder state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tempo_core::{
    Communicator, ErrorInfo, Model, ParallelContext, Partition, RngHandle, TempoError,
};

use crate::chain::Chain;
use crate::config::Mc3Config;
use crate::determinism;
use crate::monitor::Monitor;
use crate::moves::{metropolis_accept, tune_toward, Move, MoveSummary};
use crate::schedule::ScheduleKind;

/// Heat of the `rank`-th chain of an incremental ladder.
pub fn compute_heat(delta: f64, rank: usize) -> f64 {
    1.0 / (1.0 + delta * rank as f64)
}

/// Log acceptance ratio of exchanging the heats of two chains.
///
/// `ln_value_*` are the chains' untempered target densities.
pub fn swap_ln_ratio(heat_j: f64, heat_k: f64, ln_value_j: f64, ln_value_k: f64) -> f64 {
    heat_j * (ln_value_k - ln_value_j) + heat_k * (ln_value_j - ln_value_k)
}

/// Heats assigned to the chains, cold chain first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HeatLadder {
    /// `heat_i = 1 / (1 + delta·i)`.
    Incremental {
        /// Spacing parameter.
        delta: f64,
    },
    /// Explicit heats, strictly decreasing from 1.
    Manual {
        /// Heat per rank.
        heats: Vec<f64>,
    },
}

impl Default for HeatLadder {
    fn default() -> Self {
        HeatLadder::Incremental { delta: 0.2 }
    }
}

impl HeatLadder {
    /// Heats of `chains` ranks.
    pub fn heats(&self, chains: usize) -> Vec<f64> {
        match self {
            HeatLadder::Incremental { delta } => {
                (0..chains).map(|rank| compute_heat(*delta, rank)).collect()
            }
            HeatLadder::Manual { heats } => heats.clone(),
        }
    }

    /// Checks the ladder can serve `chains` chains.
    pub fn validate(&self, chains: usize) -> Result<(), TempoError> {
        match self {
            HeatLadder::Incremental { delta } if !(*delta > 0.0) => Err(TempoError::Config(
                ErrorInfo::new("invalid-heat-ladder", "delta must be positive")
                    .with_context("delta", delta.to_string()),
            )),
            HeatLadder::Incremental { .. } => Ok(()),
            HeatLadder::Manual { heats } => {
                let decreasing = heats.windows(2).all(|w| w[0] > w[1]);
                let in_range = heats.iter().all(|&h| h > 0.0 && h <= 1.0);
                if heats.len() != chains
                    || heats.first() != Some(&1.0)
                    || !decreasing
                    || !in_range
                {
                    return Err(TempoError::Config(
                        ErrorInfo::new(
                            "invalid-heat-ladder",
                            "heats must start at 1, decrease strictly, stay positive and match the chain count",
                        )
                        .with_context("chains", chains.to_string())
                        .with_context("heats", format!("{heats:?}")),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Which chain pairs are proposed for exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SwapMode {
    /// Adjacent ranks of the ladder, hottest pair first.
    #[default]
    Neighbor,
    /// Uniformly drawn pairs.
    Random,
    /// Neighbour swaps every `swap_interval`, random every `swap_interval2`.
    Both,
}

/// Attempt/accept counters per unordered pair of heat ranks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapStats {
    chains: usize,
    attempted: Vec<u64>,
    accepted: Vec<u64>,
    attempted_period: Vec<u64>,
    accepted_period: Vec<u64>,
}

/// Acceptance of swaps between two heat ranks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapPairSummary {
    /// Colder rank of the pair.
    pub rank_a: usize,
    /// Hotter rank of the pair.
    pub rank_b: usize,
    /// Attempts since the last reset.
    pub attempted: u64,
    /// Accepted attempts since the last reset.
    pub accepted: u64,
    /// `accepted / attempted`.
    pub acceptance_ratio: f64,
}

impl SwapStats {
    /// Empty counters for `chains` ranks.
    pub fn new(chains: usize) -> Self {
        let cells = chains * chains;
        Self {
            chains,
            attempted: vec![0; cells],
            accepted: vec![0; cells],
            attempted_period: vec![0; cells],
            accepted_period: vec![0; cells],
        }
    }

    fn cell(&self, a: usize, b: usize) -> usize {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        lo * self.chains + hi
    }

    /// Records one attempt between ranks `a` and `b`.
    pub fn record(&mut self, a: usize, b: usize, accepted: bool) {
        let cell = self.cell(a, b);
        self.attempted[cell] += 1;
        self.attempted_period[cell] += 1;
        if accepted {
            self.accepted[cell] += 1;
            self.accepted_period[cell] += 1;
        }
    }

    /// Cumulative `(attempted, accepted)` between ranks `a` and `b`.
    pub fn counts(&self, a: usize, b: usize) -> (u64, u64) {
        let cell = self.cell(a, b);
        (self.attempted[cell], self.accepted[cell])
    }

    /// Acceptance rate of neighbour swaps in the current period.
    pub fn neighbor_period_rate(&self) -> Option<f64> {
        let (tried, taken) = (1..self.chains).fold((0u64, 0u64), |(t, a), rank| {
            let cell = self.cell(rank - 1, rank);
            (t + self.attempted_period[cell], a + self.accepted_period[cell])
        });
        (tried > 0).then(|| taken as f64 / tried as f64)
    }

    /// Clears the period counters.
    pub fn reset_period(&mut self) {
        self.attempted_period.iter_mut().for_each(|c| *c = 0);
        self.accepted_period.iter_mut().for_each(|c| *c = 0);
    }

    /// Clears every counter.
    pub fn reset(&mut self) {
        *self = Self::new(self.chains);
    }

    /// Pairs with at least one attempt.
    pub fn summary(&self) -> Vec<SwapPairSummary> {
        let mut pairs = Vec::new();
        for a in 0..self.chains {
            for b in a + 1..self.chains {
                let (attempted, accepted) = self.counts(a, b);
                if attempted > 0 {
                    pairs.push(SwapPairSummary {
                        rank_a: a,
                        rank_b: b,
                        attempted,
                        accepted,
                        acceptance_ratio: accepted as f64 / attempted as f64,
                    });
                }
            }
        }
        pairs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SwapKind {
    Neighbor,
    Random,
}

/// Metropolis-coupled sampler over `chains` heated copies of a model.
///
/// Cloning shares the communicator and reopens no monitor streams.
pub struct Mcmcmc<M: Model, C: Communicator> {
    chains: Vec<Option<Chain<M>>>,
    monitors: Vec<Box<dyn Monitor<M>>>,
    comm: Arc<C>,
    context: ParallelContext,
    partition: Partition,
    heat_ranks: Vec<usize>,
    chain_heats: Vec<f64>,
    active_chain_index: usize,
    ladder: HeatLadder,
    swap_mode: SwapMode,
    swap_interval: u64,
    swap_interval2: u64,
    tune_heat: bool,
    tune_heat_target: f64,
    stats: SwapStats,
    generation: u64,
    cycles: u64,
    swap_rng: RngHandle,
}

impl<M: Model, C: Communicator> Clone for Mcmcmc<M, C> {
    fn clone(&self) -> Self {
        Self {
            chains: self.chains.clone(),
            monitors: self.monitors.clone(),
            comm: Arc::clone(&self.comm),
            context: self.context,
            partition: self.partition.clone(),
            heat_ranks: self.heat_ranks.clone(),
            chain_heats: self.chain_heats.clone(),
            active_chain_index: self.active_chain_index,
            ladder: self.ladder.clone(),
            swap_mode: self.swap_mode,
            swap_interval: self.swap_interval,
            swap_interval2: self.swap_interval2,
            tune_heat: self.tune_heat,
            tune_heat_target: self.tune_heat_target,
            stats: self.stats.clone(),
            generation: self.generation,
            cycles: self.cycles,
            swap_rng: self.swap_rng.clone(),
        }
    }
}

impl<M: Model, C: Communicator> std::fmt::Debug for Mcmcmc<M, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mcmcmc")
            .field("context", &self.context)
            .field("chain_heats", &self.chain_heats)
            .field("heat_ranks", &self.heat_ranks)
            .field("active_chain_index", &self.active_chain_index)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl<M: Model, C: Communicator> Mcmcmc<M, C> {
    /// Builds the chains owned by `context.pid` and initialises them.
    ///
    /// Chain `i` draws from the substream `chain_seed(master_seed, i)`, so the
    /// run does not depend on how chains are spread over ranks.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model: M,
        moves: Vec<Move<M>>,
        monitors: Vec<Box<dyn Monitor<M>>>,
        schedule: ScheduleKind,
        config: &Mc3Config,
        comm: Arc<C>,
        context: ParallelContext,
        master_seed: u64,
    ) -> Result<Self, TempoError> {
        config.validate()?;
        for node in monitors.iter().flat_map(|m| m.nodes()) {
            if !model.contains(node) {
                return Err(TempoError::Model(
                    ErrorInfo::new("unknown-node", "monitor refers to a node outside the model")
                        .with_context("node", node.as_raw().to_string()),
                ));
            }
        }
        let num_chains = config.chains;
        let heats = config.ladder.heats(num_chains);
        let partition = context.partition(num_chains);
        let mut chains: Vec<Option<Chain<M>>> = (0..num_chains).map(|_| None).collect();
        for &index in partition.items_of(context.pid) {
            let rng = RngHandle::from_seed(determinism::chain_seed(master_seed, index));
            let mut chain = Chain::new(model.clone(), moves.clone(), Vec::new(), schedule, rng)?;
            chain.set_index(index);
            chain.set_posterior_heat(heats[index]);
            if index != 0 {
                chain.set_active(false);
                chain.initialize(false)?;
            }
            chains[index] = Some(chain);
        }
        log::debug!(
            "rank {} owns chains {:?} of {num_chains}",
            context.pid,
            partition.items_of(context.pid)
        );
        Ok(Self {
            chains,
            monitors,
            comm,
            context,
            partition,
            heat_ranks: (0..num_chains).collect(),
            chain_heats: heats,
            active_chain_index: 0,
            ladder: config.ladder.clone(),
            swap_mode: config.swap_mode,
            swap_interval: config.swap_interval,
            swap_interval2: config.swap_interval2,
            tune_heat: config.tune_heat,
            tune_heat_target: config.tune_heat_target,
            stats: SwapStats::new(num_chains),
            generation: 0,
            cycles: 0,
            swap_rng: RngHandle::from_seed(determinism::swap_seed(master_seed)),
        })
    }

    fn owned(&mut self) -> impl Iterator<Item = &mut Chain<M>> {
        self.chains.iter_mut().flatten()
    }

    /// Number of chains across all ranks.
    pub fn num_chains(&self) -> usize {
        self.chain_heats.len()
    }

    /// Current heat of every chain, by chain index.
    pub fn chain_heats(&self) -> &[f64] {
        &self.chain_heats
    }

    /// Chain index holding each heat rank (rank 0 is the cold chain).
    pub fn heat_ranks(&self) -> &[usize] {
        &self.heat_ranks
    }

    /// Index of the chain currently at heat 1.
    pub fn active_chain_index(&self) -> usize {
        self.active_chain_index
    }

    /// Current heat ladder, including tuned spacing.
    pub fn ladder(&self) -> &HeatLadder {
        &self.ladder
    }

    /// Swap counters.
    pub fn stats(&self) -> &SwapStats {
        &self.stats
    }

    /// Rank layout.
    pub fn context(&self) -> ParallelContext {
        self.context
    }

    /// Communicator shared with the rest of the analysis.
    pub fn communicator(&self) -> &Arc<C> {
        &self.comm
    }

    /// Chain `index` if this rank owns it.
    pub fn chain(&self, index: usize) -> Option<&Chain<M>> {
        self.chains.get(index).and_then(Option::as_ref)
    }

    /// Completed generations.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Overrides the generation counter (checkpoint restore).
    pub fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
        for chain in self.owned() {
            chain.set_generation(generation);
        }
    }

    /// Switches every chain and the swap decisions to streams derived from
    /// `master_seed`.
    pub fn reseed(&mut self, master_seed: u64) {
        for chain in self.owned() {
            let index = chain.index();
            chain.reseed(RngHandle::from_seed(determinism::chain_seed(master_seed, index)));
        }
        self.swap_rng = RngHandle::from_seed(determinism::swap_seed(master_seed));
    }

    /// Re-initialises the owned chains; heated chains start from prior draws.
    pub fn initialize(&mut self, prior_only: bool) -> Result<(), TempoError> {
        let active = self.active_chain_index;
        for chain in self.owned() {
            chain.set_active(chain.index() == active);
            chain.initialize(prior_only)?;
        }
        self.generation = 0;
        Ok(())
    }

    /// Advances every owned chain by one cycle and swaps when due.
    pub fn next_cycle(&mut self, advance: bool) -> Result<u64, TempoError> {
        for chain in self.owned() {
            chain.next_cycle(advance)?;
        }
        if advance {
            self.generation += 1;
        }
        self.cycles += 1;
        if self.num_chains() > 1 {
            let neighbor_due = self.cycles % self.swap_interval == 0;
            let random_due = self.cycles % self.swap_interval2 == 0;
            match self.swap_mode {
                SwapMode::Neighbor if neighbor_due => self.swap(SwapKind::Neighbor)?,
                SwapMode::Random if neighbor_due => self.swap(SwapKind::Random)?,
                SwapMode::Both => {
                    if neighbor_due {
                        self.swap(SwapKind::Neighbor)?;
                    }
                    if random_due {
                        self.swap(SwapKind::Random)?;
                    }
                }
                _ => {}
            }
        }
        Ok(self.generation)
    }

    /// Collects the target density of every chain on the active rank.
    fn gather_values(&mut self) -> Result<Vec<f64>, TempoError> {
        let mut values = vec![f64::NAN; self.num_chains()];
        let mut local = Vec::new();
        for chain in self.owned() {
            let value = chain.ln_target_density();
            values[chain.index()] = value;
            local.push(chain.index() as f64);
            local.push(value);
        }
        let active = self.context.active_pid;
        if self.context.pid != active {
            if !self.partition.items_of(self.context.pid).is_empty() {
                self.comm.send(active, &local)?;
            }
            return Ok(values);
        }
        for rank in self.partition.owning_ranks() {
            if rank == active {
                continue;
            }
            let message = self.comm.recv(rank)?;
            for pair in message.chunks_exact(2) {
                if let Some(slot) = values.get_mut(pair[0] as usize) {
                    *slot = pair[1];
                }
            }
        }
        Ok(values)
    }

    fn swap(&mut self, kind: SwapKind) -> Result<(), TempoError> {
        let values = self.gather_values()?;
        let mut decisions = Vec::new();
        if self.context.is_active() {
            let n = self.num_chains();
            match kind {
                SwapKind::Neighbor => {
                    for rank in (1..n).rev() {
                        let (j, k) = (self.heat_ranks[rank - 1], self.heat_ranks[rank]);
                        let accepted = self.decide(j, k, &values);
                        self.apply_swap(j, k, accepted);
                        decisions.extend([j as f64, k as f64, f64::from(u8::from(accepted))]);
                    }
                }
                SwapKind::Random => {
                    for _ in 1..n {
                        let j = self.swap_rng.index(n);
                        let mut k = self.swap_rng.index(n - 1);
                        if k >= j {
                            k += 1;
                        }
                        let accepted = self.decide(j, k, &values);
                        self.apply_swap(j, k, accepted);
                        decisions.extend([j as f64, k as f64, f64::from(u8::from(accepted))]);
                    }
                }
            }
        }
        self.comm
            .broadcast(self.context.active_pid, self.context.ranks(), &mut decisions)?;
        if !self.context.is_active() {
            for decision in decisions.chunks_exact(3) {
                self.apply_swap(decision[0] as usize, decision[1] as usize, decision[2] > 0.5);
            }
        }
        self.sync_owned_chains();
        Ok(())
    }

    fn decide(&mut self, j: usize, k: usize, values: &[f64]) -> bool {
        let ln_r = swap_ln_ratio(self.chain_heats[j], self.chain_heats[k], values[j], values[k]);
        metropolis_accept(ln_r, &mut self.swap_rng)
    }

    /// Records an attempt between chains `j` and `k` and exchanges their heats
    /// when accepted.
    fn apply_swap(&mut self, j: usize, k: usize, accepted: bool) {
        let rank_j = self.rank_of(j);
        let rank_k = self.rank_of(k);
        self.stats.record(rank_j, rank_k, accepted);
        if !accepted {
            return;
        }
        self.chain_heats.swap(j, k);
        self.heat_ranks.swap(rank_j, rank_k);
        if self.active_chain_index == j {
            self.active_chain_index = k;
        } else if self.active_chain_index == k {
            self.active_chain_index = j;
        }
    }

    fn rank_of(&self, chain: usize) -> usize {
        self.heat_ranks
            .iter()
            .position(|&c| c == chain)
            .unwrap_or(chain)
    }

    fn sync_owned_chains(&mut self) {
        let active = self.active_chain_index;
        let heats = self.chain_heats.clone();
        for chain in self.owned() {
            chain.set_posterior_heat(heats[chain.index()]);
            chain.set_active(chain.index() == active);
        }
    }

    /// Tunes the moves of owned chains and, when enabled, the ladder spacing
    /// from the neighbour-swap acceptance of the current period.
    pub fn tune(&mut self) {
        for chain in self.owned() {
            chain.tune();
        }
        if !self.tune_heat || self.num_chains() < 2 {
            return;
        }
        let Some(rate) = self.stats.neighbor_period_rate() else {
            return;
        };
        let rank_heats = match &mut self.ladder {
            HeatLadder::Incremental { delta } => {
                *delta = tune_toward(*delta, rate, self.tune_heat_target);
                HeatLadder::Incremental { delta: *delta }.heats(self.heat_ranks.len())
            }
            HeatLadder::Manual { heats } => {
                // rescale gaps in log space so heats stay positive and ordered
                let factor = tune_toward(1.0, rate, self.tune_heat_target);
                let mut scaled = Vec::with_capacity(heats.len());
                let mut ln_previous = 0.0;
                for (rank, heat) in heats.iter().enumerate() {
                    if rank == 0 {
                        scaled.push(1.0);
                        continue;
                    }
                    let gap = heats[rank - 1].ln() - heat.ln();
                    ln_previous -= gap * factor;
                    scaled.push(ln_previous.exp());
                }
                *heats = scaled.clone();
                scaled
            }
        };
        for (rank, &chain) in self.heat_ranks.iter().enumerate() {
            self.chain_heats[chain] = rank_heats[rank];
        }
        log::debug!("ladder tuned at rate {rate:.3}: {:?}", self.ladder);
        self.stats.reset_period();
        self.sync_owned_chains();
    }

    /// Runs `generations` cycles without advancing, tuning periodically.
    pub fn burnin(&mut self, generations: u64, tuning_interval: u64) -> Result<(), TempoError> {
        for k in 1..=generations {
            self.next_cycle(false)?;
            if tuning_interval > 0 && k % tuning_interval == 0 && k != generations {
                self.tune();
            }
        }
        Ok(())
    }

    /// Clears swap counters, the generation and the owned chains' counters.
    pub fn reset(&mut self) {
        self.stats.reset();
        self.generation = 0;
        self.cycles = 0;
        for chain in self.owned() {
            chain.reset();
        }
    }

    /// Sets the likelihood power on every owned chain.
    pub fn set_likelihood_heat(&mut self, heat: f64) {
        for chain in self.owned() {
            chain.set_likelihood_heat(heat);
        }
    }

    /// Log probability of the cold chain, identical on every rank of the group.
    pub fn model_ln_probability(&mut self, likelihood_only: bool) -> Result<f64, TempoError> {
        let owner = self.partition.owner(self.active_chain_index);
        let active = self.active_chain_index;
        let mut value = Vec::new();
        if let Some(chain) = self.chains.get_mut(active).and_then(Option::as_mut) {
            value.push(chain.model_ln_probability(likelihood_only));
        }
        self.comm.broadcast(owner, self.context.ranks(), &mut value)?;
        value.first().copied().ok_or_else(|| {
            TempoError::Parallel(
                ErrorInfo::new("missing-cold-value", "cold chain value was not received")
                    .with_context("owner", owner.to_string()),
            )
        })
    }

    /// Opens the shared monitors.
    ///
    /// The active rank creates the files and writes the headers; the other
    /// owning ranks then open them for appending, since the cold chain may
    /// move to any of them.
    pub fn start_monitors(&mut self, append: bool) -> Result<(), TempoError> {
        let owns = !self.partition.items_of(self.context.pid).is_empty();
        if self.context.is_active() {
            let model = self
                .chains
                .iter()
                .flatten()
                .next()
                .map(|chain| chain.model().clone());
            for monitor in &mut self.monitors {
                monitor.open_stream(append)?;
                if let (false, Some(model)) = (append, model.as_ref()) {
                    monitor.print_header(model)?;
                }
            }
        }
        self.comm
            .barrier_among(self.context.active_pid, self.context.ranks())?;
        if !self.context.is_active() && owns {
            for monitor in &mut self.monitors {
                monitor.open_stream(true)?;
            }
        }
        Ok(())
    }

    /// Records the cold chain on the rank that owns it.
    pub fn monitor(&mut self, generation: u64) -> Result<(), TempoError> {
        let active = self.active_chain_index;
        if let Some(chain) = self.chains.get_mut(active).and_then(Option::as_mut) {
            chain.write_state(generation, &mut self.monitors)?;
        }
        Ok(())
    }

    /// Closes the monitors.
    pub fn finish_monitors(&mut self) -> Result<(), TempoError> {
        for monitor in &mut self.monitors {
            monitor.close_stream()?;
        }
        Ok(())
    }

    /// Moves the monitor outputs to a derived path.
    pub fn add_file_extension(&mut self, extension: &str, directory: bool) {
        for monitor in &mut self.monitors {
            monitor.add_file_extension(extension, directory);
        }
    }

    /// Human-readable sampling strategy.
    pub fn strategy_description(&self) -> String {
        let mut description = format!(
            "The MCMCMC simulator runs 1 cold chain and {} heated chains.\n",
            self.num_chains().saturating_sub(1)
        );
        if let Some(chain) = self.chains.iter().flatten().next() {
            description.push_str(&chain.strategy_description());
        }
        description
    }

    /// Per-move statistics of each owned chain.
    pub fn operator_summary(&self) -> Vec<(usize, Vec<MoveSummary>)> {
        self.chains
            .iter()
            .flatten()
            .map(|chain| (chain.index(), chain.operator_summary()))
            .collect()
    }

    /// Free node values of every owned chain, by chain index.
    pub fn chain_values(&self) -> Vec<(usize, Vec<(String, String)>)> {
        self.chains
            .iter()
            .flatten()
            .map(|chain| (chain.index(), chain.values()))
            .collect()
    }

    /// Restores the ladder state and the values of owned chains.
    pub fn restore_state(
        &mut self,
        chain_heats: &[f64],
        heat_ranks: &[usize],
        active_chain_index: usize,
        values: &[(usize, Vec<(String, String)>)],
    ) -> Result<(), TempoError> {
        if chain_heats.len() != self.num_chains() || heat_ranks.len() != self.num_chains() {
            return Err(TempoError::Serde(
                ErrorInfo::new("checkpoint-mismatch", "checkpoint chain count differs")
                    .with_context("expected", self.num_chains().to_string())
                    .with_context("found", chain_heats.len().to_string()),
            ));
        }
        self.chain_heats = chain_heats.to_vec();
        self.heat_ranks = heat_ranks.to_vec();
        self.active_chain_index = active_chain_index;
        for (index, chain_values) in values {
            if let Some(chain) = self.chains.get_mut(*index).and_then(Option::as_mut) {
                chain.set_values(chain_values)?;
            }
        }
        self.sync_owned_chains();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn incremental_heats_decrease_from_one() {
        let heats = HeatLadder::Incremental { delta: 0.5 }.heats(3);
        assert_relative_eq!(heats[0], 1.0);
        assert_relative_eq!(heats[1], 1.0 / 1.5);
        assert_relative_eq!(heats[2], 0.5);
    }

    #[test]
    fn manual_ladder_must_start_cold() {
        let ladder = HeatLadder::Manual {
            heats: vec![0.9, 0.5],
        };
        assert!(ladder.validate(2).is_err());
        let ladder = HeatLadder::Manual {
            heats: vec![1.0, 0.5],
        };
        assert!(ladder.validate(2).is_ok());
        assert!(ladder.validate(3).is_err());
    }

    #[test]
    fn stats_are_symmetric_in_ranks() {
        let mut stats = SwapStats::new(3);
        stats.record(1, 0, true);
        stats.record(0, 1, false);
        assert_eq!(stats.counts(0, 1), (2, 1));
        assert_eq!(stats.neighbor_period_rate(), Some(0.5));
        stats.reset_period();
        assert_eq!(stats.neighbor_period_rate(), None);
        assert_eq!(stats.counts(1, 0), (2, 1));
    }
}

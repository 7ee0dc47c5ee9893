//! A single Markov chain over a cloned model.

use tempo_core::{is_computable, ErrorInfo, Model, NodeId, RngHandle, TempoError};

use crate::monitor::{ChainState, Monitor};
use crate::moves::{AcceptanceRule, Heats, Move, MoveSummary};
use crate::schedule::{MoveSchedule, ScheduleKind};

/// Redraw attempts made before initialisation gives up.
pub const MAX_INIT_ATTEMPTS: usize = 100;

/// One MCMC run: an owned model clone, its moves and monitors, and the heats
/// it samples under.
#[derive(Clone)]
pub struct Chain<M: Model> {
    model: M,
    moves: Vec<Move<M>>,
    monitors: Vec<Box<dyn Monitor<M>>>,
    schedule: MoveSchedule,
    heats: Heats,
    rule: AcceptanceRule,
    generation: u64,
    active: bool,
    index: usize,
    rng: RngHandle,
    ln_probability: f64,
}

impl<M: Model> std::fmt::Debug for Chain<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("index", &self.index)
            .field("generation", &self.generation)
            .field("heats", &self.heats)
            .field("active", &self.active)
            .field("moves", &self.moves)
            .finish_non_exhaustive()
    }
}

impl<M: Model> Chain<M> {
    /// Builds and initialises a chain.
    ///
    /// Every node referenced by a move or monitor must belong to `model`.
    pub fn new(
        model: M,
        moves: Vec<Move<M>>,
        monitors: Vec<Box<dyn Monitor<M>>>,
        schedule: ScheduleKind,
        rng: RngHandle,
    ) -> Result<Self, TempoError> {
        for node in moves
            .iter()
            .flat_map(Move::nodes)
            .chain(monitors.iter().flat_map(|m| m.nodes()))
        {
            if !model.contains(node) {
                return Err(unknown_node(node));
            }
        }
        if moves.is_empty() {
            return Err(TempoError::Config(
                ErrorInfo::new("no-moves", "a chain needs at least one move")
                    .with_hint("add a proposal or gibbs move to the analysis"),
            ));
        }
        let schedule = MoveSchedule::new(schedule, &moves);
        let mut chain = Self {
            model,
            moves,
            monitors,
            schedule,
            heats: Heats::default(),
            rule: AcceptanceRule::default(),
            generation: 0,
            active: true,
            index: 0,
            rng,
            ln_probability: f64::NAN,
        };
        chain.initialize(false)?;
        Ok(chain)
    }

    /// Switches the acceptance rule (greedy for hill climbing).
    pub fn with_rule(mut self, rule: AcceptanceRule) -> Self {
        self.rule = rule;
        self
    }

    /// Resets the generation and finds a starting state with a computable
    /// joint probability.
    ///
    /// Inactive chains (and `prior_only` runs) start from values redrawn from
    /// the prior. A non-computable state triggers fresh draws, at most
    /// [`MAX_INIT_ATTEMPTS`] times.
    pub fn initialize(&mut self, prior_only: bool) -> Result<(), TempoError> {
        self.generation = 0;
        self.model.touch_all();
        if !self.active || prior_only {
            self.redraw_free_nodes();
        }
        let mut attempts = 0;
        loop {
            self.model.touch_all();
            let ln_posterior = self.model.ln_posterior();
            if is_computable(ln_posterior) {
                self.model.keep_all();
                break;
            }
            attempts += 1;
            if attempts >= MAX_INIT_ATTEMPTS {
                self.model.restore_all();
                return Err(TempoError::Config(
                    ErrorInfo::new(
                        "no-computable-start",
                        "Unable to find a starting state with computable probability",
                    )
                    .with_context("attempts", attempts.to_string())
                    .with_context("chain", self.index.to_string()),
                ));
            }
            log::warn!(
                "chain {}: non-computable starting probability ({ln_posterior}), redrawing values",
                self.index
            );
            self.redraw_free_nodes();
        }
        self.schedule = MoveSchedule::new(self.schedule.kind(), &self.moves);
        for mv in &mut self.moves {
            mv.reset_counters();
        }
        self.ln_probability = self.ln_target_density();
        Ok(())
    }

    fn redraw_free_nodes(&mut self) {
        for node in self.model.ordered_stochastic_nodes() {
            if !self.model.is_clamped(node) {
                self.model.redraw(node, &mut self.rng);
            }
        }
    }

    /// Runs one iteration of `round(moves_per_iteration)` proposals.
    ///
    /// `advance` increments the generation counter.
    pub fn next_cycle(&mut self, advance: bool) -> Result<u64, TempoError> {
        let proposals = self.moves_per_iteration().round() as usize;
        for _ in 0..proposals {
            let index = self
                .schedule
                .next_move(&self.moves, self.generation, &mut self.rng)?;
            self.moves[index].perform(&mut self.model, &self.heats, self.rule, &mut self.rng);
        }
        self.ln_probability = self.ln_target_density();
        if !is_computable(self.ln_probability) {
            log::debug!(
                "chain {} generation {}: non-computable probability {}",
                self.index,
                self.generation,
                self.ln_probability
            );
        }
        if advance {
            self.generation += 1;
        }
        Ok(self.generation)
    }

    /// Expected proposals per iteration under the current schedule.
    pub fn moves_per_iteration(&self) -> f64 {
        self.schedule.moves_per_iteration(&self.moves)
    }

    /// Auto-tunes every move from its acceptance rate since the last tuning.
    pub fn tune(&mut self) {
        for mv in &mut self.moves {
            mv.auto_tune();
        }
    }

    /// Runs `generations` cycles without advancing the generation, tuning
    /// every `tuning_interval` cycles except after the last one.
    pub fn burnin(&mut self, generations: u64, tuning_interval: u64) -> Result<(), TempoError> {
        for k in 1..=generations {
            self.next_cycle(false)?;
            if tuning_interval > 0 && k % tuning_interval == 0 && k != generations {
                self.tune();
            }
        }
        Ok(())
    }

    /// Clears move counters and the generation.
    pub fn reset(&mut self) {
        self.generation = 0;
        for mv in &mut self.moves {
            mv.reset_counters();
        }
    }

    /// Passes the current state to every monitor of the chain.
    pub fn monitor(&mut self, generation: u64) -> Result<(), TempoError> {
        let mut monitors = std::mem::take(&mut self.monitors);
        let result = self.write_state(generation, &mut monitors);
        self.monitors = monitors;
        result
    }

    /// Passes the current state to monitors held outside the chain.
    pub fn write_state(
        &mut self,
        generation: u64,
        monitors: &mut [Box<dyn Monitor<M>>],
    ) -> Result<(), TempoError> {
        let ln_prior = self.model.ln_prior();
        let ln_likelihood = self.model.ln_likelihood();
        let state = ChainState {
            model: &self.model,
            generation,
            ln_posterior: ln_prior + ln_likelihood,
            ln_likelihood,
            ln_prior,
            heats: self.heats,
            chain_index: self.index,
        };
        for monitor in monitors.iter_mut() {
            monitor.monitor(&state)?;
        }
        Ok(())
    }

    /// Opens the monitor streams; headers are written unless appending.
    pub fn start_monitors(&mut self, append: bool) -> Result<(), TempoError> {
        for monitor in &mut self.monitors {
            monitor.open_stream(append)?;
            if !append {
                monitor.print_header(&self.model)?;
            }
        }
        Ok(())
    }

    /// Closes the monitor streams.
    pub fn finish_monitors(&mut self) -> Result<(), TempoError> {
        for monitor in &mut self.monitors {
            monitor.close_stream()?;
        }
        Ok(())
    }

    /// Moves the monitor outputs of this chain to a derived path.
    pub fn add_file_extension(&mut self, extension: &str, directory: bool) {
        for monitor in &mut self.monitors {
            monitor.add_file_extension(extension, directory);
        }
    }

    /// Detaches the monitors, leaving the chain without any.
    pub fn take_monitors(&mut self) -> Vec<Box<dyn Monitor<M>>> {
        std::mem::take(&mut self.monitors)
    }

    /// Unheated log probability of the model: the joint, or only the
    /// likelihood when `likelihood_only` is set.
    pub fn model_ln_probability(&mut self, likelihood_only: bool) -> f64 {
        if likelihood_only {
            self.model.ln_likelihood()
        } else {
            self.model.ln_posterior()
        }
    }

    /// Density the posterior heat is applied to:
    /// `prior_heat·lnPrior + likelihood_heat·lnLikelihood`.
    pub fn ln_target_density(&mut self) -> f64 {
        let ln_prior = self.model.ln_prior();
        let ln_likelihood = self.model.ln_likelihood();
        self.heats.ln_target(ln_prior, ln_likelihood)
    }

    /// Target density tracked after the last cycle.
    pub fn ln_probability(&self) -> f64 {
        self.ln_probability
    }

    /// Per-move acceptance statistics.
    pub fn operator_summary(&self) -> Vec<MoveSummary> {
        self.moves.iter().map(Move::summary).collect()
    }

    /// Human-readable sampling strategy.
    pub fn strategy_description(&self) -> String {
        let kind = match self.rule {
            AcceptanceRule::Metropolis => "MCMC simulation",
            AcceptanceRule::Greedy => "hill-climbing search",
        };
        format!(
            "Running {kind}\nThe simulator uses {} different moves in a {} move schedule with {} moves per iteration\n",
            self.moves.len(),
            self.schedule.kind().as_str(),
            self.moves_per_iteration()
        )
    }

    /// Values of the free stochastic nodes, keyed by node name.
    pub fn values(&self) -> Vec<(String, String)> {
        self.model
            .ordered_stochastic_nodes()
            .into_iter()
            .filter(|&id| !self.model.is_clamped(id))
            .map(|id| (self.model.name(id).to_string(), self.model.value_string(id)))
            .collect()
    }

    /// Restores node values by name and commits the resulting state.
    pub fn set_values(&mut self, values: &[(String, String)]) -> Result<(), TempoError> {
        for (name, value) in values {
            let node = self.model.find(name).ok_or_else(|| {
                TempoError::Model(
                    ErrorInfo::new("unknown-node", "no node with this name in the model")
                        .with_context("name", name.clone()),
                )
            })?;
            self.model.set_value_from_str(node, value)?;
        }
        self.model.touch_all();
        self.model.ln_posterior();
        self.model.keep_all();
        self.ln_probability = self.ln_target_density();
        Ok(())
    }

    /// Model owned by the chain.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Mutable access to the model; callers must keep or restore what they touch.
    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    /// Moves of the chain.
    pub fn moves(&self) -> &[Move<M>] {
        &self.moves
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Overrides the generation counter (checkpoint restore).
    pub fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    /// Heats of the chain.
    pub fn heats(&self) -> Heats {
        self.heats
    }

    /// Sets the inverse temperature used by Metropolis coupling.
    pub fn set_posterior_heat(&mut self, heat: f64) {
        self.heats.posterior = heat;
    }

    /// Sets the power applied to the likelihood.
    pub fn set_likelihood_heat(&mut self, heat: f64) {
        self.heats.likelihood = heat;
        self.ln_probability = self.ln_target_density();
    }

    /// Sets the power applied to the prior.
    pub fn set_prior_heat(&mut self, heat: f64) {
        self.heats.prior = heat;
        self.ln_probability = self.ln_target_density();
    }

    /// Whether the chain is the cold chain whose samples are recorded.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Marks the chain as the cold chain.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Index of the chain within its sampler.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Sets the chain index.
    pub fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    /// Acceptance rule in use.
    pub fn rule(&self) -> AcceptanceRule {
        self.rule
    }

    /// Replaces the random stream of the chain.
    pub fn reseed(&mut self, rng: RngHandle) {
        self.rng = rng;
    }
}

fn unknown_node(node: NodeId) -> TempoError {
    TempoError::Model(
        ErrorInfo::new("unknown-node", "move or monitor refers to a node outside the model")
            .with_context("node", node.as_raw().to_string()),
    )
}

//! Contract consumed from the probabilistic model collaborator.
//!
//! The sampling core never sees distributions or graph structure. It only
//! addresses nodes through stable [`NodeId`] handles, asks for their log
//! probabilities, and drives the invalidate / commit / rollback protocol
//! (`touch` / `keep` / `restore`) that lets a model cache probabilities
//! between proposals.

use serde::{Deserialize, Serialize};

use crate::errors::TempoError;
use crate::rng::RngHandle;

/// Stable arena index of a node within a model's node table.
///
/// Cloning a model preserves every id, so moves and monitors cloned alongside
/// a chain keep addressing the right nodes without any remapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    /// Creates a new identifier from its raw integer representation.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw integer representation of the identifier.
    pub fn as_raw(&self) -> u32 {
        self.0
    }

    /// Returns the identifier as an index into a node table.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Cached value with a single stored version for rollback.
///
/// `invalidate` drops the current value (keeping the committed one aside),
/// `commit` accepts whatever is current, `rollback` reinstates the committed
/// version. Models hold one of these per node value and per node probability.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedCache<T> {
    current: Option<T>,
    stored: Option<T>,
    dirty: bool,
}

impl<T: Clone> VersionedCache<T> {
    /// Creates a clean cache holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            current: Some(value),
            stored: None,
            dirty: false,
        }
    }

    /// Creates a cache with nothing computed yet.
    pub fn empty() -> Self {
        Self {
            current: None,
            stored: None,
            dirty: true,
        }
    }

    /// Returns the current value, if one is cached.
    pub fn get(&self) -> Option<&T> {
        self.current.as_ref()
    }

    /// Whether the cache changed since the last commit.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Replaces the current value, stashing the committed one on first change.
    pub fn set(&mut self, value: T) {
        if !self.dirty {
            self.stored = self.current.take();
            self.dirty = true;
        }
        self.current = Some(value);
    }

    /// Fills a previously invalidated slot without touching the stored version.
    pub fn fill(&mut self, value: T) {
        self.current = Some(value);
    }

    /// Drops the current value so it must be recomputed.
    pub fn invalidate(&mut self) {
        if !self.dirty {
            self.stored = self.current.take();
            self.dirty = true;
        } else {
            self.current = None;
        }
    }

    /// Accepts the current value as the committed version.
    pub fn commit(&mut self) {
        self.stored = None;
        self.dirty = false;
    }

    /// Reinstates the committed version.
    pub fn rollback(&mut self) {
        if self.dirty {
            if self.stored.is_some() {
                self.current = self.stored.take();
            }
            self.dirty = false;
        }
    }
}

/// Probabilistic model as seen by the sampling core.
///
/// Node ids returned by [`Model::node_ids`] must be in topological order
/// (parents before children); the default [`Model::ordered_stochastic_nodes`]
/// relies on it.
pub trait Model: Clone + Send {
    /// All node handles of the model, parents before children.
    fn node_ids(&self) -> Vec<NodeId>;

    /// Returns the display name of a node.
    fn name(&self, node: NodeId) -> &str;

    /// Whether the node carries observed (clamped) data.
    fn is_clamped(&self, node: NodeId) -> bool;

    /// Whether the node is drawn from a distribution.
    fn is_stochastic(&self, node: NodeId) -> bool;

    /// Log probability of the node given its parents, recomputed when dirty.
    fn ln_probability(&mut self, node: NodeId) -> f64;

    /// Marks the node and its dependants dirty.
    fn touch(&mut self, node: NodeId);

    /// Commits the node and its dependants.
    fn keep(&mut self, node: NodeId);

    /// Rolls the node and its dependants back to the last commit.
    fn restore(&mut self, node: NodeId);

    /// Redraws the value of an unclamped stochastic node from its prior.
    fn redraw(&mut self, node: NodeId, rng: &mut RngHandle);

    /// Parses and assigns a node value from its textual representation.
    fn set_value_from_str(&mut self, node: NodeId, value: &str) -> Result<(), TempoError>;

    /// Textual representation of the node value, readable by `set_value_from_str`.
    fn value_string(&self, node: NodeId) -> String;

    /// Whether `node` is a handle into this model.
    fn contains(&self, node: NodeId) -> bool {
        self.node_ids().contains(&node)
    }

    /// Looks a node up by name.
    fn find(&self, name: &str) -> Option<NodeId> {
        self.node_ids().into_iter().find(|&id| self.name(id) == name)
    }

    /// Stochastic nodes from the sources to the sinks.
    fn ordered_stochastic_nodes(&self) -> Vec<NodeId> {
        self.node_ids()
            .into_iter()
            .filter(|&id| self.is_stochastic(id))
            .collect()
    }

    /// Touches every node.
    fn touch_all(&mut self) {
        for id in self.node_ids() {
            self.touch(id);
        }
    }

    /// Keeps every node.
    fn keep_all(&mut self) {
        for id in self.node_ids() {
            self.keep(id);
        }
    }

    /// Restores every node.
    fn restore_all(&mut self) {
        for id in self.node_ids() {
            self.restore(id);
        }
    }

    /// Sum of log probabilities over unclamped nodes.
    fn ln_prior(&mut self) -> f64 {
        let ids: Vec<NodeId> = self
            .node_ids()
            .into_iter()
            .filter(|&id| !self.is_clamped(id))
            .collect();
        ids.into_iter().map(|id| self.ln_probability(id)).sum()
    }

    /// Sum of log probabilities over clamped nodes.
    fn ln_likelihood(&mut self) -> f64 {
        let ids: Vec<NodeId> = self
            .node_ids()
            .into_iter()
            .filter(|&id| self.is_clamped(id))
            .collect();
        ids.into_iter().map(|id| self.ln_probability(id)).sum()
    }

    /// Unheated joint log probability.
    fn ln_posterior(&mut self) -> f64 {
        self.ln_prior() + self.ln_likelihood()
    }
}

/// Models whose stochastic nodes hold real scalars.
///
/// Required by the built-in proposals, which perturb a single real value.
pub trait ScalarModel: Model {
    /// Current value of a scalar node.
    fn value(&self, node: NodeId) -> f64;

    /// Assigns a scalar value and touches the node.
    fn set_value(&mut self, node: NodeId, value: f64);

    /// Gaussian full conditional `(mean, variance)` of `node` when the
    /// likelihood is raised to `likelihood_heat`, if the model has one.
    fn conditional_normal(&self, _node: NodeId, _likelihood_heat: f64) -> Option<(f64, f64)> {
        None
    }
}

/// Returns `true` when `value` is neither NaN nor infinite.
pub fn is_computable(value: f64) -> bool {
    value.is_finite()
}

#[cfg(test)]
mod tests {
    use super::VersionedCache;

    #[test]
    fn rollback_reinstates_committed_value() {
        let mut cache = VersionedCache::new(1.0);
        cache.set(2.0);
        cache.set(3.0);
        assert_eq!(cache.get(), Some(&3.0));
        cache.rollback();
        assert_eq!(cache.get(), Some(&1.0));
        assert!(!cache.is_dirty());
    }

    #[test]
    fn invalidate_then_fill_keeps_stored_version() {
        let mut cache = VersionedCache::new(-4.0);
        cache.invalidate();
        assert!(cache.get().is_none());
        cache.fill(-5.0);
        cache.invalidate();
        cache.fill(-6.0);
        cache.rollback();
        assert_eq!(cache.get(), Some(&-4.0));
    }

    #[test]
    fn commit_accepts_current() {
        let mut cache = VersionedCache::new(0.5);
        cache.set(0.7);
        cache.commit();
        cache.rollback();
        assert_eq!(cache.get(), Some(&0.7));
    }
}

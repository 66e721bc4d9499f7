//! Random tree construction and coefficient initialization.
//!
//! # Creators
//!
//! - [`GrowTreeCreator`]: recursive grow bounded by depth and length
//! - [`BalancedTreeCreator`]: breadth-first construction towards a sampled
//!   target length (Burlacu et al., 2020)
//!
//! # References
//!
//! - Koza (1992), *Genetic Programming*
//! - Burlacu, Kronberger, Kommenda, Affenzeller (2020), "Parsimony measures
//!   in multi-objective genetic programming for symbolic regression"

use super::types::{CoefficientInitializer, Creator};
use crate::dataset::Variable;
use crate::tree::{Node, NodeKind, PrimitiveSet, Tree};
use rand::{Rng, RngCore};
use rand_distr::{Distribution, StandardNormal};
use std::collections::VecDeque;

/// Samples a leaf, wiring variables to a random input.
///
/// Falls back to a constant when no leaf kind is enabled or there are no
/// inputs.
fn sample_leaf(rng: &mut dyn RngCore, pset: &PrimitiveSet, inputs: &[Variable]) -> Node {
    let mut node = pset
        .sample_random_symbol(rng, 0, 0)
        .unwrap_or_else(|| Node::new(NodeKind::Constant));
    if node.kind == NodeKind::Variable {
        if inputs.is_empty() {
            return Node::new(NodeKind::Constant);
        }
        node.hash = inputs[rng.random_range(0..inputs.len())].hash;
    }
    node
}

/// Samples a function with arity in `[min_arity, max_arity]`, or a leaf when
/// no enabled function fits.
fn sample_node(
    rng: &mut dyn RngCore,
    pset: &PrimitiveSet,
    inputs: &[Variable],
    min_arity: usize,
    max_arity: usize,
) -> Node {
    if max_arity == 0 || min_arity > max_arity {
        return sample_leaf(rng, pset, inputs);
    }
    match pset.sample_random_symbol(rng, min_arity.max(1), max_arity) {
        Some(node) => node,
        None => sample_leaf(rng, pset, inputs),
    }
}

/// Grow initialization (Koza, 1992) with a hard length bound.
///
/// Every position picks any enabled kind whose arity still fits in the
/// remaining length; positions at `max_depth` become leaves.
///
/// # Example
///
/// ```
/// use u_symreg::dataset::{variable_hash, Variable};
/// use u_symreg::gp::{Creator, GrowTreeCreator};
/// use u_symreg::random::create_rng;
/// use u_symreg::tree::PrimitiveSet;
///
/// let inputs = vec![Variable { name: "x".into(), hash: variable_hash("x"), index: 0 }];
/// let creator = GrowTreeCreator { max_depth: 5, max_length: 20 };
/// let tree = creator.create(&mut create_rng(7), &PrimitiveSet::arithmetic(), &inputs);
/// assert!(tree.len() <= 20 && tree.depth() <= 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GrowTreeCreator {
    /// Maximum tree depth (a single leaf has depth 1).
    pub max_depth: usize,
    /// Maximum number of nodes.
    pub max_length: usize,
}

impl Default for GrowTreeCreator {
    fn default() -> Self {
        Self {
            max_depth: 10,
            max_length: 50,
        }
    }
}

impl GrowTreeCreator {
    /// Pushes a subtree in prefix order. `pending` counts the open slots
    /// still to be filled outside this subtree.
    #[allow(clippy::too_many_arguments)]
    fn grow(
        &self,
        rng: &mut dyn RngCore,
        pset: &PrimitiveSet,
        inputs: &[Variable],
        depth_left: usize,
        pending: usize,
        min_arity: usize,
        nodes: &mut Vec<Node>,
    ) {
        let room = self.max_length.saturating_sub(nodes.len() + 1 + pending);
        let max_arity = if depth_left <= 1 { 0 } else { room };
        let node = if min_arity == 0 && max_arity > 0 {
            // any kind, leaves included
            match pset.sample_random_symbol(rng, 0, max_arity) {
                Some(n) if !n.kind.is_leaf() => n,
                _ => sample_leaf(rng, pset, inputs),
            }
        } else {
            sample_node(rng, pset, inputs, min_arity, max_arity)
        };
        let arity = node.arity;
        nodes.push(node);
        for k in 0..arity {
            self.grow(rng, pset, inputs, depth_left - 1, pending + arity - k - 1, 0, nodes);
        }
    }
}

impl Creator for GrowTreeCreator {
    fn create(&self, rng: &mut dyn RngCore, pset: &PrimitiveSet, inputs: &[Variable]) -> Tree {
        let mut nodes = Vec::with_capacity(self.max_length);
        let min_root = pset.function_arity_limits().map_or(0, |(lo, _)| lo);
        self.grow(rng, pset, inputs, self.max_depth.max(1), 0, min_root, &mut nodes);
        // prefix (parent, child 0, child 1, ...) reversed is postorder with
        // child 0 right before its parent
        nodes.reverse();
        Tree::new(nodes)
    }
}

/// Balanced tree creator (BTC).
///
/// Samples a target length uniformly from `[min_length, max_length]` and
/// expands open positions breadth-first, preferring functions while the
/// target leaves room. `irregularity_bias` is the probability of closing a
/// position with a leaf early, which produces less regular shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BalancedTreeCreator {
    /// Smallest target length.
    pub min_length: usize,
    /// Largest target length.
    pub max_length: usize,
    /// Maximum tree depth.
    pub max_depth: usize,
    /// Probability of placing a leaf where a function would fit.
    pub irregularity_bias: f64,
}

impl Default for BalancedTreeCreator {
    fn default() -> Self {
        Self {
            min_length: 1,
            max_length: 50,
            max_depth: 10,
            irregularity_bias: 0.0,
        }
    }
}

impl Creator for BalancedTreeCreator {
    fn create(&self, rng: &mut dyn RngCore, pset: &PrimitiveSet, inputs: &[Variable]) -> Tree {
        let lo = self.min_length.max(1);
        let hi = self.max_length.max(lo);
        let target = rng.random_range(lo..=hi);
        let max_depth = self.max_depth.max(1);

        // arena of (node, children in position order)
        let mut arena: Vec<(Node, Vec<usize>)> = Vec::with_capacity(target);
        let mut open: VecDeque<(usize, usize)> = VecDeque::new();

        let root = if max_depth > 1 {
            sample_node(rng, pset, inputs, 1, target - 1)
        } else {
            sample_leaf(rng, pset, inputs)
        };
        for _ in 0..root.arity {
            open.push_back((0, 2));
        }
        arena.push((root, Vec::new()));

        while let Some((parent, depth)) = open.pop_front() {
            // every open position will hold at least one node
            let reserved = arena.len() + 1 + open.len();
            let room = target.saturating_sub(reserved);
            let bias = self.irregularity_bias.clamp(0.0, 1.0);
            let node = if depth >= max_depth || room == 0 || rng.random_bool(bias) {
                sample_leaf(rng, pset, inputs)
            } else {
                sample_node(rng, pset, inputs, 1, room)
            };
            let index = arena.len();
            for _ in 0..node.arity {
                open.push_back((index, depth + 1));
            }
            arena.push((node, Vec::new()));
            arena[parent].1.push(index);
        }

        let mut nodes = Vec::with_capacity(arena.len());
        emit_postorder(&arena, 0, &mut nodes);
        Tree::new(nodes)
    }
}

/// Emits the last child first so that child 0 ends up right before its
/// parent.
fn emit_postorder(arena: &[(Node, Vec<usize>)], i: usize, nodes: &mut Vec<Node>) {
    for &c in arena[i].1.iter().rev() {
        emit_postorder(arena, c, nodes);
    }
    nodes.push(arena[i].0);
}

/// Draws coefficients from `N(mean, std_dev²)`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NormalCoefficientInitializer {
    /// Mean of the distribution.
    pub mean: f64,
    /// Standard deviation of the distribution.
    pub std_dev: f64,
}

impl Default for NormalCoefficientInitializer {
    fn default() -> Self {
        Self {
            mean: 0.0,
            std_dev: 1.0,
        }
    }
}

impl CoefficientInitializer for NormalCoefficientInitializer {
    fn initialize(&self, rng: &mut dyn RngCore, tree: &mut Tree) {
        for node in tree.coefficient_nodes_mut() {
            let z: f64 = StandardNormal.sample(rng);
            node.value = self.mean + self.std_dev * z;
        }
    }
}

/// Draws coefficients uniformly from `[low, high)`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UniformCoefficientInitializer {
    /// Lower bound.
    pub low: f64,
    /// Upper bound (exclusive).
    pub high: f64,
}

impl Default for UniformCoefficientInitializer {
    fn default() -> Self {
        Self {
            low: -1.0,
            high: 1.0,
        }
    }
}

impl CoefficientInitializer for UniformCoefficientInitializer {
    fn initialize(&self, rng: &mut dyn RngCore, tree: &mut Tree) {
        for node in tree.coefficient_nodes_mut() {
            node.value = if self.low < self.high {
                rng.random_range(self.low..self.high)
            } else {
                self.low
            };
        }
    }
}

//! Variation operators on expression trees.
//!
//! All operators return a new, structurally valid tree and never panic on a
//! tree that has no suitable node: they return the input unchanged instead.
//!
//! # Operators
//!
//! | Operator | Effect |
//! |----------|--------|
//! | [`SubtreeCrossover`] | swap a female subtree for a male subtree |
//! | [`OnePointMutation`] | add Gaussian noise to one coefficient |
//! | [`ChangeVariableMutation`] | rewire one variable leaf |
//! | [`ChangeFunctionMutation`] | swap one function for another of equal arity |
//! | [`RemoveSubtreeMutation`] | drop a child subtree, or collapse it to a leaf |
//! | [`ReplaceSubtreeMutation`] | regrow one subtree within the size limits |
//! | [`InsertSubtreeMutation`] | wrap one subtree in a new function with fresh siblings |
//! | [`MultiMutation`] | weighted dispatch over the above |
//!
//! # References
//!
//! - Koza (1992), *Genetic Programming*
//! - Poli, Langdon & McPhee (2008), *A Field Guide to Genetic Programming*

use super::creator::{GrowTreeCreator, NormalCoefficientInitializer};
use super::types::{CoefficientInitializer, Creator, Crossover, Mutation};
use crate::dataset::Variable;
use crate::tree::{Node, NodeKind, PrimitiveSet, Tree};
use rand::{Rng, RngCore};
use rand_distr::{Distribution, StandardNormal};

/// Picks a random element of `candidates`.
fn pick(rng: &mut dyn RngCore, candidates: &[usize]) -> Option<usize> {
    if candidates.is_empty() {
        None
    } else {
        Some(candidates[rng.random_range(0..candidates.len())])
    }
}

/// Picks a function node with probability `internal_probability` (when one
/// exists), a leaf otherwise.
fn pick_point(
    rng: &mut dyn RngCore,
    tree: &Tree,
    candidates: impl Iterator<Item = usize>,
    internal_probability: f64,
) -> Option<usize> {
    let (internal, leaves): (Vec<usize>, Vec<usize>) =
        candidates.partition(|&i| !tree.nodes()[i].is_leaf());
    let prefer_internal = rng.random_bool(internal_probability.clamp(0.0, 1.0));
    match (prefer_internal, internal.is_empty(), leaves.is_empty()) {
        (true, false, _) | (false, false, true) => pick(rng, &internal),
        _ => pick(rng, &leaves),
    }
}

/// Subtree crossover.
///
/// A cut point is chosen in the female parent; the male parent donates a
/// subtree that keeps the child within `max_depth` and `max_length`. When
/// no donor fits, the child is a copy of the female.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SubtreeCrossover {
    /// Probability of cutting at a function node rather than a leaf.
    pub internal_probability: f64,
    /// Maximum depth of the child.
    pub max_depth: usize,
    /// Maximum length of the child.
    pub max_length: usize,
}

impl Default for SubtreeCrossover {
    fn default() -> Self {
        Self {
            internal_probability: 0.9,
            max_depth: 10,
            max_length: 50,
        }
    }
}

impl Crossover for SubtreeCrossover {
    fn cross(&self, rng: &mut dyn RngCore, female: &Tree, male: &Tree) -> Tree {
        if female.is_empty() || male.is_empty() {
            return female.clone();
        }
        let levels = female.levels();
        let p = self.internal_probability;

        let Some(cut) = pick_point(rng, female, 0..female.len(), p) else {
            return female.clone();
        };
        let kept = female.len() - female.nodes()[cut].length;
        let max_length = self.max_length.saturating_sub(kept);
        let max_depth = (self.max_depth + 1).saturating_sub(levels[cut]);

        let donors = (0..male.len()).filter(|&j| {
            let n = &male.nodes()[j];
            n.length <= max_length && n.depth <= max_depth
        });
        match pick_point(rng, male, donors, p) {
            Some(j) => female.replace_subtree(cut, &male.nodes()[male.subtree(j)]),
            None => female.clone(),
        }
    }
}

/// Adds `N(mean, std_dev²)` noise to one randomly chosen coefficient.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OnePointMutation {
    /// Mean of the perturbation.
    pub mean: f64,
    /// Standard deviation of the perturbation.
    pub std_dev: f64,
}

impl Default for OnePointMutation {
    fn default() -> Self {
        Self {
            mean: 0.0,
            std_dev: 1.0,
        }
    }
}

impl Mutation for OnePointMutation {
    fn mutate(&self, rng: &mut dyn RngCore, tree: Tree) -> Tree {
        let candidates: Vec<usize> = (0..tree.len())
            .filter(|&i| tree.nodes()[i].is_coefficient())
            .collect();
        let Some(i) = pick(rng, &candidates) else {
            return tree;
        };
        let z: f64 = StandardNormal.sample(rng);
        let mut nodes = tree.into_nodes();
        nodes[i].value += self.mean + self.std_dev * z;
        Tree::new(nodes)
    }
}

/// Points one variable leaf at a different input.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChangeVariableMutation {
    /// Inputs to choose from.
    pub inputs: Vec<Variable>,
}

impl ChangeVariableMutation {
    /// Rewires variables to one of `inputs`.
    pub fn new(inputs: &[Variable]) -> Self {
        Self {
            inputs: inputs.to_vec(),
        }
    }
}

impl Mutation for ChangeVariableMutation {
    fn mutate(&self, rng: &mut dyn RngCore, tree: Tree) -> Tree {
        let candidates: Vec<usize> = (0..tree.len())
            .filter(|&i| tree.nodes()[i].kind == NodeKind::Variable)
            .collect();
        let Some(i) = pick(rng, &candidates) else {
            return tree;
        };
        if self.inputs.is_empty() {
            return tree;
        }
        let mut nodes = tree.into_nodes();
        nodes[i].hash = self.inputs[rng.random_range(0..self.inputs.len())].hash;
        Tree::new(nodes)
    }
}

/// Replaces one function by another enabled function of the same arity.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChangeFunctionMutation {
    /// Functions to choose from.
    pub primitive_set: PrimitiveSet,
}

impl ChangeFunctionMutation {
    /// Draws replacement functions from `primitive_set`.
    pub fn new(primitive_set: PrimitiveSet) -> Self {
        Self { primitive_set }
    }
}

impl Mutation for ChangeFunctionMutation {
    fn mutate(&self, rng: &mut dyn RngCore, tree: Tree) -> Tree {
        let candidates: Vec<usize> = (0..tree.len())
            .filter(|&i| !tree.nodes()[i].is_leaf())
            .collect();
        let Some(i) = pick(rng, &candidates) else {
            return tree;
        };
        let arity = tree.nodes()[i].arity;
        let Some(symbol) = self.primitive_set.sample_random_symbol(rng, arity, arity) else {
            return tree;
        };
        let mut nodes = tree.into_nodes();
        nodes[i].kind = symbol.kind;
        nodes[i].hash = symbol.hash;
        Tree::new(nodes)
    }
}

/// Removes one non-root subtree.
///
/// When the parent can lose a child without going below its minimum arity,
/// the child is dropped; otherwise it collapses to a random leaf.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RemoveSubtreeMutation {
    /// Arity limits and leaf kinds.
    pub primitive_set: PrimitiveSet,
    /// Inputs for replacement variable leaves.
    pub inputs: Vec<Variable>,
}

impl RemoveSubtreeMutation {
    /// Uses the arity limits of `primitive_set`; collapsed subtrees become
    /// leaves over `inputs`.
    pub fn new(primitive_set: PrimitiveSet, inputs: &[Variable]) -> Self {
        Self {
            primitive_set,
            inputs: inputs.to_vec(),
        }
    }

    fn leaf(&self, rng: &mut dyn RngCore) -> Node {
        let mut node = self
            .primitive_set
            .sample_random_symbol(rng, 0, 0)
            .unwrap_or_else(|| Node::new(NodeKind::Constant));
        if node.kind == NodeKind::Variable {
            if self.inputs.is_empty() {
                return Node::new(NodeKind::Constant);
            }
            node.hash = self.inputs[rng.random_range(0..self.inputs.len())].hash;
        }
        node
    }
}

impl Mutation for RemoveSubtreeMutation {
    fn mutate(&self, rng: &mut dyn RngCore, tree: Tree) -> Tree {
        if tree.len() < 2 {
            return tree;
        }
        let parents = tree.parents();
        let i = rng.random_range(0..tree.len() - 1);
        let Some(p) = parents[i] else {
            return tree;
        };

        let parent = tree.nodes()[p];
        let min_arity = self
            .primitive_set
            .arity_limits(parent.kind)
            .0
            .max(parent.kind.arity_range().0);
        if parent.arity > min_arity {
            let range = tree.subtree(i);
            let mut nodes = tree.into_nodes();
            nodes[p].arity -= 1;
            nodes.drain(range);
            Tree::new(nodes)
        } else {
            let leaf = self.leaf(rng);
            tree.replace_subtree(i, &[leaf])
        }
    }
}

/// Regrows one subtree with [`GrowTreeCreator`], bounded so the result stays
/// within `max_depth` and `max_length`. Fresh coefficients are drawn from
/// `coefficients`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReplaceSubtreeMutation {
    /// Kinds available to the regrown subtree.
    pub primitive_set: PrimitiveSet,
    /// Inputs for variable leaves.
    pub inputs: Vec<Variable>,
    /// Maximum depth of the mutated tree.
    pub max_depth: usize,
    /// Maximum length of the mutated tree.
    pub max_length: usize,
    /// Initializer for the new coefficients.
    pub coefficients: NormalCoefficientInitializer,
}

impl ReplaceSubtreeMutation {
    /// Regrows within `max_depth` and `max_length` with N(0, 1) coefficients.
    pub fn new(
        primitive_set: PrimitiveSet,
        inputs: &[Variable],
        max_depth: usize,
        max_length: usize,
    ) -> Self {
        Self {
            primitive_set,
            inputs: inputs.to_vec(),
            max_depth,
            max_length,
            coefficients: NormalCoefficientInitializer::default(),
        }
    }
}

impl Mutation for ReplaceSubtreeMutation {
    fn mutate(&self, rng: &mut dyn RngCore, tree: Tree) -> Tree {
        if tree.is_empty() {
            return tree;
        }
        let levels = tree.levels();
        let i = rng.random_range(0..tree.len());
        let kept = tree.len() - tree.nodes()[i].length;
        let max_length = self.max_length.saturating_sub(kept);
        let max_depth = (self.max_depth + 1).saturating_sub(levels[i]);
        if max_length == 0 || max_depth == 0 {
            return tree;
        }

        let creator = GrowTreeCreator {
            max_depth,
            max_length,
        };
        let mut branch = creator.create(rng, &self.primitive_set, &self.inputs);
        self.coefficients.initialize(rng, &mut branch);
        tree.replace_subtree(i, branch.nodes())
    }
}

/// Inserts a new function above one subtree.
///
/// A node whose subtree can move one level down without exceeding
/// `max_depth` is chosen at random. It becomes one child (at a random
/// position) of a function sampled from `primitive_set`; the remaining
/// children are grown with [`GrowTreeCreator`] inside the length left by
/// `max_length`. Trees already at `max_length`, or without a node that fits,
/// are returned unchanged.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InsertSubtreeMutation {
    /// Kinds available to the inserted function and its new children.
    pub primitive_set: PrimitiveSet,
    /// Inputs for variable leaves.
    pub inputs: Vec<Variable>,
    /// Maximum depth of the mutated tree.
    pub max_depth: usize,
    /// Maximum length of the mutated tree.
    pub max_length: usize,
    /// Initializer for the new coefficients.
    pub coefficients: NormalCoefficientInitializer,
}

impl InsertSubtreeMutation {
    /// Inserts within `max_depth` and `max_length` with N(0, 1) coefficients.
    pub fn new(
        primitive_set: PrimitiveSet,
        inputs: &[Variable],
        max_depth: usize,
        max_length: usize,
    ) -> Self {
        Self {
            primitive_set,
            inputs: inputs.to_vec(),
            max_depth,
            max_length,
            coefficients: NormalCoefficientInitializer::default(),
        }
    }
}

impl Mutation for InsertSubtreeMutation {
    fn mutate(&self, rng: &mut dyn RngCore, tree: Tree) -> Tree {
        let room = self.max_length.saturating_sub(tree.len());
        if tree.is_empty() || room == 0 {
            return tree;
        }
        let levels = tree.levels();
        let candidates: Vec<usize> = (0..tree.len())
            .filter(|&i| levels[i] + tree.nodes()[i].depth <= self.max_depth)
            .collect();
        let Some(i) = pick(rng, &candidates) else {
            return tree;
        };
        let Some(function) = self.primitive_set.sample_random_symbol(rng, 1, room) else {
            return tree;
        };

        let depth = self.max_depth - levels[i];
        let slot = rng.random_range(0..function.arity);
        // nodes left for the new children, at least one per child still to grow
        let mut budget = room - 1;
        let mut branch = Vec::with_capacity(tree.nodes()[i].length + room);
        for k in 0..function.arity {
            if k == slot {
                branch.extend_from_slice(&tree.nodes()[tree.subtree(i)]);
                continue;
            }
            let later = function.arity - 1 - k - usize::from(k < slot);
            let creator = GrowTreeCreator {
                max_depth: depth,
                max_length: budget - later,
            };
            let mut child = creator.create(rng, &self.primitive_set, &self.inputs);
            self.coefficients.initialize(rng, &mut child);
            budget -= child.len();
            branch.extend(child.into_nodes());
        }
        branch.push(function);
        tree.replace_subtree(i, &branch)
    }
}

/// Weighted dispatch over a table of mutations.
///
/// ```
/// use u_symreg::gp::{Mutation, MultiMutation, OnePointMutation};
/// use u_symreg::random::create_rng;
/// use u_symreg::tree::{Node, Tree};
///
/// let mutation = MultiMutation::new().add(OnePointMutation::default(), 1.0);
/// let tree = mutation.mutate(&mut create_rng(1), Tree::new(vec![Node::constant(0.0)]));
/// assert_ne!(tree.coefficients()[0], 0.0);
/// ```
#[derive(Default)]
pub struct MultiMutation {
    table: Vec<(Box<dyn Mutation>, f64)>,
}

impl std::fmt::Debug for MultiMutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiMutation")
            .field("weights", &self.table.iter().map(|e| e.1).collect::<Vec<_>>())
            .finish()
    }
}

impl MultiMutation {
    /// An empty table; mutating with it returns the tree unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `mutation` with selection weight `weight` (negative weights count
    /// as zero).
    pub fn add(mut self, mutation: impl Mutation + 'static, weight: f64) -> Self {
        self.table.push((Box::new(mutation), weight.max(0.0)));
        self
    }

    /// Number of registered mutations.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether no mutation is registered.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Mutation for MultiMutation {
    fn mutate(&self, rng: &mut dyn RngCore, tree: Tree) -> Tree {
        let total: f64 = self.table.iter().map(|e| e.1).sum();
        if !(total > 0.0 && total.is_finite()) {
            return tree;
        }
        let threshold = rng.random_range(0.0..total);
        let mut cumulative = 0.0;
        for (mutation, weight) in &self.table {
            cumulative += weight;
            if cumulative > threshold {
                return mutation.mutate(rng, tree);
            }
        }
        match self.table.iter().rev().find(|e| e.1 > 0.0) {
            Some((mutation, _)) => mutation.mutate(rng, tree),
            None => tree,
        }
    }
}

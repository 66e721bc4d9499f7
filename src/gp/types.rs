//! Core types and collaborator contracts of the GP loop.
//!
//! The runner is generic over nothing but these traits: every strategy
//! (tree construction, evaluation, selection, variation, replacement) is a
//! trait object handed in by the caller. All contracts take the RNG as
//! `&mut dyn RngCore` so a worker can drive any collaborator from its own
//! per-slot generator.

use crate::dataset::Variable;
use crate::error::Result;
use crate::tree::{PrimitiveSet, Tree};
use rand::RngCore;
use std::cmp::Ordering;

/// Fitness assigned to individuals whose evaluation is not finite.
///
/// All objectives are minimized, so the worst value is the largest finite
/// `f64`.
pub const WORST_FITNESS: f64 = f64::MAX;

/// Replaces non-finite objective values by [`WORST_FITNESS`].
pub fn sanitize(fitness: &mut [f64]) {
    for f in fitness.iter_mut() {
        if !f.is_finite() {
            *f = WORST_FITNESS;
        }
    }
}

/// A candidate model: an expression tree with its objective values.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Individual {
    /// The expression tree.
    pub genotype: Tree,
    /// Objective values, lower is better. Slot 0 is the primary error.
    pub fitness: Vec<f64>,
    /// Non-domination rank, set by multi-objective selectors.
    pub rank: usize,
    /// Crowding distance, set by multi-objective selectors.
    pub distance: f64,
}

impl Individual {
    /// An unevaluated individual (every objective at [`WORST_FITNESS`]).
    pub fn new(genotype: Tree, objectives: usize) -> Self {
        Self {
            genotype,
            fitness: vec![WORST_FITNESS; objectives.max(1)],
            rank: 0,
            distance: 0.0,
        }
    }

    /// The primary objective.
    pub fn primary(&self) -> f64 {
        self.fitness[0]
    }

    /// Compares the primary objective of two individuals.
    pub fn cmp_primary(&self, other: &Self) -> Ordering {
        self.fitness[0].total_cmp(&other.fitness[0])
    }

    /// Crowded comparison: lower rank first, then larger crowding distance.
    pub fn cmp_crowded(&self, other: &Self) -> Ordering {
        self.rank
            .cmp(&other.rank)
            .then_with(|| other.distance.total_cmp(&self.distance))
    }
}

/// Builds random trees.
pub trait Creator: Send + Sync {
    /// Creates a tree using the enabled kinds and arity limits of `pset`
    /// and, for variable leaves, the given `inputs`.
    fn create(&self, rng: &mut dyn RngCore, pset: &PrimitiveSet, inputs: &[Variable]) -> Tree;
}

/// Assigns initial values to the coefficients of a freshly created tree.
pub trait CoefficientInitializer: Send + Sync {
    /// Overwrites every tunable coefficient of `tree`.
    fn initialize(&self, rng: &mut dyn RngCore, tree: &mut Tree);
}

/// Evaluation counters shared by all workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationCounters {
    /// Fitness evaluations.
    pub fitness: usize,
    /// Local-optimization iterations.
    pub local: usize,
    /// Jacobian evaluations.
    pub jacobian: usize,
}

/// Computes the objective values of an individual.
///
/// Implementations must be safe to call concurrently on distinct
/// individuals; counters are typically atomics.
pub trait Evaluator: Send + Sync {
    /// Number of objective values produced.
    fn objectives(&self) -> usize {
        1
    }

    /// Evaluates `individual`, possibly tuning its coefficients in place.
    ///
    /// The returned vector has [`Evaluator::objectives`] entries and may
    /// contain non-finite values; callers sanitize it.
    ///
    /// # Errors
    /// Configuration errors from the interpreter or optimizer.
    fn evaluate(&self, rng: &mut dyn RngCore, individual: &mut Individual) -> Result<Vec<f64>>;

    /// Counters accumulated since construction.
    fn counters(&self) -> EvaluationCounters;
}

/// Picks a parent index from the population.
pub trait Selector: Send + Sync {
    /// Called once per generation before any selection. Multi-objective
    /// selectors assign `rank` and `distance` here.
    fn prepare(&mut self, _population: &mut [Individual]) {}

    /// Returns the index of the selected individual.
    ///
    /// # Panics
    /// Implementations panic on an empty population.
    fn select(&self, rng: &mut dyn RngCore, population: &[Individual]) -> usize;
}

/// Recombines two parent trees into one child tree.
pub trait Crossover: Send + Sync {
    /// Builds a child from `female` with material from `male`.
    fn cross(&self, rng: &mut dyn RngCore, female: &Tree, male: &Tree) -> Tree;
}

/// Perturbs a tree.
pub trait Mutation: Send + Sync {
    /// Returns the mutated tree.
    fn mutate(&self, rng: &mut dyn RngCore, tree: Tree) -> Tree;
}

/// Produces one evaluated offspring per call.
pub trait OffspringGenerator: Send + Sync {
    /// Called once per generation, before parallel generation starts.
    fn prepare(&mut self, parents: &mut [Individual]);

    /// Tries to produce an evaluated child from `parents`.
    ///
    /// `Ok(None)` means the attempt was rejected and the caller may retry.
    ///
    /// # Errors
    /// Evaluator errors.
    fn generate(
        &self,
        rng: &mut dyn RngCore,
        evaluator: &dyn Evaluator,
        parents: &[Individual],
        crossover_probability: f64,
        mutation_probability: f64,
    ) -> Result<Option<Individual>>;

    /// Whether the generator wants the run to stop.
    fn terminate(&self) -> bool {
        false
    }
}

/// Merges the offspring pool into the parent population.
pub trait Reinserter: Send + Sync {
    /// Updates `parents` in place; both vectors keep their lengths.
    fn reinsert(
        &self,
        rng: &mut dyn RngCore,
        parents: &mut Vec<Individual>,
        offspring: &mut Vec<Individual>,
    );
}

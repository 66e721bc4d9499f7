//! Offspring generation: selection, variation and evaluation of one child.
//!
//! # Generators
//!
//! - [`BasicOffspringGenerator`]: every produced child is accepted
//! - [`OffspringSelectionGenerator`]: only children that improve on their
//!   female parent are accepted; the generator asks the run to stop once the
//!   selection pressure (attempts per population slot) exceeds a limit
//! - [`BroodOffspringGenerator`]: one pair of parents produces a brood of
//!   children and only the best one is returned
//!
//! # References
//!
//! - Affenzeller & Wagner (2005), "Offspring selection: A new self-adaptive
//!   selection scheme for genetic algorithms"
//! - Tackett (1994), "Recombination, Selection, and the Genetic Construction
//!   of Computer Programs" (brood recombination)

use super::types::{
    sanitize, Crossover, Evaluator, Individual, Mutation, OffspringGenerator, Selector,
};
use crate::error::Result;
use rand::{Rng, RngCore};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Selects parents, applies crossover and/or mutation, evaluates the child.
///
/// With probability `crossover_probability` the child is the crossover of a
/// female and a male parent; with probability `mutation_probability` it is
/// then mutated (or the female is mutated when no crossover happened). When
/// neither operator fires the child is a copy of the female parent and keeps
/// its fitness without a new evaluation.
pub struct BasicOffspringGenerator {
    female: Box<dyn Selector>,
    male: Box<dyn Selector>,
    crossover: Box<dyn Crossover>,
    mutation: Box<dyn Mutation>,
}

impl fmt::Debug for BasicOffspringGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicOffspringGenerator").finish_non_exhaustive()
    }
}

impl BasicOffspringGenerator {
    /// Builds a generator from its selectors and variation operators.
    pub fn new(
        female: impl Selector + 'static,
        male: impl Selector + 'static,
        crossover: impl Crossover + 'static,
        mutation: impl Mutation + 'static,
    ) -> Self {
        Self {
            female: Box::new(female),
            male: Box::new(male),
            crossover: Box::new(crossover),
            mutation: Box::new(mutation),
        }
    }

    /// Produces an evaluated child and the index of its female parent.
    fn breed(
        &self,
        rng: &mut dyn RngCore,
        evaluator: &dyn Evaluator,
        parents: &[Individual],
        crossover_probability: f64,
        mutation_probability: f64,
    ) -> Result<(Individual, usize)> {
        let first = self.female.select(rng, parents);
        let child = self.vary(
            rng,
            evaluator,
            parents,
            first,
            None,
            crossover_probability,
            mutation_probability,
        )?;
        Ok((child, first))
    }

    /// Produces an evaluated child of `parents[first]`. The male parent is
    /// `second`, or selected on demand when crossover fires.
    #[allow(clippy::too_many_arguments)]
    fn vary(
        &self,
        rng: &mut dyn RngCore,
        evaluator: &dyn Evaluator,
        parents: &[Individual],
        first: usize,
        second: Option<usize>,
        crossover_probability: f64,
        mutation_probability: f64,
    ) -> Result<Individual> {
        let do_crossover = rng.random_bool(crossover_probability.clamp(0.0, 1.0));
        let do_mutation = rng.random_bool(mutation_probability.clamp(0.0, 1.0));
        if !do_crossover && !do_mutation {
            return Ok(parents[first].clone());
        }

        let mut genotype = if do_crossover {
            let second = match second {
                Some(j) => j,
                None => self.male.select(rng, parents),
            };
            self.crossover
                .cross(rng, &parents[first].genotype, &parents[second].genotype)
        } else {
            parents[first].genotype.clone()
        };
        if do_mutation {
            genotype = self.mutation.mutate(rng, genotype);
        }

        let mut child = Individual::new(genotype, parents[first].fitness.len());
        let mut fitness = evaluator.evaluate(rng, &mut child)?;
        sanitize(&mut fitness);
        child.fitness = fitness;
        Ok(child)
    }
}

impl OffspringGenerator for BasicOffspringGenerator {
    fn prepare(&mut self, parents: &mut [Individual]) {
        self.female.prepare(parents);
        self.male.prepare(parents);
    }

    fn generate(
        &self,
        rng: &mut dyn RngCore,
        evaluator: &dyn Evaluator,
        parents: &[Individual],
        crossover_probability: f64,
        mutation_probability: f64,
    ) -> Result<Option<Individual>> {
        let (child, _) = self.breed(
            rng,
            evaluator,
            parents,
            crossover_probability,
            mutation_probability,
        )?;
        Ok(Some(child))
    }
}

/// Offspring selection (OS-GA).
///
/// Wraps a [`BasicOffspringGenerator`] and rejects every child whose primary
/// fitness is not strictly lower than its female parent's. Each call counts
/// as one attempt; [`OffspringGenerator::terminate`] turns true once
/// `attempts / population_size` exceeds `max_selection_pressure`.
#[derive(Debug)]
pub struct OffspringSelectionGenerator {
    inner: BasicOffspringGenerator,
    max_selection_pressure: f64,
    population_size: usize,
    attempts: AtomicUsize,
}

impl OffspringSelectionGenerator {
    /// Wraps `inner` with the default pressure limit of 100.
    pub fn new(inner: BasicOffspringGenerator) -> Self {
        Self {
            inner,
            max_selection_pressure: 100.0,
            population_size: 0,
            attempts: AtomicUsize::new(0),
        }
    }

    /// Sets the selection pressure beyond which the run is asked to stop.
    pub fn with_max_selection_pressure(mut self, pressure: f64) -> Self {
        self.max_selection_pressure = pressure.max(0.0);
        self
    }

    /// Attempts per population slot in the current generation.
    pub fn selection_pressure(&self) -> f64 {
        if self.population_size == 0 {
            return 0.0;
        }
        self.attempts.load(Ordering::Relaxed) as f64 / self.population_size as f64
    }
}

impl OffspringGenerator for OffspringSelectionGenerator {
    fn prepare(&mut self, parents: &mut [Individual]) {
        self.inner.prepare(parents);
        self.population_size = parents.len();
        self.attempts.store(0, Ordering::Relaxed);
    }

    fn generate(
        &self,
        rng: &mut dyn RngCore,
        evaluator: &dyn Evaluator,
        parents: &[Individual],
        crossover_probability: f64,
        mutation_probability: f64,
    ) -> Result<Option<Individual>> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        let (child, female) = self.inner.breed(
            rng,
            evaluator,
            parents,
            crossover_probability,
            mutation_probability,
        )?;
        if child.primary() < parents[female].primary() {
            Ok(Some(child))
        } else {
            Ok(None)
        }
    }

    fn terminate(&self) -> bool {
        self.selection_pressure() > self.max_selection_pressure
    }
}

/// Brood recombination.
///
/// Selects one female and one male parent, then breeds `brood_size` children
/// from that pair with the operators of the wrapped
/// [`BasicOffspringGenerator`] and returns the child with the lowest primary
/// fitness (the first one on ties). Every evaluated brood member counts
/// towards the evaluation budget.
#[derive(Debug)]
pub struct BroodOffspringGenerator {
    inner: BasicOffspringGenerator,
    brood_size: usize,
}

impl BroodOffspringGenerator {
    /// Wraps `inner` with a brood of 10.
    pub fn new(inner: BasicOffspringGenerator) -> Self {
        Self {
            inner,
            brood_size: 10,
        }
    }

    /// Sets the number of children bred per call (at least 1).
    pub fn with_brood_size(mut self, size: usize) -> Self {
        self.brood_size = size.max(1);
        self
    }

    /// Children bred per call.
    pub fn brood_size(&self) -> usize {
        self.brood_size
    }
}

impl OffspringGenerator for BroodOffspringGenerator {
    fn prepare(&mut self, parents: &mut [Individual]) {
        self.inner.prepare(parents);
    }

    fn generate(
        &self,
        rng: &mut dyn RngCore,
        evaluator: &dyn Evaluator,
        parents: &[Individual],
        crossover_probability: f64,
        mutation_probability: f64,
    ) -> Result<Option<Individual>> {
        let first = self.inner.female.select(rng, parents);
        let second = self.inner.male.select(rng, parents);

        let mut best: Option<Individual> = None;
        for _ in 0..self.brood_size {
            let child = self.inner.vary(
                rng,
                evaluator,
                parents,
                first,
                Some(second),
                crossover_probability,
                mutation_probability,
            )?;
            if best.as_ref().map_or(true, |b| child.primary() < b.primary()) {
                best = Some(child);
            }
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gp::selection::TournamentSelector;
    use crate::gp::types::EvaluationCounters;
    use crate::random::create_rng;
    use crate::tree::{Node, NodeKind, Tree};

    /// Fitness = value of the root constant.
    #[derive(Default)]
    struct ConstantValue(AtomicUsize);

    impl Evaluator for ConstantValue {
        fn evaluate(&self, _rng: &mut dyn RngCore, ind: &mut Individual) -> Result<Vec<f64>> {
            self.0.fetch_add(1, Ordering::Relaxed);
            Ok(vec![ind.genotype.root().value])
        }

        fn counters(&self) -> EvaluationCounters {
            EvaluationCounters {
                fitness: self.0.load(Ordering::Relaxed),
                ..EvaluationCounters::default()
            }
        }
    }

    /// Keeps the female.
    struct KeepFemale;

    impl Crossover for KeepFemale {
        fn cross(&self, _rng: &mut dyn RngCore, female: &Tree, _male: &Tree) -> Tree {
            female.clone()
        }
    }

    /// Adds a fixed offset to the root value.
    struct Shift(f64);

    impl Mutation for Shift {
        fn mutate(&self, _rng: &mut dyn RngCore, tree: Tree) -> Tree {
            let mut nodes = tree.into_nodes();
            if let Some(root) = nodes.last_mut() {
                root.value += self.0;
            }
            Tree::new(nodes)
        }
    }

    /// Adds `offsets[k % len]` to the root value on the k-th call.
    struct Cycle {
        offsets: Vec<f64>,
        calls: AtomicUsize,
    }

    impl Mutation for Cycle {
        fn mutate(&self, rng: &mut dyn RngCore, tree: Tree) -> Tree {
            let k = self.calls.fetch_add(1, Ordering::Relaxed);
            Shift(self.offsets[k % self.offsets.len()]).mutate(rng, tree)
        }
    }

    fn population(values: &[f64]) -> Vec<Individual> {
        values
            .iter()
            .map(|&v| Individual {
                fitness: vec![v],
                ..Individual::new(Tree::new(vec![Node::constant(v)]), 1)
            })
            .collect()
    }

    fn generator(shift: f64) -> BasicOffspringGenerator {
        BasicOffspringGenerator::new(
            TournamentSelector::new(2),
            TournamentSelector::new(2),
            KeepFemale,
            Shift(shift),
        )
    }

    #[test]
    fn test_basic_generator_always_yields() {
        let mut parents = population(&[3.0, 1.0, 2.0]);
        let mut gen = generator(10.0);
        gen.prepare(&mut parents);
        let evaluator = ConstantValue::default();
        let mut rng = create_rng(1);
        for _ in 0..20 {
            let child = gen
                .generate(&mut rng, &evaluator, &parents, 1.0, 1.0)
                .unwrap()
                .unwrap();
            assert!(child.primary() >= 11.0);
        }
        assert_eq!(evaluator.counters().fitness, 20);
        assert!(!gen.terminate());
    }

    #[test]
    fn test_reproduction_skips_evaluation() {
        let parents = population(&[3.0, 1.0]);
        let gen = generator(1.0);
        let evaluator = ConstantValue::default();
        let child = gen
            .generate(&mut create_rng(2), &evaluator, &parents, 0.0, 0.0)
            .unwrap()
            .unwrap();
        assert!(parents.contains(&child));
        assert_eq!(evaluator.counters().fitness, 0);
    }

    #[test]
    fn test_non_finite_fitness_is_sanitized() {
        let parents = population(&[1.0]);
        let gen = generator(f64::NAN);
        let child = gen
            .generate(&mut create_rng(3), &ConstantValue::default(), &parents, 0.0, 1.0)
            .unwrap()
            .unwrap();
        assert_eq!(child.primary(), crate::gp::WORST_FITNESS);
    }

    #[test]
    fn test_offspring_selection_accepts_improvements_only() {
        let mut parents = population(&[3.0, 1.0, 2.0]);
        let evaluator = ConstantValue::default();
        let mut rng = create_rng(4);

        let mut worse = OffspringSelectionGenerator::new(generator(1.0));
        worse.prepare(&mut parents);
        for _ in 0..10 {
            assert!(worse
                .generate(&mut rng, &evaluator, &parents, 1.0, 1.0)
                .unwrap()
                .is_none());
        }

        let mut better = OffspringSelectionGenerator::new(generator(-1.0));
        better.prepare(&mut parents);
        let child = better
            .generate(&mut rng, &evaluator, &parents, 1.0, 1.0)
            .unwrap()
            .unwrap();
        assert!(child.primary() < 3.0);
        assert_eq!(child.genotype.root().kind, NodeKind::Constant);
    }

    #[test]
    fn test_offspring_selection_pressure_terminates() {
        let mut parents = population(&[3.0, 1.0]);
        let evaluator = ConstantValue::default();
        let mut gen = OffspringSelectionGenerator::new(generator(1.0)).with_max_selection_pressure(2.0);
        gen.prepare(&mut parents);
        let mut rng = create_rng(5);

        for _ in 0..4 {
            let _ = gen.generate(&mut rng, &evaluator, &parents, 1.0, 1.0).unwrap();
        }
        assert_eq!(gen.selection_pressure(), 2.0);
        assert!(!gen.terminate());
        let _ = gen.generate(&mut rng, &evaluator, &parents, 1.0, 1.0).unwrap();
        assert!(gen.terminate());

        gen.prepare(&mut parents);
        assert!(!gen.terminate());
    }

    #[test]
    fn test_brood_keeps_best_child() {
        let mut parents = population(&[10.0]);
        let cycle = Cycle {
            offsets: vec![3.0, -2.0, 5.0, -7.0, 1.0],
            calls: AtomicUsize::new(0),
        };
        let inner = BasicOffspringGenerator::new(
            TournamentSelector::new(2),
            TournamentSelector::new(2),
            KeepFemale,
            cycle,
        );
        let mut gen = BroodOffspringGenerator::new(inner).with_brood_size(5);
        gen.prepare(&mut parents);
        let evaluator = ConstantValue::default();

        let child = gen
            .generate(&mut create_rng(6), &evaluator, &parents, 1.0, 1.0)
            .unwrap()
            .unwrap();
        assert_eq!(child.primary(), 3.0);
        assert_eq!(evaluator.counters().fitness, 5);
        assert!(!gen.terminate());
    }

    #[test]
    fn test_brood_size_is_at_least_one() {
        let parents = population(&[3.0, 1.0]);
        let gen = BroodOffspringGenerator::new(generator(1.0)).with_brood_size(0);
        assert_eq!(gen.brood_size(), 1);
        let evaluator = ConstantValue::default();
        let child = gen
            .generate(&mut create_rng(7), &evaluator, &parents, 1.0, 1.0)
            .unwrap();
        assert!(child.is_some());
        assert_eq!(evaluator.counters().fitness, 1);
    }
}

//! Parent selection strategies.
//!
//! Selection determines which individuals are chosen as parents for
//! crossover. Different strategies provide different selection pressure.
//! All strategies assume **minimization** (lower fitness = better).
//!
//! # References
//!
//! - Blickle & Thiele (1996), "A Comparison of Selection Schemes used in
//!   Evolutionary Algorithms"
//! - Goldberg & Deb (1991), "A Comparative Analysis of Selection Schemes
//!   Used in Genetic Algorithms"
//! - Deb et al. (2002), "A Fast and Elitist Multiobjective Genetic Algorithm:
//!   NSGA-II"

use super::types::{Individual, Selector, WORST_FITNESS};
use crate::sorting::{crowding_distance, NondominatedSorter};
use rand::{Rng, RngCore};

/// Tournament selection: pick `size` individuals at random, keep the best
/// on one objective.
///
/// Higher `size` = stronger selection pressure.
/// - 2: light pressure (good for diversity)
/// - 3-5: moderate pressure (typical default)
/// - >5: strong pressure (risk of premature convergence)
///
/// # Complexity
/// O(size) per selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TournamentSelector {
    /// Tournament size.
    pub size: usize,
    /// Objective compared.
    pub objective: usize,
}

impl Default for TournamentSelector {
    fn default() -> Self {
        Self {
            size: 5,
            objective: 0,
        }
    }
}

impl TournamentSelector {
    /// Tournament of `size` on the primary objective.
    pub fn new(size: usize) -> Self {
        Self { size, objective: 0 }
    }
}

impl Selector for TournamentSelector {
    fn select(&self, rng: &mut dyn RngCore, population: &[Individual]) -> usize {
        assert!(!population.is_empty(), "cannot select from empty population");
        let n = population.len();
        let k = self.objective;

        let mut best = rng.random_range(0..n);
        for _ in 1..self.size.max(1) {
            let idx = rng.random_range(0..n);
            if population[idx].fitness[k] < population[best].fitness[k] {
                best = idx;
            }
        }
        best
    }
}

/// Fitness-proportionate (roulette wheel) selection.
///
/// For minimization: `weight_i = max_fitness - fitness_i + epsilon`, so the
/// lowest fitness gets the highest weight. `max_fitness` is taken over the
/// finite values below [`WORST_FITNESS`]; individuals at the sentinel get
/// weight `epsilon`.
///
/// **Warning**: Susceptible to super-individual dominance when fitness
/// variance is high.
///
/// # Complexity
/// O(n) per selection (linear scan)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProportionalSelector {
    /// Objective compared.
    pub objective: usize,
}

impl Selector for ProportionalSelector {
    fn select(&self, rng: &mut dyn RngCore, population: &[Individual]) -> usize {
        assert!(!population.is_empty(), "cannot select from empty population");
        let n = population.len();
        if n == 1 {
            return 0;
        }

        let k = self.objective;
        let usable = |f: f64| f.is_finite() && f < WORST_FITNESS;
        let max_fitness = population
            .iter()
            .map(|ind| ind.fitness[k])
            .filter(|&f| usable(f))
            .fold(f64::NEG_INFINITY, f64::max);
        let epsilon = 1e-10;

        let weights: Vec<f64> = population
            .iter()
            .map(|ind| {
                let f = ind.fitness[k];
                if !usable(f) {
                    return epsilon;
                }
                let w = max_fitness - f + epsilon;
                if w > 0.0 && w.is_finite() {
                    w
                } else {
                    epsilon
                }
            })
            .collect();

        let total: f64 = weights.iter().sum();
        if !(total > 0.0 && total.is_finite()) {
            return rng.random_range(0..n);
        }

        let threshold = rng.random_range(0.0..total);
        let mut cumulative = 0.0;
        for (i, &w) in weights.iter().enumerate() {
            cumulative += w;
            if cumulative > threshold {
                return i;
            }
        }

        n - 1 // floating-point fallback
    }
}

/// Rank-based selection using linear ranking (Baker, 1985).
///
/// The best individual gets weight `n`, the worst weight 1. The ranking is
/// computed once per generation in [`Selector::prepare`].
///
/// # Complexity
/// O(n log n) per generation (sort), O(n) per selection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankSelector {
    /// Objective compared.
    pub objective: usize,
    order: Vec<usize>,
}

impl RankSelector {
    /// Rank selection on `objective`.
    pub fn new(objective: usize) -> Self {
        Self {
            objective,
            order: Vec::new(),
        }
    }

    fn ranking(&self, population: &[Individual]) -> Vec<usize> {
        let k = self.objective;
        let mut order: Vec<usize> = (0..population.len()).collect();
        order.sort_by(|&a, &b| population[a].fitness[k].total_cmp(&population[b].fitness[k]));
        order
    }
}

impl Selector for RankSelector {
    fn prepare(&mut self, population: &mut [Individual]) {
        self.order = self.ranking(population);
    }

    fn select(&self, rng: &mut dyn RngCore, population: &[Individual]) -> usize {
        assert!(!population.is_empty(), "cannot select from empty population");
        let n = population.len();
        if n == 1 {
            return 0;
        }

        let computed;
        let order = if self.order.len() == n {
            &self.order
        } else {
            computed = self.ranking(population);
            &computed
        };

        let total = (n * (n + 1)) as f64 / 2.0;
        let threshold = rng.random_range(0.0..total);
        let mut cumulative = 0.0;
        for (rank, &idx) in order.iter().enumerate() {
            cumulative += (n - rank) as f64;
            if cumulative > threshold {
                return idx;
            }
        }
        order[n - 1]
    }
}

/// Crowded tournament selection (NSGA-II).
///
/// [`Selector::prepare`] sorts the population into fronts with `sorter` and
/// stores each individual's front index in `rank` and its crowding distance
/// within the front in `distance`. Tournaments then prefer lower rank, and
/// larger distance on ties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrowdedTournamentSelector<S> {
    /// Sorter used to assign ranks.
    pub sorter: S,
    /// Tournament size.
    pub size: usize,
}

impl<S: NondominatedSorter> CrowdedTournamentSelector<S> {
    /// Crowded tournament of `size` using `sorter`.
    pub fn new(sorter: S, size: usize) -> Self {
        Self { sorter, size }
    }
}

impl<S: NondominatedSorter> Selector for CrowdedTournamentSelector<S> {
    fn prepare(&mut self, population: &mut [Individual]) {
        let objectives: Vec<&[f64]> = population.iter().map(|ind| ind.fitness.as_slice()).collect();
        let sorted = self.sorter.sort(&objectives);
        let distances: Vec<Vec<f64>> = sorted
            .fronts
            .iter()
            .map(|front| {
                let members: Vec<&[f64]> = front.iter().map(|&i| objectives[i]).collect();
                crowding_distance(&members)
            })
            .collect();

        for (front, dist) in sorted.fronts.iter().zip(&distances) {
            for (&i, &d) in front.iter().zip(dist) {
                population[i].rank = sorted.ranks[i];
                population[i].distance = d;
            }
        }
    }

    fn select(&self, rng: &mut dyn RngCore, population: &[Individual]) -> usize {
        assert!(!population.is_empty(), "cannot select from empty population");
        let n = population.len();
        let mut best = rng.random_range(0..n);
        for _ in 1..self.size.max(1) {
            let idx = rng.random_range(0..n);
            if population[idx].cmp_crowded(&population[best]).is_lt() {
                best = idx;
            }
        }
        best
    }
}

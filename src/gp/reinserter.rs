//! Replacement strategies merging the offspring pool into the population.
//!
//! Every strategy keeps `parents.len()` and `offspring.len()` unchanged;
//! the offspring buffer is reused as scratch space by the next generation.

use super::types::{Individual, Reinserter};
use rand::RngCore;

/// Generational replacement.
///
/// With a full-size pool the buffers are swapped; otherwise the first
/// `offspring.len()` parents are exchanged with the offspring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceAll;

impl Reinserter for ReplaceAll {
    fn reinsert(
        &self,
        _rng: &mut dyn RngCore,
        parents: &mut Vec<Individual>,
        offspring: &mut Vec<Individual>,
    ) {
        if parents.len() == offspring.len() {
            std::mem::swap(parents, offspring);
        } else {
            let k = parents.len().min(offspring.len());
            parents[..k].swap_with_slice(&mut offspring[..k]);
        }
    }
}

/// Replaces the worst parents by the best offspring, one pair at a time,
/// as long as the offspring is strictly better on the primary objective.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceWorst;

impl Reinserter for ReplaceWorst {
    fn reinsert(
        &self,
        _rng: &mut dyn RngCore,
        parents: &mut Vec<Individual>,
        offspring: &mut Vec<Individual>,
    ) {
        parents.sort_by(Individual::cmp_primary);
        offspring.sort_by(Individual::cmp_primary);
        let n = parents.len();
        for i in 0..n.min(offspring.len()) {
            let worst = n - 1 - i;
            if offspring[i].cmp_primary(&parents[worst]).is_lt() {
                std::mem::swap(&mut parents[worst], &mut offspring[i]);
            } else {
                break;
            }
        }
    }
}

/// (μ + λ) replacement: the best `parents.len()` individuals of the union
/// survive; the rest is left in `offspring`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeepBest;

impl Reinserter for KeepBest {
    fn reinsert(
        &self,
        _rng: &mut dyn RngCore,
        parents: &mut Vec<Individual>,
        offspring: &mut Vec<Individual>,
    ) {
        let n = parents.len();
        parents.append(offspring);
        parents.sort_by(Individual::cmp_primary);
        *offspring = parents.split_off(n);
    }
}

//! Non-dominated sorting and diversity metrics for multi-objective selection.
//!
//! All objectives are **minimized**. Solution `a` dominates `b` when it is no
//! worse on every objective and strictly better on at least one; solutions
//! with identical objective vectors do not dominate each other.
//!
//! # Algorithms
//!
//! - [`DominanceDegreeSorter`]: dominance-degree sort (Zhou et al., 2017)
//! - [`FastNondominatedSorter`]: fast non-dominated sort (Deb et al., 2002)
//! - [`crowding_distance`]: crowding distance assignment for diversity
//!
//! # References
//!
//! - Zhou et al. (2017), "Ranking vectors by means of the dominance degree
//!   matrix", IEEE Transactions on Evolutionary Computation, 21(1), 34-51
//! - Deb et al. (2002), "A Fast and Elitist Multiobjective Genetic Algorithm:
//!   NSGA-II", IEEE Transactions on Evolutionary Computation, 6(2), 182-197

mod dominance_degree;
mod fast;

pub use dominance_degree::DominanceDegreeSorter;
pub use fast::FastNondominatedSorter;

/// Result of non-dominated sorting.
///
/// Each element of `ranks` corresponds to the Pareto rank of the solution
/// at the same index. Rank 0 is the Pareto front (non-dominated solutions).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NondominatedSortResult {
    /// Pareto rank for each solution (0 = front).
    pub ranks: Vec<usize>,

    /// Indices grouped by front: `fronts[0]` contains rank-0 indices, etc.
    /// Indices within a front are ascending.
    pub fronts: Vec<Vec<usize>>,
}

impl NondominatedSortResult {
    fn from_fronts(n: usize, mut fronts: Vec<Vec<usize>>) -> Self {
        let mut ranks = vec![0; n];
        for (rank, front) in fronts.iter_mut().enumerate() {
            front.sort_unstable();
            for &i in front.iter() {
                ranks[i] = rank;
            }
        }
        Self { ranks, fronts }
    }
}

/// Partitions objective vectors into dominance fronts.
pub trait NondominatedSorter: Send + Sync {
    /// Sorts `objectives` (one vector per solution, all of equal length).
    ///
    /// An empty input yields an empty result.
    fn sort<F: AsRef<[f64]>>(&self, objectives: &[F]) -> NondominatedSortResult;
}

/// Whether `a` Pareto-dominates `b` (minimization).
///
/// ```
/// use u_symreg::sorting::dominates;
///
/// assert!(dominates(&[1.0, 2.0], &[1.0, 3.0]));
/// assert!(!dominates(&[1.0, 2.0], &[1.0, 2.0]));
/// assert!(!dominates(&[1.0, 4.0], &[2.0, 3.0]));
/// ```
pub fn dominates(a: &[f64], b: &[f64]) -> bool {
    let mut strictly_better = false;
    for (&va, &vb) in a.iter().zip(b) {
        if va > vb {
            return false;
        }
        if va < vb {
            strictly_better = true;
        }
    }
    strictly_better
}

/// Crowding distance assignment for diversity preservation.
///
/// Computes the crowding distance for each solution, measuring how
/// spread out the solutions are in objective space. Higher distance
/// means the solution is more isolated (more diverse).
///
/// Boundary solutions (min/max for any objective) receive `f64::INFINITY`.
///
/// # Complexity
///
/// O(m * n * log n) where m = number of objectives, n = number of solutions
///
/// # Example
///
/// ```
/// use u_symreg::sorting::crowding_distance;
///
/// let objectives = vec![
///     vec![1.0, 5.0],
///     vec![3.0, 3.0],
///     vec![5.0, 1.0],
/// ];
///
/// let distances = crowding_distance(&objectives);
///
/// // Boundary solutions get infinity
/// assert!(distances[0].is_infinite());
/// assert!(distances[2].is_infinite());
/// // Interior solution gets finite distance
/// assert!(distances[1].is_finite());
/// ```
pub fn crowding_distance<F: AsRef<[f64]>>(objectives: &[F]) -> Vec<f64> {
    let n = objectives.len();
    if n <= 2 {
        return vec![f64::INFINITY; n];
    }

    let m = objectives[0].as_ref().len();
    let mut distances = vec![0.0f64; n];
    let value = |i: usize, k: usize| objectives[i].as_ref()[k];

    for k in 0..m {
        let mut indices: Vec<usize> = (0..n).collect();
        indices.sort_by(|&a, &b| value(a, k).total_cmp(&value(b, k)));

        distances[indices[0]] = f64::INFINITY;
        distances[indices[n - 1]] = f64::INFINITY;

        let range = value(indices[n - 1], k) - value(indices[0], k);
        if range > 0.0 {
            for i in 1..(n - 1) {
                let prev = value(indices[i - 1], k);
                let next = value(indices[i + 1], k);
                distances[indices[i]] += (next - prev) / range;
            }
        }
    }

    distances
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::create_rng;
    use proptest::prelude::*;
    use rand::Rng;

    /// Checks the defining properties of a front partition by brute force.
    fn assert_valid_fronts(objectives: &[Vec<f64>], result: &NondominatedSortResult) {
        let n = objectives.len();
        let mut seen = vec![false; n];
        for front in &result.fronts {
            assert!(!front.is_empty());
            for &i in front {
                assert!(!seen[i], "index {i} assigned twice");
                seen[i] = true;
            }
        }
        assert!(seen.iter().all(|&s| s), "not every index was assigned");

        for i in 0..n {
            let ri = result.ranks[i];
            for j in 0..n {
                if dominates(&objectives[j], &objectives[i]) {
                    assert!(result.ranks[j] < ri, "{j} dominates {i} but is not ranked ahead");
                }
            }
            if ri > 0 {
                assert!(
                    result.fronts[ri - 1]
                        .iter()
                        .any(|&j| dominates(&objectives[j], &objectives[i])),
                    "{i} in front {ri} is not dominated by front {}",
                    ri - 1
                );
            }
        }
    }

    fn random_population(seed: u64, n: usize, m: usize, levels: u32) -> Vec<Vec<f64>> {
        let mut rng = create_rng(seed);
        (0..n)
            .map(|_| (0..m).map(|_| rng.random_range(0..levels) as f64).collect())
            .collect()
    }

    #[test]
    fn test_dominates() {
        assert!(dominates(&[1.0, 1.0], &[2.0, 2.0]));
        assert!(dominates(&[1.0, 2.0], &[2.0, 2.0]));
        assert!(!dominates(&[2.0, 2.0], &[1.0, 2.0]));
        assert!(!dominates(&[1.0, 3.0], &[3.0, 1.0]));
        assert!(!dominates(&[2.0, 2.0], &[2.0, 2.0]));
    }

    #[test]
    fn test_sorters_agree() {
        for seed in 0..20 {
            let objs = random_population(seed, 60, 3, 6);
            let a = DominanceDegreeSorter.sort(&objs);
            let b = FastNondominatedSorter.sort(&objs);
            assert_eq!(a, b);
            assert_valid_fronts(&objs, &a);
        }
    }

    #[test]
    fn test_from_fronts_sorts_indices_and_assigns_ranks() {
        let result = NondominatedSortResult::from_fronts(5, vec![vec![3, 0], vec![4, 2, 1]]);
        assert_eq!(result.fronts, vec![vec![0, 3], vec![1, 2, 4]]);
        assert_eq!(result.ranks, vec![0, 1, 1, 0, 1]);
    }

    // ---- Crowding distance ----

    #[test]
    fn test_crowding_single() {
        let objs = vec![vec![1.0, 2.0]];
        let dist = crowding_distance(&objs);
        assert_eq!(dist.len(), 1);
        assert!(dist[0].is_infinite());
    }

    #[test]
    fn test_crowding_evenly_spaced() {
        let objs = vec![
            vec![0.0, 4.0],
            vec![1.0, 3.0],
            vec![2.0, 2.0],
            vec![3.0, 1.0],
            vec![4.0, 0.0],
        ];
        let dist = crowding_distance(&objs);

        assert!(dist[0].is_infinite());
        assert!(dist[4].is_infinite());

        let d1 = dist[1];
        let d2 = dist[2];
        let d3 = dist[3];
        assert!((d1 - d2).abs() < 1e-10, "expected equal: {d1} vs {d2}");
        assert!((d2 - d3).abs() < 1e-10, "expected equal: {d2} vs {d3}");
        assert!((d2 - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_crowding_zero_range_objective() {
        // One objective has zero range; must not divide by zero
        let objs = vec![[1.0, 5.0], [2.0, 5.0], [3.0, 5.0]];
        let dist = crowding_distance(&objs);
        assert!(dist[0].is_infinite());
        assert!(dist[2].is_infinite());
        assert!(dist[1].is_finite());
    }

    proptest! {
        #[test]
        fn prop_dominance_degree_matches_brute_force(
            seed in any::<u64>(),
            n in 1usize..=200,
            m in 1usize..=3,
            levels in 2u32..10,
        ) {
            let objs = random_population(seed, n, m, levels);
            let result = DominanceDegreeSorter.sort(&objs);
            assert_valid_fronts(&objs, &result);
        }
    }
}

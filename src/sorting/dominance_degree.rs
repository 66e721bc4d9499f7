//! Dominance-degree non-dominated sorting.

use super::{NondominatedSortResult, NondominatedSorter};

/// Dominance-degree sort (Zhou et al., 2017).
///
/// Builds an `n × n` degree matrix `D` where `D[x][y]` counts the objectives
/// on which `x` is not worse than `y`. Per objective the contribution is read
/// off the ascending order of that objective: every solution gets a one for
/// itself and everything after the start of its run of equal values. Pairs
/// with identical objective vectors (`D[x][y] == D[y][x] == m`) are zeroed.
/// A remaining solution joins the current front when no other remaining
/// solution `y` has `D[y][x] == m`.
///
/// # Complexity
///
/// O(m * n²) time, O(n²) memory.
///
/// # Example
///
/// ```
/// use u_symreg::sorting::{DominanceDegreeSorter, NondominatedSorter};
///
/// let objectives = vec![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]];
/// let result = DominanceDegreeSorter.sort(&objectives);
/// assert_eq!(result.fronts, vec![vec![0], vec![1], vec![2]]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DominanceDegreeSorter;

impl NondominatedSorter for DominanceDegreeSorter {
    fn sort<F: AsRef<[f64]>>(&self, objectives: &[F]) -> NondominatedSortResult {
        let n = objectives.len();
        if n == 0 {
            return NondominatedSortResult::default();
        }
        let m = objectives[0].as_ref().len();
        debug_assert!(
            objectives.iter().all(|o| o.as_ref().len() == m),
            "all objective vectors must have the same length"
        );
        if m == 0 {
            return NondominatedSortResult::from_fronts(n, vec![(0..n).collect()]);
        }

        let degree = degree_matrix(objectives, m);
        let m = m as u32;

        let mut remaining: Vec<usize> = (0..n).collect();
        let mut fronts = Vec::new();
        while !remaining.is_empty() {
            let (front, rest): (Vec<usize>, Vec<usize>) = remaining.iter().partition(|&&x| {
                remaining.iter().all(|&y| degree[y * n + x] < m)
            });
            fronts.push(front);
            remaining = rest;
        }

        NondominatedSortResult::from_fronts(n, fronts)
    }
}

fn degree_matrix<F: AsRef<[f64]>>(objectives: &[F], m: usize) -> Vec<u32> {
    let n = objectives.len();
    let mut degree = vec![0u32; n * n];
    let mut order: Vec<usize> = (0..n).collect();

    for k in 0..m {
        let value = |i: usize| objectives[i].as_ref()[k];
        order.sort_by(|&a, &b| value(a).total_cmp(&value(b)));

        let mut run_start = 0;
        for p in 0..n {
            if p > 0 && value(order[p]) != value(order[p - 1]) {
                run_start = p;
            }
            let row = &mut degree[order[p] * n..(order[p] + 1) * n];
            for &y in &order[run_start..] {
                row[y] += 1;
            }
        }
    }

    let m = m as u32;
    for x in 0..n {
        for y in x..n {
            if degree[x * n + y] == m && degree[y * n + x] == m {
                degree[x * n + y] = 0;
                degree[y * n + x] = 0;
            }
        }
    }
    degree
}

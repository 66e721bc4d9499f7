//! Fast non-dominated sorting.

use super::{dominates, NondominatedSortResult, NondominatedSorter};

/// Fast non-dominated sort (Deb et al., 2002).
///
/// # Algorithm
///
/// 1. For each pair of solutions, determine dominance
/// 2. Solutions dominated by no other belong to front 0 (rank 0)
/// 3. Remove front 0, repeat to find subsequent fronts
///
/// # Complexity
///
/// O(m * n²) where m = number of objectives, n = number of solutions
///
/// # Example
///
/// ```
/// use u_symreg::sorting::{FastNondominatedSorter, NondominatedSorter};
///
/// let objectives = vec![
///     vec![1.0, 5.0],  // Solution A
///     vec![3.0, 3.0],  // Solution B
///     vec![5.0, 1.0],  // Solution C
///     vec![4.0, 4.0],  // Solution D, dominated by B
/// ];
///
/// let result = FastNondominatedSorter.sort(&objectives);
/// assert_eq!(result.ranks, vec![0, 0, 0, 1]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FastNondominatedSorter;

impl NondominatedSorter for FastNondominatedSorter {
    fn sort<F: AsRef<[f64]>>(&self, objectives: &[F]) -> NondominatedSortResult {
        let n = objectives.len();
        if n == 0 {
            return NondominatedSortResult::default();
        }

        let mut domination_count = vec![0usize; n];
        let mut dominated_by: Vec<Vec<usize>> = vec![Vec::new(); n];

        for i in 0..n {
            for j in (i + 1)..n {
                let (a, b) = (objectives[i].as_ref(), objectives[j].as_ref());
                if dominates(a, b) {
                    dominated_by[i].push(j);
                    domination_count[j] += 1;
                } else if dominates(b, a) {
                    dominated_by[j].push(i);
                    domination_count[i] += 1;
                }
            }
        }

        let mut current: Vec<usize> = (0..n).filter(|&i| domination_count[i] == 0).collect();
        let mut fronts = Vec::new();
        while !current.is_empty() {
            let mut next = Vec::new();
            for &i in &current {
                for &j in &dominated_by[i] {
                    domination_count[j] -= 1;
                    if domination_count[j] == 0 {
                        next.push(j);
                    }
                }
            }
            fronts.push(std::mem::replace(&mut current, next));
        }

        NondominatedSortResult::from_fronts(n, fronts)
    }
}

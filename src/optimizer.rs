//! Local coefficient tuning by nonlinear least squares.
//!
//! [`LevenbergMarquardt`] minimizes `½ Σ (f(x; c) - y)²` over the tunable
//! coefficients `c` of a tree, using the reverse-mode Jacobian from the
//! [`Interpreter`]. Only improving steps are accepted, so the coefficients
//! written back are never worse than the starting point.

use crate::dataset::Dataset;
use crate::error::Result;
use crate::interpreter::{Interpreter, Jacobian};
use crate::tree::Tree;
use log::trace;
use std::ops::Range;

/// Outcome of one local optimization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizerSummary {
    /// Cost before the first step.
    pub initial_cost: f64,
    /// Cost of the coefficients written back to the tree.
    pub final_cost: f64,
    /// Iterations performed (accepted and rejected steps).
    pub iterations: usize,
    /// Forward evaluations of the tree.
    pub function_evaluations: usize,
    /// Jacobian evaluations.
    pub jacobian_evaluations: usize,
    /// Whether the relative cost decrease fell below the tolerance.
    pub converged: bool,
}

/// Damped Gauss-Newton solver.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LevenbergMarquardt {
    /// Maximum number of iterations.
    pub max_iterations: usize,
    /// Starting damping factor.
    pub initial_damping: f64,
    /// Stop when the relative cost decrease of an accepted step is below this.
    pub tolerance: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            initial_damping: 1e-3,
            tolerance: 1e-10,
        }
    }
}

const MAX_DAMPING: f64 = 1e12;

impl LevenbergMarquardt {
    /// Solver with the given iteration budget.
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..Self::default()
        }
    }

    /// Tunes the coefficients of `tree` so its output over `range` fits
    /// `target` (one value per row of `range`).
    ///
    /// # Errors
    /// Propagates interpreter errors, notably
    /// [`Error::UnsupportedDerivative`](crate::Error::UnsupportedDerivative).
    ///
    /// # Panics
    /// Panics if `target.len() != range.len()`.
    pub fn optimize(
        &self,
        tree: &mut Tree,
        dataset: &Dataset,
        range: Range<usize>,
        target: &[f64],
    ) -> Result<OptimizerSummary> {
        assert_eq!(target.len(), range.len(), "target does not match range");
        let mut coefficients = tree.coefficients();
        let n = coefficients.len();

        let (values, mut jacobian) =
            Interpreter::evaluate_with_jacobian::<f64>(tree, dataset, range.clone(), None)?;
        let mut residuals = residuals_of(&values, target);
        let initial_cost = cost(&residuals);

        let mut summary = OptimizerSummary {
            initial_cost,
            final_cost: initial_cost,
            iterations: 0,
            function_evaluations: 1,
            jacobian_evaluations: 1,
            converged: false,
        };
        if n == 0 || !initial_cost.is_finite() {
            return Ok(summary);
        }

        let mut current = initial_cost;
        let mut damping = self.initial_damping;
        let mut normal = NormalEquations::new(n);
        normal.assemble(&jacobian, &residuals);

        while summary.iterations < self.max_iterations {
            summary.iterations += 1;

            let Some(step) = normal.solve(damping) else {
                damping *= 10.0;
                if damping > MAX_DAMPING {
                    break;
                }
                continue;
            };
            let candidate: Vec<f64> = coefficients.iter().zip(&step).map(|(c, d)| c + d).collect();
            let values: Vec<f64> =
                Interpreter::evaluate(tree, dataset, range.clone(), Some(&candidate))?;
            summary.function_evaluations += 1;
            let trial = cost(&residuals_of(&values, target));

            if trial.is_finite() && trial < current {
                let decrease = (current - trial) / current.max(f64::MIN_POSITIVE);
                coefficients = candidate;
                current = trial;
                damping = (damping / 10.0).max(f64::EPSILON);
                if decrease < self.tolerance || current == 0.0 {
                    summary.converged = true;
                    break;
                }
                let (values, j) = Interpreter::evaluate_with_jacobian::<f64>(
                    tree,
                    dataset,
                    range.clone(),
                    Some(&coefficients),
                )?;
                summary.jacobian_evaluations += 1;
                jacobian = j;
                residuals = residuals_of(&values, target);
                normal.assemble(&jacobian, &residuals);
            } else {
                trace!("rejected step: cost {trial} >= {current}, damping {damping}");
                damping *= 10.0;
                if damping > MAX_DAMPING {
                    break;
                }
            }
        }

        tree.set_coefficients(&coefficients)?;
        summary.final_cost = current;
        Ok(summary)
    }
}

fn residuals_of(values: &[f64], target: &[f64]) -> Vec<f64> {
    values.iter().zip(target).map(|(v, y)| v - y).collect()
}

fn cost(residuals: &[f64]) -> f64 {
    0.5 * residuals.iter().map(|r| r * r).sum::<f64>()
}

/// `JᵀJ` and `Jᵀr`, assembled once per accepted step.
struct NormalEquations {
    n: usize,
    jtj: Vec<f64>,
    jtr: Vec<f64>,
}

impl NormalEquations {
    fn new(n: usize) -> Self {
        Self {
            n,
            jtj: vec![0.0; n * n],
            jtr: vec![0.0; n],
        }
    }

    fn assemble(&mut self, jacobian: &Jacobian<f64>, residuals: &[f64]) {
        let n = self.n;
        for a in 0..n {
            let ca = jacobian.column(a);
            self.jtr[a] = ca.iter().zip(residuals).map(|(j, r)| j * r).sum();
            for b in a..n {
                let v: f64 = ca.iter().zip(jacobian.column(b)).map(|(x, y)| x * y).sum();
                self.jtj[a * n + b] = v;
                self.jtj[b * n + a] = v;
            }
        }
    }

    /// Solves `(JᵀJ + λ·diag(JᵀJ)) δ = -Jᵀr` by Gaussian elimination with
    /// partial pivoting. Returns `None` for a singular or non-finite system.
    fn solve(&self, damping: f64) -> Option<Vec<f64>> {
        let n = self.n;
        let mut a = self.jtj.clone();
        let mut b: Vec<f64> = self.jtr.iter().map(|g| -g).collect();
        for d in 0..n {
            let diag = a[d * n + d];
            a[d * n + d] += damping * if diag > 0.0 { diag } else { 1.0 };
        }

        for col in 0..n {
            let pivot = (col..n).max_by(|&x, &y| {
                a[x * n + col].abs().total_cmp(&a[y * n + col].abs())
            })?;
            if !a[pivot * n + col].is_normal() {
                return None;
            }
            if pivot != col {
                for k in 0..n {
                    a.swap(pivot * n + k, col * n + k);
                }
                b.swap(pivot, col);
            }
            for row in col + 1..n {
                let factor = a[row * n + col] / a[col * n + col];
                if factor == 0.0 {
                    continue;
                }
                for k in col..n {
                    a[row * n + k] -= factor * a[col * n + k];
                }
                b[row] -= factor * b[col];
            }
        }

        let mut x = vec![0.0; n];
        for row in (0..n).rev() {
            let tail: f64 = (row + 1..n).map(|k| a[row * n + k] * x[k]).sum();
            x[row] = (b[row] - tail) / a[row * n + row];
        }
        x.iter().all(|v| v.is_finite()).then_some(x)
    }
}

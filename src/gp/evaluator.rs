//! Fitness evaluation.
//!
//! [`RegressionEvaluator`] measures how well a tree reproduces the target
//! column of a [`Problem`] on its training range, optionally after tuning
//! the tree's coefficients with [`LevenbergMarquardt`]. [`LengthEvaluator`]
//! and [`MultiEvaluator`] add parsimony as a second objective.

use super::config::GpConfig;
use super::types::{EvaluationCounters, Evaluator, Individual};
use crate::dataset::Problem;
use crate::error::Result;
use crate::interpreter::Interpreter;
use crate::optimizer::LevenbergMarquardt;
use log::trace;
use rand::RngCore;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Error measure between estimated and target values. Lower is better.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorMetric {
    /// Mean squared error.
    Mse,
    /// Root mean squared error.
    Rmse,
    /// Mean squared error divided by the target variance.
    #[default]
    Nmse,
    /// Mean absolute error.
    Mae,
    /// `1 - R²`, the unexplained share of the target variance.
    R2,
    /// `1 - r²`, with `r` the Pearson correlation. Invariant to affine
    /// rescaling of the estimate.
    C2,
}

impl ErrorMetric {
    /// Computes the metric over paired slices.
    ///
    /// Returns `NaN` for empty input, for a constant target under
    /// [`ErrorMetric::Nmse`], [`ErrorMetric::R2`] and [`ErrorMetric::C2`], and
    /// for a constant estimate under [`ErrorMetric::C2`].
    ///
    /// # Panics
    /// Panics if the slices differ in length.
    ///
    /// ```
    /// use u_symreg::gp::ErrorMetric;
    ///
    /// let target = [1.0, 2.0, 3.0];
    /// assert_eq!(ErrorMetric::Mse.compute(&[1.0, 2.0, 5.0], &target), 4.0 / 3.0);
    /// assert_eq!(ErrorMetric::R2.compute(&target, &target), 0.0);
    /// ```
    pub fn compute(self, estimated: &[f64], target: &[f64]) -> f64 {
        assert_eq!(estimated.len(), target.len(), "length mismatch");
        let n = target.len() as f64;
        let sse: f64 = estimated
            .iter()
            .zip(target)
            .map(|(e, t)| (e - t) * (e - t))
            .sum();
        match self {
            ErrorMetric::Mse => sse / n,
            ErrorMetric::Rmse => (sse / n).sqrt(),
            ErrorMetric::Mae => {
                let sae: f64 = estimated.iter().zip(target).map(|(e, t)| (e - t).abs()).sum();
                sae / n
            }
            ErrorMetric::Nmse | ErrorMetric::R2 => {
                let mean = target.iter().sum::<f64>() / n;
                let sst: f64 = target.iter().map(|t| (t - mean) * (t - mean)).sum();
                if sst > 0.0 {
                    sse / sst
                } else {
                    f64::NAN
                }
            }
            ErrorMetric::C2 => {
                let mean_e = estimated.iter().sum::<f64>() / n;
                let mean_t = target.iter().sum::<f64>() / n;
                let (mut cov, mut var_e, mut var_t) = (0.0, 0.0, 0.0);
                for (e, t) in estimated.iter().zip(target) {
                    cov += (e - mean_e) * (t - mean_t);
                    var_e += (e - mean_e) * (e - mean_e);
                    var_t += (t - mean_t) * (t - mean_t);
                }
                if var_e > 0.0 && var_t > 0.0 {
                    1.0 - cov * cov / (var_e * var_t)
                } else {
                    f64::NAN
                }
            }
        }
    }
}

/// Least-squares scale and offset mapping `estimated` onto `target`.
///
/// Returns `(a, b)` with `a·x + b` minimizing the squared error; `a` falls
/// back to 1 when the estimate has no variance.
pub fn linear_scaling(estimated: &[f64], target: &[f64]) -> (f64, f64) {
    let n = estimated.len() as f64;
    let mean_x = estimated.iter().sum::<f64>() / n;
    let mean_y = target.iter().sum::<f64>() / n;
    let (mut cov, mut var) = (0.0, 0.0);
    for (x, y) in estimated.iter().zip(target) {
        cov += (x - mean_x) * (y - mean_y);
        var += (x - mean_x) * (x - mean_x);
    }
    let mut a = cov / var;
    if !a.is_finite() {
        a = 1.0;
    }
    (a, mean_y - a * mean_x)
}

/// Single-objective regression error on the training range.
///
/// When `iterations > 0` the coefficients are first tuned with
/// Levenberg-Marquardt; if that made the cost worse the original
/// coefficients are restored. With `linear_scaling` the error is measured
/// after the optimal affine correction of the output.
#[derive(Debug)]
pub struct RegressionEvaluator<'a> {
    problem: &'a Problem,
    metric: ErrorMetric,
    linear_scaling: bool,
    iterations: usize,
    fitness_evaluations: AtomicUsize,
    local_evaluations: AtomicUsize,
    jacobian_evaluations: AtomicUsize,
}

impl<'a> RegressionEvaluator<'a> {
    /// NMSE with linear scaling and no local optimization.
    pub fn new(problem: &'a Problem) -> Self {
        Self {
            problem,
            metric: ErrorMetric::default(),
            linear_scaling: true,
            iterations: 0,
            fitness_evaluations: AtomicUsize::new(0),
            local_evaluations: AtomicUsize::new(0),
            jacobian_evaluations: AtomicUsize::new(0),
        }
    }

    /// [`RegressionEvaluator::new`] with the local optimization budget of
    /// [`GpConfig::iterations`].
    pub fn from_config(problem: &'a Problem, config: &GpConfig) -> Self {
        Self::new(problem).with_iterations(config.iterations)
    }

    /// Sets the error metric.
    pub fn with_metric(mut self, metric: ErrorMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Enables or disables linear scaling of the output.
    pub fn with_linear_scaling(mut self, enabled: bool) -> Self {
        self.linear_scaling = enabled;
        self
    }

    /// Sets the local optimization budget per evaluation (0 disables it).
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// The problem being solved.
    pub fn problem(&self) -> &Problem {
        self.problem
    }

    /// The error metric in use.
    pub fn metric(&self) -> ErrorMetric {
        self.metric
    }

    fn optimize(&self, individual: &mut Individual) -> Result<()> {
        let tree = &mut individual.genotype;
        if self.iterations == 0 || tree.coefficients_count() == 0 {
            return Ok(());
        }
        let before = tree.coefficients();
        let summary = LevenbergMarquardt::new(self.iterations).optimize(
            tree,
            self.problem.dataset(),
            self.problem.training_range(),
            self.problem.training_target(),
        )?;
        self.local_evaluations
            .fetch_add(summary.iterations, Ordering::Relaxed);
        self.jacobian_evaluations
            .fetch_add(summary.jacobian_evaluations, Ordering::Relaxed);

        if summary.initial_cost < summary.final_cost {
            trace!(
                "restoring coefficients: cost {} -> {}",
                summary.initial_cost,
                summary.final_cost
            );
            tree.set_coefficients(&before)?;
        }
        Ok(())
    }
}

impl Evaluator for RegressionEvaluator<'_> {
    fn evaluate(&self, _rng: &mut dyn RngCore, individual: &mut Individual) -> Result<Vec<f64>> {
        self.fitness_evaluations.fetch_add(1, Ordering::Relaxed);
        self.optimize(individual)?;

        let target = self.problem.training_target();
        let mut estimated: Vec<f64> = Interpreter::evaluate(
            &individual.genotype,
            self.problem.dataset(),
            self.problem.training_range(),
            None,
        )?;
        if self.linear_scaling {
            let (a, b) = linear_scaling(&estimated, target);
            for v in estimated.iter_mut() {
                *v = a * *v + b;
            }
        }
        Ok(vec![self.metric.compute(&estimated, target)])
    }

    fn counters(&self) -> EvaluationCounters {
        EvaluationCounters {
            fitness: self.fitness_evaluations.load(Ordering::Relaxed),
            local: self.local_evaluations.load(Ordering::Relaxed),
            jacobian: self.jacobian_evaluations.load(Ordering::Relaxed),
        }
    }
}

/// Tree length as an objective. Does not count towards the budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LengthEvaluator;

impl Evaluator for LengthEvaluator {
    fn evaluate(&self, _rng: &mut dyn RngCore, individual: &mut Individual) -> Result<Vec<f64>> {
        Ok(vec![individual.genotype.len() as f64])
    }

    fn counters(&self) -> EvaluationCounters {
        EvaluationCounters::default()
    }
}

/// Concatenates the objectives of several evaluators, in order.
///
/// One call counts as one fitness evaluation; local and Jacobian counters are
/// summed over the inner evaluators.
///
/// ```no_run
/// # use u_symreg::dataset::Problem;
/// use u_symreg::gp::{LengthEvaluator, MultiEvaluator, RegressionEvaluator};
///
/// # fn build(problem: &Problem) {
/// let evaluator = MultiEvaluator::new()
///     .add(RegressionEvaluator::new(problem))
///     .add(LengthEvaluator);
/// # }
/// ```
#[derive(Default)]
pub struct MultiEvaluator<'a> {
    evaluators: Vec<Box<dyn Evaluator + 'a>>,
    fitness_evaluations: AtomicUsize,
}

impl std::fmt::Debug for MultiEvaluator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiEvaluator")
            .field("evaluators", &self.evaluators.len())
            .field("fitness_evaluations", &self.fitness_evaluations)
            .finish()
    }
}

impl<'a> MultiEvaluator<'a> {
    /// An evaluator with no objectives.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an evaluator; its objectives follow those already added.
    pub fn add(mut self, evaluator: impl Evaluator + 'a) -> Self {
        self.evaluators.push(Box::new(evaluator));
        self
    }
}

impl Evaluator for MultiEvaluator<'_> {
    fn objectives(&self) -> usize {
        self.evaluators.iter().map(|e| e.objectives()).sum()
    }

    fn evaluate(&self, rng: &mut dyn RngCore, individual: &mut Individual) -> Result<Vec<f64>> {
        self.fitness_evaluations.fetch_add(1, Ordering::Relaxed);
        let mut fitness = Vec::with_capacity(self.objectives());
        for evaluator in &self.evaluators {
            fitness.extend(evaluator.evaluate(rng, individual)?);
        }
        Ok(fitness)
    }

    fn counters(&self) -> EvaluationCounters {
        let mut counters = EvaluationCounters {
            fitness: self.fitness_evaluations.load(Ordering::Relaxed),
            ..EvaluationCounters::default()
        };
        for evaluator in &self.evaluators {
            let c = evaluator.counters();
            counters.local += c.local;
            counters.jacobian += c.jacobian;
        }
        counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{variable_hash, Dataset};
    use crate::random::create_rng;
    use crate::tree::{Node, NodeKind, Tree};

    fn problem() -> Problem {
        let x: Vec<f64> = (0..30).map(|i| i as f64 / 10.0).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v + 1.0).collect();
        let ds = Dataset::new(vec![("x".into(), x), ("y".into(), y)]).unwrap();
        Problem::new(ds, "y").unwrap().with_training_range(0..30).unwrap()
    }

    fn x_tree() -> Tree {
        Tree::new(vec![Node::variable(variable_hash("x"), 1.0)])
    }

    #[test]
    fn test_metrics() {
        let target = [1.0, 2.0, 3.0, 4.0];
        let estimated = [1.0, 2.0, 3.0, 6.0];
        assert_eq!(ErrorMetric::Mse.compute(&estimated, &target), 1.0);
        assert_eq!(ErrorMetric::Rmse.compute(&estimated, &target), 1.0);
        assert_eq!(ErrorMetric::Mae.compute(&estimated, &target), 0.5);
        // sst = 5
        assert!((ErrorMetric::Nmse.compute(&estimated, &target) - 0.8).abs() < 1e-12);
        assert!((ErrorMetric::R2.compute(&estimated, &target) - 0.8).abs() < 1e-12);
        assert!(ErrorMetric::Nmse.compute(&[1.0, 1.0], &[2.0, 2.0]).is_nan());
    }

    #[test]
    fn test_squared_correlation_metric() {
        let target = [1.0, 2.0, 3.0, 4.0];
        // cov = 8, var_e = 14, var_t = 5
        let c2 = ErrorMetric::C2.compute(&[1.0, 2.0, 3.0, 6.0], &target);
        assert!((c2 - 6.0 / 70.0).abs() < 1e-12, "{c2}");

        let affine: Vec<f64> = target.iter().map(|t| -3.0 * t + 7.0).collect();
        assert!(ErrorMetric::C2.compute(&affine, &target).abs() < 1e-12);
        assert!(ErrorMetric::C2.compute(&[2.0; 4], &target).is_nan());
        assert!(ErrorMetric::C2.compute(&target, &[2.0; 4]).is_nan());
    }

    #[test]
    fn test_linear_scaling() {
        let (a, b) = linear_scaling(&[0.0, 1.0, 2.0], &[1.0, 3.0, 5.0]);
        assert!((a - 2.0).abs() < 1e-12);
        assert!((b - 1.0).abs() < 1e-12);

        let (a, b) = linear_scaling(&[4.0, 4.0], &[1.0, 3.0]);
        assert_eq!(a, 1.0);
        assert_eq!(b, -2.0);
    }

    #[test]
    fn test_scaled_evaluation_is_exact_for_affine_model() {
        let problem = problem();
        let evaluator = RegressionEvaluator::new(&problem).with_metric(ErrorMetric::Mse);
        let mut ind = Individual::new(x_tree(), 1);
        let fitness = evaluator.evaluate(&mut create_rng(0), &mut ind).unwrap();
        assert!(fitness[0] < 1e-20, "{fitness:?}");
        assert_eq!(evaluator.counters().fitness, 1);
    }

    #[test]
    fn test_unscaled_evaluation() {
        let problem = problem();
        let evaluator = RegressionEvaluator::new(&problem)
            .with_metric(ErrorMetric::Mae)
            .with_linear_scaling(false);
        let mut ind = Individual::new(x_tree(), 1);
        let fitness = evaluator.evaluate(&mut create_rng(0), &mut ind).unwrap();
        // |2x + 1 - x| averaged over x in [0, 2.9]
        let expected = (0..30).map(|i| i as f64 / 10.0 + 1.0).sum::<f64>() / 30.0;
        assert!((fitness[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_local_optimization_tunes_coefficients() {
        let problem = problem();
        let evaluator = RegressionEvaluator::new(&problem)
            .with_metric(ErrorMetric::Mse)
            .with_linear_scaling(false)
            .with_iterations(20);
        let tree = Tree::new(vec![
            Node::constant(0.0),
            Node::variable(variable_hash("x"), 1.0),
            Node::new(NodeKind::Add),
        ]);
        let mut ind = Individual::new(tree, 1);
        let fitness = evaluator.evaluate(&mut create_rng(0), &mut ind).unwrap();
        assert!(fitness[0] < 1e-12, "{fitness:?}");
        let c = ind.genotype.coefficients();
        assert!((c[0] - 1.0).abs() < 1e-6 && (c[1] - 2.0).abs() < 1e-6, "{c:?}");

        let counters = evaluator.counters();
        assert_eq!(counters.fitness, 1);
        assert!(counters.local > 0);
        assert!(counters.jacobian > 0);
    }

    #[test]
    fn test_non_finite_output_is_reported_raw() {
        let problem = problem();
        let evaluator = RegressionEvaluator::new(&problem).with_linear_scaling(false);
        // log(x) is -inf at x = 0
        let tree = Tree::new(vec![
            Node::variable(variable_hash("x"), 1.0),
            Node::new(NodeKind::Log),
        ]);
        let mut ind = Individual::new(tree, 1);
        let fitness = evaluator.evaluate(&mut create_rng(0), &mut ind).unwrap();
        assert!(!fitness[0].is_finite());
    }

    #[test]
    fn test_multi_evaluator() {
        let problem = problem();
        let evaluator = MultiEvaluator::new()
            .add(RegressionEvaluator::new(&problem))
            .add(LengthEvaluator);
        assert_eq!(evaluator.objectives(), 2);
        let mut ind = Individual::new(x_tree(), 2);
        let fitness = evaluator.evaluate(&mut create_rng(0), &mut ind).unwrap();
        assert_eq!(fitness.len(), 2);
        assert_eq!(fitness[1], 1.0);
        assert_eq!(evaluator.counters().fitness, 1);
    }
}

//! GP evolutionary loop execution.
//!
//! [`GpRunner`] orchestrates the generational process:
//! creation → evaluation → (report → elitism → offspring generation →
//! reinsertion) per generation.
//!
//! Every parallel phase first draws one seed per slot from the top-level
//! generator, then fans out over the slots with rayon and joins before the
//! next phase. A run with a fixed seed is therefore reproducible regardless
//! of the number of threads, as long as no stop condition fires mid-phase.

use super::config::GpConfig;
use super::types::{
    sanitize, CoefficientInitializer, Creator, EvaluationCounters, Evaluator, Individual,
    OffspringGenerator, Reinserter,
};
use crate::dataset::Problem;
use crate::error::Result;
use crate::random::{create_rng, draw_seeds};
use log::{debug, info};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Primary fitness below which the run counts as solved.
pub const CONVERGENCE_THRESHOLD: f64 = 1e-6;

/// The collaborators driving a run.
pub struct GpOperators<'a> {
    /// Builds the initial trees.
    pub creator: &'a dyn Creator,
    /// Initializes the coefficients of the initial trees.
    pub coefficient_initializer: &'a dyn CoefficientInitializer,
    /// Computes objective values; its fitness counter drives the budget.
    pub evaluator: &'a dyn Evaluator,
    /// Produces evaluated children.
    pub generator: &'a mut dyn OffspringGenerator,
    /// Merges offspring into the population.
    pub reinserter: &'a dyn Reinserter,
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Termination {
    /// The generation cap was reached.
    Generations,
    /// The best primary fitness fell below [`CONVERGENCE_THRESHOLD`].
    Converged,
    /// The evaluation budget was spent.
    Budget,
    /// The time limit elapsed.
    TimeLimit,
    /// The cancellation token was set.
    Cancelled,
    /// The offspring generator asked to stop.
    Generator,
}

/// Snapshot handed to the report callback once per generation.
#[derive(Debug, Clone, Copy)]
pub struct GenerationReport<'a> {
    /// Zero-based generation index.
    pub generation: usize,
    /// Best parent on the primary objective (first minimum).
    pub best: &'a Individual,
    /// The current parent population.
    pub parents: &'a [Individual],
    /// Evaluation counters so far.
    pub counters: EvaluationCounters,
    /// Time since the run started.
    pub elapsed: Duration,
}

/// Result of a GP run.
#[derive(Debug, Clone)]
pub struct GpResult {
    /// Best individual of the final population.
    pub best: Individual,

    /// Number of completed generations.
    pub generations: usize,

    /// Why the run stopped.
    pub termination: Termination,

    /// Best primary fitness at each report.
    pub fitness_history: Vec<f64>,

    /// Evaluation counters at the end of the run.
    pub counters: EvaluationCounters,

    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

/// Executes the GP evolutionary loop.
///
/// # Usage
///
/// ```no_run
/// use u_symreg::dataset::{Dataset, Problem};
/// use u_symreg::gp::*;
///
/// # fn main() -> u_symreg::Result<()> {
/// let x: Vec<f64> = (0..100).map(|i| i as f64 / 50.0).collect();
/// let y: Vec<f64> = x.iter().map(|v| v * v + 1.0).collect();
/// let problem = Problem::new(Dataset::new(vec![("x".into(), x), ("y".into(), y)])?, "y")?;
/// let config = GpConfig::default().with_population_size(100).with_pool_size(100).with_seed(42);
///
/// let pset = problem.primitive_set().clone();
/// let evaluator = RegressionEvaluator::from_config(&problem, &config);
/// let mut generator = BasicOffspringGenerator::new(
///     TournamentSelector::new(5),
///     TournamentSelector::new(5),
///     SubtreeCrossover::default(),
///     ReplaceSubtreeMutation::new(pset, problem.inputs(), 10, 50),
/// );
/// let operators = GpOperators {
///     creator: &BalancedTreeCreator::default(),
///     coefficient_initializer: &NormalCoefficientInitializer::default(),
///     evaluator: &evaluator,
///     generator: &mut generator,
///     reinserter: &ReplaceAll,
/// };
/// let result = GpRunner::run(&problem, &config, operators, |report| {
///     println!("{}: {}", report.generation, report.best.primary());
/// })?;
/// println!("best fitness: {}", result.best.primary());
/// # Ok(())
/// # }
/// ```
pub struct GpRunner;

impl GpRunner {
    /// Runs the GP loop, calling `report` once per generation.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`](crate::Error::InvalidConfig) for an invalid
    /// configuration, [`Error::ThreadPool`](crate::Error::ThreadPool) if the
    /// dedicated pool cannot be built, and any error returned by the
    /// evaluator, which aborts the run.
    pub fn run<F>(
        problem: &Problem,
        config: &GpConfig,
        operators: GpOperators<'_>,
        report: F,
    ) -> Result<GpResult>
    where
        F: FnMut(&GenerationReport<'_>),
    {
        Self::run_with_cancel(problem, config, operators, None, report)
    }

    /// Runs the GP loop with an optional cancellation token.
    ///
    /// If `cancel` is set, offspring workers stop at their next attempt and
    /// the run returns after reporting the current generation.
    pub fn run_with_cancel<F>(
        problem: &Problem,
        config: &GpConfig,
        operators: GpOperators<'_>,
        cancel: Option<Arc<AtomicBool>>,
        mut report: F,
    ) -> Result<GpResult>
    where
        F: FnMut(&GenerationReport<'_>),
    {
        config.validate()?;
        let start = Instant::now();
        let pool = config
            .threads
            .map(|n| ThreadPoolBuilder::new().num_threads(n).build())
            .transpose()?;

        let GpOperators {
            creator,
            coefficient_initializer,
            evaluator,
            generator,
            reinserter,
        } = operators;

        let mut rng = match config.seed {
            Some(seed) => create_rng(seed),
            None => create_rng(rand::random()),
        };
        info!(
            "starting GP run: population {}, pool {}, generations {}, budget {}",
            config.population_size, config.pool_size, config.generations, config.evaluations
        );

        // 1. Create the initial population
        let objectives = evaluator.objectives();
        let seeds = draw_seeds(&mut rng, config.population_size);
        let mut parents: Vec<Individual> = in_pool(pool.as_ref(), || {
            seeds
                .par_iter()
                .map(|&seed| {
                    let mut rng = create_rng(seed);
                    let mut tree = creator.create(&mut rng, problem.primitive_set(), problem.inputs());
                    coefficient_initializer.initialize(&mut rng, &mut tree);
                    Individual::new(tree, objectives)
                })
                .collect::<Vec<_>>()
        });

        // 2. Evaluate it
        let seeds = draw_seeds(&mut rng, config.population_size);
        in_pool(pool.as_ref(), || {
            parents
                .par_iter_mut()
                .zip(seeds.par_iter())
                .try_for_each(|(individual, &seed)| -> Result<()> {
                    let mut rng = create_rng(seed);
                    let mut fitness = evaluator.evaluate(&mut rng, individual)?;
                    sanitize(&mut fitness);
                    individual.fitness = fitness;
                    Ok(())
                })
        })?;

        // 3. Generational loop
        let mut offspring: Vec<Individual> = parents[..config.pool_size].to_vec();
        let mut fitness_history = Vec::new();
        let mut termination = Termination::Generations;
        let mut generations = 0;

        for generation in 0..config.generations {
            let seeds = draw_seeds(&mut rng, config.pool_size);
            let best = find_best(&parents);
            let best_fitness = parents[best].primary();
            fitness_history.push(best_fitness);

            let stop = if best_fitness.abs() < CONVERGENCE_THRESHOLD {
                Some(Termination::Converged)
            } else {
                check_stop(config, evaluator, &*generator, cancel.as_deref(), start)
            };

            let counters = evaluator.counters();
            debug!(
                "generation {generation}: best {best_fitness:.6e}, length {}, evaluations {}",
                parents[best].genotype.len(),
                counters.fitness
            );
            report(&GenerationReport {
                generation,
                best: &parents[best],
                parents: &parents,
                counters,
                elapsed: start.elapsed(),
            });
            if let Some(reason) = stop {
                termination = reason;
                break;
            }

            // Elitism: slot 0 always holds the best parent
            offspring[0] = parents[best].clone();
            generator.prepare(&mut parents);

            let generator: &dyn OffspringGenerator = &*generator;
            let stop_flag = AtomicBool::new(false);
            let parents_ref = &parents;
            let children: Vec<Option<Individual>> = in_pool(pool.as_ref(), || {
                seeds[1..]
                    .par_iter()
                    .map(|&seed| -> Result<Option<Individual>> {
                        let mut rng = create_rng(seed);
                        while !stop_flag.load(Ordering::Relaxed) {
                            if check_stop(config, evaluator, generator, cancel.as_deref(), start)
                                .is_some()
                            {
                                stop_flag.store(true, Ordering::Relaxed);
                                break;
                            }
                            let child = generator.generate(
                                &mut rng,
                                evaluator,
                                parents_ref,
                                config.crossover_probability,
                                config.mutation_probability,
                            )?;
                            if child.is_some() {
                                return Ok(child);
                            }
                        }
                        Ok(None)
                    })
                    .collect::<Result<Vec<_>>>()
            })?;

            // Backfill slots left empty by an early stop
            for (i, child) in children.into_iter().enumerate() {
                let slot = i + 1;
                offspring[slot] = child.unwrap_or_else(|| parents[slot].clone());
            }

            reinserter.reinsert(&mut rng, &mut parents, &mut offspring);
            generations = generation + 1;
        }

        let best = parents[find_best(&parents)].clone();
        let counters = evaluator.counters();
        let elapsed = start.elapsed();
        info!(
            "GP run finished: {termination:?} after {generations} generations, best {:.6e}, {} evaluations in {:.2?}",
            best.primary(),
            counters.fitness,
            elapsed
        );

        Ok(GpResult {
            best,
            generations,
            termination,
            fitness_history,
            counters,
            elapsed,
        })
    }
}

/// Runs `f` inside `pool` when given, on the global rayon pool otherwise.
fn in_pool<R, F>(pool: Option<&ThreadPool>, f: F) -> R
where
    R: Send,
    F: FnOnce() -> R + Send,
{
    match pool {
        Some(pool) => pool.install(f),
        None => f(),
    }
}

/// Checks every stop condition except convergence.
fn check_stop(
    config: &GpConfig,
    evaluator: &dyn Evaluator,
    generator: &dyn OffspringGenerator,
    cancel: Option<&AtomicBool>,
    start: Instant,
) -> Option<Termination> {
    if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
        return Some(Termination::Cancelled);
    }
    if evaluator.counters().fitness >= config.evaluations {
        return Some(Termination::Budget);
    }
    if let Some(ms) = config.time_limit_ms {
        if start.elapsed() >= Duration::from_millis(ms) {
            return Some(Termination::TimeLimit);
        }
    }
    if generator.terminate() {
        return Some(Termination::Generator);
    }
    None
}

/// Index of the first individual with the lowest primary fitness.
fn find_best(population: &[Individual]) -> usize {
    let mut best = 0;
    for (i, individual) in population.iter().enumerate().skip(1) {
        if individual.primary() < population[best].primary() {
            best = i;
        }
    }
    best
}

// ============================================================================
// Tests
// ============================================================================

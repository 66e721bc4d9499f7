//! GP configuration.
//!
//! [`GpConfig`] holds all parameters that control the evolutionary loop.

use crate::error::{Error, Result};

/// Configuration for the genetic programming loop.
///
/// # Defaults
///
/// ```
/// use u_symreg::gp::GpConfig;
///
/// let config = GpConfig::default();
/// assert_eq!(config.population_size, 1000);
/// assert_eq!(config.generations, 1000);
/// assert_eq!(config.evaluations, 1_000_000);
/// ```
///
/// # Builder Pattern
///
/// ```
/// use u_symreg::gp::GpConfig;
///
/// let config = GpConfig::default()
///     .with_population_size(200)
///     .with_pool_size(200)
///     .with_iterations(5)
///     .with_mutation_probability(0.1)
///     .with_seed(42);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GpConfig {
    /// Number of parents kept between generations.
    pub population_size: usize,

    /// Number of offspring produced per generation (at most
    /// `population_size`). Slot 0 holds the elite. With a pool smaller than
    /// the population, [`ReplaceAll`](crate::gp::ReplaceAll) overwrites only
    /// the first `pool_size` parents and the rest survive unchanged.
    pub pool_size: usize,

    /// Maximum number of generations.
    pub generations: usize,

    /// Fitness-evaluation budget for the whole run.
    ///
    /// Checked cooperatively by the offspring workers, so a parallel run may
    /// overshoot it by a few evaluations.
    pub evaluations: usize,

    /// Local-optimization iterations per evaluation (0 disables it).
    pub iterations: usize,

    /// Probability of recombining two parents (0.0–1.0).
    pub crossover_probability: f64,

    /// Probability of mutating a child (0.0–1.0).
    pub mutation_probability: f64,

    /// Optional wall-clock time limit in milliseconds.
    ///
    /// `None` disables time-based termination (the default).
    pub time_limit_ms: Option<u64>,

    /// Random seed for reproducibility.
    ///
    /// `None` uses a random seed.
    pub seed: Option<u64>,

    /// Size of a dedicated worker pool; `None` uses the global rayon pool.
    pub threads: Option<usize>,
}

impl Default for GpConfig {
    fn default() -> Self {
        Self {
            population_size: 1000,
            pool_size: 1000,
            generations: 1000,
            evaluations: 1_000_000,
            iterations: 0,
            crossover_probability: 1.0,
            mutation_probability: 0.25,
            time_limit_ms: None,
            seed: None,
            threads: None,
        }
    }
}

impl GpConfig {
    /// Sets the population size.
    pub fn with_population_size(mut self, n: usize) -> Self {
        self.population_size = n;
        self
    }

    /// Sets the offspring pool size.
    pub fn with_pool_size(mut self, n: usize) -> Self {
        self.pool_size = n;
        self
    }

    /// Sets the generation cap.
    pub fn with_generations(mut self, n: usize) -> Self {
        self.generations = n;
        self
    }

    /// Sets the fitness-evaluation budget.
    pub fn with_evaluations(mut self, n: usize) -> Self {
        self.evaluations = n;
        self
    }

    /// Sets the local-optimization iterations per evaluation.
    pub fn with_iterations(mut self, n: usize) -> Self {
        self.iterations = n;
        self
    }

    /// Sets the crossover probability.
    pub fn with_crossover_probability(mut self, p: f64) -> Self {
        self.crossover_probability = p.clamp(0.0, 1.0);
        self
    }

    /// Sets the mutation probability.
    pub fn with_mutation_probability(mut self, p: f64) -> Self {
        self.mutation_probability = p.clamp(0.0, 1.0);
        self
    }

    /// Sets the wall-clock time limit in milliseconds.
    pub fn with_time_limit_ms(mut self, ms: u64) -> Self {
        self.time_limit_ms = Some(ms);
        self
    }

    /// Sets the random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Runs on a dedicated pool of `n` threads.
    pub fn with_threads(mut self, n: usize) -> Self {
        self.threads = Some(n);
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] describing the first invalid
    /// parameter.
    pub fn validate(&self) -> Result<()> {
        if self.population_size < 1 {
            return Err(Error::InvalidConfig("population_size must be at least 1".into()));
        }
        if self.pool_size < 1 || self.pool_size > self.population_size {
            return Err(Error::InvalidConfig(format!(
                "pool_size must be in 1..={}, got {}",
                self.population_size, self.pool_size
            )));
        }
        if self.generations == 0 {
            return Err(Error::InvalidConfig("generations must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.crossover_probability)
            || !(0.0..=1.0).contains(&self.mutation_probability)
        {
            return Err(Error::InvalidConfig("probabilities must lie in [0, 1]".into()));
        }
        if self.time_limit_ms == Some(0) {
            return Err(Error::InvalidConfig("time_limit_ms must be positive or None".into()));
        }
        if self.threads == Some(0) {
            return Err(Error::InvalidConfig("threads must be positive or None".into()));
        }
        Ok(())
    }
}

//! Genetic programming for symbolic regression.
//!
//! The evolutionary loop in [`GpRunner`] is a fixed skeleton; every strategy
//! it drives is a trait object supplied by the caller through
//! [`GpOperators`]. The submodules provide the usual choices.
//!
//! # Core Traits
//!
//! - [`Creator`], [`CoefficientInitializer`]: build the initial population
//! - [`Evaluator`]: objective values, possibly after local optimization
//! - [`Selector`], [`Crossover`], [`Mutation`]: variation
//! - [`OffspringGenerator`]: one evaluated child per call
//! - [`Reinserter`]: merges offspring into the population
//!
//! # Key Types
//!
//! - [`GpConfig`]: Algorithm parameters (population, budget, probabilities)
//! - [`Individual`]: Expression tree plus objective values
//! - [`GpRunner`]: Executes the evolutionary loop
//! - [`GpResult`]: Final result with statistics
//!
//! # References
//!
//! - Koza (1992), *Genetic Programming*
//! - Kommenda et al. (2020), "Parameter identification for symbolic
//!   regression using nonlinear least squares"
//! - Burlacu, Kronberger & Kommenda (2020), "Operon C++: an efficient genetic
//!   programming framework for symbolic regression"

mod config;
mod creator;
mod evaluator;
mod generator;
mod operators;
mod reinserter;
mod runner;
mod selection;
mod types;

pub use config::GpConfig;
pub use creator::{
    BalancedTreeCreator, GrowTreeCreator, NormalCoefficientInitializer,
    UniformCoefficientInitializer,
};
pub use evaluator::{
    linear_scaling, ErrorMetric, LengthEvaluator, MultiEvaluator, RegressionEvaluator,
};
pub use generator::{
    BasicOffspringGenerator, BroodOffspringGenerator, OffspringSelectionGenerator,
};
pub use operators::{
    ChangeFunctionMutation, ChangeVariableMutation, InsertSubtreeMutation, MultiMutation,
    OnePointMutation, RemoveSubtreeMutation, ReplaceSubtreeMutation, SubtreeCrossover,
};
pub use reinserter::{KeepBest, ReplaceAll, ReplaceWorst};
pub use runner::{
    GenerationReport, GpOperators, GpResult, GpRunner, Termination, CONVERGENCE_THRESHOLD,
};
pub use selection::{
    CrowdedTournamentSelector, ProportionalSelector, RankSelector, TournamentSelector,
};
pub use types::{
    sanitize, CoefficientInitializer, Creator, Crossover, EvaluationCounters, Evaluator,
    Individual, Mutation, OffspringGenerator, Reinserter, Selector, WORST_FITNESS,
};

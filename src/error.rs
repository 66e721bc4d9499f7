//! Error types shared by the interpreter, the evaluators and the GP runner.
//!
//! Numeric degeneracy (NaN/Inf fitness) is *not* an error: evaluators absorb it
//! by substituting [`WORST_FITNESS`](crate::gp::WORST_FITNESS). Broken tree
//! invariants are programming errors and panic at construction; the
//! [`Error::InvalidTree`] variant is only produced by explicit validation.

use crate::tree::NodeKind;
use thiserror::Error;

/// Errors surfaced to the caller of the interpreter, evaluators or runner.
#[derive(Error, Debug)]
pub enum Error {
    /// The reverse-mode rule for this kind/arity combination does not exist.
    #[error("derivative of {kind} with {arity} children is not supported")]
    UnsupportedDerivative {
        /// Kind of the offending node.
        kind: NodeKind,
        /// Its arity.
        arity: usize,
    },

    /// A configuration parameter is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A tree failed [`Tree::validate`](crate::tree::Tree::validate).
    #[error("invalid tree: {0}")]
    InvalidTree(String),

    /// A variable node references a hash that is not a dataset column.
    #[error("unknown variable hash {0:#018x}")]
    UnknownVariable(u64),

    /// A variable name is not a dataset column.
    #[error("unknown variable `{0}`")]
    UnknownVariableName(String),

    /// A row range does not fit in the dataset.
    #[error("row range {start}..{end} exceeds the {rows} available rows")]
    RangeOutOfBounds {
        /// Range start.
        start: usize,
        /// Range end (exclusive).
        end: usize,
        /// Rows in the dataset.
        rows: usize,
    },

    /// The training and test ranges share rows.
    #[error("training rows {training:?} overlap test rows {test:?}")]
    OverlappingRanges {
        /// Training range.
        training: std::ops::Range<usize>,
        /// Test range.
        test: std::ops::Range<usize>,
    },

    /// Externally supplied coefficients do not match the tree.
    #[error("expected {expected} coefficients, got {actual}")]
    CoefficientMismatch {
        /// Coefficients in the tree.
        expected: usize,
        /// Coefficients supplied.
        actual: usize,
    },

    /// The dataset columns are malformed.
    #[error("invalid dataset: {0}")]
    InvalidDataset(String),

    /// The dedicated worker pool could not be built.
    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

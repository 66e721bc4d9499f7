//! Symbolic regression by genetic programming.
//!
//! Provides the building blocks of a tree-based GP system for regression:
//!
//! - **Trees**: Expressions stored as flat postorder node sequences,
//!   navigated through per-node subtree lengths instead of pointers.
//! - **Interpreter**: Batched forward evaluation over dataset rows and
//!   reverse-mode differentiation with respect to tree coefficients.
//! - **Optimizer**: Levenberg-Marquardt tuning of coefficients on the
//!   interpreter's Jacobian.
//! - **Sorting**: Non-dominated sorting (dominance degree, fast
//!   non-dominated sort) and crowding distance for multi-objective runs.
//! - **GP**: A data-parallel evolutionary loop with pluggable creators,
//!   evaluators, selectors, variation operators and reinserters.
//!
//! # Example
//!
//! ```
//! use u_symreg::dataset::{variable_hash, Dataset};
//! use u_symreg::interpreter::Interpreter;
//! use u_symreg::tree::{Node, NodeKind, Tree};
//!
//! let ds = Dataset::new(vec![
//!     ("x1".into(), vec![1.0, 2.0]),
//!     ("x2".into(), vec![2.0, 5.0]),
//! ])?;
//! let tree = Tree::new(vec![
//!     Node::variable(variable_hash("x2"), 1.0),
//!     Node::variable(variable_hash("x1"), 1.0),
//!     Node::new(NodeKind::Add),
//! ]);
//! let values: Vec<f64> = Interpreter::evaluate(&tree, &ds, 0..2, None)?;
//! assert_eq!(values, vec![3.0, 7.0]);
//! # Ok::<(), u_symreg::Error>(())
//! ```

pub mod dataset;
pub mod error;
pub mod gp;
pub mod interpreter;
pub mod optimizer;
pub mod random;
pub mod sorting;
pub mod tree;

pub use error::{Error, Result};

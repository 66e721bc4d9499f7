//! Expression trees and the primitive set.
//!
//! A [`Tree`] is a contiguous postorder sequence of [`Node`]s; every node
//! records the size of its subtree (`length`), which is all that is needed to
//! find children and subtrees by index arithmetic. The [`PrimitiveSet`]
//! decides which [`NodeKind`]s random construction may use.

mod genotype;
mod node;
mod primitive_set;

pub use genotype::{Children, Tree};
pub use node::{Node, NodeKind};
pub use primitive_set::{Primitive, PrimitiveSet};

//! Flattened postorder expression tree.

use super::node::Node;
use crate::error::{Error, Result};
use std::ops::Range;

/// An expression stored as a postorder sequence of [`Node`]s.
///
/// Children precede their parent and the root is the last node. Child
/// position 0 of node `i` sits at `i - 1`; each further child sits right
/// before the previous sibling's subtree. Together with the per-node
/// `length`, this lets every consumer navigate the tree without pointers.
///
/// ```
/// use u_symreg::tree::{Node, NodeKind, Tree};
///
/// // x + 2 (postorder: second operand, first operand, parent)
/// let tree = Tree::new(vec![
///     Node::constant(2.0),
///     Node::variable(7, 1.0),
///     Node::new(NodeKind::Add),
/// ]);
/// assert_eq!(tree.len(), 3);
/// assert_eq!(tree.root().length, 3);
/// let children: Vec<_> = tree.children(2).collect();
/// assert_eq!(children, vec![(0, 1), (1, 0)]);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Builds a tree and derives `length` and `depth` for every node.
    ///
    /// # Panics
    /// Panics if the arities do not describe exactly one postorder tree.
    pub fn new(nodes: Vec<Node>) -> Self {
        let mut tree = Self { nodes };
        tree.update_nodes();
        tree
    }

    fn update_nodes(&mut self) {
        for i in 0..self.nodes.len() {
            let arity = self.nodes[i].arity;
            let mut length = 1;
            let mut depth = 0;
            let mut j = i;
            for _ in 0..arity {
                assert!(
                    j >= 1,
                    "node {i} ({}) has arity {arity} but too few preceding nodes",
                    self.nodes[i].kind
                );
                let child = &self.nodes[j - 1];
                length += child.length;
                depth = depth.max(child.depth);
                j -= child.length;
            }
            self.nodes[i].length = length;
            self.nodes[i].depth = depth + 1;
        }
        if let Some(root) = self.nodes.last() {
            assert_eq!(
                root.length,
                self.nodes.len(),
                "postorder sequence does not describe a single tree"
            );
        }
    }

    /// The node sequence.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Consumes the tree, returning its nodes.
    pub fn into_nodes(self) -> Vec<Node> {
        self.nodes
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The root node.
    ///
    /// # Panics
    /// Panics on an empty tree.
    pub fn root(&self) -> &Node {
        self.nodes.last().expect("empty tree has no root")
    }

    /// Height of the tree (0 for an empty tree).
    pub fn depth(&self) -> usize {
        self.nodes.last().map_or(0, |n| n.depth)
    }

    /// Iterates `(child position, child index)` pairs of node `i`.
    pub fn children(&self, i: usize) -> Children<'_> {
        Children {
            nodes: &self.nodes,
            next: i.checked_sub(1),
            position: 0,
            remaining: self.nodes[i].arity,
        }
    }

    /// Index range of the subtree rooted at `i`.
    pub fn subtree(&self, i: usize) -> Range<usize> {
        (i + 1 - self.nodes[i].length)..(i + 1)
    }

    /// Level of every node (root = 1).
    pub fn levels(&self) -> Vec<usize> {
        let mut levels = vec![1; self.nodes.len()];
        for i in (0..self.nodes.len()).rev() {
            for (_, j) in self.children(i) {
                levels[j] = levels[i] + 1;
            }
        }
        levels
    }

    /// Index of the parent of every node (`None` for the root).
    pub fn parents(&self) -> Vec<Option<usize>> {
        let mut parents = vec![None; self.nodes.len()];
        for i in 0..self.nodes.len() {
            for (_, j) in self.children(i) {
                parents[j] = Some(i);
            }
        }
        parents
    }

    /// Number of tunable coefficients.
    pub fn coefficients_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_coefficient()).count()
    }

    /// Tunable coefficients in storage order.
    pub fn coefficients(&self) -> Vec<f64> {
        self.nodes
            .iter()
            .filter(|n| n.is_coefficient())
            .map(|n| n.value)
            .collect()
    }

    /// Overwrites the tunable coefficients in storage order.
    ///
    /// # Errors
    /// Returns [`Error::CoefficientMismatch`] if `values` has the wrong length.
    pub fn set_coefficients(&mut self, values: &[f64]) -> Result<()> {
        let expected = self.coefficients_count();
        if values.len() != expected {
            return Err(Error::CoefficientMismatch {
                expected,
                actual: values.len(),
            });
        }
        for (node, &v) in self
            .nodes
            .iter_mut()
            .filter(|n| n.is_coefficient())
            .zip(values)
        {
            node.value = v;
        }
        Ok(())
    }

    /// Mutable access to the coefficient nodes, in storage order.
    pub fn coefficient_nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.iter_mut().filter(|n| n.is_coefficient())
    }

    /// Replaces the subtree rooted at `i` with `replacement`.
    pub fn replace_subtree(&self, i: usize, replacement: &[Node]) -> Tree {
        let range = self.subtree(i);
        let mut nodes = Vec::with_capacity(self.len() - range.len() + replacement.len());
        nodes.extend_from_slice(&self.nodes[..range.start]);
        nodes.extend_from_slice(replacement);
        nodes.extend_from_slice(&self.nodes[range.end..]);
        Tree::new(nodes)
    }

    /// Checks every structural invariant.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTree`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        for (i, node) in self.nodes.iter().enumerate() {
            let (min, max) = node.kind.arity_range();
            if !(min..=max).contains(&node.arity) {
                return Err(Error::InvalidTree(format!(
                    "node {i}: {} cannot have arity {}",
                    node.kind, node.arity
                )));
            }
            if node.length > i + 1 {
                return Err(Error::InvalidTree(format!(
                    "node {i}: length {} overruns the sequence",
                    node.length
                )));
            }
            let sum: usize = self.children(i).map(|(_, j)| self.nodes[j].length).sum();
            if node.length != sum + 1 {
                return Err(Error::InvalidTree(format!(
                    "node {i}: length {} != 1 + {sum}",
                    node.length
                )));
            }
        }
        if let Some(root) = self.nodes.last() {
            if root.length != self.nodes.len() {
                return Err(Error::InvalidTree(format!(
                    "root length {} != node count {}",
                    root.length,
                    self.nodes.len()
                )));
            }
        }
        Ok(())
    }
}

/// Iterator over the direct children of a node; see [`Tree::children`].
#[derive(Debug, Clone)]
pub struct Children<'a> {
    nodes: &'a [Node],
    next: Option<usize>,
    position: usize,
    remaining: usize,
}

impl Iterator for Children<'_> {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let j = self.next?;
        let item = (self.position, j);
        self.remaining -= 1;
        self.position += 1;
        self.next = j.checked_sub(self.nodes[j].length);
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

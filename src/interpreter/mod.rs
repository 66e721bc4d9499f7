//! Batch evaluation of expression trees with reverse-mode coefficient
//! gradients.
//!
//! Rows are processed in batches of [`BATCH_SIZE`]. Each node owns one column
//! of a `nodes × BATCH_SIZE` buffer; since children precede their parent in
//! postorder, a single left-to-right sweep fills the buffer and the root
//! column holds the result.
//!
//! For the Jacobian the forward buffer is kept and a second sweep runs from
//! the root to the leaves, propagating the adjoint `P` (root `P = 1`, child
//! `P = parent P × ∂parent/∂child`). The column of a coefficient is then `P`
//! of its leaf, times the input value for variable weights.
//!
//! # Example
//!
//! ```
//! use u_symreg::dataset::{variable_hash, Dataset};
//! use u_symreg::interpreter::Interpreter;
//! use u_symreg::tree::{Node, NodeKind, Tree};
//!
//! let ds = Dataset::new(vec![
//!     ("x1".to_string(), vec![1.0, 3.0]),
//!     ("x2".to_string(), vec![2.0, 4.0]),
//! ]).unwrap();
//! let tree = Tree::new(vec![
//!     Node::variable(variable_hash("x2"), 1.0),
//!     Node::variable(variable_hash("x1"), 1.0),
//!     Node::new(NodeKind::Add),
//! ]);
//! let y: Vec<f64> = Interpreter::evaluate(&tree, &ds, 0..2, None).unwrap();
//! assert_eq!(y, vec![3.0, 7.0]);
//! ```

mod forward;
mod reverse;

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::tree::{NodeKind, Tree};
use num_traits::{Float, NumCast};
use std::ops::Range;

/// Rows evaluated per batch.
pub const BATCH_SIZE: usize = 64;

/// First `rows` entries of column `j` of a batch buffer.
pub(crate) fn column<T>(buf: &[T], j: usize, rows: usize) -> &[T] {
    &buf[j * BATCH_SIZE..j * BATCH_SIZE + rows]
}

/// Dense `rows × coefficients` matrix of partial derivatives, column-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Jacobian<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T: Float> Jacobian<T> {
    fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![T::zero(); rows * cols],
        }
    }

    /// Number of rows (evaluated data points).
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns (tunable coefficients).
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Partial derivatives of every row with respect to coefficient `c`.
    pub fn column(&self, c: usize) -> &[T] {
        &self.data[c * self.rows..(c + 1) * self.rows]
    }

    /// `∂f(row) / ∂coefficient(c)`.
    pub fn get(&self, row: usize, c: usize) -> T {
        self.data[c * self.rows + row]
    }

    /// Column-major storage.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    fn column_mut(&mut self, c: usize) -> &mut [T] {
        &mut self.data[c * self.rows..(c + 1) * self.rows]
    }
}

/// Per-node data resolved once before the batch loop.
struct Prepared<'a, T> {
    params: Vec<T>,
    inputs: Vec<Option<&'a [f64]>>,
    coefficient_index: Vec<Option<usize>>,
}

fn prepare<'a, T: Float>(
    tree: &Tree,
    dataset: &'a Dataset,
    range: &Range<usize>,
    coefficients: Option<&[T]>,
) -> Result<Prepared<'a, T>> {
    if tree.is_empty() {
        return Err(Error::InvalidTree("empty tree".into()));
    }
    dataset.check_range(range)?;

    let expected = tree.coefficients_count();
    if let Some(c) = coefficients {
        if c.len() != expected {
            return Err(Error::CoefficientMismatch {
                expected,
                actual: c.len(),
            });
        }
    }

    let n = tree.len();
    let mut params = Vec::with_capacity(n);
    let mut inputs = Vec::with_capacity(n);
    let mut coefficient_index = Vec::with_capacity(n);
    let mut next = 0;
    for node in tree.nodes() {
        let index = if node.is_coefficient() {
            next += 1;
            Some(next - 1)
        } else {
            None
        };
        let param = match (index, coefficients) {
            (Some(c), Some(values)) => values[c],
            _ => <T as NumCast>::from(node.value).unwrap_or_else(T::nan),
        };
        let input = if node.kind == NodeKind::Variable {
            let values = dataset
                .values(node.hash)
                .ok_or(Error::UnknownVariable(node.hash))?;
            Some(&values[range.clone()])
        } else {
            None
        };
        params.push(param);
        inputs.push(input);
        coefficient_index.push(index);
    }

    Ok(Prepared {
        params,
        inputs,
        coefficient_index,
    })
}

/// Stateless batch interpreter, generic over `f32`/`f64`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Interpreter;

impl Interpreter {
    /// Evaluates `tree` on the rows in `range`.
    ///
    /// `coefficients`, when given, override the tree's tunable values in
    /// storage order. NaN and infinities propagate unchanged.
    ///
    /// # Errors
    /// - [`Error::InvalidTree`] for an empty tree
    /// - [`Error::RangeOutOfBounds`] if `range` exceeds the dataset
    /// - [`Error::UnknownVariable`] for a variable not in the dataset
    /// - [`Error::CoefficientMismatch`] for a wrong-sized override
    pub fn evaluate<T: Float>(
        tree: &Tree,
        dataset: &Dataset,
        range: Range<usize>,
        coefficients: Option<&[T]>,
    ) -> Result<Vec<T>> {
        let mut out = vec![T::zero(); range.len()];
        Self::evaluate_into(tree, dataset, range, coefficients, &mut out)?;
        Ok(out)
    }

    /// Like [`Interpreter::evaluate`], writing into a caller-owned buffer.
    ///
    /// # Panics
    /// Panics if `out.len() != range.len()`.
    pub fn evaluate_into<T: Float>(
        tree: &Tree,
        dataset: &Dataset,
        range: Range<usize>,
        coefficients: Option<&[T]>,
        out: &mut [T],
    ) -> Result<()> {
        assert_eq!(out.len(), range.len(), "output buffer does not match range");
        let prepared = prepare(tree, dataset, &range, coefficients)?;
        run(tree, &prepared, out, None)
    }

    /// Partial derivatives of the output with respect to every tunable
    /// coefficient, one row per data point.
    ///
    /// # Errors
    /// Those of [`Interpreter::evaluate`], plus
    /// [`Error::UnsupportedDerivative`] when the tree holds a division with
    /// more than two children.
    pub fn jacobian<T: Float>(
        tree: &Tree,
        dataset: &Dataset,
        range: Range<usize>,
        coefficients: Option<&[T]>,
    ) -> Result<Jacobian<T>> {
        Self::evaluate_with_jacobian(tree, dataset, range, coefficients).map(|(_, j)| j)
    }

    /// Output values and Jacobian from a single forward/reverse pass.
    pub fn evaluate_with_jacobian<T: Float>(
        tree: &Tree,
        dataset: &Dataset,
        range: Range<usize>,
        coefficients: Option<&[T]>,
    ) -> Result<(Vec<T>, Jacobian<T>)> {
        reverse::check_differentiable(tree)?;
        let prepared = prepare(tree, dataset, &range, coefficients)?;
        let mut out = vec![T::zero(); range.len()];
        let mut jacobian = Jacobian::zeros(range.len(), tree.coefficients_count());
        run(tree, &prepared, &mut out, Some(&mut jacobian))?;
        Ok((out, jacobian))
    }
}

fn run<T: Float>(
    tree: &Tree,
    prepared: &Prepared<'_, T>,
    out: &mut [T],
    mut jacobian: Option<&mut Jacobian<T>>,
) -> Result<()> {
    let n = tree.len();
    let root = n - 1;
    let mut primal = vec![T::zero(); n * BATCH_SIZE];
    let mut adjoint = if jacobian.is_some() {
        vec![T::zero(); n * BATCH_SIZE]
    } else {
        Vec::new()
    };
    let mut local = vec![T::zero(); BATCH_SIZE];

    let mut start = 0;
    while start < out.len() {
        let rows = BATCH_SIZE.min(out.len() - start);
        let batch = start..start + rows;

        for i in 0..n {
            let input = prepared.inputs[i].map(|x| &x[batch.clone()]);
            forward::evaluate_node(tree, i, &mut primal, rows, prepared.params[i], input);
        }
        out[batch.clone()].copy_from_slice(column(&primal, root, rows));

        if let Some(jac) = jacobian.as_deref_mut() {
            adjoint[root * BATCH_SIZE..root * BATCH_SIZE + rows].fill(T::one());
            for i in (0..n).rev() {
                for (k, j) in tree.children(i) {
                    let local = &mut local[..rows];
                    reverse::local_derivative(tree, i, k, &primal, local)?;
                    let (below, above) = adjoint.split_at_mut(i * BATCH_SIZE);
                    let parent = &above[..rows];
                    let child = &mut below[j * BATCH_SIZE..j * BATCH_SIZE + rows];
                    for ((c, &p), &d) in child.iter_mut().zip(parent).zip(local.iter()) {
                        *c = p * d;
                    }
                }
            }

            for (i, index) in prepared.coefficient_index.iter().enumerate() {
                let Some(c) = *index else { continue };
                let dest = &mut jac.column_mut(c)[batch.clone()];
                dest.copy_from_slice(column(&adjoint, i, rows));
                if let Some(x) = prepared.inputs[i] {
                    for (d, &v) in dest.iter_mut().zip(&x[batch.clone()]) {
                        *d = *d * <T as NumCast>::from(v).unwrap_or_else(T::nan);
                    }
                }
            }
        }

        start += rows;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::variable_hash;
    use crate::gp::{Creator, GrowTreeCreator};
    use crate::random::create_rng;
    use crate::tree::{Node, PrimitiveSet};
    use proptest::prelude::*;
    use rand::Rng;

    fn dataset(rows: usize) -> Dataset {
        let x1: Vec<f64> = (0..rows).map(|r| (r as f64 * 0.37).sin()).collect();
        let x2: Vec<f64> = (0..rows).map(|r| (r as f64 * 0.11).cos()).collect();
        Dataset::new(vec![("x1".into(), x1), ("x2".into(), x2)]).unwrap()
    }

    fn var(name: &str, w: f64) -> Node {
        Node::variable(variable_hash(name), w)
    }

    /// c * sin(w * x1), coefficients in storage order: [w, c].
    fn scaled_sine(w: f64, c: f64) -> Tree {
        Tree::new(vec![
            var("x1", w),
            Node::new(NodeKind::Sin),
            Node::constant(c),
            Node::new(NodeKind::Mul),
        ])
    }

    #[test]
    fn test_add_two_variables() {
        let ds = Dataset::new(vec![
            ("x1".into(), vec![1.0, 3.0]),
            ("x2".into(), vec![2.0, 4.0]),
        ])
        .unwrap();
        let tree = Tree::new(vec![var("x2", 1.0), var("x1", 1.0), Node::new(NodeKind::Add)]);
        let y: Vec<f64> = Interpreter::evaluate(&tree, &ds, 0..2, None).unwrap();
        assert_eq!(y, vec![3.0, 7.0]);
        let y: Vec<f32> = Interpreter::evaluate(&tree, &ds, 1..2, None).unwrap();
        assert_eq!(y, vec![7.0f32]);
    }

    #[test]
    fn test_analytic_quotient_by_zero_is_finite() {
        let ds = Dataset::new(vec![
            ("x1".into(), vec![2.0, -3.0]),
            ("x2".into(), vec![0.0, 0.0]),
        ])
        .unwrap();
        // aq(x1, x2): child 0 is x1
        let tree = Tree::new(vec![var("x2", 1.0), var("x1", 1.0), Node::new(NodeKind::Aq)]);
        let y: Vec<f64> = Interpreter::evaluate(&tree, &ds, 0..2, None).unwrap();
        assert_eq!(y, vec![2.0, -3.0]);
    }

    #[test]
    fn test_unary_sub_and_div() {
        let ds = Dataset::new(vec![("x1".into(), vec![2.0, 4.0])]).unwrap();
        let neg = Tree::new(vec![var("x1", 1.0), Node::function(NodeKind::Sub, 1)]);
        let inv = Tree::new(vec![var("x1", 1.0), Node::function(NodeKind::Div, 1)]);
        let y: Vec<f64> = Interpreter::evaluate(&neg, &ds, 0..2, None).unwrap();
        assert_eq!(y, vec![-2.0, -4.0]);
        let y: Vec<f64> = Interpreter::evaluate(&inv, &ds, 0..2, None).unwrap();
        assert_eq!(y, vec![0.5, 0.25]);
    }

    #[test]
    fn test_nary_fold_is_left_to_right() {
        let ds = Dataset::new(vec![("x1".into(), vec![1.0])]).unwrap();
        // children in position order: 12, 3, 2 -> (12 / 3) / 2
        let tree = Tree::new(vec![
            Node::constant(2.0),
            Node::constant(3.0),
            Node::constant(12.0),
            Node::function(NodeKind::Div, 3),
        ]);
        let y: Vec<f64> = Interpreter::evaluate(&tree, &ds, 0..1, None).unwrap();
        assert_eq!(y, vec![2.0]);
    }

    #[test]
    fn test_nan_propagates() {
        let ds = Dataset::new(vec![("x1".into(), vec![-1.0, 4.0])]).unwrap();
        let tree = Tree::new(vec![var("x1", 1.0), Node::new(NodeKind::Sqrt)]);
        let y: Vec<f64> = Interpreter::evaluate(&tree, &ds, 0..2, None).unwrap();
        assert!(y[0].is_nan());
        assert_eq!(y[1], 2.0);
    }

    #[test]
    fn test_spans_multiple_batches() {
        let ds = dataset(150);
        let tree = scaled_sine(0.5, 2.0);
        let y: Vec<f64> = Interpreter::evaluate(&tree, &ds, 10..150, None).unwrap();
        let x1 = ds.values_by_name("x1").unwrap();
        assert_eq!(y.len(), 140);
        for (r, v) in y.iter().enumerate() {
            let expected = 2.0 * (0.5 * x1[r + 10]).sin();
            assert!((v - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_coefficient_override() {
        let ds = dataset(5);
        let tree = scaled_sine(1.0, 1.0);
        let a: Vec<f64> = Interpreter::evaluate(&tree, &ds, 0..5, Some(&[0.5, 2.0])).unwrap();
        let b: Vec<f64> = Interpreter::evaluate(&scaled_sine(0.5, 2.0), &ds, 0..5, None).unwrap();
        assert_eq!(a, b);
        assert!(matches!(
            Interpreter::evaluate(&tree, &ds, 0..5, Some(&[1.0])),
            Err(Error::CoefficientMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_errors() {
        let ds = dataset(5);
        let tree = scaled_sine(1.0, 1.0);
        assert!(matches!(
            Interpreter::evaluate::<f64>(&tree, &ds, 0..6, None),
            Err(Error::RangeOutOfBounds { rows: 5, .. })
        ));
        let unknown = Tree::new(vec![var("nope", 1.0)]);
        assert!(matches!(
            Interpreter::evaluate::<f64>(&unknown, &ds, 0..5, None),
            Err(Error::UnknownVariable(_))
        ));
        assert!(matches!(
            Interpreter::evaluate::<f64>(&Tree::default(), &ds, 0..5, None),
            Err(Error::InvalidTree(_))
        ));
    }

    #[test]
    fn test_jacobian_matches_closed_form() {
        let ds = dataset(100);
        let (w, c) = (0.7, 1.3);
        let (y, jac) =
            Interpreter::evaluate_with_jacobian::<f64>(&scaled_sine(w, c), &ds, 0..100, None)
                .unwrap();
        assert_eq!((jac.rows(), jac.cols()), (100, 2));
        let x1 = ds.values_by_name("x1").unwrap();
        for r in 0..100 {
            let x = x1[r];
            assert!((y[r] - c * (w * x).sin()).abs() < 1e-12);
            assert!((jac.get(r, 0) - c * (w * x).cos() * x).abs() < 1e-12);
            assert!((jac.get(r, 1) - (w * x).sin()).abs() < 1e-12);
        }
        assert_eq!(jac.column(1)[3], jac.get(3, 1));
    }

    #[test]
    fn test_fixed_leaves_are_not_coefficients() {
        let ds = dataset(4);
        let mut fixed = Node::constant(3.0);
        fixed.optimize = false;
        let tree = Tree::new(vec![var("x1", 1.0), fixed, Node::new(NodeKind::Mul)]);
        let jac = Interpreter::jacobian::<f64>(&tree, &ds, 0..4, None).unwrap();
        assert_eq!(jac.cols(), 1);
        let x1 = ds.values_by_name("x1").unwrap();
        for r in 0..4 {
            assert!((jac.get(r, 0) - 3.0 * x1[r]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_ternary_division_has_no_derivative() {
        let ds = dataset(4);
        let tree = Tree::new(vec![
            Node::constant(2.0),
            Node::constant(3.0),
            var("x1", 1.0),
            Node::function(NodeKind::Div, 3),
        ]);
        assert!(Interpreter::evaluate::<f64>(&tree, &ds, 0..4, None).is_ok());
        assert!(matches!(
            Interpreter::jacobian::<f64>(&tree, &ds, 0..4, None),
            Err(Error::UnsupportedDerivative { kind: NodeKind::Div, arity: 3 })
        ));
    }

    /// Central difference of every row w.r.t. coefficient `c` with step `h`.
    fn central_difference(tree: &Tree, ds: &Dataset, rows: Range<usize>, c: usize, h: f64) -> Vec<f64> {
        let base = tree.coefficients();
        let mut plus = base.clone();
        let mut minus = base;
        plus[c] += h;
        minus[c] -= h;
        let fp: Vec<f64> = Interpreter::evaluate(tree, ds, rows.clone(), Some(&plus)).unwrap();
        let fm: Vec<f64> = Interpreter::evaluate(tree, ds, rows, Some(&minus)).unwrap();
        fp.iter().zip(&fm).map(|(p, m)| (p - m) / (2.0 * h)).collect()
    }

    /// Largest absolute node value per row, infinite where any node is not
    /// finite.
    fn node_magnitudes(tree: &Tree, ds: &Dataset, rows: Range<usize>) -> Vec<f64> {
        let mut magnitude = vec![0.0f64; rows.len()];
        for i in 0..tree.len() {
            let branch = Tree::new(tree.nodes()[tree.subtree(i)].to_vec());
            let values: Vec<f64> = Interpreter::evaluate(&branch, ds, rows.clone(), None).unwrap();
            for (m, v) in magnitude.iter_mut().zip(values) {
                *m = if v.is_finite() { m.max(v.abs()) } else { f64::INFINITY };
            }
        }
        magnitude
    }

    /// Compares every Jacobian entry with a central difference under a
    /// per-entry relative tolerance, plus a rounding floor proportional to the
    /// largest intermediate value of the row.
    ///
    /// Rows with a non-finite or extreme node value are skipped, as are
    /// entries whose difference quotients at steps `h` and `10h` disagree
    /// (a kink or singularity inside the step). Returns the number of entries
    /// compared.
    fn assert_close_to_fd(tree: &Tree, ds: &Dataset, rows: Range<usize>) -> usize {
        let jac = Interpreter::jacobian::<f64>(tree, ds, rows.clone(), None).unwrap();
        let magnitude = node_magnitudes(tree, ds, rows.clone());
        let base = tree.coefficients();
        let mut compared = 0;
        for (c, &coefficient) in base.iter().enumerate() {
            let h = 1e-6 * coefficient.abs().max(1.0);
            let fine = central_difference(tree, ds, rows.clone(), c, h);
            let coarse = central_difference(tree, ds, rows.clone(), c, 10.0 * h);
            for r in 0..rows.len() {
                if magnitude[r] >= 1e12 {
                    continue;
                }
                let noise = 1e-13 * (1.0 + magnitude[r]) / h;
                let (numeric, rough) = (fine[r], coarse[r]);
                let stable = numeric.is_finite()
                    && rough.is_finite()
                    && (numeric - rough).abs() <= 1e-3 * numeric.abs().max(rough.abs()) + noise;
                if !stable {
                    continue;
                }
                let analytic = jac.get(r, c);
                let tolerance = 1e-5 * analytic.abs().max(numeric.abs()) + noise;
                assert!(
                    (analytic - numeric).abs() <= tolerance,
                    "coefficient {c}, row {r}: {analytic} vs {numeric} (tolerance {tolerance})"
                );
                compared += 1;
            }
        }
        compared
    }

    #[test]
    fn test_unary_rules_against_finite_differences() {
        let ds = Dataset::new(vec![("x1".into(), vec![0.3, 0.55, 0.8])]).unwrap();
        for kind in NodeKind::ALL {
            let (lo, hi) = kind.arity_range();
            if kind.is_leaf() || matches!(kind, NodeKind::Ceil | NodeKind::Floor) {
                continue;
            }
            let arity = if lo == 1 { 1 } else { 2.min(hi) };
            let mut nodes = Vec::new();
            for k in 0..arity {
                nodes.push(var("x1", 0.9 + 0.1 * k as f64));
            }
            nodes.push(Node::function(kind, arity));
            let tree = Tree::new(nodes);
            let expected = 3 * tree.coefficients_count();
            assert_eq!(assert_close_to_fd(&tree, &ds, 0..3), expected, "{kind}");
        }
    }

    #[test]
    fn test_binary_rules_against_finite_differences() {
        let ds = Dataset::new(vec![
            ("x1".into(), vec![0.3, 0.55, 0.8]),
            ("x2".into(), vec![1.2, 0.7, 1.9]),
        ])
        .unwrap();
        for kind in [
            NodeKind::Add,
            NodeKind::Sub,
            NodeKind::Mul,
            NodeKind::Div,
            NodeKind::Fmin,
            NodeKind::Fmax,
            NodeKind::Aq,
            NodeKind::Pow,
        ] {
            let tree = Tree::new(vec![var("x2", 1.1), var("x1", 0.8), Node::function(kind, 2)]);
            assert_eq!(assert_close_to_fd(&tree, &ds, 0..3), 6, "{kind}");
        }
    }

    /// Every differentiable kind, leaves weighted up so trees do not
    /// saturate the length limit with unary chains.
    fn differentiable_set() -> PrimitiveSet {
        let kinds: Vec<NodeKind> = NodeKind::ALL
            .into_iter()
            .filter(|k| !matches!(k, NodeKind::Ceil | NodeKind::Floor))
            .collect();
        let mut pset = PrimitiveSet::new(&kinds);
        for kind in [NodeKind::Add, NodeKind::Mul, NodeKind::Fmin, NodeKind::Fmax] {
            pset.set_arity_limits(kind, 2, 3);
        }
        pset.set_frequency(NodeKind::Constant, 8.0);
        pset.set_frequency(NodeKind::Variable, 12.0);
        pset
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_jacobian_matches_finite_differences(seed in any::<u64>()) {
            let mut rng = create_rng(seed);
            let x1: Vec<f64> = (0..20).map(|_| rng.random_range(0.2..2.0)).collect();
            let x2: Vec<f64> = (0..20).map(|_| rng.random_range(0.2..2.0)).collect();
            let ds = Dataset::new(vec![("x1".into(), x1), ("x2".into(), x2)]).unwrap();

            let creator = GrowTreeCreator { max_depth: 8, max_length: 30 };
            let mut tree = creator.create(&mut rng, &differentiable_set(), ds.variables());
            for node in tree.coefficient_nodes_mut() {
                node.value = rng.random_range(0.25..1.5);
            }
            prop_assert!(tree.len() <= 30);
            assert_close_to_fd(&tree, &ds, 0..20);
        }
    }
}

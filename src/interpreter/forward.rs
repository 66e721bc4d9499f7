//! Forward (primal) rules, one per [`NodeKind`].

use super::{column, BATCH_SIZE};
use crate::tree::{NodeKind, Tree};
use num_traits::{Float, NumCast};

/// Computes column `i` of `primal` from its children's columns.
///
/// `primal` holds one `BATCH_SIZE` column per node; only the first `rows`
/// entries of each column are meaningful. `param` is the node's coefficient
/// and `input` the slice of the referenced input column for variables.
pub(crate) fn evaluate_node<T: Float>(
    tree: &Tree,
    i: usize,
    primal: &mut [T],
    rows: usize,
    param: T,
    input: Option<&[f64]>,
) {
    let (done, rest) = primal.split_at_mut(i * BATCH_SIZE);
    let done: &[T] = done;
    let out = &mut rest[..rows];
    let node = &tree.nodes()[i];
    let arg = move |k: usize| {
        let j = tree.children(i).nth(k).map_or(0, |(_, j)| j);
        column(done, j, rows)
    };

    match node.kind {
        NodeKind::Constant => out.fill(param),
        NodeKind::Variable => {
            if let Some(x) = input {
                for (o, &v) in out.iter_mut().zip(x) {
                    *o = param * <T as NumCast>::from(v).unwrap_or_else(T::nan);
                }
            }
        }
        NodeKind::Add => fold(tree, i, done, out, |a| a, |a, b| a + b),
        NodeKind::Sub => fold(tree, i, done, out, |a| -a, |a, b| a - b),
        NodeKind::Mul => fold(tree, i, done, out, |a| a, |a, b| a * b),
        NodeKind::Div => fold(tree, i, done, out, T::recip, |a, b| a / b),
        NodeKind::Fmin => fold(tree, i, done, out, |a| a, T::min),
        NodeKind::Fmax => fold(tree, i, done, out, |a| a, T::max),
        NodeKind::Aq => binary(out, arg(0), arg(1), |a, b| a / (T::one() + b * b).sqrt()),
        NodeKind::Pow => binary(out, arg(0), arg(1), T::powf),
        NodeKind::Abs => unary(out, arg(0), T::abs),
        NodeKind::Acos => unary(out, arg(0), T::acos),
        NodeKind::Asin => unary(out, arg(0), T::asin),
        NodeKind::Atan => unary(out, arg(0), T::atan),
        NodeKind::Cbrt => unary(out, arg(0), T::cbrt),
        NodeKind::Ceil => unary(out, arg(0), T::ceil),
        NodeKind::Cos => unary(out, arg(0), T::cos),
        NodeKind::Cosh => unary(out, arg(0), T::cosh),
        NodeKind::Exp => unary(out, arg(0), T::exp),
        NodeKind::Floor => unary(out, arg(0), T::floor),
        NodeKind::Log => unary(out, arg(0), T::ln),
        NodeKind::Logabs => unary(out, arg(0), |a| a.abs().ln()),
        NodeKind::Log1p => unary(out, arg(0), T::ln_1p),
        NodeKind::Sin => unary(out, arg(0), T::sin),
        NodeKind::Sinh => unary(out, arg(0), T::sinh),
        NodeKind::Sqrt => unary(out, arg(0), T::sqrt),
        NodeKind::Sqrtabs => unary(out, arg(0), |a| a.abs().sqrt()),
        NodeKind::Square => unary(out, arg(0), |a| a * a),
        NodeKind::Tan => unary(out, arg(0), T::tan),
        NodeKind::Tanh => unary(out, arg(0), T::tanh),
    }
}

fn unary<T: Float>(out: &mut [T], a: &[T], f: impl Fn(T) -> T) {
    for (o, &x) in out.iter_mut().zip(a) {
        *o = f(x);
    }
}

fn binary<T: Float>(out: &mut [T], a: &[T], b: &[T], f: impl Fn(T, T) -> T) {
    for ((o, &x), &y) in out.iter_mut().zip(a).zip(b) {
        *o = f(x, y);
    }
}

/// Left fold over all children; `single` handles the unary case.
fn fold<T: Float>(
    tree: &Tree,
    i: usize,
    done: &[T],
    out: &mut [T],
    single: impl Fn(T) -> T,
    f: impl Fn(T, T) -> T,
) {
    let rows = out.len();
    let mut children = tree.children(i).map(|(_, j)| column(done, j, rows));
    let Some(first) = children.next() else {
        return;
    };
    if tree.nodes()[i].arity == 1 {
        unary(out, first, single);
        return;
    }
    out.copy_from_slice(first);
    for c in children {
        for (o, &x) in out.iter_mut().zip(c) {
            *o = f(*o, x);
        }
    }
}

//! Reverse-mode rules: the local derivative of a node with respect to one of
//! its children, expressed with cached forward values only.

use super::column;
use crate::error::{Error, Result};
use crate::tree::{NodeKind, Tree};
use num_traits::Float;

/// Fails fast on nodes whose derivative rule does not exist.
pub(crate) fn check_differentiable(tree: &Tree) -> Result<()> {
    match tree
        .nodes()
        .iter()
        .find(|n| n.kind == NodeKind::Div && n.arity > 2)
    {
        Some(n) => Err(Error::UnsupportedDerivative {
            kind: n.kind,
            arity: n.arity,
        }),
        None => Ok(()),
    }
}

/// Writes `∂f_i / ∂c_k` (child position `k`) into `out`, row by row.
///
/// `primal` must hold the forward values of every node of the batch.
pub(crate) fn local_derivative<T: Float>(
    tree: &Tree,
    i: usize,
    k: usize,
    primal: &[T],
    out: &mut [T],
) -> Result<()> {
    let rows = out.len();
    let node = &tree.nodes()[i];
    let f = column(primal, i, rows);
    let child = move |p: usize| {
        let j = tree.children(i).nth(p).map_or(0, |(_, j)| j);
        column(primal, j, rows)
    };
    let a = child(k);
    let one = T::one();
    let two = one + one;

    match node.kind {
        NodeKind::Add => out.fill(one),
        NodeKind::Sub => {
            let sign = if k == 0 && node.arity > 1 { one } else { -one };
            out.fill(sign);
        }
        NodeKind::Mul => {
            out.fill(one);
            for (p, j) in tree.children(i) {
                if p != k {
                    for (o, &v) in out.iter_mut().zip(column(primal, j, rows)) {
                        *o = *o * v;
                    }
                }
            }
        }
        NodeKind::Div => match (node.arity, k) {
            (1, _) => map(out, a, |x| -(x * x).recip()),
            (2, 0) => map(out, child(1), T::recip),
            (2, _) => map2(out, child(0), a, |x, y| -x / (y * y)),
            (arity, _) => {
                return Err(Error::UnsupportedDerivative {
                    kind: node.kind,
                    arity,
                })
            }
        },
        NodeKind::Fmin | NodeKind::Fmax => {
            map2(out, f, a, |r, x| if r == x { one } else { T::zero() });
        }
        NodeKind::Aq => {
            if k == 0 {
                map(out, child(1), |y| (one + y * y).sqrt().recip());
            } else {
                map2(out, child(0), a, |x, y| {
                    let s = one + y * y;
                    -x * y / (s * s.sqrt())
                });
            }
        }
        NodeKind::Pow => {
            if k == 0 {
                map2(out, a, child(1), |x, y| y * x.powf(y - one));
            } else {
                map2(out, f, child(0), |r, x| r * x.ln());
            }
        }
        NodeKind::Abs => map(out, a, sign),
        NodeKind::Acos => map(out, a, |x| -(one - x * x).sqrt().recip()),
        NodeKind::Asin => map(out, a, |x| (one - x * x).sqrt().recip()),
        NodeKind::Atan => map(out, a, |x| (one + x * x).recip()),
        NodeKind::Cbrt => map(out, f, |r| ((two + one) * r * r).recip()),
        NodeKind::Ceil | NodeKind::Floor => out.fill(T::zero()),
        NodeKind::Cos => map(out, a, |x| -x.sin()),
        NodeKind::Cosh => map(out, a, T::sinh),
        NodeKind::Exp => out.copy_from_slice(f),
        NodeKind::Log | NodeKind::Logabs => map(out, a, T::recip),
        NodeKind::Log1p => map(out, a, |x| (one + x).recip()),
        NodeKind::Sin => map(out, a, T::cos),
        NodeKind::Sinh => map(out, a, T::cosh),
        NodeKind::Sqrt => map(out, f, |r| (two * r).recip()),
        NodeKind::Sqrtabs => map2(out, a, f, |x, r| sign(x) / (two * r)),
        NodeKind::Square => map(out, a, |x| two * x),
        NodeKind::Tan => map(out, f, |r| one + r * r),
        NodeKind::Tanh => map(out, f, |r| one - r * r),
        NodeKind::Constant | NodeKind::Variable => out.fill(T::zero()),
    }
    Ok(())
}

fn sign<T: Float>(x: T) -> T {
    if x > T::zero() {
        T::one()
    } else if x < T::zero() {
        -T::one()
    } else {
        T::zero()
    }
}

fn map<T: Float>(out: &mut [T], a: &[T], f: impl Fn(T) -> T) {
    for (o, &x) in out.iter_mut().zip(a) {
        *o = f(x);
    }
}

fn map2<T: Float>(out: &mut [T], a: &[T], b: &[T], f: impl Fn(T, T) -> T) {
    for ((o, &x), &y) in out.iter_mut().zip(a).zip(b) {
        *o = f(x, y);
    }
}

//! Enabled primitive kinds with sampling weights and arity limits.

use super::node::{Node, NodeKind};
use rand::{Rng, RngCore};

/// Per-kind configuration inside a [`PrimitiveSet`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Primitive {
    /// Relative sampling weight.
    pub frequency: f64,
    /// Whether the kind may be sampled.
    pub enabled: bool,
    /// Smallest arity to sample.
    pub min_arity: usize,
    /// Largest arity to sample.
    pub max_arity: usize,
}

/// The grammar constraining random tree construction.
///
/// Disabling a kind removes it from sampling only; trees that already contain
/// it stay valid and evaluable.
///
/// ```
/// use u_symreg::tree::{NodeKind, PrimitiveSet};
///
/// let mut pset = PrimitiveSet::arithmetic();
/// assert!(pset.is_enabled(NodeKind::Div));
/// pset.disable(NodeKind::Div);
/// pset.enable(NodeKind::Exp);
/// assert_eq!(pset.function_arity_limits(), Some((1, 2)));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PrimitiveSet {
    primitives: Vec<Primitive>,
}

impl PrimitiveSet {
    /// Kinds enabled by [`PrimitiveSet::arithmetic`].
    pub const ARITHMETIC: [NodeKind; 6] = [
        NodeKind::Add,
        NodeKind::Sub,
        NodeKind::Mul,
        NodeKind::Div,
        NodeKind::Constant,
        NodeKind::Variable,
    ];

    /// A set with exactly `kinds` enabled, all with frequency 1.
    pub fn new(kinds: &[NodeKind]) -> Self {
        let primitives = NodeKind::ALL
            .iter()
            .map(|&kind| {
                let arity = kind.default_arity();
                Primitive {
                    frequency: 1.0,
                    enabled: kinds.contains(&kind),
                    min_arity: arity,
                    max_arity: arity,
                }
            })
            .collect();
        Self { primitives }
    }

    /// `add sub mul div constant variable`.
    pub fn arithmetic() -> Self {
        Self::new(&Self::ARITHMETIC)
    }

    /// Every kind enabled.
    pub fn full() -> Self {
        Self::new(&NodeKind::ALL)
    }

    /// Configuration of a kind.
    pub fn primitive(&self, kind: NodeKind) -> &Primitive {
        &self.primitives[kind.index()]
    }

    /// Whether `kind` may be sampled.
    pub fn is_enabled(&self, kind: NodeKind) -> bool {
        self.primitives[kind.index()].enabled
    }

    /// Enables `kind`.
    pub fn enable(&mut self, kind: NodeKind) {
        self.primitives[kind.index()].enabled = true;
    }

    /// Disables `kind`.
    pub fn disable(&mut self, kind: NodeKind) {
        self.primitives[kind.index()].enabled = false;
    }

    /// Sampling weight of `kind`.
    pub fn frequency(&self, kind: NodeKind) -> f64 {
        self.primitives[kind.index()].frequency
    }

    /// Sets the sampling weight of `kind` (negative values clamp to 0).
    pub fn set_frequency(&mut self, kind: NodeKind, frequency: f64) {
        self.primitives[kind.index()].frequency = frequency.max(0.0);
    }

    /// Arity limits of `kind`.
    pub fn arity_limits(&self, kind: NodeKind) -> (usize, usize) {
        let p = &self.primitives[kind.index()];
        (p.min_arity, p.max_arity)
    }

    /// Sets the sampled arity range of a variable-arity kind.
    ///
    /// # Panics
    /// Panics if the range is empty or outside [`NodeKind::arity_range`].
    pub fn set_arity_limits(&mut self, kind: NodeKind, min: usize, max: usize) {
        let (lo, hi) = kind.arity_range();
        assert!(
            lo <= min && min <= max && max <= hi,
            "{kind} cannot have arity range {min}..={max}"
        );
        let p = &mut self.primitives[kind.index()];
        p.min_arity = min;
        p.max_arity = max;
    }

    /// Enabled kinds with their frequencies.
    pub fn enabled(&self) -> impl Iterator<Item = (NodeKind, f64)> + '_ {
        NodeKind::ALL
            .into_iter()
            .zip(&self.primitives)
            .filter(|(_, p)| p.enabled)
            .map(|(k, p)| (k, p.frequency))
    }

    /// Global `(min, max)` arity over enabled function kinds, or `None` when
    /// only leaves are enabled.
    pub fn function_arity_limits(&self) -> Option<(usize, usize)> {
        NodeKind::ALL
            .into_iter()
            .zip(&self.primitives)
            .filter(|(k, p)| p.enabled && !k.is_leaf())
            .map(|(_, p)| (p.min_arity, p.max_arity))
            .reduce(|(a, b), (c, d)| (a.min(c), b.max(d)))
    }

    /// Samples an enabled kind whose arity limits intersect
    /// `[min_arity, max_arity]`, proportionally to frequency. The arity of the
    /// returned node is drawn uniformly from the intersection.
    ///
    /// Returns `None` when no enabled kind qualifies.
    pub fn sample_random_symbol(
        &self,
        rng: &mut dyn RngCore,
        min_arity: usize,
        max_arity: usize,
    ) -> Option<Node> {
        let candidates: Vec<(NodeKind, f64, usize, usize)> = NodeKind::ALL
            .into_iter()
            .zip(&self.primitives)
            .filter(|(_, p)| p.enabled && p.frequency > 0.0)
            .filter_map(|(k, p)| {
                let lo = p.min_arity.max(min_arity);
                let hi = p.max_arity.min(max_arity);
                (lo <= hi).then_some((k, p.frequency, lo, hi))
            })
            .collect();

        let total: f64 = candidates.iter().map(|c| c.1).sum();
        if candidates.is_empty() || total <= 0.0 {
            return None;
        }

        let threshold = rng.random_range(0.0..total);
        let mut cumulative = 0.0;
        let mut chosen = candidates[candidates.len() - 1];
        for &c in &candidates {
            cumulative += c.1;
            if cumulative > threshold {
                chosen = c;
                break;
            }
        }

        let (kind, _, lo, hi) = chosen;
        let arity = if lo == hi { lo } else { rng.random_range(lo..=hi) };
        Some(Node::function(kind, arity))
    }
}

impl Default for PrimitiveSet {
    fn default() -> Self {
        Self::arithmetic()
    }
}

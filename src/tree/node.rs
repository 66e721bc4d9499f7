//! Primitive kinds and tree nodes.

use std::fmt;

/// Operation tag of a tree node.
///
/// The set is closed: the forward table in
/// [`interpreter::forward`](crate::interpreter) and the derivative table in
/// the reverse-mode module both `match` exhaustively on it, so adding a kind
/// without a derivative rule does not compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeKind {
    /// Sum of all children.
    Add,
    /// Left fold of subtraction; negation when unary.
    Sub,
    /// Product of all children.
    Mul,
    /// Left fold of division; reciprocal when unary.
    Div,
    /// Minimum of all children.
    Fmin,
    /// Maximum of all children.
    Fmax,
    /// Analytic quotient `a / sqrt(1 + b²)`.
    Aq,
    /// `a ^ b`.
    Pow,
    Abs,
    Acos,
    Asin,
    Atan,
    Cbrt,
    Ceil,
    Cos,
    Cosh,
    Exp,
    Floor,
    Log,
    /// `ln |a|`.
    Logabs,
    /// `ln (1 + a)`.
    Log1p,
    Sin,
    Sinh,
    Sqrt,
    /// `sqrt |a|`.
    Sqrtabs,
    Square,
    Tan,
    Tanh,
    /// Tunable numeric leaf.
    Constant,
    /// Weighted input column.
    Variable,
}

impl NodeKind {
    /// Number of kinds.
    pub const COUNT: usize = 30;

    /// Every kind, in declaration order.
    pub const ALL: [NodeKind; Self::COUNT] = [
        NodeKind::Add,
        NodeKind::Sub,
        NodeKind::Mul,
        NodeKind::Div,
        NodeKind::Fmin,
        NodeKind::Fmax,
        NodeKind::Aq,
        NodeKind::Pow,
        NodeKind::Abs,
        NodeKind::Acos,
        NodeKind::Asin,
        NodeKind::Atan,
        NodeKind::Cbrt,
        NodeKind::Ceil,
        NodeKind::Cos,
        NodeKind::Cosh,
        NodeKind::Exp,
        NodeKind::Floor,
        NodeKind::Log,
        NodeKind::Logabs,
        NodeKind::Log1p,
        NodeKind::Sin,
        NodeKind::Sinh,
        NodeKind::Sqrt,
        NodeKind::Sqrtabs,
        NodeKind::Square,
        NodeKind::Tan,
        NodeKind::Tanh,
        NodeKind::Constant,
        NodeKind::Variable,
    ];

    /// Position of this kind in [`NodeKind::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Lower-case name, as used in primitive-set configuration strings.
    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Add => "add",
            NodeKind::Sub => "sub",
            NodeKind::Mul => "mul",
            NodeKind::Div => "div",
            NodeKind::Fmin => "fmin",
            NodeKind::Fmax => "fmax",
            NodeKind::Aq => "aq",
            NodeKind::Pow => "pow",
            NodeKind::Abs => "abs",
            NodeKind::Acos => "acos",
            NodeKind::Asin => "asin",
            NodeKind::Atan => "atan",
            NodeKind::Cbrt => "cbrt",
            NodeKind::Ceil => "ceil",
            NodeKind::Cos => "cos",
            NodeKind::Cosh => "cosh",
            NodeKind::Exp => "exp",
            NodeKind::Floor => "floor",
            NodeKind::Log => "log",
            NodeKind::Logabs => "logabs",
            NodeKind::Log1p => "log1p",
            NodeKind::Sin => "sin",
            NodeKind::Sinh => "sinh",
            NodeKind::Sqrt => "sqrt",
            NodeKind::Sqrtabs => "sqrtabs",
            NodeKind::Square => "square",
            NodeKind::Tan => "tan",
            NodeKind::Tanh => "tanh",
            NodeKind::Constant => "constant",
            NodeKind::Variable => "variable",
        }
    }

    /// Parses a [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Inclusive arity range the kind supports.
    pub fn arity_range(self) -> (usize, usize) {
        match self {
            NodeKind::Add
            | NodeKind::Sub
            | NodeKind::Mul
            | NodeKind::Div
            | NodeKind::Fmin
            | NodeKind::Fmax => (1, usize::from(u16::MAX)),
            NodeKind::Aq | NodeKind::Pow => (2, 2),
            NodeKind::Constant | NodeKind::Variable => (0, 0),
            _ => (1, 1),
        }
    }

    /// Arity a freshly created node gets.
    pub fn default_arity(self) -> usize {
        match self {
            NodeKind::Constant | NodeKind::Variable => 0,
            k if k.is_nary() || k == NodeKind::Aq || k == NodeKind::Pow => 2,
            _ => 1,
        }
    }

    /// Whether the kind folds over a variable number of children.
    pub fn is_nary(self) -> bool {
        matches!(
            self,
            NodeKind::Add
                | NodeKind::Sub
                | NodeKind::Mul
                | NodeKind::Div
                | NodeKind::Fmin
                | NodeKind::Fmax
        )
    }

    /// Whether the kind is a leaf.
    pub fn is_leaf(self) -> bool {
        matches!(self, NodeKind::Constant | NodeKind::Variable)
    }

    /// Stable identity hash for non-variable nodes.
    pub fn hash(self) -> u64 {
        crate::dataset::variable_hash(self.name())
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One primitive instance inside a [`Tree`](super::Tree).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    /// Operation tag.
    pub kind: NodeKind,
    /// Number of children.
    pub arity: usize,
    /// Size of the subtree rooted here, this node included.
    pub length: usize,
    /// Height of the subtree rooted here (1 for leaves).
    pub depth: usize,
    /// Variable hash for [`NodeKind::Variable`], [`NodeKind::hash`] otherwise.
    pub hash: u64,
    /// Constant value or variable weight; ignored by functions.
    pub value: f64,
    /// Whether `value` is a tunable coefficient.
    pub optimize: bool,
}

impl Node {
    /// A node of `kind` with its default arity.
    pub fn new(kind: NodeKind) -> Self {
        Self::function(kind, kind.default_arity())
    }

    /// A function node with an explicit arity.
    ///
    /// # Panics
    /// Panics if `arity` is outside [`NodeKind::arity_range`].
    pub fn function(kind: NodeKind, arity: usize) -> Self {
        let (min, max) = kind.arity_range();
        assert!(
            (min..=max).contains(&arity),
            "{kind} does not support arity {arity}"
        );
        Self {
            kind,
            arity,
            length: 1 + arity,
            depth: 1,
            hash: kind.hash(),
            value: 1.0,
            optimize: kind.is_leaf(),
        }
    }

    /// A tunable constant.
    pub fn constant(value: f64) -> Self {
        Self {
            value,
            ..Self::new(NodeKind::Constant)
        }
    }

    /// A weighted variable reference.
    pub fn variable(hash: u64, weight: f64) -> Self {
        Self {
            hash,
            value: weight,
            ..Self::new(NodeKind::Variable)
        }
    }

    /// Whether the node is a leaf.
    pub fn is_leaf(&self) -> bool {
        self.arity == 0
    }

    /// Whether the node carries a tunable coefficient.
    pub fn is_coefficient(&self) -> bool {
        self.kind.is_leaf() && self.optimize
    }
}

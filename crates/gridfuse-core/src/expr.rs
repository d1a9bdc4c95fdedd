//! Stencil expression trees.
//!
//! Expressions are owned tagged-union trees: arithmetic over field
//! references with compile-time-constant offsets, opaque function calls,
//! numeric constants, and named placeholder holes. The grammar is closed,
//! so every traversal is an exhaustive `match` and "unhandled expression
//! kind" is a compile-time impossibility rather than a runtime check.

use std::collections::BTreeSet;
use std::fmt;

use crate::FieldId;

/// Binary arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
}

impl BinOp {
    /// Operator symbol as emitted in target code.
    pub fn symbol(&self) -> char {
        match self {
            BinOp::Add => '+',
            BinOp::Sub => '-',
            BinOp::Mul => '*',
            BinOp::Div => '/',
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// A stencil expression tree node.
///
/// Trees are acyclic and finite; each function owns its trees outright.
/// The only post-construction mutation is placeholder substitution via
/// [`Expr::substitute_placeholder`].
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Binary arithmetic over two owned operands.
    Binary {
        /// The operator.
        op: BinOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// A read of `field` at a constant displacement from the current
    /// grid point. `offsets.len()` equals the grid dimensionality.
    FieldRef {
        /// The field being read.
        field: FieldId,
        /// Per-dimension constant displacement.
        offsets: Vec<i64>,
    },
    /// Integer constant.
    IntConst(i64),
    /// Single-precision float constant.
    F32Const(f32),
    /// Opaque external function invocation (e.g. `min`, `sqrt`).
    Call {
        /// Callee name.
        name: String,
        /// Argument expressions.
        args: Vec<Expr>,
    },
    /// A named hole to be substituted before the tree is used.
    Placeholder(String),
}

impl Expr {
    /// `lhs + rhs`.
    pub fn add(lhs: Expr, rhs: Expr) -> Expr {
        Expr::binary(BinOp::Add, lhs, rhs)
    }

    /// `lhs - rhs`.
    pub fn sub(lhs: Expr, rhs: Expr) -> Expr {
        Expr::binary(BinOp::Sub, lhs, rhs)
    }

    /// `lhs * rhs`.
    pub fn mul(lhs: Expr, rhs: Expr) -> Expr {
        Expr::binary(BinOp::Mul, lhs, rhs)
    }

    /// `lhs / rhs`.
    pub fn div(lhs: Expr, rhs: Expr) -> Expr {
        Expr::binary(BinOp::Div, lhs, rhs)
    }

    /// Build a binary node.
    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Build a field reference.
    pub fn field_ref(field: FieldId, offsets: Vec<i64>) -> Expr {
        Expr::FieldRef { field, offsets }
    }

    /// Build an opaque call.
    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Call {
            name: name.into(),
            args,
        }
    }

    /// Collect every field read anywhere in this tree, recursing through
    /// call arguments.
    pub fn collect_fields(&self, fields: &mut BTreeSet<FieldId>) {
        match self {
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_fields(fields);
                rhs.collect_fields(fields);
            }
            Expr::FieldRef { field, .. } => {
                fields.insert(*field);
            }
            Expr::IntConst(_) | Expr::F32Const(_) => {}
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_fields(fields);
                }
            }
            Expr::Placeholder(_) => {}
        }
    }

    /// The set of fields read by this tree.
    pub fn fields(&self) -> BTreeSet<FieldId> {
        let mut fields = BTreeSet::new();
        self.collect_fields(&mut fields);
        fields
    }

    /// Collect the names of outstanding placeholder holes.
    pub fn collect_placeholders(&self, names: &mut Vec<String>) {
        match self {
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_placeholders(names);
                rhs.collect_placeholders(names);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_placeholders(names);
                }
            }
            Expr::Placeholder(name) => names.push(name.clone()),
            Expr::FieldRef { .. } | Expr::IntConst(_) | Expr::F32Const(_) => {}
        }
    }

    /// Whether any placeholder remains unresolved in this tree.
    pub fn has_placeholders(&self) -> bool {
        let mut names = Vec::new();
        self.collect_placeholders(&mut names);
        !names.is_empty()
    }

    /// Replace every `Placeholder(name)` in this tree with a copy of
    /// `replacement`, in place. Returns the number of holes filled.
    ///
    /// Substitution on an owned tree is just a node swap; there is no
    /// parent-pointer surgery and nothing to free manually.
    pub fn substitute_placeholder(&mut self, name: &str, replacement: &Expr) -> usize {
        match self {
            Expr::Placeholder(hole) if hole == name => {
                *self = replacement.clone();
                1
            }
            Expr::Binary { lhs, rhs, .. } => {
                lhs.substitute_placeholder(name, replacement)
                    + rhs.substitute_placeholder(name, replacement)
            }
            Expr::Call { args, .. } => args
                .iter_mut()
                .map(|arg| arg.substitute_placeholder(name, replacement))
                .sum(),
            Expr::FieldRef { .. }
            | Expr::IntConst(_)
            | Expr::F32Const(_)
            | Expr::Placeholder(_) => 0,
        }
    }

    /// Canonical emitted literal for constant nodes, `None` otherwise.
    pub fn literal(&self) -> Option<String> {
        match self {
            Expr::IntConst(v) => Some(int_literal(*v)),
            Expr::F32Const(v) => Some(f32_literal(*v)),
            _ => None,
        }
    }

    /// Number of compute operations in this tree: one per binary node,
    /// one per call (plus the cost of its arguments). Field references
    /// and constants are free.
    pub fn op_count(&self) -> f64 {
        match self {
            Expr::Binary { lhs, rhs, .. } => 1.0 + lhs.op_count() + rhs.op_count(),
            Expr::Call { args, .. } => {
                1.0 + args.iter().map(Expr::op_count).sum::<f64>()
            }
            Expr::FieldRef { .. } | Expr::IntConst(_) | Expr::F32Const(_) => 0.0,
            Expr::Placeholder(name) => {
                panic!("unresolved placeholder `{name}` in op_count")
            }
        }
    }
}

/// Canonical source form of an integer constant.
pub(crate) fn int_literal(v: i64) -> String {
    v.to_string()
}

/// Canonical source form of a single-precision constant: always carries
/// a decimal point (or exponent) and an `f` suffix.
pub(crate) fn f32_literal(v: f32) -> String {
    let mut s = format!("{}", v);
    if !s.contains('.') && !s.contains('e') && !s.contains("inf") && !s.contains("NaN") {
        s.push_str(".0");
    }
    s.push('f');
    s
}

//! Stencil point functions and their analyses.
//!
//! A [`StencilFunction`] produces one output field from one or more
//! bounded expression alternatives (piecewise definitions, e.g. an
//! interior formula plus boundary formulas). Three read-only tree walks
//! live here: region adjustment for the tiling engine, per-dimension
//! max-offset extraction for shared-memory sizing, and flop counting for
//! the emitted throughput report.

use std::collections::BTreeSet;

use crate::{Expr, FieldId, Region};

/// One piecewise alternative: an expression plus the inclusive
/// per-dimension bounds inside which it applies.
///
/// A bound `(lower, upper)` restricts the output index `i` along its axis
/// to `lower <= i < dim_size - upper`.
#[derive(Debug, Clone)]
pub struct BoundedExpr {
    expr: Expr,
    bounds: Vec<(u32, u32)>,
}

impl BoundedExpr {
    /// Create an alternative from an expression and its bounds.
    pub fn new(expr: Expr, bounds: Vec<(u32, u32)>) -> Self {
        Self { expr, bounds }
    }

    /// The alternative's expression tree.
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Per-dimension `(lower, upper)` bound offsets.
    pub fn bounds(&self) -> &[(u32, u32)] {
        &self.bounds
    }
}

/// A stencil point function: one output field, one or more bounded
/// expression alternatives, evaluated at every grid point within bounds.
#[derive(Debug, Clone)]
pub struct StencilFunction {
    name: String,
    output: FieldId,
    alternatives: Vec<BoundedExpr>,
}

impl StencilFunction {
    /// Create a function with a single (primary) alternative.
    pub fn new(
        name: impl Into<String>,
        output: FieldId,
        expr: Expr,
        bounds: Vec<(u32, u32)>,
    ) -> Self {
        Self {
            name: name.into(),
            output,
            alternatives: vec![BoundedExpr::new(expr, bounds)],
        }
    }

    /// Append a piecewise alternative.
    pub fn with_alternative(mut self, expr: Expr, bounds: Vec<(u32, u32)>) -> Self {
        self.alternatives.push(BoundedExpr::new(expr, bounds));
        self
    }

    /// Function name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The field this function writes.
    pub fn output(&self) -> FieldId {
        self.output
    }

    /// All alternatives, primary first.
    pub fn alternatives(&self) -> &[BoundedExpr] {
        &self.alternatives
    }

    /// Bounds of the primary alternative.
    pub fn primary_bounds(&self) -> &[(u32, u32)] {
        self.alternatives[0].bounds()
    }

    /// Every field read by any alternative.
    pub fn input_fields(&self) -> BTreeSet<FieldId> {
        let mut fields = BTreeSet::new();
        for alt in &self.alternatives {
            alt.expr().collect_fields(&mut fields);
        }
        fields
    }

    /// Fill every `Placeholder(name)` hole across all alternatives.
    ///
    /// Resolving a placeholder that does not exist is a caller error and
    /// fails loudly.
    pub fn resolve_placeholder(&mut self, name: &str, replacement: &Expr) {
        let filled: usize = self
            .alternatives
            .iter_mut()
            .map(|alt| alt.expr.substitute_placeholder(name, replacement))
            .sum();
        assert!(
            filled > 0,
            "no placeholder `{name}` in function `{}`",
            self.name
        );
    }

    /// Grow `target` (the region of input field `field`) so that every
    /// read of `field` by this function is legal when the output is
    /// produced over `out_region`.
    ///
    /// `out_region` must be a snapshot taken before any growth this
    /// sub-step: the source being read from is not mutated while we
    /// compute from it.
    ///
    /// When `last_step` is set (the true final fused sub-step), a read
    /// only drives growth if `field` is recomputed within the fused group
    /// before this function runs, i.e. appears in `update_order` strictly
    /// before this function's output. Otherwise the read is serviced
    /// straight from global memory and needs no shared-memory halo.
    pub fn adjust_region(
        &self,
        field: FieldId,
        target: &mut Region,
        out_region: &Region,
        update_order: &[FieldId],
        last_step: bool,
    ) {
        if last_step {
            let pos = update_order
                .iter()
                .position(|&f| f == self.output)
                .unwrap_or_else(|| {
                    panic!(
                        "output of `{}` missing from update order",
                        self.name
                    )
                });
            if !update_order[..pos].contains(&field) {
                return;
            }
        }

        for alt in &self.alternatives {
            for_each_field_ref(alt.expr(), &mut |f, offsets| {
                if f != field {
                    return;
                }
                for dim in 0..out_region.dims() {
                    let needed = out_region.bound(dim);
                    let mut have = target.bound(dim);
                    let off = offsets[dim];

                    if needed.lower + off < have.lower {
                        let diff = have.lower - (needed.lower + off);
                        have.lower -= diff;
                        have.extent += diff;
                    }
                    if needed.upper() + off > have.upper() {
                        have.extent += needed.upper() + off - have.upper();
                    }
                    target.set_bound(dim, have);
                }
            });
        }
    }

    /// Largest negative (`left`) and positive (`right`) offsets used for
    /// any reference to `field` along `dim`, across all alternatives.
    /// Both are returned as non-negative magnitudes.
    pub fn max_offsets(&self, field: FieldId, dim: usize) -> (i64, i64) {
        let mut left = 0i64;
        let mut right = 0i64;
        for alt in &self.alternatives {
            for_each_field_ref(alt.expr(), &mut |f, offsets| {
                if f != field {
                    return;
                }
                assert!(dim < offsets.len(), "not enough offsets");
                let off = offsets[dim];
                if off < 0 {
                    left = left.max(-off);
                } else {
                    right = right.max(off);
                }
            });
        }
        (left, right)
    }

    /// Flops per evaluated point: the maximum over alternatives, a
    /// conservative bound for piecewise functions.
    pub fn flops(&self) -> f64 {
        self.alternatives
            .iter()
            .map(|alt| alt.expr().op_count())
            .fold(0.0, f64::max)
    }
}

/// Apply `visit` to every field reference in `expr`, recursing through
/// binary operands and call arguments. Unresolved placeholders must not
/// reach the analysis stage.
fn for_each_field_ref(expr: &Expr, visit: &mut impl FnMut(FieldId, &[i64])) {
    match expr {
        Expr::Binary { lhs, rhs, .. } => {
            for_each_field_ref(lhs, visit);
            for_each_field_ref(rhs, visit);
        }
        Expr::FieldRef { field, offsets } => visit(*field, offsets),
        Expr::IntConst(_) | Expr::F32Const(_) => {}
        Expr::Call { args, .. } => {
            for arg in args {
                for_each_field_ref(arg, visit);
            }
        }
        Expr::Placeholder(name) => {
            panic!("unresolved placeholder `{name}` reached analysis")
        }
    }
}

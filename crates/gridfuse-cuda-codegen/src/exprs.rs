//! Expression emission: loads and arithmetic.
//!
//! A field reference becomes a named register variable loaded once per
//! thread and per function (deduplicated by mangled identifier), then the
//! expression tree itself is printed over those variables. Loads switch
//! between global memory (field not yet produced within the fused group)
//! and the block's shared buffer (field already written this group).

use std::collections::BTreeSet;

use gridfuse_core::{Expr, FieldId, Grid};

/// Canonical register name for a `(field, offsets)` reference:
/// `A_m1`, `A_0`, `A_p2_m1`, ...
pub(crate) fn mangled_ident(name: &str, offsets: &[i64]) -> String {
    let mut ident = name.to_string();
    for &off in offsets {
        if off == 0 {
            ident.push_str("_0");
        } else if off > 0 {
            ident.push_str(&format!("_p{off}"));
        } else {
            ident.push_str(&format!("_m{}", -off));
        }
    }
    ident
}

/// `+3` / `-1` / empty for zero, for appending to an index expression.
pub(crate) fn offset_term(off: i64) -> String {
    if off == 0 {
        String::new()
    } else {
        format!("{off:+}")
    }
}

/// Print the expression tree over its load variables.
pub(crate) fn emit_expr(grid: &Grid, expr: &Expr, out: &mut String) {
    match expr {
        Expr::Binary { op, lhs, rhs } => {
            out.push('(');
            emit_expr(grid, lhs, out);
            out.push(op.symbol());
            emit_expr(grid, rhs, out);
            out.push(')');
        }
        Expr::FieldRef { field, offsets } => {
            out.push_str(&mangled_ident(grid.field(*field).name(), offsets));
        }
        lit @ (Expr::IntConst(_) | Expr::F32Const(_)) => {
            if let Some(text) = lit.literal() {
                out.push_str(&text);
            }
        }
        Expr::Call { name, args } => {
            out.push_str(name);
            out.push('(');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                emit_expr(grid, arg, out);
            }
            out.push(')');
        }
        Expr::Placeholder(name) => {
            panic!("unresolved placeholder `{name}` reached code generation")
        }
    }
}

/// Emit one register load per distinct field reference in `expr`.
///
/// `written` holds the fields already produced into shared memory during
/// this emission pass; everything else is read from global memory with
/// full address linearization.
pub(crate) fn emit_loads(
    grid: &Grid,
    expr: &Expr,
    written: &BTreeSet<FieldId>,
    idents: &mut BTreeSet<String>,
    out: &mut String,
) {
    match expr {
        Expr::Binary { lhs, rhs, .. } => {
            emit_loads(grid, lhs, written, idents, out);
            emit_loads(grid, rhs, written, idents, out);
        }
        Expr::FieldRef { field, offsets } => {
            emit_field_load(grid, *field, offsets, written, idents, out);
        }
        Expr::IntConst(_) | Expr::F32Const(_) => {}
        Expr::Call { args, .. } => {
            for arg in args {
                emit_loads(grid, arg, written, idents, out);
            }
        }
        Expr::Placeholder(name) => {
            panic!("unresolved placeholder `{name}` reached code generation")
        }
    }
}

fn emit_field_load(
    grid: &Grid,
    field: FieldId,
    offsets: &[i64],
    written: &BTreeSet<FieldId>,
    idents: &mut BTreeSet<String>,
    out: &mut String,
) {
    let f = grid.field(field);
    let ident = mangled_ident(f.name(), offsets);
    if !idents.insert(ident.clone()) {
        return;
    }
    let ty = f.element_type().type_name();

    if written.contains(&field) {
        // Shared-memory path: C array declarators run highest dimension
        // first, so index in reverse dimension order.
        out.push_str(&format!("{ty} {ident} = Shared_{}", f.name()));
        for dim in (0..offsets.len()).rev() {
            out.push_str(&format!(
                "[thislocal_{dim}+max_left_offset_{dim}{}]",
                offset_term(offsets[dim])
            ));
        }
        out.push_str(";\n");
    } else {
        out.push_str("AddrOffset = ");
        for (dim, &off) in offsets.iter().enumerate() {
            if dim > 0 {
                out.push_str(" + ");
            }
            out.push_str(&format!("(thisid_{dim}{})", offset_term(off)));
            for stride in 0..dim {
                out.push_str(&format!("*Dim_{stride}"));
            }
        }
        out.push_str(";\n");
        out.push_str(&format!("{ty} {ident} = *(In_{} + AddrOffset);\n", f.name()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridfuse_core::ElementType;

    fn grid_with_field() -> (Grid, FieldId) {
        let mut grid = Grid::new("g", 1);
        let a = grid.attach_field("A", ElementType::F32).unwrap();
        (grid, a)
    }

    #[test]
    fn test_mangled_ident() {
        assert_eq!(mangled_ident("A", &[-1]), "A_m1");
        assert_eq!(mangled_ident("A", &[0]), "A_0");
        assert_eq!(mangled_ident("A", &[2, -1]), "A_p2_m1");
    }

    #[test]
    fn test_expr_printing() {
        let (grid, a) = grid_with_field();
        let expr = Expr::mul(
            Expr::F32Const(0.5),
            Expr::add(Expr::field_ref(a, vec![-1]), Expr::field_ref(a, vec![1])),
        );
        let mut out = String::new();
        emit_expr(&grid, &expr, &mut out);
        assert_eq!(out, "(0.5f*(A_m1+A_p1))");
    }

    #[test]
    fn test_call_printing() {
        let (grid, a) = grid_with_field();
        let expr = Expr::call(
            "min",
            vec![Expr::field_ref(a, vec![0]), Expr::IntConst(3)],
        );
        let mut out = String::new();
        emit_expr(&grid, &expr, &mut out);
        assert_eq!(out, "min(A_0, 3)");
    }

    #[test]
    fn test_global_load_linearization() {
        let mut grid = Grid::new("g", 2);
        let a = grid.attach_field("A", ElementType::F32).unwrap();
        let expr = Expr::field_ref(a, vec![-1, 2]);

        let mut out = String::new();
        let mut idents = BTreeSet::new();
        emit_loads(&grid, &expr, &BTreeSet::new(), &mut idents, &mut out);

        assert!(out.contains("AddrOffset = (thisid_0-1) + (thisid_1+2)*Dim_0;"));
        assert!(out.contains("float A_m1_p2 = *(In_A + AddrOffset);"));
    }

    #[test]
    fn test_shared_load_indexing() {
        let (grid, a) = grid_with_field();
        let expr = Expr::field_ref(a, vec![-1]);

        let mut written = BTreeSet::new();
        written.insert(a);
        let mut out = String::new();
        let mut idents = BTreeSet::new();
        emit_loads(&grid, &expr, &written, &mut idents, &mut out);

        assert!(out.contains("float A_m1 = Shared_A[thislocal_0+max_left_offset_0-1];"));
    }

    #[test]
    fn test_load_deduplication() {
        let (grid, a) = grid_with_field();
        // A[-1] referenced twice; load emitted once.
        let expr = Expr::add(
            Expr::field_ref(a, vec![-1]),
            Expr::mul(Expr::F32Const(2.0), Expr::field_ref(a, vec![-1])),
        );
        let mut out = String::new();
        let mut idents = BTreeSet::new();
        emit_loads(&grid, &expr, &BTreeSet::new(), &mut idents, &mut out);

        assert_eq!(out.matches("float A_m1 = ").count(), 1);
    }
}

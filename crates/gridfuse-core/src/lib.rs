//! Core model and tiling engine for the gridfuse stencil compiler.
//!
//! A stencil program is a [`Grid`] of named [`Field`]s updated in program
//! order by [`StencilFunction`]s, each of which evaluates an [`Expr`] tree
//! over constant-offset neighborhood reads. The tiling engine
//! ([`TilePlan`]) computes, for a given time-tile size T, the per-field
//! halo [`Region`] every thread block must materialize so that T fused
//! time-steps can run from one kernel launch without re-reading global
//! memory mid-group.
//!
//! # Example
//!
//! ```
//! use gridfuse_core::{ElementType, Expr, Grid, StencilFunction, TileOptions, TilePlan};
//!
//! let mut grid = Grid::new("jacobi1d", 1);
//! let a = grid.attach_field("A", ElementType::F32).unwrap();
//!
//! // A[i] = 0.333 * (A[i-1] + A[i] + A[i+1])
//! let sum = Expr::add(
//!     Expr::add(Expr::field_ref(a, vec![-1]), Expr::field_ref(a, vec![0])),
//!     Expr::field_ref(a, vec![1]),
//! );
//! let expr = Expr::mul(Expr::F32Const(0.333), sum);
//! grid.append_function(StencilFunction::new("update", a, expr, vec![(1, 1)]));
//!
//! let plan = TilePlan::build(&grid, &TileOptions::for_dims(1).with_time_tile(3));
//! assert_eq!(plan.region(a).bound(0).lower, -2);
//! ```

mod error;
mod expr;
mod field;
mod function;
mod grid;
mod region;
mod tiling;
mod types;

pub use error::{ModelError, ModelResult};
pub use expr::{BinOp, Expr};
pub use field::{Field, FieldId};
pub use function::{BoundedExpr, StencilFunction};
pub use grid::Grid;
pub use region::{Bound, Region};
pub use tiling::{TileOptions, TilePlan};
pub use types::ElementType;

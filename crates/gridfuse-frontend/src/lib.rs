//! Descriptor front end for the gridfuse stencil compiler.
//!
//! Turns a YAML stencil descriptor into a fully constructed
//! [`gridfuse_core::Grid`]: fields, scalar parameters, and stencil
//! functions with their prefix-grammar expressions resolved against the
//! declared fields. All user-input malformations surface as
//! [`FrontendError`] values; the model handed onward already satisfies
//! the core's structural invariants.

mod descriptor;
mod error;
mod sexpr;

pub use descriptor::parse_descriptor;
pub use error::{FrontendError, FrontendResult};
pub use sexpr::parse as parse_expr;

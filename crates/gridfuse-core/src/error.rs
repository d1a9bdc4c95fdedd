//! Model construction errors.

use thiserror::Error;

/// Result type for model construction.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while assembling the grid model.
///
/// These cover malformed *input* handed to the model builders. Violations
/// of internal invariants (offset arity mismatches, unresolved placeholders
/// reaching the tiling engine, region lookups for detached fields) are
/// front-end bugs and fail fast with a panic instead.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A field with this name is already attached to the grid.
    #[error("field `{0}` is already attached to the grid")]
    DuplicateField(String),

    /// A named parameter was declared twice.
    #[error("parameter `{0}` is already declared")]
    DuplicateParameter(String),
}

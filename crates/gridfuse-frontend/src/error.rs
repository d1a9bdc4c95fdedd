//! Descriptor errors.
//!
//! Everything a user can get wrong in a descriptor maps to its own
//! variant so the CLI can report it precisely. Malformed input is always
//! recoverable (`Result`); only contract violations inside an already
//! validated model panic.

use thiserror::Error;

/// An error raised while parsing a stencil descriptor.
#[derive(Debug, Error)]
pub enum FrontendError {
    /// The input is not well-formed YAML.
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A required key is absent.
    #[error("missing required key `{0}`")]
    MissingKey(&'static str),

    /// A key holds the wrong kind of node.
    #[error("`{key}` must be {expected}")]
    WrongKind {
        /// Offending key.
        key: &'static str,
        /// What the descriptor grammar expects there.
        expected: &'static str,
    },

    /// The grid dimensionality is outside the supported range.
    #[error("dims must be between 1 and 3, got {0}")]
    BadDims(u64),

    /// A scalar type name the model does not know.
    #[error("unknown element type `{0}`")]
    UnknownType(String),

    /// A reference to a field that was never declared.
    #[error("unknown field `{0}`")]
    UnknownField(String),

    /// A field reference carries the wrong number of offsets.
    #[error("field `{field}` referenced with {actual} offsets, grid has {expected} dimensions")]
    OffsetCount {
        /// Referenced field name.
        field: String,
        /// Grid dimensionality.
        expected: usize,
        /// Offsets supplied.
        actual: usize,
    },

    /// A bounds list does not match the grid dimensionality.
    #[error("function `{function}` declares {actual} bounds, grid has {expected} dimensions")]
    BoundsArity {
        /// Function name.
        function: String,
        /// Grid dimensionality.
        expected: usize,
        /// Bound pairs supplied.
        actual: usize,
    },

    /// An expression ended mid-form.
    #[error("unexpected end of expression")]
    UnexpectedEnd,

    /// An expression token that does not fit the grammar at this point.
    #[error("unexpected token `{0}` in expression")]
    UnexpectedToken(String),

    /// A numeric literal that fits neither i64 nor f32.
    #[error("bad numeric literal `{0}`")]
    BadNumber(String),

    /// Model construction rejected the descriptor (duplicate field or
    /// parameter name).
    #[error(transparent)]
    Model(#[from] gridfuse_core::ModelError),
}

/// Convenience alias for descriptor parsing.
pub type FrontendResult<T> = Result<T, FrontendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            FrontendError::MissingKey("fields").to_string(),
            "missing required key `fields`"
        );
        assert_eq!(
            FrontendError::BadDims(7).to_string(),
            "dims must be between 1 and 3, got 7"
        );
        assert_eq!(
            FrontendError::OffsetCount {
                field: "A".to_string(),
                expected: 2,
                actual: 1,
            }
            .to_string(),
            "field `A` referenced with 1 offsets, grid has 2 dimensions"
        );
    }
}

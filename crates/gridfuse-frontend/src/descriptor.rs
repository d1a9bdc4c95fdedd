//! YAML descriptor walking.
//!
//! The descriptor is read as a raw `serde_yaml::Value` tree rather than
//! through derive, so every malformation maps to one of the enumerated
//! [`FrontendError`] kinds instead of a generic deserialization message.
//!
//! ```yaml
//! program: jacobi1d
//! dims: 1
//! fields:
//!   - { name: A, type: float }
//!   - { name: B, type: float }
//! functions:
//!   - name: update
//!     output: B
//!     expr: (* 0.333 (+ (+ (fieldref A -1) (fieldref A 0)) (fieldref A 1)))
//!     bounds: [[1, 1]]
//! ```

use gridfuse_core::{ElementType, Grid, StencilFunction};
use serde_yaml::Value;
use tracing::debug;

use crate::error::{FrontendError, FrontendResult};
use crate::sexpr;

/// Parse a YAML stencil descriptor into a fully constructed grid.
pub fn parse_descriptor(src: &str) -> FrontendResult<Grid> {
    let doc: Value = serde_yaml::from_str(src)?;

    let program = str_of(&doc, "program")?;
    let dims = u64_of(&doc, "dims")?;
    if !(1..=3).contains(&dims) {
        return Err(FrontendError::BadDims(dims));
    }
    let mut grid = Grid::new(program, dims as usize);

    for entry in seq_of(&doc, "fields")? {
        let name = str_of(entry, "name")?;
        let ty_name = str_of(entry, "type")?;
        let ty = ElementType::parse(ty_name)
            .ok_or_else(|| FrontendError::UnknownType(ty_name.to_string()))?;
        grid.attach_field(name, ty)?;
    }

    if let Some(params) = doc.get("params") {
        let params = params.as_sequence().ok_or(FrontendError::WrongKind {
            key: "params",
            expected: "a sequence",
        })?;
        for entry in params {
            let name = str_of(entry, "name")?;
            let ty_name = str_of(entry, "type")?;
            let ty = ElementType::parse(ty_name)
                .ok_or_else(|| FrontendError::UnknownType(ty_name.to_string()))?;
            grid.add_parameter(name, ty)?;
        }
    }

    for entry in seq_of(&doc, "functions")? {
        let name = str_of(entry, "name")?.to_string();
        let output_name = str_of(entry, "output")?;
        let output = grid
            .field_by_name(output_name)
            .ok_or_else(|| FrontendError::UnknownField(output_name.to_string()))?;

        let expr = sexpr::parse(&grid, str_of(entry, "expr")?)?;
        let bounds = bounds_of(entry, &grid, &name)?;
        let mut function = StencilFunction::new(name.as_str(), output, expr, bounds);

        if let Some(alternatives) = entry.get("alternatives") {
            let alternatives =
                alternatives.as_sequence().ok_or(FrontendError::WrongKind {
                    key: "alternatives",
                    expected: "a sequence",
                })?;
            for alt in alternatives {
                let expr = sexpr::parse(&grid, str_of(alt, "expr")?)?;
                let bounds = bounds_of(alt, &grid, &name)?;
                function = function.with_alternative(expr, bounds);
            }
        }
        grid.append_function(function);
    }

    debug!(
        program = grid.name(),
        fields = grid.fields().len(),
        functions = grid.functions().len(),
        "descriptor parsed"
    );
    Ok(grid)
}

fn get<'a>(value: &'a Value, key: &'static str) -> FrontendResult<&'a Value> {
    value.get(key).ok_or(FrontendError::MissingKey(key))
}

fn str_of<'a>(value: &'a Value, key: &'static str) -> FrontendResult<&'a str> {
    get(value, key)?.as_str().ok_or(FrontendError::WrongKind {
        key,
        expected: "a string",
    })
}

fn u64_of(value: &Value, key: &'static str) -> FrontendResult<u64> {
    get(value, key)?.as_u64().ok_or(FrontendError::WrongKind {
        key,
        expected: "a non-negative integer",
    })
}

fn seq_of<'a>(value: &'a Value, key: &'static str) -> FrontendResult<&'a Vec<Value>> {
    get(value, key)?
        .as_sequence()
        .ok_or(FrontendError::WrongKind {
            key,
            expected: "a sequence",
        })
}

/// `bounds: [[lower, upper], ...]`, one pair per grid dimension.
fn bounds_of(entry: &Value, grid: &Grid, function: &str) -> FrontendResult<Vec<(u32, u32)>> {
    const EXPECTED: FrontendError = FrontendError::WrongKind {
        key: "bounds",
        expected: "a sequence of [lower, upper] integer pairs",
    };

    let mut bounds = Vec::new();
    for pair in seq_of(entry, "bounds")? {
        let pair = pair.as_sequence().ok_or(EXPECTED)?;
        if pair.len() != 2 {
            return Err(EXPECTED);
        }
        let lower = pair[0].as_u64().and_then(|v| u32::try_from(v).ok());
        let upper = pair[1].as_u64().and_then(|v| u32::try_from(v).ok());
        match (lower, upper) {
            (Some(lower), Some(upper)) => bounds.push((lower, upper)),
            _ => return Err(EXPECTED),
        }
    }

    if bounds.len() != grid.dims() {
        return Err(FrontendError::BoundsArity {
            function: function.to_string(),
            expected: grid.dims(),
            actual: bounds.len(),
        });
    }
    Ok(bounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridfuse_core::ModelError;

    const JACOBI: &str = r#"
program: jacobi1d
dims: 1
fields:
  - { name: A, type: float }
  - { name: B, type: float }
functions:
  - name: update
    output: B
    expr: (* 0.333 (+ (+ (fieldref A -1) (fieldref A 0)) (fieldref A 1)))
    bounds: [[1, 1]]
"#;

    #[test]
    fn test_parse_jacobi_descriptor() {
        let grid = parse_descriptor(JACOBI).unwrap();
        assert_eq!(grid.name(), "jacobi1d");
        assert_eq!(grid.dims(), 1);
        assert_eq!(grid.fields().len(), 2);

        let function = &grid.functions()[0];
        assert_eq!(function.name(), "update");
        assert_eq!(function.output(), grid.field_by_name("B").unwrap());
        assert_eq!(function.flops(), 3.0);
        assert_eq!(function.primary_bounds(), [(1, 1)]);
    }

    #[test]
    fn test_parse_alternatives_and_params() {
        let src = r#"
program: blend
dims: 1
fields:
  - { name: A, type: double }
params:
  - { name: alpha, type: double }
functions:
  - name: blend
    output: A
    expr: (* 0.5 (+ (fieldref A -2) (fieldref A 2)))
    bounds: [[2, 2]]
    alternatives:
      - expr: (fieldref A 0)
        bounds: [[0, 0]]
"#;
        let grid = parse_descriptor(src).unwrap();
        assert_eq!(grid.parameters(), [("alpha".to_string(), ElementType::F64)]);
        assert_eq!(grid.functions()[0].alternatives().len(), 2);
    }

    #[test]
    fn test_missing_program_key() {
        let src = "dims: 1\nfields: []\nfunctions: []\n";
        assert!(matches!(
            parse_descriptor(src),
            Err(FrontendError::MissingKey("program"))
        ));
    }

    #[test]
    fn test_wrong_kind_for_fields() {
        let src = "program: p\ndims: 1\nfields: 3\nfunctions: []\n";
        assert!(matches!(
            parse_descriptor(src),
            Err(FrontendError::WrongKind { key: "fields", .. })
        ));
    }

    #[test]
    fn test_dims_out_of_range() {
        let src = "program: p\ndims: 5\nfields: []\nfunctions: []\n";
        assert!(matches!(
            parse_descriptor(src),
            Err(FrontendError::BadDims(5))
        ));
    }

    #[test]
    fn test_unknown_element_type() {
        let src = "program: p\ndims: 1\nfields:\n  - { name: A, type: quad }\nfunctions: []\n";
        assert!(matches!(
            parse_descriptor(src),
            Err(FrontendError::UnknownType(t)) if t == "quad"
        ));
    }

    #[test]
    fn test_unknown_output_field() {
        let src = r#"
program: p
dims: 1
fields:
  - { name: A, type: float }
functions:
  - name: f
    output: Z
    expr: (fieldref A 0)
    bounds: [[0, 0]]
"#;
        assert!(matches!(
            parse_descriptor(src),
            Err(FrontendError::UnknownField(name)) if name == "Z"
        ));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let src = "program: p\ndims: 1\nfields:\n  - { name: A, type: float }\n  - { name: A, type: float }\nfunctions: []\n";
        assert!(matches!(
            parse_descriptor(src),
            Err(FrontendError::Model(ModelError::DuplicateField(_)))
        ));
    }

    #[test]
    fn test_bounds_arity_mismatch() {
        let src = r#"
program: p
dims: 2
fields:
  - { name: A, type: float }
functions:
  - name: f
    output: A
    expr: (fieldref A 0 0)
    bounds: [[1, 1]]
"#;
        assert!(matches!(
            parse_descriptor(src),
            Err(FrontendError::BoundsArity { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn test_offset_count_surfaces_from_expression() {
        let src = r#"
program: p
dims: 2
fields:
  - { name: A, type: float }
functions:
  - name: f
    output: A
    expr: (fieldref A 0)
    bounds: [[0, 0], [0, 0]]
"#;
        assert!(matches!(
            parse_descriptor(src),
            Err(FrontendError::OffsetCount { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(
            parse_descriptor("program: [unterminated"),
            Err(FrontendError::Yaml(_))
        ));
    }
}

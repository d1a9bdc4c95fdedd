//! Fields: named, typed arrays over the grid index space.

use std::fmt;

use crate::ElementType;

/// Index-based identity of a field within its grid.
///
/// Assigned when the field is attached and stable for the life of the
/// grid, so region maps and expression trees can refer to fields without
/// pointer identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldId(pub(crate) usize);

impl FieldId {
    /// Position of the field in the grid's attachment order.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// A named, typed array over the grid's index space.
///
/// Fields own no data buffers; host and device storage is managed by the
/// generated program. Name and element type are fixed at attachment.
#[derive(Debug, Clone)]
pub struct Field {
    id: FieldId,
    name: String,
    ty: ElementType,
}

impl Field {
    pub(crate) fn new(id: FieldId, name: impl Into<String>, ty: ElementType) -> Self {
        Self {
            id,
            name: name.into(),
            ty,
        }
    }

    /// The field's identity within its grid.
    pub fn id(&self) -> FieldId {
        self.id
    }

    /// The field's name, unique within its grid.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scalar type of the field's elements.
    pub fn element_type(&self) -> ElementType {
        self.ty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_id_display() {
        assert_eq!(format!("{}", FieldId(3)), "f3");
    }

    #[test]
    fn test_field_accessors() {
        let f = Field::new(FieldId(0), "pressure", ElementType::F64);
        assert_eq!(f.name(), "pressure");
        assert_eq!(f.element_type(), ElementType::F64);
        assert_eq!(f.id().index(), 0);
    }
}

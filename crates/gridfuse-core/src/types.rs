//! Scalar element types for grid fields.

use std::fmt;

/// Scalar type of a field element.
///
/// The set is closed: stencil kernels compute over single- or
/// double-precision floats and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// 32-bit floating point.
    F32,
    /// 64-bit floating point.
    F64,
}

impl ElementType {
    /// Parse from a descriptor type name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "float" | "f32" => Some(ElementType::F32),
            "double" | "f64" => Some(ElementType::F64),
            _ => None,
        }
    }

    /// Canonical type name in emitted device/host code.
    pub fn type_name(&self) -> &'static str {
        match self {
            ElementType::F32 => "float",
            ElementType::F64 => "double",
        }
    }

    /// Size of one element in bytes.
    pub fn size_bytes(&self) -> usize {
        match self {
            ElementType::F32 => 4,
            ElementType::F64 => 8,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

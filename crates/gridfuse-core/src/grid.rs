//! The grid: fields plus the program-ordered function list.

use crate::{ElementType, Expr, Field, FieldId, ModelError, ModelResult, StencilFunction};

/// An n-dimensional structured grid owning its fields and the ordered
/// list of stencil functions updating them.
///
/// Function list order is program order: it fixes both dependency
/// resolution during tiling and emission order in the generated kernel.
#[derive(Debug)]
pub struct Grid {
    name: String,
    dims: usize,
    fields: Vec<Field>,
    functions: Vec<StencilFunction>,
    params: Vec<(String, ElementType)>,
}

impl Grid {
    /// Create an empty grid. Dimensionality is fixed for the grid's life.
    pub fn new(name: impl Into<String>, dims: usize) -> Self {
        assert!(dims >= 1, "grid must have at least one dimension");
        Self {
            name: name.into(),
            dims,
            fields: Vec::new(),
            functions: Vec::new(),
            params: Vec::new(),
        }
    }

    /// Grid (program) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of grid dimensions.
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Attach a new field. Names must be unique within the grid.
    pub fn attach_field(
        &mut self,
        name: impl Into<String>,
        ty: ElementType,
    ) -> ModelResult<FieldId> {
        let name = name.into();
        if self.field_by_name(&name).is_some() {
            return Err(ModelError::DuplicateField(name));
        }
        let id = FieldId(self.fields.len());
        self.fields.push(Field::new(id, name, ty));
        Ok(id)
    }

    /// Look up a field id by name.
    pub fn field_by_name(&self, name: &str) -> Option<FieldId> {
        self.fields.iter().find(|f| f.name() == name).map(Field::id)
    }

    /// The field for `id`. Looking up a field that was never attached to
    /// this grid is a programmer error.
    pub fn field(&self, id: FieldId) -> &Field {
        self.fields
            .get(id.0)
            .unwrap_or_else(|| panic!("field {id} not attached to this grid"))
    }

    /// All fields in attachment order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Append a function at the end of program order.
    ///
    /// The function must be internally consistent with this grid: output
    /// and referenced fields attached, every bounds vector and every
    /// field-reference offset vector of grid arity. Violations indicate a
    /// front-end bug and fail fast.
    pub fn append_function(&mut self, function: StencilFunction) {
        assert!(
            function.output().0 < self.fields.len(),
            "output of `{}` not attached to this grid",
            function.name()
        );
        for alt in function.alternatives() {
            assert_eq!(
                alt.bounds().len(),
                self.dims,
                "bounds arity mismatch in `{}`",
                function.name()
            );
            self.check_expr(alt.expr(), function.name());
        }
        self.functions.push(function);
    }

    fn check_expr(&self, expr: &Expr, func: &str) {
        match expr {
            Expr::Binary { lhs, rhs, .. } => {
                self.check_expr(lhs, func);
                self.check_expr(rhs, func);
            }
            Expr::FieldRef { field, offsets } => {
                assert!(
                    field.0 < self.fields.len(),
                    "field {field} in `{func}` not attached to this grid"
                );
                assert_eq!(
                    offsets.len(),
                    self.dims,
                    "offset arity mismatch in `{func}`"
                );
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    self.check_expr(arg, func);
                }
            }
            Expr::IntConst(_) | Expr::F32Const(_) | Expr::Placeholder(_) => {}
        }
    }

    /// Functions in program order.
    pub fn functions(&self) -> &[StencilFunction] {
        &self.functions
    }

    /// Declare a named scalar parameter.
    pub fn add_parameter(
        &mut self,
        name: impl Into<String>,
        ty: ElementType,
    ) -> ModelResult<()> {
        let name = name.into();
        if self.params.iter().any(|(n, _)| *n == name) {
            return Err(ModelError::DuplicateParameter(name));
        }
        self.params.push((name, ty));
        Ok(())
    }

    /// Declared parameters in declaration order.
    pub fn parameters(&self) -> &[(String, ElementType)] {
        &self.params
    }
}

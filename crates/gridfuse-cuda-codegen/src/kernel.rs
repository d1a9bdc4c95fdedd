//! Device kernel emission.
//!
//! One `__global__` kernel per grid, executing all T fused sub-steps of
//! one time-tile group. The kernel walks three phases:
//!
//! 1. Sub-step 0: every field is read from global memory. Blocks touching
//!    the grid boundary branch per point between compute, copy-through of
//!    the raw global value, and zero-fill for indices outside the array.
//! 2. Sub-steps 1..T: reads of fields already produced within the group
//!    are serviced from the block's shared buffers.
//! 3. Final store: results leave the per-thread register buffers for
//!    global memory, but only from threads inside the halo margin whose
//!    global index satisfies the function's bounds.
//!
//! Each compute/store pair is separated by a block barrier; a shared read
//! of data other threads just wrote without one is a data race.

use std::collections::BTreeSet;

use gridfuse_core::{FieldId, Grid, StencilFunction, TilePlan};

use crate::exprs::{emit_expr, emit_loads};
use crate::TargetMachine;

/// CUDA built-in component name for a dimension.
pub(crate) fn dim_char(dim: usize) -> char {
    match dim {
        0 => 'x',
        1 => 'y',
        2 => 'z',
        _ => panic!("bad dimension number {dim}"),
    }
}

pub(crate) fn emit_device(grid: &Grid, plan: &TilePlan, machine: TargetMachine) -> String {
    DeviceEmitter {
        grid,
        plan,
        machine,
        written: BTreeSet::new(),
        out: String::new(),
    }
    .emit()
}

struct DeviceEmitter<'a> {
    grid: &'a Grid,
    plan: &'a TilePlan,
    machine: TargetMachine,
    written: BTreeSet<FieldId>,
    out: String,
}

impl DeviceEmitter<'_> {
    fn emit(mut self) -> String {
        self.out.push_str("//\n// Generated by gridfuse\n//\n// CUDA device code\n//\n");
        self.emit_signature();
        self.emit_declarations();

        self.out.push_str("  // First time step\n");
        let grid = self.grid;
        for function in grid.functions() {
            self.emit_first_step(function);
        }

        if self.plan.options().time_tile() > 1 {
            self.out.push_str("  // Remaining time steps\n");
            self.out.push_str(&format!(
                "  for (int t = 1; t < {}; ++t) {{\n",
                self.plan.options().time_tile()
            ));
            for function in grid.functions() {
                self.emit_steady_step(function);
            }
            self.out.push_str("  }\n");
        }

        for function in grid.functions() {
            self.emit_final_store(function);
        }

        self.out.push_str("} // End of kernel\n");
        self.out
    }

    fn emit_signature(&mut self) {
        self.out.push_str("__global__");
        if self.machine.emits_launch_bounds() {
            let threads: u32 = (0..self.grid.dims())
                .map(|d| self.plan.options().block_size(d))
                .product();
            self.out.push_str(&format!(" __launch_bounds__({threads})"));
        }
        self.out
            .push_str(&format!("\nstatic void gf_kernel_{}(", self.grid.name()));
        for (i, field) in self.grid.fields().iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            let ty = field.element_type().type_name();
            self.out
                .push_str(&format!("{ty} *In_{0}, {ty} *Out_{0}", field.name()));
        }
        for dim in 0..self.grid.dims() {
            self.out.push_str(&format!(", int Dim_{dim}"));
        }
        self.out.push_str(") {\n");
    }

    fn emit_declarations(&mut self) {
        let dims = self.grid.dims();

        // Shared buffers: one uniform halo extent for all fields keeps
        // the indexing schedule identical across functions. C array
        // declarators run highest dimension first.
        let mut shared_size = String::new();
        for dim in (0..dims).rev() {
            shared_size.push_str(&format!(
                "[{}+{}+{}]",
                u64::from(self.plan.options().elements(dim))
                    * u64::from(self.plan.options().block_size(dim)),
                self.plan.max_left(dim),
                self.plan.max_right(dim)
            ));
        }
        for field in self.grid.fields() {
            self.out.push_str(&format!(
                "  __shared__ {} Shared_{}{shared_size};\n",
                field.element_type().type_name(),
                field.name()
            ));
        }

        for dim in 0..dims {
            self.out.push_str(&format!(
                "  const int Halo_Left_{dim} = {};\n",
                self.plan.halo_left(dim)
            ));
            self.out.push_str(&format!(
                "  const int Halo_Right_{dim} = {};\n",
                self.plan.halo_right(dim)
            ));
        }
        for dim in 0..dims {
            self.out.push_str(&format!(
                "  int real_per_block_{dim} = {}*blockDim.{} - Halo_Left_{dim} - Halo_Right_{dim};\n",
                self.plan.options().elements(dim),
                dim_char(dim)
            ));
        }
        for dim in 0..dims {
            self.out.push_str(&format!(
                "  const int ts_{dim} = {};\n",
                self.plan.options().elements(dim)
            ));
        }

        for field in self.grid.fields() {
            self.out.push_str(&format!(
                "  {} Buffer_{}",
                field.element_type().type_name(),
                field.name()
            ));
            for dim in (0..dims).rev() {
                self.out
                    .push_str(&format!("[{}]", self.plan.options().elements(dim)));
            }
            self.out.push_str(";\n");
        }

        for dim in 0..dims {
            self.out.push_str(&format!(
                "  const int max_left_offset_{dim} = {};\n",
                self.plan.max_left(dim)
            ));
            self.out.push_str(&format!(
                "  const int max_right_offset_{dim} = {};\n",
                self.plan.max_right(dim)
            ));
        }

        self.out.push_str("  int AddrOffset;\n");

        self.out.push_str("  // Kernel init\n");
        for dim in 0..dims {
            let c = dim_char(dim);
            self.out
                .push_str(&format!("  int local_{dim} = threadIdx.{c};\n"));
            self.out
                .push_str(&format!("  int group_{dim} = blockIdx.{c};\n"));
            if dim == 0 {
                self.out.push_str(&format!(
                    "  int tid_{dim} = group_{dim} * real_per_block_{dim} + local_{dim} - Halo_Left_{dim};\n"
                ));
            } else {
                self.out.push_str(&format!(
                    "  int tid_{dim} = group_{dim} * real_per_block_{dim} + local_{dim}*{} - Halo_Left_{dim};\n",
                    self.plan.options().elements(dim)
                ));
            }
        }
    }

    // -- per-element loop plumbing --

    fn open_elem_loops(&mut self) {
        for dim in 0..self.grid.dims() {
            self.out.push_str(&format!(
                "  for (unsigned elem_{dim} = 0; elem_{dim} < ts_{dim}; ++elem_{dim}) {{\n"
            ));
            if dim == 0 {
                self.out.push_str(&format!(
                    "  int thisid_{dim} = tid_{dim} + elem_{dim}*blockDim.x;\n"
                ));
                self.out.push_str(&format!(
                    "  int thislocal_{dim} = local_{dim} + elem_{dim}*blockDim.x;\n"
                ));
            } else {
                self.out
                    .push_str(&format!("  int thisid_{dim} = tid_{dim} + elem_{dim};\n"));
                self.out.push_str(&format!(
                    "  int thislocal_{dim} = threadIdx.{}*ts_{dim} + elem_{dim};\n",
                    dim_char(dim)
                ));
            }
        }
    }

    fn close_elem_loops(&mut self) {
        for _ in 0..self.grid.dims() {
            self.out.push_str("  }\n");
        }
    }

    fn buffer_ref(&self, name: &str) -> String {
        let mut s = format!("Buffer_{name}");
        for dim in (0..self.grid.dims()).rev() {
            s.push_str(&format!("[elem_{dim}]"));
        }
        s
    }

    fn bounds_clause(&self, bounds: &[(u32, u32)]) -> String {
        let mut s = String::new();
        for (dim, (lower, upper)) in bounds.iter().enumerate() {
            if dim > 0 {
                s.push_str(" && ");
            }
            s.push_str(&format!(
                "(thisid_{dim} >= {lower} && thisid_{dim} < Dim_{dim} - {upper})"
            ));
        }
        s
    }

    fn in_array_clause(&self) -> String {
        let mut s = String::new();
        for dim in 0..self.grid.dims() {
            if dim > 0 {
                s.push_str(" && ");
            }
            s.push_str(&format!("(thisid_{dim} >= 0 && thisid_{dim} < Dim_{dim})"));
        }
        s
    }

    fn linearized_addr(&self, parenthesize: bool) -> String {
        let mut s = String::from("AddrOffset = ");
        for dim in 0..self.grid.dims() {
            if dim > 0 {
                s.push_str(" + ");
            }
            if parenthesize {
                s.push_str(&format!("(thisid_{dim})"));
            } else {
                s.push_str(&format!("thisid_{dim}"));
            }
            for stride in 0..dim {
                s.push_str(&format!("*Dim_{stride}"));
            }
        }
        s.push_str(";\n");
        s
    }

    /// Loads, the `Res` evaluation, and the register-buffer store for one
    /// alternative.
    fn emit_compute(&mut self, function: &StencilFunction, alt: usize) {
        let alt = &function.alternatives()[alt];
        let mut idents = BTreeSet::new();
        let mut loads = String::new();
        emit_loads(self.grid, alt.expr(), &self.written, &mut idents, &mut loads);
        self.out.push_str(&loads);

        let ty = self
            .grid
            .field(function.output())
            .element_type()
            .type_name();
        self.out.push_str(&format!("  {ty} Res = "));
        let mut body = String::new();
        emit_expr(self.grid, alt.expr(), &mut body);
        self.out.push_str(&body);
        self.out.push_str(";\n");

        let out_name = self.grid.field(function.output()).name().to_string();
        self.out
            .push_str(&format!("  {} = Res;\n", self.buffer_ref(&out_name)));
    }

    /// Copy-through arm: pass the raw global value into the register
    /// buffer untouched.
    fn emit_copy_through(&mut self, function: &StencilFunction) {
        let out_field = self.grid.field(function.output());
        let name = out_field.name().to_string();
        let ty = out_field.element_type().type_name();
        self.out.push_str(&self.linearized_addr(true));
        self.out
            .push_str(&format!("{ty} temp = *(In_{name} + AddrOffset);\n"));
        self.out
            .push_str(&format!("  {} = temp;\n", self.buffer_ref(&name)));
    }

    /// The per-alternative `if/else if` chain computing into the register
    /// buffer. `fallback` appends the boundary arms (copy-through and
    /// zero-fill) after the alternatives.
    fn emit_alternative_chain(&mut self, function: &StencilFunction, fallback: bool) {
        for (i, alt) in function.alternatives().iter().enumerate() {
            if i > 0 {
                self.out.push_str("} else ");
            }
            self.out
                .push_str(&format!("  if ({}) {{\n", self.bounds_clause(alt.bounds())));
            self.emit_compute(function, i);
        }
        if fallback {
            self.out
                .push_str(&format!("}} else if ({}) {{\n", self.in_array_clause()));
            self.emit_copy_through(function);
            self.out.push_str("  } else {\n");
            let name = self.grid.field(function.output()).name().to_string();
            self.out
                .push_str(&format!("  {} = 0;\n", self.buffer_ref(&name)));
        }
        self.out.push_str("  }\n");
    }

    fn emit_shared_store(&mut self, function: &StencilFunction) {
        let name = self.grid.field(function.output()).name().to_string();
        self.out.push_str(&format!("Shared_{name}"));
        for dim in (0..self.grid.dims()).rev() {
            self.out
                .push_str(&format!("[thislocal_{dim}+max_left_offset_{dim}]"));
        }
        self.out
            .push_str(&format!(" = {};\n", self.buffer_ref(&name)));
    }

    // -- phases --

    fn emit_first_step(&mut self, function: &StencilFunction) {
        // Boundary-block test: only edge blocks pay for the branchy
        // per-point policy.
        self.out.push_str(" if (blockIdx.x == 0 || blockIdx.x == gridDim.x-1");
        for dim in 1..self.grid.dims() {
            let c = dim_char(dim);
            self.out.push_str(&format!(
                " || blockIdx.{c} == 0 || blockIdx.{c} == gridDim.{c}-1"
            ));
        }
        self.out.push_str(" ) {\n");

        self.open_elem_loops();
        self.emit_alternative_chain(function, true);
        self.close_elem_loops();

        self.out.push_str("  } else {\n");

        self.open_elem_loops();
        if function.alternatives().len() == 1 {
            self.emit_compute(function, 0);
        } else {
            self.emit_alternative_chain(function, true);
        }
        self.close_elem_loops();

        self.out.push_str("  }\n");
        self.out.push_str("  __syncthreads();\n");

        self.open_elem_loops();
        self.emit_shared_store(function);
        self.close_elem_loops();
        self.out.push_str("  __syncthreads();\n");

        self.written.insert(function.output());
    }

    fn emit_steady_step(&mut self, function: &StencilFunction) {
        self.open_elem_loops();
        self.emit_alternative_chain(function, false);
        self.close_elem_loops();
        self.out.push_str("  __syncthreads();\n");

        let bounds_or = self.bounds_or(function);
        self.open_elem_loops();
        self.out.push_str(&format!("    if ({bounds_or}) {{\n"));
        self.emit_shared_store(function);
        self.out.push_str("    }\n");
        self.close_elem_loops();
        self.out.push_str("  __syncthreads();\n");
    }

    fn bounds_or(&self, function: &StencilFunction) -> String {
        let clauses: Vec<String> = function
            .alternatives()
            .iter()
            .map(|alt| self.bounds_clause(alt.bounds()))
            .collect();
        if clauses.len() == 1 {
            clauses.into_iter().next().unwrap_or_default()
        } else {
            let wrapped: Vec<String> =
                clauses.into_iter().map(|c| format!("({c})")).collect();
            wrapped.join(" || ")
        }
    }

    fn emit_final_store(&mut self, function: &StencilFunction) {
        let name = self.grid.field(function.output()).name().to_string();
        self.open_elem_loops();

        let mut halo_guard = String::new();
        for dim in 0..self.grid.dims() {
            if dim > 0 {
                halo_guard.push_str(" && ");
            }
            halo_guard.push_str(&format!(
                "(thislocal_{dim} >= Halo_Left_{dim} && thislocal_{dim} < blockDim.{}*ts_{dim} - Halo_Right_{dim})",
                dim_char(dim)
            ));
        }
        let bounds_or = self.bounds_or(function);
        self.out
            .push_str(&format!("      if ({halo_guard} && ({bounds_or})) {{\n"));

        self.out.push_str(&self.linearized_addr(false));
        self.out.push_str(&format!(
            "*(Out_{name} + AddrOffset) = {};\n",
            self.buffer_ref(&name)
        ));
        self.out.push_str("      }\n");
        self.close_elem_loops();
    }
}

//! CUDA back end for the gridfuse stencil compiler.
//!
//! [`CudaBackEnd`] ties a [`Grid`] to a [`TileOptions`] configuration,
//! runs region propagation once via [`CudaBackEnd::run`], and emits the
//! device kernel plus the host driver as strings. The [`TargetBackend`]
//! trait is the seam for further targets: they compose with the shared
//! [`TilePlan`] instead of sharing an implementation.

use gridfuse_core::{Grid, TileOptions, TilePlan};
use tracing::debug;

mod exprs;
mod host;
mod kernel;

/// Hardware tag steering code-shape choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMachine {
    /// No hardware-specific hints.
    Generic,
    /// Fermi-class devices: emit `__launch_bounds__` so the compiler
    /// caps register usage at the configured block size.
    Sm20,
}

impl TargetMachine {
    /// Parse from a CLI tag.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "generic" => Some(TargetMachine::Generic),
            "sm20" | "fermi" => Some(TargetMachine::Sm20),
            _ => None,
        }
    }

    pub(crate) fn emits_launch_bounds(&self) -> bool {
        matches!(self, TargetMachine::Sm20)
    }
}

/// A code-generation target: one device kernel and one host driver per
/// grid, both derived from the same frozen tile plan.
pub trait TargetBackend {
    /// Emit the compute kernel.
    fn emit_device(&self) -> String;
    /// Emit the host-side launch and memory-management wrapper.
    fn emit_host(&self) -> String;
}

/// The CUDA code generator.
pub struct CudaBackEnd<'g> {
    grid: &'g Grid,
    opts: TileOptions,
    machine: TargetMachine,
    plan: Option<TilePlan>,
}

impl<'g> CudaBackEnd<'g> {
    /// Create a back end for `grid` under the given tiling options.
    pub fn new(grid: &'g Grid, opts: TileOptions) -> Self {
        assert!(
            grid.dims() <= 3,
            "CUDA blocks index at most three dimensions"
        );
        Self {
            grid,
            opts,
            machine: TargetMachine::Generic,
            plan: None,
        }
    }

    /// Select the target machine.
    pub fn with_machine(mut self, machine: TargetMachine) -> Self {
        self.machine = machine;
        self
    }

    /// Run region propagation. Must be called exactly once before any
    /// codegen method.
    pub fn run(&mut self) {
        assert!(self.plan.is_none(), "run() called twice");
        let plan = TilePlan::build(self.grid, &self.opts);
        for dim in 0..self.grid.dims() {
            debug!(
                dim,
                halo_left = plan.halo_left(dim),
                halo_right = plan.halo_right(dim),
                "block halo"
            );
        }
        self.plan = Some(plan);
    }

    /// The frozen tile plan.
    pub fn plan(&self) -> &TilePlan {
        match &self.plan {
            Some(plan) => plan,
            None => panic!("code generation before run()"),
        }
    }

    /// Emit the device kernel.
    pub fn codegen_device(&self) -> String {
        kernel::emit_device(self.grid, self.plan(), self.machine)
    }

    /// Emit the host driver.
    pub fn codegen_host(&self) -> String {
        host::emit_host(self.grid, self.plan())
    }

    /// Emit device and host code together, kernel first so the host's
    /// launch site sees its declaration.
    pub fn codegen(&self) -> String {
        let mut out = self.codegen_device();
        out.push_str(&self.codegen_host());
        out
    }

    /// Declaration of the host entry point, for embedding in user code.
    pub fn canonical_prototype(&self) -> String {
        host::canonical_prototype(self.grid)
    }

    /// Call of the host entry point with `timestep_expr` as the step
    /// count, for embedding in user code.
    pub fn canonical_invocation(&self, timestep_expr: &str) -> String {
        host::canonical_invocation(self.grid, timestep_expr)
    }
}

impl TargetBackend for CudaBackEnd<'_> {
    fn emit_device(&self) -> String {
        self.codegen_device()
    }

    fn emit_host(&self) -> String {
        self.codegen_host()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridfuse_core::{ElementType, Expr, StencilFunction};

    fn jacobi_grid() -> Grid {
        let mut grid = Grid::new("jacobi1d", 1);
        let a = grid.attach_field("A", ElementType::F32).unwrap();
        let b = grid.attach_field("B", ElementType::F32).unwrap();
        let sum = Expr::add(
            Expr::add(Expr::field_ref(a, vec![-1]), Expr::field_ref(a, vec![0])),
            Expr::field_ref(a, vec![1]),
        );
        grid.append_function(StencilFunction::new("update", b, sum, vec![(1, 1)]));
        grid
    }

    #[test]
    fn test_combined_codegen_orders_kernel_first() {
        let grid = jacobi_grid();
        let mut backend = CudaBackEnd::new(&grid, TileOptions::for_dims(1));
        backend.run();
        let code = backend.codegen();

        let kernel = code.find("gf_kernel_jacobi1d").unwrap();
        let host = code.find("void gf_program_jacobi1d").unwrap();
        assert!(kernel < host);
    }

    #[test]
    fn test_target_machine_parse() {
        assert_eq!(TargetMachine::parse("generic"), Some(TargetMachine::Generic));
        assert_eq!(TargetMachine::parse("SM20"), Some(TargetMachine::Sm20));
        assert_eq!(TargetMachine::parse("fermi"), Some(TargetMachine::Sm20));
        assert_eq!(TargetMachine::parse("vliw"), None);
    }

    #[test]
    fn test_trait_object_dispatch() {
        let grid = jacobi_grid();
        let mut backend = CudaBackEnd::new(&grid, TileOptions::for_dims(1));
        backend.run();

        let target: &dyn TargetBackend = &backend;
        assert!(target.emit_device().contains("__global__"));
        assert!(target.emit_host().contains("cudaMalloc"));
    }

    #[test]
    #[should_panic(expected = "code generation before run()")]
    fn test_codegen_before_run_panics() {
        let grid = jacobi_grid();
        let backend = CudaBackEnd::new(&grid, TileOptions::for_dims(1));
        backend.codegen_device();
    }

    #[test]
    #[should_panic(expected = "run() called twice")]
    fn test_run_twice_panics() {
        let grid = jacobi_grid();
        let mut backend = CudaBackEnd::new(&grid, TileOptions::for_dims(1));
        backend.run();
        backend.run();
    }

    #[test]
    #[should_panic(expected = "three dimensions")]
    fn test_four_dimensional_grid_rejected() {
        let grid = Grid::new("hyper", 4);
        CudaBackEnd::new(&grid, TileOptions::for_dims(4));
    }
}

//! Host driver emission.
//!
//! The wrapper owns the device buffers, the launch geometry, and the
//! ping-pong pointer swap between launches. Cross-block consistency comes
//! only from that swap: each launch reads the previous launch's output
//! through global memory, so the time loop strides by the time-tile size.

use gridfuse_core::{Grid, TilePlan};

pub(crate) fn canonical_prototype(grid: &Grid) -> String {
    let mut s = format!("void gf_program_{}(int timesteps", grid.name());
    for field in grid.fields() {
        s.push_str(&format!(
            ", {} *Host_{}",
            field.element_type().type_name(),
            field.name()
        ));
    }
    for dim in 0..grid.dims() {
        s.push_str(&format!(", int Dim_{dim}"));
    }
    s.push_str(");\n");
    s
}

pub(crate) fn canonical_invocation(grid: &Grid, timestep_expr: &str) -> String {
    let mut s = format!("gf_program_{}({timestep_expr}", grid.name());
    for field in grid.fields() {
        s.push_str(&format!(", {}", field.name()));
    }
    for dim in 0..grid.dims() {
        s.push_str(&format!(", Dim_{dim}"));
    }
    s.push_str(");\n");
    s
}

pub(crate) fn emit_host(grid: &Grid, plan: &TilePlan) -> String {
    let mut out = String::new();
    out.push_str("\n//\n// Generated by gridfuse\n//\n// CUDA host code\n//\n");
    out.push_str("#include <iostream>\n");
    out.push_str("#include <algorithm>\n");
    out.push_str("#include <cassert>\n");

    out.push_str(&format!("void gf_program_{}(int timesteps", grid.name()));
    for field in grid.fields() {
        out.push_str(&format!(
            ", {} *Host_{}",
            field.element_type().type_name(),
            field.name()
        ));
    }
    for dim in 0..grid.dims() {
        out.push_str(&format!(", int Dim_{dim}"));
    }
    out.push_str(") {\n");

    out.push_str("  cudaError_t Result;\n");
    out.push_str("  int ArraySize = Dim_0");
    for dim in 1..grid.dims() {
        out.push_str(&format!("*Dim_{dim}"));
    }
    out.push_str(";\n");

    out.push_str("  cudaEvent_t TotalStartEvent, TotalStopEvent;\n");
    out.push_str("  cudaEventCreate(&TotalStartEvent);\n");
    out.push_str("  cudaEventCreate(&TotalStopEvent);\n");
    out.push_str("  cudaEventRecord(TotalStartEvent, 0);\n");

    for field in grid.fields() {
        let name = field.name();
        let ty = field.element_type().type_name();
        out.push_str(&format!("  {ty} *device{name}_In;\n"));
        out.push_str(&format!("  {ty} *device{name}_Out;\n"));
        out.push_str(&format!(
            "  Result = cudaMalloc(&device{name}_In, sizeof({ty})*ArraySize);\n"
        ));
        out.push_str("  assert(Result == cudaSuccess);\n");
        out.push_str(&format!(
            "  Result = cudaMalloc(&device{name}_Out, sizeof({ty})*ArraySize);\n"
        ));
        out.push_str("  assert(Result == cudaSuccess);\n");
        out.push_str(&format!("  {ty} *device{name}_InPtr = device{name}_In;\n"));
        out.push_str(&format!("  {ty} *device{name}_OutPtr = device{name}_Out;\n"));
        out.push_str(&format!(
            "  Result = cudaMemcpy(device{name}_In, Host_{name}, sizeof({ty})*ArraySize, cudaMemcpyHostToDevice);\n"
        ));
        out.push_str("  assert(Result == cudaSuccess);\n");
        out.push_str(&format!(
            "  Result = cudaMemcpy(device{name}_Out, device{name}_In, sizeof({ty})*ArraySize, cudaMemcpyDeviceToDevice);\n"
        ));
        out.push_str("  assert(Result == cudaSuccess);\n");
    }

    // Launch geometry from the block-union halos. Each block produces
    // fewer real points than it has threads; round the block count up.
    for dim in 0..grid.dims() {
        out.push_str(&format!(
            "  const int Halo_Left_{dim} = {};\n",
            plan.halo_left(dim)
        ));
        out.push_str(&format!(
            "  const int Halo_Right_{dim} = {};\n",
            plan.halo_right(dim)
        ));
        out.push_str(&format!(
            "  const int real_per_block_{dim} = {} - Halo_Left_{dim} - Halo_Right_{dim};\n",
            u64::from(plan.options().elements(dim)) * u64::from(plan.options().block_size(dim))
        ));
    }

    out.push_str(&format!("  dim3 block_size({}", plan.options().block_size(0)));
    for dim in 1..grid.dims() {
        out.push_str(&format!(", {}", plan.options().block_size(dim)));
    }
    out.push_str(");\n");

    for dim in 0..grid.dims() {
        out.push_str(&format!(
            "  int num_blocks_{dim} = Dim_{dim} / real_per_block_{dim};\n"
        ));
        out.push_str(&format!(
            "  int extra_{dim} = Dim_{dim} % real_per_block_{dim};\n"
        ));
        out.push_str(&format!(
            "  num_blocks_{dim} = num_blocks_{dim} + (extra_{dim} > 0 ? 1 : 0);\n"
        ));
    }
    out.push_str("  dim3 grid_size(num_blocks_0");
    for dim in 1..grid.dims() {
        out.push_str(&format!(", num_blocks_{dim}"));
    }
    out.push_str(");\n");

    out.push_str("  cudaThreadSynchronize();\n");
    out.push_str("  cudaEvent_t StartEvent, StopEvent;\n");
    out.push_str("  cudaEventCreate(&StartEvent);\n");
    out.push_str("  cudaEventCreate(&StopEvent);\n");
    out.push_str("  cudaEventRecord(StartEvent, 0);\n");

    out.push_str(&format!(
        "  for (int t = 0; t < timesteps; t += {}) {{\n",
        plan.options().time_tile()
    ));
    out.push_str(&format!(
        "    gf_kernel_{}<<<grid_size, block_size>>>(",
        grid.name()
    ));
    for field in grid.fields() {
        out.push_str(&format!(
            "device{0}_InPtr, device{0}_OutPtr, ",
            field.name()
        ));
    }
    for dim in 0..grid.dims() {
        if dim > 0 {
            out.push_str(", ");
        }
        out.push_str(&format!("Dim_{dim}"));
    }
    out.push_str(");\n");

    out.push_str("    cudaError_t Err = cudaGetLastError();\n");
    out.push_str("    if (Err != cudaSuccess) {\n");
    out.push_str("      std::cerr << \"Kernel launch failure (error: \" << Err << \")\\n\";\n");
    out.push_str("      abort();\n");
    out.push_str("    }\n");

    for field in grid.fields() {
        out.push_str(&format!(
            "    std::swap(device{0}_InPtr, device{0}_OutPtr);\n",
            field.name()
        ));
    }
    out.push_str("  }\n");

    out.push_str("  assert(cudaEventRecord(StopEvent, 0) == cudaSuccess);\n");
    out.push_str("  assert(cudaEventSynchronize(StopEvent) == cudaSuccess);\n");

    // The final swap leaves the freshest data behind the In pointers.
    for field in grid.fields() {
        out.push_str(&format!(
            "  Result = cudaMemcpy(Host_{0}, device{0}_InPtr, sizeof({1})*ArraySize, cudaMemcpyDeviceToHost);\n",
            field.name(),
            field.element_type().type_name()
        ));
        out.push_str("  assert(Result == cudaSuccess);\n");
    }

    out.push_str("  cudaEventRecord(TotalStopEvent, 0);\n");
    out.push_str("  assert(cudaEventSynchronize(TotalStopEvent) == cudaSuccess);\n");

    out.push_str("  double Flops = 0.0;\n");
    out.push_str("  double Points;\n");
    for function in grid.functions() {
        let bounds = function.primary_bounds();
        out.push_str(&format!(
            "  Points = (Dim_0-{})",
            u64::from(bounds[0].0) + u64::from(bounds[0].1)
        ));
        for (dim, (lower, upper)) in bounds.iter().enumerate().skip(1) {
            out.push_str(&format!(
                " * (Dim_{dim}-{})",
                u64::from(*lower) + u64::from(*upper)
            ));
        }
        out.push_str(";\n");
        out.push_str(&format!("  Flops = Flops + Points * {};\n", function.flops()));
    }
    out.push_str("  Flops = Flops * timesteps;\n");
    out.push_str("  float ElapsedMS;\n");
    out.push_str("  cudaEventElapsedTime(&ElapsedMS, StartEvent, StopEvent);\n");
    out.push_str("  double Elapsed = ElapsedMS / 1000.0;\n");
    out.push_str("  double GFlops = Flops / Elapsed / 1e9;\n");
    out.push_str("  std::cerr << \"GFlops: \" << GFlops << \"\\n\";\n");
    out.push_str("  std::cerr << \"Elapsed: \" << Elapsed << \"\\n\";\n");
    out.push_str("  float TotalElapsedMS;\n");
    out.push_str("  cudaEventElapsedTime(&TotalElapsedMS, TotalStartEvent, TotalStopEvent);\n");
    out.push_str("  double TotalElapsed = TotalElapsedMS / 1000.0;\n");
    out.push_str("  double TotalGFlops = Flops / TotalElapsed / 1e9;\n");
    out.push_str("  std::cerr << \"Total GFlops: \" << TotalGFlops << \"\\n\";\n");
    out.push_str("  std::cerr << \"Total Elapsed: \" << TotalElapsed << \"\\n\";\n");

    out.push_str("  cudaEventDestroy(StartEvent);\n");
    out.push_str("  cudaEventDestroy(StopEvent);\n");
    out.push_str("  cudaEventDestroy(TotalStartEvent);\n");
    out.push_str("  cudaEventDestroy(TotalStopEvent);\n");

    for field in grid.fields() {
        out.push_str(&format!("  cudaFree(device{}_In);\n", field.name()));
        out.push_str(&format!("  cudaFree(device{}_Out);\n", field.name()));
    }

    out.push_str("}\n");
    out
}

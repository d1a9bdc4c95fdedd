//! gridfuse - overlapped-tiling stencil compiler.
//!
//! Compiles a YAML stencil descriptor to a fused CUDA kernel plus host
//! driver:
//!
//! ```bash
//! # Two fused time-steps per launch, 64-thread blocks, to jacobi.cu
//! gridfuse jacobi.yaml -o jacobi.cu --time-tile 2 --block-size 64
//!
//! # Inspect the generated code and the computed halo regions
//! gridfuse jacobi.yaml -v
//! ```

use std::fs;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use gridfuse_core::TileOptions;
use gridfuse_cuda_codegen::{CudaBackEnd, TargetMachine};
use gridfuse_frontend::parse_descriptor;

/// Overlapped-tiling stencil compiler: YAML descriptor to CUDA.
#[derive(Parser)]
#[command(name = "gridfuse")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input stencil descriptor (YAML)
    input: String,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<String>,

    /// Fused time-steps per kernel launch
    #[arg(long, default_value = "1")]
    time_tile: u32,

    /// Per-dimension thread-block extents (comma-separated)
    #[arg(long, default_value = "8")]
    block_size: String,

    /// Per-dimension elements per thread (comma-separated)
    #[arg(long, default_value = "1")]
    elements: String,

    /// Target machine (generic, sm20)
    #[arg(long, default_value = "generic")]
    machine: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn setup_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

/// `"8,8"` -> `[8, 8]`, repeated to `dims` entries when a single value
/// is given.
fn parse_per_dim(flag: &str, value: &str, dims: usize) -> Result<Vec<u32>> {
    let parts: Vec<u32> = value
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<u32>()
                .with_context(|| format!("bad value `{part}` in --{flag}"))
        })
        .collect::<Result<_>>()?;

    match parts.as_slice() {
        [single] => Ok(vec![*single; dims]),
        parts if parts.len() == dims => Ok(parts.to_vec()),
        parts => bail!(
            "--{flag} has {} values, grid has {dims} dimensions",
            parts.len()
        ),
    }
}

fn run(cli: &Cli) -> Result<()> {
    let source = fs::read_to_string(&cli.input)
        .with_context(|| format!("cannot read `{}`", cli.input))?;
    let grid = parse_descriptor(&source)
        .with_context(|| format!("cannot parse `{}`", cli.input))?;

    if cli.time_tile < 1 {
        bail!("--time-tile must be at least 1");
    }
    let machine = match TargetMachine::parse(&cli.machine) {
        Some(machine) => machine,
        None => bail!("unknown target machine `{}`", cli.machine),
    };

    let opts = TileOptions::for_dims(grid.dims())
        .with_block_size(parse_per_dim("block-size", &cli.block_size, grid.dims())?)
        .with_elements(parse_per_dim("elements", &cli.elements, grid.dims())?)
        .with_time_tile(cli.time_tile);

    let mut backend = CudaBackEnd::new(&grid, opts).with_machine(machine);
    backend.run();
    let code = backend.codegen();

    match &cli.output {
        Some(path) => fs::write(path, code)
            .with_context(|| format!("cannot write `{path}`"))?,
        None => print!("{code}"),
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", "Error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

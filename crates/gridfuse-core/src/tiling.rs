//! The region propagation engine.
//!
//! Overlapped tiling fuses T time-steps into one kernel launch; each
//! block must then compute redundant halo values so no inter-block
//! communication happens mid-group. [`TilePlan::build`] runs the
//! backward dataflow that sizes those halos: iterate fused sub-steps in
//! reverse temporal order, walk the function list in reverse program
//! order, and grow each input field's region to cover what the already
//! accumulated output requirement reads.

use tracing::debug;

use crate::{FieldId, Grid, Region};

/// Tiling configuration: block geometry and time-tile size.
#[derive(Debug, Clone)]
pub struct TileOptions {
    block_size: Vec<u32>,
    elements: Vec<u32>,
    time_tile: u32,
}

impl TileOptions {
    /// Defaults for a grid of `dims` dimensions: block extent 8, one
    /// element per thread, time-tile size 1.
    pub fn for_dims(dims: usize) -> Self {
        Self {
            block_size: vec![8; dims],
            elements: vec![1; dims],
            time_tile: 1,
        }
    }

    /// Set the per-dimension thread-block extents.
    pub fn with_block_size(mut self, block_size: Vec<u32>) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the per-dimension elements-per-thread unroll factors.
    pub fn with_elements(mut self, elements: Vec<u32>) -> Self {
        self.elements = elements;
        self
    }

    /// Set the number of fused time-steps per kernel launch.
    pub fn with_time_tile(mut self, time_tile: u32) -> Self {
        self.time_tile = time_tile;
        self
    }

    /// Thread-block extent along `dim`.
    pub fn block_size(&self, dim: usize) -> u32 {
        self.block_size[dim]
    }

    /// Elements per thread along `dim`.
    pub fn elements(&self, dim: usize) -> u32 {
        self.elements[dim]
    }

    /// Fused time-steps per launch.
    pub fn time_tile(&self) -> u32 {
        self.time_tile
    }
}

/// The frozen result of region propagation, consumed by code
/// generators.
#[derive(Debug, Clone)]
pub struct TilePlan {
    opts: TileOptions,
    regions: Vec<Region>,
    update_order: Vec<FieldId>,
    block_region: Region,
    halo_left: Vec<i64>,
    halo_right: Vec<i64>,
    max_left: Vec<i64>,
    max_right: Vec<i64>,
}

impl TilePlan {
    /// Run region propagation for `grid` under `opts`.
    ///
    /// Panics if the options' per-dimension vectors do not match the
    /// grid's dimensionality, or if the time-tile size is zero: both are
    /// configuration-plumbing bugs, not user input.
    pub fn build(grid: &Grid, opts: &TileOptions) -> TilePlan {
        let dims = grid.dims();
        assert_eq!(opts.block_size.len(), dims, "block size arity mismatch");
        assert_eq!(opts.elements.len(), dims, "elements arity mismatch");
        assert!(opts.time_tile >= 1, "time tile size must be at least 1");

        let mut regions: Vec<Region> =
            grid.fields().iter().map(|_| Region::unit(dims)).collect();

        let update_order: Vec<FieldId> =
            grid.functions().iter().map(|f| f.output()).collect();

        debug!(
            order = %format_order(grid, &update_order),
            "field update order"
        );
        for field in grid.fields() {
            debug!(field = field.name(), region = %regions[field.id().index()], "initial region");
        }

        let time_tile = opts.time_tile;
        for i in 0..time_tile {
            let sub_step = time_tile - i - 1;
            debug!(sub_step, "propagating sub-step");

            // The reversed-last iteration reaches sub-step 0, where any
            // field not already recomputed within the group is read
            // straight from global memory and must not grow the
            // shared-memory halo. A group of one has no intra-group
            // reuse to protect, so the gate only applies for T > 1.
            let last_step = i + 1 == time_tile && time_tile > 1;

            for function in grid.functions().iter().rev() {
                let out = function.output();
                // Snapshot before growing any input: the output
                // requirement being read must not move mid-function.
                let out_region = regions[out.index()].clone();

                for input in function.input_fields() {
                    function.adjust_region(
                        input,
                        &mut regions[input.index()],
                        &out_region,
                        &update_order,
                        last_step,
                    );
                }
            }
        }

        let mut block_region = Region::unit(dims);
        for region in &regions {
            block_region = Region::union(&block_region, region);
        }

        let mut halo_left = Vec::with_capacity(dims);
        let mut halo_right = Vec::with_capacity(dims);
        for dim in 0..dims {
            let bound = block_region.bound(dim);
            let left = (-bound.lower).max(0);
            halo_left.push(left);
            halo_right.push(bound.extent - left - 1);
        }

        let mut max_left = vec![0i64; dims];
        let mut max_right = vec![0i64; dims];
        for field in grid.fields() {
            for function in grid.functions() {
                for dim in 0..dims {
                    let (left, right) = function.max_offsets(field.id(), dim);
                    max_left[dim] = max_left[dim].max(left);
                    max_right[dim] = max_right[dim].max(right);
                }
            }
        }

        for field in grid.fields() {
            debug!(field = field.name(), region = %regions[field.id().index()], "final region");
        }

        TilePlan {
            opts: opts.clone(),
            regions,
            update_order,
            block_region,
            halo_left,
            halo_right,
            max_left,
            max_right,
        }
    }

    /// The final halo-inclusive region for `field`.
    pub fn region(&self, field: FieldId) -> &Region {
        self.regions
            .get(field.index())
            .unwrap_or_else(|| panic!("no region for {field}: field not attached"))
    }

    /// Output fields in function program order.
    pub fn update_order(&self) -> &[FieldId] {
        &self.update_order
    }

    /// Union of all per-field regions: the single halo rectangle used
    /// for block geometry.
    pub fn block_region(&self) -> &Region {
        &self.block_region
    }

    /// Left halo width along `dim` (threads below the real output).
    pub fn halo_left(&self, dim: usize) -> i64 {
        self.halo_left[dim]
    }

    /// Right halo width along `dim`.
    pub fn halo_right(&self, dim: usize) -> i64 {
        self.halo_right[dim]
    }

    /// Largest left offset along `dim` over all fields and functions.
    pub fn max_left(&self, dim: usize) -> i64 {
        self.max_left[dim]
    }

    /// Largest right offset along `dim` over all fields and functions.
    pub fn max_right(&self, dim: usize) -> i64 {
        self.max_right[dim]
    }

    /// Shared-memory buffer extent along `dim`: the local tile plus the
    /// maximum stencil radius on each side.
    pub fn shared_extent(&self, dim: usize) -> i64 {
        i64::from(self.opts.elements(dim)) * i64::from(self.opts.block_size(dim))
            + self.max_left[dim]
            + self.max_right[dim]
    }

    /// The tiling options the plan was built with.
    pub fn options(&self) -> &TileOptions {
        &self.opts
    }
}

fn format_order(grid: &Grid, order: &[FieldId]) -> String {
    let names: Vec<&str> = order.iter().map(|&f| grid.field(f).name()).collect();
    format!("<{}>", names.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ElementType, Expr, StencilFunction};

    fn three_point(field: FieldId) -> Expr {
        Expr::add(
            Expr::add(
                Expr::field_ref(field, vec![-1]),
                Expr::field_ref(field, vec![0]),
            ),
            Expr::field_ref(field, vec![1]),
        )
    }

    /// 1-D grid, B[i] = 0.333 * (A[i-1] + A[i] + A[i+1]).
    fn jacobi_grid() -> (Grid, FieldId, FieldId) {
        let mut grid = Grid::new("jacobi1d", 1);
        let a = grid.attach_field("A", ElementType::F32).unwrap();
        let b = grid.attach_field("B", ElementType::F32).unwrap();
        let expr = Expr::mul(Expr::F32Const(0.333), three_point(a));
        grid.append_function(StencilFunction::new("update", b, expr, vec![(1, 1)]));
        (grid, a, b)
    }

    #[test]
    fn test_round_trip_scenario() {
        let (grid, a, b) = jacobi_grid();
        let plan = TilePlan::build(&grid, &TileOptions::for_dims(1));

        assert_eq!(plan.region(a).bound(0).lower, -1);
        assert_eq!(plan.region(a).bound(0).extent, 3);
        assert_eq!(plan.region(b).bound(0).lower, 0);
        assert_eq!(plan.region(b).bound(0).extent, 1);

        // One multiply plus two adds in the update expression.
        assert_eq!(grid.functions()[0].flops(), 3.0);

        // Block halos come from the union region.
        assert_eq!(plan.halo_left(0), 1);
        assert_eq!(plan.halo_right(0), 1);
        assert_eq!(plan.max_left(0), 1);
        assert_eq!(plan.max_right(0), 1);
    }

    #[test]
    fn test_region_monotone_in_time_tile() {
        let (grid, a, _) = jacobi_grid();
        let mut prev_extent = 0;
        for t in 1..=4 {
            let opts = TileOptions::for_dims(1).with_time_tile(t);
            let plan = TilePlan::build(&grid, &opts);
            let bound = plan.region(a).bound(0);
            assert!(
                bound.extent >= prev_extent,
                "region shrank going to T={t}"
            );
            prev_extent = bound.extent;
        }
    }

    #[test]
    fn test_self_update_halo_grows_with_time_tile() {
        // A[i] = (A[i-1] + A[i] + A[i+1]) updated in place: sub-step 0
        // reads global directly, so T fused steps need (T-1) halo rings.
        let mut grid = Grid::new("relax", 1);
        let a = grid.attach_field("A", ElementType::F32).unwrap();
        grid.append_function(StencilFunction::new(
            "relax",
            a,
            three_point(a),
            vec![(1, 1)],
        ));

        for (t, expected_lower) in [(2, -1), (3, -2), (4, -3)] {
            let opts = TileOptions::for_dims(1).with_time_tile(t);
            let plan = TilePlan::build(&grid, &opts);
            assert_eq!(plan.region(a).bound(0).lower, expected_lower, "T={t}");
        }
    }

    #[test]
    fn test_liveness_gating_for_chained_functions() {
        // B = g(A); A = h(A, B) in program order. At the reversed-last
        // sub-step the self-read of A is not live (A is not recomputed
        // before h runs in the group), so only the read through B and
        // non-final sub-steps grow Region[A].
        let mut grid = Grid::new("chain", 1);
        let a = grid.attach_field("A", ElementType::F32).unwrap();
        let b = grid.attach_field("B", ElementType::F32).unwrap();

        // g: B[i] = A[i-1] + A[i+1]
        let g = Expr::add(Expr::field_ref(a, vec![-1]), Expr::field_ref(a, vec![1]));
        grid.append_function(StencilFunction::new("g", b, g, vec![(1, 1)]));
        // h: A[i] = A[i-2] + B[i]
        let h = Expr::add(Expr::field_ref(a, vec![-2]), Expr::field_ref(b, vec![0]));
        grid.append_function(StencilFunction::new("h", a, h, vec![(2, 0)]));

        let plan = TilePlan::build(&grid, &TileOptions::for_dims(1).with_time_tile(2));

        // Sub-step 1 (ungated): h grows A by its self-read to (-2, 3)
        // and B to (0, 1); g then grows A through B to (-2, 3) union
        // (-1, 3) = (-2, 4). Sub-step 0 (gated): h's self-read of A is
        // skipped; B is live (updated before h) and grows via h; g's
        // read of A is skipped (A is not updated before g).
        let a_bound = plan.region(a).bound(0);
        assert_eq!(a_bound.lower, -2);

        // The gated self-read must not have added another 2 rings to
        // the left: that would give lower = -4.
        assert!(a_bound.lower > -4, "gated read grew the region");
    }

    #[test]
    fn test_unreferenced_field_keeps_unit_region() {
        let (mut grid, _, _) = jacobi_grid();
        let c = grid.attach_field("C", ElementType::F64).unwrap();
        let plan = TilePlan::build(&grid, &TileOptions::for_dims(1).with_time_tile(3));
        assert_eq!(*plan.region(c), Region::unit(1));
    }

    #[test]
    fn test_shared_extent() {
        let (grid, _, _) = jacobi_grid();
        let opts = TileOptions::for_dims(1)
            .with_block_size(vec![32])
            .with_elements(vec![2]);
        let plan = TilePlan::build(&grid, &opts);
        // 2 elements * 32 threads + left radius 1 + right radius 1
        assert_eq!(plan.shared_extent(0), 66);
    }

    #[test]
    fn test_two_dimensional_regions() {
        let mut grid = Grid::new("heat2d", 2);
        let a = grid.attach_field("A", ElementType::F32).unwrap();
        let b = grid.attach_field("B", ElementType::F32).unwrap();

        // Five-point stencil
        let expr = Expr::add(
            Expr::add(
                Expr::add(
                    Expr::field_ref(a, vec![-1, 0]),
                    Expr::field_ref(a, vec![1, 0]),
                ),
                Expr::add(
                    Expr::field_ref(a, vec![0, -1]),
                    Expr::field_ref(a, vec![0, 1]),
                ),
            ),
            Expr::field_ref(a, vec![0, 0]),
        );
        grid.append_function(StencilFunction::new(
            "diffuse",
            b,
            expr,
            vec![(1, 1), (1, 1)],
        ));

        let plan = TilePlan::build(&grid, &TileOptions::for_dims(2));
        for dim in 0..2 {
            assert_eq!(plan.region(a).bound(dim).lower, -1);
            assert_eq!(plan.region(a).bound(dim).extent, 3);
        }
        assert_eq!(grid.functions()[0].flops(), 4.0);
    }

    #[test]
    #[should_panic(expected = "time tile size must be at least 1")]
    fn test_zero_time_tile_rejected() {
        let (grid, _, _) = jacobi_grid();
        TilePlan::build(&grid, &TileOptions::for_dims(1).with_time_tile(0));
    }
}

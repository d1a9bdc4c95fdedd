//! Rectangular regions in Z^n.
//!
//! A region records, per dimension, the `(lower, extent)` index range a
//! thread block must materialize for one field, relative to the block's
//! output origin. Regions start as the unit rectangle and only ever grow
//! during propagation; after the tiling engine runs they are frozen and
//! read by the code generators.

use std::fmt;

/// One dimension of a region: `extent` indices starting at `lower`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bound {
    /// Lowest covered index, relative to the output origin (usually <= 0).
    pub lower: i64,
    /// Number of covered indices (>= 1).
    pub extent: i64,
}

impl Bound {
    /// The first index past the covered range.
    pub fn upper(&self) -> i64 {
        self.lower + self.extent
    }
}

/// A rectangular region of needed grid indices, one [`Bound`] per
/// dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    bounds: Vec<Bound>,
}

impl Region {
    /// The unit region: extent 1 at offset 0 in every dimension.
    pub fn unit(dims: usize) -> Self {
        Self {
            bounds: vec![Bound { lower: 0, extent: 1 }; dims],
        }
    }

    /// Number of dimensions.
    pub fn dims(&self) -> usize {
        self.bounds.len()
    }

    /// The bound along dimension `dim`.
    pub fn bound(&self, dim: usize) -> Bound {
        assert!(dim < self.bounds.len(), "dimension {dim} out of range");
        self.bounds[dim]
    }

    /// Replace the bound along dimension `dim`.
    pub fn set_bound(&mut self, dim: usize, bound: Bound) {
        assert!(dim < self.bounds.len(), "dimension {dim} out of range");
        assert!(bound.extent >= 1, "region extent must be positive");
        self.bounds[dim] = bound;
    }

    /// Smallest rectangle covering both `a` and `b`.
    pub fn union(a: &Region, b: &Region) -> Region {
        assert_eq!(a.dims(), b.dims(), "region dimensionality mismatch");

        let mut out = Region::unit(a.dims());
        for i in 0..a.dims() {
            let ab = a.bound(i);
            let bb = b.bound(i);

            let mut merged = ab;
            if bb.lower < merged.lower {
                let diff = merged.lower - bb.lower;
                merged.lower = bb.lower;
                merged.extent += diff;
            }
            if bb.upper() > merged.upper() {
                merged.extent += bb.upper() - merged.upper();
            }
            out.set_bound(i, merged);
        }
        out
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<")?;
        for (i, b) in self.bounds.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "[{}, {}]", b.lower, b.extent)?;
        }
        write!(f, ">")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_region() {
        let r = Region::unit(3);
        assert_eq!(r.dims(), 3);
        for i in 0..3 {
            assert_eq!(r.bound(i), Bound { lower: 0, extent: 1 });
        }
    }

    #[test]
    fn test_union_covers_both() {
        let mut a = Region::unit(1);
        a.set_bound(0, Bound { lower: -1, extent: 3 });
        let mut b = Region::unit(1);
        b.set_bound(0, Bound { lower: -2, extent: 2 });

        // {-1..1} union {-2..-1} covers -2..1
        let u = Region::union(&a, &b);
        assert_eq!(u.bound(0), Bound { lower: -2, extent: 4 });

        // Union is symmetric
        let u = Region::union(&b, &a);
        assert_eq!(u.bound(0), Bound { lower: -2, extent: 4 });
    }

    #[test]
    fn test_union_with_unit_is_identity_for_covering_region() {
        let mut a = Region::unit(2);
        a.set_bound(0, Bound { lower: -2, extent: 5 });
        let u = Region::union(&a, &Region::unit(2));
        assert_eq!(u.bound(0), Bound { lower: -2, extent: 5 });
        assert_eq!(u.bound(1), Bound { lower: 0, extent: 1 });
    }

    #[test]
    fn test_display() {
        let mut r = Region::unit(2);
        r.set_bound(0, Bound { lower: -1, extent: 3 });
        assert_eq!(format!("{r}"), "<[-1, 3], [0, 1]>");
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_bound_out_of_range_panics() {
        Region::unit(1).bound(1);
    }
}

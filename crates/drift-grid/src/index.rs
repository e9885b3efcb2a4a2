//! Grid description and block partitioning.

use drift_core::{BlockCoord, BlockExtent, BlockId, ErrorKind};

use crate::axis::{Axis, AxisPosition};
use crate::error::GridError;

/// The 2x2x2 neighbourhood of a sample point, in global `(z, y, x)` indices.
///
/// `lower` and `upper` coincide along an axis of length 1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellLocation {
    /// Lower corner indices.
    pub lower: [usize; 3],
    /// Upper corner indices.
    pub upper: [usize; 3],
    /// Fractional offsets from the lower corner, each in `[0, 1]`.
    pub frac: [f64; 3],
}

impl CellLocation {
    /// Global index of stencil corner `(dz, dy, dx)`, each 0 or 1.
    pub fn corner(&self, dz: usize, dy: usize, dx: usize) -> [usize; 3] {
        let pick = |axis: usize, d: usize| {
            if d == 0 {
                self.lower[axis]
            } else {
                self.upper[axis]
            }
        };
        [pick(0, dz), pick(1, dy), pick(2, dx)]
    }
}

/// Immutable description of a dataset's axes and its block partitioning.
///
/// Block ids are the row-major composition `(z, y, x)` of block
/// coordinates, so [`block_id`](Self::block_id) and
/// [`block_coord`](Self::block_coord) are inverses.
#[derive(Clone, Debug)]
pub struct GridIndex {
    x: Axis,
    y: Axis,
    z: Axis,
    time: Axis,
    block_shape: [usize; 3],
    block_counts: [usize; 3],
}

impl GridIndex {
    /// Build a grid from its axes and a `(z, y, x)` block shape.
    ///
    /// A block shape larger than the axis yields a single block along it.
    pub fn new(
        x: Vec<f64>,
        y: Vec<f64>,
        z: Vec<f64>,
        time: Vec<f64>,
        block_shape: [usize; 3],
    ) -> Result<Self, GridError> {
        let x = Axis::new("x", x)?;
        let y = Axis::new("y", y)?;
        let z = Axis::new("z", z)?;
        let time = Axis::new("time", time)?;
        for (axis, &s) in ["z", "y", "x"].into_iter().zip(block_shape.iter()) {
            if s == 0 {
                return Err(GridError::ZeroBlockShape { axis });
            }
        }
        let dims = [z.len(), y.len(), x.len()];
        let block_counts = [
            dims[0].div_ceil(block_shape[0]),
            dims[1].div_ceil(block_shape[1]),
            dims[2].div_ceil(block_shape[2]),
        ];
        Ok(Self {
            x,
            y,
            z,
            time,
            block_shape,
            block_counts,
        })
    }

    /// The x axis.
    pub fn x(&self) -> &Axis {
        &self.x
    }

    /// The y axis.
    pub fn y(&self) -> &Axis {
        &self.y
    }

    /// The z (depth) axis.
    pub fn z(&self) -> &Axis {
        &self.z
    }

    /// The time axis.
    pub fn time(&self) -> &Axis {
        &self.time
    }

    /// Spatial dimensions `(nz, ny, nx)`.
    pub fn dims(&self) -> [usize; 3] {
        [self.z.len(), self.y.len(), self.x.len()]
    }

    /// Number of snapshots.
    pub fn nt(&self) -> usize {
        self.time.len()
    }

    /// Block shape `(z, y, x)`.
    pub fn block_shape(&self) -> [usize; 3] {
        self.block_shape
    }

    /// Number of blocks along each spatial axis.
    pub fn block_counts(&self) -> [usize; 3] {
        self.block_counts
    }

    /// Total number of blocks.
    pub fn block_count(&self) -> usize {
        self.block_counts.iter().product()
    }

    /// Row-major id of a block coordinate.
    pub fn block_id(&self, coord: BlockCoord) -> BlockId {
        let [_, by, bx] = self.block_counts;
        BlockId((coord.z * by + coord.y) * bx + coord.x)
    }

    /// Inverse of [`block_id`](Self::block_id).
    pub fn block_coord(&self, id: BlockId) -> BlockCoord {
        let [_, by, bx] = self.block_counts;
        let x = id.0 % bx;
        let y = (id.0 / bx) % by;
        let z = id.0 / (bx * by);
        BlockCoord::new(z, y, x)
    }

    /// Block containing global cell `(k, j, i)`.
    pub fn block_of(&self, k: usize, j: usize, i: usize) -> BlockCoord {
        let [sz, sy, sx] = self.block_shape;
        BlockCoord::new(k / sz, j / sy, i / sx)
    }

    /// Origin and (edge-truncated) shape of a block.
    pub fn block_extent(&self, coord: BlockCoord) -> BlockExtent {
        let dims = self.dims();
        let c = [coord.z, coord.y, coord.x];
        let mut origin = [0; 3];
        let mut shape = [0; 3];
        for a in 0..3 {
            origin[a] = c[a] * self.block_shape[a];
            shape[a] = self.block_shape[a].min(dims[a].saturating_sub(origin[a]));
        }
        BlockExtent {
            coord,
            origin,
            shape,
        }
    }

    /// Locate a spatial position.
    ///
    /// A depth above the first z level is [`ErrorKind::ThroughSurface`];
    /// anything else outside the axes is [`ErrorKind::OutOfBounds`].
    pub fn search(&self, z: f64, y: f64, x: f64) -> Result<CellLocation, ErrorKind> {
        let pz = match self.z.locate(z) {
            AxisPosition::Below => return Err(ErrorKind::ThroughSurface),
            AxisPosition::Above => return Err(ErrorKind::OutOfBounds),
            AxisPosition::Inside { index, frac } => (index, frac),
        };
        let py = inside(self.y.locate(y))?;
        let px = inside(self.x.locate(x))?;
        let dims = self.dims();
        let upper = |axis: usize, index: usize| (index + 1).min(dims[axis] - 1);
        Ok(CellLocation {
            lower: [pz.0, py.0, px.0],
            upper: [upper(0, pz.0), upper(1, py.0), upper(2, px.0)],
            frac: [pz.1, py.1, px.1],
        })
    }
}

fn inside(pos: AxisPosition) -> Result<(usize, f64), ErrorKind> {
    match pos {
        AxisPosition::Inside { index, frac } => Ok((index, frac)),
        AxisPosition::Below | AxisPosition::Above => Err(ErrorKind::OutOfBounds),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn lin(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64).collect()
    }

    fn grid(nz: usize, ny: usize, nx: usize, shape: [usize; 3]) -> GridIndex {
        GridIndex::new(lin(nx), lin(ny), lin(nz), vec![0.0], shape).unwrap()
    }

    #[test]
    fn block_counts_cover_extent() {
        let g = grid(5, 7, 9, [2, 3, 4]);
        assert_eq!(g.block_counts(), [3, 3, 3]);
        assert_eq!(g.block_count(), 27);
        let last = g.block_extent(BlockCoord::new(2, 2, 2));
        assert_eq!(last.origin, [4, 6, 8]);
        assert_eq!(last.shape, [1, 1, 1]);
    }

    #[test]
    fn zero_block_shape_rejected() {
        let err = GridIndex::new(lin(2), lin(2), lin(2), vec![0.0], [1, 0, 1]).unwrap_err();
        assert_eq!(err, GridError::ZeroBlockShape { axis: "y" });
    }

    #[test]
    fn search_classifies_outside() {
        let g = grid(3, 3, 3, [3, 3, 3]);
        assert_eq!(g.search(-0.5, 1.0, 1.0), Err(ErrorKind::ThroughSurface));
        assert_eq!(g.search(2.5, 1.0, 1.0), Err(ErrorKind::OutOfBounds));
        assert_eq!(g.search(1.0, -1.0, 1.0), Err(ErrorKind::OutOfBounds));
        assert_eq!(g.search(1.0, 1.0, 3.5), Err(ErrorKind::OutOfBounds));
    }

    #[test]
    fn search_single_level_depth() {
        let g = GridIndex::new(lin(4), lin(4), vec![0.0], vec![0.0], [1, 2, 2]).unwrap();
        let loc = g.search(250.0, 1.5, 2.25).unwrap();
        assert_eq!(loc.lower, [0, 1, 2]);
        assert_eq!(loc.upper, [0, 2, 3]);
        assert_eq!(loc.frac, [0.0, 0.5, 0.25]);
    }

    proptest! {
        #[test]
        fn every_cell_lies_in_its_block(
            nz in 1usize..8, ny in 1usize..8, nx in 1usize..8,
            sz in 1usize..5, sy in 1usize..5, sx in 1usize..5,
        ) {
            let g = grid(nz, ny, nx, [sz, sy, sx]);
            for k in 0..nz {
                for j in 0..ny {
                    for i in 0..nx {
                        let coord = g.block_of(k, j, i);
                        prop_assert!(g.block_extent(coord).contains(k, j, i));
                        let id = g.block_id(coord);
                        prop_assert!(id.0 < g.block_count());
                        prop_assert_eq!(g.block_coord(id), coord);
                    }
                }
            }
        }
    }
}

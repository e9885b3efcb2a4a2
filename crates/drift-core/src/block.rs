//! Spatial blocks: the unit of lazy loading.

/// Coordinates of a block in a grid's block lattice, in `(z, y, x)` order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockCoord {
    /// Block index along the vertical axis.
    pub z: usize,
    /// Block index along the meridional axis.
    pub y: usize,
    /// Block index along the zonal axis.
    pub x: usize,
}

impl BlockCoord {
    /// Construct a block coordinate.
    pub fn new(z: usize, y: usize, x: usize) -> Self {
        Self { z, y, x }
    }
}

/// The index range a block covers in the full grid.
///
/// `origin` is the global `(k, j, i)` index of the block's first cell and
/// `shape` its extent along each axis. Edge blocks may be smaller than
/// the nominal block shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockExtent {
    /// Position of the block in the block lattice.
    pub coord: BlockCoord,
    /// Global index of the first cell, `(k, j, i)`.
    pub origin: [usize; 3],
    /// Number of cells along `(z, y, x)`.
    pub shape: [usize; 3],
}

impl BlockExtent {
    /// Number of cells in the block.
    pub fn cell_count(&self) -> usize {
        self.shape[0] * self.shape[1] * self.shape[2]
    }

    /// Whether the global index `(k, j, i)` falls inside this block.
    pub fn contains(&self, k: usize, j: usize, i: usize) -> bool {
        let [k0, j0, i0] = self.origin;
        let [nk, nj, ni] = self.shape;
        k >= k0 && k < k0 + nk && j >= j0 && j < j0 + nj && i >= i0 && i < i0 + ni
    }
}

/// One time layer of one spatial block of one field.
///
/// Values are stored row-major in `(z, y, x)` order.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    extent: BlockExtent,
    data: Vec<f32>,
}

impl Block {
    /// Wrap raw values for `extent`.
    ///
    /// Returns `None` if `data` does not hold exactly one value per cell.
    pub fn new(extent: BlockExtent, data: Vec<f32>) -> Option<Self> {
        if data.len() != extent.cell_count() {
            return None;
        }
        Some(Self { extent, data })
    }

    /// The region of the grid this block covers.
    pub fn extent(&self) -> &BlockExtent {
        &self.extent
    }

    /// Raw values in row-major `(z, y, x)` order.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable raw values, used to clean data right after loading.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Value at global grid index `(k, j, i)`, or `None` if the index is
    /// not inside this block.
    pub fn value(&self, k: usize, j: usize, i: usize) -> Option<f32> {
        if !self.extent.contains(k, j, i) {
            return None;
        }
        let [k0, j0, i0] = self.extent.origin;
        let [_, nj, ni] = self.extent.shape;
        let local = ((k - k0) * nj + (j - j0)) * ni + (i - i0);
        self.data.get(local).copied()
    }

    /// Heap bytes held by the block's values.
    pub fn memory_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent() -> BlockExtent {
        BlockExtent {
            coord: BlockCoord::new(0, 1, 2),
            origin: [0, 4, 8],
            shape: [1, 2, 3],
        }
    }

    #[test]
    fn new_rejects_wrong_length() {
        assert!(Block::new(extent(), vec![0.0; 5]).is_none());
        assert!(Block::new(extent(), vec![0.0; 6]).is_some());
    }

    #[test]
    fn value_uses_global_indices() {
        let block = Block::new(extent(), (0..6).map(|v| v as f32).collect()).unwrap();
        assert_eq!(block.value(0, 4, 8), Some(0.0));
        assert_eq!(block.value(0, 4, 10), Some(2.0));
        assert_eq!(block.value(0, 5, 8), Some(3.0));
        assert_eq!(block.value(0, 5, 10), Some(5.0));
    }

    #[test]
    fn value_outside_extent_is_none() {
        let block = Block::new(extent(), vec![1.0; 6]).unwrap();
        assert_eq!(block.value(0, 3, 8), None);
        assert_eq!(block.value(1, 4, 8), None);
        assert_eq!(block.value(0, 4, 11), None);
    }

    proptest::proptest! {
        #[test]
        fn every_cell_maps_to_its_own_value(
            origin in proptest::array::uniform3(0usize..20),
            shape in proptest::array::uniform3(1usize..5),
        ) {
            let extent = BlockExtent { coord: BlockCoord::new(0, 0, 0), origin, shape };
            let n = extent.cell_count();
            let block = Block::new(extent, (0..n).map(|v| v as f32).collect()).unwrap();
            let mut seen = Vec::with_capacity(n);
            for k in origin[0]..origin[0] + shape[0] {
                for j in origin[1]..origin[1] + shape[1] {
                    for i in origin[2]..origin[2] + shape[2] {
                        seen.push(block.value(k, j, i).unwrap());
                    }
                }
            }
            proptest::prop_assert_eq!(seen, block.data().to_vec());
        }
    }

    #[test]
    fn memory_bytes_counts_values() {
        let block = Block::new(extent(), vec![1.0; 6]).unwrap();
        assert_eq!(block.memory_bytes(), 24);
    }
}

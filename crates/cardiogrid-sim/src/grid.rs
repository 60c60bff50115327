//! Tissue grid geometry and kernel launch sizing.

use cardiogrid_core::{CardioError, ModelDescriptor, Result};

/// Threads per block in the x direction.
const LOCAL_X: u32 = 32;

/// A rectangular grid of coupled cells; 1-D is the `ny == 1` case.
///
/// Cells are stored row-major: cell `(x, y)` lives at flat index
/// `y * nx + x`, and each cell's state scalars are contiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TissueGrid {
    /// Cells in the x direction.
    pub nx: usize,
    /// Cells in the y direction.
    pub ny: usize,
}

impl TissueGrid {
    /// Create a grid; both dimensions must be at least 1.
    pub fn new(nx: usize, ny: usize) -> Result<Self> {
        if nx == 0 || ny == 0 {
            return Err(CardioError::config(format!(
                "Grid dimensions must be positive, got {nx}x{ny}"
            )));
        }
        Ok(Self { nx, ny })
    }

    /// Total number of cells.
    pub fn cell_count(&self) -> usize {
        self.nx * self.ny
    }

    /// Flat index of cell `(x, y)`.
    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.nx + x
    }

    /// True for a single-row grid.
    pub fn is_1d(&self) -> bool {
        self.ny == 1
    }

    /// Length of the state (and derivative) array for a model.
    pub fn state_len(&self, descriptor: &ModelDescriptor) -> usize {
        self.cell_count() * descriptor.n_state
    }

    /// Length of the slow-cache array for a model.
    pub fn cache_len(&self, descriptor: &ModelDescriptor) -> usize {
        self.cell_count() * descriptor.n_cache
    }

    /// Threads per block: `(32, 4)` for 2-D grids, `(32, 1)` for a row.
    pub fn local_size(&self) -> (u32, u32) {
        (LOCAL_X, if self.ny > 1 { 4 } else { 1 })
    }

    /// Work items per dimension, rounded up to a multiple of the local size.
    ///
    /// Kernels bounds-check against `nx, ny`; the padding threads return
    /// immediately.
    pub fn global_size(&self) -> (u32, u32) {
        let (lx, ly) = self.local_size();
        (round_up(self.nx, lx), round_up(self.ny, ly))
    }
}

/// Smallest multiple of `local` that covers `total` items.
fn round_up(total: usize, local: u32) -> u32 {
    let total = total as u32;
    total.div_ceil(local) * local
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(n_state: usize, n_cache: usize) -> ModelDescriptor {
        ModelDescriptor {
            n_state,
            n_cache,
            state_names: (0..n_state).map(|i| format!("c.s{i}")).collect(),
            time_binding: None,
            pace_binding: None,
            time_step_binding: None,
            diffusion_binding: None,
        }
    }

    #[test]
    fn test_dimensions_must_be_positive() {
        assert!(TissueGrid::new(0, 1).is_err());
        assert!(TissueGrid::new(1, 0).is_err());
        assert!(TissueGrid::new(1, 1).is_ok());
    }

    #[test]
    fn test_flat_indexing() {
        let grid = TissueGrid::new(4, 3).unwrap();
        assert_eq!(grid.index(0, 0), 0);
        assert_eq!(grid.index(3, 0), 3);
        assert_eq!(grid.index(0, 1), 4);
        assert_eq!(grid.index(3, 2), 11);
        assert_eq!(grid.cell_count(), 12);
    }

    #[test]
    fn test_array_sizing() {
        let grid = TissueGrid::new(5, 2).unwrap();
        let d = descriptor(8, 3);
        assert_eq!(grid.state_len(&d), 80);
        assert_eq!(grid.cache_len(&d), 30);
    }

    #[test]
    fn test_local_size_collapses_in_1d() {
        assert_eq!(TissueGrid::new(100, 1).unwrap().local_size(), (32, 1));
        assert_eq!(TissueGrid::new(10, 10).unwrap().local_size(), (32, 4));
    }

    #[test]
    fn test_global_size_rounds_up() {
        let grid = TissueGrid::new(33, 5).unwrap();
        assert_eq!(grid.global_size(), (64, 8));
        let grid = TissueGrid::new(32, 1).unwrap();
        assert_eq!(grid.global_size(), (32, 1));
    }
}

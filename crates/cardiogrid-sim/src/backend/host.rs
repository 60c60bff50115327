//! Host backend with the device path's split-cache semantics.
//!
//! Runs the same diffusion / slow / fast / step sequence on the CPU for a
//! [`CellModel`] written in Rust. Useful for small grids, for machines
//! without a GPU, and for exercising the integrator loop in ordinary tests.

use cardiogrid_core::{CardioError, Real, Result};

use crate::backend::{KernelArgs, TissueBackend};
use crate::grid::TissueGrid;

/// Per-cell scalar inputs to a [`CellModel`] evaluation.
#[derive(Debug, Clone, Copy)]
pub struct CellInputs {
    /// Simulation time at the start of the step.
    pub time: Real,
    /// Step size about to be applied.
    pub dt: Real,
    /// Effective stimulus level: the pacing level inside the paced
    /// rectangle, zero outside it. Generated device code gates the stimulus
    /// the same way.
    pub pace: Real,
    /// Diffusion current entering this cell.
    pub idiff: Real,
}

/// The per-cell ODE model, split into slow and fast evaluations.
///
/// `slow_derivs` evaluates every intermediate and refills this cell's cache
/// slots; `fast_derivs` reuses the cache and recomputes only the rapidly
/// varying intermediates. Both write the full derivative vector.
pub trait CellModel {
    /// Number of state variables per cell.
    fn n_state(&self) -> usize;

    /// Number of cached intermediates per cell.
    fn n_cache(&self) -> usize;

    /// Full right-hand side; refills `cache` for later fast evaluations.
    fn slow_derivs(&self, inputs: &CellInputs, state: &[Real], cache: &mut [Real], deriv: &mut [Real]);

    /// Right-hand side reusing the cached intermediates.
    fn fast_derivs(&self, inputs: &CellInputs, state: &[Real], cache: &[Real], deriv: &mut [Real]);
}

/// Tissue compute backend on the host.
pub struct HostBackend<M: CellModel> {
    grid: TissueGrid,
    model: M,
    gx: Real,
    gy: Real,
    nx_paced: usize,
    ny_paced: usize,
    state: Vec<Real>,
    idiff: Vec<Real>,
    deriv: Vec<Real>,
    cache: Vec<Real>,
}

impl<M: CellModel> HostBackend<M> {
    /// Create a zero-initialized backend for `model` on `grid`.
    pub fn new(
        grid: TissueGrid,
        model: M,
        gx: Real,
        gy: Real,
        nx_paced: usize,
        ny_paced: usize,
    ) -> Self {
        let cells = grid.cell_count();
        let state_len = cells * model.n_state();
        let cache_len = cells * model.n_cache();
        Self {
            grid,
            model,
            gx,
            gy,
            nx_paced,
            ny_paced,
            state: vec![0.0; state_len],
            idiff: vec![0.0; cells],
            deriv: vec![0.0; state_len],
            cache: vec![0.0; cache_len],
        }
    }

    /// The model driving this backend.
    pub fn model(&self) -> &M {
        &self.model
    }

    fn derivs(&mut self, args: KernelArgs, slow: bool) {
        let s = self.model.n_state();
        let k = self.model.n_cache();
        for y in 0..self.grid.ny {
            for x in 0..self.grid.nx {
                let c = self.grid.index(x, y);
                let paced = x < self.nx_paced && y < self.ny_paced;
                let inputs = CellInputs {
                    time: args.time,
                    dt: args.dt,
                    pace: if paced { args.pace } else { 0.0 },
                    idiff: self.idiff[c],
                };
                let state = &self.state[c * s..(c + 1) * s];
                let deriv = &mut self.deriv[c * s..(c + 1) * s];
                if slow {
                    let cache = &mut self.cache[c * k..(c + 1) * k];
                    self.model.slow_derivs(&inputs, state, cache, deriv);
                } else {
                    let cache = &self.cache[c * k..(c + 1) * k];
                    self.model.fast_derivs(&inputs, state, cache, deriv);
                }
            }
        }
    }
}

impl<M: CellModel> TissueBackend for HostBackend<M> {
    fn write_state(&mut self, state: &[Real]) -> Result<()> {
        if state.len() != self.state.len() {
            return Err(CardioError::config(format!(
                "State has {} values, backend expects {}",
                state.len(),
                self.state.len()
            )));
        }
        self.state.copy_from_slice(state);
        Ok(())
    }

    fn diffusion(&mut self) -> Result<()> {
        let s = self.model.n_state();
        let nx = self.grid.nx;
        for y in 0..self.grid.ny {
            for x in 0..nx {
                let c = self.grid.index(x, y);
                // Membrane potential is state slot 0 by convention; missing
                // neighbors are replaced by the cell's own value (zero flux).
                let v = self.state[c * s];
                let west = if x > 0 { self.state[(c - 1) * s] } else { v };
                let east = if x + 1 < nx { self.state[(c + 1) * s] } else { v };
                let north = if y > 0 { self.state[(c - nx) * s] } else { v };
                let south = if y + 1 < self.grid.ny {
                    self.state[(c + nx) * s]
                } else {
                    v
                };
                self.idiff[c] = self.gx * (2.0 * v - west - east)
                    + self.gy * (2.0 * v - north - south);
            }
        }
        Ok(())
    }

    fn slow_derivs(&mut self, args: KernelArgs) -> Result<()> {
        self.derivs(args, true);
        Ok(())
    }

    fn fast_derivs(&mut self, args: KernelArgs) -> Result<()> {
        self.derivs(args, false);
        Ok(())
    }

    fn euler_step(&mut self, dt: Real) -> Result<()> {
        for (state, deriv) in self.state.iter_mut().zip(&self.deriv) {
            *state += dt * deriv;
        }
        Ok(())
    }

    fn read_state(&mut self, out: &mut [Real]) -> Result<()> {
        out.copy_from_slice(&self.state);
        Ok(())
    }

    fn read_idiff(&mut self, out: &mut [Real]) -> Result<()> {
        out.copy_from_slice(&self.idiff);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

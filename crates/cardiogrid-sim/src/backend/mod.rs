//! Compute backends driving the per-iteration kernel sequence.
//!
//! The integrator loop is backend-agnostic: it issues the same
//! diffusion / derivatives / step sequence whether the work runs on a CUDA
//! device or on the host. Within one iteration, `diffusion` observes the
//! pre-iteration state, the derivative kernels observe the freshly written
//! diffusion currents, and `euler_step` observes the fresh derivatives;
//! backends guarantee this by executing (or enqueuing onto one in-order
//! queue) in call order.

#[cfg(feature = "cuda")]
pub mod cuda;
pub mod host;

use cardiogrid_core::{Real, Result};

/// Scalar inputs refreshed on the derivative kernels at every invocation.
///
/// All three are narrowed from the host's `f64` bookkeeping to device
/// precision before they reach a kernel.
#[derive(Debug, Clone, Copy)]
pub struct KernelArgs {
    /// Simulation time at the start of the step.
    pub time: Real,
    /// Step size about to be applied.
    pub dt: Real,
    /// Current stimulus level.
    pub pace: Real,
}

/// One simulation's worth of device work.
///
/// Launch methods are non-blocking where the backend allows it; the read
/// methods block until the queue has caught up through the read. A backend
/// owns its buffers for the lifetime of the run and never reallocates them.
pub trait TissueBackend {
    /// Overwrite the state buffer with `state` (length `nx * ny * n_state`).
    fn write_state(&mut self, state: &[Real]) -> Result<()>;

    /// Compute per-cell diffusion currents from the current state.
    fn diffusion(&mut self) -> Result<()>;

    /// Evaluate the full right-hand side, refilling the slow cache.
    fn slow_derivs(&mut self, args: KernelArgs) -> Result<()>;

    /// Evaluate the right-hand side reusing the slow cache.
    fn fast_derivs(&mut self, args: KernelArgs) -> Result<()>;

    /// Forward Euler: `state += dt * deriv` for every state slot.
    fn euler_step(&mut self, dt: Real) -> Result<()>;

    /// Read the state buffer back into `out` (length `nx * ny * n_state`).
    fn read_state(&mut self, out: &mut [Real]) -> Result<()>;

    /// Read the diffusion currents back into `out` (length `nx * ny`).
    fn read_idiff(&mut self, out: &mut [Real]) -> Result<()>;

    /// Wait for all issued work to finish.
    fn flush(&mut self) -> Result<()>;
}

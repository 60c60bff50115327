//! # cardiogrid-sim
//!
//! Split-timestep forward-Euler integrator for a 1-D or 2-D grid of
//! electrically coupled cardiac cells.
//!
//! Every cell runs the same generated ODE model; neighbors couple through a
//! five-point discrete Laplacian of the membrane potential. Each inner
//! iteration enqueues three kernels on one in-order queue:
//!
//! 1. `diffusion`: membrane potentials to per-cell diffusion currents
//! 2. `slow` or `fast` derivatives: the full right-hand side every `ratio`
//!    steps (refilling a cache of slowly varying intermediates), a cheap
//!    cache-reusing evaluation in between
//! 3. `step`: forward Euler, `state += dt * deriv`
//!
//! The host advances time, pacing, and the step-size chooser, reads back
//! state on logging boundaries, halts on a NaN membrane potential, and
//! yields periodically so callers can report progress or stop a run.
//!
//! The model arrives as kernel source text plus a
//! [`ModelDescriptor`](cardiogrid_core::ModelDescriptor); see
//! [`Simulation`] for the lifecycle.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod grid;
pub mod samples;
pub mod simulation;

pub use backend::host::{CellInputs, CellModel, HostBackend};
pub use backend::{KernelArgs, TissueBackend};
pub use grid::TissueGrid;
pub use samples::SampleLog;
pub use simulation::{Simulation, SimulationConfig, StepResult};

#[cfg(feature = "cuda")]
pub use backend::cuda::CudaTissueBackend;

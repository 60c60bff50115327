//! CUDA backend: generated kernels driven through one in-order stream.
//!
//! The kernel program arrives as source text and must define four entry
//! points, matching the generator contract:
//!
//! - `calc_diff_current(nx, ny, gx, gy, state, idiff)`
//! - `calc_slow_derivs(nx, ny, time, dt, nx_paced, ny_paced, pace, state,
//!   idiff, deriv, cache)`
//! - `calc_fast_derivs(...)` with the same signature as the slow kernel
//! - `perform_step(nx, ny, dt, state, deriv)`
//!
//! All scalars use the build's `Real` width; the program's own `Real`
//! typedef must agree (see `cardiogrid_core::REAL_NAME`).

use std::sync::Arc;

use cudarc::driver::{CudaFunction, CudaModule, CudaSlice, LaunchConfig, PushKernelArg};

use cardiogrid_core::{CardioError, ModelDescriptor, Real, Result};
use cardiogrid_cuda::{compile_program, GpuDevice};

use crate::backend::{KernelArgs, TissueBackend};
use crate::grid::TissueGrid;

const FN_DIFFUSION: &str = "calc_diff_current";
const FN_SLOW: &str = "calc_slow_derivs";
const FN_FAST: &str = "calc_fast_derivs";
const FN_STEP: &str = "perform_step";

/// Tissue compute backend on a CUDA device.
///
/// Owns the compiled program, the four kernels, and the four device buffers
/// (`state`, `idiff`, `deriv`, `cache`). Buffers are sized at construction
/// and never reallocated; releasing happens in reverse allocation order when
/// the backend drops.
pub struct CudaTissueBackend {
    device: GpuDevice,
    /// Keeps the compiled program alive for as long as its kernels are used.
    _module: Arc<CudaModule>,
    k_diff: CudaFunction,
    k_slow: CudaFunction,
    k_fast: CudaFunction,
    k_step: CudaFunction,
    buf_state: CudaSlice<Real>,
    buf_idiff: CudaSlice<Real>,
    buf_deriv: CudaSlice<Real>,
    buf_cache: CudaSlice<Real>,
    cfg: LaunchConfig,
    nx: i32,
    ny: i32,
    gx: Real,
    gy: Real,
    nx_paced: i32,
    ny_paced: i32,
}

impl CudaTissueBackend {
    /// Compile the program and allocate all buffers on `device`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: GpuDevice,
        kernel_source: &str,
        descriptor: &ModelDescriptor,
        grid: TissueGrid,
        gx: Real,
        gy: Real,
        nx_paced: usize,
        ny_paced: usize,
    ) -> Result<Self> {
        let ptx = compile_program(kernel_source)?;
        let module = device.load_module(ptx)?;

        let load = |name: &str| -> Result<CudaFunction> {
            module.load_function(name).map_err(|e| {
                CardioError::device(format!("Kernel {name:?} not found in program: {e}"))
            })
        };
        let k_diff = load(FN_DIFFUSION)?;
        let k_slow = load(FN_SLOW)?;
        let k_fast = load(FN_FAST)?;
        let k_step = load(FN_STEP)?;

        let buf_state = device.alloc_zeros::<Real>(grid.state_len(descriptor))?;
        let buf_idiff = device.alloc_zeros::<Real>(grid.cell_count())?;
        let buf_deriv = device.alloc_zeros::<Real>(grid.state_len(descriptor))?;
        // The driver rejects zero-length allocations; cache-free models get
        // one unused slot.
        let buf_cache = device.alloc_zeros::<Real>(grid.cache_len(descriptor).max(1))?;

        let (lx, ly) = grid.local_size();
        let (gx_items, gy_items) = grid.global_size();
        let cfg = LaunchConfig {
            grid_dim: (gx_items / lx, gy_items / ly, 1),
            block_dim: (lx, ly, 1),
            shared_mem_bytes: 0,
        };

        tracing::debug!(
            nx = grid.nx,
            ny = grid.ny,
            n_state = descriptor.n_state,
            n_cache = descriptor.n_cache,
            "CUDA tissue backend ready"
        );

        Ok(Self {
            device,
            _module: module,
            k_diff,
            k_slow,
            k_fast,
            k_step,
            buf_state,
            buf_idiff,
            buf_deriv,
            buf_cache,
            cfg,
            nx: grid.nx as i32,
            ny: grid.ny as i32,
            gx,
            gy,
            nx_paced: nx_paced as i32,
            ny_paced: ny_paced as i32,
        })
    }

    /// The device this backend runs on.
    pub fn device(&self) -> &GpuDevice {
        &self.device
    }

    fn enqueue_derivs(&mut self, slow: bool, args: KernelArgs) -> Result<()> {
        let (func, name) = if slow {
            (&self.k_slow, "slow")
        } else {
            (&self.k_fast, "fast")
        };
        unsafe {
            let mut b = self.device.stream().launch_builder(func);
            b.arg(&self.nx);
            b.arg(&self.ny);
            b.arg(&args.time);
            b.arg(&args.dt);
            b.arg(&self.nx_paced);
            b.arg(&self.ny_paced);
            b.arg(&args.pace);
            b.arg(&self.buf_state);
            b.arg(&self.buf_idiff);
            b.arg(&self.buf_deriv);
            b.arg(&self.buf_cache);
            b.launch(self.cfg)
        }
        .map_err(|e| CardioError::device(format!("Failed to enqueue {name} kernel: {e}")))?;
        Ok(())
    }
}

impl TissueBackend for CudaTissueBackend {
    fn write_state(&mut self, state: &[Real]) -> Result<()> {
        self.device.upload(state, &mut self.buf_state)
    }

    fn diffusion(&mut self) -> Result<()> {
        unsafe {
            let mut b = self.device.stream().launch_builder(&self.k_diff);
            b.arg(&self.nx);
            b.arg(&self.ny);
            b.arg(&self.gx);
            b.arg(&self.gy);
            b.arg(&self.buf_state);
            b.arg(&self.buf_idiff);
            b.launch(self.cfg)
        }
        .map_err(|e| CardioError::device(format!("Failed to enqueue diffusion kernel: {e}")))?;
        Ok(())
    }

    fn slow_derivs(&mut self, args: KernelArgs) -> Result<()> {
        self.enqueue_derivs(true, args)
    }

    fn fast_derivs(&mut self, args: KernelArgs) -> Result<()> {
        self.enqueue_derivs(false, args)
    }

    fn euler_step(&mut self, dt: Real) -> Result<()> {
        unsafe {
            let mut b = self.device.stream().launch_builder(&self.k_step);
            b.arg(&self.nx);
            b.arg(&self.ny);
            b.arg(&dt);
            b.arg(&self.buf_state);
            b.arg(&self.buf_deriv);
            b.launch(self.cfg)
        }
        .map_err(|e| CardioError::device(format!("Failed to enqueue step kernel: {e}")))?;
        Ok(())
    }

    fn read_state(&mut self, out: &mut [Real]) -> Result<()> {
        self.device.download(&self.buf_state, out)
    }

    fn read_idiff(&mut self, out: &mut [Real]) -> Result<()> {
        self.device.download(&self.buf_idiff, out)
    }

    fn flush(&mut self) -> Result<()> {
        self.device.synchronize()
    }
}

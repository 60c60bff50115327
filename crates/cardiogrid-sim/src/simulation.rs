//! The split-timestep integrator and its lifecycle.
//!
//! A [`Simulation`] owns everything one run needs: the compute backend with
//! its buffers, the pacing system, the host mirrors of state and diffusion
//! current, the sample log, and the time bookkeeping. Several simulations
//! can coexist; nothing is process-global.
//!
//! Lifecycle: [`Simulation::init`] (or [`Simulation::init_with_backend`])
//! acquires resources, [`Simulation::step`] advances until it yields,
//! finishes, or halts, and [`Simulation::clean`] tears down. Every error
//! path inside init and step routes through `clean`, which tolerates being
//! called at any time, any number of times.

use cardiogrid_core::{CardioError, ModelDescriptor, PacingSystem, Protocol, Real, Result};

use crate::backend::{KernelArgs, TissueBackend};
use crate::grid::TissueGrid;
use crate::samples::SampleLog;

#[cfg(feature = "cuda")]
use crate::backend::cuda::CudaTissueBackend;
#[cfg(feature = "cuda")]
use cardiogrid_cuda::GpuDevice;

/// Simulation parameters fixed at construction.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Cells in the x direction.
    pub nx: usize,
    /// Cells in the y direction (1 for a fiber).
    pub ny: usize,
    /// Cell-to-cell conductance in the x direction.
    pub gx: f64,
    /// Cell-to-cell conductance in the y direction.
    pub gy: f64,
    /// Initial simulation time.
    pub tmin: f64,
    /// Final simulation time.
    pub tmax: f64,
    /// Default step size; the minimum step is one hundredth of it.
    pub default_dt: f64,
    /// Width of the stimulated rectangle, anchored at the origin.
    pub nx_paced: usize,
    /// Height of the stimulated rectangle.
    pub ny_paced: usize,
    /// Time between log writes; zero disables periodic logging.
    pub log_interval: f64,
    /// Fast steps per slow step (at least 1).
    pub ratio: u32,
}

impl SimulationConfig {
    /// Check all parameters.
    pub fn validate(&self) -> Result<()> {
        if self.nx == 0 || self.ny == 0 {
            return Err(CardioError::config(format!(
                "Grid dimensions must be positive, got {}x{}",
                self.nx, self.ny
            )));
        }
        for (name, value) in [("gx", self.gx), ("gy", self.gy)] {
            if !value.is_finite() || value < 0.0 {
                return Err(CardioError::config(format!(
                    "Conductance {name} must be finite and non-negative, got {value}"
                )));
            }
        }
        if !self.tmin.is_finite() || !self.tmax.is_finite() || self.tmax < self.tmin {
            return Err(CardioError::config(format!(
                "Invalid time range [{}, {}]",
                self.tmin, self.tmax
            )));
        }
        if !self.default_dt.is_finite() || self.default_dt <= 0.0 {
            return Err(CardioError::config(format!(
                "default_dt must be positive, got {}",
                self.default_dt
            )));
        }
        if self.nx_paced > self.nx || self.ny_paced > self.ny {
            return Err(CardioError::config(format!(
                "Paced rectangle {}x{} exceeds the grid",
                self.nx_paced, self.ny_paced
            )));
        }
        if !self.log_interval.is_finite() || self.log_interval < 0.0 {
            return Err(CardioError::config(format!(
                "log_interval must be non-negative, got {}",
                self.log_interval
            )));
        }
        if self.ratio == 0 {
            return Err(CardioError::config("ratio must be at least 1"));
        }
        Ok(())
    }
}

/// Outcome of one [`Simulation::step`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepResult {
    /// Cooperative yield mid-run; call `step` again to continue.
    Paused(f64),
    /// The run reached `tmax`; resources are released.
    Finished(f64),
    /// A NaN membrane potential halted the run; carries the `tmin - 1`
    /// sentinel. Resources are released and the final state (NaN included)
    /// is available for inspection.
    Halted(f64),
}

impl StepResult {
    /// The time carried by this result.
    pub fn time(self) -> f64 {
        match self {
            StepResult::Paused(t) | StepResult::Finished(t) | StepResult::Halted(t) => t,
        }
    }

    /// True when the run is over (finished or halted).
    pub fn is_done(self) -> bool {
        !matches!(self, StepResult::Paused(_))
    }
}

/// Everything that only exists between `init` and `clean`.
struct Runtime {
    backend: Box<dyn TissueBackend>,
    pacing: PacingSystem,
    host_state: Vec<Real>,
    host_idiff: Vec<Real>,
    time: f64,
    dt: f64,
    /// Kernel arguments, narrowed to device precision.
    arg_time: Real,
    arg_pace: Real,
    arg_dt: Real,
    tnext_pace: f64,
    tnext_log: f64,
    steps_till_slow: u32,
    halted: bool,
    logging_states: bool,
    logging_diffusion: bool,
}

/// A multi-cell split-timestep simulation.
pub struct Simulation {
    descriptor: ModelDescriptor,
    config: SimulationConfig,
    grid: TissueGrid,
    dt_min: f64,
    runtime: Option<Runtime>,
    log: SampleLog,
    final_state: Option<Vec<f64>>,
}

impl Simulation {
    /// Create a simulation; no resources are acquired until `init`.
    pub fn new(descriptor: ModelDescriptor, config: SimulationConfig) -> Result<Self> {
        descriptor.validate()?;
        config.validate()?;
        let grid = TissueGrid::new(config.nx, config.ny)?;
        let dt_min = config.default_dt * 1e-2;
        Ok(Self {
            descriptor,
            config,
            grid,
            dt_min,
            runtime: None,
            log: SampleLog::default(),
            final_state: None,
        })
    }

    /// Initialize on the CUDA device selected by `CARDIOGRID_DEVICE`.
    ///
    /// `kernel_source` is the generated program text; `state_in` is the
    /// initial state, `nx * ny * n_state` finite values; `log_keys` select
    /// what to sample (see [`SampleLog`]). Fails if already initialized.
    #[cfg(feature = "cuda")]
    pub fn init(
        &mut self,
        kernel_source: &str,
        state_in: &[f64],
        protocol: &Protocol,
        log_keys: &[String],
    ) -> Result<()> {
        if self.runtime.is_some() {
            return Err(CardioError::config("Simulation already initialized"));
        }
        let result = self.init_cuda(kernel_source, state_in, protocol, log_keys);
        if result.is_err() {
            self.clean();
        }
        result
    }

    #[cfg(feature = "cuda")]
    fn init_cuda(
        &mut self,
        kernel_source: &str,
        state_in: &[f64],
        protocol: &Protocol,
        log_keys: &[String],
    ) -> Result<()> {
        let device = GpuDevice::from_env()?;
        let backend = CudaTissueBackend::new(
            device,
            kernel_source,
            &self.descriptor,
            self.grid,
            self.config.gx as Real,
            self.config.gy as Real,
            self.config.nx_paced,
            self.config.ny_paced,
        )?;
        self.attach(Box::new(backend), state_in, protocol, log_keys)
    }

    /// Initialize on a caller-supplied backend.
    ///
    /// The backend must match the grid and descriptor this simulation was
    /// created with; its state buffer is overwritten with `state_in`.
    pub fn init_with_backend(
        &mut self,
        backend: Box<dyn TissueBackend>,
        state_in: &[f64],
        protocol: &Protocol,
        log_keys: &[String],
    ) -> Result<()> {
        if self.runtime.is_some() {
            return Err(CardioError::config("Simulation already initialized"));
        }
        let result = self.attach(backend, state_in, protocol, log_keys);
        if result.is_err() {
            self.clean();
        }
        result
    }

    fn attach(
        &mut self,
        mut backend: Box<dyn TissueBackend>,
        state_in: &[f64],
        protocol: &Protocol,
        log_keys: &[String],
    ) -> Result<()> {
        let expected = self.grid.state_len(&self.descriptor);
        if state_in.len() != expected {
            return Err(CardioError::config(format!(
                "state_in has {} values, expected nx * ny * n_state = {expected}",
                state_in.len()
            )));
        }
        let mut host_state = Vec::with_capacity(expected);
        for (i, &value) in state_in.iter().enumerate() {
            if !value.is_finite() {
                return Err(CardioError::config(format!(
                    "Item {i} in the initial state is not finite"
                )));
            }
            host_state.push(value as Real);
        }
        let host_idiff = vec![0.0 as Real; self.grid.cell_count()];

        let mut pacing = PacingSystem::new(protocol)?;
        pacing.advance(self.config.tmin)?;
        let tnext_pace = pacing.next_time();
        let arg_pace = pacing.pace() as Real;

        let log = SampleLog::bind(log_keys, &self.descriptor, &self.grid)?;
        let logging_states = log.logging_states();
        let logging_diffusion = log.logging_diffusion();

        backend.write_state(&host_state)?;

        let tmin = self.config.tmin;
        let dt = self.config.default_dt;
        let tnext_log = if log.is_empty() || self.config.log_interval == 0.0 {
            self.config.tmax + 1.0
        } else {
            tmin + self.config.log_interval
        };
        let rt = Runtime {
            backend,
            pacing,
            host_state,
            host_idiff,
            time: tmin,
            dt,
            arg_time: tmin as Real,
            arg_pace,
            arg_dt: dt as Real,
            tnext_pace,
            tnext_log,
            steps_till_slow: 0,
            halted: false,
            logging_states,
            logging_diffusion,
        };

        self.log = log;
        self.final_state = None;
        // The first log row is written at t = tmin, before any step.
        self.log
            .record(rt.arg_time, rt.arg_pace, rt.arg_dt, &rt.host_state, &rt.host_idiff);
        self.runtime = Some(rt);

        tracing::debug!(
            nx = self.config.nx,
            ny = self.config.ny,
            tmin = self.config.tmin,
            tmax = self.config.tmax,
            ratio = self.config.ratio,
            "Simulation initialized"
        );
        Ok(())
    }

    /// Advance the simulation.
    ///
    /// Runs inner iterations until the run finishes, halts on a NaN, or the
    /// cooperative yield budget is spent. On `Finished` and `Halted` the
    /// final state has been read back and all resources are released; any
    /// error also releases all resources before returning.
    pub fn step(&mut self) -> Result<StepResult> {
        let result = self.step_inner();
        if result.is_err() {
            self.clean();
        }
        result
    }

    fn step_inner(&mut self) -> Result<StepResult> {
        let tmax = self.config.tmax;
        let default_dt = self.config.default_dt;
        let log_interval = self.config.log_interval;
        let ratio = self.config.ratio;
        let dt_min = self.dt_min;
        let cells = self.grid.cell_count() as u64;

        let rt = self
            .runtime
            .as_mut()
            .ok_or_else(|| CardioError::config("Simulation not initialized"))?;

        // Iterations before control returns to the caller.
        let mut steps_left = (500 + 200_000 / cells).max(1000);

        loop {
            if rt.time >= tmax || rt.halted {
                break;
            }

            // Diffusion sees the pre-iteration state; the derivative kernel
            // sees the fresh currents; the Euler step sees the fresh
            // derivatives. Enqueue order on one in-order queue is the only
            // synchronization.
            rt.backend.diffusion()?;
            let args = KernelArgs {
                time: rt.arg_time,
                dt: rt.arg_dt,
                pace: rt.arg_pace,
            };
            if rt.steps_till_slow == 0 {
                rt.backend.slow_derivs(args)?;
                rt.steps_till_slow = ratio - 1;
            } else {
                rt.backend.fast_derivs(args)?;
                rt.steps_till_slow -= 1;
            }
            rt.backend.euler_step(rt.arg_dt)?;

            rt.time += rt.dt;
            rt.arg_time = rt.time as Real;
            rt.pacing.advance(rt.time)?;
            rt.tnext_pace = rt.pacing.next_time();
            rt.arg_pace = rt.pacing.pace() as Real;

            if rt.time >= rt.tnext_log {
                // Only read back what a bound key actually references.
                if rt.logging_diffusion {
                    rt.backend.read_idiff(&mut rt.host_idiff)?;
                }
                if rt.logging_states {
                    rt.backend.read_state(&mut rt.host_state)?;
                    if rt.host_state[0].is_nan() {
                        tracing::warn!(
                            time = rt.time,
                            "NaN membrane potential in cell 0, halting"
                        );
                        rt.halted = true;
                    }
                }
                // The time_step series reports the dt used to advance past
                // the log point.
                rt.arg_dt = rt.dt as Real;
                self.log.record(
                    rt.arg_time,
                    rt.arg_pace,
                    rt.arg_dt,
                    &rt.host_state,
                    &rt.host_idiff,
                );
                rt.tnext_log += log_interval;
            }

            if rt.time >= tmax || rt.halted {
                break;
            }

            // Next step: the default, shrunk to land exactly on tmax or on
            // the next pacing event, never below dt_min. The next log point
            // is deliberately not a target; logs may be sparser than steps.
            rt.dt = default_dt;
            let d = tmax - rt.time;
            if d > dt_min && d < rt.dt {
                rt.dt = d;
            }
            let d = rt.tnext_pace - rt.time;
            if d > dt_min && d < rt.dt {
                rt.dt = d;
            }
            rt.arg_dt = rt.dt as Real;

            steps_left -= 1;
            if steps_left == 0 {
                rt.backend.flush()?;
                return Ok(StepResult::Paused(rt.time));
            }
        }

        // Finished or halted: read the final state back for the caller,
        // then tear down.
        rt.backend.read_state(&mut rt.host_state)?;
        let halted = rt.halted;
        let time = rt.time;
        self.final_state = Some(rt.host_state.iter().map(|&v| v as f64).collect());
        self.clean();
        Ok(if halted {
            StepResult::Halted(self.config.tmin - 1.0)
        } else {
            StepResult::Finished(time)
        })
    }

    /// Drive `step` to completion, passing through yields.
    pub fn run(&mut self) -> Result<StepResult> {
        loop {
            match self.step()? {
                StepResult::Paused(t) => tracing::debug!(time = t, "Yield"),
                done => return Ok(done),
            }
        }
    }

    /// Release all run resources, in reverse allocation order.
    ///
    /// Safe to call at any time and any number of times; a no-op when
    /// nothing is initialized.
    pub fn clean(&mut self) {
        if let Some(mut rt) = self.runtime.take() {
            // Wait for outstanding device work before buffers are released.
            if let Err(e) = rt.backend.flush() {
                tracing::debug!("Flush during cleanup failed: {e}");
            }
            tracing::debug!("Simulation cleaned");
        }
    }

    /// True between a successful `init` and the end of the run.
    pub fn is_initialized(&self) -> bool {
        self.runtime.is_some()
    }

    /// Current simulation time, while initialized.
    pub fn time(&self) -> Option<f64> {
        self.runtime.as_ref().map(|rt| rt.time)
    }

    /// The sampled series of the current (or last) run.
    pub fn log(&self) -> &SampleLog {
        &self.log
    }

    /// Final state of the last completed run, `nx * ny * n_state` values.
    ///
    /// After a NaN halt this contains the state as read back, NaN included.
    pub fn final_state(&self) -> Option<&[f64]> {
        self.final_state.as_deref()
    }

    /// The model descriptor this simulation was created with.
    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    /// The configuration this simulation was created with.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The grid geometry.
    pub fn grid(&self) -> TissueGrid {
        self.grid
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.clean();
    }
}

//! Periodic sampling of simulation variables into host-side series.
//!
//! Callers select what to log with *log keys*:
//!
//! - scalar bindings are the bare qualified name: `engine.time`,
//!   `engine.pace`, `engine.dt`
//! - per-cell values carry a cell prefix: `3.membrane.V` on a 1-D grid,
//!   `3.2.membrane.V` on a 2-D grid; diffusion currents use the model's
//!   diffusion binding the same way
//!
//! Keys are bound against the model descriptor once at init; anything that
//! matches nothing is rejected there. Each bound key owns an append-only
//! series of `f64` samples, one value per log boundary, starting at `tmin`.

use cardiogrid_core::{CardioError, ModelDescriptor, Real, Result};

use crate::grid::TissueGrid;

/// Where a bound log key reads its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogSource {
    /// Simulation time, as narrowed for the kernels.
    Time,
    /// Stimulus level, as narrowed for the kernels.
    Pace,
    /// Step size used to advance past the log point.
    TimeStep,
    /// One cell's slot in the diffusion-current array.
    Diffusion(usize),
    /// One slot in the state array.
    State(usize),
}

#[derive(Debug, Clone)]
struct LogChannel {
    key: String,
    source: LogSource,
    values: Vec<f64>,
}

/// Ordered collection of sampled series, one per bound log key.
#[derive(Debug, Clone, Default)]
pub struct SampleLog {
    channels: Vec<LogChannel>,
    logging_states: bool,
    logging_diffusion: bool,
}

impl SampleLog {
    /// Bind `keys` against the model and grid.
    ///
    /// Fails on an unknown or duplicate key. Key order is preserved.
    pub(crate) fn bind(
        keys: &[String],
        descriptor: &ModelDescriptor,
        grid: &TissueGrid,
    ) -> Result<Self> {
        let mut channels: Vec<LogChannel> = Vec::with_capacity(keys.len());
        for key in keys {
            if channels.iter().any(|c| &c.key == key) {
                return Err(CardioError::config(format!("Duplicate log key {key:?}")));
            }
            let source = bind_key(key, descriptor, grid)?;
            channels.push(LogChannel {
                key: key.clone(),
                source,
                values: Vec::new(),
            });
        }
        let logging_states = channels
            .iter()
            .any(|c| matches!(c.source, LogSource::State(_)));
        let logging_diffusion = channels
            .iter()
            .any(|c| matches!(c.source, LogSource::Diffusion(_)));
        Ok(Self {
            channels,
            logging_states,
            logging_diffusion,
        })
    }

    /// True if any bound key reads from the state array.
    pub(crate) fn logging_states(&self) -> bool {
        self.logging_states
    }

    /// True if any bound key reads from the diffusion-current array.
    pub(crate) fn logging_diffusion(&self) -> bool {
        self.logging_diffusion
    }

    /// Append one sample to every series.
    pub(crate) fn record(
        &mut self,
        time: Real,
        pace: Real,
        dt: Real,
        state: &[Real],
        idiff: &[Real],
    ) {
        for channel in &mut self.channels {
            let value = match channel.source {
                LogSource::Time => time as f64,
                LogSource::Pace => pace as f64,
                LogSource::TimeStep => dt as f64,
                LogSource::Diffusion(i) => idiff[i] as f64,
                LogSource::State(i) => state[i] as f64,
            };
            channel.values.push(value);
        }
    }

    /// Number of bound keys.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// True when no keys are bound.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Number of samples taken so far.
    pub fn rows(&self) -> usize {
        self.channels.first().map_or(0, |c| c.values.len())
    }

    /// The series logged under `key`, if bound.
    pub fn series(&self, key: &str) -> Option<&[f64]> {
        self.channels
            .iter()
            .find(|c| c.key == key)
            .map(|c| c.values.as_slice())
    }

    /// Iterate over `(key, series)` pairs in binding order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.channels
            .iter()
            .map(|c| (c.key.as_str(), c.values.as_slice()))
    }
}

/// Resolve one key to its source.
fn bind_key(key: &str, descriptor: &ModelDescriptor, grid: &TissueGrid) -> Result<LogSource> {
    let unknown = || CardioError::UnknownLogKey(key.to_string());
    let segments: Vec<&str> = key.split('.').collect();
    let coords = segments
        .iter()
        .take_while(|s| s.parse::<usize>().is_ok())
        .count();
    // Whatever follows the cell prefix must be a qualified component.var.
    if segments.len() != coords + 2 {
        return Err(unknown());
    }
    let qname = format!("{}.{}", segments[coords], segments[coords + 1]);

    let cell = match coords {
        0 => {
            // Scalar bindings only.
            return if descriptor.time_binding.as_deref() == Some(&qname) {
                Ok(LogSource::Time)
            } else if descriptor.pace_binding.as_deref() == Some(&qname) {
                Ok(LogSource::Pace)
            } else if descriptor.time_step_binding.as_deref() == Some(&qname) {
                Ok(LogSource::TimeStep)
            } else {
                Err(unknown())
            };
        }
        1 if grid.is_1d() => {
            let x: usize = segments[0].parse().map_err(|_| unknown())?;
            if x >= grid.nx {
                return Err(unknown());
            }
            x
        }
        2 if !grid.is_1d() => {
            let x: usize = segments[0].parse().map_err(|_| unknown())?;
            let y: usize = segments[1].parse().map_err(|_| unknown())?;
            if x >= grid.nx || y >= grid.ny {
                return Err(unknown());
            }
            grid.index(x, y)
        }
        _ => return Err(unknown()),
    };

    if descriptor.diffusion_binding.as_deref() == Some(&qname) {
        Ok(LogSource::Diffusion(cell))
    } else if let Some(slot) = descriptor.state_index(&qname) {
        Ok(LogSource::State(cell * descriptor.n_state + slot))
    } else {
        Err(unknown())
    }
}

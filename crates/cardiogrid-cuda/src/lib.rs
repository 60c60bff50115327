//! # cardiogrid-cuda
//!
//! Thin CUDA layer for the cardiogrid tissue simulator: device acquisition,
//! runtime compilation of generated kernel programs, and host/device
//! transfer helpers. Everything device-related funnels through
//! [`GpuDevice`]; the simulation crate never touches cudarc directly for
//! setup or transfers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compile;
pub mod device;

pub use compile::compile_program;
pub use device::{GpuDevice, DEVICE_ENV_VAR};

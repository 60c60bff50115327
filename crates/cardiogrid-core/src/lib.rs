//! # cardiogrid-core
//!
//! Shared foundation types for the cardiogrid tissue simulator.
//!
//! This crate carries everything the simulation crates agree on without
//! touching a GPU:
//!
//! - [`CardioError`] / [`Result`]: the workspace error type
//! - [`Real`]: the device scalar, selected at build time (`double` feature)
//! - [`ModelDescriptor`]: the static description of a generated cell model
//! - [`Protocol`] / [`PacingSystem`]: event-based stimulus scheduling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod model;
pub mod pacing;
pub mod precision;

pub use error::{CardioError, Result};
pub use model::ModelDescriptor;
pub use pacing::{PacingEvent, PacingSystem, Protocol};
pub use precision::{Precision, Real, REAL_NAME};

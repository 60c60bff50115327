//! Error types for tissue simulations.

use thiserror::Error;

/// Result type for cardiogrid operations.
pub type Result<T> = std::result::Result<T, CardioError>;

/// Errors that can occur while setting up or running a tissue simulation.
#[derive(Error, Debug)]
pub enum CardioError {
    /// Invalid configuration, argument, or input data.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Device acquisition, allocation, or kernel execution error.
    #[error("Device error: {0}")]
    Device(String),

    /// The kernel program failed to build on the device.
    ///
    /// The message carries the device compiler's full build log.
    #[error("Kernel program failed to compile:\n{log}")]
    Compile {
        /// Build log reported by the device compiler.
        log: String,
    },

    /// Host to device (or device to host) transfer error.
    #[error("Transfer error: {0}")]
    Transfer(String),

    /// Malformed pacing protocol or invalid pacing operation.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A log key matched no scalar binding, state, or diffusion slot.
    #[error("Unknown log key: {0:?}")]
    UnknownLogKey(String),
}

impl CardioError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a device error.
    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    /// Create a transfer error.
    pub fn transfer(msg: impl Into<String>) -> Self {
        Self::Transfer(msg.into())
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}

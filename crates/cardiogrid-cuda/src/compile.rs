//! Runtime compilation of generated kernel programs.
//!
//! The model is converted to device source as a pure string by an external
//! generator; this module hands that text to NVRTC. The integrator never
//! inspects the program beyond the four kernel entry points it loads.

use cudarc::nvrtc::Ptx;

use cardiogrid_core::{CardioError, Result};

/// Compile caller-supplied CUDA source to PTX.
///
/// On failure the returned error carries the compiler's full build log, so
/// generator bugs surface with line numbers instead of an opaque failure.
pub fn compile_program(source: &str) -> Result<Ptx> {
    cudarc::nvrtc::compile_ptx(source).map_err(|e| CardioError::Compile { log: e.to_string() })
}

//! Static description of a generated cell model.
//!
//! The kernel generator hands the integrator two things: the program text and
//! this small descriptor. The descriptor fixes the per-cell array layout
//! (state count, cache count) and carries the qualified variable names needed
//! to bind log keys. The generator is replaceable without touching the
//! integrator, so the descriptor derives serde and can cross the boundary as
//! JSON alongside the program text.

use serde::{Deserialize, Serialize};

use crate::error::{CardioError, Result};

/// Description of the per-cell ODE model behind a kernel program.
///
/// By convention the state variable at index 0 is the membrane potential;
/// that slot is used for diffusion coupling and NaN detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Number of state variables per cell (at least 1).
    pub n_state: usize,
    /// Number of intermediates the slow kernel caches for the fast kernel.
    pub n_cache: usize,
    /// Qualified state names (`component.var`), in state order.
    pub state_names: Vec<String>,
    /// Variable bound to simulation time, if the model declares one.
    #[serde(default)]
    pub time_binding: Option<String>,
    /// Variable bound to the pacing level, if the model declares one.
    #[serde(default)]
    pub pace_binding: Option<String>,
    /// Variable bound to the step size, if the model declares one.
    #[serde(default)]
    pub time_step_binding: Option<String>,
    /// Variable bound to the diffusion current, if the model declares one.
    #[serde(default)]
    pub diffusion_binding: Option<String>,
}

impl ModelDescriptor {
    /// Check the descriptor for internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.n_state == 0 {
            return Err(CardioError::config("Model must have at least one state"));
        }
        if self.state_names.len() != self.n_state {
            return Err(CardioError::config(format!(
                "Descriptor lists {} state names for {} states",
                self.state_names.len(),
                self.n_state
            )));
        }
        for name in self.state_names.iter().chain(self.bindings()) {
            check_qname(name)?;
        }
        for (i, name) in self.state_names.iter().enumerate() {
            if self.state_names[..i].contains(name) {
                return Err(CardioError::config(format!(
                    "Duplicate state name {name:?}"
                )));
            }
        }
        Ok(())
    }

    /// Position of a qualified name in the state vector, if it is a state.
    pub fn state_index(&self, qname: &str) -> Option<usize> {
        self.state_names.iter().position(|n| n == qname)
    }

    fn bindings(&self) -> impl Iterator<Item = &String> {
        self.time_binding
            .iter()
            .chain(self.pace_binding.iter())
            .chain(self.time_step_binding.iter())
            .chain(self.diffusion_binding.iter())
    }
}

/// A qualified name is `component.var`, both segments being identifiers.
fn check_qname(name: &str) -> Result<()> {
    let mut parts = name.split('.');
    let ok = matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(c), Some(v), None) if is_identifier(c) && is_identifier(v)
    );
    if ok {
        Ok(())
    } else {
        Err(CardioError::config(format!(
            "{name:?} is not a qualified variable name (component.var)"
        )))
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

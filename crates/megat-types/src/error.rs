// ─────────────────────────────────────────────────────────────────────
// Megat Simulation — Kernel Error Hierarchy
// ─────────────────────────────────────────────────────────────────────

use thiserror::Error;

use crate::state::KernelState;

/// Root error type for all kernel failures.
#[derive(Error, Debug)]
pub enum SimError {
    /// Missing environment, geometry, or RNG seed before configure.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Unresolvable physics model or constructor, or an invalid cut.
    #[error("physics configuration error: {0}")]
    PhysicsConfiguration(String),

    /// Malformed mask reference or invalid mask id.
    #[error("validation error: {0}")]
    Validation(String),

    /// An action identity was adopted by a second sequence.
    #[error("ownership error: {0}")]
    Ownership(String),

    /// Lifecycle operation invoked out of order.
    #[error("state error: {operation} not allowed in state {state}")]
    State {
        operation: &'static str,
        state: KernelState,
    },

    /// An action failed while its sequence was being invoked.
    #[error("action '{action}' failed: {reason}")]
    Action { action: String, reason: String },

    /// Output sink or geometry loader I/O failure.
    #[error("I/O error: {0}")]
    Io(String),
}

impl SimError {
    /// Configuration-time errors abort before the run loop starts.
    pub fn is_fatal_setup(&self) -> bool {
        matches!(
            self,
            SimError::Configuration(_)
                | SimError::PhysicsConfiguration(_)
                | SimError::Ownership(_)
                | SimError::State { .. }
        )
    }
}

impl From<std::io::Error> for SimError {
    fn from(e: std::io::Error) -> Self {
        SimError::Io(e.to_string())
    }
}

pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_error_message() {
        let err = SimError::State {
            operation: "run",
            state: KernelState::Configured,
        };
        assert_eq!(err.to_string(), "state error: run not allowed in state Configured");
    }

    #[test]
    fn test_fatal_setup_classification() {
        assert!(SimError::Configuration("x".into()).is_fatal_setup());
        assert!(SimError::Ownership("x".into()).is_fatal_setup());
        assert!(!SimError::Validation("x".into()).is_fatal_setup());
        assert!(!SimError::Io("x".into()).is_fatal_setup());
    }
}

// ─────────────────────────────────────────────────────────────────────
// Megat Simulation — Kernel Lifecycle States
// ─────────────────────────────────────────────────────────────────────

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of the kernel.
///
/// States are totally ordered; the kernel only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KernelState {
    Unconfigured,
    Configured,
    Initialized,
    Running,
    Terminated,
}

impl fmt::Display for KernelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KernelState::Unconfigured => "Unconfigured",
            KernelState::Configured => "Configured",
            KernelState::Initialized => "Initialized",
            KernelState::Running => "Running",
            KernelState::Terminated => "Terminated",
        };
        f.write_str(name)
    }
}

// ─────────────────────────────────────────────────────────────────────
// Megat Simulation — Orchestration Core
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Kernel lifecycle, phase-scoped action sequences, and the masked
//! generator chain that turns independent interaction streams into
//! primary particles for every simulated event.
//!
//! # Invariants
//!
//! 1. **Lifecycle is monotonic**: `Unconfigured → Configured →
//!    Initialized → Running → Terminated`. No state is revisited and
//!    every out-of-order call fails with `SimError::State`.
//!
//! 2. **Ownership is a tree**: an action (and any nested sub-action)
//!    is owned by exactly one sequence. Adoption moves the box; the
//!    kernel's `OwnershipRegistry` rejects a duplicated identity.
//!
//! 3. **Events are sequential**: event N finishes its Generator and
//!    Event phases before event N+1 begins. Stages run in adoption
//!    order.
//!
//! 4. **Stage failures are local**: a `Validation` error degrades the
//!    failing generator stage only; any other action error aborts the
//!    rest of that sequence invocation and marks the event failed.

pub mod action;
pub mod chain;
pub mod detector;
pub mod event;
pub mod event_actions;
pub mod filter;
pub mod generators;
pub mod kernel;
pub mod output;
pub mod particle_handler;
pub mod registry;
pub mod run_actions;
pub mod sequence;
pub mod transport;
pub mod ui;

#[cfg(test)]
pub(crate) mod testing;

pub use action::{
    Action, ActionContext, ActionId, ActionInfo, AnyAction, EventAction, Filter, GeneratorAction,
    OutputLevel, Phase, RunAction, Stage, UserParticleHandler,
};
pub use chain::GeneratorChain;
pub use detector::{CompactFileLoader, DetectorDescription, GeometryLoader, SubDetector};
pub use event::{Diagnostic, Hit, RunSummary, SimEvent};
pub use filter::{SensitiveKind, SensitiveSequence};
pub use kernel::{Kernel, RunMode};
pub use output::{JsonLinesSink, OutputSink};
pub use registry::{ActionConfig, ActionFactory, ActionType};
pub use sequence::{ActionFailure, ActionSequence, OwnershipRegistry, SequenceInfo};
pub use transport::{EnergyDeposit, PassThroughTransport, TrackingEngine, TrackingOutput};
pub use ui::{CommandQueue, StopHandle, UiCommand, UiExecutor};

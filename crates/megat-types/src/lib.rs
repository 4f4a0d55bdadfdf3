// ─────────────────────────────────────────────────────────────────────
// Megat Simulation — Kernel Types
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Particle model, run configuration, lifecycle states, units, and the
//! error hierarchy shared by every crate of the Megat simulation kernel.

pub mod config;
pub mod error;
pub mod particle;
pub mod state;
pub mod units;

pub use config::SimConfig;
pub use error::{SimError, SimResult};
pub use particle::{
    species_info, InteractionRecord, Mask, Particle, PrimaryParticle, PrimarySet, RecordKey,
    SpeciesInfo, Vec3, PRIMARY_PROCESS,
};
pub use state::KernelState;

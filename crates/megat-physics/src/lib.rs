// ─────────────────────────────────────────────────────────────────────
// Megat Simulation — Physics and Random Engine
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! The run-wide random engine and the physics-list assembler.
//!
//! Neither computes any transport physics: the assembler only resolves
//! and orders constructor names that the tracking engine consumes.

pub mod assembler;
pub mod catalog;
pub mod random;

pub use assembler::{PhysicsAssembler, PhysicsList, DEFAULT_RANGE_CUT};
pub use catalog::{base_model_components, is_known_constructor, BASE_MODELS};
pub use random::{RandomEngine, RandomStatus};

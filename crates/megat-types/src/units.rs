// ─────────────────────────────────────────────────────────────────────
// Megat Simulation — System of Units
// ─────────────────────────────────────────────────────────────────────
//! Internal units: MeV for energy, mm for length, ns for time.
//! Multiply a literal by its unit to store it, divide to print it.

pub const MEV: f64 = 1.0;
pub const EV: f64 = 1.0e-6 * MEV;
pub const KEV: f64 = 1.0e-3 * MEV;
pub const GEV: f64 = 1.0e3 * MEV;
pub const TEV: f64 = 1.0e6 * MEV;

pub const MM: f64 = 1.0;
pub const UM: f64 = 1.0e-3 * MM;
pub const CM: f64 = 10.0 * MM;
pub const M: f64 = 1.0e3 * MM;

pub const NS: f64 = 1.0;
pub const S: f64 = 1.0e9 * NS;

// ─────────────────────────────────────────────────────────────────────
// Megat Simulation — PyO3 FFI Bindings
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
// Note: #[deny(unsafe_code)] not applied; PyO3 proc macros generate
// unsafe blocks internally. All hand-written code in this crate is safe.
//! Python-callable wrapper around the Megat simulation kernel.
//!
//! Exposes `Kernel` and `RunSummary` so steering scripts can assemble a
//! simulation the same way the `megat-sim` binary does.
//!
//! # FFI Safety
//!
//! - The kernel is `unsendable`: it stays on the thread that built it.
//! - Lifecycle misuse raises `RuntimeError`; bad configuration raises
//!   `ValueError`. No Rust panic crosses the boundary.
//! - Action properties cross as JSON strings and are validated before
//!   the action is adopted.
//!
//! Install: `pip install -e crates/megat-ffi` (requires maturin).
//!
//! Usage from Python:
//! ```python
//! from megat_kernel import Kernel
//!
//! k = Kernel()
//! k.load_geometry("compact/Megat.xml")
//! k.seed(987654321)
//! k.add_action("Geant4ParticleGenerator/Gun",
//!              '{"mask": 2, "particle": "mu+", "energy": 1000.0, "multiplicity": 3}')
//! k.add_action("Geant4PrimaryHandler/PrimaryHandler")
//! k.setup_physics("QGSP_BERT")
//! k.configure(); k.initialize()
//! summary = k.run(events=10)
//! k.terminate()
//! ```

use std::path::Path;

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use megat_core::particle_handler::ParticleHandler;
use megat_core::{
    ActionConfig, ActionType, AnyAction, CompactFileLoader, Kernel, OutputLevel, Phase, RunMode,
    RunSummary, SequenceInfo,
};
use megat_types::SimError;

fn to_py(e: SimError) -> PyErr {
    match e {
        SimError::State { .. } | SimError::Ownership(_) => PyRuntimeError::new_err(e.to_string()),
        other => PyValueError::new_err(other.to_string()),
    }
}

// ─── PyRunSummary ───────────────────────────────────────────────────

/// Python-visible totals of a `Kernel.run` call.
#[pyclass(name = "RunSummary")]
#[derive(Clone)]
struct PyRunSummary {
    inner: RunSummary,
}

#[pymethods]
impl PyRunSummary {
    #[getter]
    fn run(&self) -> u32 {
        self.inner.run
    }

    #[getter]
    fn events_processed(&self) -> u64 {
        self.inner.events_processed
    }

    #[getter]
    fn failed_events(&self) -> u64 {
        self.inner.failed_events
    }

    #[getter]
    fn empty_primary_events(&self) -> u64 {
        self.inner.empty_primary_events
    }

    #[getter]
    fn stopped_early(&self) -> bool {
        self.inner.stopped_early
    }

    fn to_dict<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let dict = PyDict::new(py);
        dict.set_item("run", self.inner.run)?;
        dict.set_item("events_processed", self.inner.events_processed)?;
        dict.set_item("failed_events", self.inner.failed_events)?;
        dict.set_item("empty_primary_events", self.inner.empty_primary_events)?;
        dict.set_item("stopped_early", self.inner.stopped_early)?;
        Ok(dict)
    }

    fn __repr__(&self) -> String {
        format!(
            "RunSummary(events={}, failed={}, empty={}, stopped_early={})",
            self.inner.events_processed,
            self.inner.failed_events,
            self.inner.empty_primary_events,
            self.inner.stopped_early
        )
    }
}

// ─── Kernel ─────────────────────────────────────────────────────────

/// Python-visible simulation kernel.
#[pyclass(name = "Kernel", unsendable)]
struct PyKernel {
    inner: Kernel,
}

fn parse_phase(phase: &str) -> PyResult<Phase> {
    match phase.to_ascii_lowercase().as_str() {
        "run" => Ok(Phase::Run),
        "event" => Ok(Phase::Event),
        "generator" | "generation" => Ok(Phase::Generator),
        other => Err(PyValueError::new_err(format!("unknown phase '{other}'"))),
    }
}

#[pymethods]
impl PyKernel {
    #[new]
    fn new() -> Self {
        Self {
            inner: Kernel::new(),
        }
    }

    #[getter]
    fn state(&self) -> String {
        self.inner.state().to_string()
    }

    /// Load a compact detector description.
    fn load_geometry(&mut self, path: &str) -> PyResult<()> {
        self.inner
            .load_geometry(&CompactFileLoader, Path::new(path))
            .map_err(to_py)
    }

    fn seed(&mut self, seed: u64) -> PyResult<()> {
        self.inner.seed(seed).map_err(to_py)
    }

    fn seed_from_time(&mut self) -> PyResult<u64> {
        self.inner.seed_from_time().map_err(to_py)
    }

    /// Create `Type/instance`, configure it from JSON, and adopt it.
    /// Returns the instance name.
    #[pyo3(signature = (
        spec,
        properties = None,
        output_level = None,
        enable_ui = false,
        global = false
    ))]
    fn add_action(
        &mut self,
        spec: &str,
        properties: Option<&str>,
        output_level: Option<u8>,
        enable_ui: bool,
        global: bool,
    ) -> PyResult<String> {
        let mut action = self.inner.create(spec, properties).map_err(to_py)?;
        if let Some(level) = output_level {
            action.info_mut().output_level = OutputLevel::from_level(level).map_err(to_py)?;
        }
        if enable_ui {
            action.info_mut().enable_ui();
        }
        let info = action.info().clone();
        self.inner.adopt(action).map_err(to_py)?;
        if global {
            self.inner.register_global_action(&info).map_err(to_py)?;
        }
        log::debug!("adopted {}", info.qualified_name());
        Ok(info.name().to_string())
    }

    /// Adopt a particle handler, optionally with a user handler.
    #[pyo3(signature = (properties = None, user = None, user_properties = None))]
    fn add_particle_handler(
        &mut self,
        properties: Option<&str>,
        user: Option<&str>,
        user_properties: Option<&str>,
    ) -> PyResult<()> {
        let ActionConfig::ParticleHandler(config) =
            ActionConfig::from_json(ActionType::ParticleHandler, properties).map_err(to_py)?
        else {
            return Err(PyValueError::new_err("invalid particle handler properties"));
        };
        let info = self
            .inner
            .factory()
            .info(ActionType::ParticleHandler, "ParticleHandler");
        let mut handler = ParticleHandler::new(info, config).map_err(to_py)?;
        if let Some(spec) = user {
            match self.inner.create(spec, user_properties).map_err(to_py)? {
                AnyAction::ParticleUser(u) => handler.adopt_user(u).map_err(to_py)?,
                other => {
                    return Err(PyValueError::new_err(format!(
                        "{} is not a user particle handler",
                        other.info().qualified_name()
                    )))
                }
            }
        }
        self.inner
            .adopt_generator(Box::new(handler))
            .map_err(to_py)
    }

    fn setup_physics(&mut self, base_model: &str) -> PyResult<()> {
        self.inner.setup_physics(base_model).map_err(to_py)
    }

    fn add_physics_constructor(&mut self, name: &str) -> PyResult<()> {
        self.inner.add_physics_constructor(name).map_err(to_py)
    }

    fn set_range_cut(&mut self, value: f64) -> PyResult<()> {
        self.inner.set_range_cut(value).map_err(to_py)
    }

    fn setup_calorimeter(&mut self, name: &str) -> PyResult<()> {
        self.inner.setup_calorimeter(name).map_err(to_py)
    }

    fn setup_tracker(&mut self, name: &str) -> PyResult<()> {
        self.inner.setup_tracker(name).map_err(to_py)
    }

    /// Attach a filter to the sensitive detector `detector`.
    #[pyo3(signature = (detector, spec, properties = None))]
    fn add_filter(&mut self, detector: &str, spec: &str, properties: Option<&str>) -> PyResult<()> {
        match self.inner.create(spec, properties).map_err(to_py)? {
            AnyAction::Filter(f) => self.inner.attach_filter(detector, f).map_err(to_py),
            other => Err(PyValueError::new_err(format!(
                "{} is not a filter",
                other.info().qualified_name()
            ))),
        }
    }

    fn configure(&mut self) -> PyResult<()> {
        self.inner.configure().map_err(to_py)
    }

    fn initialize(&mut self) -> PyResult<()> {
        self.inner.initialize().map_err(to_py)
    }

    /// Run `events` events, or the given command list.
    #[pyo3(signature = (events = None, commands = None))]
    fn run(
        &mut self,
        events: Option<u64>,
        commands: Option<Vec<String>>,
    ) -> PyResult<PyRunSummary> {
        let mode = match (events, commands) {
            (Some(n), None) => RunMode::Batch(n),
            (None, Some(commands)) => RunMode::Commands(commands),
            (None, None) => RunMode::Batch(1),
            (Some(_), Some(_)) => {
                return Err(PyValueError::new_err("pass either events or commands, not both"))
            }
        };
        let inner = self.inner.run(mode).map_err(to_py)?;
        Ok(PyRunSummary { inner })
    }

    /// Stop the event loop after the current event.
    fn stop(&self) {
        self.inner.stop_handle().request_stop();
    }

    fn terminate(&mut self) -> PyResult<()> {
        self.inner.terminate().map_err(to_py)
    }

    /// Action names of `phase` ("run", "event", or "generator") in order.
    fn sequence(&self, phase: &str) -> PyResult<Vec<String>> {
        let phase = parse_phase(phase)?;
        Ok(self
            .inner
            .sequence(phase)
            .names()
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    fn random_status(&self) -> String {
        self.inner.random_status().to_string()
    }

    fn __repr__(&self) -> String {
        format!(
            "Kernel(state={}, runs={})",
            self.inner.state(),
            self.inner.runs_completed()
        )
    }
}

#[pymodule]
fn megat_kernel(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyKernel>()?;
    m.add_class::<PyRunSummary>()?;
    Ok(())
}

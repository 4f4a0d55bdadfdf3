// ─────────────────────────────────────────────────────────────────────
// Megat Simulation — Run Configuration
// ─────────────────────────────────────────────────────────────────────

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

/// Seed used when neither a config file nor `-seed_time` overrides it.
pub const DEFAULT_SEED: u64 = 987_654_321;

/// Runtime configuration for one simulation job.
///
/// Everything the driver needs before the kernel is built. Actions,
/// physics, and sensitive detectors are configured in code on the
/// kernel itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Detector name; resolves `<root>/geometry/compact/<detector>.xml`.
    pub detector: String,

    /// Environment variable holding the installation root.
    pub install_root_var: String,

    /// Explicit installation root. Takes precedence over the environment.
    pub install_root: Option<PathBuf>,

    /// Fixed RNG seed.
    pub seed: u64,

    /// Seed from wall-clock time instead of `seed`.
    pub seed_from_time: bool,

    /// Run non-interactively.
    pub batch: bool,

    /// Number of events in batch mode.
    pub events: u64,

    /// Output artifact prefix; a `_<YYYY-MM-DD_HH-MM>` stamp is appended.
    pub output_prefix: String,

    /// Directory receiving the output artifact.
    pub output_dir: PathBuf,

    /// Initial macro file executed before the session starts.
    pub macro_file: Option<PathBuf>,

    /// Open a visualization session.
    pub vis: bool,

    /// Optional visualization macro.
    pub vis_macro: Option<PathBuf>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            detector: "Megat".to_string(),
            install_root_var: "REST_PATH".to_string(),
            install_root: None,
            seed: DEFAULT_SEED,
            seed_from_time: false,
            batch: false,
            events: 1,
            output_prefix: "megat".to_string(),
            output_dir: PathBuf::from("."),
            macro_file: None,
            vis: false,
            vis_macro: None,
        }
    }
}

impl SimConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> SimResult<()> {
        if self.detector.is_empty() {
            return Err(SimError::Configuration("detector name must not be empty".to_string()));
        }
        if self.detector.contains(['/', '\\']) {
            return Err(SimError::Configuration(format!(
                "detector name must not contain path separators, got '{}'",
                self.detector
            )));
        }
        if self.install_root.is_none() && self.install_root_var.is_empty() {
            return Err(SimError::Configuration(
                "either install_root or install_root_var must be set".to_string(),
            ));
        }
        if self.batch && self.events == 0 {
            return Err(SimError::Configuration(
                "events must be >= 1 in batch mode".to_string(),
            ));
        }
        if self.output_prefix.is_empty() {
            return Err(SimError::Configuration("output_prefix must not be empty".to_string()));
        }
        Ok(())
    }

    /// Load from JSON string. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> SimResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| SimError::Configuration(format!("JSON parse error: {e}")))
    }

    /// Resolve the installation root from the config or the environment.
    pub fn install_root(&self) -> SimResult<PathBuf> {
        if let Some(root) = &self.install_root {
            return Ok(root.clone());
        }
        match std::env::var_os(&self.install_root_var) {
            Some(v) if !v.is_empty() => Ok(PathBuf::from(v)),
            _ => Err(SimError::Configuration(format!(
                "environment variable {} is not set",
                self.install_root_var
            ))),
        }
    }

    /// Path of the compact geometry file for the configured detector.
    pub fn geometry_path(&self) -> SimResult<PathBuf> {
        Ok(self
            .install_root()?
            .join("geometry")
            .join("compact")
            .join(format!("{}.xml", self.detector)))
    }
}

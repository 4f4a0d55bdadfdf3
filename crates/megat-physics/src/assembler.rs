// ─────────────────────────────────────────────────────────────────────
// Megat Simulation — Physics-List Assembler
// Mirrors: DDG4 Geant4PhysicsListActionSequence
// ─────────────────────────────────────────────────────────────────────
//! Collects a base model, appended constructors, and a global range
//! cut, then resolves them into a frozen `PhysicsList` at kernel
//! initialisation. Nothing is validated until `assemble()`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use megat_types::units::MM;
use megat_types::{KernelState, SimError, SimResult};

use crate::catalog::{base_model_components, is_em_constructor, is_known_constructor};

/// Production range cut applied when none is configured.
pub const DEFAULT_RANGE_CUT: f64 = 0.7 * MM;

/// Resolved, immutable physics configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsList {
    pub base_model: String,
    /// Ordered constructors: base-model expansion, then appended ones.
    pub constructors: Vec<String>,
    /// Global production range cut in mm.
    pub range_cut: f64,
}

impl PhysicsList {
    pub fn contains(&self, constructor: &str) -> bool {
        self.constructors.iter().any(|c| c == constructor)
    }

    /// Log the assembled list.
    pub fn dump(&self) {
        log::info!(
            "Physics list {} ({} constructors, range cut {} mm)",
            self.base_model,
            self.constructors.len(),
            self.range_cut / MM
        );
        for (i, c) in self.constructors.iter().enumerate() {
            log::info!("  [{i:2}] {c}");
        }
    }
}

/// Collects the base model, extra constructors and range cut until
/// `build` freezes them into a `PhysicsList`.
#[derive(Debug, Default)]
pub struct PhysicsAssembler {
    base_model: Option<String>,
    appended: Vec<String>,
    range_cut: Option<f64>,
    custom: BTreeSet<String>,
    frozen: bool,
}

impl PhysicsAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_mutable(&self, operation: &'static str) -> SimResult<()> {
        if self.frozen {
            return Err(SimError::State {
                operation,
                state: KernelState::Initialized,
            });
        }
        Ok(())
    }

    pub fn set_base_model(&mut self, name: &str) -> SimResult<()> {
        self.check_mutable("set_base_model")?;
        self.base_model = Some(name.to_string());
        Ok(())
    }

    pub fn append_constructor(&mut self, name: &str) -> SimResult<()> {
        self.check_mutable("append_constructor")?;
        self.appended.push(name.to_string());
        Ok(())
    }

    /// Global production range cut, in internal length units.
    pub fn set_global_cut(&mut self, value: f64) -> SimResult<()> {
        self.check_mutable("set_global_cut")?;
        self.range_cut = Some(value);
        Ok(())
    }

    /// Make a user-supplied constructor name resolvable.
    pub fn register_constructor(&mut self, name: &str) -> SimResult<()> {
        self.check_mutable("register_constructor")?;
        self.custom.insert(name.to_string());
        Ok(())
    }

    pub fn base_model(&self) -> Option<&str> {
        self.base_model.as_deref()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Resolve every name and build the ordered list. Does not freeze.
    pub fn assemble(&self) -> SimResult<PhysicsList> {
        let base = self.base_model.as_deref().ok_or_else(|| {
            SimError::PhysicsConfiguration("no base physics model set".to_string())
        })?;
        let mut constructors: Vec<String> = base_model_components(base)
            .ok_or_else(|| {
                SimError::PhysicsConfiguration(format!("unknown base physics model '{base}'"))
            })?
            .into_iter()
            .map(str::to_string)
            .collect();

        for name in &self.appended {
            if !is_known_constructor(name) && !self.custom.contains(name) {
                return Err(SimError::PhysicsConfiguration(format!(
                    "unknown physics constructor '{name}'"
                )));
            }
            if constructors.contains(name) {
                log::warn!("Physics constructor {name} already present, ignored");
                continue;
            }
            if is_em_constructor(name) {
                if let Some(slot) = constructors.iter_mut().find(|c| is_em_constructor(c)) {
                    log::info!("Replacing EM constructor {slot} with {name}");
                    *slot = name.clone();
                    continue;
                }
            }
            constructors.push(name.clone());
        }

        let range_cut = self.range_cut.unwrap_or(DEFAULT_RANGE_CUT);
        if !(range_cut > 0.0 && range_cut.is_finite()) {
            return Err(SimError::PhysicsConfiguration(format!(
                "range cut must be a positive length, got {range_cut}"
            )));
        }

        Ok(PhysicsList {
            base_model: base.to_string(),
            constructors,
            range_cut,
        })
    }

    /// Assemble and lock the assembler against further changes.
    pub fn freeze(&mut self) -> SimResult<PhysicsList> {
        let list = self.assemble()?;
        self.frozen = true;
        Ok(list)
    }
}

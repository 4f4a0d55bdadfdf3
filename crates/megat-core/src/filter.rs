// ─────────────────────────────────────────────────────────────────────
// Megat Simulation — Sensitive Detectors and Filters
// Mirrors: DDG4 Geant4Filter + Geant4SensDetActionSequence
// ─────────────────────────────────────────────────────────────────────
//! Filter actions and the per-detector chains they are attached to.
//!
//! A deposit becomes a hit only if every filter of the detector accepts
//! the depositing particle and the deposited energy. Filters run in
//! attachment order and the first rejection stops the chain.

use std::fmt;

use serde::{Deserialize, Serialize};

use megat_types::{species_info, Particle, SimError, SimResult};

use crate::action::{Action, ActionInfo, Filter};
use crate::sequence::OwnershipRegistry;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParticleFilterConfig {
    pub particle: String,
}

fn known_species(config: &ParticleFilterConfig) -> SimResult<()> {
    match species_info(&config.particle) {
        Some(_) => Ok(()),
        None => Err(SimError::Configuration(format!(
            "filter particle '{}' is not a known species",
            config.particle
        ))),
    }
}

/// Accepts only the configured species.
#[derive(Debug, Clone)]
pub struct ParticleSelectFilter {
    info: ActionInfo,
    particle: String,
}

impl ParticleSelectFilter {
    pub fn new(info: ActionInfo, config: ParticleFilterConfig) -> SimResult<Self> {
        known_species(&config)?;
        Ok(Self {
            info,
            particle: config.particle,
        })
    }
}

impl Action for ParticleSelectFilter {
    fn info(&self) -> &ActionInfo {
        &self.info
    }
    fn info_mut(&mut self) -> &mut ActionInfo {
        &mut self.info
    }
}

impl Filter for ParticleSelectFilter {
    fn test(&self, particle: &Particle, _deposit: f64) -> bool {
        particle.species == self.particle
    }
}

/// Rejects the configured species.
#[derive(Debug, Clone)]
pub struct ParticleRejectFilter {
    info: ActionInfo,
    particle: String,
}

impl ParticleRejectFilter {
    pub fn new(info: ActionInfo, config: ParticleFilterConfig) -> SimResult<Self> {
        known_species(&config)?;
        Ok(Self {
            info,
            particle: config.particle,
        })
    }
}

impl Action for ParticleRejectFilter {
    fn info(&self) -> &ActionInfo {
        &self.info
    }
    fn info_mut(&mut self) -> &mut ActionInfo {
        &mut self.info
    }
}

impl Filter for ParticleRejectFilter {
    fn test(&self, particle: &Particle, _deposit: f64) -> bool {
        particle.species != self.particle
    }
}

/// Rejects geantinos, charged or not.
#[derive(Debug, Clone)]
pub struct GeantinoRejectFilter {
    info: ActionInfo,
}

impl GeantinoRejectFilter {
    pub fn new(info: ActionInfo) -> Self {
        Self { info }
    }
}

impl Action for GeantinoRejectFilter {
    fn info(&self) -> &ActionInfo {
        &self.info
    }
    fn info_mut(&mut self) -> &mut ActionInfo {
        &mut self.info
    }
}

impl Filter for GeantinoRejectFilter {
    fn test(&self, particle: &Particle, _deposit: f64) -> bool {
        !matches!(particle.species.as_str(), "geantino" | "chargedgeantino")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnergyCutConfig {
    /// Minimum deposited energy in MeV.
    #[serde(alias = "Cut")]
    pub cut: f64,
}

/// Accepts steps that deposit at least the cut, whatever the particle.
#[derive(Debug, Clone)]
pub struct EnergyMinimumCut {
    info: ActionInfo,
    cut: f64,
}

impl EnergyMinimumCut {
    pub fn new(info: ActionInfo, config: EnergyCutConfig) -> SimResult<Self> {
        if !(config.cut >= 0.0 && config.cut.is_finite()) {
            return Err(SimError::Configuration(format!(
                "energy cut must be finite and >= 0, got {}",
                config.cut
            )));
        }
        Ok(Self {
            info,
            cut: config.cut,
        })
    }
}

impl Action for EnergyMinimumCut {
    fn info(&self) -> &ActionInfo {
        &self.info
    }
    fn info_mut(&mut self) -> &mut ActionInfo {
        &mut self.info
    }
}

impl Filter for EnergyMinimumCut {
    fn test(&self, _particle: &Particle, deposit: f64) -> bool {
        deposit >= self.cut
    }
}

/// Readout flavour of a sensitive detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensitiveKind {
    Tracker,
    Calorimeter,
}

impl fmt::Display for SensitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensitiveKind::Tracker => f.write_str("tracker"),
            SensitiveKind::Calorimeter => f.write_str("calorimeter"),
        }
    }
}

/// Filter chain of one sensitive detector.
pub struct SensitiveSequence {
    detector: String,
    kind: SensitiveKind,
    filters: Vec<Box<dyn Filter>>,
    registry: OwnershipRegistry,
}

impl SensitiveSequence {
    pub fn new(detector: &str, kind: SensitiveKind, registry: OwnershipRegistry) -> Self {
        Self {
            detector: detector.to_string(),
            kind,
            filters: Vec::new(),
            registry,
        }
    }

    fn owner_label(&self) -> String {
        format!("sd:{}", self.detector)
    }

    pub fn detector(&self) -> &str {
        &self.detector
    }

    pub fn kind(&self) -> SensitiveKind {
        self.kind
    }

    /// Append `filter` to the chain, taking ownership.
    pub fn adopt_filter(&mut self, filter: Box<dyn Filter>) -> SimResult<()> {
        self.registry
            .claim(&[(filter.id(), filter.name())], &self.owner_label())?;
        log::debug!("{}: attached filter {}", self.detector, filter.info().qualified_name());
        self.filters.push(filter);
        Ok(())
    }

    /// Every filter accepts `particle` depositing `deposit`.
    pub fn accept(&self, particle: &Particle, deposit: f64) -> bool {
        self.filters.iter().all(|f| f.test(particle, deposit))
    }

    pub fn filter_names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub fn clear(&mut self) {
        self.filters.clear();
        self.registry.release(&self.owner_label());
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::registry::{ActionFactory, ActionType};
    use megat_types::units::{KEV, MEV};
    use megat_types::{Mask, Vec3};

    fn particle(species: &str, ekin: f64) -> Particle {
        Particle::primary(species, ekin, Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO, Mask::default())
            .unwrap()
    }

    struct Counting {
        info: ActionInfo,
        calls: Rc<Cell<u32>>,
        verdict: bool,
    }

    impl Action for Counting {
        fn info(&self) -> &ActionInfo {
            &self.info
        }
        fn info_mut(&mut self) -> &mut ActionInfo {
            &mut self.info
        }
    }

    impl Filter for Counting {
        fn test(&self, _particle: &Particle, _deposit: f64) -> bool {
            self.calls.set(self.calls.get() + 1);
            self.verdict
        }
    }

    #[test]
    fn test_select_and_reject() {
        let mut factory = ActionFactory::new();
        let cfg = ParticleFilterConfig {
            particle: "opticalphoton".into(),
        };
        let info = factory.info(ActionType::ParticleSelectFilter, "s");
        let select = ParticleSelectFilter::new(info, cfg.clone()).unwrap();
        let info = factory.info(ActionType::ParticleRejectFilter, "r");
        let reject = ParticleRejectFilter::new(info, cfg).unwrap();
        let photon = particle("opticalphoton", 3.0e-6);
        let muon = particle("mu+", 1000.0);
        assert!(select.test(&photon, 0.0) && !select.test(&muon, 0.0));
        assert!(!reject.test(&photon, 0.0) && reject.test(&muon, 0.0));
    }

    #[test]
    fn test_unknown_filter_species() {
        let mut factory = ActionFactory::new();
        let cfg = ParticleFilterConfig {
            particle: "photino".into(),
        };
        let info = factory.info(ActionType::ParticleSelectFilter, "s");
        assert!(ParticleSelectFilter::new(info, cfg).is_err());
    }

    #[test]
    fn test_geantino_and_energy_cut() {
        let mut factory = ActionFactory::new();
        let geantino =
            GeantinoRejectFilter::new(factory.info(ActionType::GeantinoRejectFilter, "g"));
        assert!(!geantino.test(&particle("geantino", 1.0), 1.0));
        assert!(!geantino.test(&particle("chargedgeantino", 1.0), 1.0));
        assert!(geantino.test(&particle("e-", 1.0), 1.0));

        let cut = EnergyMinimumCut::new(
            factory.info(ActionType::EnergyMinimumCut, "EnergyCut"),
            EnergyCutConfig { cut: 1.0 * KEV },
        )
        .unwrap();
        assert!(cut.test(&particle("e-", 0.5 * KEV), 2.0 * KEV));
        assert!(!cut.test(&particle("e-", 0.5 * KEV), 0.5 * KEV));
    }

    #[test]
    fn test_energy_cut_ignores_kinetic_energy() {
        let mut factory = ActionFactory::new();
        let cfg: EnergyCutConfig = serde_json::from_str(r#"{"Cut": 0.001}"#).unwrap();
        let info = factory.info(ActionType::EnergyMinimumCut, "EnergyCut");
        let cut = EnergyMinimumCut::new(info, cfg).unwrap();
        // A 1 GeV muon leaving a sub-keV deposit is cut.
        assert!(!cut.test(&particle("mu+", 1000.0 * MEV), 0.5 * KEV));
        assert!(cut.test(&particle("mu+", 1000.0 * MEV), 1.0 * KEV));
    }

    #[test]
    fn test_chain_short_circuits_in_attachment_order() {
        let mut factory = ActionFactory::new();
        let mut sd = SensitiveSequence::new(
            "Calorimeter",
            SensitiveKind::Calorimeter,
            OwnershipRegistry::new(),
        );
        let first = Rc::new(Cell::new(0));
        let second = Rc::new(Cell::new(0));
        sd.adopt_filter(Box::new(Counting {
            info: factory.info(ActionType::GeantinoRejectFilter, "first"),
            calls: Rc::clone(&first),
            verdict: false,
        }))
        .unwrap();
        sd.adopt_filter(Box::new(Counting {
            info: factory.info(ActionType::GeantinoRejectFilter, "second"),
            calls: Rc::clone(&second),
            verdict: true,
        }))
        .unwrap();
        assert!(!sd.accept(&particle("e-", 1.0), 1.0));
        assert_eq!((first.get(), second.get()), (1, 0));
        assert_eq!(sd.filter_names(), vec!["first", "second"]);
    }

    #[test]
    fn test_empty_chain_accepts() {
        let sd =
            SensitiveSequence::new("Tracker", SensitiveKind::Tracker, OwnershipRegistry::new());
        assert!(sd.accept(&particle("geantino", 1.0), 0.0));
    }

    #[test]
    fn test_clear_releases_filters() {
        let mut factory = ActionFactory::new();
        let registry = OwnershipRegistry::new();
        let mut sd =
            SensitiveSequence::new("Calorimeter", SensitiveKind::Calorimeter, registry.clone());
        sd.adopt_filter(Box::new(GeantinoRejectFilter::new(
            factory.info(ActionType::GeantinoRejectFilter, "g"),
        )))
        .unwrap();
        assert_eq!(registry.len(), 1);
        sd.clear();
        assert!(registry.is_empty());
    }
}

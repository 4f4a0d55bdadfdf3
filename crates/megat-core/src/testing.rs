// ─────────────────────────────────────────────────────────────────────
// Megat Simulation — Test Fixtures
// ─────────────────────────────────────────────────────────────────────

use megat_physics::{PhysicsAssembler, PhysicsList, RandomEngine};
use megat_types::Mask;

use crate::action::ActionContext;
use crate::detector::DetectorDescription;

/// Owns everything an `ActionContext` borrows.
pub(crate) struct Fixture {
    pub rng: RandomEngine,
    pub detector: DetectorDescription,
    pub physics: PhysicsList,
}

impl Fixture {
    pub fn new() -> Self {
        let mut assembler = PhysicsAssembler::new();
        assembler.set_base_model("QGSP_BERT").unwrap();
        Self {
            rng: RandomEngine::with_seed(987_654_321),
            detector: test_detector(),
            physics: assembler.assemble().unwrap(),
        }
    }

    pub fn ctx(&mut self) -> ActionContext<'_> {
        ActionContext {
            run: 0,
            event: Some(0),
            mask: Mask::default(),
            rng: &mut self.rng,
            detector: &self.detector,
            physics: &self.physics,
        }
    }
}

pub(crate) fn test_detector() -> DetectorDescription {
    DetectorDescription::new("Megat")
        .with_detector("Calorimeter", "Megat_Calorimeter")
        .with_detector("Tracker", "Megat_Tracker")
        .with_constant("tracker_region_rmax", "1*m")
        .with_constant("tracker_region_zmax", "2*m")
}

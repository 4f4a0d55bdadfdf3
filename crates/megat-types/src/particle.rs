// ─────────────────────────────────────────────────────────────────────
// Megat Simulation — Particle and Interaction Record Types
// ─────────────────────────────────────────────────────────────────────
//! Value types exchanged between generator stages: particles, masks,
//! interaction records, and the primary sets handed to transport.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

/// Plain 3-vector in internal units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn perp(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Unit vector along `self`, or `None` for a zero or non-finite vector.
    pub fn unit(&self) -> Option<Vec3> {
        let n = self.norm();
        if n > 0.0 && n.is_finite() {
            Some(self.scale(1.0 / n))
        } else {
            None
        }
    }

    pub fn scale(&self, k: f64) -> Vec3 {
        Vec3::new(self.x * k, self.y * k, self.z * k)
    }

    pub fn add(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl From<(f64, f64, f64)> for Vec3 {
    fn from((x, y, z): (f64, f64, f64)) -> Self {
        Vec3::new(x, y, z)
    }
}

/// Generator stream tag. Unset means stream 0.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Mask(u32);

impl Mask {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn id(self) -> u32 {
        self.0
    }
}

impl TryFrom<i64> for Mask {
    type Error = SimError;

    fn try_from(value: i64) -> SimResult<Self> {
        u32::try_from(value)
            .map(Mask)
            .map_err(|_| SimError::Validation(format!("invalid mask id {value}")))
    }
}

impl fmt::Display for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mask {}", self.0)
    }
}

/// Key under which an interaction record lives in an event.
///
/// Stream records sort by ascending mask; the merged record sorts last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordKey {
    Stream(Mask),
    Merged,
}

/// Static properties of a particle species.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeciesInfo {
    pub name: &'static str,
    pub pdg: i32,
    /// Rest mass in MeV.
    pub mass: f64,
    /// Charge in units of e.
    pub charge: f64,
}

const SPECIES: [SpeciesInfo; 17] = [
    SpeciesInfo { name: "e-", pdg: 11, mass: 0.510_998_95, charge: -1.0 },
    SpeciesInfo { name: "e+", pdg: -11, mass: 0.510_998_95, charge: 1.0 },
    SpeciesInfo { name: "mu-", pdg: 13, mass: 105.658_375_5, charge: -1.0 },
    SpeciesInfo { name: "mu+", pdg: -13, mass: 105.658_375_5, charge: 1.0 },
    SpeciesInfo { name: "pi+", pdg: 211, mass: 139.570_39, charge: 1.0 },
    SpeciesInfo { name: "pi-", pdg: -211, mass: 139.570_39, charge: -1.0 },
    SpeciesInfo { name: "pi0", pdg: 111, mass: 134.976_8, charge: 0.0 },
    SpeciesInfo { name: "kaon+", pdg: 321, mass: 493.677, charge: 1.0 },
    SpeciesInfo { name: "kaon-", pdg: -321, mass: 493.677, charge: -1.0 },
    SpeciesInfo { name: "gamma", pdg: 22, mass: 0.0, charge: 0.0 },
    SpeciesInfo { name: "opticalphoton", pdg: -22, mass: 0.0, charge: 0.0 },
    SpeciesInfo { name: "proton", pdg: 2212, mass: 938.272_088_16, charge: 1.0 },
    SpeciesInfo { name: "neutron", pdg: 2112, mass: 939.565_420_52, charge: 0.0 },
    SpeciesInfo { name: "deuteron", pdg: 1_000_010_020, mass: 1875.612_94, charge: 1.0 },
    SpeciesInfo { name: "alpha", pdg: 1_000_020_040, mass: 3727.379_4, charge: 2.0 },
    SpeciesInfo { name: "geantino", pdg: 0, mass: 0.0, charge: 0.0 },
    SpeciesInfo { name: "chargedgeantino", pdg: 0, mass: 0.0, charge: 1.0 },
];

/// Look up a species by name.
pub fn species_info(name: &str) -> Option<&'static SpeciesInfo> {
    SPECIES.iter().find(|s| s.name == name)
}

/// Creation process assigned to generated (primary) particles.
pub const PRIMARY_PROCESS: &str = "Primary";

/// A generated or simulated particle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    /// Index within its record (generator) or event (simulation).
    pub id: u32,
    /// Parent particle id; `None` for primaries.
    pub parent: Option<u32>,
    pub species: String,
    pub pdg: i32,
    pub mass: f64,
    pub charge: f64,
    /// Stream that produced the particle.
    pub mask: Mask,
    /// Kinetic energy in MeV.
    pub kinetic_energy: f64,
    /// Momentum in MeV/c.
    pub momentum: Vec3,
    /// Production vertex in mm.
    pub vertex: Vec3,
    /// Production time in ns.
    pub time: f64,
    /// Name of the creating process.
    pub process: String,
}

impl Particle {
    /// Build a primary particle of a known species.
    ///
    /// `direction` need not be normalised; a zero direction is rejected.
    pub fn primary(
        species: &str,
        kinetic_energy: f64,
        direction: Vec3,
        vertex: Vec3,
        mask: Mask,
    ) -> SimResult<Self> {
        let info = species_info(species).ok_or_else(|| {
            SimError::Configuration(format!("unknown particle species '{species}'"))
        })?;
        let dir = direction
            .unit()
            .ok_or_else(|| SimError::Validation(format!("degenerate direction {direction:?}")))?;
        if !(kinetic_energy >= 0.0 && kinetic_energy.is_finite()) {
            return Err(SimError::Validation(format!(
                "kinetic energy must be finite and >= 0, got {kinetic_energy}"
            )));
        }
        let p = (kinetic_energy * (kinetic_energy + 2.0 * info.mass)).sqrt();
        Ok(Self {
            id: 0,
            parent: None,
            species: info.name.to_string(),
            pdg: info.pdg,
            mass: info.mass,
            charge: info.charge,
            mask,
            kinetic_energy,
            momentum: dir.scale(p),
            vertex,
            time: 0.0,
            process: PRIMARY_PROCESS.to_string(),
        })
    }

    pub fn is_primary(&self) -> bool {
        self.parent.is_none()
    }

    pub fn total_energy(&self) -> f64 {
        self.kinetic_energy + self.mass
    }
}

/// Particles produced by one generator stream, or the merge of several.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub key: RecordKey,
    /// Every stream tag that contributed particles, deduplicated.
    pub masks: BTreeSet<Mask>,
    pub particles: Vec<Particle>,
}

impl InteractionRecord {
    pub fn new(mask: Mask) -> Self {
        Self {
            key: RecordKey::Stream(mask),
            masks: BTreeSet::from([mask]),
            particles: Vec::new(),
        }
    }

    pub fn merged() -> Self {
        Self {
            key: RecordKey::Merged,
            masks: BTreeSet::new(),
            particles: Vec::new(),
        }
    }

    pub fn contains_mask(&self, mask: Mask) -> bool {
        self.masks.contains(&mask)
    }

    /// Append a particle, numbering it within this record.
    pub fn push(&mut self, mut particle: Particle) {
        particle.id = self.particles.len() as u32;
        self.particles.push(particle);
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }
}

/// A primary particle as handed to transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryParticle {
    pub track_id: u32,
    pub species: String,
    pub pdg: i32,
    pub mask: Mask,
    pub kinetic_energy: f64,
    pub momentum: Vec3,
    pub vertex: Vec3,
    pub time: f64,
}

impl From<&Particle> for PrimaryParticle {
    fn from(p: &Particle) -> Self {
        Self {
            track_id: p.id + 1,
            species: p.species.clone(),
            pdg: p.pdg,
            mask: p.mask,
            kinetic_energy: p.kinetic_energy,
            momentum: p.momentum,
            vertex: p.vertex,
            time: p.time,
        }
    }
}

/// One set of primaries for transport, tagged with its source masks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrimarySet {
    pub masks: Vec<Mask>,
    pub particles: Vec<PrimaryParticle>,
}

impl PrimarySet {
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::MEV;

    #[test]
    fn test_mask_from_negative_rejected() {
        assert!(matches!(Mask::try_from(-1), Err(SimError::Validation(_))));
        assert_eq!(Mask::try_from(7).unwrap(), Mask::new(7));
    }

    #[test]
    fn test_record_keys_sort_streams_then_merged() {
        let mut keys = vec![
            RecordKey::Merged,
            RecordKey::Stream(Mask::new(3)),
            RecordKey::Stream(Mask::new(1)),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                RecordKey::Stream(Mask::new(1)),
                RecordKey::Stream(Mask::new(3)),
                RecordKey::Merged
            ]
        );
    }

    #[test]
    fn test_primary_momentum_from_kinetic_energy() {
        let p = Particle::primary(
            "mu+",
            1000.0 * MEV,
            Vec3::new(0.0, 0.0, -2.0),
            Vec3::ZERO,
            Mask::new(2),
        )
        .unwrap();
        let m = species_info("mu+").unwrap().mass;
        let expected = (1000.0 * (1000.0 + 2.0 * m)).sqrt();
        assert!((p.momentum.norm() - expected).abs() < 1e-9);
        assert!(p.momentum.z < 0.0);
        assert_eq!(p.pdg, -13);
        assert!(p.is_primary());
    }

    #[test]
    fn test_unknown_species() {
        let direction = Vec3::new(0.0, 0.0, 1.0);
        let err = Particle::primary("muon", 1.0, direction, Vec3::ZERO, Mask::default());
        assert!(matches!(err, Err(SimError::Configuration(_))));
    }

    #[test]
    fn test_zero_direction_rejected() {
        let err = Particle::primary("e-", 1.0, Vec3::ZERO, Vec3::ZERO, Mask::default());
        assert!(matches!(err, Err(SimError::Validation(_))));
    }

    #[test]
    fn test_record_push_numbers_particles() {
        let mut rec = InteractionRecord::new(Mask::new(1));
        for _ in 0..3 {
            let direction = Vec3::new(1.0, 0.0, 0.0);
            let p = Particle::primary("gamma", 5.0, direction, Vec3::ZERO, Mask::new(1)).unwrap();
            rec.push(p);
        }
        let ids: Vec<u32> = rec.particles.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(rec.contains_mask(Mask::new(1)));
        assert!(!rec.contains_mask(Mask::new(2)));
    }
}

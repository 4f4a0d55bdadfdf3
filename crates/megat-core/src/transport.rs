// ─────────────────────────────────────────────────────────────────────
// Megat Simulation — Transport Boundary
// ─────────────────────────────────────────────────────────────────────
//! Trait seam between primary generation and particle transport.
//!
//! Transport physics is external. The kernel hands each event's primary
//! sets to a `TrackingEngine` and receives simulated particles plus raw
//! energy deposits, which sensitive detectors then filter into hits.

use serde::{Deserialize, Serialize};

use megat_types::{Particle, PrimarySet, SimResult, Vec3, PRIMARY_PROCESS};

use crate::action::ActionContext;

/// Raw energy deposit reported by transport, before filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyDeposit {
    pub detector: String,
    /// Event-level id of the depositing particle.
    pub particle: u32,
    pub energy: f64,
    pub position: Vec3,
    pub time: f64,
}

/// Result of tracking one event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackingOutput {
    /// Every particle seen by transport, primaries first.
    pub particles: Vec<Particle>,
    pub deposits: Vec<EnergyDeposit>,
}

/// Transports one event's primaries.
pub trait TrackingEngine {
    fn name(&self) -> &str;

    fn track(
        &mut self,
        primaries: &[PrimarySet],
        ctx: &mut ActionContext<'_>,
    ) -> SimResult<TrackingOutput>;
}

/// Emits each primary unchanged as a tracked particle with no deposits.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughTransport;

impl TrackingEngine for PassThroughTransport {
    fn name(&self) -> &str {
        "PassThroughTransport"
    }

    fn track(
        &mut self,
        primaries: &[PrimarySet],
        _ctx: &mut ActionContext<'_>,
    ) -> SimResult<TrackingOutput> {
        let particles = primaries
            .iter()
            .flat_map(|set| set.particles.iter())
            .map(|p| {
                let info = megat_types::species_info(&p.species);
                Particle {
                    id: p.track_id.saturating_sub(1),
                    parent: None,
                    species: p.species.clone(),
                    pdg: p.pdg,
                    mass: info.map_or(0.0, |s| s.mass),
                    charge: info.map_or(0.0, |s| s.charge),
                    mask: p.mask,
                    kinetic_energy: p.kinetic_energy,
                    momentum: p.momentum,
                    vertex: p.vertex,
                    time: p.time,
                    process: PRIMARY_PROCESS.to_string(),
                }
            })
            .collect();
        Ok(TrackingOutput {
            particles,
            deposits: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use megat_types::{Mask, PrimaryParticle};

    #[test]
    fn test_pass_through_keeps_primaries() {
        let mut fx = Fixture::new();
        let p = Particle::primary("e-", 50.0, Vec3::new(0.0, 1.0, 0.0), Vec3::ZERO, Mask::new(1))
            .unwrap();
        let mut second = p.clone();
        second.id = 1;
        let set = PrimarySet {
            masks: vec![Mask::new(1)],
            particles: vec![PrimaryParticle::from(&p), PrimaryParticle::from(&second)],
        };
        let out = PassThroughTransport.track(&[set], &mut fx.ctx()).unwrap();
        assert_eq!(out.particles.len(), 2);
        assert!(out.deposits.is_empty());
        assert_eq!(out.particles[1].id, 1);
        assert!(out.particles.iter().all(Particle::is_primary));
        assert!((out.particles[0].mass - p.mass).abs() < 1e-12);
    }
}

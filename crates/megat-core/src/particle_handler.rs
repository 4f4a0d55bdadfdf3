// ─────────────────────────────────────────────────────────────────────
// Megat Simulation — Particle Post-Processing
// Mirrors: DDG4 Geant4ParticleHandler + Geant4TCUserParticleHandler
// ─────────────────────────────────────────────────────────────────────
//! Decides which simulated particles survive into the event record.
//!
//! Primaries are always kept. A secondary is kept when its creating
//! process is listed in `save_processes` or its kinetic energy exceeds
//! `minimal_kinetic_energy`. An adopted `UserParticleHandler` then has
//! the final say. Parents of kept particles are re-pointed to their
//! nearest kept ancestor.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use megat_types::units::MEV;
use megat_types::{Particle, SimError, SimResult};

use crate::action::{
    Action, ActionContext, ActionInfo, GeneratorAction, OutputLevel, Stage, UserParticleHandler,
};
use crate::event::SimEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParticleHandlerConfig {
    #[serde(alias = "SaveProcesses")]
    pub save_processes: Vec<String>,
    /// Kinetic-energy threshold in MeV.
    #[serde(alias = "MinimalKineticEnergy")]
    pub minimal_kinetic_energy: f64,
    #[serde(alias = "KeepAllParticles")]
    pub keep_all_particles: bool,
}

impl Default for ParticleHandlerConfig {
    fn default() -> Self {
        Self {
            save_processes: Vec::new(),
            minimal_kinetic_energy: 1.0 * MEV,
            keep_all_particles: false,
        }
    }
}

/// Post-transport stage deciding which simulated particles the event keeps.
///
/// Primaries are always kept. A secondary is kept when its creating
/// process is listed or its kinetic energy exceeds the threshold. The
/// optional user handler has the final word.
pub struct ParticleHandler {
    info: ActionInfo,
    config: ParticleHandlerConfig,
    user: Option<Box<dyn UserParticleHandler>>,
}

impl ParticleHandler {
    pub fn new(info: ActionInfo, config: ParticleHandlerConfig) -> SimResult<Self> {
        if !(config.minimal_kinetic_energy >= 0.0 && config.minimal_kinetic_energy.is_finite()) {
            return Err(SimError::Configuration(format!(
                "minimal kinetic energy must be finite and >= 0, got {}",
                config.minimal_kinetic_energy
            )));
        }
        Ok(Self {
            info,
            config,
            user: None,
        })
    }

    /// Take ownership of the user post-processor.
    pub fn adopt_user(&mut self, user: Box<dyn UserParticleHandler>) -> SimResult<()> {
        if let Some(existing) = &self.user {
            return Err(SimError::Ownership(format!(
                "{} already owns user handler '{}'",
                self.info.name(),
                existing.name()
            )));
        }
        if user.id() == self.info.id() {
            return Err(SimError::Ownership(format!(
                "{} cannot adopt itself",
                self.info.name()
            )));
        }
        log::debug!("{}: adopted user handler {}", self.info.name(), user.info().qualified_name());
        self.user = Some(user);
        Ok(())
    }

    pub fn config(&self) -> &ParticleHandlerConfig {
        &self.config
    }

    fn default_verdict(&self, p: &Particle) -> bool {
        p.is_primary()
            || self.config.keep_all_particles
            || self.config.save_processes.iter().any(|s| *s == p.process)
            || p.kinetic_energy > self.config.minimal_kinetic_energy
    }

    /// Filter `tracked`, returning kept particles with rewritten parents.
    pub fn select(&mut self, ctx: &ActionContext<'_>, tracked: &[Particle]) -> Vec<Particle> {
        let index: HashMap<u32, usize> =
            tracked.iter().enumerate().map(|(i, p)| (p.id, i)).collect();
        let keep: Vec<bool> = tracked
            .iter()
            .map(|p| {
                if p.is_primary() {
                    return true;
                }
                let default = self.default_verdict(p);
                match self.user.as_mut() {
                    Some(user) => user.keep(ctx, p, default),
                    None => default,
                }
            })
            .collect();

        tracked
            .iter()
            .zip(&keep)
            .filter(|(_, kept)| **kept)
            .map(|(p, _)| {
                let mut out = p.clone();
                let mut parent = p.parent;
                // Bounded walk; malformed parent links cannot loop forever.
                for _ in 0..tracked.len() {
                    match parent.and_then(|id| index.get(&id).copied()) {
                        Some(i) if keep[i] => break,
                        Some(i) => parent = tracked[i].parent,
                        None => {
                            parent = None;
                            break;
                        }
                    }
                }
                out.parent = parent;
                out
            })
            .collect()
    }
}

impl Action for ParticleHandler {
    fn info(&self) -> &ActionInfo {
        &self.info
    }
    fn info_mut(&mut self) -> &mut ActionInfo {
        &mut self.info
    }
    fn children(&self) -> Vec<&ActionInfo> {
        self.user.iter().map(|u| u.info()).collect()
    }
}

impl GeneratorAction for ParticleHandler {
    fn stage(&self) -> Stage {
        Stage::PostProcess
    }

    fn generate(&mut self, _ctx: &mut ActionContext<'_>, _event: &mut SimEvent) -> SimResult<()> {
        Ok(())
    }

    fn post_track(&mut self, ctx: &mut ActionContext<'_>, event: &mut SimEvent) -> SimResult<()> {
        let kept = self.select(ctx, &event.tracked);
        self.info.log(
            OutputLevel::Debug,
            format_args!(
                "event {}: kept {} of {} particles",
                event.id,
                kept.len(),
                event.tracked.len()
            ),
        );
        event.particles = kept;
        Ok(())
    }
}

/// Properties of `TCUserParticleHandler`, lengths in mm.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackingVolumeConfig {
    pub tracking_volume_zmax: Option<f64>,
    pub tracking_volume_rmax: Option<f64>,
}

/// Keeps only secondaries created inside the tracking volume.
///
/// Limits come from the properties or, when unset, from the detector
/// constants `tracker_region_zmax` and `tracker_region_rmax`.
pub struct TCUserParticleHandler {
    info: ActionInfo,
    config: TrackingVolumeConfig,
    warned: bool,
}

impl TCUserParticleHandler {
    pub fn new(info: ActionInfo, config: TrackingVolumeConfig) -> Self {
        Self {
            info,
            config,
            warned: false,
        }
    }

    fn limits(&self, ctx: &ActionContext<'_>) -> Option<(f64, f64)> {
        let zmax = self
            .config
            .tracking_volume_zmax
            .or_else(|| ctx.detector.constant_f64("tracker_region_zmax"))?;
        let rmax = self
            .config
            .tracking_volume_rmax
            .or_else(|| ctx.detector.constant_f64("tracker_region_rmax"))?;
        Some((zmax, rmax))
    }
}

impl Action for TCUserParticleHandler {
    fn info(&self) -> &ActionInfo {
        &self.info
    }
    fn info_mut(&mut self) -> &mut ActionInfo {
        &mut self.info
    }
}

impl UserParticleHandler for TCUserParticleHandler {
    fn keep(&mut self, ctx: &ActionContext<'_>, particle: &Particle, default: bool) -> bool {
        let Some((zmax, rmax)) = self.limits(ctx) else {
            if !self.warned {
                log::warn!(
                    "{}: no tracking volume limits; keeping default decisions",
                    self.info.name()
                );
                self.warned = true;
            }
            return default;
        };
        let inside = particle.vertex.z.abs() <= zmax && particle.vertex.perp() <= rmax;
        default && inside
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ActionFactory, ActionType};
    use crate::sequence::{ActionSequence, OwnershipRegistry};
    use crate::action::Phase;
    use crate::testing::Fixture;
    use megat_types::{Mask, Vec3};

    fn particle(id: u32, parent: Option<u32>, process: &str, ekin: f64, vertex: Vec3) -> Particle {
        let mut p = Particle::primary("e-", ekin, Vec3::new(0.0, 0.0, 1.0), vertex, Mask::default())
            .unwrap();
        p.id = id;
        p.parent = parent;
        p.process = process.to_string();
        p
    }

    fn handler(factory: &mut ActionFactory) -> ParticleHandler {
        let config = ParticleHandlerConfig {
            save_processes: vec!["conv".into(), "Decay".into()],
            minimal_kinetic_energy: 10.0 * MEV,
            keep_all_particles: false,
        };
        ParticleHandler::new(factory.info(ActionType::ParticleHandler, "ParticleHandler"), config)
            .unwrap()
    }

    #[test]
    fn test_config_accepts_script_names() {
        let config: ParticleHandlerConfig = serde_json::from_str(
            r#"{"SaveProcesses": ["conv", "Decay"], "MinimalKineticEnergy": 10.0}"#,
        )
        .unwrap();
        assert_eq!(config.save_processes, vec!["conv", "Decay"]);
        assert_eq!(config.minimal_kinetic_energy, 10.0 * MEV);
        assert!(!config.keep_all_particles);
    }

    #[test]
    fn test_saved_process_kept_below_cut() {
        let mut fx = Fixture::new();
        let mut factory = ActionFactory::new();
        let mut h = handler(&mut factory);
        let tracked = vec![
            particle(0, None, "Primary", 1000.0, Vec3::ZERO),
            particle(1, Some(0), "Decay", 5.0, Vec3::ZERO),
            particle(2, Some(0), "eIoni", 5.0, Vec3::ZERO),
        ];
        let kept = h.select(&fx.ctx(), &tracked);
        let ids: Vec<u32> = kept.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_energy_above_cut_kept() {
        let mut fx = Fixture::new();
        let mut factory = ActionFactory::new();
        let mut h = handler(&mut factory);
        let tracked = vec![
            particle(0, None, "Primary", 1000.0, Vec3::ZERO),
            particle(1, Some(0), "hIoni", 50.0, Vec3::ZERO),
        ];
        assert_eq!(h.select(&fx.ctx(), &tracked).len(), 2);
    }

    #[test]
    fn test_parent_reassigned_to_kept_ancestor() {
        let mut fx = Fixture::new();
        let mut factory = ActionFactory::new();
        let mut h = handler(&mut factory);
        let tracked = vec![
            particle(0, None, "Primary", 1000.0, Vec3::ZERO),
            particle(1, Some(0), "eIoni", 2.0, Vec3::ZERO),
            particle(2, Some(1), "conv", 3.0, Vec3::ZERO),
        ];
        let kept = h.select(&fx.ctx(), &tracked);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[1].id, 2);
        assert_eq!(kept[1].parent, Some(0));
    }

    #[test]
    fn test_post_track_fills_event_particles() {
        let mut fx = Fixture::new();
        let mut factory = ActionFactory::new();
        let mut h = handler(&mut factory);
        let mut ev = SimEvent::new(0, 0);
        ev.tracked = vec![
            particle(0, None, "Primary", 1000.0, Vec3::ZERO),
            particle(1, Some(0), "eIoni", 2.0, Vec3::ZERO),
        ];
        h.post_track(&mut fx.ctx(), &mut ev).unwrap();
        assert_eq!(ev.particles.len(), 1);
        assert_eq!(ev.tracked.len(), 2);
    }

    #[test]
    fn test_user_handler_drops_outside_tracker() {
        let mut fx = Fixture::new();
        let mut factory = ActionFactory::new();
        let mut h = handler(&mut factory);
        let user = TCUserParticleHandler::new(
            factory.info(ActionType::TCUserParticleHandler, "UserParticleHandler"),
            TrackingVolumeConfig::default(),
        );
        h.adopt_user(Box::new(user)).unwrap();
        // Fixture tracker region: rmax 1 m, zmax 2 m.
        let tracked = vec![
            particle(0, None, "Primary", 1000.0, Vec3::new(0.0, 0.0, 5000.0)),
            particle(1, Some(0), "Decay", 5.0, Vec3::new(100.0, 0.0, 0.0)),
            particle(2, Some(0), "Decay", 5.0, Vec3::new(1500.0, 0.0, 0.0)),
            particle(3, Some(0), "Decay", 5.0, Vec3::new(0.0, 0.0, -2500.0)),
        ];
        let kept = h.select(&fx.ctx(), &tracked);
        let ids: Vec<u32> = kept.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_user_handler_properties_override_constants() {
        let mut fx = Fixture::new();
        let mut factory = ActionFactory::new();
        let mut user = TCUserParticleHandler::new(
            factory.info(ActionType::TCUserParticleHandler, "u"),
            TrackingVolumeConfig {
                tracking_volume_zmax: Some(10.0),
                tracking_volume_rmax: Some(10.0),
            },
        );
        let p = particle(1, Some(0), "Decay", 5.0, Vec3::new(100.0, 0.0, 0.0));
        assert!(!user.keep(&fx.ctx(), &p, true));
    }

    #[test]
    fn test_second_user_handler_rejected() {
        let mut factory = ActionFactory::new();
        let mut h = handler(&mut factory);
        for expect_ok in [true, false] {
            let user = TCUserParticleHandler::new(
                factory.info(ActionType::TCUserParticleHandler, "u"),
                TrackingVolumeConfig::default(),
            );
            assert_eq!(h.adopt_user(Box::new(user)).is_ok(), expect_ok);
        }
    }

    #[test]
    fn test_adopting_handler_claims_user_identity() {
        let mut factory = ActionFactory::new();
        let registry = OwnershipRegistry::new();
        let mut h = handler(&mut factory);
        let user_info = factory.info(ActionType::TCUserParticleHandler, "u");
        let user_id = user_info.id();
        let user = TCUserParticleHandler::new(user_info, TrackingVolumeConfig::default());
        h.adopt_user(Box::new(user)).unwrap();
        let mut seq: ActionSequence<dyn GeneratorAction> =
            ActionSequence::new(Phase::Generator, registry.clone());
        seq.adopt(Box::new(h)).unwrap();
        assert!(registry.owner_of(user_id).is_some());
    }
}

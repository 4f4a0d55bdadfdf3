// ─────────────────────────────────────────────────────────────────────
// Megat Simulation — Generator Chain
// Mirrors: DDG4 Geant4GeneratorActionSequence
// ─────────────────────────────────────────────────────────────────────
//! The generator-phase sequence.
//!
//! Per event the chain starts from an empty record set and runs every
//! stage in adoption order. A stage failing with `SimError::Validation`
//! is skipped and noted on the event; the chain carries on. Any other
//! failure aborts the rest of the invocation.

use std::collections::BTreeSet;

use megat_types::{Mask, SimError, SimResult};

use crate::action::{ActionContext, GeneratorAction, Phase, Stage};
use crate::event::{Diagnostic, SimEvent};
use crate::sequence::{ActionSequence, OwnershipRegistry};

/// Ordered generator stages run once per event.
pub struct GeneratorChain {
    stages: ActionSequence<dyn GeneratorAction>,
}

impl GeneratorChain {
    pub fn new(registry: OwnershipRegistry) -> Self {
        Self {
            stages: ActionSequence::new(Phase::Generator, registry),
        }
    }

    pub fn adopt(&mut self, stage: Box<dyn GeneratorAction>) -> SimResult<()> {
        self.stages.adopt(stage)
    }

    pub fn sequence(&self) -> &ActionSequence<dyn GeneratorAction> {
        &self.stages
    }

    /// Configure-time checks on stage order and stage properties.
    pub fn validate_layout(&self) -> SimResult<()> {
        let mut emitted: BTreeSet<Mask> = BTreeSet::new();
        let mut converted = false;
        for stage in self.stages.iter() {
            stage.validate()?;
            let role = stage.stage();
            if converted && role.consumes_records() {
                return Err(SimError::Configuration(format!(
                    "{} ({role:?}) is registered after primary conversion",
                    stage.info().qualified_name()
                )));
            }
            match role {
                Stage::Emit => {
                    emitted.insert(stage.mask());
                }
                Stage::Smear if !emitted.contains(&stage.mask()) => {
                    log::warn!(
                        "{}: {} is not produced by any earlier stage",
                        stage.name(),
                        stage.mask()
                    );
                }
                Stage::PrimaryConvert => converted = true,
                _ => {}
            }
        }
        if !emitted.is_empty() && !converted {
            log::warn!(
                "generator chain has emitters but no primary handler; \
                 events will carry no primaries"
            );
        }
        Ok(())
    }

    /// Build the event's primaries.
    pub fn generate(&mut self, ctx: &mut ActionContext<'_>, event: &mut SimEvent) -> SimResult<()> {
        event.records.clear();
        let result = self.stages.invoke_all(ctx, |stage, ctx| {
            ctx.mask = stage.mask();
            match stage.generate(ctx, event) {
                Err(SimError::Validation(reason)) => {
                    log::warn!("{}: stage skipped for event {}: {reason}", stage.name(), event.id);
                    event.diagnostics.push(Diagnostic::StageSkipped {
                        stage: stage.name().to_string(),
                        reason,
                    });
                    Ok(())
                }
                other => other,
            }
        });
        ctx.mask = Mask::default();
        result
    }

    /// Post-transport pass, in chain order.
    pub fn post_track(
        &mut self,
        ctx: &mut ActionContext<'_>,
        event: &mut SimEvent,
    ) -> SimResult<()> {
        let result = self.stages.invoke_all(ctx, |stage, ctx| {
            ctx.mask = stage.mask();
            stage.post_track(ctx, event)
        });
        ctx.mask = Mask::default();
        result
    }

    pub fn clear(&mut self) {
        self.stages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::{
        DirectionSpec, EnergySpec, GeneratorActionInit, GeneratorConfig, InteractionMerger,
        ParticleGenerator, PrimaryHandler, SmearConfig, VertexSmear,
    };
    use crate::registry::{ActionFactory, ActionType};
    use crate::sequence::SequenceInfo;
    use crate::testing::Fixture;
    use megat_types::Vec3;

    fn gun(
        factory: &mut ActionFactory,
        name: &str,
        mask: u32,
        particle: &str,
        n: u32,
    ) -> Box<dyn GeneratorAction> {
        let config = GeneratorConfig {
            mask: Mask::new(mask),
            particle: particle.to_string(),
            energy: EnergySpec::Fixed(1000.0),
            multiplicity: n,
            position: Vec3::new(10.0, 10.0, 0.0),
            direction: DirectionSpec::Fixed(Vec3::new(0.0, 0.0, -1.0)),
        };
        let info = factory.info(ActionType::ParticleGenerator, name);
        Box::new(ParticleGenerator::new(info, config).unwrap())
    }

    fn primary_handler(factory: &mut ActionFactory) -> Box<dyn GeneratorAction> {
        Box::new(PrimaryHandler::new(factory.info(ActionType::PrimaryHandler, "PrimaryHandler")))
    }

    fn merger(factory: &mut ActionFactory) -> Box<dyn GeneratorAction> {
        let info = factory.info(ActionType::InteractionMerger, "InteractionMerger");
        Box::new(InteractionMerger::new(info))
    }

    #[test]
    fn test_single_stream_without_merge() {
        let mut fx = Fixture::new();
        let mut factory = ActionFactory::new();
        let mut chain = GeneratorChain::new(OwnershipRegistry::new());
        chain
            .adopt(Box::new(GeneratorActionInit::new(
                factory.info(ActionType::GeneratorActionInit, "GeneratorActionInit"),
            )))
            .unwrap();
        chain.adopt(gun(&mut factory, "Mu+", 2, "mu+", 3)).unwrap();
        chain.adopt(primary_handler(&mut factory)).unwrap();
        chain.validate_layout().unwrap();

        let mut ev = SimEvent::new(0, 0);
        chain.generate(&mut fx.ctx(), &mut ev).unwrap();
        assert_eq!(ev.primaries.len(), 1);
        let set = &ev.primaries[0];
        assert_eq!(set.masks, vec![Mask::new(2)]);
        assert_eq!(set.len(), 3);
        for p in &set.particles {
            assert_eq!(p.species, "mu+");
            assert_eq!(p.mask, Mask::new(2));
            assert_eq!(p.kinetic_energy, 1000.0);
            assert_eq!(p.vertex, Vec3::new(10.0, 10.0, 0.0));
            assert!(p.momentum.z < 0.0);
            assert!(p.momentum.x == 0.0 && p.momentum.y == 0.0);
        }
    }

    #[test]
    fn test_two_streams_with_merge() {
        let mut fx = Fixture::new();
        let mut factory = ActionFactory::new();
        let mut chain = GeneratorChain::new(OwnershipRegistry::new());
        chain.adopt(gun(&mut factory, "Mu+", 2, "mu+", 2)).unwrap();
        chain.adopt(gun(&mut factory, "Pi+", 1, "pi+", 1)).unwrap();
        chain.adopt(merger(&mut factory)).unwrap();
        chain.adopt(primary_handler(&mut factory)).unwrap();
        chain.validate_layout().unwrap();

        let mut ev = SimEvent::new(0, 0);
        chain.generate(&mut fx.ctx(), &mut ev).unwrap();
        assert_eq!(ev.primaries.len(), 1);
        let set = &ev.primaries[0];
        assert_eq!(set.masks, vec![Mask::new(1), Mask::new(2)]);
        let species: Vec<&str> = set.particles.iter().map(|p| p.species.as_str()).collect();
        assert_eq!(species, vec!["pi+", "mu+", "mu+"]);
    }

    #[test]
    fn test_smear_unknown_mask_skipped() {
        let mut fx = Fixture::new();
        let mut factory = ActionFactory::new();
        let mut chain = GeneratorChain::new(OwnershipRegistry::new());
        chain.adopt(gun(&mut factory, "Mu+", 2, "mu+", 1)).unwrap();
        let smear = VertexSmear::new(
            factory.info(ActionType::InteractionVertexSmear, "Smear7"),
            SmearConfig {
                mask: Mask::new(7),
                sigma: [1.0; 4],
                ..SmearConfig::default()
            },
        )
        .unwrap();
        chain.adopt(Box::new(smear)).unwrap();
        chain.adopt(primary_handler(&mut factory)).unwrap();
        // Layout check only warns about the unproduced mask.
        chain.validate_layout().unwrap();

        let mut ev = SimEvent::new(0, 0);
        chain.generate(&mut fx.ctx(), &mut ev).unwrap();
        assert_eq!(ev.primaries.len(), 1);
        assert_eq!(ev.primaries[0].particles[0].vertex, Vec3::new(10.0, 10.0, 0.0));
        assert!(matches!(
            ev.diagnostics.as_slice(),
            [Diagnostic::StageSkipped { stage, .. }] if stage == "Smear7"
        ));
        assert!(chain.sequence().failures().is_empty());
    }

    #[test]
    fn test_smear_after_merge_moves_whole_merged_record() {
        let mut fx = Fixture::new();
        let mut factory = ActionFactory::new();
        let mut chain = GeneratorChain::new(OwnershipRegistry::new());
        chain.adopt(gun(&mut factory, "Pi+", 1, "pi+", 1)).unwrap();
        chain.adopt(gun(&mut factory, "Mu+", 2, "mu+", 1)).unwrap();
        chain.adopt(merger(&mut factory)).unwrap();
        let smear = VertexSmear::new(
            factory.info(ActionType::InteractionVertexSmear, "Smear1"),
            SmearConfig {
                mask: Mask::new(1),
                offset: [1.0, 0.0, 0.0, 2.0],
                sigma: [0.0; 4],
            },
        )
        .unwrap();
        chain.adopt(Box::new(smear)).unwrap();
        chain.adopt(primary_handler(&mut factory)).unwrap();
        chain.validate_layout().unwrap();

        let mut ev = SimEvent::new(0, 0);
        chain.generate(&mut fx.ctx(), &mut ev).unwrap();
        assert!(ev.diagnostics.is_empty());
        let set = &ev.primaries[0];
        assert_eq!(set.masks, vec![Mask::new(1), Mask::new(2)]);
        // The mask-2 particle now shares the smeared vertex.
        for p in &set.particles {
            assert_eq!(p.vertex, Vec3::new(11.0, 10.0, 0.0));
            assert_eq!(p.time, 2.0);
        }
    }

    #[test]
    fn test_second_merge_after_late_emit() {
        let mut fx = Fixture::new();
        let mut factory = ActionFactory::new();
        let mut chain = GeneratorChain::new(OwnershipRegistry::new());
        chain.adopt(gun(&mut factory, "Pi+", 3, "pi+", 1)).unwrap();
        chain.adopt(gun(&mut factory, "E-", 1, "e-", 1)).unwrap();
        chain
            .adopt(Box::new(InteractionMerger::new(
                factory.info(ActionType::InteractionMerger, "FirstMerge"),
            )))
            .unwrap();
        chain.adopt(gun(&mut factory, "Mu+", 2, "mu+", 1)).unwrap();
        chain
            .adopt(Box::new(InteractionMerger::new(
                factory.info(ActionType::InteractionMerger, "SecondMerge"),
            )))
            .unwrap();
        chain.adopt(primary_handler(&mut factory)).unwrap();
        chain.validate_layout().unwrap();

        let mut ev = SimEvent::new(0, 0);
        chain.generate(&mut fx.ctx(), &mut ev).unwrap();
        assert_eq!(ev.primaries.len(), 1);
        let set = &ev.primaries[0];
        assert_eq!(set.masks, vec![Mask::new(1), Mask::new(2), Mask::new(3)]);
        let masks: Vec<u32> = set.particles.iter().map(|p| p.mask.id()).collect();
        assert_eq!(masks, vec![1, 2, 3]);
        let tracks: Vec<u32> = set.particles.iter().map(|p| p.track_id).collect();
        assert_eq!(tracks, vec![1, 2, 3]);
    }

    #[test]
    fn test_emit_after_primary_conversion_rejected() {
        let mut factory = ActionFactory::new();
        let mut chain = GeneratorChain::new(OwnershipRegistry::new());
        chain.adopt(primary_handler(&mut factory)).unwrap();
        chain.adopt(gun(&mut factory, "late", 1, "e-", 1)).unwrap();
        assert!(matches!(chain.validate_layout(), Err(SimError::Configuration(_))));
    }

    #[test]
    fn test_no_emitters_gives_empty_primaries() {
        let mut fx = Fixture::new();
        let mut factory = ActionFactory::new();
        let mut chain = GeneratorChain::new(OwnershipRegistry::new());
        chain.adopt(primary_handler(&mut factory)).unwrap();
        let mut ev = SimEvent::new(0, 3);
        chain.generate(&mut fx.ctx(), &mut ev).unwrap();
        assert!(ev.primaries.is_empty());
        assert!(ev.has_empty_primaries());
    }

    #[test]
    fn test_generation_is_reproducible_for_a_seed() {
        let run = || {
            let mut fx = Fixture::new();
            let mut factory = ActionFactory::new();
            let mut chain = GeneratorChain::new(OwnershipRegistry::new());
            let cfg = GeneratorConfig {
                particle: "pi+".into(),
                multiplicity: 5,
                ..GeneratorConfig::isotropic()
            };
            let info = factory.info(ActionType::IsotropeGenerator, "iso");
            chain
                .adopt(Box::new(ParticleGenerator::new(info, cfg).unwrap()))
                .unwrap();
            chain.adopt(primary_handler(&mut factory)).unwrap();
            let mut ev = SimEvent::new(0, 0);
            chain.generate(&mut fx.ctx(), &mut ev).unwrap();
            ev.primaries
        };
        assert_eq!(run(), run());
    }
}

// ─────────────────────────────────────────────────────────────────────
// Megat Simulation — Typed Action Registry
// ─────────────────────────────────────────────────────────────────────
//! Closed catalogue of action types and their typed property sets.
//!
//! The `Type/instance` string form is parsed here and nowhere else.
//! Properties arrive as JSON and are rejected if they name a field the
//! type does not have.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use megat_types::{SimError, SimResult};

use crate::action::{ActionId, ActionInfo, AnyAction};
use crate::event_actions::{OutputAction, OutputConfig, ParticlePrint, ParticlePrintConfig};
use crate::filter::{
    EnergyCutConfig, EnergyMinimumCut, GeantinoRejectFilter, ParticleFilterConfig,
    ParticleRejectFilter, ParticleSelectFilter,
};
use crate::generators::{
    GeneratorActionInit, GeneratorConfig, InteractionMerger, ParticleGenerator, PrimaryHandler,
    SmearConfig, VertexSmear,
};
use crate::output::{output_name, JsonLinesSink};
use crate::particle_handler::{
    ParticleHandler, ParticleHandlerConfig, TCUserParticleHandler, TrackingVolumeConfig,
};
use crate::run_actions::{TestRunAction, TestRunConfig};

/// Every action type the kernel knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    TestRunAction,
    ParticlePrint,
    OutputAction,
    GeneratorActionInit,
    ParticleGenerator,
    IsotropeGenerator,
    InteractionVertexSmear,
    InteractionMerger,
    PrimaryHandler,
    ParticleHandler,
    TCUserParticleHandler,
    ParticleSelectFilter,
    ParticleRejectFilter,
    GeantinoRejectFilter,
    EnergyMinimumCut,
}

impl ActionType {
    pub const ALL: [ActionType; 15] = [
        ActionType::TestRunAction,
        ActionType::ParticlePrint,
        ActionType::OutputAction,
        ActionType::GeneratorActionInit,
        ActionType::ParticleGenerator,
        ActionType::IsotropeGenerator,
        ActionType::InteractionVertexSmear,
        ActionType::InteractionMerger,
        ActionType::PrimaryHandler,
        ActionType::ParticleHandler,
        ActionType::TCUserParticleHandler,
        ActionType::ParticleSelectFilter,
        ActionType::ParticleRejectFilter,
        ActionType::GeantinoRejectFilter,
        ActionType::EnergyMinimumCut,
    ];

    /// Canonical type name.
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::TestRunAction => "Geant4TestRunAction",
            ActionType::ParticlePrint => "Geant4ParticlePrint",
            ActionType::OutputAction => "Geant4OutputAction",
            ActionType::GeneratorActionInit => "Geant4GeneratorActionInit",
            ActionType::ParticleGenerator => "Geant4ParticleGenerator",
            ActionType::IsotropeGenerator => "Geant4IsotropeGenerator",
            ActionType::InteractionVertexSmear => "Geant4InteractionVertexSmear",
            ActionType::InteractionMerger => "Geant4InteractionMerger",
            ActionType::PrimaryHandler => "Geant4PrimaryHandler",
            ActionType::ParticleHandler => "Geant4ParticleHandler",
            ActionType::TCUserParticleHandler => "Geant4TCUserParticleHandler",
            ActionType::ParticleSelectFilter => "ParticleSelectFilter",
            ActionType::ParticleRejectFilter => "ParticleRejectFilter",
            ActionType::GeantinoRejectFilter => "GeantinoRejectFilter",
            ActionType::EnergyMinimumCut => "EnergyMinimumCut",
        }
    }

    /// Split `Type/instance`. A bare type uses its short name as instance.
    pub fn parse_spec(spec: &str) -> SimResult<(ActionType, String)> {
        let (ty, name) = match spec.split_once('/') {
            Some((ty, name)) => (ty.trim(), name.trim()),
            None => (spec.trim(), ""),
        };
        let action_type: ActionType = ty.parse()?;
        let name = if name.is_empty() {
            ty.strip_prefix("Geant4").unwrap_or(ty).to_string()
        } else {
            name.to_string()
        };
        Ok((action_type, name))
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = SimError;

    fn from_str(s: &str) -> SimResult<Self> {
        let bare = s.strip_prefix("Geant4").unwrap_or(s);
        if bare == "EnergyDepositMinimumCut" {
            return Ok(ActionType::EnergyMinimumCut);
        }
        ActionType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().strip_prefix("Geant4").unwrap_or(t.as_str()) == bare)
            .ok_or_else(|| SimError::Configuration(format!("unknown action type '{s}'")))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoProperties {}

/// Typed property set, one variant per action type.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionConfig {
    TestRunAction(TestRunConfig),
    ParticlePrint(ParticlePrintConfig),
    OutputAction(OutputConfig),
    GeneratorActionInit,
    ParticleGenerator(GeneratorConfig),
    IsotropeGenerator(GeneratorConfig),
    InteractionVertexSmear(SmearConfig),
    InteractionMerger,
    PrimaryHandler,
    ParticleHandler(ParticleHandlerConfig),
    TCUserParticleHandler(TrackingVolumeConfig),
    ParticleSelectFilter(ParticleFilterConfig),
    ParticleRejectFilter(ParticleFilterConfig),
    GeantinoRejectFilter,
    EnergyMinimumCut(EnergyCutConfig),
}

fn parse<T: DeserializeOwned + Default>(ty: ActionType, json: Option<&str>) -> SimResult<T> {
    match json.map(str::trim) {
        None | Some("") => Ok(T::default()),
        Some(text) => serde_json::from_str(text)
            .map_err(|e| SimError::Configuration(format!("invalid properties for {ty}: {e}"))),
    }
}

impl ActionConfig {
    /// Deserialize properties for `action_type`. `None` means defaults.
    pub fn from_json(action_type: ActionType, json: Option<&str>) -> SimResult<Self> {
        let ty = action_type;
        Ok(match action_type {
            ActionType::TestRunAction => ActionConfig::TestRunAction(parse(ty, json)?),
            ActionType::ParticlePrint => ActionConfig::ParticlePrint(parse(ty, json)?),
            ActionType::OutputAction => ActionConfig::OutputAction(parse(ty, json)?),
            ActionType::GeneratorActionInit => {
                parse::<NoProperties>(ty, json)?;
                ActionConfig::GeneratorActionInit
            }
            ActionType::ParticleGenerator => ActionConfig::ParticleGenerator(parse(ty, json)?),
            ActionType::IsotropeGenerator => {
                let cfg = match json.map(str::trim) {
                    None | Some("") => GeneratorConfig::isotropic(),
                    Some(_) => parse(ty, json)?,
                };
                ActionConfig::IsotropeGenerator(cfg)
            }
            ActionType::InteractionVertexSmear => {
                ActionConfig::InteractionVertexSmear(parse(ty, json)?)
            }
            ActionType::InteractionMerger => {
                parse::<NoProperties>(ty, json)?;
                ActionConfig::InteractionMerger
            }
            ActionType::PrimaryHandler => {
                parse::<NoProperties>(ty, json)?;
                ActionConfig::PrimaryHandler
            }
            ActionType::ParticleHandler => ActionConfig::ParticleHandler(parse(ty, json)?),
            ActionType::TCUserParticleHandler => {
                ActionConfig::TCUserParticleHandler(parse(ty, json)?)
            }
            ActionType::ParticleSelectFilter => {
                ActionConfig::ParticleSelectFilter(parse(ty, json)?)
            }
            ActionType::ParticleRejectFilter => {
                ActionConfig::ParticleRejectFilter(parse(ty, json)?)
            }
            ActionType::GeantinoRejectFilter => {
                parse::<NoProperties>(ty, json)?;
                ActionConfig::GeantinoRejectFilter
            }
            ActionType::EnergyMinimumCut => ActionConfig::EnergyMinimumCut(parse(ty, json)?),
        })
    }

    pub fn action_type(&self) -> ActionType {
        match self {
            ActionConfig::TestRunAction(_) => ActionType::TestRunAction,
            ActionConfig::ParticlePrint(_) => ActionType::ParticlePrint,
            ActionConfig::OutputAction(_) => ActionType::OutputAction,
            ActionConfig::GeneratorActionInit => ActionType::GeneratorActionInit,
            ActionConfig::ParticleGenerator(_) => ActionType::ParticleGenerator,
            ActionConfig::IsotropeGenerator(_) => ActionType::IsotropeGenerator,
            ActionConfig::InteractionVertexSmear(_) => ActionType::InteractionVertexSmear,
            ActionConfig::InteractionMerger => ActionType::InteractionMerger,
            ActionConfig::PrimaryHandler => ActionType::PrimaryHandler,
            ActionConfig::ParticleHandler(_) => ActionType::ParticleHandler,
            ActionConfig::TCUserParticleHandler(_) => ActionType::TCUserParticleHandler,
            ActionConfig::ParticleSelectFilter(_) => ActionType::ParticleSelectFilter,
            ActionConfig::ParticleRejectFilter(_) => ActionType::ParticleRejectFilter,
            ActionConfig::GeantinoRejectFilter => ActionType::GeantinoRejectFilter,
            ActionConfig::EnergyMinimumCut(_) => ActionType::EnergyMinimumCut,
        }
    }
}

/// Issues action identities and builds actions from typed configs.
#[derive(Debug, Default)]
pub struct ActionFactory {
    next_id: u64,
}

impl ActionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh identity for an action of `action_type` named `name`.
    pub fn info(&mut self, action_type: ActionType, name: &str) -> ActionInfo {
        self.next_id += 1;
        ActionInfo::new(ActionId(self.next_id), action_type, name)
    }

    /// Build a named action from its property set.
    pub fn build(&mut self, name: &str, config: ActionConfig) -> SimResult<AnyAction> {
        let info = self.info(config.action_type(), name);
        Ok(match config {
            ActionConfig::TestRunAction(cfg) => {
                AnyAction::Run(Box::new(TestRunAction::new(info, cfg)))
            }
            ActionConfig::ParticlePrint(cfg) => {
                AnyAction::Event(Box::new(ParticlePrint::new(info, cfg)?))
            }
            ActionConfig::OutputAction(cfg) => {
                let file = PathBuf::from(&cfg.directory)
                    .join(format!("{}.jsonl", output_name(&cfg.prefix, chrono::Local::now())));
                AnyAction::Event(Box::new(OutputAction::new(
                    info,
                    Box::new(JsonLinesSink::new(file)),
                )))
            }
            ActionConfig::GeneratorActionInit => {
                AnyAction::Generator(Box::new(GeneratorActionInit::new(info)))
            }
            ActionConfig::ParticleGenerator(cfg) | ActionConfig::IsotropeGenerator(cfg) => {
                AnyAction::Generator(Box::new(ParticleGenerator::new(info, cfg)?))
            }
            ActionConfig::InteractionVertexSmear(cfg) => {
                AnyAction::Generator(Box::new(VertexSmear::new(info, cfg)?))
            }
            ActionConfig::InteractionMerger => {
                AnyAction::Generator(Box::new(InteractionMerger::new(info)))
            }
            ActionConfig::PrimaryHandler => {
                AnyAction::Generator(Box::new(PrimaryHandler::new(info)))
            }
            ActionConfig::ParticleHandler(cfg) => {
                AnyAction::Generator(Box::new(ParticleHandler::new(info, cfg)?))
            }
            ActionConfig::TCUserParticleHandler(cfg) => {
                AnyAction::ParticleUser(Box::new(TCUserParticleHandler::new(info, cfg)))
            }
            ActionConfig::ParticleSelectFilter(cfg) => {
                AnyAction::Filter(Box::new(ParticleSelectFilter::new(info, cfg)?))
            }
            ActionConfig::ParticleRejectFilter(cfg) => {
                AnyAction::Filter(Box::new(ParticleRejectFilter::new(info, cfg)?))
            }
            ActionConfig::GeantinoRejectFilter => {
                AnyAction::Filter(Box::new(GeantinoRejectFilter::new(info)))
            }
            ActionConfig::EnergyMinimumCut(cfg) => {
                AnyAction::Filter(Box::new(EnergyMinimumCut::new(info, cfg)?))
            }
        })
    }

    /// Parse `Type/instance` plus JSON properties and build the action.
    pub fn build_from_spec(&mut self, spec: &str, json: Option<&str>) -> SimResult<AnyAction> {
        let (action_type, name) = ActionType::parse_spec(spec)?;
        let config = ActionConfig::from_json(action_type, json)?;
        self.build(&name, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Phase;
    use megat_types::Mask;

    #[test]
    fn test_type_names_with_and_without_prefix() {
        assert_eq!(
            "Geant4ParticleHandler".parse::<ActionType>().unwrap(),
            ActionType::ParticleHandler
        );
        assert_eq!("ParticleHandler".parse::<ActionType>().unwrap(), ActionType::ParticleHandler);
        assert_eq!(
            "EnergyDepositMinimumCut".parse::<ActionType>().unwrap(),
            ActionType::EnergyMinimumCut
        );
        assert!(matches!(
            "Geant4Nonsense".parse::<ActionType>(),
            Err(SimError::Configuration(_))
        ));
    }

    #[test]
    fn test_every_type_parses_its_own_name() {
        for ty in ActionType::ALL {
            assert_eq!(ty.as_str().parse::<ActionType>().unwrap(), ty);
        }
    }

    #[test]
    fn test_parse_spec() {
        let (ty, name) = ActionType::parse_spec("Geant4ParticleGenerator/Mu+").unwrap();
        assert_eq!(ty, ActionType::ParticleGenerator);
        assert_eq!(name, "Mu+");
        let (ty, name) = ActionType::parse_spec("Geant4PrimaryHandler").unwrap();
        assert_eq!(ty, ActionType::PrimaryHandler);
        assert_eq!(name, "PrimaryHandler");
    }

    #[test]
    fn test_unknown_property_rejected() {
        let err = ActionConfig::from_json(ActionType::ParticleGenerator, Some(r#"{"Mask": 2}"#));
        assert!(matches!(err, Err(SimError::Configuration(_))));
        let err = ActionConfig::from_json(ActionType::PrimaryHandler, Some(r#"{"x": 1}"#));
        assert!(matches!(err, Err(SimError::Configuration(_))));
    }

    #[test]
    fn test_generator_properties() {
        let cfg = ActionConfig::from_json(
            ActionType::ParticleGenerator,
            Some(
                r#"{"mask": 2, "particle": "mu+", "energy": 1000.0, "multiplicity": 3,
                    "position": {"x": 10.0, "y": 10.0, "z": 0.0},
                    "direction": {"x": 0.0, "y": 0.0, "z": -1.0}}"#,
            ),
        )
        .unwrap();
        match cfg {
            ActionConfig::ParticleGenerator(g) => {
                assert_eq!(g.mask, Mask::new(2));
                assert_eq!(g.multiplicity, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_factory_issues_distinct_ids_and_phases() {
        let mut factory = ActionFactory::new();
        let gen = factory
            .build_from_spec("Geant4GeneratorActionInit/GeneratorActionInit", None)
            .unwrap();
        let run = factory
            .build_from_spec("Geant4TestRunAction/RunInit", Some(r#"{"property_int": 12345}"#))
            .unwrap();
        let filter = factory
            .build_from_spec("GeantinoRejectFilter/GeantinoRejector", None)
            .unwrap();
        assert_ne!(gen.info().id(), run.info().id());
        assert_eq!(gen.phase(), Some(Phase::Generator));
        assert_eq!(run.phase(), Some(Phase::Run));
        assert_eq!(filter.phase(), None);
        assert_eq!(run.info().name(), "RunInit");
    }
}

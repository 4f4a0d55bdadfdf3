// ─────────────────────────────────────────────────────────────────────
// Megat Simulation — Action Model
// ─────────────────────────────────────────────────────────────────────
//! Capabilities implemented by every pluggable unit of a run.
//!
//! - `RunAction`: invoked at the start and end of each run.
//! - `EventAction`: invoked at the start and end of each event.
//! - `GeneratorAction`: one stage of the generator chain.
//! - `Filter`: accept/reject test attached to a sensitive detector.
//! - `UserParticleHandler`: sub-action owned by a particle handler.

use std::fmt;

use serde::{Deserialize, Serialize};

use megat_physics::{PhysicsList, RandomEngine};
use megat_types::{Mask, Particle, SimError, SimResult};

use crate::detector::DetectorDescription;
use crate::event::{RunSummary, SimEvent};
use crate::registry::ActionType;

/// Scope at which an action is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Run,
    Event,
    Generator,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Run => f.write_str("run"),
            Phase::Event => f.write_str("event"),
            Phase::Generator => f.write_str("generator"),
        }
    }
}

/// Identity issued by `ActionFactory`. Clones of an action share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActionId(pub(crate) u64);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Output verbosity of an action. Records below the level are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OutputLevel {
    Verbose = 1,
    Debug = 2,
    Info = 3,
    Warning = 4,
    Error = 5,
    Fatal = 6,
    Always = 7,
}

impl OutputLevel {
    pub fn from_level(level: u8) -> SimResult<Self> {
        Ok(match level {
            1 => OutputLevel::Verbose,
            2 => OutputLevel::Debug,
            3 => OutputLevel::Info,
            4 => OutputLevel::Warning,
            5 => OutputLevel::Error,
            6 => OutputLevel::Fatal,
            7 => OutputLevel::Always,
            _ => {
                return Err(SimError::Validation(format!(
                    "output level must be in 1..=7, got {level}"
                )))
            }
        })
    }

    pub fn log_level(self) -> log::Level {
        match self {
            OutputLevel::Verbose => log::Level::Trace,
            OutputLevel::Debug => log::Level::Debug,
            OutputLevel::Info => log::Level::Info,
            OutputLevel::Warning => log::Level::Warn,
            OutputLevel::Error | OutputLevel::Fatal => log::Level::Error,
            OutputLevel::Always => log::Level::Info,
        }
    }
}

/// Name, identity, and verbosity shared by every action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionInfo {
    id: ActionId,
    name: String,
    action_type: ActionType,
    pub output_level: OutputLevel,
    pub ui_enabled: bool,
}

impl ActionInfo {
    pub(crate) fn new(id: ActionId, action_type: ActionType, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            action_type,
            output_level: OutputLevel::Info,
            ui_enabled: false,
        }
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action_type(&self) -> ActionType {
        self.action_type
    }

    /// `Type/instance` form, as used by the scripting layer.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.action_type, self.name)
    }

    pub fn enable_ui(&mut self) {
        self.ui_enabled = true;
    }

    pub fn is_enabled(&self, level: OutputLevel) -> bool {
        level >= self.output_level
    }

    /// Emit a log record if `level` passes this action's threshold.
    pub fn log(&self, level: OutputLevel, args: fmt::Arguments<'_>) {
        if self.is_enabled(level) {
            log::log!(level.log_level(), "{}: {}", self.name, args);
        }
    }
}

/// Per-invocation context handed to every action.
///
/// The random engine is the only mutable shared state; the detector
/// and physics list are read-only once the kernel is initialised.
pub struct ActionContext<'a> {
    pub run: u32,
    pub event: Option<u64>,
    /// Mask of the stage being invoked (stream 0 outside the chain).
    pub mask: Mask,
    pub rng: &'a mut RandomEngine,
    pub detector: &'a DetectorDescription,
    pub physics: &'a PhysicsList,
}

/// Base capability of every pluggable unit.
pub trait Action {
    fn info(&self) -> &ActionInfo;

    fn info_mut(&mut self) -> &mut ActionInfo;

    fn name(&self) -> &str {
        self.info().name()
    }

    fn id(&self) -> ActionId {
        self.info().id()
    }

    /// Identities of nested sub-actions owned by this action.
    fn children(&self) -> Vec<&ActionInfo> {
        Vec::new()
    }
}

/// Member of the Run phase: called at run boundaries.
pub trait RunAction: Action {
    fn begin_run(&mut self, ctx: &mut ActionContext<'_>) -> SimResult<()>;

    fn end_run(&mut self, ctx: &mut ActionContext<'_>, summary: &RunSummary) -> SimResult<()>;
}

/// Member of the Event phase.
///
/// `begin_event` runs once the generator chain has produced the
/// event's primaries; `end_event` after hits are collected.
pub trait EventAction: Action {
    fn begin_event(&mut self, _ctx: &mut ActionContext<'_>) -> SimResult<()> {
        Ok(())
    }

    fn end_event(&mut self, ctx: &mut ActionContext<'_>, event: &SimEvent) -> SimResult<()>;

    /// Called once after the last event of a run.
    fn end_run(&mut self, _ctx: &mut ActionContext<'_>) -> SimResult<()> {
        Ok(())
    }
}

/// Role of a generator stage within the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Bookkeeping before any record exists.
    Init,
    /// Creates or extends the record of its mask.
    Emit,
    /// Perturbs vertices of the records carrying its mask.
    Smear,
    /// Folds every record into one.
    Merge,
    /// Consumes raw records into primary sets.
    PrimaryConvert,
    /// Filters simulated particles after transport.
    PostProcess,
}

impl Stage {
    /// Stages that read or write raw interaction records.
    pub fn consumes_records(self) -> bool {
        matches!(self, Stage::Emit | Stage::Smear | Stage::Merge)
    }
}

/// Stage of the generator chain.
pub trait GeneratorAction: Action {
    fn stage(&self) -> Stage;

    /// Mask produced (Emit) or targeted (Smear).
    fn mask(&self) -> Mask {
        Mask::default()
    }

    /// Static checks run by `Kernel::configure`.
    fn validate(&self) -> SimResult<()> {
        Ok(())
    }

    fn generate(&mut self, ctx: &mut ActionContext<'_>, event: &mut SimEvent) -> SimResult<()>;

    /// Called after transport, in chain order.
    fn post_track(&mut self, _ctx: &mut ActionContext<'_>, _event: &mut SimEvent) -> SimResult<()> {
        Ok(())
    }
}

/// Hit filter of a sensitive detector.
///
/// `deposit` is the energy the particle left in the step, in MeV.
pub trait Filter: Action {
    fn test(&self, particle: &Particle, deposit: f64) -> bool;
}

/// Experiment hook nested inside a `ParticleHandler`.
pub trait UserParticleHandler: Action {
    /// Final keep/drop decision for a simulated secondary.
    ///
    /// `default` is the particle handler's own verdict.
    fn keep(&mut self, ctx: &ActionContext<'_>, particle: &Particle, default: bool) -> bool;
}

/// Any action the factory can build, tagged by capability.
pub enum AnyAction {
    Run(Box<dyn RunAction>),
    Event(Box<dyn EventAction>),
    Generator(Box<dyn GeneratorAction>),
    Filter(Box<dyn Filter>),
    ParticleUser(Box<dyn UserParticleHandler>),
}

impl AnyAction {
    pub fn info(&self) -> &ActionInfo {
        match self {
            AnyAction::Run(a) => a.info(),
            AnyAction::Event(a) => a.info(),
            AnyAction::Generator(a) => a.info(),
            AnyAction::Filter(a) => a.info(),
            AnyAction::ParticleUser(a) => a.info(),
        }
    }

    pub fn info_mut(&mut self) -> &mut ActionInfo {
        match self {
            AnyAction::Run(a) => a.info_mut(),
            AnyAction::Event(a) => a.info_mut(),
            AnyAction::Generator(a) => a.info_mut(),
            AnyAction::Filter(a) => a.info_mut(),
            AnyAction::ParticleUser(a) => a.info_mut(),
        }
    }

    /// Phase sequence this action is adopted into, if any.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            AnyAction::Run(_) => Some(Phase::Run),
            AnyAction::Event(_) => Some(Phase::Event),
            AnyAction::Generator(_) => Some(Phase::Generator),
            AnyAction::Filter(_) | AnyAction::ParticleUser(_) => None,
        }
    }
}

impl fmt::Debug for AnyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnyAction({})", self.info().qualified_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_level_roundtrip() {
        for level in 1..=7u8 {
            assert_eq!(OutputLevel::from_level(level).unwrap() as u8, level);
        }
        assert!(OutputLevel::from_level(0).is_err());
        assert!(OutputLevel::from_level(8).is_err());
    }

    #[test]
    fn test_output_level_threshold() {
        let mut info = ActionInfo::new(ActionId(1), ActionType::ParticleHandler, "ParticleHandler");
        info.output_level = OutputLevel::Error;
        assert!(!info.is_enabled(OutputLevel::Info));
        assert!(info.is_enabled(OutputLevel::Error));
        assert!(info.is_enabled(OutputLevel::Always));
    }

    #[test]
    fn test_qualified_name() {
        let info = ActionInfo::new(ActionId(3), ActionType::ParticleGenerator, "Mu+");
        assert_eq!(info.qualified_name(), "Geant4ParticleGenerator/Mu+");
    }

    #[test]
    fn test_only_emit_smear_merge_consume_records() {
        assert!(Stage::Emit.consumes_records());
        assert!(Stage::Merge.consumes_records());
        assert!(!Stage::PrimaryConvert.consumes_records());
        assert!(!Stage::PostProcess.consumes_records());
    }
}

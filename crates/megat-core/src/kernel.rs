// ─────────────────────────────────────────────────────────────────────
// Megat Simulation — Kernel Lifecycle
// Mirrors: DDG4 Geant4Kernel + Geant4Exec (event loop)
// ─────────────────────────────────────────────────────────────────────
//! Central registry and lifecycle state machine.
//!
//! ```text
//! Unconfigured ──configure──▶ Configured ──initialize──▶ Initialized
//!                                                          │
//!                                              run ◀───────┤
//!                                               │          │
//!                                            Running ──terminate──▶ Terminated
//! ```
//!
//! Everything registered with the kernel is owned by it. `terminate`
//! releases the physics list, the action sequences, and finally the
//! detector description, in that order.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use megat_physics::{PhysicsAssembler, PhysicsList, RandomEngine, RandomStatus};
use megat_types::{KernelState, Mask, SimError, SimResult};

use crate::action::{
    Action, ActionContext, ActionInfo, AnyAction, EventAction, Filter, GeneratorAction, Phase,
    RunAction,
};
use crate::chain::GeneratorChain;
use crate::detector::{DetectorDescription, GeometryLoader};
use crate::event::{Diagnostic, Hit, RunSummary, SimEvent};
use crate::filter::{SensitiveKind, SensitiveSequence};
use crate::registry::ActionFactory;
use crate::sequence::{ActionSequence, OwnershipRegistry, SequenceInfo};
use crate::transport::{EnergyDeposit, PassThroughTransport, TrackingEngine};
use crate::ui::{CommandQueue, StopHandle, UiCommand, UiExecutor};

/// How `Kernel::run` obtains its work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// One run of a fixed number of events.
    Batch(u64),
    /// A fixed command list; forwarded commands go to the UI executor.
    Commands(Vec<String>),
    /// Commands pulled from the UI executor until it is exhausted.
    Session,
}

/// Owner of every sequence, the random engine and the geometry.
///
/// The kernel moves forward through `Unconfigured -> Configured ->
/// Initialized -> Running -> Terminated`. Actions may only be adopted
/// before `configure()` and physics is frozen by `initialize()`. Each
/// event runs the generator chain first, then `begin_event` of the
/// Event phase, transport, hit collection, post-processing and finally
/// `end_event`.
///
/// ```no_run
/// use std::path::Path;
///
/// use megat_core::{CompactFileLoader, Kernel, RunMode};
///
/// let mut kernel = Kernel::new();
/// kernel.load_geometry(&CompactFileLoader, Path::new("compact/Megat.xml"))?;
/// kernel.seed(987_654_321)?;
/// kernel.setup_physics("QGSP_BERT")?;
/// kernel.configure()?;
/// kernel.initialize()?;
/// let summary = kernel.run(RunMode::Batch(10))?;
/// kernel.terminate()?;
/// println!("{} events", summary.events_processed);
/// # Ok::<(), megat_types::SimError>(())
/// ```
pub struct Kernel {
    state: KernelState,
    random: RandomEngine,
    detector: Option<Arc<DetectorDescription>>,
    physics: PhysicsAssembler,
    physics_list: Option<PhysicsList>,
    registry: OwnershipRegistry,
    factory: ActionFactory,
    run_actions: ActionSequence<dyn RunAction>,
    event_actions: ActionSequence<dyn EventAction>,
    generator: GeneratorChain,
    sensitive: Vec<SensitiveSequence>,
    globals: BTreeMap<String, ActionInfo>,
    transport: Box<dyn TrackingEngine>,
    ui: Option<Box<dyn UiExecutor>>,
    stop: StopHandle,
    run_number: u32,
    next_event: u64,
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

fn context<'a>(
    run: u32,
    event: Option<u64>,
    rng: &'a mut RandomEngine,
    detector: &'a DetectorDescription,
    physics: &'a PhysicsList,
) -> ActionContext<'a> {
    ActionContext {
        run,
        event,
        mask: Mask::default(),
        rng,
        detector,
        physics,
    }
}

fn failure(owner: &str, e: SimError) -> Diagnostic {
    match e {
        SimError::Action { action, reason } => Diagnostic::ActionFailed { action, reason },
        other => Diagnostic::ActionFailed {
            action: owner.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Turn deposits into hits for the sensitive detectors that accept them.
fn collect_hits(
    sensitive: &[SensitiveSequence],
    event: &mut SimEvent,
    deposits: Vec<EnergyDeposit>,
) {
    for deposit in deposits {
        let Some(sd) = sensitive.iter().find(|sd| sd.detector() == deposit.detector) else {
            log::trace!("deposit in insensitive volume {}", deposit.detector);
            continue;
        };
        let Some(particle) = event.tracked.iter().find(|p| p.id == deposit.particle) else {
            log::warn!(
                "event {}: deposit references unknown particle {}",
                event.id,
                deposit.particle
            );
            continue;
        };
        if !sd.accept(particle, deposit.energy) {
            continue;
        }
        let hit = Hit {
            detector: deposit.detector.clone(),
            track_id: particle.id + 1,
            pdg: particle.pdg,
            energy_deposit: deposit.energy,
            position: deposit.position,
            time: deposit.time,
        };
        event.hits.entry(deposit.detector).or_default().push(hit);
    }
}

impl Kernel {
    pub fn new() -> Self {
        let registry = OwnershipRegistry::new();
        Self {
            state: KernelState::Unconfigured,
            random: RandomEngine::new(),
            detector: None,
            physics: PhysicsAssembler::new(),
            physics_list: None,
            run_actions: ActionSequence::new(Phase::Run, registry.clone()),
            event_actions: ActionSequence::new(Phase::Event, registry.clone()),
            generator: GeneratorChain::new(registry.clone()),
            registry,
            factory: ActionFactory::new(),
            sensitive: Vec::new(),
            globals: BTreeMap::new(),
            transport: Box::new(PassThroughTransport),
            ui: None,
            stop: StopHandle::new(),
            run_number: 0,
            next_event: 0,
        }
    }

    fn require(&self, operation: &'static str, allowed: &[KernelState]) -> SimResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SimError::State {
                operation,
                state: self.state,
            })
        }
    }

    fn require_unconfigured(&self, operation: &'static str) -> SimResult<()> {
        self.require(operation, &[KernelState::Unconfigured])
    }

    pub fn state(&self) -> KernelState {
        self.state
    }

    // ── Setup ───────────────────────────────────────────────────────

    /// Action factory; issues identities for hand-built actions.
    pub fn factory(&mut self) -> &mut ActionFactory {
        &mut self.factory
    }

    /// Build an action from `Type/instance` and JSON properties.
    pub fn create(&mut self, spec: &str, json: Option<&str>) -> SimResult<AnyAction> {
        self.factory.build_from_spec(spec, json)
    }

    pub fn set_detector(&mut self, detector: DetectorDescription) -> SimResult<()> {
        self.require_unconfigured("set_detector")?;
        detector.validate()?;
        self.detector = Some(Arc::new(detector));
        Ok(())
    }

    pub fn load_geometry(&mut self, loader: &dyn GeometryLoader, path: &Path) -> SimResult<()> {
        self.require_unconfigured("load_geometry")?;
        let detector = loader.load(path)?;
        self.set_detector(detector)
    }

    pub fn detector(&self) -> Option<&Arc<DetectorDescription>> {
        self.detector.as_ref()
    }

    fn require_unstarted(&self, operation: &'static str) -> SimResult<()> {
        self.require(
            operation,
            &[
                KernelState::Unconfigured,
                KernelState::Configured,
                KernelState::Initialized,
            ],
        )
    }

    pub fn seed(&mut self, seed: u64) -> SimResult<()> {
        self.require_unstarted("seed")?;
        self.random.set_seed(seed);
        log::info!("random engine seeded with {seed}");
        Ok(())
    }

    /// Seed from wall-clock time; returns the seed used.
    pub fn seed_from_time(&mut self) -> SimResult<u64> {
        self.require_unstarted("seed_from_time")?;
        let seed = self.random.seed_from_time();
        log::info!("random engine seeded from time: {seed}");
        Ok(seed)
    }

    pub fn random_status(&self) -> RandomStatus {
        self.random.status()
    }

    /// Adopt a factory-built action into its phase sequence.
    pub fn adopt(&mut self, action: AnyAction) -> SimResult<()> {
        match action {
            AnyAction::Run(a) => self.adopt_run_action(a),
            AnyAction::Event(a) => self.adopt_event_action(a),
            AnyAction::Generator(a) => self.adopt_generator(a),
            AnyAction::Filter(f) => Err(SimError::Configuration(format!(
                "filter {} must be attached to a sensitive detector",
                f.info().qualified_name()
            ))),
            AnyAction::ParticleUser(u) => Err(SimError::Configuration(format!(
                "{} must be adopted by a particle handler",
                u.info().qualified_name()
            ))),
        }
    }

    pub fn adopt_run_action(&mut self, action: Box<dyn RunAction>) -> SimResult<()> {
        self.require_unconfigured("adopt")?;
        self.run_actions.adopt(action)
    }

    pub fn adopt_event_action(&mut self, action: Box<dyn EventAction>) -> SimResult<()> {
        self.require_unconfigured("adopt")?;
        self.event_actions.adopt(action)
    }

    pub fn adopt_generator(&mut self, action: Box<dyn GeneratorAction>) -> SimResult<()> {
        self.require_unconfigured("adopt")?;
        self.generator.adopt(action)
    }

    /// Record `info` in the global action directory.
    pub fn register_global_action(&mut self, info: &ActionInfo) -> SimResult<()> {
        self.require_unstarted("register_global_action")?;
        if self.globals.contains_key(info.name()) {
            return Err(SimError::Configuration(format!(
                "global action '{}' is already registered",
                info.name()
            )));
        }
        self.globals.insert(info.name().to_string(), info.clone());
        Ok(())
    }

    pub fn global_action(&self, name: &str) -> Option<&ActionInfo> {
        self.globals.get(name)
    }

    fn setup_sensitive(&mut self, name: &str, kind: SensitiveKind) -> SimResult<()> {
        self.require_unconfigured("setup_sensitive")?;
        if self.sensitive.iter().any(|sd| sd.detector() == name) {
            return Err(SimError::Configuration(format!(
                "sensitive detector '{name}' is already set up"
            )));
        }
        self.sensitive
            .push(SensitiveSequence::new(name, kind, self.registry.clone()));
        log::info!("{name}: {kind} sensitive detector");
        Ok(())
    }

    pub fn setup_calorimeter(&mut self, name: &str) -> SimResult<()> {
        self.setup_sensitive(name, SensitiveKind::Calorimeter)
    }

    pub fn setup_tracker(&mut self, name: &str) -> SimResult<()> {
        self.setup_sensitive(name, SensitiveKind::Tracker)
    }

    /// Append `filter` to the chain of sensitive detector `detector`.
    pub fn attach_filter(&mut self, detector: &str, filter: Box<dyn Filter>) -> SimResult<()> {
        self.require_unconfigured("attach_filter")?;
        let sd = self
            .sensitive
            .iter_mut()
            .find(|sd| sd.detector() == detector)
            .ok_or_else(|| {
                SimError::Configuration(format!("no sensitive detector named '{detector}'"))
            })?;
        sd.adopt_filter(filter)
    }

    pub fn sensitive_detectors(&self) -> &[SensitiveSequence] {
        &self.sensitive
    }

    fn require_physics_mutable(&self, operation: &'static str) -> SimResult<()> {
        self.require(operation, &[KernelState::Unconfigured, KernelState::Configured])
    }

    pub fn setup_physics(&mut self, base_model: &str) -> SimResult<()> {
        self.require_physics_mutable("setup_physics")?;
        self.physics.set_base_model(base_model)
    }

    pub fn add_physics_constructor(&mut self, name: &str) -> SimResult<()> {
        self.require_physics_mutable("add_physics_constructor")?;
        self.physics.append_constructor(name)
    }

    pub fn set_range_cut(&mut self, value: f64) -> SimResult<()> {
        self.require_physics_mutable("set_range_cut")?;
        self.physics.set_global_cut(value)
    }

    pub fn physics_list(&self) -> Option<&PhysicsList> {
        self.physics_list.as_ref()
    }

    pub fn set_transport(&mut self, transport: Box<dyn TrackingEngine>) -> SimResult<()> {
        self.require(
            "set_transport",
            &[KernelState::Unconfigured, KernelState::Configured],
        )?;
        self.transport = transport;
        Ok(())
    }

    pub fn set_ui(&mut self, ui: Box<dyn UiExecutor>) -> SimResult<()> {
        self.require_unstarted("set_ui")?;
        self.ui = Some(ui);
        Ok(())
    }

    /// Handle that stops the event loop after the current event.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    // ── Introspection ───────────────────────────────────────────────

    pub fn sequence(&self, phase: Phase) -> &dyn SequenceInfo {
        match phase {
            Phase::Run => &self.run_actions,
            Phase::Event => &self.event_actions,
            Phase::Generator => self.generator.sequence(),
        }
    }

    pub fn run_sequence(&self) -> &ActionSequence<dyn RunAction> {
        &self.run_actions
    }

    pub fn event_sequence(&self) -> &ActionSequence<dyn EventAction> {
        &self.event_actions
    }

    pub fn generator_chain(&self) -> &GeneratorChain {
        &self.generator
    }

    pub fn runs_completed(&self) -> u32 {
        self.run_number
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Validate the setup. On failure the kernel stays `Unconfigured`.
    pub fn configure(&mut self) -> SimResult<()> {
        self.require_unconfigured("configure")?;
        let detector = self
            .detector
            .as_ref()
            .ok_or_else(|| SimError::Configuration("no detector description loaded".into()))?;
        if !self.random.is_seeded() {
            return Err(SimError::Configuration("random engine is not seeded".into()));
        }
        for sd in &self.sensitive {
            if detector.subdetector(sd.detector()).is_none() {
                return Err(SimError::Configuration(format!(
                    "sensitive detector '{}' does not exist in {}",
                    sd.detector(),
                    detector.name
                )));
            }
        }
        self.generator.validate_layout()?;
        self.state = KernelState::Configured;
        log::info!(
            "kernel configured: {} run, {} event, {} generator action(s), {} sensitive detector(s)",
            self.run_actions.len(),
            self.event_actions.len(),
            self.generator.sequence().len(),
            self.sensitive.len()
        );
        Ok(())
    }

    /// Freeze physics and make the detector read-only.
    pub fn initialize(&mut self) -> SimResult<()> {
        self.require("initialize", &[KernelState::Configured])?;
        let list = self.physics.freeze()?;
        list.dump();
        if let Some(detector) = &self.detector {
            detector.print_detectors();
        }
        log::info!("{}", self.random.status());
        self.physics_list = Some(list);
        self.state = KernelState::Initialized;
        log::info!("kernel initialized (transport: {})", self.transport.name());
        Ok(())
    }

    /// Execute events. Returns totals over every run started by this call.
    pub fn run(&mut self, mode: RunMode) -> SimResult<RunSummary> {
        self.require("run", &[KernelState::Initialized, KernelState::Running])?;
        self.state = KernelState::Running;
        self.stop.reset();
        match mode {
            RunMode::Batch(events) => self.beam_on(events),
            RunMode::Commands(commands) => {
                let mut queue = CommandQueue::new(commands);
                let mut ui = self.ui.take();
                let result = self.session(&mut queue, ui.as_mut().map(|u| u.as_mut() as &mut dyn UiExecutor));
                self.ui = ui;
                result
            }
            RunMode::Session => {
                let mut ui = self
                    .ui
                    .take()
                    .ok_or_else(|| SimError::Configuration("no UI executor installed".into()))?;
                let result = self.session(ui.as_mut(), None);
                self.ui = Some(ui);
                result
            }
        }
    }

    fn session(
        &mut self,
        source: &mut dyn UiExecutor,
        mut forward: Option<&mut dyn UiExecutor>,
    ) -> SimResult<RunSummary> {
        let mut total = RunSummary::new(self.run_number);
        while let Some(line) = source.next_command() {
            if self.stop.is_stop_requested() {
                total.stopped_early = true;
                break;
            }
            let command = match UiCommand::parse(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    log::warn!("ignoring command: {e}");
                    continue;
                }
            };
            match command {
                UiCommand::BeamOn(events) => {
                    let summary = self.beam_on(events)?;
                    total.absorb(&summary);
                }
                UiCommand::Initialize => log::debug!("kernel already initialized"),
                UiCommand::Terminate => {
                    log::info!("session terminated by command");
                    break;
                }
                UiCommand::Forward(text) => match forward.as_deref_mut() {
                    Some(ui) => ui.execute(&text)?,
                    None => source.execute(&text)?,
                },
            }
        }
        Ok(total)
    }

    /// One run of `events` events.
    fn beam_on(&mut self, events: u64) -> SimResult<RunSummary> {
        let run = self.run_number;
        self.run_number += 1;
        let detector = Arc::clone(
            self.detector
                .as_ref()
                .ok_or_else(|| SimError::Configuration("no detector description".into()))?,
        );
        let mut summary = RunSummary::new(run);
        log::info!("run {run}: {events} event(s)");

        {
            let physics = self
                .physics_list
                .as_ref()
                .ok_or_else(|| SimError::Configuration("physics list not built".into()))?;
            let mut ctx = context(run, None, &mut self.random, &detector, physics);
            if let Err(e) = self.run_actions.invoke_all(&mut ctx, |a, ctx| a.begin_run(ctx)) {
                log::error!("run {run}: begin-of-run failed: {e}");
            }
        }

        for _ in 0..events {
            if self.stop.is_stop_requested() {
                summary.stopped_early = true;
                log::info!("run {run}: stop requested after {} event(s)", summary.events_processed);
                break;
            }
            let event = self.process_event(run, &detector)?;
            summary.record(&event);
        }

        let physics = self
            .physics_list
            .as_ref()
            .ok_or_else(|| SimError::Configuration("physics list not built".into()))?;
        let mut ctx = context(run, None, &mut self.random, &detector, physics);
        if let Err(e) = self.event_actions.invoke_all(&mut ctx, |a, ctx| a.end_run(ctx)) {
            log::error!("run {run}: event-phase end of run failed: {e}");
        }
        if let Err(e) = self
            .run_actions
            .invoke_all(&mut ctx, |a, ctx| a.end_run(ctx, &summary))
        {
            log::error!("run {run}: end-of-run failed: {e}");
        }
        log::info!(
            "run {run} done: {} processed, {} failed, {} empty",
            summary.events_processed,
            summary.failed_events,
            summary.empty_primary_events
        );
        Ok(summary)
    }

    fn process_event(&mut self, run: u32, detector: &DetectorDescription) -> SimResult<SimEvent> {
        let id = self.next_event;
        self.next_event += 1;
        let mut event = SimEvent::new(run, id);
        let physics = self
            .physics_list
            .as_ref()
            .ok_or_else(|| SimError::Configuration("physics list not built".into()))?;
        let mut ctx = context(run, Some(id), &mut self.random, detector, physics);

        // Primaries exist before any event-phase action sees the event.
        let generated = self.generator.generate(&mut ctx, &mut event);
        if let Err(e) = self
            .event_actions
            .invoke_all(&mut ctx, |a, ctx| a.begin_event(ctx))
        {
            event.diagnostics.push(failure(self.event_actions.label(), e));
        }

        match generated {
            Ok(()) => match self.transport.track(&event.primaries, &mut ctx) {
                Ok(output) => {
                    event.tracked = output.particles;
                    collect_hits(&self.sensitive, &mut event, output.deposits);
                    if let Err(e) = self.generator.post_track(&mut ctx, &mut event) {
                        event.diagnostics.push(failure("post-processing", e));
                    }
                }
                Err(e) => event.diagnostics.push(failure(self.transport.name(), e)),
            },
            Err(e) => {
                log::error!("event {id}: generator phase failed, skipping transport");
                event.diagnostics.push(failure("generator sequence", e));
            }
        }

        if let Err(e) = self
            .event_actions
            .invoke_all(&mut ctx, |a, ctx| a.end_event(ctx, &event))
        {
            event.diagnostics.push(failure(self.event_actions.label(), e));
        }
        Ok(event)
    }

    /// Release everything the kernel owns, in reverse acquisition order.
    pub fn terminate(&mut self) -> SimResult<()> {
        self.require("terminate", &[KernelState::Initialized, KernelState::Running])?;
        self.physics_list = None;
        for sd in self.sensitive.iter_mut().rev() {
            sd.clear();
        }
        self.sensitive.clear();
        self.event_actions.clear();
        self.generator.clear();
        self.run_actions.clear();
        self.globals.clear();
        self.ui = None;
        if let Some(detector) = self.detector.take() {
            log::info!("releasing detector description {}", detector.name);
        }
        self.state = KernelState::Terminated;
        log::info!("kernel terminated after {} run(s)", self.run_number);
        Ok(())
    }
}

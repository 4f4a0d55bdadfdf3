// ─────────────────────────────────────────────────────────────────────
// Megat Simulation — Command-Line Driver
// ─────────────────────────────────────────────────────────────────────
//! Megat simulation driver.
//!
//! Builds the standard Megat setup (a 1 GeV mu+ gun, particle printout,
//! event output, a tracking-volume particle handler, and the calorimeter)
//! and runs it in batch or interactive mode.
//!
//! # Example
//!
//! ```bash
//! # 100 events, fixed seed
//! megat-sim -batch -events 100
//!
//! # Interactive session with a start-up macro and visualization
//! megat-sim -macro run.mac -vis
//! ```

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use megat_core::event_actions::{OutputConfig, ParticlePrintConfig};
use megat_core::generators::{DirectionSpec, EnergySpec, GeneratorConfig};
use megat_core::particle_handler::{
    ParticleHandler, ParticleHandlerConfig, TCUserParticleHandler, TrackingVolumeConfig,
};
use megat_core::run_actions::TestRunConfig;
use megat_core::ui::TERMINATE_COMMAND;
use megat_core::{
    ActionConfig, ActionType, CommandQueue, CompactFileLoader, Kernel, OutputLevel, RunMode,
    RunSummary, UiExecutor,
};
use megat_types::units::{KEV, MEV, MM};
use megat_types::{Mask, SimConfig, SimError, SimResult, Vec3};

/// Megat detector simulation
#[derive(Parser, Debug)]
#[command(name = "megat-sim")]
#[command(version, about, long_about = None)]
struct Args {
    /// Enable visualization, optionally running a visualization macro
    #[arg(long, value_name = "FILE", num_args = 0..=1)]
    vis: Option<Option<PathBuf>>,

    /// Start-up macro executed before the interactive session
    #[arg(long = "macro", value_name = "FILE")]
    macro_file: Option<PathBuf>,

    /// Batch execution
    #[arg(long)]
    batch: bool,

    /// If batch: number of events to be executed
    #[arg(long)]
    events: Option<u64>,

    /// Seed the random engine from the current time
    #[arg(long = "seed_time", alias = "seed-time")]
    seed_time: bool,

    /// JSON run configuration
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Compact geometry file; overrides the installation lookup
    #[arg(long, value_name = "FILE")]
    geometry: Option<PathBuf>,
}

const LONG_OPTIONS: &[&str] = &[
    "vis", "macro", "batch", "events", "seed_time", "config", "geometry",
];

/// Accept the single-dash spelling (`-batch`) of every long option.
fn normalize_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    args.into_iter()
        .map(|arg| match arg.strip_prefix('-') {
            Some(rest) if !rest.starts_with('-') && LONG_OPTIONS.contains(&rest) => {
                format!("--{rest}")
            }
            _ => arg,
        })
        .collect()
}

/// Commands that drive a batch job.
fn batch_commands(events: u64) -> Vec<String> {
    vec![format!("/run/beamOn {events}"), TERMINATE_COMMAND.to_string()]
}

fn default_vis_commands() -> Vec<&'static str> {
    vec![
        "/control/verbose 2",
        "/run/initialize",
        "/vis/open OGL",
        "/vis/verbose errors",
        "/vis/drawVolume",
        "/vis/viewer/set/viewpointThetaPhi 55. 45.",
        "/vis/scene/add/axes 0 0 0 10 m",
    ]
}

/// Visualization start-up commands: the vis macro if one was given.
fn vis_commands(config: &SimConfig) -> SimResult<Vec<String>> {
    match &config.vis_macro {
        Some(path) => {
            let mut queue = CommandQueue::from_macro(path)?;
            Ok(std::iter::from_fn(|| queue.next_command()).collect())
        }
        None => Ok(default_vis_commands().into_iter().map(str::to_string).collect()),
    }
}

/// Command list of a batch job. Visualization replaces the batch commands.
fn batch_job(config: &SimConfig) -> SimResult<Vec<String>> {
    if config.vis {
        warn!("visualization requested in batch mode; running the vis commands only");
        return vis_commands(config);
    }
    Ok(batch_commands(config.events))
}

/// Merge the command line over the (optional) JSON configuration.
fn resolve_config(args: &Args) -> SimResult<SimConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| {
                SimError::Configuration(format!("cannot read {}: {e}", path.display()))
            })?;
            SimConfig::from_json(&text)?
        }
        None => SimConfig::default(),
    };
    config.batch |= args.batch;
    config.seed_from_time |= args.seed_time;
    if let Some(events) = args.events {
        config.events = events;
    }
    if args.macro_file.is_some() {
        config.macro_file = args.macro_file.clone();
    }
    if let Some(vis) = &args.vis {
        config.vis = true;
        if vis.is_some() {
            config.vis_macro = vis.clone();
        }
    }
    config.validate()?;
    Ok(config)
}

fn prompt<W: Write>(out: &mut W) -> io::Result<()> {
    out.write_all(b"megat> ")?;
    out.flush()
}

/// Queued start-up commands, then standard input.
struct TerminalUi {
    queued: CommandQueue,
    stdin: io::Lines<io::StdinLock<'static>>,
}

impl TerminalUi {
    fn new(config: &SimConfig) -> SimResult<Self> {
        let mut queued = match &config.macro_file {
            Some(path) => CommandQueue::from_macro(path)?,
            None => CommandQueue::default(),
        };
        if config.vis {
            queued.extend(vis_commands(config)?);
        }
        Ok(Self {
            queued,
            stdin: io::stdin().lock().lines(),
        })
    }
}

impl UiExecutor for TerminalUi {
    fn next_command(&mut self) -> Option<String> {
        if let Some(command) = self.queued.next_command() {
            return Some(command);
        }
        if let Err(e) = prompt(&mut io::stderr()) {
            warn!(error = %e, "cannot write prompt");
        }
        self.stdin.next()?.ok()
    }

    fn execute(&mut self, command: &str) -> SimResult<()> {
        info!(command, "UI");
        Ok(())
    }
}

/// Assemble the standard Megat setup on a fresh kernel.
fn build_kernel(config: &SimConfig, geometry: PathBuf) -> SimResult<Kernel> {
    let mut kernel = Kernel::new();
    kernel.load_geometry(&CompactFileLoader, &geometry)?;

    if config.seed_from_time {
        kernel.seed_from_time()?;
    } else {
        kernel.seed(config.seed)?;
    }
    info!(status = %kernel.random_status(), "random engine ready");

    // ── Run actions ─────────────────────────────────────────────────
    let run_config = TestRunConfig {
        property_int: 12345,
        property_double: -5e15 * KEV,
        property_string: "Startrun: Hello_2".to_string(),
    };
    let mut run_init = kernel
        .factory()
        .build("RunInit", ActionConfig::TestRunAction(run_config))?;
    run_init.info_mut().enable_ui();
    let run_info = run_init.info().clone();
    kernel.adopt(run_init)?;
    kernel.register_global_action(&run_info)?;

    // ── Event actions ───────────────────────────────────────────────
    let mut print = kernel.factory().build(
        "ParticlePrint",
        ActionConfig::ParticlePrint(ParticlePrintConfig { output_type: 3 }),
    )?;
    print.info_mut().output_level = OutputLevel::Info;
    kernel.adopt(print)?;

    let output = kernel.factory().build(
        "Output",
        ActionConfig::OutputAction(OutputConfig {
            prefix: config.output_prefix.clone(),
            directory: config.output_dir.display().to_string(),
        }),
    )?;
    kernel.adopt(output)?;

    // ── Generation ──────────────────────────────────────────────────
    let init = kernel
        .factory()
        .build("GenerationInit", ActionConfig::GeneratorActionInit)?;
    kernel.adopt(init)?;

    let gun = GeneratorConfig {
        mask: Mask::new(2),
        particle: "mu+".to_string(),
        energy: EnergySpec::Fixed(1000.0 * MEV),
        multiplicity: 3,
        position: Vec3::new(10.0 * MM, 10.0 * MM, 0.0),
        direction: DirectionSpec::Fixed(Vec3::new(0.0, 0.0, -1.0)),
    };
    let gun = kernel
        .factory()
        .build("Mu+", ActionConfig::ParticleGenerator(gun))?;
    kernel.adopt(gun)?;

    let mut primaries = kernel
        .factory()
        .build("PrimaryHandler", ActionConfig::PrimaryHandler)?;
    primaries.info_mut().output_level = OutputLevel::Warning;
    primaries.info_mut().enable_ui();
    kernel.adopt(primaries)?;

    let mut info = kernel
        .factory()
        .info(ActionType::ParticleHandler, "ParticleHandler");
    info.output_level = OutputLevel::Error;
    info.enable_ui();
    let mut handler = ParticleHandler::new(
        info,
        ParticleHandlerConfig {
            save_processes: vec!["conv".to_string(), "Decay".to_string()],
            minimal_kinetic_energy: 10.0 * MEV,
            keep_all_particles: false,
        },
    )?;
    let mut user_info = kernel
        .factory()
        .info(ActionType::TCUserParticleHandler, "UserParticleHandler");
    user_info.enable_ui();
    handler.adopt_user(Box::new(TCUserParticleHandler::new(
        user_info,
        TrackingVolumeConfig::default(),
    )))?;
    kernel.adopt_generator(Box::new(handler))?;

    // ── Detectors and physics ───────────────────────────────────────
    kernel.setup_calorimeter("Calorimeter")?;
    kernel.setup_physics("QGSP_BERT")?;
    kernel.add_physics_constructor("G4StepLimiterPhysics")?;
    Ok(kernel)
}

fn simulate(args: &Args) -> SimResult<RunSummary> {
    let config = resolve_config(args)?;
    let geometry = match &args.geometry {
        Some(path) => path.clone(),
        None => config.geometry_path()?,
    };
    info!(
        detector = %config.detector,
        geometry = %geometry.display(),
        batch = config.batch,
        events = config.events,
        "Starting simulation"
    );

    let mut kernel = build_kernel(&config, geometry)?;
    let mode = if config.batch {
        RunMode::Commands(batch_job(&config)?)
    } else {
        kernel.set_ui(Box::new(TerminalUi::new(&config)?))?;
        RunMode::Session
    };
    kernel.configure()?;
    kernel.initialize()?;
    let summary = kernel.run(mode)?;
    kernel.terminate()?;
    Ok(summary)
}

/// Process status for a failed simulation. Setup errors abort before
/// any event runs and get their own status.
fn exit_status(error: &SimError) -> u8 {
    if error.is_fatal_setup() {
        2
    } else {
        1
    }
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse_from(normalize_args(std::env::args()));
    match simulate(&args) {
        Ok(summary) => {
            info!(
                events = summary.events_processed,
                failed = summary.failed_events,
                empty = summary.empty_primary_events,
                stopped_early = summary.stopped_early,
                "Simulation finished"
            );
            if summary.failed_events > 0 {
                warn!(failed = summary.failed_events, "some events failed; see diagnostics");
            }
            ExitCode::SUCCESS
        }
        Err(e) if e.is_fatal_setup() => {
            error!(error = %e, "Setup failed; no events were run");
            ExitCode::from(exit_status(&e))
        }
        Err(e) => {
            error!(error = %e, "Simulation aborted");
            ExitCode::from(exit_status(&e))
        }
    }
}

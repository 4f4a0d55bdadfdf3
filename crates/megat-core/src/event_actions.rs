// ─────────────────────────────────────────────────────────────────────
// Megat Simulation — Event Actions
// Mirrors: DDG4 Geant4ParticlePrint + Geant4OutputAction
// ─────────────────────────────────────────────────────────────────────
//! Event-phase actions: particle printout and event output.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use megat_types::{Particle, SimError, SimResult};

use crate::action::{Action, ActionContext, ActionInfo, EventAction, OutputLevel};
use crate::event::SimEvent;
use crate::output::OutputSink;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParticlePrintConfig {
    /// 1 = table, 2 = tree, 3 = both.
    #[serde(alias = "OutputType")]
    pub output_type: u8,
}

impl Default for ParticlePrintConfig {
    fn default() -> Self {
        Self { output_type: 3 }
    }
}

/// Prints the kept particles of every event.
#[derive(Debug, Clone)]
pub struct ParticlePrint {
    info: ActionInfo,
    output_type: u8,
}

impl ParticlePrint {
    pub fn new(info: ActionInfo, config: ParticlePrintConfig) -> SimResult<Self> {
        if !(1..=3).contains(&config.output_type) {
            return Err(SimError::Configuration(format!(
                "OutputType must be 1, 2 or 3, got {}",
                config.output_type
            )));
        }
        Ok(Self {
            info,
            output_type: config.output_type,
        })
    }

    /// Printout of `event` in the configured layout.
    pub fn render(&self, event: &SimEvent) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "event {} (run {}): {} primaries, {} particles, {} hits",
            event.id,
            event.run,
            event.primary_count(),
            event.particles.len(),
            event.hit_count()
        );
        if self.output_type & 1 != 0 {
            render_table(&mut out, &event.particles);
        }
        if self.output_type & 2 != 0 {
            render_tree(&mut out, &event.particles);
        }
        out
    }
}

fn render_table(out: &mut String, particles: &[Particle]) {
    let _ = writeln!(
        out,
        "{:>5} {:>6} {:<16} {:>11} {:>5} {:>12} {:<28} {}",
        "id", "parent", "species", "pdg", "mask", "Ekin[MeV]", "vertex[mm]", "process"
    );
    for p in particles {
        let parent = p.parent.map_or_else(|| "-".to_string(), |id| id.to_string());
        let _ = writeln!(
            out,
            "{:>5} {:>6} {:<16} {:>11} {:>5} {:>12.4} ({:>7.2},{:>7.2},{:>8.2}) {}",
            p.id,
            parent,
            p.species,
            p.pdg,
            p.mask.id(),
            p.kinetic_energy,
            p.vertex.x,
            p.vertex.y,
            p.vertex.z,
            p.process
        );
    }
}

fn render_tree(out: &mut String, particles: &[Particle]) {
    let mut children: BTreeMap<Option<u32>, Vec<&Particle>> = BTreeMap::new();
    for p in particles {
        children.entry(p.parent).or_default().push(p);
    }
    let mut stack: Vec<(&Particle, usize)> = children
        .get(&None)
        .map(|roots| roots.iter().rev().map(|p| (*p, 0)).collect())
        .unwrap_or_default();
    while let Some((p, depth)) = stack.pop() {
        let _ = writeln!(
            out,
            "{}+-> {} #{} {:.4} MeV [{}]",
            "|  ".repeat(depth),
            p.species,
            p.id,
            p.kinetic_energy,
            p.process
        );
        if let Some(kids) = children.get(&Some(p.id)) {
            stack.extend(kids.iter().rev().map(|k| (*k, depth + 1)));
        }
    }
}

impl Action for ParticlePrint {
    fn info(&self) -> &ActionInfo {
        &self.info
    }
    fn info_mut(&mut self) -> &mut ActionInfo {
        &mut self.info
    }
}

impl EventAction for ParticlePrint {
    fn end_event(&mut self, _ctx: &mut ActionContext<'_>, event: &SimEvent) -> SimResult<()> {
        if self.info.is_enabled(OutputLevel::Info) {
            self.info.log(OutputLevel::Info, format_args!("\n{}", self.render(event)));
        }
        Ok(())
    }
}

/// Properties of `OutputAction`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub prefix: String,
    pub directory: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            prefix: "megat".to_string(),
            directory: ".".to_string(),
        }
    }
}

/// Hands every finished event to an `OutputSink`.
pub struct OutputAction {
    info: ActionInfo,
    sink: Box<dyn OutputSink>,
}

impl OutputAction {
    pub fn new(info: ActionInfo, sink: Box<dyn OutputSink>) -> Self {
        Self { info, sink }
    }
}

impl Action for OutputAction {
    fn info(&self) -> &ActionInfo {
        &self.info
    }
    fn info_mut(&mut self) -> &mut ActionInfo {
        &mut self.info
    }
}

impl EventAction for OutputAction {
    fn end_event(&mut self, _ctx: &mut ActionContext<'_>, event: &SimEvent) -> SimResult<()> {
        self.sink.write_event(event)
    }

    fn end_run(&mut self, _ctx: &mut ActionContext<'_>) -> SimResult<()> {
        self.sink.flush()?;
        self.info.log(
            OutputLevel::Debug,
            format_args!("flushed {}", self.sink.name()),
        );
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Megat Simulation — Generator Stages
// Mirrors: DDG4 Geant4ParticleGenerator + Geant4InteractionMerger
// ─────────────────────────────────────────────────────────────────────
//! Stages of the generator chain.
//!
//! | Stage            | Type                  | Effect                                 |
//! |------------------|-----------------------|----------------------------------------|
//! | Init             | `GeneratorActionInit` | per-run event bookkeeping              |
//! | Emit             | `ParticleGenerator`   | appends particles to its mask's record |
//! | Smear            | `VertexSmear`         | shifts vertices of matching records    |
//! | Merge            | `InteractionMerger`   | folds all records into one             |
//! | PrimaryConvert   | `PrimaryHandler`      | consumes records into primary sets     |

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use megat_types::units::GEV;
use megat_types::{
    species_info, InteractionRecord, Mask, Particle, PrimaryParticle, PrimarySet, RecordKey,
    SimError, SimResult, Vec3,
};

use crate::action::{Action, ActionContext, ActionInfo, GeneratorAction, OutputLevel, Stage};
use crate::event::{Diagnostic, SimEvent};

// ── Init ────────────────────────────────────────────────────────────

/// Counts generated events per run.
#[derive(Debug, Clone)]
pub struct GeneratorActionInit {
    info: ActionInfo,
    run: Option<u32>,
    events_in_run: u64,
    total_events: u64,
}

impl GeneratorActionInit {
    pub fn new(info: ActionInfo) -> Self {
        Self {
            info,
            run: None,
            events_in_run: 0,
            total_events: 0,
        }
    }

    pub fn events_in_run(&self) -> u64 {
        self.events_in_run
    }

    pub fn total_events(&self) -> u64 {
        self.total_events
    }
}

impl Action for GeneratorActionInit {
    fn info(&self) -> &ActionInfo {
        &self.info
    }
    fn info_mut(&mut self) -> &mut ActionInfo {
        &mut self.info
    }
}

impl GeneratorAction for GeneratorActionInit {
    fn stage(&self) -> Stage {
        Stage::Init
    }

    fn generate(&mut self, ctx: &mut ActionContext<'_>, _event: &mut SimEvent) -> SimResult<()> {
        if self.run != Some(ctx.run) {
            self.run = Some(ctx.run);
            self.events_in_run = 0;
        }
        self.events_in_run += 1;
        self.total_events += 1;
        self.info.log(
            OutputLevel::Debug,
            format_args!(
                "initializing event {} ({} of run {}, {} total)",
                ctx.event.unwrap_or_default(),
                self.events_in_run,
                ctx.run,
                self.total_events
            ),
        );
        Ok(())
    }
}

// ── Emit ────────────────────────────────────────────────────────────

/// Kinetic energy: fixed, or uniform in `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnergySpec {
    Fixed(f64),
    Range { min: f64, max: f64 },
}

/// Polar-angle distribution for isotropic emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distribution {
    /// Uniform in theta.
    #[serde(rename = "uniform")]
    Uniform,
    /// Uniform in cos(theta), i.e. uniform in solid angle.
    #[serde(rename = "cos(theta)")]
    CosTheta,
    /// 1 + cos²(theta), as in f f̄ annihilation.
    #[serde(rename = "ffbar")]
    Ffbar,
}

fn default_theta_max() -> f64 {
    PI
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DirectionSpec {
    Fixed(Vec3),
    Isotropic {
        distribution: Distribution,
        #[serde(default)]
        theta_min: f64,
        #[serde(default = "default_theta_max")]
        theta_max: f64,
    },
}

/// Properties of `ParticleGenerator` and `IsotropeGenerator`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    #[serde(alias = "Mask")]
    pub mask: Mask,
    #[serde(alias = "Particle")]
    pub particle: String,
    #[serde(alias = "Energy")]
    pub energy: EnergySpec,
    #[serde(alias = "Multiplicity")]
    pub multiplicity: u32,
    #[serde(alias = "Position")]
    pub position: Vec3,
    #[serde(alias = "Direction")]
    pub direction: DirectionSpec,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            mask: Mask::default(),
            particle: "geantino".to_string(),
            energy: EnergySpec::Fixed(1.0 * GEV),
            multiplicity: 1,
            position: Vec3::ZERO,
            direction: DirectionSpec::Fixed(Vec3::new(1.0, 0.0, 0.0)),
        }
    }
}

impl GeneratorConfig {
    /// Defaults of the isotropic generator.
    pub fn isotropic() -> Self {
        Self {
            direction: DirectionSpec::Isotropic {
                distribution: Distribution::Uniform,
                theta_min: 0.0,
                theta_max: PI,
            },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> SimResult<()> {
        if species_info(&self.particle).is_none() {
            return Err(SimError::Configuration(format!(
                "unknown particle species '{}'",
                self.particle
            )));
        }
        if self.multiplicity == 0 {
            return Err(SimError::Configuration("multiplicity must be >= 1".into()));
        }
        let energy_ok = match self.energy {
            EnergySpec::Fixed(e) => e.is_finite() && e >= 0.0,
            EnergySpec::Range { min, max } => {
                min.is_finite() && max.is_finite() && min >= 0.0 && min <= max
            }
        };
        if !energy_ok {
            return Err(SimError::Configuration(format!(
                "invalid energy {:?}",
                self.energy
            )));
        }
        match self.direction {
            DirectionSpec::Fixed(d) if d.unit().is_none() => Err(SimError::Configuration(
                format!("degenerate direction {d:?}"),
            )),
            DirectionSpec::Isotropic {
                theta_min,
                theta_max,
                ..
            } if !(0.0 <= theta_min && theta_min < theta_max && theta_max <= PI) => {
                Err(SimError::Configuration(format!(
                    "theta range [{theta_min}, {theta_max}] must lie within [0, pi]"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Particle gun: emits `multiplicity` particles into its mask's record.
#[derive(Debug, Clone)]
pub struct ParticleGenerator {
    info: ActionInfo,
    config: GeneratorConfig,
}

impl ParticleGenerator {
    pub fn new(info: ActionInfo, config: GeneratorConfig) -> SimResult<Self> {
        config.validate()?;
        Ok(Self { info, config })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    fn sample_energy(&self, ctx: &mut ActionContext<'_>) -> f64 {
        match self.config.energy {
            EnergySpec::Fixed(e) => e,
            EnergySpec::Range { min, max } => ctx.rng.uniform_range(min, max),
        }
    }

    fn sample_direction(&self, ctx: &mut ActionContext<'_>) -> Vec3 {
        match self.config.direction {
            DirectionSpec::Fixed(d) => d,
            DirectionSpec::Isotropic {
                distribution,
                theta_min,
                theta_max,
            } => match distribution {
                Distribution::Uniform => {
                    let theta = ctx.rng.uniform_range(theta_min, theta_max);
                    let phi = ctx.rng.uniform_range(0.0, 2.0 * PI);
                    Vec3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos())
                }
                Distribution::CosTheta => ctx.rng.direction(theta_max.cos(), theta_min.cos()),
                Distribution::Ffbar => loop {
                    let d = ctx.rng.direction(theta_max.cos(), theta_min.cos());
                    // Accept with weight (1 + cos²θ) / 2.
                    if 2.0 * ctx.rng.uniform() <= 1.0 + d.z * d.z {
                        break d;
                    }
                },
            },
        }
    }
}

impl Action for ParticleGenerator {
    fn info(&self) -> &ActionInfo {
        &self.info
    }
    fn info_mut(&mut self) -> &mut ActionInfo {
        &mut self.info
    }
}

impl GeneratorAction for ParticleGenerator {
    fn stage(&self) -> Stage {
        Stage::Emit
    }

    fn mask(&self) -> Mask {
        self.config.mask
    }

    fn validate(&self) -> SimResult<()> {
        self.config.validate()
    }

    fn generate(&mut self, ctx: &mut ActionContext<'_>, event: &mut SimEvent) -> SimResult<()> {
        let mut batch = Vec::with_capacity(self.config.multiplicity as usize);
        for _ in 0..self.config.multiplicity {
            let energy = self.sample_energy(ctx);
            let direction = self.sample_direction(ctx);
            batch.push(Particle::primary(
                &self.config.particle,
                energy,
                direction,
                self.config.position,
                self.config.mask,
            )?);
        }
        let record = event.record_mut(self.config.mask);
        for p in batch {
            record.push(p);
        }
        self.info.log(
            OutputLevel::Debug,
            format_args!(
                "emitted {} x {} into {} ({} particles in record)",
                self.config.multiplicity,
                self.config.particle,
                self.config.mask,
                record.len()
            ),
        );
        Ok(())
    }
}

// ── Smear ───────────────────────────────────────────────────────────

/// Properties of `InteractionVertexSmear`: (x, y, z, t) offset and sigma.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SmearConfig {
    #[serde(alias = "Mask")]
    pub mask: Mask,
    #[serde(alias = "Offset")]
    pub offset: [f64; 4],
    #[serde(alias = "Sigma")]
    pub sigma: [f64; 4],
}

/// Gaussian vertex smear applied to every record carrying its mask.
///
/// One displacement is drawn per record, so particles of the same
/// interaction stay at a common vertex.
#[derive(Debug, Clone)]
pub struct VertexSmear {
    info: ActionInfo,
    config: SmearConfig,
}

impl VertexSmear {
    pub fn new(info: ActionInfo, config: SmearConfig) -> SimResult<Self> {
        let smear = Self { info, config };
        smear.validate()?;
        Ok(smear)
    }
}

impl Action for VertexSmear {
    fn info(&self) -> &ActionInfo {
        &self.info
    }
    fn info_mut(&mut self) -> &mut ActionInfo {
        &mut self.info
    }
}

impl GeneratorAction for VertexSmear {
    fn stage(&self) -> Stage {
        Stage::Smear
    }

    fn mask(&self) -> Mask {
        self.config.mask
    }

    fn validate(&self) -> SimResult<()> {
        let c = &self.config;
        if c.offset.iter().chain(c.sigma.iter()).any(|v| !v.is_finite()) {
            return Err(SimError::Configuration("smear offset/sigma must be finite".into()));
        }
        if c.sigma.iter().any(|s| *s < 0.0) {
            return Err(SimError::Configuration("smear sigma must be >= 0".into()));
        }
        Ok(())
    }

    fn generate(&mut self, ctx: &mut ActionContext<'_>, event: &mut SimEvent) -> SimResult<()> {
        let mask = self.config.mask;
        if !event.has_mask(mask) {
            return Err(SimError::Validation(format!(
                "no interaction record carries {mask}"
            )));
        }
        let [ox, oy, oz, ot] = self.config.offset;
        let [sx, sy, sz, st] = self.config.sigma;
        for record in event.records.values_mut().filter(|r| r.contains_mask(mask)) {
            let shift = Vec3::new(
                ctx.rng.gauss(ox, sx),
                ctx.rng.gauss(oy, sy),
                ctx.rng.gauss(oz, sz),
            );
            let dt = ctx.rng.gauss(ot, st);
            for p in record.particles.iter_mut() {
                p.vertex = p.vertex.add(&shift);
                p.time += dt;
            }
            self.info.log(
                OutputLevel::Debug,
                format_args!("smeared {:?} by {shift:?}, dt={dt}", record.key),
            );
        }
        Ok(())
    }
}

// ── Merge ───────────────────────────────────────────────────────────

/// Folds every record into one, in ascending mask order.
#[derive(Debug, Clone)]
pub struct InteractionMerger {
    info: ActionInfo,
}

impl InteractionMerger {
    pub fn new(info: ActionInfo) -> Self {
        Self { info }
    }
}

impl Action for InteractionMerger {
    fn info(&self) -> &ActionInfo {
        &self.info
    }
    fn info_mut(&mut self) -> &mut ActionInfo {
        &mut self.info
    }
}

impl GeneratorAction for InteractionMerger {
    fn stage(&self) -> Stage {
        Stage::Merge
    }

    fn generate(&mut self, _ctx: &mut ActionContext<'_>, event: &mut SimEvent) -> SimResult<()> {
        if event.records.is_empty() {
            self.info.log(OutputLevel::Debug, format_args!("nothing to merge"));
            return Ok(());
        }
        let mut merged = InteractionRecord::merged();
        let mut particles = Vec::new();
        for record in event.take_records() {
            merged.masks.extend(record.masks);
            particles.extend(record.particles);
        }
        // A record emitted after an earlier merge sorts before it by key.
        particles.sort_by_key(|p| p.mask);
        for p in particles {
            merged.push(p);
        }
        self.info.log(
            OutputLevel::Debug,
            format_args!(
                "merged {} particles from masks {:?}",
                merged.len(),
                merged.masks.iter().map(|m| m.id()).collect::<Vec<_>>()
            ),
        );
        event.records.insert(RecordKey::Merged, merged);
        Ok(())
    }
}

// ── PrimaryConvert ──────────────────────────────────────────────────

/// Converts records into primary sets, one per record in key order.
///
/// Track ids are unique within the event and start at 1.
#[derive(Debug, Clone)]
pub struct PrimaryHandler {
    info: ActionInfo,
}

impl PrimaryHandler {
    pub fn new(info: ActionInfo) -> Self {
        Self { info }
    }
}

impl Action for PrimaryHandler {
    fn info(&self) -> &ActionInfo {
        &self.info
    }
    fn info_mut(&mut self) -> &mut ActionInfo {
        &mut self.info
    }
}

impl GeneratorAction for PrimaryHandler {
    fn stage(&self) -> Stage {
        Stage::PrimaryConvert
    }

    fn generate(&mut self, _ctx: &mut ActionContext<'_>, event: &mut SimEvent) -> SimResult<()> {
        let records = event.take_records();
        if records.is_empty() {
            log::warn!("{}: event {} has no interaction records", self.info.name(), event.id);
            event.primaries.clear();
            event.diagnostics.push(Diagnostic::EmptyPrimaries);
            return Ok(());
        }
        let mut next_track = 1u32;
        event.primaries = records
            .into_iter()
            .map(|record| PrimarySet {
                masks: record.masks.into_iter().collect(),
                particles: record
                    .particles
                    .iter()
                    .map(|p| {
                        let mut primary = PrimaryParticle::from(p);
                        primary.track_id = next_track;
                        next_track += 1;
                        primary
                    })
                    .collect(),
            })
            .collect();
        self.info.log(
            OutputLevel::Debug,
            format_args!(
                "{} primary set(s), {} particles",
                event.primaries.len(),
                event.primary_count()
            ),
        );
        Ok(())
    }
}

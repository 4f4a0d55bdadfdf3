// ─────────────────────────────────────────────────────────────────────
// Megat Simulation — Event and Run Records
// ─────────────────────────────────────────────────────────────────────
//! The per-event work unit and the per-run summary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use megat_types::{InteractionRecord, Mask, Particle, PrimarySet, RecordKey, Vec3};

/// Non-fatal observation attached to an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A generator stage was skipped after a validation failure.
    StageSkipped { stage: String, reason: String },
    /// Primary conversion found no interaction records.
    EmptyPrimaries,
    /// An action failed; the event is marked failed.
    ActionFailed { action: String, reason: String },
}

/// Energy deposit accepted by a sensitive detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub detector: String,
    pub track_id: u32,
    pub pdg: i32,
    /// Deposited energy in MeV.
    pub energy_deposit: f64,
    pub position: Vec3,
    pub time: f64,
}

/// One simulated event. Created at the start of the generator phase
/// and dropped after the event phase.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimEvent {
    pub id: u64,
    pub run: u32,
    /// Raw interaction records; consumed by primary conversion.
    #[serde(skip)]
    pub records: BTreeMap<RecordKey, InteractionRecord>,
    pub primaries: Vec<PrimarySet>,
    /// Particles returned by transport, before post-processing.
    #[serde(skip)]
    pub tracked: Vec<Particle>,
    /// Particles kept by post-processing.
    pub particles: Vec<Particle>,
    pub hits: BTreeMap<String, Vec<Hit>>,
    pub diagnostics: Vec<Diagnostic>,
}

impl SimEvent {
    pub fn new(run: u32, id: u64) -> Self {
        Self {
            id,
            run,
            ..Self::default()
        }
    }

    /// Record for `mask`, created empty if absent.
    pub fn record_mut(&mut self, mask: Mask) -> &mut InteractionRecord {
        self.records
            .entry(RecordKey::Stream(mask))
            .or_insert_with(|| InteractionRecord::new(mask))
    }

    /// Whether any live record carries `mask`.
    pub fn has_mask(&self, mask: Mask) -> bool {
        self.records.values().any(|r| r.contains_mask(mask))
    }

    /// Remove every record, in ascending key order.
    pub fn take_records(&mut self) -> Vec<InteractionRecord> {
        std::mem::take(&mut self.records).into_values().collect()
    }

    pub fn primary_count(&self) -> usize {
        self.primaries.iter().map(PrimarySet::len).sum()
    }

    pub fn hit_count(&self) -> usize {
        self.hits.values().map(Vec::len).sum()
    }

    pub fn is_failed(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::ActionFailed { .. }))
    }

    pub fn has_empty_primaries(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::EmptyPrimaries))
    }
}

/// Totals returned by `Kernel::run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run: u32,
    pub events_processed: u64,
    pub failed_events: u64,
    pub empty_primary_events: u64,
    /// The loop ended on a stop request before the requested count.
    pub stopped_early: bool,
}

impl RunSummary {
    pub fn new(run: u32) -> Self {
        Self {
            run,
            ..Self::default()
        }
    }

    pub fn record(&mut self, event: &SimEvent) {
        self.events_processed += 1;
        if event.is_failed() {
            self.failed_events += 1;
        }
        if event.has_empty_primaries() {
            self.empty_primary_events += 1;
        }
    }

    /// Fold another run's totals into this one.
    pub fn absorb(&mut self, other: &RunSummary) {
        self.run = self.run.max(other.run);
        self.events_processed += other.events_processed;
        self.failed_events += other.failed_events;
        self.empty_primary_events += other.empty_primary_events;
        self.stopped_early |= other.stopped_early;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_iterate_in_mask_order() {
        let mut ev = SimEvent::new(0, 0);
        for m in [3, 1, 2] {
            ev.record_mut(Mask::new(m));
        }
        let order: Vec<RecordKey> = ev.take_records().iter().map(|r| r.key).collect();
        assert_eq!(
            order,
            vec![
                RecordKey::Stream(Mask::new(1)),
                RecordKey::Stream(Mask::new(2)),
                RecordKey::Stream(Mask::new(3)),
            ]
        );
        assert!(ev.records.is_empty());
    }

    #[test]
    fn test_summary_counts_flags() {
        let mut summary = RunSummary::new(0);
        let mut ok = SimEvent::new(0, 0);
        summary.record(&ok);
        ok.diagnostics.push(Diagnostic::EmptyPrimaries);
        summary.record(&ok);
        let mut bad = SimEvent::new(0, 2);
        bad.diagnostics.push(Diagnostic::ActionFailed {
            action: "x".into(),
            reason: "y".into(),
        });
        summary.record(&bad);
        assert_eq!(summary.events_processed, 3);
        assert_eq!(summary.empty_primary_events, 1);
        assert_eq!(summary.failed_events, 1);
    }

    #[test]
    fn test_absorb() {
        let mut total = RunSummary::new(0);
        let mut second = RunSummary::new(1);
        second.events_processed = 4;
        second.stopped_early = true;
        total.absorb(&second);
        assert_eq!(total.run, 1);
        assert_eq!(total.events_processed, 4);
        assert!(total.stopped_early);
    }

    #[test]
    fn test_event_json_skips_raw_records() {
        let mut ev = SimEvent::new(2, 7);
        ev.record_mut(Mask::new(1));
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["id"], 7);
        assert!(json.get("records").is_none());
        assert!(json.get("tracked").is_none());
    }
}

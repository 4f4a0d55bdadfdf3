// ─────────────────────────────────────────────────────────────────────
// Megat Simulation — Output Sinks
// ─────────────────────────────────────────────────────────────────────
//! Event persistence boundary.
//!
//! The record format belongs to the sink. `JsonLinesSink` writes one
//! JSON object per event and opens its file on the first write.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

use megat_types::{SimError, SimResult};

use crate::event::SimEvent;

/// Destination of finished events.
pub trait OutputSink {
    fn name(&self) -> &str;

    fn write_event(&mut self, event: &SimEvent) -> SimResult<()>;

    fn flush(&mut self) -> SimResult<()>;
}

/// `<prefix>_<YYYY-MM-DD_HH-MM>`.
pub fn output_name<Tz>(prefix: &str, time: DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    format!("{prefix}_{}", time.format("%Y-%m-%d_%H-%M"))
}

/// Writes one JSON object per event. The file and its parent
/// directories are created on the first write.
pub struct JsonLinesSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    events: u64,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
            events: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn events_written(&self) -> u64 {
        self.events
    }

    fn writer(&mut self) -> SimResult<&mut BufWriter<File>> {
        if self.writer.is_none() {
            if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)?;
            }
            let file = File::create(&self.path)?;
            log::info!("writing events to {}", self.path.display());
            self.writer = Some(BufWriter::new(file));
        }
        self.writer
            .as_mut()
            .ok_or_else(|| SimError::Io(format!("{} is not open", self.path.display())))
    }
}

impl OutputSink for JsonLinesSink {
    fn name(&self) -> &str {
        "JsonLinesSink"
    }

    fn write_event(&mut self, event: &SimEvent) -> SimResult<()> {
        let writer = self.writer()?;
        serde_json::to_writer(&mut *writer, event).map_err(|e| SimError::Io(e.to_string()))?;
        writer.write_all(b"\n")?;
        self.events += 1;
        Ok(())
    }

    fn flush(&mut self) -> SimResult<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for JsonLinesSink {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            log::error!("{}: flush on drop failed: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_output_name_stamp() {
        let t = Utc.with_ymd_and_hms(2026, 3, 7, 9, 5, 59).unwrap();
        assert_eq!(output_name("megat", t), "megat_2026-03-07_09-05");
    }

    #[test]
    fn test_json_lines_one_object_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("events.jsonl");
        let mut sink = JsonLinesSink::new(&path);
        assert!(!path.exists());
        sink.write_event(&SimEvent::new(0, 0)).unwrap();
        sink.write_event(&SimEvent::new(0, 1)).unwrap();
        sink.flush().unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["id"], 1);
        assert_eq!(sink.events_written(), 2);
    }
}

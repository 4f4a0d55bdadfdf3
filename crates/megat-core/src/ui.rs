// ─────────────────────────────────────────────────────────────────────
// Megat Simulation — UI Command Boundary
// Mirrors: DDG4 Geant4UIManager
// ─────────────────────────────────────────────────────────────────────
//! Textual command interface used in command-mode runs.
//!
//! The kernel interprets only `/run/beamOn`, `/run/initialize`, and the
//! terminate commands. Everything else, visualization included, is
//! forwarded to the `UiExecutor` verbatim.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use megat_types::{SimError, SimResult};

pub const TERMINATE_COMMAND: &str = "/ddg4/UI/terminate";

/// Commands the kernel interprets itself. Everything else is
/// forwarded to the UI executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCommand {
    BeamOn(u64),
    Initialize,
    Terminate,
    Forward(String),
}

impl UiCommand {
    /// Parse one command line. Blank lines and `#` comments yield `None`.
    pub fn parse(line: &str) -> SimResult<Option<UiCommand>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let mut words = line.split_whitespace();
        let head = words.next().unwrap_or_default();
        Ok(Some(match head {
            TERMINATE_COMMAND | "exit" | "/control/exit" => UiCommand::Terminate,
            "/run/initialize" => UiCommand::Initialize,
            "/run/beamOn" => {
                let n = match words.next() {
                    None => 1,
                    Some(arg) => arg.parse::<u64>().map_err(|_| {
                        SimError::Validation(format!("invalid event count in '{line}'"))
                    })?,
                };
                UiCommand::BeamOn(n)
            }
            _ => UiCommand::Forward(line.to_string()),
        }))
    }
}

/// Source and executor of UI commands.
pub trait UiExecutor {
    /// Next command, or `None` once the session is exhausted.
    fn next_command(&mut self) -> Option<String>;

    /// Execute a command the kernel does not interpret itself.
    fn execute(&mut self, command: &str) -> SimResult<()>;
}

/// Fixed list of commands; forwarded commands are recorded.
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    pending: VecDeque<String>,
    executed: Vec<String>,
}

impl CommandQueue {
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pending: commands.into_iter().map(Into::into).collect(),
            executed: Vec::new(),
        }
    }

    /// Read a macro file, one command per line.
    pub fn from_macro(path: &Path) -> SimResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SimError::Configuration(format!("cannot read macro {}: {e}", path.display()))
        })?;
        Ok(Self::new(text.lines().map(str::to_string)))
    }

    pub fn push(&mut self, command: impl Into<String>) {
        self.pending.push_back(command.into());
    }

    pub fn extend<I, S>(&mut self, commands: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending.extend(commands.into_iter().map(Into::into));
    }

    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl UiExecutor for CommandQueue {
    fn next_command(&mut self) -> Option<String> {
        self.pending.pop_front()
    }

    fn execute(&mut self, command: &str) -> SimResult<()> {
        log::info!("UI: {command}");
        self.executed.push(command.to_string());
        Ok(())
    }
}

/// Cooperative cancellation flag checked between events.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(UiCommand::parse("/run/beamOn 10").unwrap(), Some(UiCommand::BeamOn(10)));
        assert_eq!(UiCommand::parse("/run/beamOn").unwrap(), Some(UiCommand::BeamOn(1)));
        assert_eq!(UiCommand::parse(TERMINATE_COMMAND).unwrap(), Some(UiCommand::Terminate));
        assert_eq!(UiCommand::parse("  exit ").unwrap(), Some(UiCommand::Terminate));
        assert_eq!(UiCommand::parse("/run/initialize").unwrap(), Some(UiCommand::Initialize));
        assert_eq!(
            UiCommand::parse("/vis/open OGL").unwrap(),
            Some(UiCommand::Forward("/vis/open OGL".into()))
        );
        assert_eq!(UiCommand::parse("# comment").unwrap(), None);
        assert_eq!(UiCommand::parse("   ").unwrap(), None);
    }

    #[test]
    fn test_bad_beam_on_count() {
        assert!(matches!(
            UiCommand::parse("/run/beamOn ten"),
            Err(SimError::Validation(_))
        ));
    }

    #[test]
    fn test_queue_order_and_record() {
        let mut q = CommandQueue::new(["/vis/open OGL", "/run/beamOn 2"]);
        q.push(TERMINATE_COMMAND);
        assert_eq!(q.next_command().as_deref(), Some("/vis/open OGL"));
        q.execute("/vis/open OGL").unwrap();
        assert_eq!(q.remaining(), 2);
        assert_eq!(q.executed(), ["/vis/open OGL".to_string()]);
    }

    #[test]
    fn test_stop_handle_shared() {
        let stop = StopHandle::new();
        let other = stop.clone();
        assert!(!stop.is_stop_requested());
        other.request_stop();
        assert!(stop.is_stop_requested());
        stop.reset();
        assert!(!other.is_stop_requested());
    }
}

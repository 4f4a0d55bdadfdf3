// ─────────────────────────────────────────────────────────────────────
// Megat Simulation — Run Actions
// Mirrors: DDG4 Geant4TestRunAction
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

use megat_types::SimResult;

use crate::action::{Action, ActionContext, ActionInfo, OutputLevel, RunAction};
use crate::event::RunSummary;

/// Properties of `TestRunAction`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TestRunConfig {
    #[serde(alias = "Property_int")]
    pub property_int: i64,
    #[serde(alias = "Property_double")]
    pub property_double: f64,
    #[serde(alias = "Property_string")]
    pub property_string: String,
}

/// Logs its properties at every run boundary.
#[derive(Debug, Clone)]
pub struct TestRunAction {
    info: ActionInfo,
    config: TestRunConfig,
    runs_started: u32,
    runs_ended: u32,
}

impl TestRunAction {
    pub fn new(info: ActionInfo, config: TestRunConfig) -> Self {
        Self {
            info,
            config,
            runs_started: 0,
            runs_ended: 0,
        }
    }

    pub fn config(&self) -> &TestRunConfig {
        &self.config
    }

    pub fn runs_started(&self) -> u32 {
        self.runs_started
    }

    pub fn runs_ended(&self) -> u32 {
        self.runs_ended
    }
}

impl Action for TestRunAction {
    fn info(&self) -> &ActionInfo {
        &self.info
    }
    fn info_mut(&mut self) -> &mut ActionInfo {
        &mut self.info
    }
}

impl RunAction for TestRunAction {
    fn begin_run(&mut self, ctx: &mut ActionContext<'_>) -> SimResult<()> {
        self.runs_started += 1;
        let c = &self.config;
        self.info.log(
            OutputLevel::Info,
            format_args!(
                "begin run {}: int={} double={} string='{}' ({})",
                ctx.run,
                c.property_int,
                c.property_double,
                c.property_string,
                ctx.rng.status()
            ),
        );
        Ok(())
    }

    fn end_run(&mut self, ctx: &mut ActionContext<'_>, summary: &RunSummary) -> SimResult<()> {
        self.runs_ended += 1;
        self.info.log(
            OutputLevel::Info,
            format_args!(
                "end run {}: {} events ({} failed)",
                ctx.run, summary.events_processed, summary.failed_events
            ),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ActionFactory, ActionType};
    use crate::testing::Fixture;

    #[test]
    fn test_script_property_names_accepted() {
        let text = r#"{"Property_int": 12345, "Property_double": -5e15,
                       "Property_string": "Startrun: Hello_2"}"#;
        let cfg: TestRunConfig = serde_json::from_str(text).unwrap();
        assert_eq!(cfg.property_int, 12345);
        assert_eq!(cfg.property_double, -5e15);
        assert_eq!(cfg.property_string, "Startrun: Hello_2");
    }

    #[test]
    fn test_counts_run_boundaries() {
        let mut fx = Fixture::new();
        let mut factory = ActionFactory::new();
        let mut action = TestRunAction::new(
            factory.info(ActionType::TestRunAction, "RunInit"),
            TestRunConfig::default(),
        );
        action.begin_run(&mut fx.ctx()).unwrap();
        action.end_run(&mut fx.ctx(), &RunSummary::new(0)).unwrap();
        assert_eq!((action.runs_started(), action.runs_ended()), (1, 1));
    }
}

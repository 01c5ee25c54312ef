//! Scripted transaction runner for the I2C master engine model.

/// Script runner and pass/fail reporting.
pub mod runner;
/// Line-oriented script parser.
pub mod script;

pub use runner::{run_script, AttachedDevice, RunOptions, RunReport, RunSummary, StepResult};
pub use script::{parse_script, ConfigChange, Script, ScriptError, ScriptLine, SlaveSpec, Step};

#[cfg(test)]
use tempfile as _;

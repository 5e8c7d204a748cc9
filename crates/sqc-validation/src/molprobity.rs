// SPDX-License-Identifier: Apache-2.0

use crate::clashscore::parse_clashscore;
use crate::error::OutputParseError;
use crate::residue_analysis::parse_residue_analysis;
use sqc_core::{run_tool, JobError, JobResult, ProcessError, ToolCommand};
use sqc_model::{Clash, Residue};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, warn};

pub const DEFAULT_ANALYSIS_TIMEOUT: Duration = Duration::from_secs(600);
pub const RESIDUE_ANALYSIS_TOOL: &str = "residue-analysis";
pub const CLASHSCORE_TOOL: &str = "clashscore";

/// An analysis that did not finish. The job continues without its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolFailure {
    pub tool: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome<T> {
    Completed(T),
    ToolFailed(ToolFailure),
}

impl<T> AnalysisOutcome<T> {
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::ToolFailed(_) => None,
        }
    }
}

/// Runs the MolProbity command line tools against single-model PDB files.
#[derive(Debug, Clone)]
pub struct MolProbity {
    pub residue_tool: ToolCommand,
    pub clash_tool: ToolCommand,
    pub timeout: Duration,
}

impl Default for MolProbity {
    fn default() -> Self {
        Self {
            residue_tool: ToolCommand::new(RESIDUE_ANALYSIS_TOOL),
            clash_tool: ToolCommand::new(CLASHSCORE_TOOL),
            timeout: DEFAULT_ANALYSIS_TIMEOUT,
        }
    }
}

impl MolProbity {
    pub fn residue_analysis(&self, model: &Path) -> JobResult<AnalysisOutcome<Vec<Residue>>> {
        debug!(path = %model.display(), "running residue analysis");
        self.analyze(&self.residue_tool, model, parse_residue_analysis)
    }

    pub fn clashscore(&self, model: &Path) -> JobResult<AnalysisOutcome<Vec<Clash>>> {
        debug!(path = %model.display(), "running clashscore");
        self.analyze(&self.clash_tool, model, parse_clashscore)
    }

    fn analyze<T>(
        &self,
        tool: &ToolCommand,
        model: &Path,
        parse: fn(&str) -> Result<T, OutputParseError>,
    ) -> JobResult<AnalysisOutcome<T>> {
        match run_tool(tool, model, None, self.timeout) {
            Ok(output) => {
                debug!(
                    tool = %tool.program,
                    elapsed_ms = output.elapsed.as_millis() as u64,
                    "analysis finished"
                );
                Ok(AnalysisOutcome::Completed(parse(&output.stdout)?))
            }
            Err(ProcessError::TimedOut { program, timeout }) => {
                warn!(
                    tool = %program,
                    timeout_ms = timeout.as_millis() as u64,
                    "analysis did not finish in time"
                );
                Ok(AnalysisOutcome::ToolFailed(ToolFailure {
                    tool: program,
                    reason: format!("did not finish within {timeout:?}"),
                }))
            }
            Err(ProcessError::NonZeroExit {
                program,
                code,
                stderr,
            }) => {
                error!(
                    tool = %program,
                    code = ?code,
                    stderr = %stderr,
                    "analysis exited with non-zero code"
                );
                Err(JobError::internal(format!("{program} exited with status {code:?}")))
            }
            Err(other) => {
                error!(tool = %tool.program, error = %other, "analysis could not run");
                Err(JobError::internal(other.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> ToolCommand {
        ToolCommand::new("sh").with_args(["-c", script, "analysis"])
    }

    fn molprobity(residue: &str, clash: &str) -> MolProbity {
        MolProbity {
            residue_tool: sh(residue),
            clash_tool: sh(clash),
            timeout: Duration::from_millis(500),
        }
    }

    #[test]
    fn timeout_is_a_tool_failure() {
        let mp = molprobity("true", "sleep 5");
        let outcome = mp.clashscore(Path::new("/dev/null")).expect("not fatal");
        match outcome {
            AnalysisOutcome::ToolFailed(failure) => assert_eq!(failure.tool, "sh"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn non_zero_exit_is_internal() {
        let mp = molprobity("echo 'bad input' >&2; exit 2", "true");
        let err = mp
            .residue_analysis(Path::new("/dev/null"))
            .expect_err("fatal");
        assert!(err.is_internal());
    }

    #[test]
    fn unparsable_output_is_a_validation_error() {
        let mp = molprobity("true", "echo one; echo two");
        let err = mp.clashscore(Path::new("/dev/null")).expect_err("fatal");
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn model_path_is_passed_to_the_tool() {
        let mp = molprobity(
            "test \"$1\" = /tmp/1abc.pdb-model-1.pdb || exit 7; echo residue",
            "true",
        );
        let outcome = mp
            .residue_analysis(Path::new("/tmp/1abc.pdb-model-1.pdb"))
            .expect("tool sees the model path");
        assert_eq!(outcome.completed(), Some(Vec::new()));
    }

    #[test]
    fn missing_tool_is_internal() {
        let mp = MolProbity {
            residue_tool: ToolCommand::new("/nonexistent/residue-analysis"),
            ..MolProbity::default()
        };
        let err = mp
            .residue_analysis(Path::new("/dev/null"))
            .expect_err("no tool");
        assert!(err.is_internal());
    }
}

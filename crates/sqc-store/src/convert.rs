// SPDX-License-Identifier: Apache-2.0

use sqc_core::{run_tool, JobError, JobResult, ProcessError, ToolCommand};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_CONVERTER_COMMAND: &str = "gemmi convert --to pdb {input} {output}";
pub const DEFAULT_CONVERT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConverterOutput {
    /// The tool writes the `{output}` path itself.
    File,
    /// The tool prints PDB text; we write it to the output path.
    Stdout,
}

impl ConverterOutput {
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "stdout" => Ok(Self::Stdout),
            other => Err(format!("unknown converter output mode {other:?}")),
        }
    }
}

/// Normalizes mmCIF input to PDB through an external converter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatConverter {
    pub command: ToolCommand,
    pub timeout: Duration,
    pub output: ConverterOutput,
}

impl Default for FormatConverter {
    fn default() -> Self {
        Self {
            command: ToolCommand::new("gemmi")
                .with_args(["convert", "--to", "pdb", "{input}", "{output}"]),
            timeout: DEFAULT_CONVERT_TIMEOUT,
            output: ConverterOutput::File,
        }
    }
}

impl FormatConverter {
    /// Timeouts and tool failures are conversion errors; a converter that
    /// can not be started is an internal one.
    pub fn convert(&self, input: &Path, output: &Path) -> JobResult<()> {
        let out_arg = match self.output {
            ConverterOutput::File => Some(output),
            ConverterOutput::Stdout => None,
        };
        let result =
            run_tool(&self.command, input, out_arg, self.timeout).map_err(conversion_error)?;
        debug!(
            input = %input.display(),
            elapsed_ms = result.elapsed.as_millis() as u64,
            "structure converted to pdb"
        );

        match self.output {
            ConverterOutput::Stdout => {
                if result.stdout.trim().is_empty() {
                    return Err(JobError::conversion("converter produced no output"));
                }
                fs::write(output, result.stdout.as_bytes()).map_err(|e| {
                    JobError::internal(format!("write {}: {e}", output.display()))
                })
            }
            ConverterOutput::File => {
                let written = fs::metadata(output).map(|m| m.len()).unwrap_or(0);
                if written == 0 {
                    return Err(JobError::conversion("converter produced no output"));
                }
                Ok(())
            }
        }
    }
}

fn conversion_error(err: ProcessError) -> JobError {
    match err {
        ProcessError::TimedOut { timeout, .. } => {
            JobError::conversion(format!("converter timed out after {}s", timeout.as_secs()))
        }
        ProcessError::NonZeroExit { code, stderr, .. } => JobError::conversion(format!(
            "converter exited with status {}: {}",
            code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
            stderr.trim()
        )),
        other => JobError::internal(other.to_string()),
    }
}

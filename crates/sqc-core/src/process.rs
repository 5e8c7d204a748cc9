// SPDX-License-Identifier: Apache-2.0

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

pub const INPUT_PLACEHOLDER: &str = "{input}";
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// An external program plus its argument template.
///
/// Arguments may reference `{input}` and `{output}`. When no argument
/// mentions `{input}`, the input path is appended as the last argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Parses a whitespace separated command line such as
    /// `gemmi convert --to pdb {input} {output}`.
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut parts = line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| "tool command must not be empty".to_string())?;
        Ok(Self::new(program).with_args(parts))
    }

    fn render_args(&self, input: &Path, output: Option<&Path>) -> Vec<String> {
        let input = input.display().to_string();
        let output = output.map(|p| p.display().to_string());
        let mut saw_input = false;
        let mut rendered: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                saw_input |= arg.contains(INPUT_PLACEHOLDER);
                let arg = arg.replace(INPUT_PLACEHOLDER, &input);
                match &output {
                    Some(out) => arg.replace(OUTPUT_PLACEHOLDER, out),
                    None => arg,
                }
            })
            .collect();
        if !saw_input {
            rendered.push(input);
        }
        rendered
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} did not finish within {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
    #[error("{program} exited with status {code:?}")]
    NonZeroExit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("failed waiting for {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProcessError {
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}

/// Runs `command` against `input`, killing it once `timeout` elapses.
///
/// Stdout and stderr are drained on helper threads so a chatty tool can not
/// block on a full pipe while we poll for its exit.
pub fn run_tool(
    command: &ToolCommand,
    input: &Path,
    output: Option<&Path>,
    timeout: Duration,
) -> Result<ToolOutput, ProcessError> {
    let started = Instant::now();
    let program = command.program.clone();
    let mut child = Command::new(&command.program)
        .args(command.render_args(input, output))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match wait_with_deadline(&mut child, started + timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            reap(&mut child);
            return Err(ProcessError::TimedOut { program, timeout });
        }
        Err(source) => {
            reap(&mut child);
            return Err(ProcessError::Io { program, source });
        }
    };

    let stdout = collect(stdout);
    let stderr = collect(stderr);
    if !status.success() {
        return Err(ProcessError::NonZeroExit {
            program,
            code: status.code(),
            stderr,
        });
    }
    Ok(ToolOutput {
        stdout,
        stderr,
        elapsed: started.elapsed(),
    })
}

fn wait_with_deadline(child: &mut Child, deadline: Instant) -> std::io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sh(script: &str) -> ToolCommand {
        ToolCommand::new("sh").with_args(["-c", script])
    }

    #[test]
    fn parse_splits_program_and_arguments() {
        let cmd = ToolCommand::parse("gemmi convert --to pdb {input} {output}").expect("parse");
        assert_eq!(cmd.program, "gemmi");
        assert_eq!(cmd.args, vec!["convert", "--to", "pdb", "{input}", "{output}"]);
        assert!(ToolCommand::parse("   ").is_err());
    }

    #[test]
    fn input_is_appended_when_not_referenced() {
        let cmd = ToolCommand::new("clashscore");
        let args = cmd.render_args(Path::new("/tmp/1abc.pdb"), None);
        assert_eq!(args, vec!["/tmp/1abc.pdb"]);
    }

    #[test]
    fn placeholders_are_substituted() {
        let cmd = ToolCommand::parse("convert -i {input} -o {output}").expect("parse");
        let out = PathBuf::from("/tmp/out.pdb");
        let args = cmd.render_args(Path::new("/tmp/in.cif"), Some(&out));
        assert_eq!(args, vec!["-i", "/tmp/in.cif", "-o", "/tmp/out.pdb"]);
    }

    #[test]
    fn captures_stdout_of_successful_tool() {
        let out = run_tool(
            &sh("printf 'residue,omega\\n'"),
            Path::new("/dev/null"),
            None,
            Duration::from_secs(10),
        )
        .expect("tool runs");
        assert_eq!(out.stdout, "residue,omega\n");
    }

    #[test]
    fn slow_tool_is_killed_at_deadline() {
        let started = Instant::now();
        let err = run_tool(
            &sh("sleep 5"),
            Path::new("/dev/null"),
            None,
            Duration::from_millis(200),
        )
        .expect_err("must time out");
        assert!(err.is_timeout(), "unexpected error: {err}");
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn non_zero_exit_keeps_stderr() {
        let err = run_tool(
            &sh("echo 'no model found' >&2; exit 3"),
            Path::new("/dev/null"),
            None,
            Duration::from_secs(10),
        )
        .expect_err("must fail");
        match err {
            ProcessError::NonZeroExit { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert!(stderr.contains("no model found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = run_tool(
            &ToolCommand::new("/nonexistent/sqc-tool"),
            Path::new("/dev/null"),
            None,
            Duration::from_secs(1),
        )
        .expect_err("must fail");
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }
}

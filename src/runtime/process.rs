//! External process invocation.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::RealRuntime;

/// Description of an external command to run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProcessCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub envs: Vec<(String, String)>,
}

impl ProcessCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        cmd
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RealRuntime {
    #[tracing::instrument(skip(self))]
    pub(crate) fn run_command_impl(&self, command: &ProcessCommand) -> Result<CommandOutput> {
        let output = command
            .to_command()
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to run {:?}", command.program))?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn run_interactive_impl(&self, command: &ProcessCommand) -> Result<i32> {
        let status = command
            .to_command()
            .status()
            .with_context(|| format!("Failed to run {:?}", command.program))?;
        Ok(status.code().unwrap_or(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;

    #[test]
    fn test_process_command_builder() {
        let cmd = ProcessCommand::new("git")
            .arg("clone")
            .args(["https://example.com/repo.git", "dest"])
            .current_dir(Path::new("/tmp"))
            .env("HAXELIB_RUN", "1");

        assert_eq!(cmd.program, PathBuf::from("git"));
        assert_eq!(cmd.args, vec!["clone", "https://example.com/repo.git", "dest"]);
        assert_eq!(cmd.cwd, Some(PathBuf::from("/tmp")));
        assert_eq!(cmd.envs, vec![("HAXELIB_RUN".to_string(), "1".to_string())]);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_command_captures_output() {
        let runtime = RealRuntime;
        let output = runtime
            .run_command(&ProcessCommand::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]))
            .unwrap();
        assert!(!output.success);
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[test]
    fn test_run_command_missing_program() {
        let runtime = RealRuntime;
        let result = runtime.run_command(&ProcessCommand::new("haxelib-no-such-program-xyz"));
        assert!(result.is_err());
    }
}

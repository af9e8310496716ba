//! Runtime abstraction for system operations.
//!
//! This module provides a trait-based abstraction over system operations,
//! enabling dependency injection and testability.
//!
//! # Structure
//!
//! - `path` - Path utility functions (normalize, is_path_under)
//! - `env` - Environment variables and well-known directories
//! - `fs` - File system operations (read, write, directory, timestamps)
//! - `process` - External process invocation (VCS executables, run scripts)
//! - `user` - User interaction (confirmation prompts)

mod env;
mod fs;
pub mod path;
mod process;
mod user;

use anyhow::Result;
use std::env as std_env;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub use path::{is_path_under, normalize_path};
pub use process::{CommandOutput, ProcessCommand};

#[cfg_attr(test, mockall::automock)]
pub trait Runtime: Send + Sync {
    // Environment
    fn env_var(&self, key: &str) -> Result<String, std_env::VarError>;
    fn current_dir(&self) -> Result<PathBuf>;

    // File System
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
    fn read(&self, path: &Path) -> Result<Vec<u8>>;
    fn read_to_string(&self, path: &Path) -> Result<String>;
    /// Move a file or directory, replacing a file at `to` on the same filesystem.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    fn remove_file(&self, path: &Path) -> Result<()>;
    fn remove_dir_all(&self, path: &Path) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn is_file(&self, path: &Path) -> bool;
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Set the modification time of a file, used to preserve archive entry timestamps.
    fn set_modified(&self, path: &Path, modified: SystemTime) -> Result<()>;

    // Directories
    fn home_dir(&self) -> Option<PathBuf>;
    fn data_local_dir(&self) -> Option<PathBuf>;

    // Processes
    /// Run a command to completion, capturing stdout and stderr.
    fn run_command(&self, command: &ProcessCommand) -> Result<CommandOutput>;

    /// Run a command attached to the current terminal and return its exit code.
    fn run_interactive(&self, command: &ProcessCommand) -> Result<i32>;

    // User interaction
    /// Prompt user for confirmation. Returns true if user confirms (y/yes), false otherwise.
    fn confirm(&self, prompt: &str) -> Result<bool>;
}

pub struct RealRuntime;

impl Runtime for RealRuntime {
    fn env_var(&self, key: &str) -> Result<String, std_env::VarError> {
        self.env_var_impl(key)
    }

    fn current_dir(&self) -> Result<PathBuf> {
        self.current_dir_impl()
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.write_impl(path, contents)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.read_impl(path)
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.read_to_string_impl(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.rename_impl(from, to)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.create_dir_all_impl(path)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.remove_file_impl(path)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.remove_dir_all_impl(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.exists_impl(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.is_dir_impl(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.is_file_impl(path)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        self.read_dir_impl(path)
    }

    fn set_modified(&self, path: &Path, modified: SystemTime) -> Result<()> {
        self.set_modified_impl(path, modified)
    }

    fn home_dir(&self) -> Option<PathBuf> {
        self.home_dir_impl()
    }

    fn data_local_dir(&self) -> Option<PathBuf> {
        self.data_local_dir_impl()
    }

    fn run_command(&self, command: &ProcessCommand) -> Result<CommandOutput> {
        self.run_command_impl(command)
    }

    fn run_interactive(&self, command: &ProcessCommand) -> Result<i32> {
        self.run_interactive_impl(command)
    }

    fn confirm(&self, prompt: &str) -> Result<bool> {
        self.confirm_impl(prompt)
    }
}

/// Runtime wrapper that answers every confirmation prompt with a fixed reply.
///
/// Backs the `--always` and `--never` flags; every other operation is
/// forwarded to the wrapped runtime.
pub struct AnswerRuntime<R: Runtime> {
    inner: R,
    answer: bool,
}

impl<R: Runtime> AnswerRuntime<R> {
    pub fn new(inner: R, answer: bool) -> Self {
        Self { inner, answer }
    }
}

impl<R: Runtime> Runtime for AnswerRuntime<R> {
    fn env_var(&self, key: &str) -> Result<String, std_env::VarError> {
        self.inner.env_var(key)
    }

    fn current_dir(&self) -> Result<PathBuf> {
        self.inner.current_dir()
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.inner.write(path, contents)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.inner.read(path)
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.inner.read_to_string(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.inner.rename(from, to)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.inner.create_dir_all(path)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.inner.remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.inner.remove_dir_all(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.inner.is_dir(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.inner.is_file(path)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        self.inner.read_dir(path)
    }

    fn set_modified(&self, path: &Path, modified: SystemTime) -> Result<()> {
        self.inner.set_modified(path, modified)
    }

    fn home_dir(&self) -> Option<PathBuf> {
        self.inner.home_dir()
    }

    fn data_local_dir(&self) -> Option<PathBuf> {
        self.inner.data_local_dir()
    }

    fn run_command(&self, command: &ProcessCommand) -> Result<CommandOutput> {
        self.inner.run_command(command)
    }

    fn run_interactive(&self, command: &ProcessCommand) -> Result<i32> {
        self.inner.run_interactive(command)
    }

    fn confirm(&self, prompt: &str) -> Result<bool> {
        log::debug!("Answering '{}' with {}", prompt, self.answer);
        Ok(self.answer)
    }
}

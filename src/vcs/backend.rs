use std::cell::OnceCell;
use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{debug, warn};

use crate::runtime::{CommandOutput, ProcessCommand, Runtime};

use super::{VcsError, VcsKind};

/// A version-control backend bound to a runtime.
///
/// The executable is located lazily on first use and remembered for the
/// lifetime of the value.
pub struct Vcs<'a, R: Runtime> {
    runtime: &'a R,
    kind: VcsKind,
    executable: OnceCell<Option<PathBuf>>,
}

impl<'a, R: Runtime> Vcs<'a, R> {
    pub fn new(runtime: &'a R, kind: VcsKind) -> Self {
        Self {
            runtime,
            kind,
            executable: OnceCell::new(),
        }
    }

    pub fn kind(&self) -> VcsKind {
        self.kind
    }

    /// Whether the backend's executable could be found.
    pub fn available(&self) -> bool {
        self.executable().is_some()
    }

    /// Locate the executable: first through the search path, then through a
    /// few well-known install locations. Never fails.
    pub fn locate(&self) -> Option<PathBuf> {
        let mut candidates = vec![PathBuf::from(self.kind.executable())];
        candidates.extend(fallback_locations(self.kind));

        for candidate in candidates {
            let version_check = ProcessCommand::new(&candidate).arg("--version");
            match self.runtime.run_command(&version_check) {
                Ok(output) if output.success => {
                    debug!("Using {} at {:?}", self.kind.display_name(), candidate);
                    return Some(candidate);
                }
                Ok(_) | Err(_) => debug!("{:?} is not usable", candidate),
            }
        }
        None
    }

    fn executable(&self) -> Option<&PathBuf> {
        self.executable.get_or_init(|| self.locate()).as_ref()
    }

    fn require_executable(&self) -> Result<PathBuf, VcsError> {
        self.executable()
            .cloned()
            .ok_or(VcsError::Unavailable(self.kind))
    }

    fn run(&self, exe: &Path, cwd: Option<&Path>, args: &[&str]) -> Result<CommandOutput> {
        let mut command = ProcessCommand::new(exe).args(args.iter().copied());
        if let Some(cwd) = cwd {
            command = command.current_dir(cwd);
        }
        debug!("Running {:?} {:?}", exe, args);
        self.runtime.run_command(&command)
    }

    /// Run a command, mapping both spawn failures and non-zero exits to `on_error`.
    fn run_checked<F>(&self, exe: &Path, cwd: Option<&Path>, args: &[&str], on_error: F) -> Result<CommandOutput>
    where
        F: FnOnce(String) -> VcsError,
    {
        match self.run(exe, cwd, args) {
            Ok(output) if output.success => Ok(output),
            Ok(output) => Err(on_error(output.stderr.trim().to_string()).into()),
            Err(e) => Err(on_error(e.to_string()).into()),
        }
    }

    /// Clone `url` into `dest`, then optionally check out `branch` and `version`.
    ///
    /// Checkout failures leave the clone in place; discarding it is up to the caller.
    #[tracing::instrument(skip(self))]
    pub fn clone_repo(
        &self,
        dest: &Path,
        url: &str,
        branch: Option<&str>,
        version: Option<&str>,
    ) -> Result<()> {
        let exe = self.require_executable()?;
        let kind = self.kind;
        let dest_str = dest.to_string_lossy();

        self.run_checked(&exe, None, &["clone", "--", url, dest_str.as_ref()], |stderr| {
            VcsError::CantClone {
                kind,
                url: url.to_string(),
                stderr,
            }
        })?;

        if let Some(branch) = branch {
            let args: &[&str] = match kind {
                VcsKind::Git => &["checkout", branch],
                VcsKind::Mercurial => &["update", branch],
            };
            self.run_checked(&exe, Some(dest), args, |stderr| VcsError::CantCheckoutBranch {
                kind,
                branch: branch.to_string(),
                stderr,
            })?;
        }

        if let Some(version) = version
            && Some(version) != branch
        {
            let args: &[&str] = match kind {
                VcsKind::Git => &["checkout", version],
                VcsKind::Mercurial => &["update", "-r", version],
            };
            self.run_checked(&exe, Some(dest), args, |stderr| {
                VcsError::CantCheckoutVersion {
                    kind,
                    version: version.to_string(),
                    stderr,
                }
            })?;
        }

        if kind == VcsKind::Git {
            let submodules = self.run(
                &exe,
                Some(dest),
                &["submodule", "update", "--init", "--recursive"],
            );
            match submodules {
                Ok(output) if output.success => {}
                Ok(output) => warn!("Could not update submodules: {}", output.stderr.trim()),
                Err(e) => warn!("Could not update submodules: {}", e),
            }
        }

        Ok(())
    }

    /// Pull upstream changes into an existing working copy.
    ///
    /// Returns whether the checked-out revision changed.
    #[tracing::instrument(skip(self))]
    pub fn update(&self, working_copy: &Path) -> Result<bool> {
        let exe = self.require_executable()?;
        let kind = self.kind;
        let cant_update = |stderr: String| VcsError::CantUpdate { kind, stderr };

        let (revision_args, pull_steps): (&[&str], &[&[&str]]) = match kind {
            VcsKind::Git => (&["rev-parse", "HEAD"], &[&["pull"]]),
            VcsKind::Mercurial => (&["id", "-i"], &[&["pull"], &["update"]]),
        };

        let before = self.run_checked(&exe, Some(working_copy), revision_args, cant_update)?;
        for step in pull_steps {
            self.run_checked(&exe, Some(working_copy), step, cant_update)?;
        }
        let after = self.run_checked(&exe, Some(working_copy), revision_args, cant_update)?;

        let changed = before.stdout.trim() != after.stdout.trim();
        debug!("{:?} changed: {}", working_copy, changed);
        Ok(changed)
    }
}

/// Install locations tried when the executable is not on the search path.
fn fallback_locations(kind: VcsKind) -> Vec<PathBuf> {
    let exe = kind.executable();
    if cfg!(windows) {
        let dirs: &[&str] = match kind {
            VcsKind::Git => &[r"C:\Program Files\Git\bin", r"C:\Program Files (x86)\Git\bin"],
            VcsKind::Mercurial => &[r"C:\Program Files\Mercurial", r"C:\Program Files\TortoiseHg"],
        };
        dirs.iter()
            .map(|d| Path::new(d).join(format!("{}.exe", exe)))
            .collect()
    } else if cfg!(target_os = "macos") {
        ["/usr/local/bin", "/opt/homebrew/bin", "/opt/local/bin"]
            .iter()
            .map(|d| Path::new(d).join(exe))
            .collect()
    } else {
        ["/usr/local/bin", "/usr/bin"]
            .iter()
            .map(|d| Path::new(d).join(exe))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TestRuntime, failed_output, ok_output};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    #[test]
    fn test_locate_finds_executable_on_path() {
        let dir = tempdir().unwrap();
        let runtime = TestRuntime::new(dir.path()).with_commands(|_| Ok(ok_output("git version 2.44.0")));
        let vcs = Vcs::new(&runtime, VcsKind::Git);

        assert!(vcs.available());
        assert_eq!(vcs.locate(), Some(PathBuf::from("git")));
    }

    #[test]
    fn test_locate_tries_fallback_locations() {
        let dir = tempdir().unwrap();
        let runtime = TestRuntime::new(dir.path()).with_commands(|cmd| {
            if cmd.program == Path::new("hg") {
                anyhow::bail!("not found")
            }
            Ok(ok_output("Mercurial Distributed SCM"))
        });
        let vcs = Vcs::new(&runtime, VcsKind::Mercurial);
        let found = vcs.locate().unwrap();
        assert_ne!(found, PathBuf::from("hg"));
        assert_eq!(found, fallback_locations(VcsKind::Mercurial)[0]);
    }

    #[test]
    fn test_unavailable_backend_fails_before_clone() {
        let dir = tempdir().unwrap();
        let runtime = TestRuntime::new(dir.path());
        let vcs = Vcs::new(&runtime, VcsKind::Git);
        assert!(!vcs.available());

        let err = vcs
            .clone_repo(&dir.path().join("dest"), "https://unreachable.invalid/x.git", None, None)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<VcsError>(),
            Some(&VcsError::Unavailable(VcsKind::Git))
        );
        assert!(runtime.recorded_commands().iter().all(|c| c.args == vec!["--version"]));
    }

    #[test]
    fn test_clone_with_branch_and_version() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("git");
        let runtime = TestRuntime::new(dir.path()).with_commands(|_| Ok(ok_output("")));
        let vcs = Vcs::new(&runtime, VcsKind::Git);

        vcs.clone_repo(&dest, "https://example.com/foo.git", Some("dev"), Some("abc123"))
            .unwrap();

        let args: Vec<Vec<String>> = runtime
            .recorded_commands()
            .into_iter()
            .filter(|c| c.args != vec!["--version"])
            .map(|c| c.args)
            .collect();
        assert_eq!(
            args,
            vec![
                vec!["clone".to_string(), "--".into(), "https://example.com/foo.git".into(), dest.to_string_lossy().into_owned()],
                vec!["checkout".to_string(), "dev".into()],
                vec!["checkout".to_string(), "abc123".into()],
                vec!["submodule".to_string(), "update".into(), "--init".into(), "--recursive".into()],
            ]
        );
    }

    #[test]
    fn test_clone_skips_version_equal_to_branch() {
        let dir = tempdir().unwrap();
        let runtime = TestRuntime::new(dir.path()).with_commands(|_| Ok(ok_output("")));
        let vcs = Vcs::new(&runtime, VcsKind::Mercurial);

        vcs.clone_repo(&dir.path().join("hg"), "https://example.com/hg/foo", Some("1.0"), Some("1.0"))
            .unwrap();

        let updates = runtime
            .recorded_commands()
            .into_iter()
            .filter(|c| c.args.first().map(String::as_str) == Some("update"))
            .count();
        assert_eq!(updates, 1);
    }

    #[test]
    fn test_clone_failure_captures_stderr() {
        let dir = tempdir().unwrap();
        let runtime = TestRuntime::new(dir.path()).with_commands(|cmd| {
            if cmd.args.first().map(String::as_str) == Some("clone") {
                return Ok(failed_output("fatal: repository not found\n"));
            }
            Ok(ok_output(""))
        });
        let vcs = Vcs::new(&runtime, VcsKind::Git);
        let err = vcs
            .clone_repo(&dir.path().join("git"), "https://example.com/missing.git", None, None)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<VcsError>(),
            Some(&VcsError::CantClone {
                kind: VcsKind::Git,
                url: "https://example.com/missing.git".to_string(),
                stderr: "fatal: repository not found".to_string(),
            })
        );
    }

    #[test]
    fn test_checkout_failures_are_distinguished() {
        let dir = tempdir().unwrap();
        let runtime = TestRuntime::new(dir.path()).with_commands(|cmd| {
            if cmd.args == vec!["checkout", "nope"] {
                return Ok(failed_output("error: pathspec 'nope' did not match"));
            }
            Ok(ok_output(""))
        });
        let vcs = Vcs::new(&runtime, VcsKind::Git);

        let err = vcs
            .clone_repo(&dir.path().join("a"), "u", Some("nope"), None)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<VcsError>(),
            Some(VcsError::CantCheckoutBranch { branch, .. }) if branch == "nope"
        ));

        let err = vcs
            .clone_repo(&dir.path().join("b"), "u", Some("main"), Some("nope"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<VcsError>(),
            Some(VcsError::CantCheckoutVersion { version, .. }) if version == "nope"
        ));
    }

    #[test]
    fn test_update_reports_change() {
        let dir = tempdir().unwrap();
        let revisions = Mutex::new(vec!["bbb\n", "aaa\n"]);
        let runtime = TestRuntime::new(dir.path()).with_commands(move |cmd| {
            if cmd.args == vec!["rev-parse", "HEAD"] {
                return Ok(ok_output(revisions.lock().unwrap().pop().unwrap_or("zzz")));
            }
            Ok(ok_output(""))
        });
        let vcs = Vcs::new(&runtime, VcsKind::Git);
        assert!(vcs.update(dir.path()).unwrap());
        assert!(runtime.recorded_commands().iter().any(|c| c.args == vec!["pull"]));
    }

    #[test]
    fn test_update_without_changes() {
        let dir = tempdir().unwrap();
        let runtime = TestRuntime::new(dir.path()).with_commands(|_| Ok(ok_output("1234abcd\n")));
        let vcs = Vcs::new(&runtime, VcsKind::Mercurial);
        assert!(!vcs.update(dir.path()).unwrap());

        let steps: Vec<_> = runtime
            .recorded_commands()
            .into_iter()
            .map(|c| c.args.join(" "))
            .filter(|a| a != "--version")
            .collect();
        assert_eq!(steps, vec!["id -i", "pull", "update", "id -i"]);
    }

    #[test]
    fn test_executable_is_located_once() {
        let dir = tempdir().unwrap();
        let lookups = std::sync::Arc::new(AtomicUsize::new(0));
        let counter = lookups.clone();
        let runtime = TestRuntime::new(dir.path()).with_commands(move |cmd| {
            if cmd.args == vec!["--version"] {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            Ok(ok_output("x"))
        });
        let vcs = Vcs::new(&runtime, VcsKind::Git);
        assert!(vcs.available());
        vcs.update(dir.path()).unwrap();
        assert_eq!(lookups.load(Ordering::SeqCst), 1);
    }
}

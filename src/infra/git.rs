//! Git operations
//!
//! Runs the `git` command line in the collection's checkout, and hands the
//! operator an interactive shell there when a rebase or merge needs fixing.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use crate::config::defaults::DEFAULT_SHELL;
use crate::core::sync::{ConflictFixer, Vcs};
use crate::error::GitError;

/// Markers git leaves behind while a rebase or merge is unfinished
const IN_PROGRESS_MARKERS: &[&str] = &[".git/rebase-merge", ".git/rebase-apply", ".git/MERGE_HEAD"];

/// Git repository driven through the `git` executable
///
/// Commands block the calling thread. Sync steps run strictly one after
/// another and nothing else runs while they do.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo: PathBuf,
}

impl GitCli {
    /// Create a client for the repository at `repo`
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    /// Run git with `args` and return its combined output
    pub fn git(&self, args: &[&str]) -> Result<String, GitError> {
        let command = format!("git {}", args.join(" "));
        debug!("Running `{command}` in {}", self.repo.display());

        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| GitError::Spawn {
                command: command.clone(),
                error: e.to_string(),
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(text)
        } else {
            Err(GitError::Command {
                command,
                output: text.trim().to_string(),
            })
        }
    }
}

impl Vcs for GitCli {
    fn path(&self) -> &Path {
        &self.repo
    }

    fn fetch(&mut self, remote: &str, branch: &str) -> Result<(), GitError> {
        self.git(&["fetch", remote, branch]).map(drop)
    }

    fn checkout(&mut self, commit: &str) -> Result<(), GitError> {
        self.git(&["checkout", commit]).map(drop)
    }

    fn rebase(&mut self, onto: &str) -> Result<(), GitError> {
        self.git(&["rebase", onto]).map(drop)
    }

    fn merge(&mut self, commit: &str, ff_only: bool) -> Result<(), GitError> {
        if ff_only {
            self.git(&["merge", "--ff-only", commit]).map(drop)
        } else {
            self.git(&["merge", "--no-edit", commit]).map(drop)
        }
    }

    fn operation_in_progress(&self) -> bool {
        IN_PROGRESS_MARKERS
            .iter()
            .any(|marker| self.repo.join(marker).exists())
    }
}

/// Interactive shell for repairing the repository by hand
#[derive(Debug, Clone)]
pub struct InteractiveShell {
    shell: String,
}

impl InteractiveShell {
    /// Use `shell` as the interactive program
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for InteractiveShell {
    fn default() -> Self {
        Self::new(DEFAULT_SHELL)
    }
}

impl ConflictFixer for InteractiveShell {
    // Blocks until the operator leaves the shell
    fn fix(&mut self, repo: &Path) -> Result<Option<i32>, GitError> {
        let status = Command::new(&self.shell)
            .current_dir(repo)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| GitError::Spawn {
                command: self.shell.clone(),
                error: e.to_string(),
            })?;
        Ok(status.code())
    }
}

//! Version-check tool client
//!
//! Runs `xbps-checkvers` against the collection and its local binary
//! repository. The target architecture is passed through the environment of
//! the child only.

use std::path::PathBuf;

use tokio::process::Command;
use tracing::debug;

use crate::config::defaults::{BINPKGS_DIR, DEFAULT_CHECKVERS, TARGET_ARCH_ENV};
use crate::core::versions::{VersionCheck, VersionStatus};
use crate::error::VersionCheckError;

/// Queries the version-check tool
#[derive(Debug, Clone)]
pub struct VersionOracle {
    collection: PathBuf,
    program: PathBuf,
}

impl VersionOracle {
    /// Create an oracle for the collection using the default tool
    pub fn new(collection: impl Into<PathBuf>) -> Self {
        Self {
            collection: collection.into(),
            program: PathBuf::from(DEFAULT_CHECKVERS),
        }
    }

    /// Use a different executable
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments shared by both listings
    pub fn base_arguments(&self) -> Vec<String> {
        vec![
            "-D".to_string(),
            self.collection.display().to_string(),
            "-R".to_string(),
            self.collection.join(BINPKGS_DIR).display().to_string(),
            "-i".to_string(),
        ]
    }

    /// Run the tool once and return its stdout
    async fn listing(&self, arch: &str, all: bool) -> Result<String, VersionCheckError> {
        let mut args = self.base_arguments();
        if all {
            args.push("-s".to_string());
        }
        let command = format!(
            "{TARGET_ARCH_ENV}={arch} {} {}",
            self.program.display(),
            args.join(" ")
        );
        debug!("Running `{command}`");

        let output = Command::new(&self.program)
            .args(&args)
            .env(TARGET_ARCH_ENV, arch)
            .output()
            .await
            .map_err(|e| VersionCheckError::Spawn {
                command: command.clone(),
                error: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(VersionCheckError::Failed {
                command,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Status of every package when built for `arch`
    pub async fn check(&self, arch: &str) -> Result<VersionStatus, VersionCheckError> {
        let all = self.listing(arch, true).await?;
        let outdated = self.listing(arch, false).await?;
        Ok(VersionStatus::from_output(&all, &outdated))
    }
}

impl VersionCheck for VersionOracle {
    async fn status(&mut self, arch: &str) -> Result<VersionStatus, VersionCheckError> {
        self.check(arch).await
    }
}

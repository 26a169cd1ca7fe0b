//! Memory-backed sandbox filesystems
//!
//! Mounting needs root, so the actual mount and zram handling lives in a
//! separate helper executable that is run through `sudo` or `doas`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::defaults::DEFAULT_MOUNT_HELPER;
use crate::error::{ConfigError, SandboxError};

/// Filesystem backing a sandbox root
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MountKind {
    /// Plain directory on the collection's filesystem
    #[default]
    None,
    /// tmpfs of the given size
    Tmpfs,
    /// ext4 on a zram device with the default compressor
    Zram,
    /// ext4 on a zstd-compressed zram device
    ZramZstd,
}

impl MountKind {
    /// All accepted spellings
    pub const NAMES: &'static [&'static str] = &["none", "tmpfs", "zram", "zram-zstd"];

    /// Config spelling of this kind
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Tmpfs => "tmpfs",
            Self::Zram => "zram",
            Self::ZramZstd => "zram-zstd",
        }
    }

    /// Whether the kind needs a mount at all
    pub fn is_memory_backed(self) -> bool {
        self != Self::None
    }
}

impl fmt::Display for MountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MountKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "tmpfs" => Ok(Self::Tmpfs),
            "zram" => Ok(Self::Zram),
            "zram-zstd" => Ok(Self::ZramZstd),
            _ => Err(ConfigError::InvalidChoice {
                key: "mount kind".to_string(),
                value: s.to_string(),
                choices: Self::NAMES.iter().map(|s| (*s).to_string()).collect(),
            }),
        }
    }
}

/// Mounts and unmounts memory-backed filesystems
pub trait MountBackend: fmt::Debug + Send + Sync {
    /// Mount a filesystem of `kind` on `path`
    fn mount(&self, kind: MountKind, path: &Path, size: Option<&str>) -> Result<(), SandboxError>;

    /// Unmount `path` and release any backing device
    ///
    /// Must succeed on a path that is no longer mounted.
    fn unmount(&self, path: &Path) -> Result<(), SandboxError>;
}

/// Mount backend that runs the privileged helper
#[derive(Debug, Clone)]
pub struct HelperMount {
    helper: PathBuf,
}

impl HelperMount {
    /// Create a backend for the given helper executable
    pub fn new(helper: impl Into<PathBuf>) -> Self {
        Self {
            helper: helper.into(),
        }
    }

    /// Find `sudo` or `doas`
    fn escalation_tool() -> Option<PathBuf> {
        which::which("sudo").or_else(|_| which::which("doas")).ok()
    }

    /// Command running the helper as root
    fn command(&self, args: &[String]) -> Result<Command, String> {
        let escalate = Self::escalation_tool()
            .ok_or_else(|| "unable to find a privilege escalation tool (sudo or doas)".to_string())?;
        let mut cmd = Command::new(escalate);
        cmd.arg(&self.helper).args(args);
        Ok(cmd)
    }

    fn run(&self, args: &[String]) -> Result<(), String> {
        debug!("Running mount helper {} {}", self.helper.display(), args.join(" "));
        let output = self.command(args)?.output().map_err(|e| e.to_string())?;
        if output.status.success() {
            Ok(())
        } else {
            Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
        }
    }

    /// Helper arguments for a mount request
    pub fn mount_args(kind: MountKind, path: &Path, size: Option<&str>) -> Vec<String> {
        let mut args = vec!["mount".to_string(), "--kind".to_string(), kind.to_string()];
        if let Some(size) = size {
            args.push("--size".to_string());
            args.push(size.to_string());
        }
        args.push(path.display().to_string());
        args
    }

    /// Helper arguments for an unmount request
    pub fn unmount_args(path: &Path) -> Vec<String> {
        vec!["unmount".to_string(), path.display().to_string()]
    }
}

impl Default for HelperMount {
    fn default() -> Self {
        Self::new(DEFAULT_MOUNT_HELPER)
    }
}

impl MountBackend for HelperMount {
    fn mount(&self, kind: MountKind, path: &Path, size: Option<&str>) -> Result<(), SandboxError> {
        self.run(&Self::mount_args(kind, path, size))
            .map_err(|error| SandboxError::Mount {
                kind: kind.to_string(),
                path: path.to_path_buf(),
                error,
            })
    }

    fn unmount(&self, path: &Path) -> Result<(), SandboxError> {
        self.run(&Self::unmount_args(path))
            .map_err(|error| SandboxError::Unmount {
                path: path.to_path_buf(),
                error,
            })
    }
}

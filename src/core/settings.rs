//! Run settings
//!
//! Settings come from an optional TOML file, overridden by command-line
//! flags, and are validated into a [`Settings`] value that the rest of the
//! program reads.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::defaults::{
    DEFAULT_BUILD_TOOL, DEFAULT_CHECKVERS, DEFAULT_FIX_ATTEMPTS, DEFAULT_MOUNT_HELPER,
    DEFAULT_SHELL, KNOWN_ARCHS,
};
use crate::core::sync::{CommitStrategy, FailurePolicy, Remote, RemoteStrategy, SyncConfig};
use crate::error::ConfigError;
use crate::infra::mount::MountKind;

/// Contents of the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// The collection carries local modifications
    pub mods: Option<bool>,

    /// Package collection settings
    #[serde(default)]
    pub collection: CollectionConfig,

    /// Sandbox filesystem settings
    #[serde(default)]
    pub mount: MountConfig,

    /// Version-control settings
    #[serde(default)]
    pub git: GitConfig,

    /// External tool locations
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Package collection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionConfig {
    /// Path to the collection checkout
    pub path: Option<PathBuf>,

    /// Architecture of the build host
    pub host_arch: Option<String>,
}

/// Sandbox filesystem settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MountConfig {
    /// Filesystem for packages without their own entry
    pub default: Option<MountKind>,

    /// Size of the default filesystem
    pub size: Option<String>,

    /// Per-package overrides
    #[serde(default)]
    pub packages: HashMap<String, PackageMount>,
}

/// Sandbox filesystem for one package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageMount {
    pub kind: MountKind,
    pub size: Option<String>,
}

/// Version-control settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitConfig {
    pub enable: Option<bool>,
    pub branch: Option<String>,
    pub with_remote: Option<bool>,
    pub remote_name: Option<String>,
    pub remote_branch: Option<String>,
    pub remote_strategy: Option<RemoteStrategy>,
    pub commit_strategy: Option<CommitStrategy>,
    pub fail: Option<FailurePolicy>,
    pub fix_attempts: Option<u32>,
}

/// External tool locations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    pub build: Option<PathBuf>,
    pub checkvers: Option<PathBuf>,
    pub mount_helper: Option<PathBuf>,
    pub shell: Option<String>,
}

impl ConfigFile {
    /// Load the config file at `path`
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            error: e.to_string(),
        })
    }

    /// Load the first config file found
    ///
    /// An explicitly named file must exist. Otherwise each candidate is
    /// tried in order, and no file at all yields the defaults.
    pub fn locate(explicit: Option<&Path>, candidates: &[PathBuf]) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }
        for path in candidates {
            if path.is_file() {
                debug!("Using config file {}", path.display());
                return Self::load_from_path(path);
            }
        }
        Ok(Self::default())
    }
}

/// Values given on the command line, taking precedence over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub collection: Option<PathBuf>,
    pub target_arch: Option<String>,
    pub host_arch: Option<String>,
    /// `--mods` was passed
    pub mods: bool,
    /// A git range was requested
    pub git_requested: bool,
}

/// Sandbox filesystem choice per package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountPolicy {
    pub default: MountKind,
    pub size: Option<String>,
    pub packages: HashMap<String, PackageMount>,
}

impl MountPolicy {
    /// Filesystem and size for building `name`
    pub fn for_package(&self, name: &str) -> (MountKind, Option<&str>) {
        match self.packages.get(name) {
            Some(mount) => (mount.kind, mount.size.as_deref()),
            None => (self.default, self.size.as_deref()),
        }
    }
}

/// External tools
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tools {
    pub build: PathBuf,
    pub checkvers: PathBuf,
    pub mount_helper: PathBuf,
    pub shell: String,
}

/// Validated settings of a run
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root of the package collection
    pub collection: PathBuf,
    /// Architecture packages are built for
    pub target_arch: String,
    /// Architecture of the build host
    pub host_arch: String,
    /// The collection carries local modifications
    pub mods: bool,
    pub mounts: MountPolicy,
    /// Synchronization settings, when git is enabled
    pub git: Option<SyncConfig>,
    pub tools: Tools,
}

impl Settings {
    /// Merge `file` and `overrides` and validate the result
    pub fn resolve(file: ConfigFile, overrides: &Overrides) -> Result<Self, ConfigError> {
        let collection = overrides
            .collection
            .clone()
            .or(file.collection.path)
            .ok_or_else(|| ConfigError::Missing {
                key: "collection.path".to_string(),
            })?;

        let explicit_host = overrides.host_arch.clone().or(file.collection.host_arch);
        let host_explicit = explicit_host.is_some();
        let mut host_arch = explicit_host.unwrap_or_else(detect_host_arch);
        let target_arch = overrides
            .target_arch
            .clone()
            .unwrap_or_else(|| host_arch.clone());

        if !host_explicit && target_arch.ends_with("-musl") && !host_arch.ends_with("-musl") {
            host_arch.push_str("-musl");
        }
        validate_arch(&target_arch)?;
        validate_arch(&host_arch)?;

        let mods = if overrides.mods {
            true
        } else if let Some(mods) = file.mods {
            mods
        } else {
            warn!("Assuming there are no local modifications to the collection");
            false
        };

        let git = resolve_git(file.git, mods)?;
        if overrides.git_requested && git.is_none() {
            return Err(ConfigError::Invalid {
                message: "git commits were requested but git is disabled".to_string(),
            });
        }

        let mounts = MountPolicy {
            default: file.mount.default.unwrap_or_default(),
            size: file.mount.size,
            packages: file.mount.packages,
        };

        let tools = Tools {
            build: file
                .tools
                .build
                .unwrap_or_else(|| PathBuf::from(DEFAULT_BUILD_TOOL)),
            checkvers: file
                .tools
                .checkvers
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CHECKVERS)),
            mount_helper: file
                .tools
                .mount_helper
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MOUNT_HELPER)),
            shell: file.tools.shell.unwrap_or_else(|| DEFAULT_SHELL.to_string()),
        };

        debug!("Building for {target_arch} on {host_arch} in {}", collection.display());
        Ok(Self {
            collection,
            target_arch,
            host_arch,
            mods,
            mounts,
            git,
            tools,
        })
    }
}

fn resolve_git(git: GitConfig, mods: bool) -> Result<Option<SyncConfig>, ConfigError> {
    if !git.enable.unwrap_or(false) {
        return Ok(None);
    }

    let remote = if git.with_remote.unwrap_or(false) {
        let name = git.remote_name.ok_or_else(|| ConfigError::Missing {
            key: "git.remote_name".to_string(),
        })?;
        let branch = git.remote_branch.ok_or_else(|| ConfigError::Missing {
            key: "git.remote_branch".to_string(),
        })?;
        Some(Remote { name, branch })
    } else {
        None
    };

    let fix_attempts = git.fix_attempts.unwrap_or(DEFAULT_FIX_ATTEMPTS);
    if fix_attempts == 0 {
        return Err(ConfigError::Invalid {
            message: "git.fix_attempts must be at least 1".to_string(),
        });
    }

    let (remote_default, commit_default) = if mods {
        (RemoteStrategy::Rebase, CommitStrategy::Rebase)
    } else {
        (RemoteStrategy::Ff, CommitStrategy::Checkout)
    };

    Ok(Some(SyncConfig {
        branch: git.branch.unwrap_or_else(|| "master".to_string()),
        remote,
        remote_strategy: git.remote_strategy.unwrap_or(remote_default),
        commit_strategy: git.commit_strategy.unwrap_or(commit_default),
        on_failure: git.fail.unwrap_or_default(),
        fix_attempts,
    }))
}

/// Whether the build tool knows `arch`
pub fn is_known_arch(arch: &str) -> bool {
    KNOWN_ARCHS.contains(&arch)
        || arch
            .strip_suffix("-musl")
            .is_some_and(|base| KNOWN_ARCHS.contains(&base))
}

fn validate_arch(arch: &str) -> Result<(), ConfigError> {
    if is_known_arch(arch) {
        Ok(())
    } else {
        Err(ConfigError::UnknownArch {
            arch: arch.to_string(),
        })
    }
}

/// Architecture name of the running machine
pub fn detect_host_arch() -> String {
    let arch = match std::env::consts::ARCH {
        "x86" => "i686",
        "arm" => "armv7l",
        "powerpc" => "ppc",
        "powerpc64" if cfg!(target_endian = "little") => "ppc64le",
        "powerpc64" => "ppc64",
        other => other,
    };
    if cfg!(target_env = "musl") {
        format!("{arch}-musl")
    } else {
        arch.to_string()
    }
}

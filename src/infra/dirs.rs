//! Config file locations
//!
//! `vxb.toml` in the working directory wins over the per-user file. The
//! per-user directory follows XDG on Linux and can be overridden with
//! `VXB_CONFIG_DIR`.

use std::env;
use std::path::{Path, PathBuf};

use crate::config::defaults::LOCAL_CONFIG_FILE;

/// Environment variable overriding the per-user config directory
pub const ENV_CONFIG_DIR: &str = "VXB_CONFIG_DIR";

/// Application name used in directory paths
const APP_NAME: &str = "vxb";

/// Per-user config file name
const USER_CONFIG_FILE: &str = "config.toml";

/// Directory provider for vxb
#[derive(Debug, Clone)]
pub struct VxbDirs {
    config_dir: PathBuf,
}

impl VxbDirs {
    /// Resolve directories from the environment or platform defaults
    #[must_use]
    pub fn new() -> Self {
        Self {
            config_dir: Self::resolve_config_dir(),
        }
    }

    /// Per-user config directory
    ///
    /// - Linux: `$XDG_CONFIG_HOME/vxb` or `~/.config/vxb`
    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Per-user config file
    #[must_use]
    pub fn user_config_path(&self) -> PathBuf {
        self.config_dir.join(USER_CONFIG_FILE)
    }

    /// Config files to try, most specific first
    #[must_use]
    pub fn config_candidates(&self, working_dir: &Path) -> Vec<PathBuf> {
        vec![working_dir.join(LOCAL_CONFIG_FILE), self.user_config_path()]
    }

    fn resolve_config_dir() -> PathBuf {
        if let Ok(path) = env::var(ENV_CONFIG_DIR) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .map(|h| h.join(".config").join(APP_NAME))
                    .unwrap_or_else(|| PathBuf::from(".").join(".config").join(APP_NAME))
            })
    }
}

impl Default for VxbDirs {
    fn default() -> Self {
        Self::new()
    }
}

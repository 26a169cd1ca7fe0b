//! CLI command implementations
//!
//! Each command is implemented in its own submodule. The argument groups and
//! the wiring from settings to components are shared here.

pub mod build;
pub mod changed;
pub mod clean;
pub mod graph;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::config::defaults::DEFAULT_DOT_FILE;
use crate::core::settings::{ConfigFile, Overrides, Settings};
use crate::core::sync::GitSync;
use crate::infra::checkvers::VersionOracle;
use crate::infra::dirs::VxbDirs;
use crate::infra::git::{GitCli, InteractiveShell};
use crate::infra::mount::HelperMount;
use crate::infra::sandbox::SandboxManager;
use crate::infra::xbps_src::BuildTool;

/// Options shared by every command
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    /// Explicit config file
    pub config: Option<PathBuf>,
    /// Suppress progress output
    pub quiet: bool,
}

/// Where the collection is and what the host is
#[derive(Args, Debug, Clone, Default)]
pub struct CollectionArgs {
    /// Path to the package collection checkout
    #[arg(long, value_name = "PATH")]
    pub vpkg: Option<PathBuf>,

    /// Architecture of the build host (detected if not given)
    #[arg(short = 'm', long = "host-arch", value_name = "ARCH")]
    pub host_arch: Option<String>,

    /// The collection carries local modifications
    #[arg(short = 'd', long)]
    pub mods: bool,
}

/// Which packages to work on
#[derive(Args, Debug, Clone)]
pub struct SelectionArgs {
    /// Architecture to build for
    #[arg(short, long, value_name = "ARCH")]
    pub arch: String,

    /// Use packages changed in a git range: `A...B`, `A` (to the remote), or
    /// nothing (HEAD to the remote)
    #[arg(short, long, value_name = "RANGE", num_args = 0..=1, default_missing_value = "")]
    pub git: Option<String>,

    /// Packages to build (narrows the git change set when both are given)
    pub packages: Vec<String>,

    /// Where to write the build graph
    #[arg(long, value_name = "FILE", default_value = DEFAULT_DOT_FILE)]
    pub dot: PathBuf,

    #[command(flatten)]
    pub collection: CollectionArgs,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the selected packages and everything they need
    Build(SelectionArgs),

    /// Write the build graph without building
    Graph(SelectionArgs),

    /// List packages that changed in a git range
    Changed {
        /// Architecture to check
        #[arg(short, long, value_name = "ARCH")]
        arch: String,

        /// `A...B`, `A` (to the remote), or nothing (HEAD to the remote)
        range: Option<String>,

        /// Print a JSON array instead of one name per line
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        collection: CollectionArgs,
    },

    /// Remove a sandbox left behind by an interrupted run
    Clean {
        #[command(flatten)]
        collection: CollectionArgs,
    },
}

impl Commands {
    /// Execute the command
    pub async fn run(self, global: &GlobalOptions) -> Result<()> {
        match self {
            Self::Build(selection) => build::execute(global, &selection).await,
            Self::Graph(selection) => graph::execute(global, &selection).await,
            Self::Changed {
                arch,
                range,
                json,
                collection,
            } => changed::execute(global, &collection, &arch, range.as_deref(), json).await,
            Self::Clean { collection } => clean::execute(global, &collection),
        }
    }
}

/// Load the config file and apply command-line overrides
pub fn load_settings(
    global: &GlobalOptions,
    collection: &CollectionArgs,
    target_arch: Option<&str>,
    git_requested: bool,
) -> Result<Settings> {
    let working_dir = std::env::current_dir().context("Failed to get current directory")?;
    let candidates = VxbDirs::new().config_candidates(&working_dir);
    let file = ConfigFile::locate(global.config.as_deref(), &candidates)?;

    let overrides = Overrides {
        collection: collection.vpkg.clone(),
        target_arch: target_arch.map(str::to_string),
        host_arch: collection.host_arch.clone(),
        mods: collection.mods,
        git_requested,
    };
    Ok(Settings::resolve(file, &overrides)?)
}

/// The external tools wired up from settings
#[derive(Debug, Clone)]
pub struct Toolset {
    pub tool: BuildTool,
    pub manager: SandboxManager,
    pub oracle: VersionOracle,
}

impl Toolset {
    /// Create the tools for the configured collection
    pub fn new(settings: &Settings) -> Self {
        let tool = BuildTool::new(&settings.collection, &settings.host_arch)
            .with_program(&settings.tools.build);
        let manager = SandboxManager::new(
            tool.clone(),
            Arc::new(HelperMount::new(&settings.tools.mount_helper)),
        );
        let oracle =
            VersionOracle::new(&settings.collection).with_program(&settings.tools.checkvers);
        Self {
            tool,
            manager,
            oracle,
        }
    }
}

/// Synchronization session for the collection's repository
pub fn git_sync(settings: &Settings) -> Result<GitSync<GitCli, InteractiveShell>> {
    let config = settings
        .git
        .clone()
        .context("Git is not enabled in the configuration")?;
    Ok(GitSync::new(
        GitCli::new(&settings.collection),
        InteractiveShell::new(&settings.tools.shell),
        config,
    ))
}

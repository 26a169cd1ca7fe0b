//! Error types for vxb
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

/// Failures while retrieving or parsing package metadata
#[derive(Error, Debug)]
pub enum IntrospectionError {
    /// The metadata dump could not be produced
    #[error("Failed to dump metadata for '{package}': {source}")]
    DumpFailed {
        package: String,
        source: BuildToolError,
    },

    /// The metadata dump did not have the expected shape
    #[error("Malformed metadata dump for '{package}': {message}")]
    Malformed { package: String, message: String },

    /// Readiness could not be determined
    #[error("Failed to check readiness of '{package}': {source}")]
    Readiness {
        package: String,
        source: VersionCheckError,
    },

    /// A subpackage link could not be followed
    #[error("Failed to resolve subpackage '{name}' at '{path}': {error}")]
    Subpackage {
        name: String,
        path: PathBuf,
        error: String,
    },
}

/// External build tool failures
#[derive(Error, Debug)]
pub enum BuildToolError {
    /// The build tool could not be started
    #[error("Failed to execute `{command}`: {error}")]
    Spawn { command: String, error: String },

    /// The build tool exited unsuccessfully
    #[error("`{command}` failed with exit code {code:?}")]
    Failed {
        command: String,
        code: Option<i32>,
        output: Vec<u8>,
    },

    /// Output forwarding broke while streaming
    #[error("Failed to forward output of `{command}`: {error}")]
    Forward { command: String, error: String },

    /// The sandbox could not be brought back for the command
    #[error("Build environment unavailable for `{command}`: {message}")]
    Environment { command: String, message: String },
}

impl BuildToolError {
    /// Output captured before the failure, if any
    pub fn output(&self) -> &[u8] {
        match self {
            Self::Failed { output, .. } => output,
            _ => &[],
        }
    }
}

/// Version oracle failures
#[derive(Error, Debug)]
pub enum VersionCheckError {
    /// The version-check tool could not be started
    #[error("Failed to execute `{command}`: {error}")]
    Spawn { command: String, error: String },

    /// The version-check tool exited unsuccessfully
    #[error("`{command}` failed with exit code {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Build sandbox lifecycle errors
#[derive(Error, Debug)]
pub enum SandboxError {
    /// A sandbox is already active
    #[error("A build sandbox is already active at '{path}'")]
    AlreadyActive { path: PathBuf },

    /// The sandbox root could not be created
    #[error("Failed to create sandbox root '{path}': {error}")]
    Prepare { path: PathBuf, error: String },

    /// The memory-backed filesystem could not be mounted
    #[error("Failed to mount {kind} on '{path}': {error}")]
    Mount {
        kind: String,
        path: PathBuf,
        error: String,
    },

    /// The memory-backed filesystem could not be unmounted
    #[error("Failed to unmount '{path}': {error}")]
    Unmount { path: PathBuf, error: String },

    /// The sandbox root could not be deleted
    #[error("Failed to remove sandbox root '{path}': {error}")]
    Remove { path: PathBuf, error: String },

    /// Bootstrapping the sandbox failed
    #[error("Failed to bootstrap sandbox: {0}")]
    Bootstrap(#[from] BuildToolError),
}

/// Dependency graph errors
#[derive(Error, Debug)]
pub enum GraphError {
    /// An edge referenced a node that is not in the graph
    #[error("Package '{package}' is not in the graph")]
    MissingNode { package: String },

    /// An edge would have closed a dependency cycle
    #[error("Circular dependency detected: {from} -> {to}")]
    Cycle { from: String, to: String },
}

/// Version-control synchronization errors
#[derive(Error, Debug)]
pub enum GitError {
    /// git could not be started
    #[error("Failed to execute `{command}`: {error}")]
    Spawn { command: String, error: String },

    /// git exited unsuccessfully
    #[error("`{command}` failed: {output}")]
    Command { command: String, output: String },

    /// A remote was needed but remotes are disabled
    #[error("Git remotes are not enabled; cannot {action}")]
    RemoteDisabled { action: String },

    /// A rebase or merge conflicted and the failure policy is "die"
    #[error("Conflict while {operation}: {cause}")]
    Conflict {
        operation: String,
        cause: Box<GitError>,
    },

    /// The operator gave up fixing a conflict
    #[error("Fixing the {operation} failed: shell exited with code {code:?}")]
    FixAborted {
        operation: String,
        code: Option<i32>,
    },

    /// The conflict was still present after every allowed attempt
    #[error("The {operation} was still in progress after {attempts} fix attempts")]
    FixAttemptsExhausted { operation: String, attempts: u32 },

    /// Too many commits given for a change range
    #[error("At most two commits can be compared, got {count}")]
    TooManyCommits { count: usize },

    /// The starting commit of a change range is not fully built
    #[error("Commit '{commit}' must not have any outdated packages: {}", packages.join(" "))]
    DirtyBaseline {
        commit: String,
        packages: Vec<String>,
    },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file '{path}': {error}")]
    ReadError { path: String, error: String },

    /// Failed to parse config file
    #[error("Failed to parse config file '{path}': {error}")]
    ParseError { path: String, error: String },

    /// A required value is missing
    #[error("Missing configuration value: {key}")]
    Missing { key: String },

    /// A value is not one of the accepted choices
    #[error("'{value}' is not a valid {key} (valid: {})", choices.join(", "))]
    InvalidChoice {
        key: String,
        value: String,
        choices: Vec<String>,
    },

    /// Architecture is not known
    #[error("'{arch}' is not a valid architecture")]
    UnknownArch { arch: String },

    /// Inconsistent settings
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Top-level vxb error type
#[derive(Error, Debug)]
pub enum VxbError {
    /// Introspection error
    #[error("Introspection error: {0}")]
    Introspection(#[from] IntrospectionError),

    /// Build tool error
    #[error("Build tool error: {0}")]
    BuildTool(#[from] BuildToolError),

    /// Version check error
    #[error("Version check error: {0}")]
    VersionCheck(#[from] VersionCheckError),

    /// Sandbox error
    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    /// Graph error
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Git error
    #[error("Git error: {0}")]
    Git(#[from] GitError),

    /// Config error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// A package failed to build
    #[error("Failed to build {package}: {source}")]
    PackageBuild {
        package: String,
        source: Box<VxbError>,
    },
}

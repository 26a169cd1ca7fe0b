//! Package metadata from the collection
//!
//! [`Introspector`] is the [`PackageSource`] backed by the real tools: it
//! dumps a template's metadata with the build tool, asks the version oracle
//! whether the package is current, and maps subpackages to their source
//! package through the `srcpkgs/` symlinks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::defaults::SRCPKGS_DIR;
use crate::core::dump::parse_dump;
use crate::core::graph::PackageSource;
use crate::core::identity::{PackageIdentity, PackageRecord};
use crate::core::versions::{VersionCheck, VersionStatus};
use crate::error::{IntrospectionError, VersionCheckError};
use crate::infra::sandbox::Sandbox;
use crate::infra::xbps_src::{BuildTool, OutputMode};

/// Maps subpackage names to the source package that builds them
#[derive(Debug, Clone)]
pub struct SubpackageResolver {
    srcpkgs: PathBuf,
}

impl SubpackageResolver {
    /// Create a resolver for the collection at `collection`
    pub fn new(collection: &Path) -> Self {
        Self {
            srcpkgs: collection.join(SRCPKGS_DIR),
        }
    }

    /// Source package providing `name`
    ///
    /// A subpackage's template entry is a symlink to its source package;
    /// anything else, including a missing entry, is its own base.
    pub fn resolve(&self, name: &str) -> Result<String, IntrospectionError> {
        let path = self.srcpkgs.join(name);
        let is_link = std::fs::symlink_metadata(&path)
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false);
        if !is_link {
            return Ok(name.to_string());
        }

        let target = std::fs::read_link(&path).map_err(|e| IntrospectionError::Subpackage {
            name: name.to_string(),
            path: path.clone(),
            error: e.to_string(),
        })?;
        let base = target
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| IntrospectionError::Subpackage {
                name: name.to_string(),
                path: path.clone(),
                error: format!("link target '{}' has no package name", target.display()),
            })?;

        debug!("{name} is a subpackage of {base}");
        Ok(base.to_string())
    }
}

/// Package metadata source driving the build tool and version oracle
#[derive(Debug)]
pub struct Introspector<O> {
    tool: BuildTool,
    oracle: O,
    resolver: SubpackageResolver,
    /// Version status per architecture, fetched once per generation
    statuses: HashMap<String, VersionStatus>,
}

impl<O: VersionCheck> Introspector<O> {
    /// Create an introspector for the build tool's collection
    pub fn new(tool: BuildTool, oracle: O) -> Self {
        let resolver = SubpackageResolver::new(tool.collection());
        Self {
            tool,
            oracle,
            resolver,
            statuses: HashMap::new(),
        }
    }

    /// Version status for `arch`, queried on first use
    async fn status(&mut self, arch: &str) -> Result<&VersionStatus, VersionCheckError> {
        if !self.statuses.contains_key(arch) {
            let status = self.oracle.status(arch).await?;
            self.statuses.insert(arch.to_string(), status);
        }
        Ok(&self.statuses[arch])
    }
}

impl<O: VersionCheck> PackageSource for Introspector<O> {
    async fn introspect(
        &mut self,
        sandbox: &mut Sandbox,
        id: &PackageIdentity,
    ) -> Result<PackageRecord, IntrospectionError> {
        let output = self
            .tool
            .run(sandbox, &["dbulk-dump", &id.name], &id.arch, OutputMode::Buffered)
            .await
            .map_err(|source| IntrospectionError::DumpFailed {
                package: id.to_string(),
                source,
            })?;

        let mut record = parse_dump(&id.name, &String::from_utf8_lossy(&output))?;
        record.ready = self
            .status(&id.arch)
            .await
            .map_err(|source| IntrospectionError::Readiness {
                package: id.to_string(),
                source,
            })?
            .is_ready(&id.name);

        debug!(
            "{id}: {} host, {} make, {} run dependencies, ready: {}",
            record.hostmakedepends.len(),
            record.makedepends.len(),
            record.depends.len(),
            record.ready
        );
        Ok(record)
    }

    fn base_package(&self, name: &str) -> Result<String, IntrospectionError> {
        self.resolver.resolve(name)
    }
}

//! Building one package in a fresh sandbox

use tracing::debug;

use crate::core::identity::PackageIdentity;
use crate::core::scheduler::PackageBuilder;
use crate::core::settings::MountPolicy;
use crate::error::VxbError;
use crate::infra::sandbox::SandboxManager;
use crate::infra::xbps_src::{BuildTool, OutputMode};

/// Builds each package in its own sandbox with live output
#[derive(Debug, Clone)]
pub struct SandboxBuilder {
    tool: BuildTool,
    manager: SandboxManager,
    mounts: MountPolicy,
}

impl SandboxBuilder {
    /// Create a builder
    pub fn new(tool: BuildTool, manager: SandboxManager, mounts: MountPolicy) -> Self {
        Self {
            tool,
            manager,
            mounts,
        }
    }
}

impl PackageBuilder for SandboxBuilder {
    async fn build(&mut self, id: &PackageIdentity) -> Result<(), VxbError> {
        let (kind, size) = self.mounts.for_package(&id.name);
        debug!("Building {id} in a {kind} sandbox");

        let mut sandbox = self.manager.create(kind, size).await?;
        self.tool
            .run(&mut sandbox, &["pkg", "-N", &id.name], &id.arch, OutputMode::Streamed)
            .await?;
        sandbox.remove()?;
        Ok(())
    }
}

//! Build command implementation
//!
//! Implements `vxb build`: plans like `vxb graph`, then builds every package
//! in dependency order.

use anyhow::{Context, Result};

use super::graph::{plan, Planned};
use super::{GlobalOptions, SelectionArgs};
use crate::cli::output::status;
use crate::core::scheduler::BuildScheduler;
use crate::infra::pkg_build::SandboxBuilder;

/// Execute the build command
pub async fn execute(global: &GlobalOptions, selection: &SelectionArgs) -> Result<()> {
    let Some(Planned {
        settings,
        tools,
        mut graph,
    }) = plan(global, selection).await?
    else {
        return Ok(());
    };

    let builder = SandboxBuilder::new(tools.tool, tools.manager, settings.mounts);
    let built = BuildScheduler::new(builder)
        .run(&mut graph)
        .await
        .context("Build failed")?;

    if !global.quiet {
        println!("{} Built {} packages", status::SUCCESS, built.len());
    }
    Ok(())
}

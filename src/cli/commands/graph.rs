//! Graph command implementation
//!
//! Implements `vxb graph`: selects packages, generates the dependency graph
//! and writes it as a DOT file. `vxb build` starts the same way.

use anyhow::{bail, Context, Result};
use tracing::info;

use super::{git_sync, load_settings, GlobalOptions, SelectionArgs, Toolset};
use crate::cli::output::{create_spinner, status};
use crate::core::dot;
use crate::core::graph::{DependencyGraph, GraphBuilder};
use crate::core::selection::select_packages;
use crate::core::settings::Settings;
use crate::core::sync::parse_range;
use crate::infra::introspect::Introspector;

/// A generated graph with what is needed to act on it
pub struct Planned {
    pub settings: Settings,
    pub tools: Toolset,
    pub graph: DependencyGraph,
}

/// Select packages, generate their graph and write it to the DOT file
///
/// Returns `None` when the selection is empty.
pub async fn plan(global: &GlobalOptions, selection: &SelectionArgs) -> Result<Option<Planned>> {
    if selection.packages.is_empty() && selection.git.is_none() {
        bail!("No packages given; name some packages or use --git");
    }

    let settings = load_settings(
        global,
        &selection.collection,
        Some(&selection.arch),
        selection.git.is_some(),
    )?;
    let mut tools = Toolset::new(&settings);

    let changed = match &selection.git {
        Some(range) => {
            let commits = parse_range(Some(range));
            let mut sync = git_sync(&settings)?;
            let changed = sync
                .changed(&mut tools.oracle, &settings.target_arch, &commits)
                .await
                .context("Failed to compute changed packages")?;
            Some(changed)
        }
        None => None,
    };

    let names = select_packages(changed, &selection.packages);
    if names.is_empty() {
        info!("Nothing to do");
        return Ok(None);
    }
    info!("Selected packages: {}", names.join(" "));

    let spinner = create_spinner("Generating graph...", global.quiet);
    let (kind, size) = (settings.mounts.default, settings.mounts.size.clone());
    let introspector = Introspector::new(tools.tool.clone(), tools.oracle.clone());
    let result = GraphBuilder::new(introspector, &settings.host_arch)
        .generate(
            &tools.manager,
            kind,
            size.as_deref(),
            &names,
            &settings.target_arch,
        )
        .await;
    spinner.finish_and_clear();
    let graph = result.context("Failed to generate the build graph")?;

    dot::write(&graph, &selection.dot)
        .with_context(|| format!("Failed to write {}", selection.dot.display()))?;
    info!("Wrote build graph to {}", selection.dot.display());

    Ok(Some(Planned {
        settings,
        tools,
        graph,
    }))
}

/// Execute the graph command
pub async fn execute(global: &GlobalOptions, selection: &SelectionArgs) -> Result<()> {
    let Some(planned) = plan(global, selection).await? else {
        return Ok(());
    };

    if !global.quiet {
        println!(
            "{} {} packages to build, graph written to {}",
            status::SUCCESS,
            planned.graph.len(),
            selection.dot.display()
        );
    }
    Ok(())
}

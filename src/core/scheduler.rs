//! Dependency-ordered builds
//!
//! Walks the graph depth-first from every root and builds each package only
//! after all of its dependencies are ready.

use tracing::info;

use crate::core::graph::DependencyGraph;
use crate::core::identity::PackageIdentity;
use crate::error::VxbError;

/// Builds a single package
#[allow(async_fn_in_trait)]
pub trait PackageBuilder {
    /// Build `id`; its dependencies are already ready
    async fn build(&mut self, id: &PackageIdentity) -> Result<(), VxbError>;
}

/// Runs a [`PackageBuilder`] over a dependency graph
#[derive(Debug)]
pub struct BuildScheduler<B> {
    builder: B,
}

impl<B: PackageBuilder> BuildScheduler<B> {
    /// Create a scheduler
    pub fn new(builder: B) -> Self {
        Self { builder }
    }

    /// The underlying builder
    pub fn builder(&self) -> &B {
        &self.builder
    }

    /// Build every package in `graph` that is not ready yet
    ///
    /// Returns the identities built, in build order. Stops at the first
    /// failure; packages built before it stay marked ready.
    pub async fn run(
        &mut self,
        graph: &mut DependencyGraph,
    ) -> Result<Vec<PackageIdentity>, VxbError> {
        let roots: Vec<PackageIdentity> = graph.roots().into_iter().cloned().collect();
        let mut built = Vec::new();

        for root in roots {
            // Each frame is a node and the index of its next dependency
            let mut stack = vec![(root, 0_usize)];

            while let Some((node, next)) = stack.pop() {
                if graph.is_ready(&node) {
                    continue;
                }

                if let Some(dep) = graph.dependencies(&node).get(next).cloned() {
                    stack.push((node, next + 1));
                    if !graph.is_ready(&dep) {
                        stack.push((dep, 0));
                    }
                    continue;
                }

                info!("Building {node}");
                self.builder
                    .build(&node)
                    .await
                    .map_err(|e| VxbError::PackageBuild {
                        package: node.to_string(),
                        source: Box::new(e),
                    })?;
                graph.mark_ready(&node);
                built.push(node);
            }
        }

        Ok(built)
    }
}

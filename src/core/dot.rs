//! Graphviz rendering of the build graph
//!
//! Every root hangs off a synthetic `base` node. Below each root the edges
//! are written depth-first, expanding each package only once.

use std::collections::HashSet;
use std::path::Path;

use crate::core::graph::DependencyGraph;
use crate::core::identity::PackageIdentity;

/// Render `graph` in DOT format
pub fn render(graph: &DependencyGraph) -> String {
    let mut out = String::from("digraph {\n");
    let mut expanded = HashSet::new();

    for root in graph.roots() {
        out.push_str(&format!("base -> \"{root}\"\n"));

        let mut stack: Vec<&PackageIdentity> = vec![root];
        while let Some(node) = stack.pop() {
            if !expanded.insert(node) {
                continue;
            }
            let deps = graph.dependencies(node);
            for dep in deps {
                out.push_str(&format!("\"{node}\" -> \"{dep}\"\n"));
            }
            // Reversed so the first dependency is expanded first
            stack.extend(deps.iter().rev());
        }
    }

    out.push_str("}\n");
    out
}

/// Write the DOT rendering of `graph` to `path`
pub fn write(graph: &DependencyGraph, path: &Path) -> std::io::Result<()> {
    std::fs::write(path, render(graph))
}

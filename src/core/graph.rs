//! Dependency graph construction
//!
//! A [`DependencyGraph`] holds one node per [`PackageIdentity`] that still
//! has to be built. An edge `A -> B` means `B` must be built before `A`.
//! Packages that are already current in the repository never become nodes.
//!
//! [`GraphBuilder`] grows the graph from a set of requested names, asking a
//! [`PackageSource`] for each identity's metadata. Dependencies of a
//! cross-built package are split: host build dependencies are built for the
//! host, everything else for the target.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, info};

use crate::core::identity::{PackageIdentity, PackageRecord};
use crate::error::{GraphError, IntrospectionError, VxbError};
use crate::infra::mount::MountKind;
use crate::infra::sandbox::{Sandbox, SandboxManager};

/// Directed acyclic graph of packages to build
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Nodes in insertion order
    order: Vec<PackageIdentity>,
    /// Adjacency list: package -> dependencies, in insertion order
    edges: HashMap<PackageIdentity, Vec<PackageIdentity>>,
    /// Introspected metadata of every node
    records: HashMap<PackageIdentity, PackageRecord>,
}

impl DependencyGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; returns `false` if it was already present
    pub fn insert(&mut self, id: PackageIdentity, record: PackageRecord) -> bool {
        if self.records.contains_key(&id) {
            return false;
        }
        self.order.push(id.clone());
        self.edges.insert(id.clone(), Vec::new());
        self.records.insert(id, record);
        true
    }

    /// Whether `id` is a node
    pub fn contains(&self, id: &PackageIdentity) -> bool {
        self.records.contains_key(id)
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// All nodes in insertion order
    pub fn nodes(&self) -> &[PackageIdentity] {
        &self.order
    }

    /// Number of edges
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    /// Direct dependencies of `id`, in insertion order
    pub fn dependencies(&self, id: &PackageIdentity) -> &[PackageIdentity] {
        self.edges.get(id).map_or(&[], Vec::as_slice)
    }

    /// Add the edge `from -> to`
    ///
    /// Returns `false` when nothing was added: the edge already exists or
    /// both ends are the same node. Both nodes must exist, and the edge must
    /// not close a cycle.
    pub fn add_edge(
        &mut self,
        from: &PackageIdentity,
        to: &PackageIdentity,
    ) -> Result<bool, GraphError> {
        for id in [from, to] {
            if !self.contains(id) {
                return Err(GraphError::MissingNode {
                    package: id.to_string(),
                });
            }
        }
        if from == to || self.dependencies(from).contains(to) {
            return Ok(false);
        }
        if self.reaches(to, from) {
            return Err(GraphError::Cycle {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        self.edges.entry(from.clone()).or_default().push(to.clone());
        Ok(true)
    }

    /// Whether `goal` is reachable from `start`
    fn reaches(&self, start: &PackageIdentity, goal: &PackageIdentity) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if id == goal {
                return true;
            }
            if seen.insert(id) {
                stack.extend(self.dependencies(id));
            }
        }
        false
    }

    /// Nodes nothing depends on, in insertion order
    pub fn roots(&self) -> Vec<&PackageIdentity> {
        let targets: HashSet<&PackageIdentity> = self.edges.values().flatten().collect();
        self.order.iter().filter(|id| !targets.contains(id)).collect()
    }

    /// Metadata of a node
    pub fn record(&self, id: &PackageIdentity) -> Option<&PackageRecord> {
        self.records.get(id)
    }

    /// Whether a node has been built (or was current to begin with)
    pub fn is_ready(&self, id: &PackageIdentity) -> bool {
        self.records.get(id).is_some_and(|r| r.ready)
    }

    /// Record a successful build of `id`
    pub fn mark_ready(&mut self, id: &PackageIdentity) {
        if let Some(record) = self.records.get_mut(id) {
            record.ready = true;
        }
    }
}

/// Result of offering an identity to the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new node was created; its dependencies still need resolving
    Added,
    /// The node existed already
    AlreadyInGraph,
    /// The package is current in the repository and needs no node
    AlreadySatisfied,
}

/// Provider of package metadata
#[allow(async_fn_in_trait)]
pub trait PackageSource {
    /// Dependencies, subpackages and readiness of `id`
    async fn introspect(
        &mut self,
        sandbox: &mut Sandbox,
        id: &PackageIdentity,
    ) -> Result<PackageRecord, IntrospectionError>;

    /// Buildable source package providing `name`
    fn base_package(&self, name: &str) -> Result<String, IntrospectionError>;
}

/// Builds a [`DependencyGraph`] from requested package names
#[derive(Debug)]
pub struct GraphBuilder<S> {
    source: S,
    host_arch: String,
    graph: DependencyGraph,
    /// Records of packages found current, so they are asked about once
    satisfied: HashMap<PackageIdentity, PackageRecord>,
    /// Nodes whose dependencies have been resolved
    resolved: HashSet<PackageIdentity>,
}

impl<S: PackageSource> GraphBuilder<S> {
    /// Create a builder for the given host architecture
    pub fn new(source: S, host_arch: impl Into<String>) -> Self {
        Self {
            source,
            host_arch: host_arch.into(),
            graph: DependencyGraph::new(),
            satisfied: HashMap::new(),
            resolved: HashSet::new(),
        }
    }

    /// Graph built so far
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Metadata source
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Offer `id` to the graph, introspecting it if it is new
    pub async fn add_package(
        &mut self,
        sandbox: &mut Sandbox,
        id: &PackageIdentity,
    ) -> Result<AddOutcome, IntrospectionError> {
        if self.graph.contains(id) {
            return Ok(AddOutcome::AlreadyInGraph);
        }
        if self.satisfied.contains_key(id) {
            return Ok(AddOutcome::AlreadySatisfied);
        }

        let record = self.source.introspect(sandbox, id).await?;
        if record.ready {
            debug!("{id} is already current");
            self.satisfied.insert(id.clone(), record);
            return Ok(AddOutcome::AlreadySatisfied);
        }

        debug!("Graphing {id}");
        self.graph.insert(id.clone(), record);
        Ok(AddOutcome::Added)
    }

    /// Pull the dependencies of `id`, and of everything they add, into the graph
    pub async fn resolve_dependencies(
        &mut self,
        sandbox: &mut Sandbox,
        id: &PackageIdentity,
    ) -> Result<(), VxbError> {
        let mut queue = VecDeque::from([id.clone()]);

        while let Some(current) = queue.pop_front() {
            if !self.resolved.insert(current.clone()) {
                continue;
            }

            for dep in self.dependency_identities(&current)? {
                match self.add_package(sandbox, &dep).await? {
                    AddOutcome::AlreadySatisfied => {}
                    AddOutcome::AlreadyInGraph => {
                        self.graph.add_edge(&current, &dep)?;
                    }
                    AddOutcome::Added => {
                        self.graph.add_edge(&current, &dep)?;
                        queue.push_back(dep);
                    }
                }
            }
        }
        Ok(())
    }

    /// Dependencies of a node tagged with the architecture they are built for
    fn dependency_identities(
        &self,
        id: &PackageIdentity,
    ) -> Result<Vec<PackageIdentity>, VxbError> {
        let record = self
            .graph
            .record(id)
            .ok_or_else(|| GraphError::MissingNode {
                package: id.to_string(),
            })?;

        let buckets: Vec<(&str, Vec<&String>)> = if id.arch == self.host_arch {
            let all = record
                .hostmakedepends
                .iter()
                .chain(&record.makedepends)
                .chain(&record.depends)
                .collect();
            vec![(id.arch.as_str(), all)]
        } else {
            let target = record.makedepends.iter().chain(&record.depends).collect();
            vec![
                (self.host_arch.as_str(), record.hostmakedepends.iter().collect()),
                (id.arch.as_str(), target),
            ]
        };

        let mut identities = Vec::new();
        for (arch, names) in buckets {
            let mut seen = HashSet::new();
            for name in names {
                let base = self.source.base_package(name)?;
                if seen.insert(base.clone()) {
                    identities.push(PackageIdentity::new(base, arch));
                }
            }
        }
        debug!(
            "{id} depends on: {}",
            identities
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ")
        );
        Ok(identities)
    }

    /// Add every requested package for `target_arch` with its dependencies
    pub async fn populate(
        &mut self,
        sandbox: &mut Sandbox,
        names: &[String],
        target_arch: &str,
    ) -> Result<(), VxbError> {
        for name in names {
            let id = PackageIdentity::new(name.as_str(), target_arch);
            match self.add_package(sandbox, &id).await? {
                AddOutcome::Added => self.resolve_dependencies(sandbox, &id).await?,
                AddOutcome::AlreadyInGraph | AddOutcome::AlreadySatisfied => {}
            }
        }
        Ok(())
    }

    /// Generate the graph inside a sandbox acquired for the whole run
    pub async fn generate(
        mut self,
        manager: &SandboxManager,
        mount: MountKind,
        size: Option<&str>,
        names: &[String],
        target_arch: &str,
    ) -> Result<DependencyGraph, VxbError> {
        let mut sandbox = manager.create(mount, size).await?;
        // On error the sandbox is dropped, which removes it
        self.populate(&mut sandbox, names, target_arch).await?;
        sandbox.remove()?;

        info!(
            "Graph has {} packages and {} dependencies",
            self.graph.len(),
            self.graph.edge_count()
        );
        Ok(self.graph)
    }
}

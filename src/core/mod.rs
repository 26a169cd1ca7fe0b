//! Core build logic
//!
//! Types and algorithms of a build run. External programs are reached only
//! through the traits defined here and implemented in [`crate::infra`].
//!
//! # Submodules
//!
//! - [`identity`] - Package identities and dependency classes
//! - [`dump`] - Parsing of build template dumps
//! - [`versions`] - Version status of a collection
//! - [`graph`] - Dependency graph and its generation
//! - [`scheduler`] - Dependency-ordered builds
//! - [`dot`] - Graphviz rendering of the graph
//! - [`sync`] - Git synchronization and change detection
//! - [`selection`] - Which packages a run works on
//! - [`settings`] - Config file and resolved settings

pub mod dot;
pub mod dump;
pub mod graph;
pub mod identity;
pub mod scheduler;
pub mod selection;
pub mod settings;
pub mod sync;
pub mod versions;

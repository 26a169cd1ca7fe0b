//! vxb - cross-architecture package collection builder
//!
//! This library drives a void-packages checkout: it finds out which packages
//! need building, orders them by dependency and builds each one in a fresh
//! sandbox.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Graph, scheduling and synchronization logic
//! - [`infra`] - Infrastructure layer (filesystem, processes, git)
//! - [`config`] - Configuration constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;

//! Infrastructure layer
//!
//! Handles all I/O: the filesystem, the collection's build tool, the version
//! checker, git and the mount helper.

pub mod checkvers;
pub mod dirs;
pub mod git;
pub mod introspect;
pub mod mount;
pub mod pkg_build;
pub mod sandbox;
pub mod xbps_src;

//! Package identities and introspected records
//!
//! A [`PackageIdentity`] is the `(name, architecture)` key of a graph node.
//! It renders as `name@arch` but is never parsed back from that form.

use std::fmt;

/// A package built for one architecture
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageIdentity {
    /// Source package name
    pub name: String,
    /// Architecture the package is produced for
    pub arch: String,
}

impl PackageIdentity {
    /// Create a new identity
    pub fn new(name: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arch: arch.into(),
        }
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.arch)
    }
}

/// Metadata gathered for one identity
///
/// Everything except `ready` is fixed once introspection produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageRecord {
    /// Dependencies that run on the build host
    pub hostmakedepends: Vec<String>,
    /// Dependencies needed at build time for the target
    pub makedepends: Vec<String>,
    /// Runtime dependencies
    pub depends: Vec<String>,
    /// Subpackages produced by this source package
    pub subpackages: Vec<String>,
    /// Already present at the required version in the output repository
    pub ready: bool,
}

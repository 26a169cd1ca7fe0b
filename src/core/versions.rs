//! Package readiness from version-check output
//!
//! The version-check tool prints one status line per package. The "all"
//! listing marks packages missing from the repository with a `?` right after
//! the name; the "outdated" listing holds `<name> <version...>` lines for
//! packages whose repository version lags behind the source tree.
//!
//! Names are matched by prefix, as the tool's output is not split into
//! fields first. A package whose name is a prefix of another (`gcc` and
//! `gcc-fortran`) can therefore be classified by the other's line.

use crate::error::VersionCheckError;

/// Source of version-check results for an architecture
#[allow(async_fn_in_trait)]
pub trait VersionCheck {
    /// Current status of every package when built for `arch`
    async fn status(&mut self, arch: &str) -> Result<VersionStatus, VersionCheckError>;
}

/// Parsed version-check output for one architecture
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionStatus {
    all: Vec<String>,
    outdated: Vec<String>,
}

impl VersionStatus {
    /// Create a status from already split line sets
    pub fn new(all: Vec<String>, outdated: Vec<String>) -> Self {
        Self {
            all: without_blank(all),
            outdated: without_blank(outdated),
        }
    }

    /// Create a status from raw tool output
    pub fn from_output(all: &str, outdated: &str) -> Self {
        Self::new(
            all.lines().map(str::to_string).collect(),
            outdated.lines().map(str::to_string).collect(),
        )
    }

    /// Whether `name` is present in the repository at the current version
    pub fn is_ready(&self, name: &str) -> bool {
        if self.outdated.iter().any(|line| line.starts_with(name)) {
            return false;
        }

        let absent_marker = format!("{name}?");
        if self.all.iter().any(|line| line.starts_with(&absent_marker)) {
            return false;
        }

        // Unknown to the tool entirely counts as absent
        self.all.iter().any(|line| line.starts_with(name))
    }

    /// Names of all outdated packages, in tool order
    pub fn outdated_packages(&self) -> Vec<String> {
        self.outdated
            .iter()
            .filter_map(|line| line.split_whitespace().next())
            .map(str::to_string)
            .collect()
    }

    /// Whether nothing needs rebuilding
    pub fn is_clean(&self) -> bool {
        self.outdated.is_empty()
    }
}

fn without_blank(lines: Vec<String>) -> Vec<String> {
    lines
        .into_iter()
        .filter(|line| !line.trim().is_empty())
        .collect()
}

//! `dbulk-dump` output parsing
//!
//! The dump starts with three header lines (package name, version and
//! revision), optionally followed by a `bootstrap: ` line. After that come up
//! to four labelled sections in a fixed order. A section header is followed
//! by indented lines, one entry each, and ends at the first unindented line.

use crate::core::identity::PackageRecord;
use crate::error::IntrospectionError;

/// Number of header lines before the optional sections
const HEADER_LINES: usize = 3;

/// Section headers, in the order they appear
const HOSTMAKEDEPENDS: &str = "hostmakedepends:";
const MAKEDEPENDS: &str = "makedepends:";
const DEPENDS: &str = "depends:";
const SUBPACKAGES: &str = "subpackages:";

/// Cursor over the dump lines
struct Sections<'a> {
    lines: Vec<&'a str>,
    pos: usize,
}

impl<'a> Sections<'a> {
    fn current(&self) -> Option<&'a str> {
        self.lines.get(self.pos).copied()
    }

    /// Read the section named `header` if it sits at the current position
    fn section(&mut self, header: &str) -> Vec<String> {
        if self.current() != Some(header) {
            return Vec::new();
        }
        self.pos += 1;

        let mut entries = Vec::new();
        while let Some(line) = self.current() {
            if !line.starts_with(char::is_whitespace) {
                break;
            }
            let entry = line.trim();
            if !entry.is_empty() {
                entries.push(entry.to_string());
            }
            self.pos += 1;
        }
        entries
    }
}

/// Parse a metadata dump into a record
///
/// The returned record is never marked ready; readiness comes from the
/// version oracle.
pub fn parse_dump(package: &str, output: &str) -> Result<PackageRecord, IntrospectionError> {
    let lines: Vec<&str> = output.lines().collect();
    if lines.len() < HEADER_LINES {
        return Err(IntrospectionError::Malformed {
            package: package.to_string(),
            message: format!(
                "expected at least {HEADER_LINES} header lines, got {}",
                lines.len()
            ),
        });
    }

    let mut sections = Sections {
        lines,
        pos: HEADER_LINES,
    };
    if sections
        .current()
        .is_some_and(|line| line.starts_with("bootstrap: "))
    {
        sections.pos += 1;
    }

    Ok(PackageRecord {
        hostmakedepends: sections.section(HOSTMAKEDEPENDS),
        makedepends: sections.section(MAKEDEPENDS),
        depends: sections.section(DEPENDS),
        subpackages: sections.section(SUBPACKAGES),
        ready: false,
    })
}

//! Test utilities
//!
//! Property-test generators plus a throwaway package collection whose
//! `xbps-src` and `xbps-checkvers` are small shell scripts.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use crate::error::SandboxError;
use crate::infra::checkvers::VersionOracle;
use crate::infra::mount::{MountBackend, MountKind};
use crate::infra::sandbox::SandboxManager;
use crate::infra::xbps_src::BuildTool;

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;

    /// Generate a valid package name
    pub fn package_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9+-]{0,20}[a-z0-9]?".prop_filter("Name must not be empty", |s| !s.is_empty())
    }

    /// Generate a known architecture
    pub fn arch() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("x86_64".to_string()),
            Just("x86_64-musl".to_string()),
            Just("aarch64".to_string()),
            Just("armv7l".to_string()),
            Just("i686".to_string()),
        ]
    }
}

/// Fake build tool: bootstraps, dumps canned metadata and logs builds
const FAKE_XBPS_SRC: &str = r#"#!/bin/sh
root="$(cd "$(dirname "$0")" && pwd)"
arch="$(cat "$root/host" 2>/dev/null)"
if [ "$1" = "-a" ]; then
    arch="$2"
    shift 2
fi
case "$1" in
    binary-bootstrap)
        echo "bootstrapping $2"
        [ -f "$root/fail-bootstrap" ] && exit 1
        mkdir -p "$root/masterdir/usr"
        echo "bootstrap done" >&2
        ;;
    dbulk-dump)
        echo "$2@$arch" >> "$root/dumped.log"
        cat "$root/dumps/$2" || exit 2
        ;;
    pkg)
        if [ "$3" = "fail" ]; then
            echo "build of $3 failed" >&2
            exit 1
        fi
        echo "$3@$arch" >> "$root/built.log"
        echo "built $3"
        ;;
    *)
        echo "unknown operation $1" >&2
        exit 64
        ;;
esac
"#;

/// Fake version checker: prints canned listings per target architecture
const FAKE_CHECKVERS: &str = r#"#!/bin/sh
root="$(cd "$(dirname "$0")" && pwd)"
[ -f "$root/fail-checkvers" ] && exit 3
dir="$root/checkvers/$XBPS_TARGET_ARCH"
for arg in "$@"; do
    if [ "$arg" = "-s" ]; then
        cat "$dir/all" 2>/dev/null
        exit 0
    fi
done
cat "$dir/outdated" 2>/dev/null
exit 0
"#;

/// A temporary package collection driven by fake tools
pub struct FakeCollection {
    dir: TempDir,
}

impl FakeCollection {
    /// Create the collection with its fake tools in place
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let fake = Self { dir };
        write_script(&fake.path().join("xbps-src"), FAKE_XBPS_SRC);
        write_script(&fake.path().join("xbps-checkvers"), FAKE_CHECKVERS);
        std::fs::create_dir_all(fake.path().join("srcpkgs")).expect("Failed to create srcpkgs");
        std::fs::create_dir_all(fake.path().join("dumps")).expect("Failed to create dumps");
        fake
    }

    /// Root of the collection
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Build tool for the given host architecture
    pub fn build_tool(&self, host_arch: &str) -> BuildTool {
        std::fs::write(self.path().join("host"), host_arch).expect("Failed to write host arch");
        BuildTool::new(self.path(), host_arch).with_program(self.path().join("xbps-src"))
    }

    /// Sandbox manager that records mount requests instead of mounting
    pub fn sandbox_manager(&self, host_arch: &str) -> SandboxManager {
        SandboxManager::new(
            self.build_tool(host_arch),
            Arc::new(RecordingMount::default()),
        )
    }

    /// Version oracle backed by the fake checker
    pub fn oracle(&self) -> VersionOracle {
        VersionOracle::new(self.path()).with_program(self.path().join("xbps-checkvers"))
    }

    /// Make every bootstrap fail
    pub fn fail_bootstrap(&self) {
        std::fs::write(self.path().join("fail-bootstrap"), "").expect("Failed to write marker");
    }

    /// Make every version check fail
    pub fn fail_checkvers(&self) {
        std::fs::write(self.path().join("fail-checkvers"), "").expect("Failed to write marker");
    }

    /// Register a source package and its metadata dump
    pub fn add_package(
        &self,
        name: &str,
        hostmakedepends: &[&str],
        makedepends: &[&str],
        depends: &[&str],
        subpackages: &[&str],
    ) {
        let mut dump = format!("pkgname: {name}\nversion: 1.0\nrevision: 1\n");
        for (header, entries) in [
            ("hostmakedepends:", hostmakedepends),
            ("makedepends:", makedepends),
            ("depends:", depends),
            ("subpackages:", subpackages),
        ] {
            if entries.is_empty() {
                continue;
            }
            dump.push_str(header);
            dump.push('\n');
            for entry in entries {
                dump.push_str(&format!(" {entry}\n"));
            }
        }
        std::fs::create_dir_all(self.path().join("srcpkgs").join(name))
            .expect("Failed to create template dir");
        std::fs::write(self.path().join("dumps").join(name), dump).expect("Failed to write dump");
    }

    /// Make `sub` a subpackage of `base`
    #[cfg(unix)]
    pub fn add_subpackage(&self, sub: &str, base: &str) {
        std::os::unix::fs::symlink(base, self.path().join("srcpkgs").join(sub))
            .expect("Failed to create subpackage link");
    }

    /// Set the version-check listings for an architecture
    pub fn set_versions(&self, arch: &str, all: &[&str], outdated: &[&str]) {
        let dir = self.path().join("checkvers").join(arch);
        std::fs::create_dir_all(&dir).expect("Failed to create checkvers dir");
        std::fs::write(dir.join("all"), lines(all)).expect("Failed to write listing");
        std::fs::write(dir.join("outdated"), lines(outdated)).expect("Failed to write listing");
    }

    /// Packages built so far, as `name@arch`
    pub fn built(&self) -> Vec<String> {
        read_log(&self.path().join("built.log"))
    }

    /// Packages dumped so far, as `name@arch`
    pub fn dumped(&self) -> Vec<String> {
        read_log(&self.path().join("dumped.log"))
    }
}

impl Default for FakeCollection {
    fn default() -> Self {
        Self::new()
    }
}

/// Mount backend that only records what it was asked to do
#[derive(Debug, Default)]
pub struct RecordingMount {
    calls: Mutex<Vec<String>>,
}

impl RecordingMount {
    /// Requests received so far
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("mount log poisoned").clone()
    }
}

impl MountBackend for RecordingMount {
    fn mount(&self, kind: MountKind, path: &Path, size: Option<&str>) -> Result<(), SandboxError> {
        self.calls.lock().expect("mount log poisoned").push(format!(
            "mount {kind} {} {}",
            size.unwrap_or("-"),
            path.display()
        ));
        Ok(())
    }

    fn unmount(&self, path: &Path) -> Result<(), SandboxError> {
        self.calls
            .lock()
            .expect("mount log poisoned")
            .push(format!("unmount {}", path.display()));
        Ok(())
    }
}

fn lines(entries: &[&str]) -> String {
    entries.iter().map(|e| format!("{e}\n")).collect()
}

fn read_log(path: &PathBuf) -> Vec<String> {
    std::fs::read_to_string(path)
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

fn write_script(path: &Path, content: &str) {
    std::fs::write(path, content).expect("Failed to write script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .expect("Failed to make script executable");
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fake_collection_layout() {
        let fake = FakeCollection::new();
        assert!(fake.path().join("xbps-src").exists());
        assert!(fake.path().join("srcpkgs").is_dir());
        assert!(fake.built().is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_package_name_generator(name in package_name()) {
            prop_assert!(!name.is_empty());
            prop_assert!(!name.contains('@'));
            prop_assert!(name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '+'));
        }
    }
}

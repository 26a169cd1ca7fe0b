//! Common test utilities and helpers
//!
//! Integration tests run the `vxb` binary against a temporary package
//! collection whose build tool and version checker are shell scripts.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

const FAKE_XBPS_SRC: &str = r#"#!/bin/sh
root="$(cd "$(dirname "$0")" && pwd)"
arch="$(cat "$root/host")"
if [ "$1" = "-a" ]; then
    arch="$2"
    shift 2
fi
case "$1" in
    binary-bootstrap) mkdir -p "$root/masterdir/usr" ;;
    dbulk-dump) cat "$root/dumps/$2" || exit 2 ;;
    pkg)
        [ "$3" = "fail" ] && exit 1
        echo "$3@$arch" >> "$root/built.log"
        ;;
    *) exit 64 ;;
esac
"#;

const FAKE_CHECKVERS: &str = r#"#!/bin/sh
root="$(cd "$(dirname "$0")" && pwd)"
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

/// Temporary package collection plus a config file pointing at it
pub struct TestCollection {
    /// Temporary directory holding the collection
    pub dir: TempDir,
    host: String,
}

impl TestCollection {
    /// Create a collection for an `x86_64` host
    pub fn new() -> Self {
        Self::with_host("x86_64")
    }

    /// Create a collection for the given host architecture
    pub fn with_host(host: &str) -> Self {
        let collection = Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
            host: host.to_string(),
        };
        collection.create_dir("srcpkgs");
        collection.create_dir("dumps");
        collection.create_file("host", host);
        collection.create_script("xbps-src", FAKE_XBPS_SRC);
        collection.create_script("xbps-checkvers", FAKE_CHECKVERS);
        collection.write_config("");
        collection
    }

    /// Get the path to the collection
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Path of the config file
    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("vxb.toml")
    }

    /// Write the config file, appending `extra` to the generated part
    pub fn write_config(&self, extra: &str) {
        let root = self.dir.path().display();
        let config = format!(
            r#"mods = false

[collection]
path = "{root}"
host_arch = "{host}"

[tools]
build = "{root}/xbps-src"
checkvers = "{root}/xbps-checkvers"
{extra}"#,
            host = self.host,
        );
        self.create_file("vxb.toml", &config);
    }

    /// Create a file in the collection
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Create a directory in the collection
    pub fn create_dir(&self, name: &str) {
        std::fs::create_dir_all(self.dir.path().join(name)).expect("Failed to create directory");
    }

    /// Read a file from the collection
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Check if a file exists in the collection
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    fn create_script(&self, name: &str, content: &str) {
        self.create_file(name, content);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let path = self.dir.path().join(name);
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .expect("Failed to make script executable");
        }
    }

    /// Register a template and the metadata the build tool dumps for it
    pub fn add_package(&self, name: &str, hostmakedepends: &[&str], makedepends: &[&str]) {
        let mut dump = format!("pkgname: {name}\nversion: 1.0\nrevision: 1\n");
        for (header, entries) in [
            ("hostmakedepends:", hostmakedepends),
            ("makedepends:", makedepends),
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
        self.create_dir(&format!("srcpkgs/{name}"));
        self.create_file(&format!("dumps/{name}"), &dump);
    }

    /// Make `sub` a subpackage of `base`
    #[cfg(unix)]
    pub fn add_subpackage(&self, sub: &str, base: &str) {
        std::os::unix::fs::symlink(base, self.dir.path().join("srcpkgs").join(sub))
            .expect("Failed to create subpackage link");
    }

    /// Set the version-check listings for an architecture
    pub fn set_versions(&self, arch: &str, all: &[&str], outdated: &[&str]) {
        self.create_file(&format!("checkvers/{arch}/all"), &lines(all));
        self.create_file(&format!("checkvers/{arch}/outdated"), &lines(outdated));
    }

    /// Packages built so far, as `name@arch`
    pub fn built(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join("built.log"))
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Run `vxb` with the collection's config
    pub fn run(&self, args: &[&str]) -> Output {
        run_vxb(self.dir.path(), &self.config_path(), args)
    }
}

impl Default for TestCollection {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the `vxb` binary in `cwd` with an explicit config file
pub fn run_vxb(cwd: &Path, config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_vxb"))
        .current_dir(cwd)
        .arg("--config")
        .arg(config)
        .args(args)
        .env("VXB_CONFIG_DIR", cwd.join("no-user-config"))
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute vxb")
}

/// Run `git` in `repo`, panicking on failure
pub fn git(repo: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(repo)
        .args(["-c", "user.name=vxb", "-c", "user.email=vxb@localhost"])
        .args(args)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Whether git is available on this machine
pub fn has_git() -> bool {
    which::which("git").is_ok()
}

/// Stdout as a string
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Stderr as a string
pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn lines(entries: &[&str]) -> String {
    entries.iter().map(|e| format!("{e}\n")).collect()
}

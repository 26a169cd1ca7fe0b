//! Default configuration values

/// Build tool executable, relative to the package collection
pub const DEFAULT_BUILD_TOOL: &str = "./xbps-src";

/// Version-check tool executable
pub const DEFAULT_CHECKVERS: &str = "xbps-checkvers";

/// Privileged mount helper executable
pub const DEFAULT_MOUNT_HELPER: &str = "vxb-mnthelper";

/// Shell handed to the operator to fix git conflicts
pub const DEFAULT_SHELL: &str = "sh";

/// Build tool operation that populates a fresh sandbox
pub const BOOTSTRAP_OPERATION: &str = "binary-bootstrap";

/// Sandbox root, relative to the package collection
pub const SANDBOX_DIR: &str = "masterdir";

/// Path inside a bootstrapped sandbox that is always present
pub const SANDBOX_MARKER: &str = "usr";

/// Source templates directory, relative to the package collection
pub const SRCPKGS_DIR: &str = "srcpkgs";

/// Local binary repository, relative to the package collection
pub const BINPKGS_DIR: &str = "hostdir/binpkgs";

/// Environment variable selecting the version-check target architecture
pub const TARGET_ARCH_ENV: &str = "XBPS_TARGET_ARCH";

/// Config file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "vxb.toml";

/// Default DOT output file
pub const DEFAULT_DOT_FILE: &str = "graph.dot";

/// Conflict fix attempts before giving up
pub const DEFAULT_FIX_ATTEMPTS: u32 = 5;

/// Symbolic ref for the tip of the working branch
pub const TIP_REF: &str = "tip";

/// Symbolic ref for the tip of the configured remote branch
pub const REMOTE_REF: &str = "remote";

/// Architectures the build tool knows about, without `-musl` variants
pub const KNOWN_ARCHS: &[&str] = &[
    "aarch64",
    "armv5tel",
    "armv6l",
    "armv7l",
    "i686",
    "mips-musl",
    "mipsel-musl",
    "mipselhf-musl",
    "mipshf-musl",
    "ppc",
    "ppc64",
    "ppc64le",
    "ppcle",
    "x86_64",
];

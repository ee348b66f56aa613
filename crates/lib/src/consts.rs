/// Default build file looked up by the CLI.
pub const BUILD_FILE_NAME: &str = "crossforge.toml";

/// Directory (under each destination root) holding fingerprint records.
pub const STATE_DIR_NAME: &str = ".crossforge";

/// Subdirectory of the build directory used for default destination roots.
pub const NATIVE_DIR_NAME: &str = "native";

/// Manifest file passed to the toolchain when a project doesn't override it.
pub const DEFAULT_MANIFEST: &str = "Cargo.toml";

/// Target name meaning "the host platform".
pub const CURRENT_TARGET: &str = "current";

/// Extension used for staged artifacts when none is configured.
pub const DEFAULT_STAGE_EXTENSION: &str = "exe";

/// Directory names never included in a source tree fingerprint.
pub const FINGERPRINT_EXCLUSIONS: &[&str] = &[".git", "target", STATE_DIR_NAME];

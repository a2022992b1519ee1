//! Centralized path configuration for BERTH.
//!
//! All data paths should go through this module to ensure consistency
//! between the daemon and tooling, whether running as user or system service.

use std::path::PathBuf;
use uuid::Uuid;

/// Get the BERTH data directory.
///
/// Resolution order:
/// 1. `BERTH_DATA_DIR` environment variable
/// 2. `/var/lib/berth` if it exists (system install)
/// 3. `~/.berth` for user-only installs
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("BERTH_DATA_DIR") {
        return PathBuf::from(dir);
    }

    let system_dir = PathBuf::from("/var/lib/berth");
    if system_dir.exists() {
        return system_dir;
    }

    dirs::home_dir().map(|h| h.join(".berth")).unwrap_or(system_dir)
}

/// Get the configuration directory.
///
/// Resolution order:
/// 1. `BERTH_CONFIG_DIR` environment variable
/// 2. `$XDG_CONFIG_HOME/berth` (or the platform equivalent)
/// 3. The data directory
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("BERTH_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    dirs::config_dir().map(|c| c.join("berth")).unwrap_or_else(data_dir)
}

/// Get the entity database path.
pub fn db_path() -> PathBuf {
    data_dir().join("berth.redb")
}

/// Get the directory holding all stack working copies.
pub fn repositories_dir() -> PathBuf {
    data_dir().join("repositories")
}

/// Get the working copy path for a specific stack.
pub fn repository_path(stack_id: Uuid) -> PathBuf {
    repositories_dir().join(stack_id.to_string())
}

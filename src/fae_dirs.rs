//! Directory paths used by the updater.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution, which is
//! sandbox-transparent on macOS.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Config | `~/Library/Application Support/fae/` | `~/.config/fae/` |
//! | Downloads | `~/Library/Caches/fae/updates/` | `~/.cache/fae/updates/` |
//!
//! # Environment Overrides
//!
//! - `FAE_CONFIG_DIR` overrides [`config_dir`]
//! - `FAE_UPDATE_DIR` overrides [`update_dir`]

use std::path::PathBuf;

/// Application config directory.
///
/// Resolves to `dirs::config_dir()/fae/` by default. Override with
/// the `FAE_CONFIG_DIR` environment variable.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("FAE_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("fae"))
        .unwrap_or_else(|| PathBuf::from("/tmp/fae-config"))
}

/// Directory the update installer is downloaded into.
///
/// Resolves to `dirs::cache_dir()/fae/updates/` by default. Override with
/// the `FAE_UPDATE_DIR` environment variable.
#[must_use]
pub fn update_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("FAE_UPDATE_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::cache_dir()
        .map(|d| d.join("fae").join("updates"))
        .unwrap_or_else(|| PathBuf::from("/tmp/fae-updates"))
}

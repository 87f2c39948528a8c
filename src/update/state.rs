//! Update lifecycle states.
//!
//! The progression is linear (`NothingKnown` → `PollingServer` →
//! `UpdateAvailable` → `DownloadInProgress` → `DownloadFinished` →
//! `ExecutingSetup`) with `NoUpdateAvailable` as a resting point after a poll
//! and `Error` as a terminal sink.

use serde::{Deserialize, Serialize};

/// Where the updater currently is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateState {
    /// Nothing has been asked of the server yet.
    #[default]
    NothingKnown,
    /// A descriptor fetch is in flight.
    PollingServer,
    /// The server's latest version is not newer than ours.
    NoUpdateAvailable,
    /// A newer version exists and can be downloaded.
    UpdateAvailable,
    /// The update artifact is being written to disk.
    DownloadInProgress,
    /// The artifact is on disk and ready to launch.
    DownloadFinished,
    /// The installer has been handed to the OS.
    ExecutingSetup,
    /// A command failed; see the session's error cause.
    Error,
}

impl UpdateState {
    /// Returns `true` when byte counters carry meaning in this state.
    pub fn tracks_bytes(self) -> bool {
        matches!(self, Self::DownloadInProgress | Self::DownloadFinished)
    }

    /// Returns `true` for the terminal error state.
    pub fn is_error(self) -> bool {
        self == Self::Error
    }
}

impl std::fmt::Display for UpdateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::NothingKnown => "nothing known",
            Self::PollingServer => "polling server",
            Self::NoUpdateAvailable => "no update available",
            Self::UpdateAvailable => "update available",
            Self::DownloadInProgress => "download in progress",
            Self::DownloadFinished => "download finished",
            Self::ExecutingSetup => "executing setup",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

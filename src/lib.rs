//! Fae updater: check for, download and launch new Fae releases.
//!
//! The updater is a small state machine driven by four commands:
//!
//! - **poll**: fetch the release descriptor and decide whether an update exists
//! - **download**: stream the installer to disk, reporting progress
//! - **launch**: hand the installer to the OS and exit
//! - **cancel**: stop an in-flight download at its next progress tick
//!
//! Commands are queued on a single worker thread and executed strictly in
//! order. A UI thread observes the result through [`UpdateCoordinator`]'s
//! accessors or by subscribing to [`UpdateEvent`]s.

pub mod config;
pub mod error;
pub mod fae_dirs;
pub mod update;

pub use config::{HttpConfig, UpdaterConfig};
pub use error::{FetchError, Result, UpdateError, UpdaterError};
pub use update::{UpdateCoordinator, UpdateEvent, UpdateSnapshot, UpdateState};

//! Self-update system for Fae.
//!
//! Polls a release descriptor, downloads the installer for this platform and
//! hands it to the OS. All state-changing work runs on one sequential worker
//! owned by [`UpdateCoordinator`]; observers read state through its accessors
//! or subscribe to [`UpdateEvent`]s.

pub mod coordinator;
pub mod descriptor;
pub mod launcher;
pub mod notifier;
pub mod platform;
pub mod retriever;
pub mod session;
pub mod state;
pub mod version;

pub use coordinator::{ExitHook, UpdateCoordinator, UpdateCoordinatorBuilder};
pub use descriptor::{DescriptorCache, ServerDescriptor};
pub use launcher::{InstallerLauncher, SystemLauncher};
pub use notifier::{Notifier, UpdateEvent};
pub use platform::{Platform, target_filename};
pub use retriever::{ProgressFn, Retriever, UreqRetriever};
pub use session::{ProgressControl, UpdateSession, UpdateSnapshot};
pub use state::UpdateState;
pub use version::{SemverComparator, Version, VersionComparator};

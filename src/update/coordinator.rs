//! Serialized update state machine.
//!
//! [`UpdateCoordinator`] accepts four commands: poll, download, launch and
//! cancel. The first three are queued on a single worker thread and run one
//! at a time in submission order, so at most one network operation is ever
//! in flight. Cancel only flips a flag that the next download progress tick
//! observes.
//!
//! Commands never report failure to the caller. A failed command moves the
//! session to [`UpdateState::Error`] and records the cause; observers learn
//! about it through [`UpdateCoordinator::subscribe`] or the accessors.
//! Nothing clears `Error` short of restarting the process.

use super::descriptor::ServerDescriptor;
use super::launcher::{InstallerLauncher, SystemLauncher};
use super::notifier::{Notifier, UpdateEvent};
use super::platform::{Platform, target_filename};
use super::retriever::{Retriever, UreqRetriever};
use super::session::{UpdateSession, UpdateSnapshot};
use super::state::UpdateState;
use super::version::{SemverComparator, Version, VersionComparator};
use crate::config::UpdaterConfig;
use crate::error::{Result, UpdateError, UpdaterError};
use crossbeam_channel::{Receiver, Sender};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Called after the installer has been launched successfully.
pub type ExitHook = Box<dyn Fn() + Send + Sync>;

/// Work items for the update worker.
enum Command {
    Poll,
    Download,
    Launch,
    /// Acknowledged once every earlier command has finished.
    Barrier(Sender<()>),
}

/// State shared between the coordinator handle and its worker thread.
struct Core {
    session: UpdateSession,
    notifier: Notifier,
    server_url: Option<String>,
    current_version: Version,
    platform: Platform,
    target_path: PathBuf,
    retriever: Box<dyn Retriever>,
    launcher: Box<dyn InstallerLauncher>,
    comparator: Box<dyn VersionComparator>,
    exit_hook: Option<ExitHook>,
}

impl Core {
    fn run(&self, commands: Receiver<Command>) {
        debug!("update worker started");
        for command in commands.iter() {
            self.execute(command);
        }
        debug!("update worker stopped");
    }

    fn execute(&self, command: Command) {
        let result = match command {
            Command::Poll => self.poll(),
            Command::Download => self.download(),
            Command::Launch => self.launch(),
            Command::Barrier(done) => {
                let _ = done.send(());
                return;
            }
        };

        if let Err(error) = result {
            match error.cause() {
                Some(cause) => warn!("update command failed: {error}: {cause}"),
                None => warn!("update command failed: {error}"),
            }
            self.emit(self.session.fail(error));
        }
    }

    fn emit(&self, event: UpdateEvent) {
        self.notifier.emit(event);
    }

    fn ensure_not_failed(&self) -> std::result::Result<(), UpdateError> {
        if self.session.state().is_error() {
            return Err(UpdateError::new(
                "Update system must be reset after an error.",
            ));
        }
        Ok(())
    }

    fn offers_update(&self, descriptor: &ServerDescriptor) -> bool {
        descriptor
            .latest_version()
            .is_some_and(|latest| self.comparator.is_newer(&self.current_version, latest))
    }

    fn is_update_available(&self) -> bool {
        self.session
            .with_descriptor(|cache| cache.get().is_some_and(|d| self.offers_update(d)))
    }

    fn poll(&self) -> std::result::Result<(), UpdateError> {
        self.ensure_not_failed()?;
        let Some(server_url) = self.server_url.as_deref() else {
            return Ok(());
        };

        self.emit(self.session.set_state(UpdateState::PollingServer));

        let url = cache_busted_url(server_url, unix_now_secs())
            .map_err(|e| UpdateError::wrap("Cannot download properties", e))?;
        let payload = self
            .retriever
            .fetch(&url)
            .map_err(|e| UpdateError::wrap("Cannot download properties", e))?;

        let descriptor = ServerDescriptor::parse(&payload, self.platform);
        let next = if self.offers_update(&descriptor) {
            UpdateState::UpdateAvailable
        } else {
            UpdateState::NoUpdateAvailable
        };
        match descriptor.latest_version() {
            Some(latest) => info!(
                "update server reports {latest} (running {}): {next}",
                self.current_version
            ),
            None => warn!("update descriptor from {server_url} has no usable version"),
        }

        self.emit(self.session.install_descriptor(descriptor, next));
        Ok(())
    }

    fn download(&self) -> std::result::Result<(), UpdateError> {
        if self.server_url.is_none() {
            debug!("ignoring download request: updates are disabled");
            return Ok(());
        }
        self.ensure_not_failed()?;

        let download_url = self.session.with_descriptor(|cache| {
            let url = cache
                .get()
                .and_then(ServerDescriptor::download_url)
                .filter(|_| cache.is_valid())
                .ok_or_else(|| UpdateError::new("Server error. Try again later."))?;
            if !cache.get().is_some_and(|d| self.offers_update(d)) {
                return Err(UpdateError::new("Attempt to perform non-existent update"));
            }
            Ok(url.to_owned())
        })?;

        self.emit(self.session.set_state(UpdateState::DownloadInProgress));

        let mut on_progress = |bytes_downloaded: u64, total_bytes: Option<u64>| {
            let (control, event) = self.session.record_progress(bytes_downloaded, total_bytes);
            self.emit(event);
            control
        };

        match self
            .retriever
            .fetch_to_file(&download_url, &self.target_path, &mut on_progress)
        {
            Ok(written) => {
                info!(
                    "update downloaded to {} ({written} bytes)",
                    self.target_path.display()
                );
                self.emit(self.session.finish_download(written));
                Ok(())
            }
            Err(e) if e.is_cancelled() => {
                self.discard_partial_download();
                info!("update download cancelled");
                // The aborting progress tick normally recorded the failure already.
                if let Some(event) = self
                    .session
                    .fail_if_healthy(UpdateError::new("Download cancelled"))
                {
                    self.emit(event);
                }
                Ok(())
            }
            Err(e) => {
                self.discard_partial_download();
                Err(UpdateError::wrap("Cannot download update", e))
            }
        }
    }

    fn discard_partial_download(&self) {
        match std::fs::remove_file(&self.target_path) {
            Ok(()) => debug!(
                "removed partial download {}",
                self.target_path.display()
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "cannot remove partial download {}: {e}",
                self.target_path.display()
            ),
        }
    }

    fn launch(&self) -> std::result::Result<(), UpdateError> {
        let Some(event) = self
            .session
            .advance_if(UpdateState::DownloadFinished, UpdateState::ExecutingSetup)
        else {
            debug!(
                "ignoring launch request in state {}",
                self.session.state()
            );
            return Ok(());
        };
        self.emit(event);

        self.launcher.open(&self.target_path).map_err(|e| {
            debug!("failed to run update after downloading: {e}");
            UpdateError::wrap("Unable to run update", e)
        })?;

        info!("update installer started from {}", self.target_path.display());
        if let Some(exit) = &self.exit_hook {
            exit();
        }
        Ok(())
    }
}

/// Append the `cacheBuster` query parameter to the descriptor URL.
fn cache_busted_url(
    server_url: &str,
    unix_secs: u64,
) -> std::result::Result<String, url::ParseError> {
    let mut url = url::Url::parse(server_url)?;
    url.query_pairs_mut()
        .append_pair("cacheBuster", &unix_secs.to_string());
    Ok(url.to_string())
}

fn exit_process() {
    std::process::exit(0)
}

fn unix_now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Builder for [`UpdateCoordinator`] with replaceable collaborators.
pub struct UpdateCoordinatorBuilder {
    config: UpdaterConfig,
    platform: Option<Platform>,
    retriever: Option<Box<dyn Retriever>>,
    launcher: Option<Box<dyn InstallerLauncher>>,
    comparator: Option<Box<dyn VersionComparator>>,
    exit_hook: Option<ExitHook>,
}

impl UpdateCoordinatorBuilder {
    /// Override platform detection (affects artifact name and download URL).
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Use a custom retrieval client.
    pub fn with_retriever(mut self, retriever: impl Retriever + 'static) -> Self {
        self.retriever = Some(Box::new(retriever));
        self
    }

    /// Use a custom installer launcher.
    pub fn with_launcher(mut self, launcher: impl InstallerLauncher + 'static) -> Self {
        self.launcher = Some(Box::new(launcher));
        self
    }

    /// Use a custom version comparison policy.
    pub fn with_comparator(mut self, comparator: impl VersionComparator + 'static) -> Self {
        self.comparator = Some(Box::new(comparator));
        self
    }

    /// Run `hook` instead of exiting the process after a successful launch.
    pub fn with_exit_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.exit_hook = Some(Box::new(hook));
        self
    }

    /// Validate the configuration and start the worker thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration or current version is invalid,
    /// or the worker thread cannot be spawned.
    pub fn spawn(self) -> Result<UpdateCoordinator> {
        let Self {
            config,
            platform,
            retriever,
            launcher,
            comparator,
            exit_hook,
        } = self;

        config.validate()?;
        let current_version: Version = config.current_version.parse()?;
        let platform = platform.unwrap_or_else(Platform::current);
        let target_path = config
            .effective_download_dir()
            .join(target_filename(platform));

        let exit_hook = exit_hook.or_else(|| {
            config
                .exit_after_launch
                .then(|| Box::new(exit_process) as ExitHook)
        });

        let core = Arc::new(Core {
            session: UpdateSession::new(),
            notifier: Notifier::new(),
            server_url: config.server_url.clone(),
            current_version,
            platform,
            target_path,
            retriever: retriever.unwrap_or_else(|| Box::new(UreqRetriever::new(&config.http))),
            launcher: launcher.unwrap_or_else(|| Box::new(SystemLauncher::new(platform))),
            comparator: comparator.unwrap_or_else(|| Box::new(SemverComparator)),
            exit_hook,
        });

        let (commands, queue) = crossbeam_channel::bounded(config.queue_capacity);
        let worker_core = Arc::clone(&core);
        let worker = std::thread::Builder::new()
            .name("fae-update-worker".to_owned())
            .spawn(move || worker_core.run(queue))
            .map_err(|e| UpdaterError::Worker(format!("failed to spawn update worker: {e}")))?;

        match &core.server_url {
            Some(url) => info!(
                "updater ready: version {}, server {url}",
                core.current_version
            ),
            None => info!("updater disabled: no server URL configured"),
        }

        Ok(UpdateCoordinator {
            core,
            commands,
            worker,
        })
    }
}

/// Handle to the update state machine. Cheap accessors may be called from
/// any thread; commands return immediately after queueing.
pub struct UpdateCoordinator {
    core: Arc<Core>,
    commands: Sender<Command>,
    worker: JoinHandle<()>,
}

impl UpdateCoordinator {
    /// Start a coordinator with the default collaborators.
    ///
    /// # Errors
    ///
    /// See [`UpdateCoordinatorBuilder::spawn`].
    pub fn new(config: UpdaterConfig) -> Result<Self> {
        Self::builder(config).spawn()
    }

    /// Start building a coordinator for `config`.
    pub fn builder(config: UpdaterConfig) -> UpdateCoordinatorBuilder {
        UpdateCoordinatorBuilder {
            config,
            platform: None,
            retriever: None,
            launcher: None,
            comparator: None,
            exit_hook: None,
        }
    }

    fn submit(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("update worker has stopped; dropping command");
        }
    }

    /// Queue a descriptor fetch. Does nothing when no server URL is configured.
    pub fn poll_server(&self) {
        if self.core.server_url.is_none() {
            debug!("update polling skipped: updates are disabled");
            return;
        }
        self.submit(Command::Poll);
    }

    /// Queue a download of the advertised update. Does nothing when no
    /// server URL is configured.
    pub fn download_update(&self) {
        if self.core.server_url.is_none() {
            debug!("update download skipped: updates are disabled");
            return;
        }
        self.submit(Command::Download);
    }

    /// Queue a launch of the downloaded installer. Ignored unless the
    /// download has finished when the command runs.
    pub fn launch_update(&self) {
        self.submit(Command::Launch);
    }

    /// Ask the current or next download to stop at its next progress tick.
    pub fn cancel_download(&self) {
        info!("update download cancellation requested");
        self.core.session.request_cancel();
    }

    /// Block until every command submitted before this call has run.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread is gone.
    pub fn sync(&self) -> Result<()> {
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        self.commands
            .send(Command::Barrier(done_tx))
            .map_err(|_| UpdaterError::Worker("update worker has stopped".to_owned()))?;
        done_rx
            .recv()
            .map_err(|_| UpdaterError::Worker("update worker stopped before barrier".to_owned()))
    }

    /// Close the queue, let queued commands finish, and join the worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread panicked.
    pub fn shutdown(self) -> Result<()> {
        let Self {
            commands, worker, ..
        } = self;
        drop(commands);
        worker
            .join()
            .map_err(|_| UpdaterError::Worker("update worker panicked".to_owned()))
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
        self.core.notifier.subscribe()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> UpdateState {
        self.core.session.state()
    }

    /// Why the last command failed; present iff the state is `Error`.
    pub fn error_cause(&self) -> Option<Arc<UpdateError>> {
        self.core.session.error_cause()
    }

    /// Bytes downloaded so far.
    pub fn bytes_downloaded(&self) -> Option<u64> {
        self.core.session.bytes_downloaded()
    }

    /// Expected installer size.
    pub fn total_bytes(&self) -> Option<u64> {
        self.core.session.total_bytes()
    }

    /// State, counters and cause read together.
    pub fn snapshot(&self) -> UpdateSnapshot {
        self.core.session.snapshot()
    }

    /// Returns `true` once [`cancel_download`](Self::cancel_download) was called.
    pub fn is_download_cancelled(&self) -> bool {
        self.core.session.is_cancel_requested()
    }

    /// Returns `true` if the last fetched descriptor offers a newer version.
    pub fn is_update_available(&self) -> bool {
        self.core.is_update_available()
    }

    /// Latest version from the last fetched descriptor.
    pub fn latest_version(&self) -> Option<Version> {
        self.core
            .session
            .with_descriptor(|cache| cache.get().and_then(|d| d.latest_version().cloned()))
    }

    /// Download URL from the last fetched descriptor.
    pub fn download_url(&self) -> Option<String> {
        self.core
            .session
            .with_descriptor(|cache| cache.get().and_then(|d| d.download_url().map(str::to_owned)))
    }

    /// Version of the running application.
    pub fn current_version(&self) -> &Version {
        &self.core.current_version
    }

    /// Returns `true` if a server URL is configured.
    pub fn is_enabled(&self) -> bool {
        self.core.server_url.is_some()
    }

    /// Where the installer is (or will be) downloaded.
    pub fn target_path(&self) -> &Path {
        &self.core.target_path
    }
}

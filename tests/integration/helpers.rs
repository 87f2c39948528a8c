//! Shared fakes and builders for updater integration tests.

use crossbeam_channel::{Receiver, Sender};
use fae_updater::error::FetchError;
use fae_updater::update::{
    InstallerLauncher, Platform, ProgressControl, ProgressFn, Retriever, UpdateCoordinator,
    UpdateEvent,
};
use fae_updater::UpdaterConfig;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

pub(crate) const SERVER_URL: &str = "https://updates.example.com/fae.properties";
pub(crate) const CURRENT_VERSION: &str = "1.2.0";

/// Descriptor advertising `version` with a generic download URL.
pub(crate) fn descriptor(version: &str) -> Vec<u8> {
    format!(
        "# test descriptor\nLatestVersion={version}\nDownloadUrl=https\\://updates.example.com/fae-{version}.tgz\n"
    )
    .into_bytes()
}

/// How the fake download should end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DownloadEnding {
    Complete,
    /// Fail with a transport error after every tick has been delivered.
    Fail,
}

/// Scripted retrieval client.
#[derive(Clone)]
pub(crate) struct FakeRetriever {
    inner: Arc<FakeRetrieverState>,
}

struct FakeRetrieverState {
    descriptor: Mutex<Option<Vec<u8>>>,
    ticks: Vec<u64>,
    total: Option<u64>,
    ending: DownloadEnding,
    latency: Duration,
    /// `(ticked_tx, resume_rx)`: after the first tick, announce it and wait.
    pause_after_first_tick: Option<(Sender<()>, Receiver<()>)>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeRetriever {
    /// Serves `descriptor` and a 1000-byte download in ticks of 100/400/1000.
    pub(crate) fn new(descriptor: Vec<u8>) -> Self {
        Self::scripted(Some(descriptor), vec![100, 400, 1000], Some(1000), DownloadEnding::Complete)
    }

    /// Fails every descriptor fetch.
    pub(crate) fn unreachable() -> Self {
        Self::scripted(None, Vec::new(), None, DownloadEnding::Fail)
    }

    pub(crate) fn scripted(
        descriptor: Option<Vec<u8>>,
        ticks: Vec<u64>,
        total: Option<u64>,
        ending: DownloadEnding,
    ) -> Self {
        Self {
            inner: Arc::new(FakeRetrieverState {
                descriptor: Mutex::new(descriptor),
                ticks,
                total,
                ending,
                latency: Duration::ZERO,
                pause_after_first_tick: None,
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// Sleep inside every call so overlapping calls would be detected.
    pub(crate) fn with_latency(self, latency: Duration) -> Self {
        let mut state = Arc::try_unwrap(self.inner)
            .unwrap_or_else(|_| panic!("configure FakeRetriever before cloning it"));
        state.latency = latency;
        Self {
            inner: Arc::new(state),
        }
    }

    /// Pause after the first progress tick until the test says resume.
    pub(crate) fn with_pause(self) -> (Self, Receiver<()>, Sender<()>) {
        let (ticked_tx, ticked_rx) = crossbeam_channel::bounded(1);
        let (resume_tx, resume_rx) = crossbeam_channel::bounded(1);
        let mut state = Arc::try_unwrap(self.inner)
            .unwrap_or_else(|_| panic!("configure FakeRetriever before cloning it"));
        state.pause_after_first_tick = Some((ticked_tx, resume_rx));
        (
            Self {
                inner: Arc::new(state),
            },
            ticked_rx,
            resume_tx,
        )
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.inner.calls.lock().unwrap().clone()
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.calls().iter().filter(|c| c.starts_with("fetch ")).count()
    }

    pub(crate) fn download_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.starts_with("fetch_to_file "))
            .count()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self, call: String) -> InFlight<'_> {
        self.inner.calls.lock().unwrap().push(call);
        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_in_flight.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.inner.latency);
        InFlight(&self.inner.in_flight)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Retriever for FakeRetriever {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let _guard = self.enter(format!("fetch {url}"));
        self.inner
            .descriptor
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| FetchError::Transport("connection refused".to_owned()))
    }

    fn fetch_to_file(
        &self,
        url: &str,
        dest: &Path,
        on_progress: &mut ProgressFn<'_>,
    ) -> Result<u64, FetchError> {
        let _guard = self.enter(format!("fetch_to_file {url}"));
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(dest)?;

        let mut written = 0u64;
        for (i, &tick) in self.inner.ticks.iter().enumerate() {
            let chunk = vec![0xAB; (tick - written) as usize];
            file.write_all(&chunk)?;
            written = tick;

            if on_progress(tick, self.inner.total) == ProgressControl::Abort {
                return Err(FetchError::Cancelled);
            }

            if i == 0
                && let Some((ticked, resume)) = &self.inner.pause_after_first_tick
            {
                ticked.send(()).unwrap();
                resume.recv().unwrap();
            }
        }

        match self.inner.ending {
            DownloadEnding::Complete => Ok(written),
            DownloadEnding::Fail => Err(FetchError::Transport("connection reset".to_owned())),
        }
    }
}

/// Records launches instead of opening anything.
#[derive(Clone, Default)]
pub(crate) struct FakeLauncher {
    opened: Arc<Mutex<Vec<PathBuf>>>,
    exits: Arc<AtomicUsize>,
    fail: bool,
}

impl FakeLauncher {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn opened(&self) -> Vec<PathBuf> {
        self.opened.lock().unwrap().clone()
    }

    pub(crate) fn exits(&self) -> usize {
        self.exits.load(Ordering::SeqCst)
    }
}

impl InstallerLauncher for FakeLauncher {
    fn open(&self, path: &Path) -> std::io::Result<()> {
        if self.fail {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "installer is not executable",
            ));
        }
        self.opened.lock().unwrap().push(path.to_owned());
        Ok(())
    }
}

/// Config pointing at the test server with downloads under `download_dir`.
pub(crate) fn test_config(download_dir: &Path) -> UpdaterConfig {
    let mut config = UpdaterConfig::with_server_url(SERVER_URL);
    config.current_version = CURRENT_VERSION.to_owned();
    config.download_dir = Some(download_dir.to_owned());
    config.exit_after_launch = false;
    config
}

/// Coordinator wired to the given fakes. Exit requests bump the launcher's
/// exit counter.
pub(crate) fn coordinator_with(
    config: UpdaterConfig,
    retriever: &FakeRetriever,
    launcher: &FakeLauncher,
) -> UpdateCoordinator {
    let exits = Arc::clone(&launcher.exits);
    UpdateCoordinator::builder(config)
        .with_platform(Platform::Other)
        .with_retriever(retriever.clone())
        .with_launcher(launcher.clone())
        .with_exit_hook(move || {
            exits.fetch_add(1, Ordering::SeqCst);
        })
        .spawn()
        .expect("spawn coordinator")
}

/// Drain all pending events from the broadcast receiver into a Vec.
pub(crate) fn drain_events(rx: &mut broadcast::Receiver<UpdateEvent>) -> Vec<UpdateEvent> {
    let mut events = Vec::new();
    while let Ok(evt) = rx.try_recv() {
        events.push(evt);
    }
    events
}

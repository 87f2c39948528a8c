//! Hand the downloaded installer to the operating system.

use super::platform::Platform;
use std::path::Path;
use std::process::{Command, Stdio};

/// Opens a downloaded installer.
pub trait InstallerLauncher: Send + Sync {
    /// Ask the OS to run or open `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or the OS handler could not
    /// be started.
    fn open(&self, path: &Path) -> std::io::Result<()>;
}

/// Launches installers with the platform's "open this file" command.
#[derive(Debug, Clone, Copy)]
pub struct SystemLauncher {
    platform: Platform,
}

impl SystemLauncher {
    /// Create a launcher for `platform`.
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    /// Build the command that opens `path`, without running it.
    pub fn command(&self, path: &Path) -> Command {
        let mut cmd = match self.platform {
            Platform::Windows => {
                let mut cmd = Command::new("cmd");
                cmd.args(["/C", "start", ""]).arg(path);
                cmd
            }
            Platform::MacOs => {
                let mut cmd = Command::new("open");
                cmd.arg(path);
                cmd
            }
            Platform::Other => {
                let mut cmd = Command::new("xdg-open");
                cmd.arg(path);
                cmd
            }
        };
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }
}

impl Default for SystemLauncher {
    fn default() -> Self {
        Self::new(Platform::current())
    }
}

impl InstallerLauncher for SystemLauncher {
    fn open(&self, path: &Path) -> std::io::Result<()> {
        if !path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("installer not found at {}", path.display()),
            ));
        }

        // The opener may outlive us; we only care that it started.
        let child = self.command(path).spawn()?;
        tracing::info!("launched installer {} (pid {})", path.display(), child.id());
        Ok(())
    }
}

//! Platform detection and artifact naming.

/// Operating system family, as far as update artifacts care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Microsoft Windows.
    Windows,
    /// Apple macOS.
    MacOs,
    /// Linux and everything else.
    Other,
}

/// Base name of the downloaded installer, without extension.
const TARGET_BASENAME: &str = "new-version";

impl Platform {
    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Other
        }
    }

    /// Installer file extension for this platform.
    pub fn installer_extension(self) -> &'static str {
        match self {
            Self::Windows => "exe",
            Self::MacOs => "dmg",
            Self::Other => "tgz",
        }
    }

    /// Suffix used by descriptor keys such as `DownloadUrl.OSX`.
    pub fn descriptor_key(self) -> &'static str {
        match self {
            Self::Windows => "Windows",
            Self::MacOs => "OSX",
            Self::Other => "Linux",
        }
    }
}

/// File name the update artifact is written to on `platform`.
pub fn target_filename(platform: Platform) -> String {
    format!("{TARGET_BASENAME}.{}", platform.installer_extension())
}

//! Remote release descriptor.
//!
//! The update server publishes a small properties document:
//!
//! ```text
//! # Fae release descriptor
//! LatestVersion=0.8.1
//! DownloadUrl.Windows=https\://example.com/fae-0.8.1.exe
//! DownloadUrl.OSX=https\://example.com/fae-0.8.1.dmg
//! DownloadUrl=https\://example.com/fae-0.8.1.tgz
//! ```
//!
//! The platform-specific `DownloadUrl.<platform>` key wins over the generic
//! `DownloadUrl`. A descriptor missing either the version or a download URL
//! is kept but marked invalid.

use super::platform::Platform;
use super::version::Version;
use std::collections::HashMap;
use std::str::Chars;

const KEY_LATEST_VERSION: &str = "LatestVersion";
const KEY_DOWNLOAD_URL: &str = "DownloadUrl";

/// Parsed contents of the server descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerDescriptor {
    latest_version: Option<Version>,
    download_url: Option<String>,
}

impl ServerDescriptor {
    /// Build a descriptor from already-known values.
    pub fn new(latest_version: Version, download_url: impl Into<String>) -> Self {
        Self {
            latest_version: Some(latest_version),
            download_url: Some(download_url.into()),
        }
    }

    /// Parse a descriptor payload for `platform`.
    ///
    /// The payload is read as ISO-8859-1, so every byte sequence decodes.
    /// Never fails: unusable payloads produce an invalid descriptor.
    pub fn parse(payload: &[u8], platform: Platform) -> Self {
        let text: String = payload.iter().copied().map(char::from).collect();
        let props = parse_properties(&text);

        let latest_version = props.get(KEY_LATEST_VERSION).and_then(|raw| {
            raw.parse::<Version>()
                .map_err(|e| tracing::warn!("ignoring descriptor version: {e}"))
                .ok()
        });

        let platform_key = format!("{KEY_DOWNLOAD_URL}.{}", platform.descriptor_key());
        let download_url = props
            .get(&platform_key)
            .or_else(|| props.get(KEY_DOWNLOAD_URL))
            .filter(|url| !url.is_empty())
            .cloned();

        Self {
            latest_version,
            download_url,
        }
    }

    /// Returns `true` if both the version and the download URL are present.
    pub fn is_valid(&self) -> bool {
        self.latest_version.is_some() && self.download_url.is_some()
    }

    /// Latest version advertised by the server.
    pub fn latest_version(&self) -> Option<&Version> {
        self.latest_version.as_ref()
    }

    /// Where the update artifact can be fetched.
    pub fn download_url(&self) -> Option<&str> {
        self.download_url.as_deref()
    }
}

/// Holds the most recent descriptor fetched by one coordinator.
///
/// Replaced wholesale on each successful poll.
#[derive(Debug, Clone, Default)]
pub struct DescriptorCache {
    current: Option<ServerDescriptor>,
}

impl DescriptorCache {
    /// Swap in a freshly parsed descriptor.
    pub fn replace(&mut self, descriptor: ServerDescriptor) {
        self.current = Some(descriptor);
    }

    /// The cached descriptor, if a poll has completed.
    pub fn get(&self) -> Option<&ServerDescriptor> {
        self.current.as_ref()
    }

    /// Returns `true` if a valid descriptor is cached.
    pub fn is_valid(&self) -> bool {
        self.current.as_ref().is_some_and(ServerDescriptor::is_valid)
    }
}

/// Parse `key=value` properties text (`.properties` file syntax).
///
/// Supports `#`/`!` comments, `=`, `:` or whitespace separators, backslash
/// escapes including `\uXXXX`, and lines continued with a trailing
/// backslash. Later keys override earlier ones.
fn parse_properties(text: &str) -> HashMap<String, String> {
    let mut props = HashMap::new();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let line = line.trim_start();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }

        let mut logical = line.to_owned();
        while ends_with_continuation(&logical) {
            logical.pop();
            match lines.next() {
                Some(next) => logical.push_str(next.trim_start()),
                None => break,
            }
        }

        let (key, value) = split_property(&logical);
        if key.is_empty() {
            continue;
        }
        props.insert(key, value);
    }

    props
}

/// A line continues onto the next when it ends in an odd number of
/// backslashes.
fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|&c| c == '\\').count() % 2 == 1
}

fn split_property(line: &str) -> (String, String) {
    let mut key = String::new();
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => push_escaped(&mut key, &mut chars),
            '=' | ':' => break,
            c if c.is_whitespace() => {
                // Whitespace may itself be the separator, or pad one.
                let rest = chars.as_str().trim_start();
                let rest = rest
                    .strip_prefix('=')
                    .or_else(|| rest.strip_prefix(':'))
                    .unwrap_or(rest);
                return (key, unescape_value(rest.trim_start()));
            }
            c => key.push(c),
        }
    }

    (key, unescape_value(chars.as_str().trim_start()))
}

fn unescape_value(raw: &str) -> String {
    let mut value = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            push_escaped(&mut value, &mut chars);
        } else {
            value.push(c);
        }
    }
    value.trim_end().to_owned()
}

/// Decode the escape following a backslash. A malformed `\u` keeps its
/// text as written.
fn push_escaped(out: &mut String, chars: &mut Chars<'_>) {
    let Some(c) = chars.next() else {
        return;
    };
    match c {
        't' => out.push('\t'),
        'n' => out.push('\n'),
        'r' => out.push('\r'),
        'f' => out.push('\u{c}'),
        'u' => {
            let hex: String = chars.clone().take(4).collect();
            let decoded = (hex.len() == 4 && hex.chars().all(|h| h.is_ascii_hexdigit()))
                .then(|| u32::from_str_radix(&hex, 16).ok())
                .flatten()
                .and_then(char::from_u32);
            match decoded {
                Some(decoded) => {
                    out.push(decoded);
                    chars.nth(3);
                }
                None => out.push('u'),
            }
        }
        other => out.push(other),
    }
}

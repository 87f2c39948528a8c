//! Byte retrieval for descriptor fetches and artifact downloads.
//!
//! [`Retriever`] is the seam the coordinator talks through; [`UreqRetriever`]
//! is the blocking HTTP implementation used in production.

use super::session::ProgressControl;
use crate::config::HttpConfig;
use crate::error::FetchError;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

/// Size of each read from the response body.
const CHUNK_SIZE: usize = 64 * 1024;

/// Progress callback handed to [`Retriever::fetch_to_file`].
///
/// Receives `(bytes_downloaded, total_bytes)`. Returning
/// [`ProgressControl::Abort`] obliges the retriever to stop and return
/// [`FetchError::Cancelled`].
pub type ProgressFn<'a> = dyn FnMut(u64, Option<u64>) -> ProgressControl + 'a;

/// Fetches remote bytes. Implementations are called from the update worker
/// thread and may block.
pub trait Retriever: Send + Sync {
    /// Fetch the whole body at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;

    /// Stream the body at `url` into `dest`, ticking `on_progress` as bytes
    /// arrive. Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Cancelled`] if `on_progress` asked to abort, or
    /// another variant on transport or file failure. A partially written
    /// `dest` may be left behind in either case.
    fn fetch_to_file(
        &self,
        url: &str,
        dest: &Path,
        on_progress: &mut ProgressFn<'_>,
    ) -> Result<u64, FetchError>;
}

/// Blocking HTTP retriever built on `ureq`.
pub struct UreqRetriever {
    agent: ureq::Agent,
    user_agent: String,
}

impl UreqRetriever {
    /// Create a retriever with the given timeouts and user agent.
    pub fn new(config: &HttpConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(config.connect_timeout_secs))
            .timeout_read(Duration::from_secs(config.read_timeout_secs))
            .build();
        Self {
            agent,
            user_agent: config.user_agent.clone(),
        }
    }

    fn get(&self, url: &str) -> Result<ureq::Response, FetchError> {
        self.agent
            .get(url)
            .set("User-Agent", &self.user_agent)
            .call()
            .map_err(|e| match e {
                ureq::Error::Status(status, _) => FetchError::Http {
                    status,
                    url: url.to_owned(),
                },
                ureq::Error::Transport(t) => FetchError::Transport(t.to_string()),
            })
    }
}

impl Default for UreqRetriever {
    fn default() -> Self {
        Self::new(&HttpConfig::default())
    }
}

impl Retriever for UreqRetriever {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        tracing::debug!("fetching {url}");
        let resp = self.get(url)?;
        let mut body = Vec::new();
        resp.into_reader().read_to_end(&mut body)?;
        Ok(body)
    }

    fn fetch_to_file(
        &self,
        url: &str,
        dest: &Path,
        on_progress: &mut ProgressFn<'_>,
    ) -> Result<u64, FetchError> {
        tracing::info!("downloading {url} to {}", dest.display());
        let resp = self.get(url)?;

        let total_bytes = resp
            .header("content-length")
            .and_then(|v| v.parse::<u64>().ok());

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(dest)?;

        // Tick once before the first chunk so a pending cancel lands early.
        if on_progress(0, total_bytes) == ProgressControl::Abort {
            return Err(FetchError::Cancelled);
        }

        let mut reader = resp.into_reader();
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut bytes_downloaded: u64 = 0;
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])?;
            bytes_downloaded += n as u64;

            if on_progress(bytes_downloaded, total_bytes) == ProgressControl::Abort {
                return Err(FetchError::Cancelled);
            }
        }
        file.flush()?;

        tracing::debug!("downloaded {bytes_downloaded} bytes from {url}");
        Ok(bytes_downloaded)
    }
}

//! Download-once cache for the dialogue database.
//!
//! The database lives on a public file host behind a share link. The host
//! answers with one or two redirects before serving the raw bytes, and serves
//! an HTML page instead of the file when the client does not look like a
//! browser. [`DatabaseCache`] hides all of that behind a single call:
//!
//! ```text
//! ensure_database()
//!   ├─ cache file present and larger than min_bytes ──▶ path (no network)
//!   └─ otherwise
//!        GET source_url ──3xx──▶ Location ──3xx──▶ Location ──2xx──▶ stream to disk
//!                                                                      │
//!                                               size + SQLite header check
//!                                                 ├─ ok   ──▶ path
//!                                                 └─ fail ──▶ delete file, FetchError
//! ```
//!
//! Redirects are followed by an explicit bounded loop rather than by the HTTP
//! client, so the hop limit and the relative-`Location` handling are ours.

use futures_util::StreamExt;
use reqwest::{header, redirect, Client, Response, StatusCode, Url};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::DbConfig;

/// First 16 bytes of every SQLite 3 database file.
pub const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

/// Coarse classification of a [`FetchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// The file could not be retrieved at all.
    Unavailable,
    /// Bytes were retrieved but they are not a usable database.
    Invalid,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("invalid source URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("redirect from {url} has an unusable Location: {location}")]
    BadRedirect { url: String, location: String },

    #[error("gave up after {limit} redirects")]
    TooManyRedirects { limit: usize },

    #[error("download failed with status: {status}")]
    Status { status: StatusCode },

    #[error("cache file I/O failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("download truncated: got {received} bytes, expected {expected}")]
    Truncated { received: u64, expected: u64 },

    #[error("downloaded file too small: {size} bytes (need more than {min})")]
    TooSmall { size: u64, min: u64 },

    #[error("not a valid SQLite file, header: {header:?}")]
    BadSignature { header: String },
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Truncated { .. }
            | FetchError::TooSmall { .. }
            | FetchError::BadSignature { .. } => FetchErrorKind::Invalid,
            _ => FetchErrorKind::Unavailable,
        }
    }
}

/// Process-wide handle on the cached database file.
///
/// Owned by the server state and shared behind an `Arc`. The inner mutex
/// serializes fetches: concurrent callers wait for the one download in flight
/// and then all observe the same path.
pub struct DatabaseCache {
    source_url: String,
    path: PathBuf,
    min_bytes: u64,
    max_redirects: usize,
    client: Client,
    ready: Mutex<Option<PathBuf>>,
}

impl DatabaseCache {
    pub fn new(config: &DbConfig) -> Result<Self, FetchError> {
        let mut builder = Client::builder()
            .redirect(redirect::Policy::none())
            .user_agent(config.user_agent.clone());
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(FetchError::Client)?;

        Ok(Self {
            source_url: config.source_url.clone(),
            path: config.cache_path.clone(),
            min_bytes: config.min_bytes,
            max_redirects: config.max_redirects,
            client,
            ready: Mutex::new(None),
        })
    }

    /// Local path the database is cached at.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of a local database file, downloading it first if no
    /// plausible copy is cached.
    ///
    /// A cached file is trusted on size alone; it is never compared against
    /// the remote copy.
    pub async fn ensure_database(&self) -> Result<PathBuf, FetchError> {
        let mut ready = self.ready.lock().await;

        if let Some(path) = ready.as_ref() {
            if is_plausible(path, self.min_bytes).await {
                return Ok(path.clone());
            }
            // Temp directories get swept; fall through and fetch again.
            warn!(path = %path.display(), "cached database disappeared");
            *ready = None;
        }

        if is_plausible(&self.path, self.min_bytes).await {
            debug!(path = %self.path.display(), "reusing cached database");
            *ready = Some(self.path.clone());
            return Ok(self.path.clone());
        }

        info!(url = %self.source_url, path = %self.path.display(), "downloading database");
        match self.download().await {
            Ok(size) => {
                info!(bytes = size, "database downloaded");
                *ready = Some(self.path.clone());
                Ok(self.path.clone())
            }
            Err(err) => {
                warn!(error = %err, "database fetch failed");
                self.discard().await;
                Err(err)
            }
        }
    }

    async fn download(&self) -> Result<u64, FetchError> {
        let response = self.follow_redirects().await?;
        self.stream_to_file(response).await?;
        validate_database_file(&self.path, self.min_bytes).await
    }

    /// Issues the GET and walks the redirect chain up to `max_redirects` hops.
    async fn follow_redirects(&self) -> Result<Response, FetchError> {
        let mut url = Url::parse(&self.source_url).map_err(|e| FetchError::InvalidUrl {
            url: self.source_url.clone(),
            reason: e.to_string(),
        })?;
        let mut hops = 0;

        loop {
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|source| FetchError::Request {
                    url: url.to_string(),
                    source,
                })?;

            let status = response.status();
            debug!(%url, %status, hops, "fetch response");

            if status.is_redirection() {
                if let Some(location) = response.headers().get(header::LOCATION) {
                    if hops == self.max_redirects {
                        return Err(FetchError::TooManyRedirects {
                            limit: self.max_redirects,
                        });
                    }
                    let location = location.to_str().map_err(|_| FetchError::BadRedirect {
                        url: url.to_string(),
                        location: String::from_utf8_lossy(location.as_bytes()).into_owned(),
                    })?;
                    url = resolve_location(&url, location)?;
                    hops += 1;
                    info!(to = %url, "following redirect");
                    continue;
                }
            }

            if !status.is_success() {
                return Err(FetchError::Status { status });
            }

            return Ok(response);
        }
    }

    async fn stream_to_file(&self, response: Response) -> Result<u64, FetchError> {
        let io_err = |source| FetchError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let url = response.url().to_string();
        let expected = response.content_length();
        let mut stream = response.bytes_stream();
        let mut file = tokio::fs::File::create(&self.path).await.map_err(io_err)?;
        let mut received: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| FetchError::Request {
                url: url.clone(),
                source,
            })?;
            file.write_all(&chunk).await.map_err(io_err)?;
            received += chunk.len() as u64;
        }

        file.flush().await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;

        if let Some(expected) = expected {
            if received < expected {
                return Err(FetchError::Truncated { received, expected });
            }
        }

        Ok(received)
    }

    /// Removes a partial or rejected download so the next call starts clean.
    async fn discard(&self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "removed rejected cache file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "could not remove cache file"),
        }
    }
}

/// Resolves a `Location` header against the URL that produced it.
///
/// Scheme-relative (`//host/path`) and path-relative values inherit the
/// current scheme and host. Only http(s) targets are accepted.
pub fn resolve_location(base: &Url, location: &str) -> Result<Url, FetchError> {
    let bad = || FetchError::BadRedirect {
        url: base.to_string(),
        location: location.to_string(),
    };

    let location = location.trim();
    if location.is_empty() {
        return Err(bad());
    }

    let next = base.join(location).map_err(|_| bad())?;
    match next.scheme() {
        "http" | "https" => Ok(next),
        _ => Err(bad()),
    }
}

async fn is_plausible(path: &Path, min_bytes: u64) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > min_bytes)
        .unwrap_or(false)
}

/// Checks that a file on disk is larger than `min_bytes` and starts with the
/// SQLite header. Returns the file size.
pub async fn validate_database_file(path: &Path, min_bytes: u64) -> Result<u64, FetchError> {
    let io_err = |source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    };

    let size = tokio::fs::metadata(path).await.map_err(io_err)?.len();
    if size <= min_bytes {
        return Err(FetchError::TooSmall {
            size,
            min: min_bytes,
        });
    }

    let file = tokio::fs::File::open(path).await.map_err(io_err)?;
    let mut header = Vec::with_capacity(SQLITE_MAGIC.len());
    file.take(SQLITE_MAGIC.len() as u64)
        .read_to_end(&mut header)
        .await
        .map_err(io_err)?;

    if header.as_slice() != SQLITE_MAGIC {
        return Err(FetchError::BadSignature {
            header: String::from_utf8_lossy(&header).into_owned(),
        });
    }

    Ok(size)
}

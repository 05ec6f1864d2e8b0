//! Streams release files to disk with bounded retry and records each
//! success in the idempotency store.

use crate::db::Store;
use crate::models::{DownloadRecord, TorrentCandidate};
use crate::services::retry::{FailureType, RetryDecision, RetryPolicy};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

/// Outcome of one transfer attempt, classified for the retry policy.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("HTTP {0}")]
    Status(u16),

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("IO error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TransferError {
    #[must_use]
    pub const fn failure_type(&self) -> FailureType {
        match self {
            Self::Status(_) | Self::Timeout | Self::Network(_) => FailureType::Transient,
            Self::Io { .. } => FailureType::Permanent,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transient failure fetching {name}: {error}")]
    Transient { name: String, error: String },

    #[error("gave up on {name} after {attempts} attempts: {last_error}")]
    Exhausted {
        name: String,
        attempts: u32,
        last_error: String,
    },

    #[error("unexpected failure fetching {name}: {message}")]
    Unexpected { name: String, message: String },
}

impl FetchError {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Transient { .. } => "transient",
            Self::Exhausted { .. } => "exhausted",
            Self::Unexpected { .. } => "unexpected",
        }
    }
}

/// Streamed GET of `url` into the file at `dest`, returning bytes written.
#[async_trait::async_trait]
pub trait FileTransfer: Send + Sync {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, TransferError>;
}

pub struct HttpTransfer {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransfer {
    #[must_use]
    pub const fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

fn classify_reqwest(error: &reqwest::Error) -> TransferError {
    if error.is_timeout() {
        TransferError::Timeout
    } else if let Some(status) = error.status() {
        TransferError::Status(status.as_u16())
    } else {
        TransferError::Network(error.to_string())
    }
}

#[async_trait::async_trait]
impl FileTransfer for HttpTransfer {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, TransferError> {
        let mut response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| classify_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::Status(status.as_u16()));
        }

        let io_err = |source| TransferError::Io {
            path: dest.to_path_buf(),
            source,
        };

        let mut file = tokio::fs::File::create(dest).await.map_err(io_err)?;
        let mut written = 0u64;

        while let Some(chunk) = response.chunk().await.map_err(|e| classify_reqwest(&e))? {
            file.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(io_err)?;
        Ok(written)
    }
}

/// Where fetched files land.
#[derive(Debug, Clone)]
pub struct DestinationPolicy {
    pub root: PathBuf,
    pub per_series: bool,
}

impl DestinationPolicy {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, per_series: bool) -> Self {
        Self {
            root: root.into(),
            per_series,
        }
    }

    #[must_use]
    pub fn directory_for(&self, series_title: &str) -> PathBuf {
        if self.per_series {
            self.root.join(sanitize_component(series_title))
        } else {
            self.root.clone()
        }
    }

    #[must_use]
    pub fn path_for(&self, series_title: &str, release_name: &str) -> PathBuf {
        self.directory_for(series_title)
            .join(format!("{}.torrent", sanitize_component(release_name)))
    }
}

/// Makes `name` safe to use as one path component.
#[must_use]
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = cleaned.trim().trim_matches('.').trim();
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

fn unexpected(name: &str, error: &impl std::fmt::Display) -> FetchError {
    FetchError::Unexpected {
        name: name.to_string(),
        message: error.to_string(),
    }
}

fn part_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".part");
    PathBuf::from(os)
}

pub struct FetchExecutor {
    transfer: Arc<dyn FileTransfer>,
    retry: RetryPolicy,
    store: Store,
}

impl FetchExecutor {
    #[must_use]
    pub fn new(transfer: Arc<dyn FileTransfer>, retry: RetryPolicy, store: Store) -> Self {
        Self {
            transfer,
            retry,
            store,
        }
    }

    /// One transfer into a `.part` file, renamed into place on success.
    pub async fn attempt(&self, candidate: &TorrentCandidate, dest: &Path) -> Result<u64, FetchError> {
        let name = &candidate.name;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| unexpected(name, &e))?;
        }

        let part = part_path(dest);

        match self.transfer.download(&candidate.download_url, &part).await {
            Ok(bytes) => {
                tokio::fs::rename(&part, dest)
                    .await
                    .map_err(|e| unexpected(name, &e))?;
                Ok(bytes)
            }
            Err(e) => {
                if tokio::fs::try_exists(&part).await.unwrap_or(false) {
                    debug!(path = %part.display(), "Removing partial file");
                    if let Err(e) = tokio::fs::remove_file(&part).await {
                        warn!(path = %part.display(), error = %e, "Failed to remove partial file");
                    }
                }
                match e.failure_type() {
                    FailureType::Transient => Err(FetchError::Transient {
                        name: name.clone(),
                        error: e.to_string(),
                    }),
                    FailureType::Permanent => Err(unexpected(name, &e)),
                }
            }
        }
    }

    /// Fetches `candidate` into its destination and upserts its record.
    ///
    /// A failed store write is logged and the fetch still counts as done.
    #[instrument(skip(self, candidate, policy), fields(release = %candidate.name))]
    pub async fn fetch(
        &self,
        candidate: &TorrentCandidate,
        series_title: &str,
        policy: &DestinationPolicy,
    ) -> Result<PathBuf, FetchError> {
        if candidate.download_url.is_empty() {
            return Err(FetchError::Unexpected {
                name: candidate.name.clone(),
                message: "candidate has no download URL".to_string(),
            });
        }

        let dest = policy.path_for(series_title, &candidate.name);
        let mut attempt = 0u32;

        let bytes = loop {
            attempt += 1;

            match self.attempt(candidate, &dest).await {
                Ok(bytes) => break bytes,
                Err(FetchError::Transient { error, .. }) => {
                    match self.retry.should_retry(FailureType::Transient, attempt) {
                        RetryDecision::Retry {
                            delay,
                            attempt: next_attempt,
                        } => {
                            info!(
                                release = %candidate.name,
                                attempt = next_attempt,
                                max_attempts = self.retry.max_attempts(),
                                delay_ms = delay.as_millis(),
                                error = %error,
                                "Retrying fetch"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        RetryDecision::GiveUp { reason } => {
                            debug!(release = %candidate.name, %reason, "Not retrying fetch");
                            return Err(FetchError::Exhausted {
                                name: candidate.name.clone(),
                                attempts: attempt,
                                last_error: error,
                            });
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        };

        info!(
            event = "fetch_complete",
            release = %candidate.name,
            path = %dest.display(),
            bytes,
            attempts = attempt,
            "Fetched release"
        );

        let record = DownloadRecord::fetched(&candidate.name, &candidate.size, &candidate.download_url);
        if let Err(e) = self.store.upsert(&record).await {
            warn!(release = %candidate.name, error = %e, "Failed to record fetched release");
        }

        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Fails with the queued errors in order, then writes `body`.
    struct ScriptedTransfer {
        failures: Mutex<Vec<TransferError>>,
        calls: Mutex<u32>,
        body: &'static [u8],
    }

    impl ScriptedTransfer {
        fn new(failures: Vec<TransferError>) -> Self {
            Self {
                failures: Mutex::new(failures),
                calls: Mutex::new(0),
                body: b"d8:announce0:e",
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl FileTransfer for ScriptedTransfer {
        async fn download(&self, _url: &str, dest: &Path) -> Result<u64, TransferError> {
            *self.calls.lock().unwrap() += 1;
            let next = {
                let mut failures = self.failures.lock().unwrap();
                if failures.is_empty() { None } else { Some(failures.remove(0)) }
            };
            if let Some(e) = next {
                tokio::fs::write(dest, b"partial").await.unwrap();
                return Err(e);
            }
            tokio::fs::write(dest, self.body).await.unwrap();
            Ok(self.body.len() as u64)
        }
    }

    fn candidate() -> TorrentCandidate {
        let mut c = TorrentCandidate::new(
            "[SubsPlease] Sousou no Frieren - 06 (1080p)",
            "https://nyaa.si/download/6.torrent",
        );
        c.size = "1.4 GiB".to_string();
        c
    }

    async fn executor(transfer: Arc<ScriptedTransfer>, attempts: u32) -> (FetchExecutor, Store) {
        let store = Store::in_memory().await.unwrap();
        (
            FetchExecutor::new(transfer, RetryPolicy::immediate(attempts), store.clone()),
            store,
        )
    }

    #[tokio::test]
    async fn test_fetch_places_file_and_records_success() {
        let dir = TempDir::new().unwrap();
        let transfer = Arc::new(ScriptedTransfer::new(vec![]));
        let (exec, store) = executor(Arc::clone(&transfer), 3).await;
        let policy = DestinationPolicy::new(dir.path(), true);

        let path = exec.fetch(&candidate(), "Sousou no Frieren", &policy).await.unwrap();

        assert_eq!(
            path,
            dir.path()
                .join("Sousou no Frieren")
                .join("[SubsPlease] Sousou no Frieren - 06 (1080p).torrent")
        );
        assert!(path.exists());
        assert!(!part_path(&path).exists());

        let record = store.get(&candidate().name).await.unwrap().unwrap();
        assert_eq!(record.size, "1.4 GiB");
        assert!(!record.queued);
    }

    #[tokio::test]
    async fn test_store_failure_after_fetch_keeps_file() {
        use sea_orm::ConnectionTrait;

        let dir = TempDir::new().unwrap();
        let transfer = Arc::new(ScriptedTransfer::new(vec![]));
        let (exec, store) = executor(Arc::clone(&transfer), 3).await;
        store
            .conn
            .execute_unprepared("DROP TABLE download_records")
            .await
            .unwrap();
        let policy = DestinationPolicy::new(dir.path(), true);

        let path = exec.fetch(&candidate(), "Sousou no Frieren", &policy).await.unwrap();

        assert!(path.exists());
        assert_eq!(transfer.calls(), 1);
        assert!(store.get(&candidate().name).await.is_err());
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let dir = TempDir::new().unwrap();
        let transfer = Arc::new(ScriptedTransfer::new(vec![
            TransferError::Status(503),
            TransferError::Timeout,
        ]));
        let (exec, _store) = executor(Arc::clone(&transfer), 3).await;
        let policy = DestinationPolicy::new(dir.path(), false);

        let path = exec.fetch(&candidate(), "Frieren", &policy).await.unwrap();

        assert_eq!(transfer.calls(), 3);
        assert_eq!(std::fs::read(path).unwrap(), b"d8:announce0:e");
    }

    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        let dir = TempDir::new().unwrap();
        let transfer = Arc::new(ScriptedTransfer::new(
            (0..10).map(|_| TransferError::Status(500)).collect(),
        ));
        let (exec, store) = executor(Arc::clone(&transfer), 3).await;
        let policy = DestinationPolicy::new(dir.path(), true);

        let err = exec.fetch(&candidate(), "Frieren", &policy).await.unwrap_err();

        assert!(matches!(err, FetchError::Exhausted { attempts: 3, .. }));
        assert_eq!(transfer.calls(), 3);
        assert!(!store.exists(&candidate().name).await.unwrap());
        assert!(!part_path(&policy.path_for("Frieren", &candidate().name)).exists());
    }

    #[tokio::test]
    async fn test_io_failure_is_unexpected_and_not_retried() {
        let dir = TempDir::new().unwrap();
        let transfer = Arc::new(ScriptedTransfer::new(vec![TransferError::Io {
            path: dir.path().to_path_buf(),
            source: std::io::Error::other("disk full"),
        }]));
        let (exec, _store) = executor(Arc::clone(&transfer), 3).await;

        let err = exec
            .fetch(&candidate(), "Frieren", &DestinationPolicy::new(dir.path(), true))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Unexpected { .. }));
        assert_eq!(transfer.calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_url_is_unexpected() {
        let dir = TempDir::new().unwrap();
        let transfer = Arc::new(ScriptedTransfer::new(vec![]));
        let (exec, _store) = executor(Arc::clone(&transfer), 3).await;
        let mut c = candidate();
        c.download_url.clear();

        let err = exec
            .fetch(&c, "Frieren", &DestinationPolicy::new(dir.path(), true))
            .await
            .unwrap_err();

        assert_eq!(err.as_str(), "unexpected");
        assert_eq!(transfer.calls(), 0);
    }

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component("Re:Zero / Season 2"), "Re_Zero _ Season 2");
        assert_eq!(sanitize_component("..."), "untitled");
        assert_eq!(sanitize_component("  Frieren  "), "Frieren");
    }

    #[test]
    fn test_transfer_error_classification() {
        assert_eq!(TransferError::Status(404).failure_type(), FailureType::Transient);
        assert_eq!(TransferError::Timeout.failure_type(), FailureType::Transient);
        assert_eq!(
            TransferError::Io {
                path: PathBuf::new(),
                source: std::io::Error::other("x"),
            }
            .failure_type(),
            FailureType::Permanent
        );
    }
}

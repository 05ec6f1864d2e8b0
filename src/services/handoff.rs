//! Hands fetched releases to a download client and marks them queued.

use crate::clients::qbittorrent::{AddTorrentOptions, QBitClient};
use crate::db::Store;
use crate::models::{DownloadRecord, TorrentCandidate};
use crate::services::fetch::sanitize_component;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// A torrent client that accepts a fetched file or a magnet reference.
#[async_trait::async_trait]
pub trait DownloadClient: Send + Sync {
    fn name(&self) -> &'static str;

    async fn submit_file(&self, path: &Path) -> bool;

    async fn submit_magnet(&self, name: &str, magnet: &str) -> bool;

    async fn is_available(&self) -> bool {
        true
    }
}

pub struct QBitDownloadClient {
    client: QBitClient,
    options: AddTorrentOptions,
}

impl QBitDownloadClient {
    #[must_use]
    pub const fn new(client: QBitClient, options: AddTorrentOptions) -> Self {
        Self { client, options }
    }
}

#[async_trait::async_trait]
impl DownloadClient for QBitDownloadClient {
    fn name(&self) -> &'static str {
        "qbittorrent"
    }

    async fn submit_file(&self, path: &Path) -> bool {
        match self.client.add_torrent_file(path, self.options.clone()).await {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "qBittorrent rejected torrent file");
                false
            }
        }
    }

    async fn submit_magnet(&self, name: &str, magnet: &str) -> bool {
        match self.client.add_magnet(magnet, self.options.clone()).await {
            Ok(()) => true,
            Err(e) => {
                warn!(release = %name, error = %e, "qBittorrent rejected magnet link");
                false
            }
        }
    }

    async fn is_available(&self) -> bool {
        self.client.is_available().await
    }
}

/// Drops files into a directory watched by a torrent client. Magnets are
/// written as `<name>.magnet` files holding the link.
pub struct WatchFolderClient {
    directory: PathBuf,
}

impl WatchFolderClient {
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

#[async_trait::async_trait]
impl DownloadClient for WatchFolderClient {
    fn name(&self) -> &'static str {
        "watch_folder"
    }

    async fn submit_file(&self, path: &Path) -> bool {
        let Some(file_name) = path.file_name() else {
            warn!(path = %path.display(), "Cannot hand off a path without a file name");
            return false;
        };

        let result = async {
            tokio::fs::create_dir_all(&self.directory).await?;
            tokio::fs::copy(path, self.directory.join(file_name)).await
        }
        .await;

        match result {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    watch_directory = %self.directory.display(),
                    error = %e,
                    "Failed to copy torrent into watch folder"
                );
                false
            }
        }
    }

    async fn submit_magnet(&self, name: &str, magnet: &str) -> bool {
        let target = self
            .directory
            .join(format!("{}.magnet", sanitize_component(name)));

        let result = async {
            tokio::fs::create_dir_all(&self.directory).await?;
            tokio::fs::write(&target, magnet).await
        }
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %target.display(), error = %e, "Failed to write magnet into watch folder");
                false
            }
        }
    }
}

/// Post-fetch bookkeeping shared by every client.
pub struct HandOff {
    client: Arc<dyn DownloadClient>,
    queued_postfix: String,
    move_after_handoff: bool,
}

fn with_postfix(path: &Path, postfix: &str) -> PathBuf {
    let mut os: OsString = path.as_os_str().to_owned();
    os.push(postfix);
    PathBuf::from(os)
}

impl HandOff {
    #[must_use]
    pub fn new(
        client: Arc<dyn DownloadClient>,
        queued_postfix: impl Into<String>,
        move_after_handoff: bool,
    ) -> Self {
        Self {
            client,
            queued_postfix: queued_postfix.into(),
            move_after_handoff,
        }
    }

    #[must_use]
    pub fn client_name(&self) -> &'static str {
        self.client.name()
    }

    pub async fn is_available(&self) -> bool {
        self.client.is_available().await
    }

    async fn mark_queued(store: &Store, candidate: &TorrentCandidate) {
        let record =
            DownloadRecord::fetched(&candidate.name, &candidate.size, &candidate.download_url)
                .into_queued();
        if let Err(e) = store.upsert(&record).await {
            warn!(release = %candidate.name, error = %e, "Failed to mark release as queued");
        }
    }

    /// Submits a fetched file. On acceptance the record is marked queued and
    /// the local file is either removed or renamed with the queued postfix.
    pub async fn submit_file(&self, store: &Store, candidate: &TorrentCandidate, path: &Path) -> bool {
        if !self.client.submit_file(path).await {
            return false;
        }

        info!(
            event = "handoff",
            client = self.client.name(),
            release = %candidate.name,
            "Handed release to download client"
        );
        Self::mark_queued(store, candidate).await;

        let settled = if self.move_after_handoff {
            tokio::fs::remove_file(path).await
        } else {
            tokio::fs::rename(path, with_postfix(path, &self.queued_postfix)).await
        };
        if let Err(e) = settled {
            warn!(path = %path.display(), error = %e, "Failed to settle handed-off file");
        }

        true
    }

    pub async fn submit_magnet(&self, store: &Store, candidate: &TorrentCandidate) -> bool {
        let Some(magnet) = candidate.magnet_link() else {
            warn!(release = %candidate.name, "Release has neither a download URL nor an info hash");
            return false;
        };

        if !self.client.submit_magnet(&candidate.name, &magnet).await {
            return false;
        }

        info!(
            event = "handoff",
            client = self.client.name(),
            release = %candidate.name,
            magnet = true,
            "Handed magnet to download client"
        );
        Self::mark_queued(store, candidate).await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    struct FlakyClient {
        accept: AtomicBool,
    }

    #[async_trait::async_trait]
    impl DownloadClient for FlakyClient {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn submit_file(&self, _path: &Path) -> bool {
            self.accept.load(Ordering::SeqCst)
        }

        async fn submit_magnet(&self, _name: &str, _magnet: &str) -> bool {
            self.accept.load(Ordering::SeqCst)
        }
    }

    fn candidate() -> TorrentCandidate {
        let mut c = TorrentCandidate::new(
            "[SubsPlease] Sousou no Frieren - 07 (1080p)",
            "https://nyaa.si/download/7.torrent",
        );
        c.info_hash = Some("0123456789abcdef".to_string());
        c
    }

    #[tokio::test]
    async fn test_accepted_file_is_marked_queued_and_renamed() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("ep7.torrent");
        std::fs::write(&file, b"torrent").unwrap();
        let store = Store::in_memory().await.unwrap();

        let handoff = HandOff::new(
            Arc::new(FlakyClient {
                accept: AtomicBool::new(true),
            }),
            ".added",
            false,
        );

        assert!(handoff.submit_file(&store, &candidate(), &file).await);
        assert!(!file.exists());
        assert!(dir.path().join("ep7.torrent.added").exists());
        assert!(store.get(&candidate().name).await.unwrap().unwrap().queued);
    }

    #[tokio::test]
    async fn test_rejected_file_stays_unqueued() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("ep7.torrent");
        std::fs::write(&file, b"torrent").unwrap();
        let store = Store::in_memory().await.unwrap();

        let handoff = HandOff::new(
            Arc::new(FlakyClient {
                accept: AtomicBool::new(false),
            }),
            ".added",
            false,
        );

        assert!(!handoff.submit_file(&store, &candidate(), &file).await);
        assert!(file.exists());
        assert!(!store.exists(&candidate().name).await.unwrap());
    }

    #[tokio::test]
    async fn test_store_failure_does_not_undo_accepted_handoff() {
        use sea_orm::ConnectionTrait;

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("ep7.torrent");
        std::fs::write(&file, b"torrent").unwrap();
        let store = Store::in_memory().await.unwrap();
        store
            .conn
            .execute_unprepared("DROP TABLE download_records")
            .await
            .unwrap();

        let handoff = HandOff::new(
            Arc::new(FlakyClient {
                accept: AtomicBool::new(true),
            }),
            ".added",
            false,
        );

        assert!(handoff.submit_file(&store, &candidate(), &file).await);
        assert!(dir.path().join("ep7.torrent.added").exists());
    }

    #[tokio::test]
    async fn test_watch_folder_copies_then_original_is_removed() {
        let dir = TempDir::new().unwrap();
        let watch = dir.path().join("watch");
        let file = dir.path().join("ep7.torrent");
        std::fs::write(&file, b"torrent").unwrap();
        let store = Store::in_memory().await.unwrap();

        let handoff = HandOff::new(Arc::new(WatchFolderClient::new(&watch)), ".added", true);

        assert!(handoff.submit_file(&store, &candidate(), &file).await);
        assert_eq!(std::fs::read(watch.join("ep7.torrent")).unwrap(), b"torrent");
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn test_watch_folder_writes_magnet_file() {
        let dir = TempDir::new().unwrap();
        let store = Store::in_memory().await.unwrap();
        let handoff = HandOff::new(Arc::new(WatchFolderClient::new(dir.path())), ".added", false);

        assert!(handoff.submit_magnet(&store, &candidate()).await);

        let written = std::fs::read_to_string(
            dir.path()
                .join("[SubsPlease] Sousou no Frieren - 07 (1080p).magnet"),
        )
        .unwrap();
        assert!(written.starts_with("magnet:?xt=urn:btih:0123456789abcdef"));
        assert!(store.get(&candidate().name).await.unwrap().unwrap().queued);
    }

    #[tokio::test]
    async fn test_magnet_requires_info_hash() {
        let store = Store::in_memory().await.unwrap();
        let handoff = HandOff::new(
            Arc::new(FlakyClient {
                accept: AtomicBool::new(true),
            }),
            ".added",
            false,
        );
        let mut c = candidate();
        c.info_hash = None;

        assert!(!handoff.submit_magnet(&store, &c).await);
    }
}

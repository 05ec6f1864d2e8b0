use crate::clients::anilist::AnilistClient;
use crate::clients::folder::FolderLibrary;
use crate::clients::nyaa::NyaaClient;
use crate::clients::plex::PlexLibrary;
use crate::clients::qbittorrent::{AddTorrentOptions, QBitClient};
use crate::clients::{LibraryProvider, NoLibrary};
use crate::config::{Config, DownloadClientKind, LibraryProviderKind};
use crate::constants::USER_AGENT;
use crate::db::Store;
use crate::services::fetch::{DestinationPolicy, FetchExecutor, HttpTransfer};
use crate::services::filter::CandidateFilter;
use crate::services::handoff::{DownloadClient, HandOff, QBitDownloadClient, WatchFolderClient};
use crate::services::rate_limit::RateLimiter;
use crate::services::reconcile::{ReconcileParts, ReconcileService};
use crate::services::retry::RetryPolicy;
use crate::services::search::SearchDriver;
use std::sync::Arc;
use std::time::Duration;

fn build_shared_http_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .user_agent(USER_AGENT)
        .cookie_store(true)
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build shared HTTP client: {e}"))
}

/// Everything a command needs, built once from the loaded configuration
/// and passed down explicitly.
pub struct Context {
    pub config: Config,

    pub store: Store,

    pub http: reqwest::Client,

    /// Shared by every release-index request.
    pub limiter: Arc<RateLimiter>,
}

impl Context {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::new(&config.general.database_path).await?;
        Self::with_store(config, store)
    }

    pub fn with_store(config: Config, store: Store) -> anyhow::Result<Self> {
        let http = build_shared_http_client()?;
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(
            config.nyaa.request_delay_ms,
        )));

        Ok(Self {
            config,
            store,
            http,
            limiter,
        })
    }

    fn library_provider(&self) -> Arc<dyn LibraryProvider> {
        let library = &self.config.library;
        match library.provider {
            LibraryProviderKind::Plex => Arc::new(PlexLibrary::new(self.http.clone(), library)),
            LibraryProviderKind::Folder => Arc::new(FolderLibrary::new(
                &library.folder_path,
                library.match_threshold,
            )),
            LibraryProviderKind::None => Arc::new(NoLibrary),
        }
    }

    fn handoff(&self) -> Option<HandOff> {
        let downloads = &self.config.downloads;
        let client: Arc<dyn DownloadClient> = match downloads.client {
            DownloadClientKind::Qbittorrent => Arc::new(QBitDownloadClient::new(
                QBitClient::new(self.http.clone(), &self.config.qbittorrent),
                AddTorrentOptions::from_config(&self.config.qbittorrent),
            )),
            DownloadClientKind::WatchFolder => {
                Arc::new(WatchFolderClient::new(&downloads.watch_directory))
            }
            DownloadClientKind::None => return None,
        };

        Some(HandOff::new(
            client,
            downloads.queued_postfix.clone(),
            downloads.move_after_handoff,
        ))
    }

    #[must_use]
    pub fn candidate_filter(&self) -> CandidateFilter {
        let downloads = &self.config.downloads;
        CandidateFilter::new(downloads.preferred_group.clone(), downloads.season_threshold)
            .with_missing_episode_mode(downloads.missing_episode_mode)
    }

    /// Wires the configured collaborators into one reconciliation service.
    #[must_use]
    pub fn reconcile_service(&self, dry_run: bool) -> ReconcileService {
        let config = &self.config;
        let downloads = &config.downloads;

        let index = Arc::new(NyaaClient::new(self.http.clone(), &config.nyaa));
        let transfer = Arc::new(HttpTransfer::new(
            self.http.clone(),
            Duration::from_secs(u64::from(downloads.request_timeout_seconds)),
        ));

        ReconcileService::new(ReconcileParts {
            watch_list: Arc::new(AnilistClient::new(self.http.clone(), &config.anilist)),
            library: self.library_provider(),
            search: SearchDriver::new(index, Arc::clone(&self.limiter), config.nyaa.max_pages),
            filter: self.candidate_filter(),
            store: self.store.clone(),
            fetcher: FetchExecutor::new(
                transfer,
                RetryPolicy::from_config(&downloads.retry),
                self.store.clone(),
            ),
            handoff: self.handoff(),
            destination: DestinationPolicy::new(
                &downloads.torrent_directory,
                downloads.per_series_directories,
            ),
            quality: config.nyaa.preferred_resolution.clone(),
            dry_run: dry_run || config.general.dry_run,
        })
    }
}

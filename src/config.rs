use crate::constants::{endpoints, limits, reconcile};
use crate::models::ListStatus;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub anilist: AnilistConfig,

    pub nyaa: NyaaConfig,

    pub library: LibraryConfig,

    pub downloads: DownloadConfig,

    pub qbittorrent: QBittorrentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Directory for the daily rolling log file. Empty disables file logging.
    pub log_directory: String,

    /// "pretty" or "json"
    pub log_format: String,

    /// Decide and log, but fetch nothing and persist nothing.
    pub dry_run: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/anisync.db".to_string(),
            log_level: "info".to_string(),
            log_directory: "logs".to_string(),
            log_format: "pretty".to_string(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnilistConfig {
    pub api_url: String,

    pub username: String,

    pub default_status: ListStatus,

    pub request_timeout_seconds: u32,
}

impl Default for AnilistConfig {
    fn default() -> Self {
        Self {
            api_url: endpoints::ANILIST_API.to_string(),
            username: String::new(),
            default_status: ListStatus::Current,
            request_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NyaaConfig {
    pub base_url: String,

    pub category: String,

    /// "none", "no_remakes" or "trusted_only"
    pub filter: String,

    pub preferred_resolution: Option<String>,

    /// Minimum spacing between index requests.
    pub request_delay_ms: u64,

    /// Upper bound on pages fetched per search term.
    pub max_pages: u32,

    pub request_timeout_seconds: u32,
}

impl Default for NyaaConfig {
    fn default() -> Self {
        Self {
            base_url: endpoints::NYAA_BASE.to_string(),
            category: "1_2".to_string(),
            filter: "no_remakes".to_string(),
            preferred_resolution: Some("1080p".to_string()),
            request_delay_ms: 1500,
            max_pages: limits::DEFAULT_MAX_PAGES,
            request_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryProviderKind {
    Plex,
    Folder,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub provider: LibraryProviderKind,

    pub plex_url: String,

    pub plex_token: String,

    pub plex_section: String,

    /// Root of a `Title/Season N/file.mkv` tree for the folder provider.
    pub folder_path: String,

    /// Normalized similarity a library title must reach to count as a match.
    pub match_threshold: f64,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            provider: LibraryProviderKind::None,
            plex_url: String::new(),
            plex_token: String::new(),
            plex_section: "Anime".to_string(),
            folder_path: String::new(),
            match_threshold: reconcile::DEFAULT_MATCH_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadClientKind {
    Qbittorrent,
    WatchFolder,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub torrent_directory: String,

    /// Put each series' files under a directory named after the series.
    pub per_series_directories: bool,

    /// Bracketed release group, e.g. `[SubsPlease]`. Matched exactly.
    pub preferred_group: String,

    pub season_threshold: usize,

    /// Also admit episodes missing from the library below the watch progress.
    pub missing_episode_mode: bool,

    pub client: DownloadClientKind,

    pub watch_directory: String,

    /// Appended to a torrent file once a client has accepted it.
    pub queued_postfix: String,

    /// Move accepted files into the watch directory instead of renaming them.
    pub move_after_handoff: bool,

    pub request_timeout_seconds: u32,

    pub retry: RetryConfig,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            torrent_directory: "./torrents".to_string(),
            per_series_directories: true,
            preferred_group: reconcile::DEFAULT_PREFERRED_GROUP.to_string(),
            season_threshold: reconcile::DEFAULT_SEASON_THRESHOLD,
            missing_episode_mode: true,
            client: DownloadClientKind::None,
            watch_directory: String::new(),
            queued_postfix: ".added".to_string(),
            move_after_handoff: false,
            request_timeout_seconds: 60,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,

    pub base_delay_ms: u64,

    pub max_delay_ms: u64,

    pub multiplier: f64,

    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 32_000,
            multiplier: 2.0,
            jitter_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QBittorrentConfig {
    pub url: String,

    pub username: String,

    pub password: String,

    pub category: String,

    pub save_path: Option<String>,
}

impl Default for QBittorrentConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            username: "admin".to_string(),
            password: "change-me".to_string(),
            category: "anime".to_string(),
            save_path: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(Self::default_config_path());

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("anisync").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".anisync").join("config.toml"));
        }

        paths
    }

    #[must_use]
    pub fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    /// Writes the default config to `path` unless a file is already there.
    pub fn create_default_if_missing(path: &Path) -> Result<bool> {
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        let group = &self.downloads.preferred_group;
        if !(group.len() > 2 && group.starts_with('[') && group.ends_with(']')) {
            anyhow::bail!("Preferred group must be bracketed, e.g. [SubsPlease] (got '{group}')");
        }

        if self.downloads.season_threshold == 0 {
            anyhow::bail!("Season threshold must be at least 1");
        }

        if self.downloads.retry.max_attempts == 0 {
            anyhow::bail!("Retry max_attempts must be at least 1");
        }

        if self.nyaa.max_pages == 0 {
            anyhow::bail!("Nyaa max_pages must be at least 1");
        }

        if !(0.0..=1.0).contains(&self.library.match_threshold) {
            anyhow::bail!("Library match_threshold must be between 0 and 1");
        }

        if self.library.provider == LibraryProviderKind::Plex
            && (self.library.plex_url.is_empty() || self.library.plex_token.is_empty())
        {
            anyhow::bail!("Plex URL and token are required when the plex provider is selected");
        }

        if self.library.provider == LibraryProviderKind::Folder && self.library.folder_path.is_empty() {
            anyhow::bail!("Library folder_path is required when the folder provider is selected");
        }

        if self.downloads.client == DownloadClientKind::WatchFolder
            && self.downloads.watch_directory.is_empty()
        {
            anyhow::bail!("Watch directory cannot be empty when the watch_folder client is selected");
        }

        if self.downloads.client == DownloadClientKind::Qbittorrent && self.qbittorrent.url.is_empty() {
            anyhow::bail!("qBittorrent URL cannot be empty when selected as download client");
        }

        Ok(())
    }
}

use crate::clients::LibraryProvider;
use crate::clients::plex::title_similarity;
use crate::constants::VIDEO_EXTENSIONS;
use crate::models::{LibraryHolding, MediaEntry, Season};
use crate::parser::filename::trailing_season;
use crate::parser::{normalize_title, parse_filename};
use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Library provider backed by a directory tree of video files.
///
/// The tree is scanned once, on first lookup. Series are keyed by the
/// normalized release title; seasons come from the filename or a
/// `Season N` parent directory and default to 1.
pub struct FolderLibrary {
    root: PathBuf,
    match_threshold: f64,
    index: OnceCell<Vec<LibraryHolding>>,
}

fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

fn season_from_parent(path: &Path) -> Option<u32> {
    path.parent()
        .and_then(Path::file_name)
        .and_then(|n| n.to_str())
        .and_then(trailing_season)
}

/// Groups video files into holdings.
#[must_use]
pub fn index_files(paths: &[PathBuf]) -> Vec<LibraryHolding> {
    let mut series: BTreeMap<String, BTreeMap<u32, BTreeSet<u32>>> = BTreeMap::new();

    for path in paths.iter().filter(|p| is_video(p)) {
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(release) = parse_filename(filename) else {
            debug!(file = %filename, "Skipping unrecognised library file");
            continue;
        };
        if release.episode_number.fract() != 0.0 || release.episode_number < 1.0 {
            continue;
        }

        let title = normalize_title(&release.title);
        if title.is_empty() {
            continue;
        }

        let season = release
            .season
            .or_else(|| season_from_parent(path))
            .unwrap_or(1);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let episode = release.episode_number as u32;

        series
            .entry(title)
            .or_default()
            .entry(season)
            .or_default()
            .insert(episode);
    }

    series
        .into_iter()
        .map(|(title, seasons)| {
            let seasons = seasons
                .into_iter()
                .map(|(number, episodes)| Season::new(number, false, episodes))
                .collect();
            LibraryHolding::new(title, seasons)
        })
        .collect()
}

impl FolderLibrary {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, match_threshold: f64) -> Self {
        Self {
            root: root.into(),
            match_threshold,
            index: OnceCell::new(),
        }
    }

    async fn index(&self) -> Result<&[LibraryHolding]> {
        self.index
            .get_or_try_init(|| async {
                let root = self.root.clone();
                let paths = tokio::task::spawn_blocking(move || {
                    walkdir::WalkDir::new(&root)
                        .follow_links(true)
                        .into_iter()
                        .filter_map(std::result::Result::ok)
                        .filter(|e| e.file_type().is_file())
                        .map(walkdir::DirEntry::into_path)
                        .collect::<Vec<_>>()
                })
                .await
                .context("Library scan task failed")?;

                let holdings = index_files(&paths);
                info!(
                    root = %self.root.display(),
                    files = paths.len(),
                    series = holdings.len(),
                    "Scanned library folder"
                );
                Ok::<_, anyhow::Error>(holdings)
            })
            .await
            .map(Vec::as_slice)
    }
}

#[async_trait::async_trait]
impl LibraryProvider for FolderLibrary {
    async fn holding(&self, entry: &MediaEntry) -> Result<Option<LibraryHolding>> {
        let index = self.index().await?;

        for term in entry.search_terms() {
            let key = normalize_title(&term);
            if let Some(found) = index
                .iter()
                .find(|h| title_similarity(&h.title, &key) >= self.match_threshold)
            {
                return Ok(Some(found.clone()));
            }
        }

        warn!(
            event = "library_missing",
            title = %entry.title(),
            "Series not found in library folder"
        );
        Ok(None)
    }
}

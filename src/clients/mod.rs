use crate::models::{LibraryHolding, ListStatus, MediaEntry};
use anyhow::Result;

pub mod anilist;
pub mod folder;
pub mod nyaa;
pub mod plex;
pub mod qbittorrent;

/// Source of the user's watch list.
#[async_trait::async_trait]
pub trait WatchListProvider: Send + Sync {
    async fn entries(&self, status: ListStatus) -> Result<Vec<MediaEntry>>;
}

/// Looks up what the local media library already holds for an entry.
#[async_trait::async_trait]
pub trait LibraryProvider: Send + Sync {
    /// `Ok(None)` when the library has no matching series.
    async fn holding(&self, entry: &MediaEntry) -> Result<Option<LibraryHolding>>;
}

/// Stand-in used when no library is configured.
pub struct NoLibrary;

#[async_trait::async_trait]
impl LibraryProvider for NoLibrary {
    async fn holding(&self, _entry: &MediaEntry) -> Result<Option<LibraryHolding>> {
        Ok(None)
    }
}

//! Episode arithmetic for one watch-list entry.
//!
//! All "has the user seen this" questions go through [`is_watched`] and all
//! "may this episode be queued" questions go through [`is_queueable`].

use crate::models::MediaEntry;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("`{title}` has neither an episode count nor an airing schedule")]
    IndeterminateBacklog { title: String },
}

/// Highest episode number currently expected to exist.
///
/// The airing schedule wins over the episode count whenever it is present.
pub fn backlog(entry: &MediaEntry) -> Result<u32, ReconcileError> {
    entry
        .media
        .next_airing_episode
        .as_ref()
        .map(|next| next.episode)
        .or(entry.media.episodes)
        .ok_or_else(|| ReconcileError::IndeterminateBacklog {
            title: entry.title().to_string(),
        })
}

/// Last episode that can actually be fetched today.
///
/// The airing schedule names the next *unaired* episode, so while it is
/// present the ceiling is one below it.
pub fn last_available(entry: &MediaEntry) -> Result<u32, ReconcileError> {
    let ceiling = backlog(entry)?;
    if entry.media.next_airing_episode.is_some() {
        Ok(ceiling.saturating_sub(1))
    } else {
        Ok(ceiling)
    }
}

/// The user's progress has reached or passed `episode`.
#[must_use]
pub const fn is_watched(entry: &MediaEntry, episode: u32) -> bool {
    entry.progress >= episode
}

pub fn is_queueable(entry: &MediaEntry, episode: u32) -> Result<bool, ReconcileError> {
    Ok(episode >= 1 && episode <= last_available(entry)?)
}

/// Unwatched, available episodes the library does not hold yet.
pub fn needed_episodes(
    entry: &MediaEntry,
    held: &BTreeSet<u32>,
) -> Result<Vec<u32>, ReconcileError> {
    let last = last_available(entry)?;
    Ok((1..=last)
        .filter(|&ep| !is_watched(entry, ep) && !held.contains(&ep))
        .collect())
}

use crate::clients::{LibraryProvider, WatchListProvider};
use crate::db::Store;
use crate::models::{LibraryHolding, ListStatus, MediaEntry, TorrentCandidate};
use crate::services::fetch::{DestinationPolicy, FetchExecutor};
use crate::services::filter::CandidateFilter;
use crate::services::handoff::HandOff;
use crate::services::reconciler::{self, ReconcileError};
use crate::services::search::{SearchDriver, search_terms};
use anyhow::Result;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span, warn};

/// Counters for one pass over a watch list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub entries: usize,
    pub processed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub candidates: usize,
    pub admitted: usize,
    pub fetched: usize,
    pub queued: usize,
    pub duplicates: usize,
    pub failed: usize,
}

/// Whether an entry reached the release index. Skipped entries are counted
/// apart from processed ones.
enum Searched {
    Yes,
    No,
}

/// Why an entry was not searched at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntrySkip {
    LibraryComplete,
    UpToDate,
}

impl EntrySkip {
    const fn as_str(self) -> &'static str {
        match self {
            Self::LibraryComplete => "library_complete",
            Self::UpToDate => "up_to_date",
        }
    }
}

/// Drives reconciler, search, filter, store, fetch and hand-off for every
/// entry of one watch-list bucket, strictly in sequence.
pub struct ReconcileService {
    watch_list: Arc<dyn WatchListProvider>,
    library: Arc<dyn LibraryProvider>,
    search: SearchDriver,
    filter: CandidateFilter,
    store: Store,
    fetcher: FetchExecutor,
    handoff: Option<HandOff>,
    destination: DestinationPolicy,
    quality: Option<String>,
    dry_run: bool,
}

pub struct ReconcileParts {
    pub watch_list: Arc<dyn WatchListProvider>,
    pub library: Arc<dyn LibraryProvider>,
    pub search: SearchDriver,
    pub filter: CandidateFilter,
    pub store: Store,
    pub fetcher: FetchExecutor,
    pub handoff: Option<HandOff>,
    pub destination: DestinationPolicy,
    pub quality: Option<String>,
    pub dry_run: bool,
}

impl ReconcileService {
    #[must_use]
    pub fn new(parts: ReconcileParts) -> Self {
        Self {
            watch_list: parts.watch_list,
            library: parts.library,
            search: parts.search,
            filter: parts.filter,
            store: parts.store,
            fetcher: parts.fetcher,
            handoff: parts.handoff,
            destination: parts.destination,
            quality: parts.quality,
            dry_run: parts.dry_run,
        }
    }

    /// Reconciles every entry in `status`. Only a watch-list failure is
    /// returned as an error; everything past that is contained per entry.
    pub async fn run(&self, status: ListStatus) -> Result<PassSummary> {
        let run_id = uuid::Uuid::new_v4();
        let span = info_span!("reconcile", run_id = %run_id, status = %status);
        self.run_pass(status).instrument(span).await
    }

    async fn run_pass(&self, status: ListStatus) -> Result<PassSummary> {
        let start = std::time::Instant::now();
        let entries = self.watch_list.entries(status).await?;

        let mut summary = PassSummary {
            entries: entries.len(),
            ..PassSummary::default()
        };
        info!(count = entries.len(), dry_run = self.dry_run, "Reconciling watch list");

        if let Some(handoff) = &self.handoff
            && !self.dry_run
            && !handoff.is_available().await
        {
            warn!(
                client = handoff.client_name(),
                "Download client unavailable, fetched files will stay local"
            );
        }

        for entry in &entries {
            match self.reconcile_entry(entry, &mut summary).await {
                Ok(Searched::Yes) => summary.processed += 1,
                Ok(Searched::No) => summary.skipped += 1,
                Err(e) => {
                    warn!(title = %entry.title(), error = %e, "Error reconciling entry");
                    summary.errors += 1;
                }
            }
        }

        info!(
            event = "reconcile_finished",
            entries = summary.entries,
            processed = summary.processed,
            skipped = summary.skipped,
            errors = summary.errors,
            candidates = summary.candidates,
            admitted = summary.admitted,
            fetched = summary.fetched,
            queued = summary.queued,
            duplicates = summary.duplicates,
            failed = summary.failed,
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Reconciliation pass complete"
        );

        Ok(summary)
    }

    fn entry_skip(
        &self,
        entry: &MediaEntry,
        holding: Option<&LibraryHolding>,
    ) -> Result<Option<EntrySkip>, ReconcileError> {
        let last = reconciler::last_available(entry)?;

        if let (Some(holding), Some(total)) = (holding, entry.media.episodes)
            && !entry.media.is_releasing()
            && holding.episode_count() >= total as usize
        {
            return Ok(Some(EntrySkip::LibraryComplete));
        }

        let held = holding.map(|h| h.episode_indices(None)).unwrap_or_default();
        let unwatched = (1..=last).any(|ep| !reconciler::is_watched(entry, ep));
        let backfill = self.filter.missing_episode_mode()
            && holding.is_some()
            && (1..=last).any(|ep| !held.contains(&ep));

        if unwatched || backfill {
            Ok(None)
        } else {
            Ok(Some(EntrySkip::UpToDate))
        }
    }

    async fn reconcile_entry(
        &self,
        entry: &MediaEntry,
        summary: &mut PassSummary,
    ) -> Result<Searched> {
        if let Err(e) = reconciler::backlog(entry) {
            warn!(
                event = "entry_skipped",
                title = %entry.title(),
                reason = "indeterminate_backlog",
                error = %e,
                "Skipping entry"
            );
            return Ok(Searched::No);
        }

        let holding = self.library.holding(entry).await?;

        if let Some(skip) = self.entry_skip(entry, holding.as_ref())? {
            info!(
                event = skip.as_str(),
                title = %entry.title(),
                progress = entry.progress,
                "Nothing to fetch for entry"
            );
            return Ok(Searched::No);
        }

        if let Some(h) = &holding {
            let needed = reconciler::needed_episodes(entry, &h.episode_indices(None))?;
            debug!(title = %entry.title(), needed = ?needed, "Episodes still needed");
        }

        let terms = search_terms(entry, self.filter.preferred_group(), self.quality.as_deref());
        let candidates = self.search.search(&terms).await;
        summary.candidates += candidates.len();

        let selected = self.filter.select(&candidates, entry, holding.as_ref());
        summary.admitted += selected.len();

        let mut covered = BTreeSet::new();
        for candidate in selected {
            self.process_candidate(entry, candidate, &mut covered, summary)
                .await;
        }

        Ok(Searched::Yes)
    }

    /// Retries the hand-off of a release fetched on an earlier pass but never
    /// accepted by the download client. `None` means there is nothing local
    /// to submit and the release must be fetched again.
    async fn resubmit(&self, candidate: &TorrentCandidate, local: &Path) -> Option<bool> {
        let handoff = self.handoff.as_ref()?;

        let accepted = if tokio::fs::try_exists(local).await.unwrap_or(false) {
            handoff.submit_file(&self.store, candidate, local).await
        } else if candidate.download_url.is_empty() {
            handoff.submit_magnet(&self.store, candidate).await
        } else {
            return None;
        };

        if accepted {
            info!(
                event = "handoff_retried",
                release = %candidate.name,
                "Queued release left over from an earlier pass"
            );
        } else {
            warn!(release = %candidate.name, "Download client still rejects release");
        }
        Some(accepted)
    }

    async fn process_candidate(
        &self,
        entry: &MediaEntry,
        candidate: &TorrentCandidate,
        covered: &mut BTreeSet<u32>,
        summary: &mut PassSummary,
    ) {
        let episode = candidate.episode();

        if episode.is_some_and(|ep| covered.contains(&ep)) {
            info!(
                event = "candidate_decision",
                decision = "reject",
                title = %entry.title(),
                episode,
                release = %candidate.name,
                reason = "episode_already_covered",
                "Candidate skipped"
            );
            return;
        }

        let pending_handoff = match self.store.get(&candidate.name).await {
            Ok(Some(record)) if record.queued || self.handoff.is_none() => {
                info!(
                    event = "candidate_decision",
                    decision = "reject",
                    title = %entry.title(),
                    episode,
                    release = %candidate.name,
                    reason = "already_downloaded",
                    "Candidate skipped"
                );
                summary.duplicates += 1;
                if let Some(ep) = episode {
                    covered.insert(ep);
                }
                return;
            }
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(e) => {
                warn!(release = %candidate.name, error = %e, "Store lookup failed, continuing");
                false
            }
        };

        if pending_handoff && !self.dry_run {
            let local = self.destination.path_for(entry.title(), &candidate.name);
            if let Some(accepted) = self.resubmit(candidate, &local).await {
                if accepted {
                    summary.queued += 1;
                } else {
                    summary.failed += 1;
                }
                if let Some(ep) = episode {
                    covered.insert(ep);
                }
                return;
            }
        }

        if self.dry_run {
            info!(
                event = "dry_run",
                title = %entry.title(),
                episode,
                release = %candidate.name,
                "Would fetch release"
            );
            if let Some(ep) = episode {
                covered.insert(ep);
            }
            return;
        }

        if candidate.download_url.is_empty() {
            let accepted = match &self.handoff {
                Some(handoff) => handoff.submit_magnet(&self.store, candidate).await,
                None => false,
            };
            if accepted {
                summary.queued += 1;
                if let Some(ep) = episode {
                    covered.insert(ep);
                }
            } else {
                warn!(release = %candidate.name, "No download URL and magnet hand-off unavailable");
                summary.failed += 1;
            }
            return;
        }

        match self
            .fetcher
            .fetch(candidate, entry.title(), &self.destination)
            .await
        {
            Ok(path) => {
                summary.fetched += 1;
                if let Some(ep) = episode {
                    covered.insert(ep);
                }
                if let Some(handoff) = &self.handoff
                    && handoff.submit_file(&self.store, candidate, &path).await
                {
                    summary.queued += 1;
                }
            }
            Err(e) => {
                warn!(
                    event = "fetch_failed",
                    title = %entry.title(),
                    episode,
                    release = %candidate.name,
                    reason = e.as_str(),
                    error = %e,
                    "Fetch failed, moving on"
                );
                summary.failed += 1;
            }
        }
    }
}

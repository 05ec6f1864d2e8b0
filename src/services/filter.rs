use crate::models::{LibraryHolding, MediaEntry, TorrentCandidate};
use crate::services::reconciler::{self, ReconcileError};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info};

/// Reason a candidate was skipped. None of these are failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Unparsed,
    Batch,
    GroupMismatch { found: Option<String> },
    SeasonMismatch { expected: u32, found: u32 },
    Watched { progress: u32 },
    BeyondBacklog { available: u32 },
    Indeterminate(ReconcileError),
    AlreadyHeld,
    NoHolding,
}

impl Rejection {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unparsed => "unparsed",
            Self::Batch => "batch",
            Self::GroupMismatch { .. } => "group_mismatch",
            Self::SeasonMismatch { .. } => "season_mismatch",
            Self::Watched { .. } => "already_watched",
            Self::BeyondBacklog { .. } => "beyond_backlog",
            Self::Indeterminate(_) => "indeterminate_backlog",
            Self::AlreadyHeld => "already_held",
            Self::NoHolding => "no_holding",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unparsed => write!(f, "name could not be parsed"),
            Self::Batch => write!(f, "batch release"),
            Self::GroupMismatch { found } => write!(
                f,
                "release group {} is not preferred",
                found.as_deref().unwrap_or("<none>")
            ),
            Self::SeasonMismatch { expected, found } => {
                write!(f, "season {found} while watching season {expected}")
            }
            Self::Watched { progress } => write!(f, "progress is already at {progress}"),
            Self::BeyondBacklog { available } => {
                write!(f, "only {available} episodes are available")
            }
            Self::Indeterminate(e) => write!(f, "{e}"),
            Self::AlreadyHeld => write!(f, "library already holds this episode"),
            Self::NoHolding => write!(f, "series is not in the library"),
        }
    }
}

/// Decides which candidates are worth fetching for one entry.
#[derive(Debug, Clone)]
pub struct CandidateFilter {
    preferred_group: String,
    season_threshold: usize,
    missing_episode_mode: bool,
}

impl CandidateFilter {
    #[must_use]
    pub fn new(preferred_group: impl Into<String>, season_threshold: usize) -> Self {
        Self {
            preferred_group: preferred_group.into(),
            season_threshold,
            missing_episode_mode: true,
        }
    }

    #[must_use]
    pub const fn with_missing_episode_mode(mut self, enabled: bool) -> Self {
        self.missing_episode_mode = enabled;
        self
    }

    #[must_use]
    pub const fn missing_episode_mode(&self) -> bool {
        self.missing_episode_mode
    }

    #[must_use]
    pub fn preferred_group(&self) -> &str {
        &self.preferred_group
    }

    /// Shared first checks: parsed, not a batch, preferred group.
    fn check_release(&self, candidate: &TorrentCandidate) -> Result<u32, Rejection> {
        let parsed = candidate.parsed.as_ref().ok_or(Rejection::Unparsed)?;
        if parsed.is_batch {
            return Err(Rejection::Batch);
        }

        // Exact, case-sensitive.
        if parsed.bracketed_group().as_deref() != Some(self.preferred_group.as_str()) {
            return Err(Rejection::GroupMismatch {
                found: parsed.release_group.clone(),
            });
        }

        Ok(parsed.episode_number)
    }

    /// Season the user is currently on, when the holding is big enough for
    /// seasons to matter.
    fn active_season(&self, holding: Option<&LibraryHolding>) -> Option<u32> {
        let holding = holding?;
        if holding.season_count() < self.season_threshold {
            return None;
        }
        holding.first_unwatched_season().map(|s| s.number)
    }

    fn check_season(
        &self,
        candidate: &TorrentCandidate,
        holding: Option<&LibraryHolding>,
    ) -> Result<(), Rejection> {
        let asserted = candidate.parsed.as_ref().and_then(|p| p.season_number);
        match (self.active_season(holding), asserted) {
            (Some(expected), Some(found)) if expected != found => {
                Err(Rejection::SeasonMismatch { expected, found })
            }
            _ => Ok(()),
        }
    }

    /// Primary mode: ordered checks, first failure wins.
    pub fn admissible(
        &self,
        candidate: &TorrentCandidate,
        entry: &MediaEntry,
        holding: Option<&LibraryHolding>,
    ) -> Result<(), Rejection> {
        let episode = self.check_release(candidate)?;
        self.check_season(candidate, holding)?;

        if reconciler::is_watched(entry, episode) {
            return Err(Rejection::Watched {
                progress: entry.progress,
            });
        }

        Self::check_available(entry, episode)
    }

    /// Both modes share the backlog ceiling.
    fn check_available(entry: &MediaEntry, episode: u32) -> Result<(), Rejection> {
        let queueable = reconciler::is_queueable(entry, episode).map_err(Rejection::Indeterminate)?;
        if !queueable {
            let available = reconciler::last_available(entry).map_err(Rejection::Indeterminate)?;
            return Err(Rejection::BeyondBacklog { available });
        }
        Ok(())
    }

    /// Backfill mode: accept episodes the library never received, whatever
    /// the user's progress, up to the last available episode.
    pub fn missing_episode(
        &self,
        candidate: &TorrentCandidate,
        entry: &MediaEntry,
        holding: Option<&LibraryHolding>,
    ) -> Result<(), Rejection> {
        let episode = self.check_release(candidate)?;
        Self::check_available(entry, episode)?;
        let holding = holding.ok_or(Rejection::NoHolding)?;

        let season = candidate
            .parsed
            .as_ref()
            .and_then(|p| p.season_number)
            .or_else(|| self.active_season(Some(holding)));

        if holding.episode_indices(season).contains(&episode) {
            return Err(Rejection::AlreadyHeld);
        }

        Ok(())
    }

    /// Runs both modes and returns the union in candidate order.
    ///
    /// Duplicates are detected by position in `candidates`, so two distinct
    /// rows with identical fields are both kept.
    pub fn select<'a>(
        &self,
        candidates: &'a [TorrentCandidate],
        entry: &MediaEntry,
        holding: Option<&LibraryHolding>,
    ) -> Vec<&'a TorrentCandidate> {
        let mut admitted = BTreeSet::new();
        let mut skipped: BTreeMap<&'static str, usize> = BTreeMap::new();

        for (index, candidate) in candidates.iter().enumerate() {
            let primary = match self.admissible(candidate, entry, holding) {
                Ok(()) => {
                    info!(
                        event = "candidate_decision",
                        decision = "accept",
                        mode = "unwatched",
                        title = %entry.title(),
                        episode = candidate.episode(),
                        release = %candidate.name,
                        "Candidate admitted"
                    );
                    admitted.insert(index);
                    continue;
                }
                Err(reason) => {
                    debug!(
                        event = "candidate_decision",
                        decision = "reject",
                        mode = "unwatched",
                        title = %entry.title(),
                        episode = candidate.episode(),
                        release = %candidate.name,
                        reason = reason.as_str(),
                        detail = %reason,
                        "Candidate skipped"
                    );
                    reason
                }
            };

            if !self.missing_episode_mode {
                *skipped.entry(primary.as_str()).or_default() += 1;
                continue;
            }

            match self.missing_episode(candidate, entry, holding) {
                Ok(()) => {
                    info!(
                        event = "candidate_decision",
                        decision = "accept",
                        mode = "missing_episode",
                        title = %entry.title(),
                        episode = candidate.episode(),
                        release = %candidate.name,
                        "Candidate admitted to backfill a missing episode"
                    );
                    admitted.insert(index);
                }
                Err(reason) => {
                    debug!(
                        event = "candidate_decision",
                        decision = "reject",
                        mode = "missing_episode",
                        title = %entry.title(),
                        episode = candidate.episode(),
                        release = %candidate.name,
                        reason = reason.as_str(),
                        detail = %reason,
                        "Candidate skipped"
                    );
                    *skipped.entry(primary.as_str()).or_default() += 1;
                }
            }
        }

        // Per-candidate detail stays at debug; the tally keeps skips visible at info.
        if !skipped.is_empty() {
            info!(
                event = "candidates_skipped",
                title = %entry.title(),
                skipped = candidates.len() - admitted.len(),
                reasons = ?skipped,
                "Candidates skipped for entry"
            );
        }

        admitted.into_iter().map(|i| &candidates[i]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::media::fixtures::entry;
    use crate::models::{ParsedReleaseInfo, Season};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tracing::field::{Field, Visit};
    use tracing::{Event, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
    use tracing_subscriber::registry::LookupSpan;

    #[derive(Default)]
    struct FieldRecorder(HashMap<String, String>);

    impl Visit for FieldRecorder {
        fn record_u64(&mut self, field: &Field, value: u64) {
            self.0.insert(field.name().to_string(), value.to_string());
        }

        fn record_str(&mut self, field: &Field, value: &str) {
            self.0.insert(field.name().to_string(), value.to_string());
        }

        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.0.insert(field.name().to_string(), format!("{value:?}"));
        }
    }

    struct CaptureLayer(Arc<Mutex<Vec<HashMap<String, String>>>>);

    impl<S> Layer<S> for CaptureLayer
    where
        S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut recorder = FieldRecorder::default();
            event.record(&mut recorder);
            self.0
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(recorder.0);
        }
    }

    fn candidate(group: &str, episode: u32, season: Option<u32>) -> TorrentCandidate {
        let name = format!("[{group}] Sousou no Frieren - {episode:02} (1080p)");
        let mut c = TorrentCandidate::new(name, format!("https://nyaa.si/download/{episode}.torrent"));
        c.attach(ParsedReleaseInfo {
            anime_title: "Sousou no Frieren".to_string(),
            episode_number: episode,
            season_number: season,
            release_group: Some(group.to_string()),
            resolution: Some("1080p".to_string()),
            is_batch: false,
        });
        c
    }

    fn filter() -> CandidateFilter {
        CandidateFilter::new("[SubsPlease]", 2).with_missing_episode_mode(false)
    }

    #[test]
    fn test_scenario_progress_five_of_twelve() {
        let e = entry(5, Some(12), None);
        let candidates: Vec<_> = [4, 5, 6, 7, 13]
            .into_iter()
            .map(|ep| candidate("SubsPlease", ep, None))
            .collect();

        let selected: Vec<u32> = filter()
            .select(&candidates, &e, None)
            .into_iter()
            .filter_map(TorrentCandidate::episode)
            .collect();

        assert_eq!(selected, vec![6, 7]);
    }

    #[test]
    fn test_next_airing_episode_never_admitted() {
        let e = entry(5, None, Some(9));
        let f = filter();
        assert!(f.admissible(&candidate("SubsPlease", 8, None), &e, None).is_ok());
        assert_eq!(
            f.admissible(&candidate("SubsPlease", 9, None), &e, None),
            Err(Rejection::BeyondBacklog { available: 8 })
        );
    }

    #[test]
    fn test_group_mismatch_wins_over_everything() {
        let e = entry(0, Some(12), None);
        let result = filter().admissible(&candidate("Erai-raws", 3, None), &e, None);
        assert_eq!(
            result,
            Err(Rejection::GroupMismatch {
                found: Some("Erai-raws".to_string())
            })
        );
    }

    #[test]
    fn test_group_match_is_case_sensitive() {
        let e = entry(0, Some(12), None);
        let result = filter().admissible(&candidate("subsplease", 3, None), &e, None);
        assert!(matches!(result, Err(Rejection::GroupMismatch { .. })));
    }

    #[test]
    fn test_batch_flag_is_never_admissible() {
        let e = entry(0, Some(12), None);
        let mut c = candidate("SubsPlease", 3, None);
        if let Some(parsed) = c.parsed.as_mut() {
            parsed.is_batch = true;
        }

        let f = CandidateFilter::new("[SubsPlease]", 2);
        assert_eq!(f.admissible(&c, &e, None), Err(Rejection::Batch));
        assert_eq!(f.missing_episode(&c, &e, None), Err(Rejection::Batch));
        assert!(f.select(std::slice::from_ref(&c), &e, None).is_empty());
    }

    #[test]
    fn test_unparsed_candidate_rejected_first() {
        let e = entry(0, Some(12), None);
        let c = TorrentCandidate::new("garbage", "");
        assert_eq!(filter().admissible(&c, &e, None), Err(Rejection::Unparsed));
    }

    #[test]
    fn test_season_mismatch_with_multi_season_holding() {
        let e = entry(0, Some(12), None);
        let holding = LibraryHolding::new(
            "Sousou no Frieren",
            vec![Season::new(1, true, 1..=28), Season::new(2, false, [])],
        );

        let f = filter();
        assert_eq!(
            f.admissible(&candidate("SubsPlease", 3, Some(1)), &e, Some(&holding)),
            Err(Rejection::SeasonMismatch {
                expected: 2,
                found: 1
            })
        );
        assert!(
            f.admissible(&candidate("SubsPlease", 3, Some(2)), &e, Some(&holding))
                .is_ok()
        );
        // No season asserted means no conflict.
        assert!(
            f.admissible(&candidate("SubsPlease", 3, None), &e, Some(&holding))
                .is_ok()
        );
    }

    #[test]
    fn test_single_season_holding_ignores_season() {
        let e = entry(0, Some(12), None);
        let holding = LibraryHolding::new("Sousou no Frieren", vec![Season::new(1, true, 1..=2)]);

        assert!(
            filter()
                .admissible(&candidate("SubsPlease", 3, Some(4)), &e, Some(&holding))
                .is_ok()
        );
    }

    #[test]
    fn test_season_threshold_is_configurable() {
        let e = entry(0, Some(12), None);
        let holding = LibraryHolding::new("Sousou no Frieren", vec![Season::new(1, false, [])]);
        let strict = CandidateFilter::new("[SubsPlease]", 1);

        assert!(matches!(
            strict.admissible(&candidate("SubsPlease", 3, Some(2)), &e, Some(&holding)),
            Err(Rejection::SeasonMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_episode_mode_backfills_watched_episodes() {
        let e = entry(10, Some(12), None);
        let holding = LibraryHolding::new("Sousou no Frieren", vec![Season::new(1, false, [1, 2, 4])]);
        let f = CandidateFilter::new("[SubsPlease]", 2);

        let candidates = vec![
            candidate("SubsPlease", 2, None),
            candidate("SubsPlease", 3, None),
            candidate("SubsPlease", 11, None),
        ];

        let selected: Vec<u32> = f
            .select(&candidates, &e, Some(&holding))
            .into_iter()
            .filter_map(TorrentCandidate::episode)
            .collect();

        // 3 is watched but missing, 11 is unwatched, 2 is held and watched.
        assert_eq!(selected, vec![3, 11]);
    }

    #[test]
    fn test_union_keeps_one_copy_per_candidate() {
        let e = entry(0, Some(12), None);
        let holding = LibraryHolding::new("Sousou no Frieren", vec![Season::new(1, false, [])]);
        let f = CandidateFilter::new("[SubsPlease]", 2);

        let twin = candidate("SubsPlease", 1, None);
        let candidates = vec![twin.clone(), twin];

        let selected = f.select(&candidates, &e, Some(&holding));
        assert_eq!(selected.len(), 2);
        assert!(std::ptr::eq(selected[0], &candidates[0]));
        assert!(std::ptr::eq(selected[1], &candidates[1]));
    }

    #[test]
    fn test_missing_episode_requires_holding() {
        let f = CandidateFilter::new("[SubsPlease]", 2);
        let e = entry(0, Some(12), None);
        assert_eq!(
            f.missing_episode(&candidate("SubsPlease", 1, None), &e, None),
            Err(Rejection::NoHolding)
        );
    }

    #[test]
    fn test_backfill_respects_airing_ceiling() {
        let e = entry(5, None, Some(9));
        let holding = LibraryHolding::new("Sousou no Frieren", vec![Season::new(1, false, 1..=6)]);
        let f = CandidateFilter::new("[SubsPlease]", 2);

        let candidates: Vec<_> = [7, 8, 9, 10, 13]
            .into_iter()
            .map(|ep| candidate("SubsPlease", ep, None))
            .collect();
        let selected: Vec<u32> = f
            .select(&candidates, &e, Some(&holding))
            .into_iter()
            .filter_map(TorrentCandidate::episode)
            .collect();

        assert_eq!(selected, vec![7, 8]);
        assert_eq!(
            f.missing_episode(&candidates[2], &e, Some(&holding)),
            Err(Rejection::BeyondBacklog { available: 8 })
        );
    }

    #[test]
    fn test_backfill_respects_episode_count() {
        let e = entry(12, Some(12), None);
        let holding = LibraryHolding::new("Sousou no Frieren", vec![Season::new(1, false, 1..=5)]);
        let f = CandidateFilter::new("[SubsPlease]", 2);

        let candidates: Vec<_> = [6, 13, 99]
            .into_iter()
            .map(|ep| candidate("SubsPlease", ep, None))
            .collect();
        let selected: Vec<u32> = f
            .select(&candidates, &e, Some(&holding))
            .into_iter()
            .filter_map(TorrentCandidate::episode)
            .collect();

        assert_eq!(selected, vec![6]);
    }

    #[test]
    fn test_backfill_without_backlog_is_indeterminate() {
        let e = entry(0, None, None);
        let holding = LibraryHolding::new("Sousou no Frieren", vec![Season::new(1, false, [1])]);
        let f = CandidateFilter::new("[SubsPlease]", 2);

        assert!(matches!(
            f.missing_episode(&candidate("SubsPlease", 2, None), &e, Some(&holding)),
            Err(Rejection::Indeterminate(_))
        ));
    }

    #[test]
    fn test_skips_are_tallied_at_info() {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry()
            .with(tracing_subscriber::filter::LevelFilter::INFO)
            .with(CaptureLayer(Arc::clone(&captured)));
        let e = entry(5, Some(12), None);
        let candidates: Vec<_> = [4, 5, 6, 13]
            .into_iter()
            .map(|ep| candidate("SubsPlease", ep, None))
            .collect();

        tracing::subscriber::with_default(subscriber, || {
            tracing::callsite::rebuild_interest_cache();
            assert_eq!(filter().select(&candidates, &e, None).len(), 1);
        });

        let events = captured
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let tally = events
            .iter()
            .find(|fields| fields.get("event").map(String::as_str) == Some("candidates_skipped"))
            .expect("skip tally logged at info");

        assert_eq!(tally.get("skipped").map(String::as_str), Some("3"));
        assert_eq!(
            tally.get("reasons").map(String::as_str),
            Some(r#"{"already_watched": 2, "beyond_backlog": 1}"#)
        );
        assert!(
            events
                .iter()
                .all(|fields| fields.get("decision").map(String::as_str) != Some("reject"))
        );
    }
}

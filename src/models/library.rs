use std::collections::BTreeSet;

/// One season of a locally held series.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Season {
    pub number: u32,
    /// Every episode of the season has been viewed.
    pub watched: bool,
    pub episodes: BTreeSet<u32>,
}

impl Season {
    #[must_use]
    pub fn new(number: u32, watched: bool, episodes: impl IntoIterator<Item = u32>) -> Self {
        Self {
            number,
            watched,
            episodes: episodes.into_iter().collect(),
        }
    }
}

/// A series the media library already has, as reported by a library provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryHolding {
    pub title: String,
    pub seasons: Vec<Season>,
}

impl LibraryHolding {
    #[must_use]
    pub fn new(title: impl Into<String>, seasons: Vec<Season>) -> Self {
        Self {
            title: title.into(),
            seasons,
        }
    }

    #[must_use]
    pub fn season_count(&self) -> usize {
        self.seasons.len()
    }

    /// First season, in library order, not marked fully watched.
    #[must_use]
    pub fn first_unwatched_season(&self) -> Option<&Season> {
        self.seasons.iter().find(|s| !s.watched)
    }

    #[must_use]
    pub fn season(&self, number: u32) -> Option<&Season> {
        self.seasons.iter().find(|s| s.number == number)
    }

    #[must_use]
    pub fn episode_count(&self) -> usize {
        self.seasons.iter().map(|s| s.episodes.len()).sum()
    }

    /// Known episode indices for one season, or across all seasons when
    /// `season` is `None`.
    #[must_use]
    pub fn episode_indices(&self, season: Option<u32>) -> BTreeSet<u32> {
        match season {
            Some(number) => self
                .season(number)
                .map(|s| s.episodes.clone())
                .unwrap_or_default(),
            None => self
                .seasons
                .iter()
                .flat_map(|s| s.episodes.iter().copied())
                .collect(),
        }
    }
}

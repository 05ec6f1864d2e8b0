use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The user's list bucket for a watch-list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListStatus {
    Current,
    Planning,
    Completed,
    Paused,
    Dropped,
    Repeating,
}

impl ListStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Current => "CURRENT",
            Self::Planning => "PLANNING",
            Self::Completed => "COMPLETED",
            Self::Paused => "PAUSED",
            Self::Dropped => "DROPPED",
            Self::Repeating => "REPEATING",
        }
    }
}

impl fmt::Display for ListStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown list status `{0}` (expected CURRENT, PLANNING, COMPLETED, PAUSED, DROPPED or REPEATING)")]
pub struct UnknownListStatus(pub String);

impl FromStr for ListStatus {
    type Err = UnknownListStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CURRENT" => Ok(Self::Current),
            "PLANNING" => Ok(Self::Planning),
            "COMPLETED" => Ok(Self::Completed),
            "PAUSED" => Ok(Self::Paused),
            "DROPPED" => Ok(Self::Dropped),
            "REPEATING" => Ok(Self::Repeating),
            _ => Err(UnknownListStatus(s.to_string())),
        }
    }
}

/// Airing state of the show itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaStatus {
    Finished,
    Releasing,
    NotYetReleased,
    Cancelled,
    Hiatus,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiringSchedule {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub airing_at: i64,
    #[serde(default)]
    pub time_until_airing: i64,
    /// Index of the next episode that has not aired yet.
    pub episode: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaTitle {
    pub romaji: Option<String>,
    pub english: Option<String>,
    pub native: Option<String>,
    pub user_preferred: Option<String>,
}

impl MediaTitle {
    /// Best title for logs and folder names.
    #[must_use]
    pub fn display(&self) -> &str {
        self.user_preferred
            .as_deref()
            .or(self.romaji.as_deref())
            .or(self.english.as_deref())
            .or(self.native.as_deref())
            .unwrap_or("Unknown")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    pub id: i64,
    pub title: MediaTitle,
    #[serde(default)]
    pub synonyms: Vec<String>,
    pub format: Option<String>,
    pub status: MediaStatus,
    /// Total episode count; unknown while a show is airing.
    pub episodes: Option<u32>,
    pub next_airing_episode: Option<AiringSchedule>,
    pub season_year: Option<i32>,
}

impl Media {
    #[must_use]
    pub fn is_releasing(&self) -> bool {
        self.status == MediaStatus::Releasing
    }
}

/// One item of the user's watch list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaEntry {
    pub id: i64,
    pub media_id: i64,
    pub status: ListStatus,
    #[serde(default)]
    pub score: f64,
    /// Episodes watched.
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub hidden_from_status_lists: bool,
    pub media: Media,
}

impl MediaEntry {
    #[must_use]
    pub fn title(&self) -> &str {
        self.media.title.display()
    }

    /// Distinct title variants in lookup order: romaji, english, user
    /// preferred, then synonyms.
    #[must_use]
    pub fn search_terms(&self) -> Vec<String> {
        let title = &self.media.title;
        let mut terms: Vec<String> = Vec::new();

        let candidates = [
            title.romaji.as_deref(),
            title.english.as_deref(),
            title.user_preferred.as_deref(),
        ]
        .into_iter()
        .flatten()
        .chain(self.media.synonyms.iter().map(String::as_str));

        for term in candidates {
            let term = term.trim();
            if term.is_empty() || terms.iter().any(|t| t.eq_ignore_ascii_case(term)) {
                continue;
            }
            terms.push(term.to_string());
        }

        terms
    }
}

use serde::{Deserialize, Serialize};

/// Filename decomposition produced by the pattern layer of the parser.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Release {
    pub original_filename: String,

    pub title: String,

    pub episode_number: f32,

    pub season: Option<u32>,

    pub group: Option<String>,

    pub resolution: Option<String>,
}

/// Structured metadata attached to a candidate once its name parses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedReleaseInfo {
    pub anime_title: String,
    pub episode_number: u32,
    /// `None` means the release does not assert a season.
    pub season_number: Option<u32>,
    pub release_group: Option<String>,
    pub resolution: Option<String>,
    pub is_batch: bool,
}

impl ParsedReleaseInfo {
    /// Group in the bracketed form used by preferred-group settings.
    #[must_use]
    pub fn bracketed_group(&self) -> Option<String> {
        self.release_group.as_ref().map(|g| format!("[{g}]"))
    }
}

/// One result row from the release index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentCandidate {
    pub name: String,
    pub download_url: String,
    pub view_url: String,
    pub info_hash: Option<String>,
    pub size: String,
    pub seeders: u32,
    pub leechers: u32,
    pub downloads: u32,
    pub parsed: Option<ParsedReleaseInfo>,
}

impl TorrentCandidate {
    #[must_use]
    pub fn new(name: impl Into<String>, download_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            download_url: download_url.into(),
            view_url: String::new(),
            info_hash: None,
            size: String::new(),
            seeders: 0,
            leechers: 0,
            downloads: 0,
            parsed: None,
        }
    }

    pub fn attach(&mut self, parsed: ParsedReleaseInfo) {
        self.parsed = Some(parsed);
    }

    #[must_use]
    pub fn episode(&self) -> Option<u32> {
        self.parsed.as_ref().map(|p| p.episode_number)
    }

    #[must_use]
    pub fn magnet_link(&self) -> Option<String> {
        self.info_hash.as_ref().map(|hash| {
            format!(
                "magnet:?xt=urn:btih:{hash}&dn={}",
                urlencoding::encode(&self.name)
            )
        })
    }
}

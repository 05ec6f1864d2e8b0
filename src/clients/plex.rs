use crate::clients::LibraryProvider;
use crate::config::LibraryConfig;
use crate::models::{LibraryHolding, MediaEntry, Season};
use anyhow::{Context, Result, bail};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use unicode_normalization::UnicodeNormalization;

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(rename = "MediaContainer")]
    container: T,
}

#[derive(Deserialize)]
struct SectionContainer {
    #[serde(rename = "Directory", default)]
    directories: Vec<Directory>,
}

#[derive(Deserialize)]
struct Directory {
    key: String,
    title: String,
}

#[derive(Deserialize)]
struct MetadataContainer {
    #[serde(rename = "Metadata", default)]
    metadata: Vec<Metadata>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Metadata {
    #[serde(default)]
    rating_key: String,
    #[serde(default)]
    title: String,
    index: Option<u32>,
    #[serde(default)]
    leaf_count: u32,
    #[serde(default)]
    viewed_leaf_count: u32,
}

/// Folds diacritics and case so `Kōhai` and `kohai` compare equal.
#[must_use]
pub fn fold_title(title: &str) -> String {
    title
        .nfkd()
        .filter(char::is_ascii)
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[must_use]
pub fn title_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&fold_title(a), &fold_title(b))
}

pub struct PlexLibrary {
    client: Client,
    base_url: String,
    token: String,
    section: String,
    match_threshold: f64,
    section_key: OnceCell<String>,
}

impl PlexLibrary {
    #[must_use]
    pub fn new(client: Client, config: &LibraryConfig) -> Self {
        Self {
            client,
            base_url: config.plex_url.trim_end_matches('/').to_string(),
            token: config.plex_token.clone(),
            section: config.plex_section.clone(),
            match_threshold: config.match_threshold,
            section_key: OnceCell::new(),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("X-Plex-Token", &self.token)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await
            .with_context(|| format!("Failed to reach Plex at {url}"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("Plex returned {status} for {path}");
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .with_context(|| format!("Failed to decode Plex response for {path}"))?;
        Ok(envelope.container)
    }

    async fn section_key(&self) -> Result<&str> {
        self.section_key
            .get_or_try_init(|| async {
                let sections: SectionContainer = self.get("/library/sections", &[]).await?;
                sections
                    .directories
                    .into_iter()
                    .find(|d| d.title.eq_ignore_ascii_case(&self.section))
                    .map(|d| d.key)
                    .with_context(|| format!("Plex library section '{}' not found", self.section))
            })
            .await
            .map(String::as_str)
    }

    async fn children(&self, rating_key: &str) -> Result<Vec<Metadata>> {
        let container: MetadataContainer = self
            .get(&format!("/library/metadata/{rating_key}/children"), &[])
            .await?;
        Ok(container.metadata)
    }

    /// Shows for the first title variant with any search hits, narrowed to
    /// titles that match that variant closely enough.
    async fn find_shows(&self, entry: &MediaEntry) -> Result<Vec<Metadata>> {
        let key = self.section_key().await?;
        let path = format!("/library/sections/{key}/all");

        for term in entry.search_terms() {
            let found: MetadataContainer = self.get(&path, &[("type", "2"), ("title", &term)]).await?;
            if found.metadata.is_empty() {
                continue;
            }

            let matches: Vec<Metadata> = found
                .metadata
                .into_iter()
                .filter(|show| title_similarity(&show.title, &term) >= self.match_threshold)
                .collect();

            debug!(term = %term, matches = matches.len(), "Plex search term produced results");
            return Ok(matches);
        }

        Ok(Vec::new())
    }

    async fn build_holding(&self, show: &Metadata) -> Result<LibraryHolding> {
        let mut seasons = Vec::new();

        for season in self.children(&show.rating_key).await? {
            let Some(number) = season.index else {
                continue;
            };
            let episodes = self
                .children(&season.rating_key)
                .await?
                .into_iter()
                .filter_map(|e| e.index);
            let watched = season.leaf_count > 0 && season.viewed_leaf_count >= season.leaf_count;
            seasons.push(Season::new(number, watched, episodes));
        }

        seasons.sort_by_key(|s| s.number);
        Ok(LibraryHolding::new(show.title.clone(), seasons))
    }
}

#[async_trait::async_trait]
impl LibraryProvider for PlexLibrary {
    async fn holding(&self, entry: &MediaEntry) -> Result<Option<LibraryHolding>> {
        let shows = self.find_shows(entry).await?;

        let Some(show) = shows.first() else {
            warn!(
                event = "library_missing",
                title = %entry.title(),
                "Series not found in Plex library"
            );
            return Ok(None);
        };

        if shows.len() > 1 {
            info!(title = %entry.title(), count = shows.len(), "Several Plex shows matched, using the first");
        }

        self.build_holding(show).await.map(Some)
    }
}

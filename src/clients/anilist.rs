use crate::clients::WatchListProvider;
use crate::config::AnilistConfig;
use crate::constants::{intervals, limits};
use crate::models::{ListStatus, MediaEntry};
use anyhow::{Context, Result, bail};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const MEDIA_LIST_QUERY: &str = r"
    query ($userName: String, $status: MediaListStatus) {
        MediaListCollection(userName: $userName, type: ANIME, status: $status) {
            lists {
                name
                entries {
                    id
                    mediaId
                    status
                    score
                    progress
                    priority
                    private
                    hiddenFromStatusLists
                    media {
                        id
                        title { romaji english native userPreferred }
                        synonyms
                        format
                        status
                        episodes
                        seasonYear
                        nextAiringEpisode { id airingAt timeUntilAiring episode }
                    }
                }
            }
        }
    }
";

#[derive(Serialize)]
struct GraphQLRequest<'a> {
    query: &'a str,
    variables: Variables<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Variables<'a> {
    user_name: &'a str,
    status: ListStatus,
}

#[derive(Deserialize)]
struct GraphQLResponse {
    data: Option<Data>,
    #[serde(default)]
    errors: Vec<GraphQLError>,
}

#[derive(Deserialize)]
struct GraphQLError {
    message: String,
}

#[derive(Deserialize)]
struct Data {
    #[serde(rename = "MediaListCollection")]
    collection: Option<MediaListCollection>,
}

#[derive(Deserialize)]
struct MediaListCollection {
    #[serde(default)]
    lists: Vec<MediaList>,
}

#[derive(Deserialize)]
struct MediaList {
    #[serde(default)]
    entries: Vec<MediaEntry>,
}

#[derive(Clone)]
pub struct AnilistClient {
    client: Client,
    api_url: String,
    username: String,
    timeout: Duration,
    retry_delay: Duration,
}

impl AnilistClient {
    #[must_use]
    pub fn new(client: Client, config: &AnilistConfig) -> Self {
        Self {
            client,
            api_url: config.api_url.clone(),
            username: config.username.clone(),
            timeout: Duration::from_secs(u64::from(config.request_timeout_seconds)),
            retry_delay: intervals::WATCHLIST_RETRY_DELAY,
        }
    }

    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    async fn request(&self, status: ListStatus) -> Result<Vec<MediaEntry>> {
        let request_body = GraphQLRequest {
            query: MEDIA_LIST_QUERY,
            variables: Variables {
                user_name: &self.username,
                status,
            },
        };

        let response = self
            .client
            .post(&self.api_url)
            .timeout(self.timeout)
            .json(&request_body)
            .send()
            .await
            .context("Failed to reach AniList")?;

        let http_status = response.status();
        if !http_status.is_success() {
            bail!("AniList returned {http_status}");
        }

        let body: GraphQLResponse = response
            .json()
            .await
            .context("Failed to decode AniList response")?;

        if let Some(error) = body.errors.first() {
            bail!("AniList query failed: {}", error.message);
        }

        let entries: Vec<MediaEntry> = body
            .data
            .and_then(|d| d.collection)
            .map(|c| c.lists.into_iter().flat_map(|l| l.entries).collect())
            .unwrap_or_default();

        Ok(entries)
    }
}

#[async_trait::async_trait]
impl WatchListProvider for AnilistClient {
    async fn entries(&self, status: ListStatus) -> Result<Vec<MediaEntry>> {
        if self.username.is_empty() {
            bail!("anilist.username is not configured");
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.request(status).await {
                Ok(entries) => {
                    debug!(count = entries.len(), status = %status, "Fetched watch list");
                    return Ok(entries);
                }
                Err(e) if attempt < limits::WATCHLIST_ATTEMPTS => {
                    warn!(attempt, error = %e, "Watch list request failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    return Err(e.context(format!(
                        "Watch list unavailable after {attempt} attempts"
                    )));
                }
            }
        }
    }
}

use crate::config::NyaaConfig;
use crate::models::TorrentCandidate;
use crate::services::search::ReleaseIndex;
use anyhow::{Context, Result, bail};
use regex::Regex;
use reqwest::Client;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone)]
pub struct NyaaTorrent {
    pub title: String,
    pub torrent_url: String,
    pub view_url: String,
    pub pub_date: String,
    pub seeders: u32,
    pub leechers: u32,
    pub downloads: u32,
    pub info_hash: String,
    pub size: String,
    pub trusted: bool,
    pub remake: bool,
}

impl From<NyaaTorrent> for TorrentCandidate {
    fn from(t: NyaaTorrent) -> Self {
        let mut candidate = Self::new(t.title, t.torrent_url);
        candidate.view_url = t.view_url;
        candidate.info_hash = (!t.info_hash.is_empty()).then_some(t.info_hash);
        candidate.size = t.size;
        candidate.seeders = t.seeders;
        candidate.leechers = t.leechers;
        candidate.downloads = t.downloads;
        candidate
    }
}

/// Consolidates regexes for XML parsing to avoid per-call overhead.
struct NyaaRegex {
    title: Regex,
    link: Regex,
    guid: Regex,
    pub_date: Regex,
    seeders: Regex,
    leechers: Regex,
    downloads: Regex,
    info_hash: Regex,
    size: Regex,
    trusted: Regex,
    remake: Regex,
    item: Regex,
}

impl NyaaRegex {
    fn get() -> Option<&'static Self> {
        static INSTANCE: OnceLock<Option<NyaaRegex>> = OnceLock::new();
        INSTANCE
            .get_or_init(|| {
                Some(Self {
                    title: Regex::new(r"<title>([^<]*)</title>").ok()?,
                    link: Regex::new(r"<link>([^<]*)</link>").ok()?,
                    guid: Regex::new(r"<guid[^>]*>([^<]*)</guid>").ok()?,
                    pub_date: Regex::new(r"<pubDate>([^<]*)</pubDate>").ok()?,
                    seeders: Regex::new(r"<nyaa:seeders>([^<]*)</nyaa:seeders>").ok()?,
                    leechers: Regex::new(r"<nyaa:leechers>([^<]*)</nyaa:leechers>").ok()?,
                    downloads: Regex::new(r"<nyaa:downloads>([^<]*)</nyaa:downloads>").ok()?,
                    info_hash: Regex::new(r"<nyaa:infoHash>([^<]*)</nyaa:infoHash>").ok()?,
                    size: Regex::new(r"<nyaa:size>([^<]*)</nyaa:size>").ok()?,
                    trusted: Regex::new(r"<nyaa:trusted>([^<]*)</nyaa:trusted>").ok()?,
                    remake: Regex::new(r"<nyaa:remake>([^<]*)</nyaa:remake>").ok()?,
                    item: Regex::new(r"(?s)<item>(.*?)</item>").ok()?,
                })
            })
            .as_ref()
    }
}

fn extract_tag(xml: &str, re: &Regex) -> String {
    re.captures(xml)
        .and_then(|c| c.get(1))
        .map(|m| html_escape::decode_html_entities(m.as_str().trim()).to_string())
        .unwrap_or_default()
}

fn parse_item(item_xml: &str) -> Option<NyaaTorrent> {
    let re = NyaaRegex::get()?;
    Some(NyaaTorrent {
        title: extract_tag(item_xml, &re.title),
        torrent_url: extract_tag(item_xml, &re.link),
        view_url: extract_tag(item_xml, &re.guid),
        pub_date: extract_tag(item_xml, &re.pub_date),
        seeders: extract_tag(item_xml, &re.seeders).parse().unwrap_or(0),
        leechers: extract_tag(item_xml, &re.leechers).parse().unwrap_or(0),
        downloads: extract_tag(item_xml, &re.downloads).parse().unwrap_or(0),
        info_hash: extract_tag(item_xml, &re.info_hash),
        size: extract_tag(item_xml, &re.size),
        trusted: extract_tag(item_xml, &re.trusted).eq_ignore_ascii_case("yes"),
        remake: extract_tag(item_xml, &re.remake).eq_ignore_ascii_case("yes"),
    })
}

pub(crate) fn parse_rss_items(xml: &str) -> Vec<NyaaTorrent> {
    let Some(re) = NyaaRegex::get() else {
        return Vec::new();
    };
    re.item
        .captures_iter(xml)
        .filter_map(|c| c.get(1))
        .filter_map(|m| parse_item(m.as_str()))
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NyaaCategory {
    #[default]
    AnimeEnglish,
    AnimeNonEnglish,
    AnimeRaw,
    AllAnime,
}

impl NyaaCategory {
    const fn as_str(self) -> &'static str {
        match self {
            Self::AnimeEnglish => "1_2",
            Self::AnimeNonEnglish => "1_3",
            Self::AnimeRaw => "1_4",
            Self::AllAnime => "1_0",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "1_2" => Some(Self::AnimeEnglish),
            "1_3" => Some(Self::AnimeNonEnglish),
            "1_4" => Some(Self::AnimeRaw),
            "1_0" => Some(Self::AllAnime),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NyaaFilter {
    NoFilter,
    #[default]
    NoRemakes,
    TrustedOnly,
}

impl NyaaFilter {
    const fn as_str(self) -> &'static str {
        match self {
            Self::NoFilter => "0",
            Self::NoRemakes => "1",
            Self::TrustedOnly => "2",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "none" | "0" => Some(Self::NoFilter),
            "no_remakes" | "1" => Some(Self::NoRemakes),
            "trusted_only" | "2" => Some(Self::TrustedOnly),
            _ => None,
        }
    }
}

/// Paged RSS search against a Nyaa instance.
#[derive(Clone)]
pub struct NyaaClient {
    client: Client,
    base_url: String,
    category: NyaaCategory,
    filter: NyaaFilter,
    timeout: Duration,
}

impl NyaaClient {
    #[must_use]
    pub fn new(client: Client, config: &NyaaConfig) -> Self {
        let category = NyaaCategory::from_code(&config.category).unwrap_or_else(|| {
            debug!(category = %config.category, "Unknown Nyaa category, using 1_2");
            NyaaCategory::default()
        });
        let filter = NyaaFilter::from_name(&config.filter).unwrap_or_default();

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            category,
            filter,
            timeout: Duration::from_secs(u64::from(config.request_timeout_seconds)),
        }
    }

    pub fn search_url(&self, query: &str, page: u32) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("Invalid Nyaa base URL: {}", self.base_url))?;
        url.query_pairs_mut()
            .append_pair("page", "rss")
            .append_pair("q", query)
            .append_pair("c", self.category.as_str())
            .append_pair("f", self.filter.as_str())
            .append_pair("p", &page.to_string());
        Ok(url)
    }

    pub async fn fetch_rss(&self, url: &str) -> Result<Vec<NyaaTorrent>> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .context("Failed to reach Nyaa")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Nyaa returned {status}");
        }

        let xml = response.text().await?;
        Ok(parse_rss_items(&xml))
    }
}

#[async_trait::async_trait]
impl ReleaseIndex for NyaaClient {
    async fn search_page(&self, query: &str, page: u32) -> Result<Vec<TorrentCandidate>> {
        let url = self.search_url(query, page)?;
        debug!(query, page, "Querying Nyaa");
        let torrents = self.fetch_rss(url.as_str()).await?;
        Ok(torrents.into_iter().map(TorrentCandidate::from).collect())
    }
}

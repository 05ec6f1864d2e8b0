use crate::models::{MediaEntry, TorrentCandidate};
use crate::parser::parse_release;
use crate::services::rate_limit::RateLimiter;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A keyword search over a paged release index. Pages start at 1.
#[async_trait::async_trait]
pub trait ReleaseIndex: Send + Sync {
    async fn search_page(&self, query: &str, page: u32) -> Result<Vec<TorrentCandidate>>;
}

/// Query strings for one entry: `"{group} {title} {quality}"` per title
/// variant, in variant order.
#[must_use]
pub fn search_terms(entry: &MediaEntry, preferred_group: &str, quality: Option<&str>) -> Vec<String> {
    entry
        .search_terms()
        .into_iter()
        .map(|title| {
            [Some(preferred_group), Some(title.as_str()), quality]
                .into_iter()
                .flatten()
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

/// Walks the release index one request at a time.
///
/// Terms are tried in order; the first term whose first page is non-empty
/// is paged forward until a page comes back empty. Every request waits on
/// the shared rate limiter first.
///
/// Release names are parsed in process once a term's pages are collected.
/// Parsing touches no remote service, so the limiter only paces index
/// requests and never the parse steps between them.
pub struct SearchDriver {
    index: Arc<dyn ReleaseIndex>,
    limiter: Arc<RateLimiter>,
    max_pages: u32,
}

impl SearchDriver {
    #[must_use]
    pub fn new(index: Arc<dyn ReleaseIndex>, limiter: Arc<RateLimiter>, max_pages: u32) -> Self {
        Self {
            index,
            limiter,
            max_pages: max_pages.max(1),
        }
    }

    async fn fetch_page(&self, term: &str, page: u32) -> Result<Vec<TorrentCandidate>> {
        self.limiter.acquire().await;
        self.index.search_page(term, page).await
    }

    /// Returns every candidate for the first productive term, with parse
    /// results attached where the name parses.
    pub async fn search(&self, terms: &[String]) -> Vec<TorrentCandidate> {
        for term in terms {
            let first = match self.fetch_page(term, 1).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(term = %term, error = %e, "Search request failed, trying next term");
                    continue;
                }
            };

            if first.is_empty() {
                debug!(term = %term, "No results for term");
                continue;
            }

            let mut results = first;
            let mut page = 1;

            loop {
                if page >= self.max_pages {
                    warn!(
                        term = %term,
                        pages = page,
                        "Stopped paging at the configured page limit"
                    );
                    break;
                }
                page += 1;

                match self.fetch_page(term, page).await {
                    Ok(next) if next.is_empty() => break,
                    Ok(next) => results.extend(next),
                    Err(e) => {
                        warn!(term = %term, page, error = %e, "Page request failed, keeping earlier pages");
                        break;
                    }
                }
            }

            info!(
                event = "search_finished",
                term = %term,
                results = results.len(),
                "Release search complete"
            );

            return attach_parsed(results);
        }

        Vec::new()
    }
}

fn attach_parsed(mut candidates: Vec<TorrentCandidate>) -> Vec<TorrentCandidate> {
    for candidate in &mut candidates {
        match parse_release(&candidate.name) {
            Ok(parsed) => candidate.attach(parsed),
            Err(reason) => debug!(
                event = "candidate_decision",
                decision = "reject",
                release = %candidate.name,
                reason = reason.as_str(),
                detail = %reason,
                "Release name rejected by parser"
            ),
        }
    }
    candidates
}

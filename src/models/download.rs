use serde::{Deserialize, Serialize};

/// What the idempotency store remembers about one release name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub name: String,
    pub size: String,
    pub url: String,
    /// Handed off to a download client.
    pub queued: bool,
}

impl DownloadRecord {
    #[must_use]
    pub fn fetched(name: &str, size: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            size: size.to_string(),
            url: url.to_string(),
            queued: false,
        }
    }

    #[must_use]
    pub fn into_queued(self) -> Self {
        Self {
            queued: true,
            ..self
        }
    }
}

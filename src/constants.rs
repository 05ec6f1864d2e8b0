pub const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "webm", "mov", "wmv", "flv", "m4v"];

pub const USER_AGENT: &str = "anisync/0.1";

pub mod endpoints {

    pub const ANILIST_API: &str = "https://graphql.anilist.co";

    pub const NYAA_BASE: &str = "https://nyaa.si";
}

pub mod reconcile {

    /// Holdings with at least this many seasons get season disambiguation.
    pub const DEFAULT_SEASON_THRESHOLD: usize = 2;

    pub const DEFAULT_PREFERRED_GROUP: &str = "[SubsPlease]";

    pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.98;
}

pub mod limits {

    pub const DEFAULT_MAX_PAGES: u32 = 10;

    pub const DEFAULT_HISTORY_LIMIT: u64 = 10;

    pub const WATCHLIST_ATTEMPTS: u32 = 3;
}

pub mod intervals {
    use std::time::Duration;

    pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_millis(1500);

    pub const WATCHLIST_RETRY_DELAY: Duration = Duration::from_secs(2);
}

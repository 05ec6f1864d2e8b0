pub mod download;
pub mod library;
pub mod media;
pub mod release;

pub use download::DownloadRecord;
pub use library::{LibraryHolding, Season};
pub use media::{AiringSchedule, ListStatus, Media, MediaEntry, MediaStatus, MediaTitle};
pub use release::{ParsedReleaseInfo, Release, TorrentCandidate};

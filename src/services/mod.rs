pub mod fetch;
pub mod filter;
pub mod handoff;
pub mod rate_limit;
pub mod reconcile;
pub mod reconciler;
pub mod retry;
pub mod search;

pub use fetch::{DestinationPolicy, FetchError, FetchExecutor, FileTransfer, HttpTransfer, TransferError};
pub use filter::{CandidateFilter, Rejection};
pub use handoff::{DownloadClient, HandOff, QBitDownloadClient, WatchFolderClient};
pub use rate_limit::RateLimiter;
pub use reconcile::{PassSummary, ReconcileParts, ReconcileService};
pub use reconciler::ReconcileError;
pub use retry::{FailureType, RetryDecision, RetryPolicy};
pub use search::{ReleaseIndex, SearchDriver};

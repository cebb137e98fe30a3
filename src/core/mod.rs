pub mod checksum;
pub mod engine;
pub mod executor;
pub mod fetcher;
pub mod metrics;
pub mod path;
pub mod state;
pub mod walker;

pub use checksum::{checksums_match, sha256_hex};
pub use engine::{evaluate, SyncConfig, SyncEngine, SyncReport, SyncStatus};
pub use executor::{Executor, ExecutorOptions};
pub use fetcher::RemoteFetcher;
pub use metrics::{Classification, MetricsSnapshot, SyncMetrics};
pub use state::RemoteStateMap;
pub use walker::{CompareMode, LocalWalker, PendingOperation, WalkOptions};

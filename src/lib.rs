pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;

pub use core::{CompareMode, SyncConfig, SyncEngine, SyncReport, SyncStatus};
pub use error::{SyncAbort, SyncError, SyncPhase};
pub use storage::{create_storage, RemoteObject, Storage, StorageTarget};

pub mod config;
pub mod core;
pub mod error;
pub mod location;
pub mod logging;
pub mod storage;

pub use core::{SyncConfig, SyncDirection, SyncEngine, SyncProgress, SyncReport};
pub use error::SyncError;
pub use location::RemoteLocation;
pub use storage::{FileRecord, Inventory, Locator, ObjectStore, S3Store};

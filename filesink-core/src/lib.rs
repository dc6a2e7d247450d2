//! Core library for filesink – one-way local to remote directory sync.
//!
//! - [`watcher`] detects changes directly inside one local directory
//! - [`local`] lists a local directory into a sorted [`DirectoryListing`]
//! - [`RemoteFs`] is the seam to the remote session
//! - [`SyncCoordinator`] turns changes into uploads and keeps the activity log

mod config;
mod error;
mod filter;
mod listing;
pub mod local;
mod remote;
mod sync;
pub mod utils;
pub mod watcher;

pub use config::{Config, DEFAULT_CONFIG_PATH, DEFAULT_SSH_PORT};
pub use error::{ConfigError, ConnectionError, DirectoryError, TransferError, WatcherError};
pub use filter::PathFilter;
pub use listing::{DirectoryListing, Entry, EntryKind};
pub use remote::RemoteFs;
pub use sync::{LogLevel, LogLine, SyncCoordinator, SyncState};
pub use watcher::{ActionKind, ChangeEvent, DirectoryWatcher};

//! Error types for filesink.
//!
//! Each failure group gets its own enum so callers can match on the exact
//! step that failed.

use std::io;

use thiserror::Error;

/// Failures while establishing a remote session.
///
/// A failed connect always leaves the session disconnected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Address could not be parsed or the TCP connect was refused
    #[error("cannot connect: {0}")]
    SocketFailed(String),

    /// SSH protocol handshake did not complete
    #[error("cannot establish ssh session: {0}")]
    HandshakeFailed(String),

    /// Server does not offer public-key authentication
    #[error("server doesn't support publickey auth")]
    AuthMethodUnsupported,

    /// Private key could not be loaded or was rejected
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// SFTP subsystem could not be started
    #[error("cannot create sftp session: {0}")]
    SubsystemInitFailed(String),

    /// Graceful teardown of the session reported an error
    #[error("failed to shut down session: {0}")]
    ShutdownFailed(String),
}

/// Failures while listing a local or remote directory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// Path does not exist or is not a directory
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Directory exists but may not be read
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Remote directory handle could not be opened
    #[error("failed to open directory {path}: {reason}")]
    OpenFailed {
        /// Directory that was requested
        path: String,
        /// Transport detail
        reason: String,
    },

    /// Enumeration stopped on a transport error rather than end-of-directory
    #[error("failed to read directory {path}: {reason}")]
    ReadFailed {
        /// Directory that was requested
        path: String,
        /// Transport detail
        reason: String,
    },
}

/// Failures while uploading one file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// No live connection to upload through
    #[error("not connected")]
    NotConnected,

    /// Remote file could not be opened for writing
    #[error("failed to open remote file {path}: {reason}")]
    OpenFailed {
        /// Remote path
        path: String,
        /// Transport detail
        reason: String,
    },

    /// Local file could not be read
    #[error("failed to read local file {path}: {reason}")]
    ReadFailed {
        /// Local path
        path: String,
        /// I/O detail
        reason: String,
    },

    /// Remote write was rejected or accepted no bytes
    #[error("failed to write remote file {path}: {reason}")]
    WriteFailed {
        /// Remote path
        path: String,
        /// Transport detail
        reason: String,
    },
}

impl TransferError {
    /// Short name of the failure kind, used in the activity log.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotConnected => "NotConnected",
            Self::OpenFailed { .. } => "OpenFailed",
            Self::ReadFailed { .. } => "ReadFailed",
            Self::WriteFailed { .. } => "WriteFailed",
        }
    }
}

/// Failures of the directory watcher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatcherError {
    /// Directory is missing or the OS refused to watch it
    #[error("cannot create directory handle for file watcher: {0}")]
    CannotOpenDirectory(String),

    /// Releasing the OS watch failed
    #[error("failed to stop file watcher: {0}")]
    TeardownFailed(String),
}

/// Failures of the key=value configuration store.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file exists but could not be read
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Config file path
        path: String,
        /// Underlying I/O error
        source: io::Error,
    },

    /// Config file could not be written
    #[error("failed to open config file for writing {path}: {source}")]
    Write {
        /// Config file path
        path: String,
        /// Underlying I/O error
        source: io::Error,
    },
}

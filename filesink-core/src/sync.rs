//! Turns watcher output into uploads, once per genuine modification.
//!
//! The coordinator owns the per-file "last uploaded modification time"
//! record for the current watch session and the human-readable activity log.
//! It runs inline on the control loop: one change is processed at a time and
//! the record is updated before the upload is awaited, so two changes for the
//! same file can never interleave.

use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::filter::PathFilter;
use crate::remote::RemoteFs;
use crate::utils::local_path;
use crate::watcher::{ActionKind, ChangeEvent};

/// Last uploaded modification time per relative file name.
///
/// Values only ever move forward for a given key.
#[derive(Debug, Default, Clone)]
pub struct SyncState {
    modtimes: HashMap<String, SystemTime>,
}

impl SyncState {
    pub fn last_synced(&self, filename: &str) -> Option<SystemTime> {
        self.modtimes.get(filename).copied()
    }

    /// Record `mtime` for `filename` if it is strictly newer than what is stored.
    ///
    /// Returns whether the record advanced. An absent key counts as older than anything.
    pub fn advance(&mut self, filename: &str, mtime: SystemTime) -> bool {
        match self.modtimes.get_mut(filename) {
            Some(last) if *last >= mtime => false,
            Some(last) => {
                *last = mtime;
                true
            }
            None => {
                self.modtimes.insert(filename.to_string(), mtime);
                true
            }
        }
    }

    pub fn clear(&mut self) {
        self.modtimes.clear();
    }

    pub fn len(&self) -> usize {
        self.modtimes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modtimes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Error,
}

/// One line of the activity log.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub at: DateTime<Local>,
    pub level: LogLevel,
    pub text: String,
}

impl LogLine {
    fn info(text: impl Into<String>) -> Self {
        Self {
            at: Local::now(),
            level: LogLevel::Info,
            text: text.into(),
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            at: Local::now(),
            level: LogLevel::Error,
            text: text.into(),
        }
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at.format("%H:%M:%S"), self.text)
    }
}

/// Decides which changes need an upload and performs it.
#[derive(Debug, Default)]
pub struct SyncCoordinator {
    state: SyncState,
    filter: PathFilter,
    log: Vec<LogLine>,
}

impl SyncCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh watch session for `config.local_dir`.
    ///
    /// Nothing carries over from a previous session: files modified while
    /// unwatched are not caught up.
    pub fn begin(&mut self, config: &Config) {
        self.state.clear();
        self.filter = PathFilter::new(&config.exclude);
        self.log
            .push(LogLine::info(format!("{}: watching for changes", config.local_dir)));
    }

    /// End the current watch session and forget what was synced.
    pub fn end(&mut self) {
        self.state.clear();
        self.log.push(LogLine::info("stopped file watcher"));
    }

    /// Process one poll's worth of changes in delivery order.
    ///
    /// Only `Modified` events drive uploads. Returns the log lines appended
    /// by this call.
    pub async fn on_changes<R: RemoteFs + ?Sized>(
        &mut self,
        changes: &[ChangeEvent],
        remote: &R,
        config: &Config,
    ) -> &[LogLine] {
        let start = self.log.len();
        for change in changes {
            if change.action != ActionKind::Modified {
                debug!("ignoring {:?} for {}", change.action, change.filename);
                continue;
            }
            self.on_modified(&change.filename, remote, config).await;
        }
        &self.log[start..]
    }

    async fn on_modified<R: RemoteFs + ?Sized>(
        &mut self,
        filename: &str,
        remote: &R,
        config: &Config,
    ) {
        if !self.filter.check(filename) {
            debug!("skipping excluded {}", filename);
            return;
        }

        // A rename or delete racing with the event is not an error.
        let local = local_path(&config.local_dir, filename);
        let meta = match tokio::fs::metadata(&local).await {
            Ok(meta) if meta.is_file() => meta,
            _ => {
                debug!("{} is no longer a regular file", local.display());
                return;
            }
        };
        let Ok(mtime) = meta.modified() else {
            warn!("no modification time for {}", local.display());
            return;
        };

        // Advanced before uploading: a failed upload is only retried by a fresh write.
        if !self.state.advance(filename, mtime) {
            debug!("{} unchanged since last upload", filename);
            return;
        }

        match remote
            .upload_file(&config.local_dir, &config.remote_dir, filename)
            .await
        {
            Ok(()) => {
                info!("uploaded {} ({} bytes)", filename, meta.len());
                self.log.push(LogLine::info(format!("{filename}: modified")));
            }
            Err(e) => {
                warn!("upload of {} failed: {}", filename, e);
                self.log.push(LogLine::error(format!(
                    "{filename}: upload failed ({}: {e})",
                    e.kind()
                )));
            }
        }
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn log(&self) -> &[LogLine] {
        &self.log
    }

    /// Append a line that did not come from a change, such as a connection notice.
    pub fn note(&mut self, text: impl Into<String>) {
        self.log.push(LogLine::info(text));
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }
}

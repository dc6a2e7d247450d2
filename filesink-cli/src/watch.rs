//! The control loop: poll the watcher, hand changes to the coordinator, print the log.
//!
//! Everything runs on the current-thread runtime. Uploads are awaited inline,
//! so a slow remote delays the next poll but never overlaps another upload.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use filesink_core::{local, Config, DirectoryWatcher, LogLevel, LogLine, RemoteFs, SyncCoordinator};
use filesink_remote_sftp::RemoteSession;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Bounded wait between two polls of the watcher.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub async fn run(mut session: RemoteSession, config: &mut Config, config_path: &Path) -> Result<()> {
    let listing = local::list(&config.local_dir)
        .with_context(|| format!("cannot list {}", config.local_dir))?;
    info!("{} entries in {}", listing.len(), config.local_dir);
    match session.list_directory(&config.remote_dir).await {
        Ok(remote) => info!("{} entries in remote {}", remote.len(), config.remote_dir),
        Err(e) => warn!("failed to read remote dir: {e}"),
    }
    config.save(config_path)?;

    let mut watcher = DirectoryWatcher::new();
    watcher.start(&config.local_dir)?;

    let mut coordinator = SyncCoordinator::new();
    coordinator.begin(config);
    print_lines(coordinator.log());
    println!("press Ctrl+C to stop");

    let mut tick = tokio::time::interval(POLL_INTERVAL);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = tick.tick() => {
                let changes = watcher.poll();
                if changes.is_empty() {
                    continue;
                }
                let lines = coordinator.on_changes(&changes, &session, config).await;
                print_lines(lines);
            }
        }
    }

    if let Err(e) = watcher.stop() {
        warn!("{e}");
    }
    let seen = coordinator.log().len();
    coordinator.end();
    print_lines(&coordinator.log()[seen..]);

    session.disconnect().await?;
    Ok(())
}

fn print_lines(lines: &[LogLine]) {
    for line in lines {
        match line.level {
            LogLevel::Info => println!("{line}"),
            LogLevel::Error => eprintln!("{line}"),
        }
    }
}

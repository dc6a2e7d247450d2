//! filesink CLI - watch a local directory and push modified files over SFTP.
//!
//! ```bash
//! # pick the directories (saved to ./config.txt)
//! filesink --host 10.0.0.5 --user alice --key ~/.ssh/id_ed25519 local ./site
//! filesink remote /var/www/site
//!
//! # push every modified file until Ctrl+C
//! filesink watch
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use filesink_core::{local, utils, Config, DirectoryListing, EntryKind, RemoteFs, DEFAULT_CONFIG_PATH};
use filesink_remote_sftp::{ConnectParams, RemoteSession};
use tracing::warn;

mod watch;

#[derive(Parser)]
#[command(name = "filesink", version, about = "filesink – push local changes to a remote host over SFTP")]
struct Cli {
    /// Path to the key=value config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Remote user name
    #[arg(long, global = true)]
    user: Option<String>,

    /// Remote address (IP literal or "localhost")
    #[arg(long, global = true)]
    host: Option<String>,

    /// Remote SSH port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// OpenSSH private key used for authentication
    #[arg(long, global = true)]
    key: Option<String>,

    /// Print listings as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List a local directory and make it the sync source
    Local {
        /// Directory to list; defaults to the configured one
        path: Option<String>,
        /// Go to the parent of the configured directory instead
        #[arg(long, conflicts_with = "path")]
        up: bool,
    },
    /// List a remote directory and make it the sync destination
    Remote {
        /// Directory to list; defaults to the configured one
        path: Option<String>,
        /// Go to the parent of the configured directory instead
        #[arg(long, conflicts_with = "path")]
        up: bool,
    },
    /// Upload one file from the local directory
    Upload {
        /// File name relative to the local directory
        file: String,
    },
    /// Watch the local directory and upload modified files until Ctrl+C
    Watch,
    /// Show the effective configuration
    Config,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;
    apply_overrides(&mut config, &cli);

    match cli.command {
        Command::Local { ref path, up } => {
            let path = match (path, up) {
                (Some(p), _) => p.clone(),
                (None, true) => local::parent(&config.local_dir).to_string_lossy().into_owned(),
                (None, false) => config.local_dir.clone(),
            };
            let listing = local::list(&path).with_context(|| format!("cannot list {path}"))?;
            print_listing(&listing, cli.json)?;
            config.local_dir = path;
            config.save(&cli.config)?;
        }
        Command::Remote { ref path, up } => {
            let path = match (path, up) {
                (Some(p), _) => p.clone(),
                (None, true) => utils::remote_parent(&config.remote_dir),
                (None, false) => config.remote_dir.clone(),
            };
            let mut session = connect(&config, &cli).await?;
            let listed = session.list_directory(&path).await;
            disconnect(&mut session).await;
            let listing = listed.context("failed to read remote dir")?;
            print_listing(&listing, cli.json)?;
            config.remote_dir = path;
            config.save(&cli.config)?;
        }
        Command::Upload { ref file } => {
            let mut session = connect(&config, &cli).await?;
            let uploaded = session
                .upload_file(&config.local_dir, &config.remote_dir, file)
                .await;
            disconnect(&mut session).await;
            uploaded?;
            println!("{file}: uploaded to {}", utils::remote_path(&config.remote_dir, file));
        }
        Command::Watch => {
            let session = connect(&config, &cli).await?;
            watch::run(session, &mut config, &cli.config).await?;
        }
        Command::Config => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print!("{}", config.render());
            }
        }
    }
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("warn,filesink=info,filesink_core=info,filesink_remote_sftp=info")
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(user) = &cli.user {
        config.user = user.clone();
    }
    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(key) = &cli.key {
        config.priv_key = key.clone();
    }
}

fn connect_params(config: &Config) -> ConnectParams {
    ConnectParams::new(&config.host, &config.user, &config.priv_key).with_port(config.port)
}

/// Connect and, on success, persist the connection parameters that worked.
async fn connect(config: &Config, cli: &Cli) -> Result<RemoteSession> {
    let mut session = RemoteSession::new();
    session
        .connect(&connect_params(config))
        .await
        .with_context(|| format!("cannot connect to {}@{}", config.user, config.host))?;
    config.save(&cli.config)?;
    Ok(session)
}

async fn disconnect(session: &mut RemoteSession) {
    if let Err(e) = session.disconnect().await {
        warn!("{e}");
    }
}

fn print_listing(listing: &DirectoryListing, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(listing)?);
        return Ok(());
    }
    for entry in listing {
        match entry.kind {
            EntryKind::Directory => println!("{:>12}  {}/", "<dir>", entry.name),
            EntryKind::File => println!("{:>12}  {}", entry.size, entry.name),
        }
    }
    Ok(())
}

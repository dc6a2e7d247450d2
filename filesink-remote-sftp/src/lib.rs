//! SSH/SFTP remote session for filesink.
//!
//! A [`Connection`] bundles the SSH transport and the SFTP subsystem; both
//! are created by [`Connection::connect`] and torn down together by
//! [`Connection::disconnect`]. [`RemoteSession`] wraps at most one live
//! connection for the control loop.

mod ssh_client;
mod utils;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use filesink_core::utils::{local_path, remote_path};
use filesink_core::{
    ConnectionError, DirectoryError, DirectoryListing, Entry, RemoteFs, TransferError,
};
use russh::client::{AuthResult, Handle};
use russh::keys::{load_secret_key, PrivateKeyWithHashAlg};
use russh::Disconnect;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::OpenFlags;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use ssh_client::Client;
use utils::{is_dir_mode, offers_publickey, resolve_addr};

pub use filesink_core::DEFAULT_SSH_PORT;

/// Upper bound on the TCP connect step.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where and as whom to connect.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    /// Address literal or `localhost`
    pub host: String,
    pub port: u16,
    pub user: String,
    pub private_key: String,
    /// Accepted host key fingerprints; `None` accepts any key
    pub allowed_fingerprints: Option<Vec<String>>,
}

impl ConnectParams {
    pub fn new(host: impl Into<String>, user: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            user: user.into(),
            private_key: private_key.into(),
            allowed_fingerprints: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// A live, authenticated SSH session with an open SFTP subsystem.
pub struct Connection {
    session: Handle<Client>,
    sftp: SftpSession,
}

impl Connection {
    /// Connect, authenticate with the private key, and open SFTP.
    ///
    /// Each step reports its own [`ConnectionError`]; nothing is retried.
    pub async fn connect(params: &ConnectParams) -> Result<Self, ConnectionError> {
        let addr = resolve_addr(&params.host, params.port)?;
        info!("connecting to {}", addr);

        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| ConnectionError::SocketFailed(format!("{addr}: timed out")))?
            .map_err(|e| ConnectionError::SocketFailed(format!("{addr}: {e}")))?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay on {}: {e}", addr);
        }

        let config = Arc::new(russh::client::Config::default());
        let handler = Client {
            allowed_fingerprints: params.allowed_fingerprints.clone(),
        };
        let mut session = russh::client::connect_stream(config, stream, handler)
            .await
            .map_err(|e| ConnectionError::HandshakeFailed(e.to_string()))?;

        // Ask for the accepted methods with a "none" request; never fall back to passwords.
        match session
            .authenticate_none(params.user.as_str())
            .await
            .map_err(|e| ConnectionError::HandshakeFailed(e.to_string()))?
        {
            AuthResult::Success => {
                debug!("server accepted {} without credentials", params.user);
            }
            AuthResult::Failure {
                remaining_methods, ..
            } => {
                if !offers_publickey(remaining_methods.iter()) {
                    shutdown_quietly(&session).await;
                    return Err(ConnectionError::AuthMethodUnsupported);
                }
                if let Err(e) = authenticate_key(&mut session, params).await {
                    shutdown_quietly(&session).await;
                    return Err(e);
                }
            }
        }

        let sftp = match open_sftp(&session).await {
            Ok(sftp) => sftp,
            Err(e) => {
                shutdown_quietly(&session).await;
                return Err(e);
            }
        };
        info!("connected to {} as {}", addr, params.user);
        Ok(Self { session, sftp })
    }

    /// Close SFTP, end the SSH session and drop the socket.
    pub async fn disconnect(self) -> Result<(), ConnectionError> {
        let sftp_result = self.sftp.close().await;
        let session_result = self
            .session
            .disconnect(Disconnect::ByApplication, "Normal Shutdown", "en")
            .await;
        info!("disconnected");
        if let Err(e) = sftp_result {
            return Err(ConnectionError::ShutdownFailed(e.to_string()));
        }
        session_result.map_err(|e| ConnectionError::ShutdownFailed(e.to_string()))
    }

    /// List the direct children of a remote directory, sorted by name.
    ///
    /// `.` and `..` are left out. A failure to reach the directory is
    /// [`DirectoryError::OpenFailed`]; a transport error during enumeration is
    /// [`DirectoryError::ReadFailed`] rather than a silently shortened listing.
    pub async fn list_directory(&self, remote_dir: &str) -> Result<DirectoryListing, DirectoryError> {
        debug!("listing remote {}", remote_dir);
        let attrs = self
            .sftp
            .metadata(remote_dir)
            .await
            .map_err(|e| DirectoryError::OpenFailed {
                path: remote_dir.to_string(),
                reason: e.to_string(),
            })?;
        if !is_dir_mode(attrs.permissions) {
            return Err(DirectoryError::NotADirectory(remote_dir.to_string()));
        }

        let read_dir = self
            .sftp
            .read_dir(remote_dir)
            .await
            .map_err(|e| DirectoryError::ReadFailed {
                path: remote_dir.to_string(),
                reason: e.to_string(),
            })?;

        let mut entries = Vec::new();
        for item in read_dir {
            let name = item.file_name();
            if name == "." || name == ".." {
                continue;
            }
            let meta = item.metadata();
            if is_dir_mode(meta.permissions) {
                entries.push(Entry::directory(name));
            } else {
                entries.push(Entry::file(name, meta.size.unwrap_or(0)));
            }
        }
        Ok(DirectoryListing::from_entries(entries))
    }

    /// Upload `local_dir/relative` to `remote_dir/relative`.
    ///
    /// The whole file is read into memory first, so this is bounded to files
    /// that fit in memory. The remote file is created or truncated.
    pub async fn upload_file(
        &self,
        local_dir: &str,
        remote_dir: &str,
        relative: &str,
    ) -> Result<(), TransferError> {
        let remote = remote_path(remote_dir, relative);
        let local = local_path(local_dir, relative);

        let contents = read_local(&local).await?;

        let mut file = self
            .sftp
            .open_with_flags(
                remote.as_str(),
                OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
            )
            .await
            .map_err(|e| TransferError::OpenFailed {
                path: remote.clone(),
                reason: e.to_string(),
            })?;

        let write_failed = |reason: String| TransferError::WriteFailed {
            path: remote.clone(),
            reason,
        };

        let mut remaining = contents.as_slice();
        while !remaining.is_empty() {
            let written = file
                .write(remaining)
                .await
                .map_err(|e| write_failed(e.to_string()))?;
            if written == 0 {
                return Err(write_failed(format!(
                    "remote accepted no bytes with {} remaining",
                    remaining.len()
                )));
            }
            remaining = &remaining[written..];
        }
        file.shutdown()
            .await
            .map_err(|e| write_failed(e.to_string()))?;

        debug!("wrote {} bytes to {}", contents.len(), remote);
        Ok(())
    }
}

#[async_trait]
impl RemoteFs for Connection {
    async fn list_directory(&self, remote_path: &str) -> Result<DirectoryListing, DirectoryError> {
        Connection::list_directory(self, remote_path).await
    }

    async fn upload_file(
        &self,
        local_dir: &str,
        remote_dir: &str,
        relative: &str,
    ) -> Result<(), TransferError> {
        Connection::upload_file(self, local_dir, remote_dir, relative).await
    }
}

async fn authenticate_key(
    session: &mut Handle<Client>,
    params: &ConnectParams,
) -> Result<(), ConnectionError> {
    let key = load_secret_key(&params.private_key, None).map_err(|e| {
        ConnectionError::AuthFailed(format!("cannot load key {}: {e}", params.private_key))
    })?;
    let hash_alg = session
        .best_supported_rsa_hash()
        .await
        .map_err(|e| ConnectionError::AuthFailed(e.to_string()))?
        .flatten();
    let res = session
        .authenticate_publickey(
            params.user.as_str(),
            PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
        )
        .await
        .map_err(|e| ConnectionError::AuthFailed(e.to_string()))?;
    match res {
        AuthResult::Success => Ok(()),
        AuthResult::Failure { .. } => Err(ConnectionError::AuthFailed(format!(
            "key {} rejected for {}",
            params.private_key, params.user
        ))),
    }
}

async fn open_sftp(session: &Handle<Client>) -> Result<SftpSession, ConnectionError> {
    let channel = session
        .channel_open_session()
        .await
        .map_err(|e| ConnectionError::SubsystemInitFailed(e.to_string()))?;
    channel
        .request_subsystem(true, "sftp")
        .await
        .map_err(|e| ConnectionError::SubsystemInitFailed(e.to_string()))?;
    let sftp = SftpSession::new(channel.into_stream())
        .await
        .map_err(|e| ConnectionError::SubsystemInitFailed(e.to_string()))?;
    match sftp.canonicalize(".").await {
        Ok(cwd) => info!("remote working directory: {}", cwd),
        Err(e) => debug!("cannot resolve remote working directory: {e}"),
    }
    Ok(sftp)
}

async fn shutdown_quietly(session: &Handle<Client>) {
    if let Err(e) = session
        .disconnect(Disconnect::ByApplication, "Normal Shutdown", "en")
        .await
    {
        debug!("disconnect after failed connect: {e}");
    }
}

async fn read_local(path: &Path) -> Result<Vec<u8>, TransferError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| TransferError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
}

/// Whether a [`RemoteSession`] currently holds a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Owner of at most one [`Connection`].
///
/// Operations on a disconnected session fail with `NotConnected` /
/// `OpenFailed` instead of panicking.
#[derive(Default)]
pub struct RemoteSession {
    conn: Option<Connection>,
}

impl RemoteSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        if self.conn.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.conn.as_ref()
    }

    /// Connect, tearing down any previous connection first.
    ///
    /// On failure the session is left disconnected.
    pub async fn connect(&mut self, params: &ConnectParams) -> Result<(), ConnectionError> {
        if let Err(e) = self.disconnect().await {
            warn!("closing previous connection: {e}");
        }
        self.conn = Some(Connection::connect(params).await?);
        Ok(())
    }

    /// Tear down the live connection, if any.
    pub async fn disconnect(&mut self) -> Result<(), ConnectionError> {
        match self.conn.take() {
            Some(conn) => conn.disconnect().await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteFs for RemoteSession {
    async fn list_directory(&self, remote_path: &str) -> Result<DirectoryListing, DirectoryError> {
        match &self.conn {
            Some(conn) => conn.list_directory(remote_path).await,
            None => Err(DirectoryError::OpenFailed {
                path: remote_path.to_string(),
                reason: "not connected".to_string(),
            }),
        }
    }

    async fn upload_file(
        &self,
        local_dir: &str,
        remote_dir: &str,
        relative: &str,
    ) -> Result<(), TransferError> {
        match &self.conn {
            Some(conn) => conn.upload_file(local_dir, remote_dir, relative).await,
            None => Err(TransferError::NotConnected),
        }
    }
}

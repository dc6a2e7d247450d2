//! In-process SSH server with an SFTP subsystem backed by a temporary directory.
//!
//! Each [`TestServer`] listens on an ephemeral loopback port and accepts a
//! single public key, written to disk so it can be passed as a key path.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use filesink_remote_sftp::ConnectParams;
use russh::keys::ssh_key::private::Ed25519Keypair;
use russh::keys::ssh_key::LineEnding;
use russh::keys::{PrivateKey, PublicKey};
use russh::server::{Auth, Msg, Session};
use russh::{Channel, ChannelId, MethodKind, MethodSet};
use russh_sftp::protocol::{
    Attrs, File, FileAttributes, Handle, Name, OpenFlags, Status, StatusCode,
};
use tempfile::TempDir;
use tokio::net::TcpListener;

const HOST_KEY_SEED: [u8; 32] = [0x42; 32];
const CLIENT_KEY_SEED: [u8; 32] = [0x17; 32];
const OTHER_KEY_SEED: [u8; 32] = [0x99; 32];

pub struct TestServer {
    pub port: u16,
    /// Directory the SFTP subsystem serves
    pub root: TempDir,
    keys: TempDir,
}

impl TestServer {
    /// Server accepting public-key authentication.
    pub async fn start() -> Self {
        Self::start_with_methods(&[MethodKind::PublicKey]).await
    }

    /// Server advertising only `methods`.
    pub async fn start_with_methods(methods: &[MethodKind]) -> Self {
        let root = TempDir::new().expect("Failed to create server root");
        let keys = TempDir::new().expect("Failed to create key directory");
        write_key(&keys.path().join("id_ed25519"), &CLIENT_KEY_SEED);
        write_key(&keys.path().join("id_other"), &OTHER_KEY_SEED);

        let config = Arc::new(russh::server::Config {
            methods: MethodSet::from(methods),
            auth_rejection_time: Duration::from_millis(10),
            auth_rejection_time_initial: Some(Duration::ZERO),
            keys: vec![PrivateKey::from(Ed25519Keypair::from_seed(&HOST_KEY_SEED))],
            ..Default::default()
        });
        let authorized = PrivateKey::from(Ed25519Keypair::from_seed(&CLIENT_KEY_SEED))
            .public_key()
            .clone();
        let serve_root = root.path().to_path_buf();

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test server");
        let port = listener.local_addr().expect("No local address").port();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let handler = SshSession {
                    authorized: authorized.clone(),
                    root: serve_root.clone(),
                    channels: HashMap::new(),
                };
                let config = config.clone();
                tokio::spawn(async move {
                    if let Ok(session) = russh::server::run_stream(config, socket, handler).await {
                        let _ = session.await;
                    }
                });
            }
        });

        Self { port, root, keys }
    }

    /// Connection parameters for the authorized key.
    pub fn params(&self) -> ConnectParams {
        ConnectParams::new("127.0.0.1", "alice", self.key_path("id_ed25519")).with_port(self.port)
    }

    /// Connection parameters for a well-formed key the server does not accept.
    pub fn params_with_unknown_key(&self) -> ConnectParams {
        ConnectParams::new("127.0.0.1", "alice", self.key_path("id_other")).with_port(self.port)
    }

    /// Remote path of the served root.
    pub fn remote_dir(&self) -> String {
        self.root.path().to_string_lossy().into_owned()
    }

    pub fn remote_subdir(&self, name: &str) -> String {
        self.root.path().join(name).to_string_lossy().into_owned()
    }

    fn key_path(&self, name: &str) -> String {
        self.keys.path().join(name).to_string_lossy().into_owned()
    }
}

fn write_key(path: &Path, seed: &[u8; 32]) {
    PrivateKey::from(Ed25519Keypair::from_seed(seed))
        .write_openssh_file(path, LineEnding::LF)
        .expect("Failed to write private key");
}

struct SshSession {
    authorized: PublicKey,
    root: PathBuf,
    channels: HashMap<ChannelId, Channel<Msg>>,
}

impl russh::server::Handler for SshSession {
    type Error = russh::Error;

    async fn auth_publickey(&mut self, _user: &str, key: &PublicKey) -> Result<Auth, Self::Error> {
        if *key == self.authorized {
            Ok(Auth::Accept)
        } else {
            Ok(Auth::reject())
        }
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        session.close(channel)?;
        Ok(())
    }

    async fn subsystem_request(
        &mut self,
        channel_id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        match (name, self.channels.remove(&channel_id)) {
            ("sftp", Some(channel)) => {
                session.channel_success(channel_id)?;
                let fs = DirFs {
                    root: self.root.clone(),
                    handles: HashMap::new(),
                    next_handle: 0,
                };
                russh_sftp::server::run(channel.into_stream(), fs).await;
            }
            _ => session.channel_failure(channel_id)?,
        }
        Ok(())
    }
}

enum OpenHandle {
    File(fs::File),
    /// Entries not yet returned by `readdir`
    Dir(Option<Vec<File>>),
}

/// SFTP requests served straight from the local filesystem.
struct DirFs {
    root: PathBuf,
    handles: HashMap<String, OpenHandle>,
    next_handle: u64,
}

impl DirFs {
    fn insert(&mut self, handle: OpenHandle) -> String {
        self.next_handle += 1;
        let key = self.next_handle.to_string();
        self.handles.insert(key.clone(), handle);
        key
    }
}

fn status_code(err: io::Error) -> StatusCode {
    match err.kind() {
        io::ErrorKind::NotFound => StatusCode::NoSuchFile,
        io::ErrorKind::PermissionDenied => StatusCode::PermissionDenied,
        _ => StatusCode::Failure,
    }
}

fn ok(id: u32) -> Status {
    Status {
        id,
        status_code: StatusCode::Ok,
        error_message: "Ok".to_string(),
        language_tag: "en-US".to_string(),
    }
}

impl russh_sftp::server::Handler for DirFs {
    type Error = StatusCode;

    fn unimplemented(&self) -> Self::Error {
        StatusCode::OpUnsupported
    }

    async fn open(
        &mut self,
        id: u32,
        filename: String,
        pflags: OpenFlags,
        _attrs: FileAttributes,
    ) -> Result<Handle, Self::Error> {
        let file = OpenOptions::new()
            .read(pflags.contains(OpenFlags::READ))
            .write(pflags.contains(OpenFlags::WRITE))
            .create(pflags.contains(OpenFlags::CREATE))
            .truncate(pflags.contains(OpenFlags::TRUNCATE))
            .open(&filename)
            .map_err(status_code)?;
        let handle = self.insert(OpenHandle::File(file));
        Ok(Handle { id, handle })
    }

    async fn write(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<Status, Self::Error> {
        let Some(OpenHandle::File(file)) = self.handles.get_mut(&handle) else {
            return Err(StatusCode::Failure);
        };
        file.seek(SeekFrom::Start(offset)).map_err(status_code)?;
        file.write_all(&data).map_err(status_code)?;
        Ok(ok(id))
    }

    async fn close(&mut self, id: u32, handle: String) -> Result<Status, Self::Error> {
        match self.handles.remove(&handle) {
            Some(_) => Ok(ok(id)),
            None => Err(StatusCode::Failure),
        }
    }

    async fn stat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let meta = fs::metadata(&path).map_err(status_code)?;
        Ok(Attrs {
            id,
            attrs: FileAttributes::from(&meta),
        })
    }

    async fn lstat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let meta = fs::symlink_metadata(&path).map_err(status_code)?;
        Ok(Attrs {
            id,
            attrs: FileAttributes::from(&meta),
        })
    }

    async fn opendir(&mut self, id: u32, path: String) -> Result<Handle, Self::Error> {
        let meta = fs::metadata(&path).map_err(status_code)?;
        if !meta.is_dir() {
            return Err(StatusCode::NoSuchFile);
        }
        // Real servers report the dot entries too.
        let mut files = vec![
            File::new(".", FileAttributes::from(&meta)),
            File::new("..", FileAttributes::dummy()),
        ];
        for entry in fs::read_dir(&path).map_err(status_code)? {
            let entry = entry.map_err(status_code)?;
            let meta = entry.metadata().map_err(status_code)?;
            files.push(File::new(
                entry.file_name().to_string_lossy().into_owned(),
                FileAttributes::from(&meta),
            ));
        }
        let handle = self.insert(OpenHandle::Dir(Some(files)));
        Ok(Handle { id, handle })
    }

    async fn readdir(&mut self, id: u32, handle: String) -> Result<Name, Self::Error> {
        let Some(OpenHandle::Dir(pending)) = self.handles.get_mut(&handle) else {
            return Err(StatusCode::Failure);
        };
        match pending.take() {
            Some(files) => Ok(Name { id, files }),
            None => Err(StatusCode::Eof),
        }
    }

    async fn realpath(&mut self, id: u32, _path: String) -> Result<Name, Self::Error> {
        Ok(Name {
            id,
            files: vec![File::dummy(self.root.to_string_lossy().into_owned())],
        })
    }
}

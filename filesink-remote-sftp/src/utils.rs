use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use filesink_core::ConnectionError;
use russh::MethodKind;

/// File-type bits of a POSIX mode.
const S_IFMT: u32 = 0o170000;
/// Directory file type.
const S_IFDIR: u32 = 0o040000;

/// Resolve `host` to a socket address.
///
/// Only address literals are accepted, plus `localhost` for the loopback
/// address; name resolution is not performed.
pub(crate) fn resolve_addr(host: &str, port: u16) -> Result<SocketAddr, ConnectionError> {
    let host = host.trim();
    let ip = if host == "localhost" {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    } else {
        host.parse::<IpAddr>()
            .map_err(|_| ConnectionError::SocketFailed(format!("invalid address: {host:?}")))?
    };
    Ok(SocketAddr::new(ip, port))
}

/// Whether the directory bit is set in SFTP permission attributes.
pub(crate) fn is_dir_mode(permissions: Option<u32>) -> bool {
    permissions.is_some_and(|p| p & S_IFMT == S_IFDIR)
}

/// Whether the server lists public-key among the methods it accepts.
pub(crate) fn offers_publickey<'a>(methods: impl IntoIterator<Item = &'a MethodKind>) -> bool {
    methods
        .into_iter()
        .any(|m| matches!(m, MethodKind::PublicKey))
}

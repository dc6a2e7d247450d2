use russh::client::Handler;
use russh::keys::{HashAlg, PublicKey, PublicKeyBase64};
use tracing::{debug, info};

/// Client-side callbacks for the SSH transport.
///
/// With no allow-list every host key is accepted.
pub(crate) struct Client {
    pub allowed_fingerprints: Option<Vec<String>>, // OpenSSH SHA256 fingerprints or base64 keys
}

impl Handler for Client {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fp_sha256 = server_public_key.fingerprint(HashAlg::Sha256).to_string();
        info!("server key fp sha256: {}", fp_sha256);
        if let Some(allowed) = &self.allowed_fingerprints {
            let key_b64 = server_public_key.public_key_base64();
            let ok = allowed.iter().any(|s| s == &fp_sha256 || s == &key_b64);
            debug!("server key allowed: {}", ok);
            return Ok(ok);
        }
        Ok(true)
    }
}

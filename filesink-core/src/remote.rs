use async_trait::async_trait;

use crate::error::{DirectoryError, TransferError};
use crate::listing::DirectoryListing;

/// Remote side of the sync: the operations the coordinator and the
/// navigation commands need from a live connection.
///
/// Implementations are not expected to support concurrent calls; the
/// control loop issues one operation at a time.
#[async_trait]
pub trait RemoteFs: Send + Sync {
    /// List the direct children of `remote_path`, sorted by name.
    async fn list_directory(&self, remote_path: &str) -> Result<DirectoryListing, DirectoryError>;

    /// Upload `local_dir/relative` to `remote_dir/relative`, creating or
    /// truncating the remote file.
    async fn upload_file(
        &self,
        local_dir: &str,
        remote_dir: &str,
        relative: &str,
    ) -> Result<(), TransferError>;
}

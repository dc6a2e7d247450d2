use std::path::{Path, PathBuf};

/// Path with `\` separators turned into `/`.
pub fn as_posix_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Remote destination for `relative` under `remote_dir`.
pub fn remote_path(remote_dir: &str, relative: &str) -> String {
    format!("{}/{}", remote_dir, as_posix_path(Path::new(relative)))
}

/// Local source for `relative` under `local_dir`.
pub fn local_path(local_dir: &str, relative: &str) -> PathBuf {
    Path::new(local_dir).join(relative)
}

/// Parent of a remote directory for "up one" navigation.
///
/// Truncates at the last `/`; a path without one is returned unchanged.
pub fn remote_parent(remote_dir: &str) -> String {
    match remote_dir.rfind('/') {
        Some(0) => "/".to_string(),
        Some(i) => remote_dir[..i].to_string(),
        None => remote_dir.to_string(),
    }
}

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::io;
use std::path::Path;

use crate::error::ConfigError;

/// Standard SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default location of the persisted config, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "./config.txt";

/// Connection parameters and directory prefixes.
///
/// Persisted as one `key=value` line per field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub user: String,
    pub host: String,
    #[serde(default = "Config::default_port")]
    pub port: u16,
    /// Path of the OpenSSH private key used for public-key auth
    pub priv_key: String,
    #[serde(default = "Config::default_dir")]
    pub local_dir: String,
    #[serde(default = "Config::default_dir")]
    pub remote_dir: String,
    /// Glob patterns of file names that are never uploaded
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user: String::new(),
            host: String::new(),
            port: DEFAULT_SSH_PORT,
            priv_key: String::new(),
            local_dir: Self::default_dir(),
            remote_dir: Self::default_dir(),
            exclude: Vec::new(),
        }
    }
}

impl Config {
    fn default_port() -> u16 {
        DEFAULT_SSH_PORT
    }

    fn default_dir() -> String {
        ".".to_string()
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// Parse `key=value` lines. Malformed lines and unknown keys are skipped,
    /// the last occurrence of a key wins.
    pub fn parse(text: &str) -> Self {
        let mut cfg = Self {
            local_dir: String::new(),
            remote_dir: String::new(),
            ..Self::default()
        };
        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim_end_matches('\r');
            match key {
                "user" => cfg.user = value.to_string(),
                "host" => cfg.host = value.to_string(),
                "port" => match value.trim().parse() {
                    Ok(port) => cfg.port = port,
                    Err(_) => tracing::debug!("ignoring invalid port {value:?}"),
                },
                "priv_key" => cfg.priv_key = value.to_string(),
                "local_dir" => cfg.local_dir = value.to_string(),
                "remote_dir" => cfg.remote_dir = value.to_string(),
                "exclude" => {
                    cfg.exclude = value
                        .split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                _ => {}
            }
        }
        if cfg.local_dir.is_empty() {
            cfg.local_dir = Self::default_dir();
        }
        if cfg.remote_dir.is_empty() {
            cfg.remote_dir = Self::default_dir();
        }
        cfg
    }

    /// Render every field as `key=value` lines.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "user={}", self.user);
        let _ = writeln!(out, "host={}", self.host);
        let _ = writeln!(out, "port={}", self.port);
        let _ = writeln!(out, "priv_key={}", self.priv_key);
        let _ = writeln!(out, "local_dir={}", self.local_dir);
        let _ = writeln!(out, "remote_dir={}", self.remote_dir);
        let _ = writeln!(out, "exclude={}", self.exclude.join(","));
        out
    }

    /// Overwrite `path` with the current values.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        std::fs::write(path, self.render()).map_err(|source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_basic() {
        let cfg = Config::parse(
            "user=alice\nhost=10.0.0.5\npriv_key=/keys/id\nlocal_dir=/home/alice/site\nremote_dir=/var/www\n",
        );
        assert_eq!(cfg.user, "alice");
        assert_eq!(cfg.host, "10.0.0.5");
        assert_eq!(cfg.port, DEFAULT_SSH_PORT);
        assert_eq!(cfg.priv_key, "/keys/id");
        assert_eq!(cfg.local_dir, "/home/alice/site");
        assert_eq!(cfg.remote_dir, "/var/www");
        assert!(cfg.exclude.is_empty());
    }

    #[test]
    fn test_parse_skips_bad_lines_and_last_wins() {
        let cfg = Config::parse("garbage\nuser=bob\nport=not-a-port\nmystery=1\nuser=carol\n");
        assert_eq!(cfg.user, "carol");
        assert_eq!(cfg.port, DEFAULT_SSH_PORT);
    }

    #[test]
    fn test_parse_defaults_dirs() {
        let cfg = Config::parse("local_dir=\n");
        assert_eq!(cfg.local_dir, ".");
        assert_eq!(cfg.remote_dir, ".");
    }

    #[test]
    fn test_value_may_contain_equals() {
        let cfg = Config::parse("priv_key=C:/keys/a=b.pem\n");
        assert_eq!(cfg.priv_key, "C:/keys/a=b.pem");
    }

    #[test]
    fn test_exclude_list() {
        let cfg = Config::parse("exclude=*.swp, .git ,,*.tmp\n");
        assert_eq!(cfg.exclude, vec!["*.swp", ".git", "*.tmp"]);
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::load(dir.path().join("config.txt")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.txt");
        let cfg = Config {
            user: "alice".into(),
            host: "localhost".into(),
            port: 2222,
            priv_key: "/keys/id".into(),
            local_dir: "/data".into(),
            remote_dir: "/backup".into(),
            exclude: vec!["*.tmp".into()],
        };
        cfg.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), cfg);
    }
}

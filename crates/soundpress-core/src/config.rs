//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from TOML and carries the
//! sub-configs for the HTTP server, job lifecycle, and external tools. Every
//! section defaults sensibly so a completely empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub jobs: JobsConfig,
    pub tools: ToolsConfig,
}

impl Config {
    /// Deserialize a `Config` from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a file path, falling back to the default
    /// search locations and finally to built-in defaults.
    pub fn load_or_default(custom_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = custom_path {
            return Self::load(path);
        }

        let default_paths = [
            "./soundpress.toml",
            "~/.config/soundpress/config.toml",
            "/etc/soundpress/config.toml",
        ];

        for path_str in default_paths {
            let path = shellexpand::tilde(path_str);
            let path = Path::new(path.as_ref());
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.server.api_key.is_none() {
            warnings.push("server.api_key is not set; the API is open to everyone".into());
        }

        if self.jobs.max_concurrent == 0 {
            warnings.push("jobs.max_concurrent is 0; no job will ever start".into());
        }

        if self.jobs.retention_secs < self.jobs.reclaim_interval_secs {
            warnings.push(
                "jobs.retention_secs is shorter than jobs.reclaim_interval_secs; \
                 finished jobs may outlive their retention window"
                    .into(),
            );
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to.
    pub host: String,

    /// Port to listen on.
    pub port: u16,

    /// Origins allowed by CORS. Empty means any origin is allowed.
    pub allowed_origins: Vec<String>,

    /// API key required in the `X-API-Key` header. `None` disables the
    /// check entirely (development mode).
    pub api_key: Option<String>,

    /// Maximum accepted upload size in megabytes.
    pub max_upload_mb: u64,

    /// Maximum job submissions per minute before 429 is returned.
    pub rate_limit_per_minute: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            allowed_origins: Vec::new(),
            api_key: None,
            max_upload_mb: 100,
            rate_limit_per_minute: 10,
        }
    }
}

impl ServerConfig {
    /// Maximum upload size in bytes.
    pub fn max_upload_bytes(&self) -> usize {
        (self.max_upload_mb as usize) * 1024 * 1024
    }
}

// ---------------------------------------------------------------------------
// JobsConfig
// ---------------------------------------------------------------------------

/// Job lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Directory where uploads and transcoded outputs are stored.
    pub upload_dir: PathBuf,

    /// Maximum number of concurrently running ffmpeg processes. Excess
    /// submissions stay queued until a slot frees up.
    pub max_concurrent: usize,

    /// How long terminal jobs are retained before the reclamation sweep
    /// removes them.
    pub retention_secs: u64,

    /// Interval between reclamation sweeps.
    pub reclaim_interval_secs: u64,

    /// Grace delay after a download response before the job's files are
    /// deleted, so deletion cannot race the streamed response.
    pub download_grace_secs: u64,

    /// Maximum wall-clock time for a single transcode before the job is
    /// failed and the ffmpeg process killed.
    pub transcode_timeout_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("/tmp/soundpress/uploads"),
            max_concurrent: 4,
            retention_secs: 3600,
            reclaim_interval_secs: 600,
            download_grace_secs: 5,
            transcode_timeout_secs: 1800,
        }
    }
}

impl JobsConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.reclaim_interval_secs)
    }

    pub fn transcode_timeout(&self) -> Duration {
        Duration::from_secs(self.transcode_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// ToolsConfig
// ---------------------------------------------------------------------------

/// Paths to external tools, overriding `PATH` lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_valid() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.max_upload_mb, 100);
        assert_eq!(config.jobs.max_concurrent, 4);
        assert_eq!(config.jobs.retention_secs, 3600);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            [server]
            port = 9000

            [jobs]
            max_concurrent = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.jobs.max_concurrent, 2);
        assert_eq!(config.jobs.retention_secs, 3600);
    }

    #[test]
    fn garbage_toml_is_rejected() {
        let result = Config::from_toml("server = \"not a table\"");
        assert!(result.is_err());
    }

    #[test]
    fn validate_warns_on_open_api() {
        let config = Config::default();
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("api_key")));
    }

    #[test]
    fn validate_warns_on_short_retention() {
        let mut config = Config::default();
        config.jobs.retention_secs = 10;
        config.jobs.reclaim_interval_secs = 600;
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("retention")));
    }

    #[test]
    fn max_upload_bytes_conversion() {
        let mut server = ServerConfig::default();
        server.max_upload_mb = 2;
        assert_eq!(server.max_upload_bytes(), 2 * 1024 * 1024);
    }

    #[test]
    fn load_or_default_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = 4000\n").unwrap();

        let config = Config::load_or_default(Some(&path)).unwrap();
        assert_eq!(config.server.port, 4000);
    }
}

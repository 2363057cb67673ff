use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Result, SwitchgenError};

/// Service configuration, loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of render surfaces a batch may use concurrently.
    pub worker_count: usize,
    /// Base URL of the editor deployment that serves `/render-headless`.
    pub renderer_url: String,
    pub server: ServerConfig,
    pub timeouts: Timeouts,
    pub surface: SurfaceRetry,
    pub browser: BrowserSettings,
    pub templates: TemplateStoreConfig,
    pub artifacts: ArtifactConfig,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    #[serde(with = "humantime_serde")]
    pub navigation: Duration,
    #[serde(with = "humantime_serde")]
    pub readiness: Duration,
    #[serde(with = "humantime_serde")]
    pub render: Duration,
    /// Per-command timeout of the DevTools protocol connection.
    #[serde(with = "humantime_serde")]
    pub protocol: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(45),
            readiness: Duration::from_secs(15),
            render: Duration::from_secs(60),
            protocol: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceRetry {
    pub max_attempts: u32,
    /// Delay before retry `n` is `n * backoff_step`.
    #[serde(with = "humantime_serde")]
    pub backoff_step: Duration,
    #[serde(with = "humantime_serde")]
    pub ready_poll: Duration,
    #[serde(with = "humantime_serde")]
    pub render_poll: Duration,
}

impl Default for SurfaceRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_millis(2000),
            ready_poll: Duration::from_millis(100),
            render_poll: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub executable: Option<PathBuf>,
    pub headless: bool,
    /// Disable the Chromium sandbox; needed in most containers.
    pub no_sandbox: bool,
    pub extra_args: Vec<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            no_sandbox: true,
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateStoreConfig {
    /// JSON file holding published templates; in-memory only when unset.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Local,
    Http,
    /// S3-compatible bucket (AWS S3, Cloudflare R2, MinIO).
    S3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub kind: ArtifactKind,
    /// Output directory for `kind = "local"`.
    pub dir: PathBuf,
    /// Object store endpoint; required for `kind = "http"`, optional for `s3`.
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    /// Signing region for `kind = "s3"`; `AWS_REGION` or `auto` when unset.
    pub region: Option<String>,
    /// Public base URL that uploaded keys are appended to.
    pub public_url: Option<String>,
    /// Environment variable holding the bearer token for uploads.
    pub token_env: Option<String>,
    /// Environment variables holding the S3 access key pair.
    pub access_key_env: String,
    pub secret_key_env: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            kind: ArtifactKind::Local,
            dir: PathBuf::from("artifacts"),
            endpoint: None,
            bucket: None,
            region: None,
            public_url: None,
            token_env: Some("ARTIFACT_TOKEN".to_string()),
            access_key_env: "AWS_ACCESS_KEY_ID".to_string(),
            secret_key_env: "AWS_SECRET_ACCESS_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_count: 2,
            renderer_url: "http://localhost:4200".to_string(),
            server: ServerConfig::default(),
            timeouts: Timeouts::default(),
            surface: SurfaceRetry::default(),
            browser: BrowserSettings::default(),
            templates: TemplateStoreConfig::default(),
            artifacts: ArtifactConfig::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Config {
    /// Load config from an explicit path, the central config, or defaults.
    /// Priority: explicit path > ~/.config/switchgen/config.toml > defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let candidate = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::central_config_path().filter(|p| p.exists()),
        };

        match candidate {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)?;
                Self::from_toml(&raw)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| SwitchgenError::Config(e.to_string()))
    }

    pub fn central_config_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| {
            PathBuf::from(home)
                .join(".config")
                .join("switchgen")
                .join("config.toml")
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(SwitchgenError::Config(
                "worker_count must be at least 1".to_string(),
            ));
        }
        if self.renderer_url.trim().is_empty() {
            return Err(SwitchgenError::Config(
                "renderer_url must not be empty".to_string(),
            ));
        }
        if self.surface.max_attempts == 0 {
            return Err(SwitchgenError::Config(
                "surface.max_attempts must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("navigation", self.timeouts.navigation),
            ("readiness", self.timeouts.readiness),
            ("render", self.timeouts.render),
            ("protocol", self.timeouts.protocol),
        ] {
            if value.is_zero() {
                return Err(SwitchgenError::Config(format!(
                    "{name} timeout must be positive"
                )));
            }
        }
        if self.artifacts.kind == ArtifactKind::Http
            && (self.artifacts.endpoint.is_none() || self.artifacts.bucket.is_none())
        {
            return Err(SwitchgenError::Config(
                "artifacts.kind = \"http\" requires artifacts.endpoint and artifacts.bucket"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

//! Destinations for rendered PNGs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::config::{ArtifactConfig, ArtifactKind};
use crate::error::{Result, SwitchgenError};

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Upload failures. These only ever fail the job that produced the image.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("artifact store rejected upload (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("artifact write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact upload request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("object store upload failed: {0}")]
    ObjectStore(#[from] object_store::Error),
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Stores `bytes` under a fresh key and returns its public URL.
    async fn upload(&self, bytes: Vec<u8>, mime_type: &str) -> std::result::Result<String, UploadError>;
}

/// Fresh object key, `<uuid-v4>.png`.
pub fn object_key() -> String {
    format!("{}.png", Uuid::new_v4())
}

fn join_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key)
}

/// Builds the store selected by `[artifacts]`.
pub fn from_config(config: &ArtifactConfig) -> Result<Arc<dyn ArtifactStore>> {
    match config.kind {
        ArtifactKind::Local => Ok(Arc::new(LocalArtifactStore::new(
            &config.dir,
            config.public_url.clone(),
        ))),
        ArtifactKind::Http => {
            let endpoint = config.endpoint.as_deref().ok_or_else(|| {
                SwitchgenError::Config("artifacts.endpoint is required for kind = \"http\"".into())
            })?;
            let bucket = config.bucket.as_deref().ok_or_else(|| {
                SwitchgenError::Config("artifacts.bucket is required for kind = \"http\"".into())
            })?;
            let token = config
                .token_env
                .as_deref()
                .and_then(|name| std::env::var(name).ok())
                .filter(|token| !token.is_empty());

            let mut store = HttpArtifactStore::new(endpoint, bucket)?;
            if let Some(public) = &config.public_url {
                store = store.with_public_url(public);
            }
            if let Some(token) = token {
                store = store.with_token(token);
            }
            Ok(Arc::new(store))
        }
        ArtifactKind::S3 => Ok(Arc::new(S3ArtifactStore::new(s3_settings(config)?)?)),
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Resolves `[artifacts]` for `kind = "s3"`, falling back to the `AWS_*` environment.
fn s3_settings(config: &ArtifactConfig) -> Result<S3Settings> {
    let bucket = config
        .bucket
        .clone()
        .or_else(|| non_empty_env("AWS_S3_BUCKET_NAME"))
        .ok_or_else(|| {
            SwitchgenError::Config(
                "artifacts.bucket (or AWS_S3_BUCKET_NAME) is required for kind = \"s3\"".into(),
            )
        })?;
    Ok(S3Settings {
        bucket,
        region: config
            .region
            .clone()
            .or_else(|| non_empty_env("AWS_REGION"))
            .unwrap_or_else(|| "auto".to_string()),
        endpoint: config.endpoint.clone().or_else(|| non_empty_env("AWS_ENDPOINT")),
        access_key_id: non_empty_env(&config.access_key_env),
        secret_access_key: non_empty_env(&config.secret_key_env),
        public_url: config
            .public_url
            .clone()
            .or_else(|| non_empty_env("AWS_PUBLIC_URL")),
    })
}

/// Connection settings for an S3-compatible bucket (AWS S3, Cloudflare R2, MinIO).
#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint; requests use path-style addressing when set.
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub public_url: Option<String>,
}

impl S3Settings {
    /// URL handed back to callers for `key`.
    ///
    /// A configured public base wins. R2 endpoints are addressed as
    /// `{endpoint}/{bucket}/{key}`; everything else gets the virtual-hosted
    /// AWS form.
    pub fn object_url(&self, key: &str) -> String {
        if let Some(base) = &self.public_url {
            return join_url(base, key);
        }
        match &self.endpoint {
            Some(endpoint) if endpoint.contains("r2.cloudflarestorage.com") => {
                format!("{}/{}/{}", endpoint.trim_end_matches('/'), self.bucket, key)
            }
            _ => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            ),
        }
    }
}

/// Uploads objects with signed `PutObject` requests.
pub struct S3ArtifactStore {
    client: AmazonS3,
    settings: S3Settings,
}

impl S3ArtifactStore {
    pub fn new(settings: S3Settings) -> Result<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&settings.bucket)
            .with_region(&settings.region);
        if let Some(endpoint) = &settings.endpoint {
            Url::parse(endpoint)?;
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }
        if let (Some(key_id), Some(secret)) =
            (&settings.access_key_id, &settings.secret_access_key)
        {
            builder = builder
                .with_access_key_id(key_id)
                .with_secret_access_key(secret);
        }
        let client = builder
            .build()
            .map_err(|e| SwitchgenError::Config(format!("Invalid S3 artifact store: {e}")))?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &S3Settings {
        &self.settings
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn upload(&self, bytes: Vec<u8>, mime_type: &str) -> std::result::Result<String, UploadError> {
        let key = object_key();
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, mime_type.to_string().into());
        let options = PutOptions {
            attributes,
            ..PutOptions::default()
        };
        self.client
            .put_opts(&ObjectPath::from(key.as_str()), PutPayload::from(bytes), options)
            .await?;
        debug!(%key, bucket = %self.settings.bucket, "uploaded artifact");
        Ok(self.settings.object_url(&key))
    }
}

/// Uploads objects with `PUT {endpoint}/{bucket}/{key}`.
#[derive(Debug, Clone)]
pub struct HttpArtifactStore {
    http: Client,
    endpoint: String,
    bucket: String,
    public_url: Option<String>,
    token: Option<String>,
}

impl HttpArtifactStore {
    pub fn new(endpoint: &str, bucket: &str) -> Result<Self> {
        // Validate early; a bad endpoint would otherwise fail every job.
        Url::parse(endpoint)?;
        let http = Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(SwitchgenError::Network)?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.trim_matches('/').to_string(),
            public_url: None,
            token: None,
        })
    }

    pub fn with_public_url(mut self, public_url: &str) -> Self {
        self.public_url = Some(public_url.to_string());
        self
    }

    pub fn with_token(mut self, token: String) -> Self {
        self.token = Some(token);
        self
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }

    fn public_object_url(&self, key: &str) -> String {
        match &self.public_url {
            Some(base) => join_url(base, key),
            None => self.object_url(key),
        }
    }
}

#[async_trait]
impl ArtifactStore for HttpArtifactStore {
    async fn upload(&self, bytes: Vec<u8>, mime_type: &str) -> std::result::Result<String, UploadError> {
        let key = object_key();
        let mut request = self
            .http
            .put(self.object_url(&key))
            .header(CONTENT_TYPE, mime_type)
            .body(bytes);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            debug!(%key, "uploaded artifact");
            return Ok(self.public_object_url(&key));
        }

        let body = response.text().await.unwrap_or_default();
        let message = if body.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("upload rejected")
                .to_string()
        } else {
            body.trim().to_string()
        };
        Err(UploadError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

/// Writes objects into a local directory.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    dir: PathBuf,
    public_url: Option<String>,
}

impl LocalArtifactStore {
    pub fn new(dir: &Path, public_url: Option<String>) -> Self {
        Self {
            dir: dir.to_path_buf(),
            public_url,
        }
    }

    fn url_for(&self, path: &Path, key: &str) -> String {
        match &self.public_url {
            Some(base) => join_url(base, key),
            None => {
                let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
                Url::from_file_path(&absolute)
                    .map(String::from)
                    .unwrap_or_else(|_| absolute.display().to_string())
            }
        }
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn upload(&self, bytes: Vec<u8>, _mime_type: &str) -> std::result::Result<String, UploadError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let key = object_key();
        let path = self.dir.join(&key);
        tokio::fs::write(&path, &bytes).await?;
        debug!(path = %path.display(), "wrote artifact");
        Ok(self.url_for(&path, &key))
    }
}

use crate::artifacts::UploadError;
use crate::browser::SurfaceError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::ParseError;

#[derive(Debug, Error)]
pub enum SwitchgenError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Template \"{0}\" not found")]
    TemplateNotFound(String),

    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Render surface error: {0}")]
    Surface(#[from] SurfaceError),

    #[error("Upload failed: {0}")]
    Upload(#[from] UploadError),

    #[error("Generation queue error: {0}")]
    Queue(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unexpected error: {0}")]
    Unknown(String),
}

impl SwitchgenError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        SwitchgenError::BadRequest(message.into())
    }

    pub fn launch(message: impl Into<String>) -> Self {
        SwitchgenError::Launch(message.into())
    }

    /// True for failures caused by the caller's request rather than the service.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            SwitchgenError::BadRequest(_) | SwitchgenError::TemplateNotFound(_)
        )
    }

    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            SwitchgenError::Io(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Check file paths/permissions for the template store and artifact directory.",
            ),
            SwitchgenError::Network(e) => ErrorPayload::new(
                ErrorCategory::Network,
                e.to_string(),
                "Check that the switchgen service is running and reachable (--api-base).",
            ),
            SwitchgenError::InvalidUrl(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Verify URL/format (e.g., http://localhost:3000).",
            ),
            SwitchgenError::Serialization(e) => ErrorPayload::new(
                ErrorCategory::Request,
                e.to_string(),
                "Check the JSON payload (template, sizes, elements, variations).",
            ),
            SwitchgenError::BadRequest(msg) => ErrorPayload::new(
                ErrorCategory::Request,
                msg.to_string(),
                "Send {\"template\": \"<apiName>\"} with optional sizes/elements/variations.",
            ),
            SwitchgenError::TemplateNotFound(name) => ErrorPayload::new(
                ErrorCategory::Template,
                format!("Template \"{}\" not found", name),
                "Publish the template from the editor first; `switchgen templates` lists known api names.",
            ),
            SwitchgenError::Launch(msg) => ErrorPayload::new(
                ErrorCategory::Browser,
                msg.to_string(),
                "Install Chromium or set [browser].executable; containers usually need no_sandbox = true.",
            ),
            SwitchgenError::Surface(err) => ErrorPayload::new(
                ErrorCategory::Browser,
                err.to_string(),
                "Verify renderer_url serves /render-headless and exposes window.renderDesign.",
            ),
            SwitchgenError::Upload(err) => {
                let message = err.to_string();
                let lower = message.to_ascii_lowercase();
                if lower.contains("credential") || lower.contains("401") || lower.contains("403")
                {
                    ErrorPayload::new(
                        ErrorCategory::Storage,
                        message,
                        "Artifact store credentials were rejected; check [artifacts].token_env (http) or access_key_env/secret_key_env (s3) and bucket permissions.",
                    )
                } else {
                    ErrorPayload::new(
                        ErrorCategory::Storage,
                        message,
                        "Check the [artifacts] endpoint/bucket or local directory.",
                    )
                }
            }
            SwitchgenError::Queue(msg) => ErrorPayload::new(
                ErrorCategory::Unknown,
                msg.to_string(),
                "Retry the request; check service logs if it keeps failing.",
            ),
            SwitchgenError::Config(msg) => {
                let lower = msg.to_ascii_lowercase();
                if lower.contains("timeout") {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Timeouts must be positive (e.g., navigation = \"45s\", render = \"60s\").",
                    )
                } else if lower.contains("renderer") {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Set renderer_url (or FRONTEND_URL) to the editor deployment serving /render-headless.",
                    )
                } else {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Check the config file and CLI flags (--workers, --port, --renderer-url).",
                    )
                }
            }
            SwitchgenError::Unknown(msg) => ErrorPayload::new(
                ErrorCategory::Unknown,
                msg.to_string(),
                "Re-run with --verbose; file an issue if persistent.",
            ),
        }
    }
}

pub type Result<T> = std::result::Result<T, SwitchgenError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Request,
    Template,
    Browser,
    Storage,
    Config,
    Network,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl ErrorPayload {
    pub fn new(category: ErrorCategory, message: String, remediation: impl Into<String>) -> Self {
        Self {
            category,
            message,
            remediation: Some(remediation.into()),
        }
    }
}

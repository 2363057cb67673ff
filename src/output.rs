//! JSON bodies of the HTTP API, shared by the server and the CLI client.

use serde::{Deserialize, Serialize};

use crate::error::ErrorPayload;
use crate::templates::TemplateElement;
use crate::types::{RenderResult, TemplateSummary};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub success: bool,
    #[serde(rename = "duration_ms")]
    pub duration_ms: u64,
    pub sizes: Vec<RenderResult>,
    pub count: usize,
}

impl GenerateResponse {
    pub fn failed_count(&self) -> usize {
        self.sizes.iter().filter(|r| !r.success).count()
    }
}

/// Body of every request-level failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(
        rename = "duration_ms",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorPayload>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            duration_ms: None,
            details: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_details(mut self, details: ErrorPayload) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub success: bool,
    pub browser_connected: bool,
    pub browser_generation: u64,
    pub queue_length: usize,
    pub busy: bool,
    pub worker_count: usize,
    pub uptime_secs: u64,
    /// Resident set size of the service process, when the platform reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_usage_mb: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateListResponse {
    pub success: bool,
    pub templates: Vec<TemplateSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDetailResponse {
    pub success: bool,
    pub api_name: String,
    pub display_name: String,
    pub elements: Vec<TemplateElement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub success: bool,
    pub message: String,
}

//! Core types used throughout the switchgen library.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use time::OffsetDateTime;

use crate::size::Size;

/// Per-element property overwrites keyed by element name.
///
/// Values are opaque to the orchestrator and handed to the renderer untouched.
pub type Overwrites = BTreeMap<String, Value>;

/// A published template as stored by the template store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    pub api_name: String,
    #[serde(default)]
    pub display_name: String,
    /// Renderer configuration document (canvas objects, fonts, frame).
    #[serde(default)]
    pub configuration: Value,
    #[serde(default = "OffsetDateTime::now_utc", with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Listing view of a template without its configuration payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSummary {
    pub id: String,
    pub api_name: String,
    pub display_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<&Template> for TemplateSummary {
    fn from(template: &Template) -> Self {
        Self {
            id: template.id.clone(),
            api_name: template.api_name.clone(),
            display_name: template.display_name.clone(),
            updated_at: template.updated_at,
        }
    }
}

/// One unit of render work.
///
/// `original_index` is fixed when the job list is built and is the only key
/// used to restore the caller's ordering.
#[derive(Debug, Clone)]
pub struct Job {
    pub original_index: usize,
    pub variation_index: usize,
    pub size: Size,
    pub elements: Arc<Overwrites>,
}

/// Outcome of one job as returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderResult {
    pub size: Size,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub variation_index: usize,
}

impl RenderResult {
    pub fn succeeded(job: &Job, url: String) -> Self {
        Self {
            size: job.size,
            success: true,
            url: Some(url),
            error: None,
            variation_index: job.variation_index,
        }
    }

    pub fn failed(job: &Job, error: impl Into<String>) -> Self {
        Self {
            size: job.size,
            success: false,
            url: None,
            error: Some(error.into()),
            variation_index: job.variation_index,
        }
    }
}

/// A render result still tagged with its ordering key.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub original_index: usize,
    pub result: RenderResult,
}

impl JobOutcome {
    pub fn success(job: &Job, url: String) -> Self {
        Self {
            original_index: job.original_index,
            result: RenderResult::succeeded(job, url),
        }
    }

    pub fn failure(job: &Job, error: impl Into<String>) -> Self {
        Self {
            original_index: job.original_index,
            result: RenderResult::failed(job, error),
        }
    }
}

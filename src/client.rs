//! HTTP client for a running switchgen service, used by the CLI.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{Result, SwitchgenError};
use crate::output::{
    ErrorResponse, GenerateResponse, HealthResponse, TemplateDetailResponse, TemplateListResponse,
};
use crate::types::GenerateRequest;

pub const DEFAULT_API_BASE: &str = "http://localhost:3000";
/// Batches can take minutes; the server never cancels a running one.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref())?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SwitchgenError::Network)?;
        Ok(Self { http, base_url })
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let url = self.endpoint("/api/health")?;
        self.send_json(self.http.get(url), None).await
    }

    pub async fn list_templates(&self) -> Result<TemplateListResponse> {
        let url = self.endpoint("/api/templates")?;
        self.send_json(self.http.get(url), None).await
    }

    pub async fn template(&self, api_name: &str) -> Result<TemplateDetailResponse> {
        let mut url = self.endpoint("/api/templates")?;
        url.path_segments_mut()
            .map_err(|_| SwitchgenError::Config("api base cannot be a base URL".into()))?
            .push(api_name);
        self.send_json(self.http.get(url), Some(api_name)).await
    }

    pub async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let url = self.endpoint("/api/v1/generate")?;
        self.send_json(self.http.post(url).json(request), Some(&request.template))
            .await
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        template: Option<&str>,
    ) -> Result<T> {
        let response = request.send().await.map_err(SwitchgenError::Network)?;
        let status = response.status();
        let body = response.text().await.map_err(SwitchgenError::Network)?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(SwitchgenError::Serialization);
        }
        Err(api_error(status, &body, template))
    }
}

/// Maps a non-2xx response back onto the error the server reported.
fn api_error(status: StatusCode, body: &str, template: Option<&str>) -> SwitchgenError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|parsed| parsed.error)
        .unwrap_or_else(|_| format!("service returned status {}", status.as_u16()));

    match (status, template) {
        (StatusCode::BAD_REQUEST, _) => SwitchgenError::BadRequest(message),
        (StatusCode::NOT_FOUND, Some(name)) => SwitchgenError::TemplateNotFound(name.to_string()),
        _ => SwitchgenError::Unknown(format!("{message} (HTTP {})", status.as_u16())),
    }
}

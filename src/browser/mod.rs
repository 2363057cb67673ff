//! Headless browser layer for template rendering.
//!
//! The orchestrator only talks to the browser through the traits defined here,
//! so the scheduling logic can run against a real Chromium or the in-crate mock.
//!
//! # Module Structure
//!
//! - [`lifecycle`] - Shared browser process: lazy launch, relaunch after disconnect
//! - [`surface`] - Render surfaces (renderer tabs) and their retrying factory
//! - [`executor`] - One render-and-extract cycle on a ready surface
//! - [`chromium`] - Chromium driver over the DevTools protocol

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::types::Overwrites;
use crate::{Result, Size};

mod chromium;
mod executor;
mod lifecycle;
#[cfg(test)]
pub(crate) mod mock;
mod surface;

pub use chromium::{ChromiumEngine, CHROME_ARGS};
pub use executor::{decode_data_url, ExecutorSettings, RenderExecutor};
pub use lifecycle::BrowserLifecycle;
pub use surface::{renderer_endpoint, RenderSurface, SurfaceFactory, SurfaceSettings, SurfaceState};

pub type SurfaceResult<T> = std::result::Result<T, SurfaceError>;

/// How a surface failure affects the surface that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceErrorKind {
    /// The tab or its session is gone; the surface must be replaced.
    Fatal,
    /// The render failed but the surface can take the next job.
    Job,
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SurfaceError {
    kind: SurfaceErrorKind,
    message: String,
}

impl SurfaceError {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: SurfaceErrorKind::Fatal,
            message: message.into(),
        }
    }

    pub fn job(message: impl Into<String>) -> Self {
        Self {
            kind: SurfaceErrorKind::Job,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> SurfaceErrorKind {
        self.kind
    }

    pub fn is_fatal(&self) -> bool {
        self.kind == SurfaceErrorKind::Fatal
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Renderer completion flags as read from the page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderState {
    pub complete: bool,
    pub has_image: bool,
}

impl RenderState {
    pub fn is_done(&self) -> bool {
        self.complete && self.has_image
    }
}

/// Launches browser processes.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn BrowserSession>>;
}

/// A running browser process shared by all workers of a batch.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// False once the underlying connection has gone away.
    fn is_connected(&self) -> bool;

    /// Short identification for logs (debugger endpoint, pid).
    fn describe(&self) -> String;

    async fn open_tab(&self) -> SurfaceResult<Box<dyn RendererTab>>;

    async fn close(&self) -> SurfaceResult<()>;
}

/// One browser tab speaking the headless renderer protocol.
///
/// Implementations perform single round trips; waiting and timeouts are the
/// caller's job.
#[async_trait]
pub trait RendererTab: Send {
    async fn disable_cache(&mut self) -> SurfaceResult<()>;

    async fn navigate(&mut self, url: &str) -> SurfaceResult<()>;

    /// Whether the renderer entry point is callable yet.
    async fn renderer_ready(&mut self) -> SurfaceResult<bool>;

    async fn set_viewport(&mut self, size: Size) -> SurfaceResult<()>;

    async fn reset_render_state(&mut self) -> SurfaceResult<()>;

    async fn start_render(
        &mut self,
        configuration: &Value,
        overwrites: &Overwrites,
        size: Size,
    ) -> SurfaceResult<()>;

    async fn render_state(&mut self) -> SurfaceResult<RenderState>;

    /// The published image payload (a PNG data URL), if any.
    async fn rendered_image(&mut self) -> SurfaceResult<Option<String>>;

    async fn close(self: Box<Self>) -> SurfaceResult<()>;
}

impl fmt::Debug for dyn RendererTab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RendererTab")
    }
}

impl fmt::Debug for dyn BrowserSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowserSession")
            .field("describe", &self.describe())
            .field("connected", &self.is_connected())
            .finish()
    }
}

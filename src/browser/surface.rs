//! Render surfaces and the factory that primes them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::{BrowserSession, RendererTab, SurfaceError, SurfaceResult};
use crate::config::Config;

/// Path of the renderer page served by the editor deployment.
const RENDER_PATH: &str = "/render-headless";

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

/// Builds the renderer URL from the configured base.
///
/// A base without scheme is treated as https.
pub fn renderer_endpoint(base: &str) -> String {
    let base = base.trim().trim_end_matches('/');
    if base.starts_with("http://") || base.starts_with("https://") {
        format!("{base}{RENDER_PATH}")
    } else {
        format!("https://{base}{RENDER_PATH}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    Ready,
    Rendering,
    Closed,
}

/// A navigated renderer tab owned by exactly one worker.
#[derive(Debug)]
pub struct RenderSurface {
    id: u64,
    state: SurfaceState,
    tab: Option<Box<dyn RendererTab>>,
}

impl RenderSurface {
    fn new(tab: Box<dyn RendererTab>) -> Self {
        Self {
            id: NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed),
            state: SurfaceState::Ready,
            tab: Some(tab),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SurfaceState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: SurfaceState) {
        self.state = state;
    }

    pub(crate) fn tab(&mut self) -> SurfaceResult<&mut Box<dyn RendererTab>> {
        self.tab
            .as_mut()
            .ok_or_else(|| SurfaceError::fatal(format!("Render surface {} is closed", self.id)))
    }

    /// Releases the tab; close errors are logged and swallowed.
    pub async fn close(mut self) {
        self.state = SurfaceState::Closed;
        if let Some(tab) = self.tab.take() {
            if let Err(err) = tab.close().await {
                debug!(surface = self.id, error = %err, "ignoring tab close error");
            }
        }
    }
}

/// Timing knobs for surface creation.
#[derive(Debug, Clone)]
pub struct SurfaceSettings {
    pub max_attempts: u32,
    pub backoff_step: Duration,
    pub navigation_timeout: Duration,
    pub readiness_timeout: Duration,
    pub ready_poll: Duration,
}

impl Default for SurfaceSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SurfaceSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_attempts: config.surface.max_attempts.max(1),
            backoff_step: config.surface.backoff_step,
            navigation_timeout: config.timeouts.navigation,
            readiness_timeout: config.timeouts.readiness,
            ready_poll: config.surface.ready_poll,
        }
    }
}

/// Opens renderer tabs and waits for the renderer to come up, with retries.
#[derive(Debug, Clone)]
pub struct SurfaceFactory {
    endpoint: String,
    settings: SurfaceSettings,
}

impl SurfaceFactory {
    pub fn new(renderer_base_url: &str, settings: SurfaceSettings) -> Self {
        Self {
            endpoint: renderer_endpoint(renderer_base_url),
            settings,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Creates a ready surface, retrying with linear backoff.
    pub async fn create(&self, session: &dyn BrowserSession) -> SurfaceResult<RenderSurface> {
        let attempts = self.settings.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            debug!(url = %self.endpoint, attempt, attempts, "opening renderer tab");
            match self.try_create(session).await {
                Ok(surface) => {
                    info!(surface = surface.id(), attempt, "renderer surface ready");
                    return Ok(surface);
                }
                Err(err) => {
                    warn!(attempt, attempts, error = %err, "renderer surface attempt failed");
                    last_error = Some(err);
                    if attempt < attempts {
                        let delay = self.settings.backoff_step * attempt;
                        debug!(?delay, "retrying renderer surface");
                        sleep(delay).await;
                    }
                }
            }
        }

        let detail = last_error
            .map(|err| err.to_string())
            .unwrap_or_else(|| "no attempt made".to_string());
        Err(SurfaceError::fatal(format!(
            "Failed to create render surface after {attempts} attempts: {detail}"
        )))
    }

    async fn try_create(&self, session: &dyn BrowserSession) -> SurfaceResult<RenderSurface> {
        let mut tab = session.open_tab().await?;
        match self.prime(tab.as_mut()).await {
            Ok(()) => Ok(RenderSurface::new(tab)),
            Err(err) => {
                if let Err(close_err) = tab.close().await {
                    debug!(error = %close_err, "ignoring close error on failed tab");
                }
                Err(err)
            }
        }
    }

    async fn prime(&self, tab: &mut dyn RendererTab) -> SurfaceResult<()> {
        if let Err(err) = tab.disable_cache().await {
            debug!(error = %err, "could not disable tab cache");
        }

        timeout(self.settings.navigation_timeout, tab.navigate(&self.endpoint))
            .await
            .map_err(|_| {
                SurfaceError::fatal(format!(
                    "Navigation to {} timed out after {:?}",
                    self.endpoint, self.settings.navigation_timeout
                ))
            })??;

        let poll = self.settings.ready_poll;
        let wait_ready = async {
            loop {
                if tab.renderer_ready().await? {
                    return Ok::<(), SurfaceError>(());
                }
                sleep(poll).await;
            }
        };
        timeout(self.settings.readiness_timeout, wait_ready)
            .await
            .map_err(|_| {
                SurfaceError::fatal(format!(
                    "Renderer entry point not available after {:?}",
                    self.settings.readiness_timeout
                ))
            })?
    }
}

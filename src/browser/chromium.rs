//! Chromium driver over the DevTools protocol.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::SetCacheDisabledParams;
use chromiumoxide::cdp::js_protocol::runtime::{EvaluateParams, EventExceptionThrown};
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{BrowserEngine, BrowserSession, RenderState, RendererTab, SurfaceError, SurfaceResult};
use crate::config::{BrowserSettings, Config};
use crate::types::Overwrites;
use crate::{Result, Size, SwitchgenError};

/// Launch flags tuned for long-lived headless rendering inside containers.
pub const CHROME_ARGS: &[&str] = &[
    "--disable-setuid-sandbox",
    "--disable-web-security",
    "--allow-file-access-from-files",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-extensions",
    "--disable-background-networking",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-breakpad",
    "--disable-component-update",
    "--disable-default-apps",
    "--disable-domain-reliability",
    "--disable-hang-monitor",
    "--disable-ipc-flooding-protection",
    "--disable-popup-blocking",
    "--disable-prompt-on-repost",
    "--disable-renderer-backgrounding",
    "--disable-sync",
    "--disable-translate",
    "--metrics-recording-only",
    "--no-first-run",
    "--safebrowsing-disable-auto-update",
    "--single-process",
    "--no-zygote",
];

const READY_EXPR: &str = "typeof window.renderDesign === 'function'";
const RESET_EXPR: &str = "window.renderComplete = false, window.renderedImage = null, true";
const STATE_EXPR: &str =
    "({ complete: window.renderComplete === true, hasImage: !!window.renderedImage })";
const IMAGE_EXPR: &str = "window.renderedImage || null";

/// Maps a protocol error onto the surface failure taxonomy.
///
/// Transport and target errors mean the tab (or the whole browser) is gone.
/// Script exceptions and timeouts leave the tab usable.
fn classify(err: CdpError) -> SurfaceError {
    match err {
        CdpError::Ws(_)
        | CdpError::NoResponse
        | CdpError::ChannelSendError(_)
        | CdpError::FrameNotFound(_)
        | CdpError::Chrome(_)
        | CdpError::Io(_) => SurfaceError::fatal(err.to_string()),
        other => SurfaceError::job(other.to_string()),
    }
}

fn start_render_expr(configuration: &Value, overwrites: &Overwrites, size: Size) -> String {
    // JSON literals are valid JavaScript object expressions.
    let configuration = configuration.to_string();
    let overwrites = serde_json::to_string(overwrites).unwrap_or_else(|_| "{}".to_string());
    format!(
        "window.renderDesign({configuration}, {overwrites}, {}, {}), true",
        size.width, size.height
    )
}

/// Launches local Chromium processes via chromiumoxide.
#[derive(Debug, Clone)]
pub struct ChromiumEngine {
    settings: BrowserSettings,
    protocol_timeout: Duration,
}

impl ChromiumEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            settings: config.browser.clone(),
            protocol_timeout: config.timeouts.protocol,
        }
    }

    fn browser_config(&self) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(self.protocol_timeout)
            .args(CHROME_ARGS.iter().copied())
            .args(self.settings.extra_args.iter().map(String::as_str));
        if self.settings.no_sandbox {
            builder = builder.no_sandbox();
        }
        if !self.settings.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.settings.executable {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(SwitchgenError::Config)
    }
}

#[async_trait]
impl BrowserEngine for ChromiumEngine {
    async fn launch(&self) -> Result<Arc<dyn BrowserSession>> {
        let config = self.browser_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| SwitchgenError::launch(e.to_string()))?;

        let connected = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&connected);
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    if matches!(err, CdpError::Ws(_)) {
                        warn!(error = %err, "browser connection lost");
                        break;
                    }
                    debug!(error = %err, "browser handler event error");
                }
            }
            flag.store(false, Ordering::SeqCst);
        });

        let endpoint = browser.websocket_address().clone();
        Ok(Arc::new(ChromiumSession {
            browser: Mutex::new(browser),
            endpoint,
            connected,
            handler_task,
        }))
    }
}

struct ChromiumSession {
    browser: Mutex<Browser>,
    endpoint: String,
    connected: Arc<AtomicBool>,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.handler_task.is_finished()
    }

    fn describe(&self) -> String {
        self.endpoint.clone()
    }

    async fn open_tab(&self) -> SurfaceResult<Box<dyn RendererTab>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(|e| SurfaceError::fatal(format!("Failed to open tab: {e}")))?;

        let errors = match page.event_listener::<EventExceptionThrown>().await {
            Ok(mut events) => Some(tokio::spawn(async move {
                while let Some(event) = events.next().await {
                    warn!(target: "renderer", error = %event.exception_details.text, "page error");
                }
            })),
            Err(err) => {
                debug!(error = %err, "page error listener unavailable");
                None
            }
        };

        Ok(Box::new(ChromiumTab { page, errors }))
    }

    async fn close(&self) -> SurfaceResult<()> {
        let result = self.browser.lock().await.close().await;
        self.connected.store(false, Ordering::SeqCst);
        self.handler_task.abort();
        result.map(|_| ()).map_err(classify)
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

struct ChromiumTab {
    page: Page,
    errors: Option<JoinHandle<()>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageState {
    complete: bool,
    has_image: bool,
}

impl ChromiumTab {
    async fn eval<T: DeserializeOwned>(&self, expression: &str) -> SurfaceResult<T> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(SurfaceError::job)?;
        let result = self.page.evaluate_expression(params).await.map_err(classify)?;
        result
            .into_value()
            .map_err(|e| SurfaceError::job(format!("Unexpected renderer result: {e}")))
    }
}

#[async_trait]
impl RendererTab for ChromiumTab {
    async fn disable_cache(&mut self) -> SurfaceResult<()> {
        self.page
            .execute(SetCacheDisabledParams::new(true))
            .await
            .map(|_| ())
            .map_err(classify)
    }

    async fn navigate(&mut self, url: &str) -> SurfaceResult<()> {
        self.page
            .goto(url)
            .await
            .map(|_| ())
            .map_err(|e| SurfaceError::fatal(format!("Navigation failed: {e}")))
    }

    async fn renderer_ready(&mut self) -> SurfaceResult<bool> {
        self.eval(READY_EXPR).await
    }

    async fn set_viewport(&mut self, size: Size) -> SurfaceResult<()> {
        let params = SetDeviceMetricsOverrideParams::new(
            i64::from(size.width),
            i64::from(size.height),
            1.0,
            false,
        );
        self.page.execute(params).await.map(|_| ()).map_err(classify)
    }

    async fn reset_render_state(&mut self) -> SurfaceResult<()> {
        self.eval::<bool>(RESET_EXPR).await.map(|_| ())
    }

    async fn start_render(
        &mut self,
        configuration: &Value,
        overwrites: &Overwrites,
        size: Size,
    ) -> SurfaceResult<()> {
        let expression = start_render_expr(configuration, overwrites, size);
        self.eval::<bool>(&expression).await.map(|_| ())
    }

    async fn render_state(&mut self) -> SurfaceResult<RenderState> {
        let state: PageState = self.eval(STATE_EXPR).await?;
        Ok(RenderState {
            complete: state.complete,
            has_image: state.has_image,
        })
    }

    async fn rendered_image(&mut self) -> SurfaceResult<Option<String>> {
        self.eval(IMAGE_EXPR).await
    }

    async fn close(self: Box<Self>) -> SurfaceResult<()> {
        let ChromiumTab { page, errors } = *self;
        if let Some(errors) = errors {
            errors.abort();
        }
        page.close().await.map_err(classify)
    }
}

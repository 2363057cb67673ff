//! Scripted in-process browser used by the orchestrator tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;

use super::{
    BrowserEngine, BrowserSession, RenderState, RendererTab, SurfaceError, SurfaceResult,
};
use crate::artifacts::{ArtifactStore, UploadError};
use crate::types::Overwrites;
use crate::{Result, Size, SwitchgenError};

/// PNG signature followed by a few bytes; enough for format sniffing.
pub(crate) const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

pub(crate) fn png_data_url() -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(PNG_BYTES))
}

/// Behaviour of the mock renderer for one size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MockRender {
    Ok,
    /// Never sets the completion flag.
    NeverComplete,
    /// Signals completion but the payload is gone on extraction.
    VanishingImage,
    /// First render of this size kills the tab, later ones succeed.
    CrashOnce,
    /// Every render of this size kills the tab.
    Crash,
    /// Renderer throws; the tab stays usable.
    ScriptError,
    /// The whole browser goes away mid-render.
    KillBrowser,
}

#[derive(Debug, Clone)]
pub(crate) struct RenderCall {
    pub size: Size,
    pub overwrites: Overwrites,
    pub configuration: Value,
}

#[derive(Default)]
pub(crate) struct MockStats {
    launches: AtomicUsize,
    sessions_closed: AtomicUsize,
    tabs_opened: AtomicUsize,
    active_tabs: AtomicUsize,
    peak_tabs: AtomicUsize,
    resets: AtomicUsize,
    launch_failures: AtomicUsize,
    navigation_failures: AtomicUsize,
    navigation_hangs: AtomicUsize,
    never_ready: AtomicBool,
    render_delay: Mutex<Duration>,
    plan: Mutex<HashMap<Size, MockRender>>,
    crashed: Mutex<HashSet<Size>>,
    viewports: Mutex<Vec<Size>>,
    calls: Mutex<Vec<RenderCall>>,
    last_navigation: Mutex<Option<String>>,
    sessions: Mutex<Vec<Arc<MockSession>>>,
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl MockStats {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.sessions_closed.load(Ordering::SeqCst)
    }

    pub fn tabs_opened(&self) -> usize {
        self.tabs_opened.load(Ordering::SeqCst)
    }

    pub fn active_tabs(&self) -> usize {
        self.active_tabs.load(Ordering::SeqCst)
    }

    pub fn peak_tabs(&self) -> usize {
        self.peak_tabs.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn viewports(&self) -> Vec<Size> {
        self.viewports.lock().unwrap().clone()
    }

    pub fn render_calls(&self) -> Vec<RenderCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_navigation(&self) -> Option<String> {
        self.last_navigation.lock().unwrap().clone()
    }
}

#[derive(Clone, Default)]
pub(crate) struct MockEngine {
    stats: Arc<MockStats>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_launches(self, count: usize) -> Self {
        self.fail_launches(count);
        self
    }

    /// Makes the next `count` launches fail, from any point in a test.
    pub fn fail_launches(&self, count: usize) {
        self.stats.launch_failures.store(count, Ordering::SeqCst);
    }

    pub fn failing_navigations(self, count: usize) -> Self {
        self.stats.navigation_failures.store(count, Ordering::SeqCst);
        self
    }

    /// The next `count` navigations never finish.
    pub fn hanging_navigations(self, count: usize) -> Self {
        self.stats.navigation_hangs.store(count, Ordering::SeqCst);
        self
    }

    pub fn never_ready(self) -> Self {
        self.stats.never_ready.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_render(self, size: Size, render: MockRender) -> Self {
        self.stats.plan.lock().unwrap().insert(size, render);
        self
    }

    /// Makes every render take `delay`, so concurrent workers overlap.
    pub fn with_render_delay(self, delay: Duration) -> Self {
        *self.stats.render_delay.lock().unwrap() = delay;
        self
    }

    pub fn engine(&self) -> Arc<dyn BrowserEngine> {
        Arc::new(self.clone())
    }

    pub fn stats(&self) -> &MockStats {
        &self.stats
    }

    pub fn disconnect_all(&self) {
        for session in self.stats.sessions.lock().unwrap().iter() {
            session.connected.store(false, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl BrowserEngine for MockEngine {
    async fn launch(&self) -> Result<Arc<dyn BrowserSession>> {
        let id = self.stats.launches.fetch_add(1, Ordering::SeqCst) + 1;
        if take_one(&self.stats.launch_failures) {
            return Err(SwitchgenError::launch("mock chrome exited during startup"));
        }
        let session = Arc::new(MockSession {
            id,
            connected: Arc::new(AtomicBool::new(true)),
            stats: Arc::clone(&self.stats),
        });
        self.stats
            .sessions
            .lock()
            .unwrap()
            .push(Arc::clone(&session));
        Ok(session)
    }
}

pub(crate) struct MockSession {
    id: usize,
    connected: Arc<AtomicBool>,
    stats: Arc<MockStats>,
}

#[async_trait]
impl BrowserSession for MockSession {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn describe(&self) -> String {
        format!("mock-browser-{}", self.id)
    }

    async fn open_tab(&self) -> SurfaceResult<Box<dyn RendererTab>> {
        if !self.is_connected() {
            return Err(SurfaceError::fatal("Session closed"));
        }
        self.stats.tabs_opened.fetch_add(1, Ordering::SeqCst);
        let active = self.stats.active_tabs.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak_tabs.fetch_max(active, Ordering::SeqCst);
        Ok(Box::new(MockTab {
            stats: Arc::clone(&self.stats),
            session: Arc::clone(&self.connected),
            complete: false,
            image: None,
            vanish: false,
        }))
    }

    async fn close(&self) -> SurfaceResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.stats.sessions_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MockTab {
    stats: Arc<MockStats>,
    session: Arc<AtomicBool>,
    complete: bool,
    image: Option<String>,
    vanish: bool,
}

#[async_trait]
impl RendererTab for MockTab {
    async fn disable_cache(&mut self) -> SurfaceResult<()> {
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> SurfaceResult<()> {
        *self.stats.last_navigation.lock().unwrap() = Some(url.to_string());
        if take_one(&self.stats.navigation_hangs) {
            std::future::pending::<()>().await;
        }
        if take_one(&self.stats.navigation_failures) {
            return Err(SurfaceError::fatal(
                "Navigation failed: net::ERR_CONNECTION_REFUSED",
            ));
        }
        Ok(())
    }

    async fn renderer_ready(&mut self) -> SurfaceResult<bool> {
        Ok(!self.stats.never_ready.load(Ordering::SeqCst))
    }

    async fn set_viewport(&mut self, size: Size) -> SurfaceResult<()> {
        self.stats.viewports.lock().unwrap().push(size);
        Ok(())
    }

    async fn reset_render_state(&mut self) -> SurfaceResult<()> {
        self.stats.resets.fetch_add(1, Ordering::SeqCst);
        self.complete = false;
        self.image = None;
        self.vanish = false;
        Ok(())
    }

    async fn start_render(
        &mut self,
        configuration: &Value,
        overwrites: &Overwrites,
        size: Size,
    ) -> SurfaceResult<()> {
        self.stats.calls.lock().unwrap().push(RenderCall {
            size,
            overwrites: overwrites.clone(),
            configuration: configuration.clone(),
        });

        let delay = *self.stats.render_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let plan = self
            .stats
            .plan
            .lock()
            .unwrap()
            .get(&size)
            .copied()
            .unwrap_or(MockRender::Ok);

        match plan {
            MockRender::Ok => self.finish(),
            MockRender::NeverComplete => {}
            MockRender::VanishingImage => {
                self.finish();
                self.vanish = true;
            }
            MockRender::CrashOnce => {
                if self.stats.crashed.lock().unwrap().insert(size) {
                    return Err(SurfaceError::fatal("Target closed"));
                }
                self.finish();
            }
            MockRender::Crash => return Err(SurfaceError::fatal("Session closed")),
            MockRender::KillBrowser => {
                self.session.store(false, Ordering::SeqCst);
                return Err(SurfaceError::fatal("Browser closed unexpectedly"));
            }
            MockRender::ScriptError => {
                return Err(SurfaceError::job(
                    "TypeError: Cannot read properties of undefined (reading 'objects')",
                ))
            }
        }
        Ok(())
    }

    async fn render_state(&mut self) -> SurfaceResult<RenderState> {
        Ok(RenderState {
            complete: self.complete,
            has_image: self.image.is_some(),
        })
    }

    async fn rendered_image(&mut self) -> SurfaceResult<Option<String>> {
        if self.vanish {
            return Ok(None);
        }
        Ok(self.image.clone())
    }

    async fn close(self: Box<Self>) -> SurfaceResult<()> {
        self.stats.active_tabs.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

impl MockTab {
    fn finish(&mut self) {
        self.complete = true;
        self.image = Some(png_data_url());
    }
}

/// Artifact store that keeps uploads in memory.
#[derive(Default)]
pub(crate) struct MemoryArtifacts {
    uploads: Mutex<Vec<Vec<u8>>>,
    fail: AtomicBool,
}

impl MemoryArtifacts {
    pub fn failing() -> Self {
        let store = Self::default();
        store.fail.store(true, Ordering::SeqCst);
        store
    }

    pub fn count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifacts {
    async fn upload(&self, bytes: Vec<u8>, mime_type: &str) -> std::result::Result<String, UploadError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(UploadError::Rejected {
                status: 403,
                message: "invalid credentials".to_string(),
            });
        }
        assert_eq!(mime_type, "image/png");
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push(bytes);
        Ok(format!("memory://{}.png", uploads.len()))
    }
}

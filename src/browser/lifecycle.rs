//! Owner of the single shared browser process.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{BrowserEngine, BrowserSession};
use crate::Result;

/// Arbitrates access to the process-wide browser.
///
/// The slot mutex is held across a launch, so callers arriving while a launch
/// is in flight wait for it and get the same session back.
pub struct BrowserLifecycle {
    engine: Arc<dyn BrowserEngine>,
    slot: Mutex<Option<Arc<dyn BrowserSession>>>,
    generation: AtomicU64,
}

impl BrowserLifecycle {
    pub fn new(engine: Arc<dyn BrowserEngine>) -> Self {
        Self {
            engine,
            slot: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Returns the connected browser, launching a new one if needed.
    pub async fn acquire(&self) -> Result<Arc<dyn BrowserSession>> {
        let mut slot = self.slot.lock().await;

        if let Some(session) = slot.as_ref() {
            if session.is_connected() {
                return Ok(Arc::clone(session));
            }
            warn!(
                browser = %session.describe(),
                generation = self.generation(),
                "browser disconnected; relaunching"
            );
            *slot = None;
        }

        info!("launching persistent browser");
        let session = self.engine.launch().await.map_err(|err| {
            warn!(error = %err, "failed to launch browser");
            err
        })?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            browser = %session.describe(),
            generation,
            "persistent browser ready"
        );

        *slot = Some(Arc::clone(&session));
        Ok(session)
    }

    /// Launches the browser ahead of the first request.
    pub async fn prewarm(&self) {
        match self.acquire().await {
            Ok(_) => info!("browser pre-warmed and ready"),
            Err(err) => warn!(error = %err, "browser pre-warm failed; will retry on first request"),
        }
    }

    /// Non-blocking connection check; false while a launch is in flight.
    pub fn is_connected(&self) -> bool {
        match self.slot.try_lock() {
            Ok(slot) => slot.as_ref().is_some_and(|session| session.is_connected()),
            Err(_) => false,
        }
    }

    /// Number of successful launches so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Closes the browser if one is running.
    pub async fn shutdown(&self) {
        let session = self.slot.lock().await.take();
        if let Some(session) = session {
            info!(browser = %session.describe(), "closing browser");
            if let Err(err) = session.close().await {
                warn!(error = %err, "browser close failed");
            }
        }
    }
}

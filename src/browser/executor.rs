//! Drives one render-and-extract cycle on a ready surface.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::ImageFormat;
use tokio::time::{sleep, timeout};
use tracing::debug;

use super::{RenderSurface, SurfaceError, SurfaceResult, SurfaceState};
use crate::config::Config;
use crate::types::{Overwrites, Template};
use crate::Size;

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub render_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ExecutorSettings {
    fn from(config: &Config) -> Self {
        Self {
            render_timeout: config.timeouts.render,
            poll_interval: config.surface.render_poll,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RenderExecutor {
    settings: ExecutorSettings,
}

impl RenderExecutor {
    pub fn new(settings: ExecutorSettings) -> Self {
        Self { settings }
    }

    /// Renders `template` with `overwrites` at `size` and returns PNG bytes.
    ///
    /// A fatal error leaves the surface marked closed; any other outcome
    /// returns it to `Ready`.
    pub async fn render(
        &self,
        surface: &mut RenderSurface,
        template: &Template,
        overwrites: &Overwrites,
        size: Size,
    ) -> SurfaceResult<Vec<u8>> {
        surface.set_state(SurfaceState::Rendering);
        let result = self.run(surface, template, overwrites, size).await;
        surface.set_state(match &result {
            Err(err) if err.is_fatal() => SurfaceState::Closed,
            _ => SurfaceState::Ready,
        });
        result
    }

    async fn run(
        &self,
        surface: &mut RenderSurface,
        template: &Template,
        overwrites: &Overwrites,
        size: Size,
    ) -> SurfaceResult<Vec<u8>> {
        let surface_id = surface.id();
        let tab = surface.tab()?;

        tab.set_viewport(size).await?;
        // Surfaces are reused, so flags from the previous job must not leak.
        tab.reset_render_state().await?;

        debug!(surface = surface_id, %size, "starting render");
        tab.start_render(&template.configuration, overwrites, size)
            .await?;

        let poll = self.settings.poll_interval;
        let wait_done = async {
            loop {
                if tab.render_state().await?.is_done() {
                    return Ok::<(), SurfaceError>(());
                }
                sleep(poll).await;
            }
        };
        timeout(self.settings.render_timeout, wait_done)
            .await
            .map_err(|_| {
                SurfaceError::job(format!(
                    "Render timed out after {:?} waiting for completion at {size}",
                    self.settings.render_timeout
                ))
            })??;

        let data_url = tab.rendered_image().await?.unwrap_or_default();
        let bytes = decode_data_url(&data_url)?;
        debug!(surface = surface_id, %size, bytes = bytes.len(), "render complete");
        Ok(bytes)
    }
}

/// Strips a `data:<mime>;base64,` prefix and decodes the PNG payload.
pub fn decode_data_url(data_url: &str) -> SurfaceResult<Vec<u8>> {
    let payload = match data_url.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data_url,
    };
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(SurfaceError::job("Failed to retrieve rendered image"));
    }

    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| SurfaceError::job(format!("Rendered image is not valid base64: {e}")))?;

    match image::guess_format(&bytes) {
        Ok(ImageFormat::Png) => Ok(bytes),
        _ => Err(SurfaceError::job("Rendered image is not a PNG")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::{png_data_url, MockEngine, MockRender, PNG_BYTES};
    use crate::browser::{BrowserEngine, SurfaceFactory, SurfaceSettings};
    use serde_json::json;
    use time::OffsetDateTime;

    fn template() -> Template {
        Template {
            id: "t-1".into(),
            api_name: "promo".into(),
            display_name: "Promo".into(),
            configuration: json!({"objects": []}),
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    async fn surface(engine: &MockEngine) -> RenderSurface {
        let session = engine.engine().launch().await.unwrap();
        SurfaceFactory::new("http://localhost:4200", SurfaceSettings::default())
            .create(session.as_ref())
            .await
            .unwrap()
    }

    #[test]
    fn decode_strips_png_prefix() {
        let bytes = decode_data_url(&png_data_url()).expect("decode");
        assert_eq!(bytes, PNG_BYTES);
    }

    #[test]
    fn decode_rejects_empty_payload() {
        let err = decode_data_url("data:image/png;base64,").unwrap_err();
        assert_eq!(err.message(), "Failed to retrieve rendered image");
        assert!(!err.is_fatal());
        assert!(decode_data_url("").is_err());
    }

    #[test]
    fn decode_rejects_non_png_bytes() {
        let err = decode_data_url("data:image/png;base64,aGVsbG8=").unwrap_err();
        assert!(err.message().contains("not a PNG"));
    }

    #[tokio::test(start_paused = true)]
    async fn render_returns_png_and_resets_state_between_jobs() {
        let engine = MockEngine::new();
        let mut surface = surface(&engine).await;
        let executor = RenderExecutor::default();

        for size in [Size::new(600, 800), Size::new(1200, 628)] {
            let bytes = executor
                .render(&mut surface, &template(), &Overwrites::new(), size)
                .await
                .expect("render");
            assert_eq!(bytes, PNG_BYTES);
            assert_eq!(surface.state(), SurfaceState::Ready);
        }

        assert_eq!(engine.stats().resets(), 2);
        assert_eq!(
            engine.stats().viewports(),
            vec![Size::new(600, 800), Size::new(1200, 628)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn render_times_out_when_renderer_never_completes() {
        let engine = MockEngine::new().with_render(Size::new(666, 666), MockRender::NeverComplete);
        let mut surface = surface(&engine).await;
        let executor = RenderExecutor::new(ExecutorSettings {
            render_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(50),
        });

        let started = tokio::time::Instant::now();
        let err = executor
            .render(&mut surface, &template(), &Overwrites::new(), Size::new(666, 666))
            .await
            .unwrap_err();

        assert!(started.elapsed() >= Duration::from_secs(60));
        assert!(!err.is_fatal());
        assert!(err.message().contains("timed out"));
        assert_eq!(surface.state(), SurfaceState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_without_payload_fails_the_job() {
        let engine = MockEngine::new().with_render(Size::new(10, 10), MockRender::VanishingImage);
        let mut surface = surface(&engine).await;

        let err = RenderExecutor::default()
            .render(&mut surface, &template(), &Overwrites::new(), Size::new(10, 10))
            .await
            .unwrap_err();

        assert_eq!(err.message(), "Failed to retrieve rendered image");
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_marks_surface_closed() {
        let engine = MockEngine::new().with_render(Size::new(20, 20), MockRender::CrashOnce);
        let mut surface = surface(&engine).await;

        let err = RenderExecutor::default()
            .render(&mut surface, &template(), &Overwrites::new(), Size::new(20, 20))
            .await
            .unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(surface.state(), SurfaceState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn overwrites_and_configuration_reach_the_renderer() {
        let engine = MockEngine::new();
        let mut surface = surface(&engine).await;
        let mut overwrites = Overwrites::new();
        overwrites.insert("headline".into(), json!({"text": "Hello"}));

        RenderExecutor::default()
            .render(&mut surface, &template(), &overwrites, Size::new(300, 250))
            .await
            .expect("render");

        let calls = engine.stats().render_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].size, Size::new(300, 250));
        assert_eq!(calls[0].overwrites["headline"]["text"], "Hello");
        assert_eq!(calls[0].configuration, json!({"objects": []}));
    }
}

//! Request-level generation flow: validate, look up, queue, fan out, reorder.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::artifacts::ArtifactStore;
use crate::browser::{
    BrowserEngine, BrowserLifecycle, ExecutorSettings, RenderExecutor, SurfaceFactory,
    SurfaceSettings,
};
use crate::config::Config;
use crate::error::{Result, SwitchgenError};
use crate::queue::AdmissionQueue;
use crate::scheduler::WorkerPool;
use crate::templates::TemplateStore;
use crate::types::{GenerateRequest, Job, RenderResult, RequestShape};

/// Expands a request shape into the flat job list.
///
/// Indices run depth-first: every size of variation 0, then variation 1, and
/// so on. Single-mode jobs all carry variation 0.
pub fn build_jobs(shape: &RequestShape) -> Vec<Job> {
    let mut jobs = Vec::new();
    match shape {
        RequestShape::Single { sizes, elements } => {
            for size in sizes {
                jobs.push(Job {
                    original_index: jobs.len(),
                    variation_index: 0,
                    size: *size,
                    elements: Arc::clone(elements),
                });
            }
        }
        RequestShape::Batch { variations } => {
            for (variation_index, variation) in variations.iter().enumerate() {
                for size in &variation.sizes {
                    jobs.push(Job {
                        original_index: jobs.len(),
                        variation_index,
                        size: *size,
                        elements: Arc::clone(&variation.elements),
                    });
                }
            }
        }
    }
    jobs
}

/// Per-job results of one request, in request order.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub results: Vec<RenderResult>,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl GenerationOutcome {
    fn new(results: Vec<RenderResult>, elapsed: Duration) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = results.len() - succeeded;
        Self {
            results,
            succeeded,
            failed,
            elapsed,
        }
    }
}

/// Ties the template store, admission queue and worker pool together.
pub struct GenerationOrchestrator {
    templates: Arc<dyn TemplateStore>,
    lifecycle: Arc<BrowserLifecycle>,
    pool: Arc<WorkerPool>,
    queue: AdmissionQueue,
    worker_count: usize,
}

impl GenerationOrchestrator {
    /// Builds the orchestrator; spawns the queue consumer, so call it inside a
    /// tokio runtime. The browser is not launched until first use.
    pub fn new(
        config: &Config,
        engine: Arc<dyn BrowserEngine>,
        templates: Arc<dyn TemplateStore>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        let lifecycle = Arc::new(BrowserLifecycle::new(engine));
        let factory = SurfaceFactory::new(&config.renderer_url, SurfaceSettings::from(config));
        let executor = RenderExecutor::new(ExecutorSettings::from(config));
        let pool = WorkerPool::new(factory, executor, Arc::clone(&lifecycle), artifacts);

        Self {
            templates,
            lifecycle,
            pool: Arc::new(pool),
            queue: AdmissionQueue::new(),
            worker_count: config.worker_count.max(1),
        }
    }

    pub fn lifecycle(&self) -> &Arc<BrowserLifecycle> {
        &self.lifecycle
    }

    pub fn templates(&self) -> &Arc<dyn TemplateStore> {
        &self.templates
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    pub fn is_busy(&self) -> bool {
        self.queue.is_busy()
    }

    /// Renders every job of `request` and returns per-job results.
    ///
    /// Fails as a whole only for request-level problems: bad input, unknown
    /// template, browser launch failure, or a broken queue. Everything else
    /// is reported per job.
    pub async fn generate(&self, request: GenerateRequest) -> Result<GenerationOutcome> {
        let started = Instant::now();

        let api_name = request.template.trim().to_string();
        if api_name.is_empty() {
            return Err(SwitchgenError::bad_request("Template apiName is required"));
        }

        let shape = RequestShape::from_request(&request);
        if let Some(size) = shape.sizes().into_iter().find(|size| size.is_empty()) {
            return Err(SwitchgenError::bad_request(format!(
                "Invalid size {size}: width and height must be positive"
            )));
        }

        // Checked before queueing so unknown names fail fast.
        let template = self
            .templates
            .get_by_api_name(&api_name)
            .await?
            .ok_or_else(|| SwitchgenError::TemplateNotFound(api_name.clone()))?;

        let jobs = build_jobs(&shape);
        if jobs.is_empty() {
            info!(template = %api_name, "request has no sizes; nothing to render");
            return Ok(GenerationOutcome::new(Vec::new(), started.elapsed()));
        }

        let total = jobs.len();
        let position = self.queue.depth() + usize::from(self.queue.is_busy());
        if position > 0 {
            info!(template = %api_name, position, "request queued");
        }
        info!(template = %api_name, mode = shape.mode(), jobs = total, "generation requested");

        let lifecycle = Arc::clone(&self.lifecycle);
        let pool = Arc::clone(&self.pool);
        let template = Arc::new(template);
        let worker_count = self.worker_count;

        let mut outcomes = self
            .queue
            .enqueue(async move {
                let session = lifecycle.acquire().await?;
                Ok(pool.run(jobs, session, template, worker_count).await)
            })
            .await?;

        if outcomes.len() != total {
            warn!(expected = total, actual = outcomes.len(), "job count mismatch");
        }
        outcomes.sort_by_key(|outcome| outcome.original_index);
        let results = outcomes.into_iter().map(|outcome| outcome.result).collect();

        let outcome = GenerationOutcome::new(results, started.elapsed());
        info!(
            template = %api_name,
            succeeded = outcome.succeeded,
            total,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "generation complete"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::{MemoryArtifacts, MockEngine, MockRender};
    use crate::templates::MemoryTemplateStore;
    use crate::types::{Template, Variation};
    use crate::Size;
    use serde_json::json;
    use time::OffsetDateTime;

    fn template() -> Template {
        Template {
            id: "t-1".into(),
            api_name: "promo".into(),
            display_name: "Promo".into(),
            configuration: json!({"objects": [{"name": "headline", "type": "textbox"}]}),
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn orchestrator(engine: &MockEngine, workers: usize) -> GenerationOrchestrator {
        let mut config = Config::default();
        config.worker_count = workers;
        GenerationOrchestrator::new(
            &config,
            engine.engine(),
            Arc::new(MemoryTemplateStore::with_templates([template()])),
            Arc::new(MemoryArtifacts::default()),
        )
    }

    fn request(value: serde_json::Value) -> GenerateRequest {
        serde_json::from_value(value).expect("request json")
    }

    #[test]
    fn build_jobs_orders_depth_first() {
        let shape = RequestShape::from_request(&request(json!({
            "template": "promo",
            "variations": [
                {"sizes": [{"width": 1, "height": 1}, {"width": 2, "height": 2}]},
                {"sizes": [{"width": 3, "height": 3}]}
            ]
        })));

        let jobs = build_jobs(&shape);
        let tagged: Vec<(usize, usize, u32)> = jobs
            .iter()
            .map(|j| (j.original_index, j.variation_index, j.size.width))
            .collect();
        assert_eq!(tagged, vec![(0, 0, 1), (1, 0, 2), (2, 1, 3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn single_mode_renders_requested_size_with_elements() {
        let engine = MockEngine::new();
        let orchestrator = orchestrator(&engine, 2);

        let outcome = orchestrator
            .generate(request(json!({
                "template": "promo",
                "sizes": [{"width": 600, "height": 800}],
                "elements": {"headline": {"text": "Hello"}}
            })))
            .await
            .expect("generate");

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.succeeded, 1);
        let result = &outcome.results[0];
        assert!(result.success);
        assert_eq!(result.size, Size::new(600, 800));
        assert_eq!(result.variation_index, 0);
        assert!(result.url.is_some());

        let calls = engine.stats().render_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].overwrites["headline"]["text"], "Hello");
        assert_eq!(engine.stats().tabs_opened(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_mode_keeps_request_order_and_variation_tags() {
        let engine = MockEngine::new().with_render_delay(Duration::from_millis(50));
        let orchestrator = orchestrator(&engine, 2);
        let sizes = vec![Size::new(1080, 1080), Size::new(1200, 628)];

        let outcome = orchestrator
            .generate(GenerateRequest {
                template: "promo".into(),
                sizes: Some(sizes.clone()),
                elements: None,
                variations: Some(
                    ["A", "B", "C"]
                        .iter()
                        .map(|text| Variation {
                            sizes: None,
                            elements: Some(
                                [("headline".to_string(), json!({ "text": text }))]
                                    .into_iter()
                                    .collect(),
                            ),
                        })
                        .collect(),
                ),
            })
            .await
            .expect("generate");

        assert_eq!(outcome.results.len(), 6);
        assert_eq!(outcome.failed, 0);
        let variations: Vec<usize> = outcome.results.iter().map(|r| r.variation_index).collect();
        assert_eq!(variations, vec![0, 0, 1, 1, 2, 2]);
        let result_sizes: Vec<Size> = outcome.results.iter().map(|r| r.size).collect();
        assert_eq!(result_sizes, [sizes.clone(), sizes.clone(), sizes].concat());

        assert_eq!(engine.stats().peak_tabs(), 2);
        let mut texts: Vec<String> = engine
            .stats()
            .render_calls()
            .iter()
            .map(|c| c.overwrites["headline"]["text"].as_str().unwrap().to_string())
            .collect();
        texts.sort();
        assert_eq!(texts, vec!["A", "A", "B", "B", "C", "C"]);
    }

    #[tokio::test(start_paused = true)]
    async fn results_follow_request_order_regardless_of_completion() {
        let engine = MockEngine::new().with_render_delay(Duration::from_millis(10));
        let orchestrator = orchestrator(&engine, 3);
        let sizes: Vec<Size> = (1..=8).map(|i| Size::new(i * 10, 100)).collect();

        let outcome = orchestrator
            .generate(GenerateRequest {
                template: "promo".into(),
                sizes: Some(sizes.clone()),
                ..GenerateRequest::default()
            })
            .await
            .unwrap();

        let got: Vec<Size> = outcome.results.iter().map(|r| r.size).collect();
        assert_eq!(got, sizes);
    }

    #[tokio::test]
    async fn unknown_template_fails_without_touching_the_browser() {
        let engine = MockEngine::new();
        let orchestrator = orchestrator(&engine, 2);

        let err = orchestrator
            .generate(request(json!({"template": "missing"})))
            .await
            .unwrap_err();

        assert!(matches!(err, SwitchgenError::TemplateNotFound(ref name) if name == "missing"));
        assert_eq!(err.to_string(), "Template \"missing\" not found");
        assert_eq!(engine.stats().launches(), 0);
        assert_eq!(engine.stats().tabs_opened(), 0);
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected() {
        let engine = MockEngine::new();
        let orchestrator = orchestrator(&engine, 2);

        let err = orchestrator.generate(request(json!({}))).await.unwrap_err();
        assert_eq!(err.to_string(), "Bad request: Template apiName is required");

        let err = orchestrator
            .generate(request(json!({
                "template": "promo",
                "sizes": [{"width": 0, "height": 100}]
            })))
            .await
            .unwrap_err();
        assert!(err.is_request_error());
        assert_eq!(engine.stats().launches(), 0);
    }

    #[tokio::test]
    async fn empty_size_list_returns_empty_outcome() {
        let engine = MockEngine::new();
        let orchestrator = orchestrator(&engine, 2);

        let outcome = orchestrator
            .generate(request(json!({"template": "promo", "sizes": []})))
            .await
            .unwrap();

        assert!(outcome.results.is_empty());
        assert_eq!(engine.stats().launches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_render_times_out_while_batch_completes() {
        let stuck = Size::new(666, 666);
        let engine = MockEngine::new().with_render(stuck, MockRender::NeverComplete);
        let orchestrator = orchestrator(&engine, 1);

        let outcome = orchestrator
            .generate(GenerateRequest {
                template: "promo".into(),
                sizes: Some(vec![Size::new(100, 100), stuck, Size::new(300, 300)]),
                ..GenerateRequest::default()
            })
            .await
            .unwrap();

        let flags: Vec<bool> = outcome.results.iter().map(|r| r.success).collect();
        assert_eq!(flags, vec![true, false, true]);
        assert!(outcome.results[1]
            .error
            .as_deref()
            .unwrap()
            .contains("timed out"));
        assert!(outcome.elapsed >= Config::default().timeouts.render);
    }

    #[tokio::test]
    async fn launch_failure_fails_the_request() {
        let engine = MockEngine::new().failing_launches(1);
        let orchestrator = orchestrator(&engine, 2);

        let err = orchestrator
            .generate(request(json!({"template": "promo"})))
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchgenError::Launch(_)));

        // The next request relaunches.
        let outcome = orchestrator
            .generate(request(json!({"template": "promo"})))
            .await
            .unwrap();
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(engine.stats().launches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_requests_run_one_batch_at_a_time() {
        let engine = MockEngine::new().with_render_delay(Duration::from_millis(100));
        let orchestrator = Arc::new(orchestrator(&engine, 2));
        let body = json!({
            "template": "promo",
            "sizes": [
                {"width": 1, "height": 1}, {"width": 2, "height": 2},
                {"width": 3, "height": 3}, {"width": 4, "height": 4}
            ]
        });

        let (a, b) = tokio::join!(
            orchestrator.generate(request(body.clone())),
            orchestrator.generate(request(body))
        );

        assert_eq!(a.unwrap().succeeded, 4);
        assert_eq!(b.unwrap().succeeded, 4);
        // Overlapping batches would have held four surfaces at once.
        assert_eq!(engine.stats().peak_tabs(), 2);
        assert_eq!(engine.stats().launches(), 1);
        assert!(!orchestrator.is_busy());
        assert_eq!(orchestrator.queue_depth(), 0);
    }
}

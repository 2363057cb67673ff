//! Fans a job list out over a fixed number of surface-owning workers.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::artifacts::ArtifactStore;
use crate::browser::{BrowserLifecycle, BrowserSession, RenderExecutor, RenderSurface, SurfaceFactory};
use crate::types::{Job, JobOutcome, Template};

const PNG_MIME: &str = "image/png";

/// Deals jobs into `workers` chunks: job `i` goes to chunk `i % workers`.
///
/// Relative order is preserved inside each chunk.
pub fn partition_round_robin(jobs: Vec<Job>, workers: usize) -> Vec<Vec<Job>> {
    let workers = workers.max(1);
    let mut chunks: Vec<Vec<Job>> = (0..workers).map(|_| Vec::new()).collect();
    for (i, job) in jobs.into_iter().enumerate() {
        chunks[i % workers].push(job);
    }
    chunks
}

/// Runs chunks of a batch concurrently, one render surface per worker.
pub struct WorkerPool {
    factory: SurfaceFactory,
    executor: RenderExecutor,
    lifecycle: Arc<BrowserLifecycle>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl WorkerPool {
    pub fn new(
        factory: SurfaceFactory,
        executor: RenderExecutor,
        lifecycle: Arc<BrowserLifecycle>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            factory,
            executor,
            lifecycle,
            artifacts,
        }
    }

    /// Renders every job and returns one outcome per job, in no particular order.
    ///
    /// At most `min(worker_count, jobs.len())` surfaces exist at any time.
    pub async fn run(
        &self,
        jobs: Vec<Job>,
        session: Arc<dyn BrowserSession>,
        template: Arc<Template>,
        worker_count: usize,
    ) -> Vec<JobOutcome> {
        if jobs.is_empty() {
            return Vec::new();
        }

        let total = jobs.len();
        let workers = worker_count.clamp(1, total);
        info!(jobs = total, workers, template = %template.api_name, "dispatching batch");

        let chunks = partition_round_robin(jobs, workers);
        let runs = chunks.into_iter().enumerate().map(|(worker, chunk)| {
            self.run_worker(worker, chunk, Arc::clone(&session), Arc::clone(&template))
        });

        join_all(runs).await.into_iter().flatten().collect()
    }

    async fn run_worker(
        &self,
        worker: usize,
        chunk: Vec<Job>,
        session: Arc<dyn BrowserSession>,
        template: Arc<Template>,
    ) -> Vec<JobOutcome> {
        let total = chunk.len();
        let mut outcomes = Vec::with_capacity(total);

        let mut surface = match self.factory.create(session.as_ref()).await {
            Ok(surface) => Some(surface),
            Err(err) => {
                error!(worker, error = %err, "render surface unavailable; failing chunk");
                let message = err.to_string();
                return chunk
                    .iter()
                    .map(|job| JobOutcome::failure(job, message.clone()))
                    .collect();
            }
        };
        drop(session);

        for (position, job) in chunk.iter().enumerate() {
            if surface.is_none() {
                match self.replace_surface(worker).await {
                    Ok(fresh) => surface = Some(fresh),
                    Err(reason) => {
                        let message = format!("Render surface unavailable: {reason}");
                        error!(worker, remaining = total - position, %message, "giving up on chunk");
                        outcomes.extend(
                            chunk[position..]
                                .iter()
                                .map(|job| JobOutcome::failure(job, message.clone())),
                        );
                        break;
                    }
                }
            }
            let Some(current) = surface.as_mut() else {
                break;
            };

            debug!(worker, job = job.original_index, size = %job.size, "rendering");
            match self
                .executor
                .render(current, &template, &job.elements, job.size)
                .await
            {
                Ok(bytes) => match self.artifacts.upload(bytes, PNG_MIME).await {
                    Ok(url) => {
                        info!(worker, job = job.original_index, size = %job.size, %url, "rendered");
                        outcomes.push(JobOutcome::success(job, url));
                    }
                    Err(err) => {
                        warn!(worker, job = job.original_index, error = %err, "upload failed");
                        outcomes.push(JobOutcome::failure(job, err.to_string()));
                    }
                },
                Err(err) if err.is_fatal() => {
                    warn!(
                        worker,
                        job = job.original_index,
                        size = %job.size,
                        error = %err,
                        "render surface lost"
                    );
                    outcomes.push(JobOutcome::failure(job, err.to_string()));
                    if let Some(dead) = surface.take() {
                        dead.close().await;
                    }
                }
                Err(err) => {
                    warn!(worker, job = job.original_index, size = %job.size, error = %err, "render failed");
                    outcomes.push(JobOutcome::failure(job, err.to_string()));
                }
            }
        }

        if let Some(surface) = surface {
            surface.close().await;
        }

        let succeeded = outcomes.iter().filter(|o| o.result.success).count();
        info!(worker, succeeded, total, "worker finished");
        outcomes
    }

    /// Re-acquires the browser (relaunching it if it died) and opens a new surface.
    async fn replace_surface(&self, worker: usize) -> Result<RenderSurface, String> {
        info!(worker, "replacing render surface");
        let session = self
            .lifecycle
            .acquire()
            .await
            .map_err(|err| err.to_string())?;
        self.factory
            .create(session.as_ref())
            .await
            .map_err(|err| err.to_string())
    }
}

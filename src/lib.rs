//! Switchgen Library
//!
//! Renders published design templates into PNG images at many sizes and
//! content variations, using pooled tabs of one shared headless browser.
//!
//! # Module Overview
//!
//! - [`browser`] - Browser lifecycle, render surfaces and the render executor
//! - [`scheduler`] - Round-robin job partitioning over a bounded worker pool
//! - [`queue`] - FIFO admission so only one batch runs at a time
//! - [`generate`] - Request validation, job construction and result ordering
//! - [`templates`] - Template stores (in-memory and JSON file)
//! - [`artifacts`] - Upload of rendered images (local directory, HTTP bucket or S3/R2)
//! - [`server`] - HTTP API
//! - [`client`] - Client for a running service
//! - [`config`] - Configuration file support
//! - [`types`] - Core data types
//! - [`output`] - JSON response bodies
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use switchgen_lib::{artifacts, ChromiumEngine, Config, FileTemplateStore};
//! use switchgen_lib::{GenerateRequest, GenerationOrchestrator};
//!
//! # async fn example() -> switchgen_lib::Result<()> {
//! let config = Config::default();
//! let orchestrator = GenerationOrchestrator::new(
//!     &config,
//!     Arc::new(ChromiumEngine::new(&config)),
//!     Arc::new(FileTemplateStore::open("templates.json").await?),
//!     artifacts::from_config(&config.artifacts)?,
//! );
//!
//! let outcome = orchestrator
//!     .generate(GenerateRequest {
//!         template: "summer-sale".into(),
//!         ..Default::default()
//!     })
//!     .await?;
//! println!("{} of {} rendered", outcome.succeeded, outcome.results.len());
//! # Ok(())
//! # }
//! ```

pub mod artifacts;
pub mod browser;
pub mod client;
pub mod config;
pub mod error;
pub mod generate;
pub mod output;
pub mod queue;
pub mod scheduler;
pub mod server;
pub mod size;
pub mod telemetry;
pub mod templates;
pub mod types;

pub use artifacts::{
    ArtifactStore, HttpArtifactStore, LocalArtifactStore, S3ArtifactStore, S3Settings, UploadError,
};
pub use browser::{
    BrowserEngine, BrowserLifecycle, BrowserSession, ChromiumEngine, RenderExecutor,
    RenderSurface, SurfaceError, SurfaceFactory,
};
pub use client::{ApiClient, DEFAULT_API_BASE};
pub use config::Config;
pub use error::{ErrorCategory, ErrorPayload, Result, SwitchgenError};
pub use generate::{build_jobs, GenerationOrchestrator, GenerationOutcome};
pub use output::{
    ErrorResponse, GenerateResponse, HealthResponse, SyncResponse, TemplateDetailResponse,
    TemplateListResponse,
};
pub use queue::AdmissionQueue;
pub use scheduler::{partition_round_robin, WorkerPool};
pub use size::{Size, SizeParseError};
pub use templates::{
    template_elements, FileTemplateStore, MemoryTemplateStore, TemplateElement, TemplateStore,
};
pub use types::{GenerateRequest, Job, JobOutcome, Overwrites, RenderResult, Template, Variation};

//! Core data types shared by the orchestrator, the stores and the HTTP layer.
//!
//! - [`Template`] - A published design and its renderer configuration
//! - [`Job`] - One (size, variation, elements) combination to render
//! - [`RenderResult`] - Per-job outcome returned to callers
//! - [`GenerateRequest`] / [`RequestShape`] - Incoming request and its resolved mode

mod core;
mod request;

pub use self::core::{Job, JobOutcome, Overwrites, RenderResult, Template, TemplateSummary};
pub use self::request::{GenerateRequest, RequestShape, ResolvedVariation, Variation};
pub use crate::size::Size;

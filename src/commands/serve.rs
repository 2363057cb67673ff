use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use switchgen_lib::server::{self, AppState};
use switchgen_lib::{
    artifacts, telemetry, ChromiumEngine, Config, FileTemplateStore, GenerationOrchestrator,
    MemoryTemplateStore, Result, TemplateStore,
};
use tracing::{debug, error, warn};

use crate::cli::{OutputFormat, ServeArgs};
use crate::formatting::render_error;
use crate::settings::{format_effective_config, load_config, resolve_serve_config};

/// Run the HTTP service until shutdown.
pub async fn run_serve(config_path: Option<PathBuf>, verbose: bool, args: ServeArgs) -> ExitCode {
    let config = match load_config(config_path.as_deref())
        .and_then(|cfg| resolve_serve_config(cfg, &args))
    {
        Ok(cfg) => cfg,
        Err(err) => return render_error(err, OutputFormat::Json, None),
    };
    if let Err(err) = telemetry::init(&config.logging, verbose) {
        return render_error(err, OutputFormat::Json, None);
    }
    debug!("{}", format_effective_config(&config, config_path.as_deref()));

    match start(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "service failed");
            render_error(err, OutputFormat::Json, None)
        }
    }
}

async fn start(config: Config) -> Result<()> {
    let templates: Arc<dyn TemplateStore> = match &config.templates.path {
        Some(path) => Arc::new(FileTemplateStore::open(path).await?),
        None => {
            warn!("no template store path configured; published templates are kept in memory");
            Arc::new(MemoryTemplateStore::new())
        }
    };
    let artifacts = artifacts::from_config(&config.artifacts)?;
    let engine = Arc::new(ChromiumEngine::new(&config));

    let orchestrator = GenerationOrchestrator::new(&config, engine, templates, artifacts);
    server::serve(
        AppState::new(Arc::new(orchestrator)),
        &config.server.bind,
        config.server.port,
    )
    .await
}

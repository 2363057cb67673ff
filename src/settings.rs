use std::path::Path;
use std::time::Duration;

use switchgen_lib::{Config, SwitchgenError};

use crate::cli::ServeArgs;

/// Load config from a TOML file, central config, or return defaults.
/// Priority: explicit path > ~/.config/switchgen/config.toml > defaults
pub fn load_config(path: Option<&Path>) -> Result<Config, SwitchgenError> {
    Config::load(path).map_err(|e| {
        let loc = path
            .map(|p| p.display().to_string())
            .or_else(|| Config::central_config_path().map(|p| p.display().to_string()))
            .unwrap_or_else(|| "defaults".to_string());
        SwitchgenError::Config(format!("Failed to read config {}: {}", loc, e))
    })
}

/// Merge `serve` flags (or their env vars) over the file config and validate.
pub fn resolve_serve_config(mut config: Config, args: &ServeArgs) -> Result<Config, SwitchgenError> {
    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(workers) = args.worker_count {
        config.worker_count = workers;
    }
    if let Some(url) = &args.renderer_url {
        config.renderer_url = url.clone();
    }
    if let Some(ms) = args.nav_timeout_ms {
        config.timeouts.navigation = Duration::from_millis(ms);
    }
    if let Some(ms) = args.render_timeout_ms {
        config.timeouts.render = Duration::from_millis(ms);
    }
    if let Some(path) = &args.templates {
        config.templates.path = Some(path.clone());
    }

    config
        .validate()
        .map_err(|e| SwitchgenError::Config(format!("Invalid config: {}", strip_prefix(&e))))?;
    Ok(config)
}

fn strip_prefix(err: &SwitchgenError) -> String {
    match err {
        SwitchgenError::Config(msg) => msg.clone(),
        other => other.to_string(),
    }
}

/// Format effective config as a single-line string.
pub fn format_effective_config(config: &Config, config_source: Option<&Path>) -> String {
    let source = config_source
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".to_string());
    format!(
        "Effective config [{source}]: listen={}:{}, workers={}, renderer={}, timeouts: nav={}ms, ready={}ms, render={}ms, surface attempts={}, templates={}, artifacts={:?}",
        config.server.bind,
        config.server.port,
        config.worker_count,
        config.renderer_url,
        config.timeouts.navigation.as_millis(),
        config.timeouts.readiness.as_millis(),
        config.timeouts.render.as_millis(),
        config.surface.max_attempts,
        config
            .templates
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "memory".to_string()),
        config.artifacts.kind,
    )
}

use tracing_subscriber::filter::Directive;
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::{LogFormat, LoggingSettings};
use crate::error::{Result, SwitchgenError};

/// Install a global tracing subscriber using the provided logging settings.
///
/// `RUST_LOG` overrides the configured level; `verbose` forces `debug`.
pub fn init(logging: &LoggingSettings, verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let directive = default_directive(level)?;

    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|err| SwitchgenError::Config(format!("failed to install tracing subscriber: {err}")))
}

fn default_directive(level: &str) -> Result<Directive> {
    level
        .trim()
        .parse()
        .map_err(|err| SwitchgenError::Config(format!("invalid log level {level:?}: {err}")))
}

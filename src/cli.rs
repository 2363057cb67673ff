use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use switchgen_lib::{Size, DEFAULT_API_BASE};

#[derive(Parser)]
#[command(name = "switchgen")]
#[command(
    version,
    about = "Switchgen - Render design templates into images at many sizes",
    long_about = "Switchgen\n\nModes:\n- serve: run the generation service (HTTP API backed by a shared headless Chromium).\n- templates / inspect: browse templates published to a running service.\n- generate: request renders of a template from a running service.\n\nUse --help on any subcommand for details."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Optional config file (TOML) for workers/timeouts/browser/storage; CLI flags and env override config"
    )]
    pub config: Option<PathBuf>,
}

/// Flags of `serve` that override the config file.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct ServeArgs {
    #[arg(long, env = "BIND_ADDR", help = "Address to bind")]
    pub bind: Option<String>,

    #[arg(long, env = "PORT", help = "Port to listen on")]
    pub port: Option<u16>,

    #[arg(
        long = "workers",
        env = "WORKER_COUNT",
        help = "Render surfaces a batch may use concurrently"
    )]
    pub worker_count: Option<usize>,

    #[arg(
        long,
        env = "FRONTEND_URL",
        help = "Editor deployment serving /render-headless"
    )]
    pub renderer_url: Option<String>,

    #[arg(
        long = "nav-timeout-ms",
        env = "NAV_TIMEOUT",
        value_name = "MS",
        help = "Renderer page navigation timeout (milliseconds)"
    )]
    pub nav_timeout_ms: Option<u64>,

    #[arg(
        long = "render-timeout-ms",
        env = "RENDER_TIMEOUT",
        value_name = "MS",
        help = "Per-job render timeout (milliseconds)"
    )]
    pub render_timeout_ms: Option<u64>,

    #[arg(long, value_name = "PATH", help = "Template store file (JSON)")]
    pub templates: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the generation service
    Serve {
        #[command(flatten)]
        args: ServeArgs,
    },

    /// List templates published to a running service
    Templates {
        #[arg(long, env = "SWITCHGEN_API", default_value = DEFAULT_API_BASE, help = "Service base URL")]
        api_base: String,

        #[arg(long, value_enum, default_value = "json", help = "Output format")]
        format: OutputFormat,
    },

    /// Show a template's elements and an example request
    Inspect {
        #[arg(help = "Template api name")]
        name: String,

        #[arg(long, env = "SWITCHGEN_API", default_value = DEFAULT_API_BASE, help = "Service base URL")]
        api_base: String,

        #[arg(long, value_enum, default_value = "json", help = "Output format")]
        format: OutputFormat,
    },

    /// Render a template through a running service
    Generate {
        #[arg(help = "Template api name")]
        name: String,

        #[arg(
            help = "Element overwrites as JSON, e.g. '{\"title\":{\"text\":\"Hi\"}}'",
            value_name = "ELEMENTS_JSON"
        )]
        elements: Option<String>,

        #[arg(
            long = "size",
            value_name = "WIDTHxHEIGHT",
            help = "Output size; repeat for several (default 1080x1080)"
        )]
        sizes: Vec<Size>,

        #[arg(long, env = "SWITCHGEN_API", default_value = DEFAULT_API_BASE, help = "Service base URL")]
        api_base: String,

        #[arg(long, value_enum, default_value = "json", help = "Output format")]
        format: OutputFormat,

        #[arg(long, short, help = "Output file path (stdout if omitted)")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Pretty,
}

pub fn parse() -> Cli {
    Cli::parse()
}

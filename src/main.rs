mod cli;
mod commands;
mod formatting;
mod settings;

use std::process::ExitCode;

use cli::Commands;
use commands::{run_generate, run_inspect, run_serve, run_templates};

#[tokio::main]
async fn main() -> ExitCode {
    run().await
}

async fn run() -> ExitCode {
    let args = cli::parse();

    match args.command {
        Commands::Serve { args: serve_args } => {
            run_serve(args.config, args.verbose, serve_args).await
        }
        Commands::Templates { api_base, format } => {
            run_templates(args.verbose, api_base, format).await
        }
        Commands::Inspect {
            name,
            api_base,
            format,
        } => run_inspect(args.verbose, name, api_base, format).await,
        Commands::Generate {
            name,
            elements,
            sizes,
            api_base,
            format,
            output,
        } => run_generate(args.verbose, name, elements, sizes, api_base, format, output).await,
    }
}

use std::path::PathBuf;
use std::process::ExitCode;

use switchgen_lib::{ApiClient, GenerateRequest, Overwrites, Result, Size};

use crate::cli::OutputFormat;
use crate::formatting::{exit_code_for_generate, render_error, write_output, CliOutput};

/// Run the generate command against a running service.
pub async fn run_generate(
    verbose: bool,
    name: String,
    elements: Option<String>,
    sizes: Vec<Size>,
    api_base: String,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> ExitCode {
    let request = match build_request(name, elements.as_deref(), sizes) {
        Ok(request) => request,
        Err(err) => return render_error(err, format, output),
    };
    let client = match ApiClient::new(&api_base) {
        Ok(client) => client,
        Err(err) => return render_error(err, format, output),
    };

    if verbose {
        let count = request.sizes.as_ref().map_or(1, Vec::len);
        eprintln!(
            "Requesting {count} render(s) of {} from {api_base}\u{2026}",
            request.template
        );
    }
    let response = match client.generate(&request).await {
        Ok(response) => response,
        Err(err) => return render_error(err, format, output),
    };

    let code = exit_code_for_generate(&response);
    if let Err(err) = write_output(&CliOutput::Generate(response), format, output) {
        eprintln!("Failed to write output: {err}");
        return ExitCode::from(2);
    }
    code
}

fn build_request(name: String, elements: Option<&str>, sizes: Vec<Size>) -> Result<GenerateRequest> {
    let elements = elements
        .map(serde_json::from_str::<Overwrites>)
        .transpose()?;
    Ok(GenerateRequest {
        template: name,
        sizes: (!sizes.is_empty()).then_some(sizes),
        elements,
        variations: None,
    })
}

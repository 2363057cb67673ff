use std::process::ExitCode;

use serde_json::{json, Value};
use switchgen_lib::{
    ApiClient, GenerateRequest, Overwrites, Size, TemplateDetailResponse, TemplateElement,
};

use crate::cli::OutputFormat;
use crate::formatting::{render_error, write_output, CliOutput, InspectOutput};

/// List templates published to the service.
pub async fn run_templates(verbose: bool, api_base: String, format: OutputFormat) -> ExitCode {
    let client = match ApiClient::new(&api_base) {
        Ok(client) => client,
        Err(err) => return render_error(err, format, None),
    };
    if verbose {
        eprintln!("Fetching templates from {api_base}\u{2026}");
    }
    let body = match client.list_templates().await {
        Ok(list) => CliOutput::Templates(list),
        Err(err) => return render_error(err, format, None),
    };
    finish(&body, format)
}

/// Show one template's elements with a ready-to-send example request.
pub async fn run_inspect(
    verbose: bool,
    name: String,
    api_base: String,
    format: OutputFormat,
) -> ExitCode {
    let client = match ApiClient::new(&api_base) {
        Ok(client) => client,
        Err(err) => return render_error(err, format, None),
    };
    if verbose {
        eprintln!("Fetching template {name} from {api_base}\u{2026}");
    }
    let template = match client.template(&name).await {
        Ok(template) => template,
        Err(err) => return render_error(err, format, None),
    };
    let body = CliOutput::Inspect(InspectOutput {
        example_request: example_request(&template),
        template,
    });
    finish(&body, format)
}

fn finish(body: &CliOutput, format: OutputFormat) -> ExitCode {
    if let Err(err) = write_output(body, format, None) {
        eprintln!("Failed to write output: {err}");
        return ExitCode::from(2);
    }
    ExitCode::SUCCESS
}

/// A request that overwrites every text and image element of `template`.
pub fn example_request(template: &TemplateDetailResponse) -> GenerateRequest {
    let elements: Overwrites = template
        .elements
        .iter()
        .filter_map(|element| example_overwrite(element).map(|v| (element.name.clone(), v)))
        .collect();

    GenerateRequest {
        template: template.api_name.clone(),
        sizes: Some(vec![Size::default()]),
        elements: (!elements.is_empty()).then_some(elements),
        variations: None,
    }
}

fn example_overwrite(element: &TemplateElement) -> Option<Value> {
    if element.has_text {
        Some(json!({ "text": format!("New {} text", element.name) }))
    } else if element.has_src {
        Some(json!({ "src": "https://example.com/image.png" }))
    } else {
        None
    }
}

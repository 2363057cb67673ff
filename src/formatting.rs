use std::fmt::Write as FmtWrite;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use serde::Serialize;
use switchgen_lib::{
    ErrorResponse, GenerateRequest, GenerateResponse, SwitchgenError, TemplateDetailResponse,
    TemplateListResponse,
};

use crate::cli::OutputFormat;

/// `inspect` body: the template's elements plus a request that would render it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectOutput {
    #[serde(flatten)]
    pub template: TemplateDetailResponse,
    pub example_request: GenerateRequest,
}

/// Everything a client command can print.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CliOutput {
    Templates(TemplateListResponse),
    Inspect(InspectOutput),
    Generate(GenerateResponse),
    Error(ErrorResponse),
}

/// Write output in the requested format.
pub fn write_output(
    body: &CliOutput,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => write_json_output(body, output.as_deref())?,
        OutputFormat::Pretty => write_pretty_output(body, output.as_deref())?,
    };
    Ok(())
}

/// Render an error and return the appropriate exit code.
pub fn render_error(err: SwitchgenError, format: OutputFormat, output: Option<PathBuf>) -> ExitCode {
    let details = err.to_payload();
    let payload = CliOutput::Error(ErrorResponse::new(details.message.clone()).with_details(details));

    match format {
        OutputFormat::Json => {
            let content = serde_json::to_string(&payload)
                .unwrap_or_else(|_| "{\"success\":false}".into());
            if let Some(path) = output {
                if let Err(write_err) = std::fs::write(&path, &content) {
                    eprintln!("Failed to write error output: {}", write_err);
                    println!("{content}");
                }
            } else {
                println!("{content}");
            }
        }
        OutputFormat::Pretty => {
            if let Err(write_err) = write_pretty_output(&payload, output.as_deref()) {
                eprintln!("Failed to write error output: {}", write_err);
            }
        }
    };

    // Exit code 2 is for errors; partially failed generations use 1.
    ExitCode::from(2)
}

fn write_json_output(body: &CliOutput, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let content = serde_json::to_string(body)?;
    if let Some(path) = output {
        std::fs::write(path, content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

fn write_pretty_output(body: &CliOutput, output: Option<&Path>) -> io::Result<()> {
    let stdout_is_tty = std::io::stdout().is_terminal();
    let use_human = output.is_none() && stdout_is_tty;

    if use_human {
        let content = format_pretty(body, true);
        println!("{content}");
        return Ok(());
    }

    // Non-tty or file output: keep JSON shape for pipelines/files.
    let content =
        serde_json::to_string_pretty(body).unwrap_or_else(|_| "{\"success\":false}".to_string());
    if let Some(path) = output {
        std::fs::write(path, &content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

/// Format output for human consumption in a terminal.
pub fn format_pretty(body: &CliOutput, colorize: bool) -> String {
    let mut buf = String::new();
    match body {
        CliOutput::Templates(out) => {
            let header = color("[TEMPLATES]", "36", colorize);
            writeln!(buf, "{} {} published", header, out.templates.len()).ok();
            for template in &out.templates {
                let updated = template
                    .updated_at
                    .format(&time::format_description::well_known::Rfc3339)
                    .unwrap_or_default();
                writeln!(
                    buf,
                    "- {:24} {} (updated {})",
                    template.api_name, template.display_name, updated
                )
                .ok();
            }
        }
        CliOutput::Inspect(out) => {
            let header = color("[TEMPLATE]", "36", colorize);
            writeln!(
                buf,
                "{} {} ({})",
                header, out.template.api_name, out.template.display_name
            )
            .ok();
            if out.template.elements.is_empty() {
                writeln!(buf, "No named elements.").ok();
            } else {
                writeln!(buf, "Elements:").ok();
                for element in &out.template.elements {
                    let mut props = Vec::new();
                    if element.has_text {
                        props.push("text");
                    }
                    if element.has_src {
                        props.push("src");
                    }
                    writeln!(
                        buf,
                        "- {:20} {:10} {}",
                        element.name,
                        element.kind.as_deref().unwrap_or("-"),
                        props.join(",")
                    )
                    .ok();
                }
            }
            let example = serde_json::to_string_pretty(&out.example_request).unwrap_or_default();
            writeln!(buf, "Example request:\n{example}").ok();
        }
        CliOutput::Generate(out) => {
            let failed = out.failed_count();
            let (status, code) = if failed == 0 {
                ("OK", "32")
            } else if failed < out.count {
                ("PARTIAL", "33")
            } else {
                ("FAIL", "31")
            };
            writeln!(
                buf,
                "{} {}/{} rendered in {} ms",
                color(status, code, colorize),
                out.count - failed,
                out.count,
                out.duration_ms
            )
            .ok();
            for result in &out.sizes {
                let size = format!("{}", result.size);
                match (&result.url, &result.error) {
                    (Some(url), _) if result.success => {
                        writeln!(buf, "- v{} {:10} {}", result.variation_index, size, url).ok();
                    }
                    (_, error) => {
                        let reason = error.as_deref().unwrap_or("unknown error");
                        writeln!(
                            buf,
                            "- v{} {:10} {}",
                            result.variation_index,
                            size,
                            color(reason, "31", colorize)
                        )
                        .ok();
                    }
                }
            }
        }
        CliOutput::Error(out) => {
            let header = color("[ERROR]", "31", colorize);
            writeln!(buf, "{} {}", header, out.error).ok();
            if let Some(remediation) = out.details.as_ref().and_then(|d| d.remediation.as_ref()) {
                writeln!(buf, "Hint: {}", remediation).ok();
            }
        }
    }
    buf
}

/// Apply ANSI color codes when enabled.
fn color(text: &str, code: &str, colorize: bool) -> String {
    if colorize {
        format!("\x1b[{}m{}\x1b[0m", code, text)
    } else {
        text.to_string()
    }
}

/// Determine exit code for a generation response.
pub fn exit_code_for_generate(response: &GenerateResponse) -> ExitCode {
    if response.failed_count() == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use sheetcraft_model::Value;
use sheetcraft_render::{RenderOptions, RenderReport, Renderer};
use sheetcraft_xlsx::{fix_xlsx, FormatFixConfig, FormatFixReport};

#[derive(Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(
    name = "sheetcraft",
    about = "Render data-driven xlsx documents from placeholder templates."
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a template workbook against a JSON data file.
    Render {
        /// Template workbook (.xlsx).
        template: PathBuf,

        /// Output workbook path.
        output: PathBuf,

        /// JSON file holding the data context. Reads stdin when omitted.
        #[arg(long)]
        data: Option<PathBuf>,

        /// Skip the post-render drawing-anchor repair pass.
        #[arg(long)]
        no_format_fix: bool,

        /// Report format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Exit non-zero when the render finished with warnings.
        #[arg(long)]
        fail_on_warnings: bool,
    },

    /// Repair drawing-anchor namespaces in an existing workbook.
    FormatFix {
        /// Workbook to fix.
        input: PathBuf,

        /// Output path. Fixes in place when omitted.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Report format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Serialize)]
struct JsonRenderReport<'a> {
    template: &'a str,
    output: &'a str,
    #[serde(flatten)]
    report: &'a RenderReport,
}

#[derive(Serialize)]
struct JsonFixReport<'a> {
    input: &'a str,
    output: &'a str,
    #[serde(flatten)]
    report: &'a FormatFixReport,
}

fn main() -> Result<()> {
    match Args::parse().command {
        Command::Render {
            template,
            output,
            data,
            no_format_fix,
            format,
            fail_on_warnings,
        } => {
            let json: serde_json::Value = match &data {
                Some(path) => serde_json::from_slice(
                    &std::fs::read(path)
                        .with_context(|| format!("read data file {}", path.display()))?,
                )
                .with_context(|| format!("parse data file {}", path.display()))?,
                None => serde_json::from_reader(std::io::stdin().lock())
                    .context("parse data context from stdin")?,
            };
            let context = Value::from(json);

            let options = RenderOptions {
                apply_format_fix: !no_format_fix,
                ..RenderOptions::default()
            };
            let report = Renderer::new()
                .render(&template, &context, &output, &options)
                .with_context(|| format!("render {}", template.display()))?;

            for warning in &report.warnings {
                eprintln!("warning: {warning}");
            }

            match format {
                OutputFormat::Text => {
                    println!("rendered {} -> {}", template.display(), output.display());
                    println!(
                        "  rows expanded: {}, placeholders: {}, images: {}, warnings: {}",
                        report.rows_expanded,
                        report.cells_substituted,
                        report.images_inserted,
                        report.warnings.len()
                    );
                    if let Some(fix) = &report.format_fix {
                        println!("  format fix changed {} entr(ies)", fix.changed_entries.len());
                    }
                }
                OutputFormat::Json => {
                    print_json(&JsonRenderReport {
                        template: &template.to_string_lossy(),
                        output: &output.to_string_lossy(),
                        report: &report,
                    })?;
                }
            }

            if fail_on_warnings && report.has_warnings() {
                std::process::exit(1);
            }
            Ok(())
        }

        Command::FormatFix {
            input,
            output,
            format,
        } => {
            let target = output.clone().unwrap_or_else(|| input.clone());
            let report = fix_xlsx(&input, &target, &FormatFixConfig::default())
                .with_context(|| format!("fix {}", input.display()))?;

            match format {
                OutputFormat::Text => {
                    println!("fixed {} -> {}", input.display(), target.display());
                    if report.changed_entries.is_empty() {
                        println!("  no entries needed changes");
                    }
                    for entry in &report.changed_entries {
                        println!("  changed: {entry}");
                    }
                    for line in &report.logs {
                        println!("  {line}");
                    }
                }
                OutputFormat::Json => {
                    print_json(&JsonFixReport {
                        input: &input.to_string_lossy(),
                        output: &target.to_string_lossy(),
                        report: &report,
                    })?;
                }
            }
            Ok(())
        }
    }
}

fn print_json(report: &impl Serialize) -> Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, report)?;
    handle.write_all(b"\n")?;
    Ok(())
}

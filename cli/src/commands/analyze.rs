use crate::output::{json, text};
use crate::{InputArgs, OutputFormat};
use anyhow::Result;
use std::io;
use std::path::Path;
use std::process::ExitCode;

pub fn run(inputs: &InputArgs, tables_dir: Option<&Path>, format: OutputFormat, quiet: bool) -> Result<ExitCode> {
    let config = super::load_config(inputs, None)?;
    let mut analysis = super::run_analysis(inputs, &config)?;
    match tables_dir {
        Some(dir) => {
            let snapshot = super::scan_model(dir, &config)?;
            super::protect_model_dependencies(&mut analysis, &snapshot, &config)?;
        }
        None => log::warn!("no --tables given: removals are not checked against model dependencies"),
    }
    super::write_outputs(inputs, &analysis)?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    match format {
        OutputFormat::Text => text::write_analysis_summary(&mut handle, &analysis, &inputs.out, quiet)?,
        OutputFormat::Json => json::write_analysis_summary(&mut handle, &analysis)?,
    }
    Ok(ExitCode::SUCCESS)
}

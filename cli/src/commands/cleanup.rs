use crate::output::{json, text};
use crate::{InputArgs, OutputFormat};
use anyhow::{Context, Result};
use model_prune::{apply_cleanup, plan_cleanup, planned_report, write_disposition, CleanupMode};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process::ExitCode;

pub fn run(
    inputs: &InputArgs,
    tables_dir: &Path,
    mode: Option<CleanupMode>,
    yes: bool,
    dry_run: bool,
    format: OutputFormat,
    quiet: bool,
) -> Result<ExitCode> {
    let config = super::load_config(inputs, mode)?;
    let mut analysis = super::run_analysis(inputs, &config)?;
    let snapshot = super::scan_model(tables_dir, &config)?;

    let plan = plan_cleanup(&analysis.decisions, &snapshot, &config)
        .with_context(|| format!("Cannot plan cleanup of {}", tables_dir.display()))?;
    super::protect_model_dependencies(&mut analysis, &snapshot, &config)?;
    super::write_outputs(inputs, &analysis)?;

    let stdout = io::stdout();
    {
        let mut handle = stdout.lock();
        match format {
            OutputFormat::Text => text::write_plan(&mut handle, &plan, quiet)?,
            OutputFormat::Json => json::write_plan(&mut handle, &plan)?,
        }
    }

    if dry_run {
        eprintln!("Dry run: no files were changed.");
        return Ok(ExitCode::SUCCESS);
    }

    let report = if plan.candidates.is_empty() {
        eprintln!("Nothing to remove.");
        planned_report(&plan, &snapshot)
    } else {
        if !yes && !confirm(plan.candidates.len(), tables_dir)? {
            eprintln!("Aborted: no files were changed.");
            return Ok(ExitCode::SUCCESS);
        }
        apply_cleanup(&plan, &snapshot, &config)
    };

    write_disposition(&inputs.out, &report)
        .with_context(|| format!("Failed to write cleanup report to {}", inputs.out.display()))?;

    let mut handle = stdout.lock();
    match format {
        OutputFormat::Text => text::write_disposition_summary(&mut handle, &report, quiet)?,
        OutputFormat::Json => json::write_disposition(&mut handle, &report)?,
    }

    if report.has_failures() {
        Ok(ExitCode::from(1))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn confirm(count: usize, tables_dir: &Path) -> Result<bool> {
    eprint!(
        "Delete {} item(s) from {}? Backups are written next to each edited file. [y/N] ",
        count,
        tables_dir.display()
    );
    io::stderr().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

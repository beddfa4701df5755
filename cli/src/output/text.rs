use anyhow::Result;
use model_prune::{format_fingerprint, Analysis, CleanupPlan, DispositionReport};
use std::io::Write;
use std::path::Path;

pub fn write_analysis_summary<W: Write>(w: &mut W, analysis: &Analysis, out_dir: &Path, quiet: bool) -> Result<()> {
    writeln!(w, "{}", analysis.summary())?;
    if quiet {
        return Ok(());
    }
    writeln!(w)?;
    writeln!(w, "DROP TABLE statements:  {}", analysis.drop_tables.len())?;
    writeln!(w, "DROP COLUMN statements: {}", analysis.drop_columns.len())?;
    writeln!(w, "Model-only items:       {}", analysis.model_cleanup.len())?;
    writeln!(w, "Fingerprint:            {}", format_fingerprint(analysis.fingerprint))?;
    writeln!(w, "Output directory:       {}", out_dir.display())?;
    Ok(())
}

pub fn write_plan<W: Write>(w: &mut W, plan: &CleanupPlan, quiet: bool) -> Result<()> {
    writeln!(
        w,
        "Cleanup plan ({}): {} to remove, {} protected",
        plan.mode.as_str(),
        plan.candidates.len(),
        plan.protected.len()
    )?;
    if quiet {
        return Ok(());
    }

    if !plan.candidates.is_empty() {
        writeln!(w, "Remove:")?;
        for c in &plan.candidates {
            writeln!(w, "  {} ({})", c.name, c.kind.label())?;
        }
    }
    if !plan.protected.is_empty() {
        writeln!(w, "Protected:")?;
        for p in &plan.protected {
            writeln!(w, "  {} ({}): {}", p.candidate.name, p.candidate.kind.label(), p.kind.as_str())?;
        }
    }
    if !plan.notes.is_empty() {
        writeln!(w, "Notes:")?;
        for note in &plan.notes {
            writeln!(w, "  {}: {}", note.file, note.message)?;
        }
    }
    writeln!(w, "Fingerprint: {}", format_fingerprint(plan.fingerprint))?;
    Ok(())
}

pub fn write_disposition_summary<W: Write>(w: &mut W, report: &DispositionReport, quiet: bool) -> Result<()> {
    writeln!(w, "Cleanup: {}", report.summary())?;
    if quiet {
        return Ok(());
    }
    for item in &report.skipped {
        writeln!(w, "  skipped {}[{}]: {}", item.table, item.item, item.reason.as_str())?;
    }
    for failure in &report.failures {
        writeln!(w, "  failed {}: [{}] {}", failure.file, failure.code, failure.error)?;
    }
    Ok(())
}

use anyhow::Result;
use model_prune::{serialize_cleanup_plan, serialize_disposition_report, Analysis, CleanupPlan, DispositionReport};
use std::io::Write;

pub fn write_analysis_summary<W: Write>(w: &mut W, analysis: &Analysis) -> Result<()> {
    let value = serde_json::json!({
        "summary": analysis.summary(),
        "fingerprint": model_prune::format_fingerprint(analysis.fingerprint),
    });
    serde_json::to_writer_pretty(&mut *w, &value)?;
    writeln!(w)?;
    Ok(())
}

pub fn write_plan<W: Write>(w: &mut W, plan: &CleanupPlan) -> Result<()> {
    writeln!(w, "{}", serialize_cleanup_plan(plan)?)?;
    Ok(())
}

pub fn write_disposition<W: Write>(w: &mut W, report: &DispositionReport) -> Result<()> {
    writeln!(w, "{}", serialize_disposition_report(report)?)?;
    Ok(())
}

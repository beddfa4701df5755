use std::path::{Path, PathBuf};

use serde::Serialize;

use super::ReportError;
use crate::protect::CleanupPlan;
use crate::report::{DispositionReport, DispositionSummary};

#[derive(Debug, Serialize)]
struct DispositionDocument<'a> {
    summary: DispositionSummary,
    #[serde(flatten)]
    report: &'a DispositionReport,
}

pub fn serialize_disposition_report(report: &DispositionReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&DispositionDocument {
        summary: report.summary(),
        report,
    })
}

pub fn serialize_cleanup_plan(plan: &CleanupPlan) -> serde_json::Result<String> {
    serde_json::to_string_pretty(plan)
}

pub fn write_disposition_json(path: &Path, report: &DispositionReport) -> Result<PathBuf, ReportError> {
    let text = serialize_disposition_report(report).map_err(|e| ReportError::Json {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    std::fs::write(path, text).map_err(|e| ReportError::io(path, e))?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{ItemKind, RemovedItem, SkipReason, SkippedItem};

    #[test]
    fn report_json_carries_summary_and_reason_vocabulary() {
        let report = DispositionReport {
            removed: vec![RemovedItem {
                table: "Sales".into(),
                item: "Old".into(),
                kind: ItemKind::Measure,
                file: "Sales.tmdl".into(),
            }],
            skipped: vec![SkippedItem {
                table: "Sales".into(),
                item: "Amount".into(),
                kind: ItemKind::Column,
                reason: SkipReason::ProtectedBySemanticLink,
            }],
            ..Default::default()
        };
        let json = serialize_disposition_report(&report).expect("serialize");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(value["summary"]["measures"], 1);
        assert_eq!(value["skipped"][0]["reason"], "protected-by-semantic-link");
        assert_eq!(value["removed"][0]["kind"], "measure");
        assert!(value["failures"].as_array().is_some_and(|f| f.is_empty()));
    }
}

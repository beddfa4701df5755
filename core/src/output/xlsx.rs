//! Workbook rendering of the disposition report.

use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};

use super::ReportError;
use crate::report::DispositionReport;

pub const REMOVED_SHEET: &str = "Removed";
pub const SKIPPED_SHEET: &str = "Skipped";
pub const NOTES_SHEET: &str = "Notes";
pub const FAILURES_SHEET: &str = "Failures";

fn write_rows(
    sheet: &mut Worksheet,
    header: &Format,
    headers: &[&str],
    rows: impl IntoIterator<Item = Vec<String>>,
) -> Result<(), XlsxError> {
    for (col, title) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, header)?;
    }
    for (idx, row) in rows.into_iter().enumerate() {
        let row_num = idx as u32 + 1;
        for (col, value) in row.iter().enumerate() {
            sheet.write_string(row_num, col as u16, value)?;
        }
    }
    sheet.autofit();
    Ok(())
}

pub fn build_disposition_workbook(report: &DispositionReport) -> Result<Workbook, XlsxError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();

    {
        let sheet = workbook.add_worksheet();
        sheet.set_name(REMOVED_SHEET)?;
        write_rows(
            sheet,
            &header,
            &["Table", "Item", "Kind", "File"],
            report.removed.iter().map(|r| {
                vec![
                    r.table.clone(),
                    r.item.clone(),
                    r.kind.label().to_string(),
                    r.file.clone(),
                ]
            }),
        )?;
    }

    {
        let sheet = workbook.add_worksheet();
        sheet.set_name(SKIPPED_SHEET)?;
        write_rows(
            sheet,
            &header,
            &["Table", "Item", "Kind", "Reason"],
            report.skipped.iter().map(|s| {
                vec![
                    s.table.clone(),
                    s.item.clone(),
                    s.kind.label().to_string(),
                    s.reason.as_str().to_string(),
                ]
            }),
        )?;
    }

    {
        let sheet = workbook.add_worksheet();
        sheet.set_name(NOTES_SHEET)?;
        write_rows(
            sheet,
            &header,
            &["Kind", "File", "Message"],
            report
                .notes
                .iter()
                .map(|n| vec![n.kind.as_str().to_string(), n.file.clone(), n.message.clone()]),
        )?;
    }

    {
        let sheet = workbook.add_worksheet();
        sheet.set_name(FAILURES_SHEET)?;
        write_rows(
            sheet,
            &header,
            &["File", "Code", "Error"],
            report
                .failures
                .iter()
                .map(|f| vec![f.file.clone(), f.code.clone(), f.error.clone()]),
        )?;
    }

    Ok(workbook)
}

pub fn write_disposition_xlsx(path: &Path, report: &DispositionReport) -> Result<PathBuf, ReportError> {
    let to_error = |e: XlsxError| ReportError::Xlsx {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    let mut workbook = build_disposition_workbook(report).map_err(to_error)?;
    workbook.save(path).map_err(to_error)?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_all_four_sheets() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("report.xlsx");
        let mut report = DispositionReport::default();
        report.failures.push(crate::report::FileFailure {
            file: "Sales.tmdl".into(),
            code: "PRUNE_CLEANUP_002".into(),
            error: "denied".into(),
        });
        write_disposition_xlsx(&path, &report).expect("write");

        let mut workbook = build_disposition_workbook(&report).expect("build");
        for name in [REMOVED_SHEET, SKIPPED_SHEET, NOTES_SHEET, FAILURES_SHEET] {
            assert!(workbook.worksheet_from_name(name).is_ok(), "missing sheet {name}");
        }
        assert!(std::fs::metadata(&path).expect("metadata").len() > 0);
    }
}

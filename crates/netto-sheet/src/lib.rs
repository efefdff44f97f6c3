mod clean;
mod csv_out;
mod docx_package;
mod error;
mod extract;
mod model;
mod normalize;
mod options;
mod reinsert;
mod table_xml;
mod warning;

use std::path::Path;

use tracing::{info, warn};

use crate::csv_out::{write_entries_csv, write_entries_csv_to_string};
use crate::docx_package::read_document_xml;
use crate::normalize::normalize_with_count;
use crate::table_xml::parse_body_tables;

pub use clean::clean_value;
pub use error::ProcessError;
pub use extract::{Extraction, extract_entries, find_header_row};
pub use model::{
    CharacteristicEntry, DocxTable, HeaderRow, NAME_HEADER, PROCESSED_HEADER, VALUE_HEADER,
};
pub use normalize::normalize_entries;
pub use options::{ColumnWidth, ProcessOptions};
pub use reinsert::reinsert_docx_bytes;
pub use warning::{ProcessWarning, WarningCode as ProcessWarningCode};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessReport {
    pub entry_count: usize,
    pub table_count: usize,
    pub averaged_pairs: usize,
    pub value_column_index: Option<usize>,
    pub warnings: Vec<ProcessWarning>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Processed {
        document: Vec<u8>,
        entries: Vec<CharacteristicEntry>,
        report: ProcessReport,
    },
    /// No characteristic table with data rows was found; no document is produced.
    NoData { report: ProcessReport },
}

impl ProcessOutcome {
    #[must_use]
    pub fn report(&self) -> &ProcessReport {
        match self {
            Self::Processed { report, .. } | Self::NoData { report } => report,
        }
    }
}

fn check_input_size(input: &[u8], options: &ProcessOptions) -> Result<(), ProcessError> {
    if input.len() > options.max_document_bytes {
        return Err(ProcessError::LimitExceeded {
            what: "document size",
            limit: options.max_document_bytes,
        });
    }
    Ok(())
}

fn split_extraction(extraction: Extraction) -> (Vec<CharacteristicEntry>, ProcessReport) {
    let report = ProcessReport {
        entry_count: extraction.entries.len(),
        table_count: extraction.matched_tables.len(),
        averaged_pairs: 0,
        value_column_index: extraction.value_column_index,
        warnings: extraction.warnings,
    };
    (extraction.entries, report)
}

fn log_report(report: &ProcessReport) {
    for warning in &report.warnings {
        warn!(
            code = ?warning.code,
            table_index = ?warning.table_index,
            "{}",
            warning.message
        );
    }
    info!(
        entries = report.entry_count,
        tables = report.table_count,
        averaged_pairs = report.averaged_pairs,
        "document processed"
    );
}

/// Reads the cell texts of every body-level table.
pub fn read_docx_tables(input: &[u8], options: &ProcessOptions) -> Result<Vec<DocxTable>, ProcessError> {
    check_input_size(input, options)?;
    let part = read_document_xml(input, options.max_xml_bytes)?;
    parse_body_tables(&part.xml, options.max_table_rows)
}

/// Reads the characteristic entries of a `.docx` document without changing them.
pub fn extract_docx_bytes(input: &[u8], options: &ProcessOptions) -> Result<Extraction, ProcessError> {
    let tables = read_docx_tables(input, options)?;
    Ok(extract_entries(&tables))
}

/// Runs extraction, normalization and reinsertion over an in-memory document.
pub fn process_docx_bytes(input: &[u8], options: &ProcessOptions) -> Result<ProcessOutcome, ProcessError> {
    let (extracted, mut report) = split_extraction(extract_docx_bytes(input, options)?);
    if extracted.is_empty() {
        log_report(&report);
        return Ok(ProcessOutcome::NoData { report });
    }

    let (entries, averaged_pairs) = normalize_with_count(extracted);
    let (document, warnings) = reinsert_docx_bytes(input, &entries, options)?;
    report.averaged_pairs = averaged_pairs;
    report.warnings.extend(warnings);
    log_report(&report);

    Ok(ProcessOutcome::Processed {
        document,
        entries,
        report,
    })
}

/// File variant of [`process_docx_bytes`]. Nothing is written to
/// `output_docx` when the report has no entries.
pub fn process_docx_file(
    input_docx: &Path,
    output_docx: &Path,
    options: &ProcessOptions,
) -> Result<ProcessReport, ProcessError> {
    let input = std::fs::read(input_docx)?;
    match process_docx_bytes(&input, options)? {
        ProcessOutcome::Processed {
            document, report, ..
        } => {
            std::fs::write(output_docx, document)?;
            Ok(report)
        }
        ProcessOutcome::NoData { report } => Ok(report),
    }
}

/// Writes the extracted entries as `characteristic,value` CSV, normalized
/// unless `raw` is set.
pub fn dump_docx_entries_to_csv(
    input_docx: &Path,
    output_csv: &Path,
    raw: bool,
    delimiter: u8,
    options: &ProcessOptions,
) -> Result<ProcessReport, ProcessError> {
    let input = std::fs::read(input_docx)?;
    let (entries, report) = collect_entries(&input, raw, options)?;
    if !entries.is_empty() {
        write_entries_csv(output_csv, &entries, delimiter)?;
    }
    Ok(report)
}

pub fn dump_docx_bytes_to_csv_string(
    input: &[u8],
    raw: bool,
    delimiter: u8,
    options: &ProcessOptions,
) -> Result<(String, ProcessReport), ProcessError> {
    let (entries, report) = collect_entries(input, raw, options)?;
    let csv = write_entries_csv_to_string(&entries, delimiter)?;
    Ok((csv, report))
}

fn collect_entries(
    input: &[u8],
    raw: bool,
    options: &ProcessOptions,
) -> Result<(Vec<CharacteristicEntry>, ProcessReport), ProcessError> {
    let (extracted, mut report) = split_extraction(extract_docx_bytes(input, options)?);
    let entries = if raw {
        extracted
    } else {
        let (entries, averaged_pairs) = normalize_with_count(extracted);
        report.averaged_pairs = averaged_pairs;
        entries
    };
    Ok((entries, report))
}

#[cfg(test)]
mod tests {
    use super::{ProcessOptions, ProcessOutcome, ProcessReport, check_input_size};
    use crate::ProcessError;

    #[test]
    fn rejects_oversized_input_before_parsing() {
        let options = ProcessOptions {
            max_document_bytes: 4,
            ..ProcessOptions::default()
        };
        let error = check_input_size(b"12345", &options).expect_err("oversized input should fail");
        assert!(matches!(error, ProcessError::LimitExceeded { limit: 4, .. }));
    }

    #[test]
    fn outcome_exposes_report_for_both_variants() {
        let report = ProcessReport {
            entry_count: 2,
            ..ProcessReport::default()
        };
        let processed = ProcessOutcome::Processed {
            document: Vec::new(),
            entries: Vec::new(),
            report: report.clone(),
        };
        let no_data = ProcessOutcome::NoData {
            report: ProcessReport::default(),
        };
        assert_eq!(processed.report().entry_count, 2);
        assert_eq!(no_data.report().entry_count, 0);
    }
}

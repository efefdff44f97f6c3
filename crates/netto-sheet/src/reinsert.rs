use std::collections::BTreeMap;

use tracing::debug;

use crate::docx_package::{read_document_xml, replace_document_xml};
use crate::error::ProcessError;
use crate::extract::find_header_row;
use crate::model::{CharacteristicEntry, DocxTable, HeaderRow, PROCESSED_HEADER};
use crate::options::ProcessOptions;
use crate::table_xml::{AppendedColumn, append_columns, parse_body_tables};
use crate::warning::{ProcessWarning, WarningCode};

/// New column cells for one table: label on the header row, `entries[i]` on
/// the i-th row below it, blank elsewhere.
fn column_for_table(table: &DocxTable, header: HeaderRow, entries: &[CharacteristicEntry]) -> AppendedColumn {
    let cells = (0..table.rows.len())
        .map(|row_index| {
            if row_index == header.row_index {
                return PROCESSED_HEADER.to_string();
            }
            row_index
                .checked_sub(header.row_index + 1)
                .and_then(|offset| entries.get(offset))
                .map(|entry| entry.value.clone())
                .unwrap_or_default()
        })
        .collect();
    AppendedColumn { cells }
}

pub(crate) fn plan_columns(
    tables: &[DocxTable],
    entries: &[CharacteristicEntry],
    warnings: &mut Vec<ProcessWarning>,
) -> BTreeMap<usize, AppendedColumn> {
    let mut columns = BTreeMap::new();

    for (table_index, table) in tables.iter().enumerate() {
        let Some(header) = find_header_row(table) else {
            continue;
        };

        let data_rows = table.rows.len() - header.row_index - 1;
        if data_rows != entries.len() {
            warnings.push(
                ProcessWarning::new(
                    WarningCode::RowCountMismatch,
                    format!(
                        "table has {data_rows} data row(s) but {} processed value(s); values are aligned by row offset",
                        entries.len()
                    ),
                )
                .with_table_index(table_index),
            );
        }

        debug!(table_index, header_row = header.row_index, data_rows, "appending processed column");
        columns.insert(table_index, column_for_table(table, header, entries));
    }

    columns
}

/// Appends the processed-value column to every characteristic table of
/// `original` and returns the new document bytes.
///
/// The document is parsed again from the original bytes; every qualifying
/// table is filled from the same `entries` sequence.
pub fn reinsert_docx_bytes(
    original: &[u8],
    entries: &[CharacteristicEntry],
    options: &ProcessOptions,
) -> Result<(Vec<u8>, Vec<ProcessWarning>), ProcessError> {
    let part = read_document_xml(original, options.max_xml_bytes)?;
    let tables = parse_body_tables(&part.xml, options.max_table_rows)?;

    let mut warnings = Vec::new();
    let columns = plan_columns(&tables, entries, &mut warnings);
    let rewritten = append_columns(&part.xml, &columns, options.column_width.twips())?;
    let document = replace_document_xml(original, &part.name, &rewritten)?;

    Ok((document, warnings))
}

#[cfg(test)]
mod tests {
    use super::plan_columns;
    use crate::model::{CharacteristicEntry, DocxTable, NAME_HEADER, PROCESSED_HEADER, VALUE_HEADER};
    use crate::warning::WarningCode;

    fn table(rows: &[&[&str]]) -> DocxTable {
        DocxTable {
            rows: rows
                .iter()
                .map(|row| row.iter().map(|cell| (*cell).to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn fills_rows_by_offset_from_header() {
        let sheet = table(&[
            &["Паспорт изделия", ""],
            &[NAME_HEADER, VALUE_HEADER],
            &["a", "1"],
            &["b", "2"],
            &["c", "3"],
        ]);
        let entries = vec![CharacteristicEntry::new("a", "1"), CharacteristicEntry::new("b", "2")];
        let mut warnings = Vec::new();

        let columns = plan_columns(&[sheet], &entries, &mut warnings);
        let column = &columns[&0];
        assert_eq!(column.cells, vec!["", PROCESSED_HEADER, "1", "2", ""]);
        assert_eq!(warnings[0].code, WarningCode::RowCountMismatch);
    }

    #[test]
    fn every_matching_table_reads_the_shared_sequence() {
        let first = table(&[&[NAME_HEADER, VALUE_HEADER], &["a", "1"]]);
        let unrelated = table(&[&["x"]]);
        let second = table(&[&[NAME_HEADER, VALUE_HEADER], &["b", "2"]]);
        let entries = vec![CharacteristicEntry::new("a", "1"), CharacteristicEntry::new("b", "2")];
        let mut warnings = Vec::new();

        let columns = plan_columns(&[first, unrelated, second], &entries, &mut warnings);
        assert_eq!(columns.keys().copied().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(columns[&0].cells, vec![PROCESSED_HEADER, "1"]);
        assert_eq!(columns[&2].cells, vec![PROCESSED_HEADER, "1"]);
        assert_eq!(warnings.len(), 2);
    }
}

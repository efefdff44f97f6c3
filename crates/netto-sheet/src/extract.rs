use tracing::debug;

use crate::model::{CharacteristicEntry, DocxTable, HeaderRow, NAME_HEADER, VALUE_HEADER};
use crate::warning::{ProcessWarning, WarningCode};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Extraction {
    pub entries: Vec<CharacteristicEntry>,
    /// Value column of the last table whose header matched.
    pub value_column_index: Option<usize>,
    pub matched_tables: Vec<usize>,
    pub warnings: Vec<ProcessWarning>,
}

/// Finds the first row carrying both marker labels (exact match after trim).
#[must_use]
pub fn find_header_row(table: &DocxTable) -> Option<HeaderRow> {
    table.rows.iter().enumerate().find_map(|(row_index, row)| {
        let position = |label: &str| row.iter().position(|cell| cell.trim() == label);
        Some(HeaderRow {
            row_index,
            key_column: position(NAME_HEADER)?,
            value_column: position(VALUE_HEADER)?,
        })
    })
}

fn table_entries(table: &DocxTable, header: HeaderRow) -> impl Iterator<Item = CharacteristicEntry> + '_ {
    let widest = header.key_column.max(header.value_column);
    table
        .rows
        .iter()
        .skip(header.row_index + 1)
        .filter(move |row| row.len() > widest)
        .filter_map(move |row| {
            let key = row[header.key_column].trim();
            if key.is_empty() {
                return None;
            }
            Some(CharacteristicEntry::new(key, row[header.value_column].trim()))
        })
}

#[must_use]
pub fn extract_entries(tables: &[DocxTable]) -> Extraction {
    let mut extraction = Extraction::default();

    for (table_index, table) in tables.iter().enumerate() {
        let Some(header) = find_header_row(table) else {
            debug!(table_index, "no characteristic header row; table skipped");
            extraction.warnings.push(
                ProcessWarning::new(
                    WarningCode::NoHeaderRow,
                    "table has no characteristic header row; skipped",
                )
                .with_table_index(table_index),
            );
            continue;
        };

        if let Some(previous) = extraction.value_column_index {
            if previous != header.value_column {
                extraction.warnings.push(
                    ProcessWarning::new(
                        WarningCode::ConflictingValueColumn,
                        format!(
                            "value column {} differs from column {previous} of an earlier table; the later one is reported",
                            header.value_column
                        ),
                    )
                    .with_table_index(table_index),
                );
            }
        }

        let before = extraction.entries.len();
        extraction.entries.extend(table_entries(table, header));
        debug!(
            table_index,
            header_row = header.row_index,
            entries = extraction.entries.len() - before,
            "characteristic table matched"
        );

        extraction.value_column_index = Some(header.value_column);
        extraction.matched_tables.push(table_index);
    }

    extraction
}

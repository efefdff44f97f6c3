#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningCode {
    NoHeaderRow,
    ConflictingValueColumn,
    RowCountMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessWarning {
    pub code: WarningCode,
    pub message: String,
    pub table_index: Option<usize>,
}

impl ProcessWarning {
    #[must_use]
    pub fn new(code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            table_index: None,
        }
    }

    #[must_use]
    pub fn with_table_index(mut self, table_index: usize) -> Self {
        self.table_index = Some(table_index);
        self
    }
}

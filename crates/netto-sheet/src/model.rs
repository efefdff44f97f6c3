pub const NAME_HEADER: &str = "Наименование характеристики";
pub const VALUE_HEADER: &str = "Значение характеристики";
pub const PROCESSED_HEADER: &str = "Обработанное значение";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicEntry {
    pub key: String,
    pub value: String,
}

impl CharacteristicEntry {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Cell texts of one body-level table, one `Vec` per `w:tr`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocxTable {
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderRow {
    pub row_index: usize,
    pub key_column: usize,
    pub value_column: usize,
}

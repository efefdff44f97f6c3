use std::path::Path;

use csv::WriterBuilder;

use crate::error::ProcessError;
use crate::model::CharacteristicEntry;

const CSV_HEADERS: [&str; 2] = ["characteristic", "value"];

pub(crate) fn write_entries_csv(
    path: &Path,
    entries: &[CharacteristicEntry],
    delimiter: u8,
) -> Result<(), ProcessError> {
    let mut writer = WriterBuilder::new().delimiter(delimiter).from_path(path)?;
    writer.write_record(CSV_HEADERS)?;
    for entry in entries {
        writer.write_record([entry.key.as_str(), entry.value.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

pub(crate) fn write_entries_csv_to_string(
    entries: &[CharacteristicEntry],
    delimiter: u8,
) -> Result<String, ProcessError> {
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::<u8>::new());
    writer.write_record(CSV_HEADERS)?;
    for entry in entries {
        writer.write_record([entry.key.as_str(), entry.value.as_str()])?;
    }
    writer.flush()?;

    let bytes = writer
        .into_inner()
        .map_err(|error| ProcessError::Csv(error.into_error().into()))?;
    String::from_utf8(bytes)
        .map_err(|error| ProcessError::InvalidOption(format!("invalid utf-8 csv output: {error}")))
}

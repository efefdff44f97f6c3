use std::io::{Cursor, Read, Seek, Write};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::ProcessError;

pub(crate) const DEFAULT_DOCUMENT_PART: &str = "word/document.xml";
const PACKAGE_RELATIONSHIPS: &str = "_rels/.rels";
/// Transitional and strict relationship types share this suffix.
const OFFICE_DOCUMENT_TYPE_SUFFIX: &str = "/officeDocument";

/// The main document part: its zip member name and its XML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DocumentPart {
    pub name: String,
    pub xml: String,
}

fn read_member<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
    max_bytes: usize,
    what: &'static str,
) -> Result<Option<Vec<u8>>, ProcessError> {
    let member = match archive.by_name(name) {
        Ok(member) => member,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(error) => return Err(error.into()),
    };

    let declared = usize::try_from(member.size()).unwrap_or(usize::MAX);
    if declared > max_bytes {
        return Err(ProcessError::LimitExceeded { what, limit: max_bytes });
    }

    let mut bytes = Vec::with_capacity(declared);
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX).saturating_add(1);
    member.take(limit).read_to_end(&mut bytes)?;
    if bytes.len() > max_bytes {
        return Err(ProcessError::LimitExceeded { what, limit: max_bytes });
    }
    Ok(Some(bytes))
}

fn plain_attribute(element: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, ProcessError> {
    let Some(attribute) = element
        .try_get_attribute(key)
        .map_err(quick_xml::Error::from)?
    else {
        return Ok(None);
    };
    let value = attribute
        .unescape_value()
        .map_err(quick_xml::Error::from)?;
    Ok(Some(value.into_owned()))
}

/// Resolves a relationship target from the package root into a zip member name.
fn package_root_path(target: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Target of the internal `officeDocument` relationship in a package `.rels` part.
pub(crate) fn office_document_target(rels_xml: &str) -> Result<Option<String>, ProcessError> {
    let mut reader = Reader::from_str(rels_xml);
    loop {
        match reader.read_event()? {
            Event::Start(element) | Event::Empty(element)
                if element.local_name().as_ref() == b"Relationship" =>
            {
                let external = plain_attribute(&element, b"TargetMode")?
                    .is_some_and(|mode| mode == "External");
                let is_main = plain_attribute(&element, b"Type")?
                    .is_some_and(|kind| kind.ends_with(OFFICE_DOCUMENT_TYPE_SUFFIX));
                if external || !is_main {
                    continue;
                }
                if let Some(target) = plain_attribute(&element, b"Target")? {
                    return Ok(Some(package_root_path(&target)));
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

fn main_part_name<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    max_xml_bytes: usize,
) -> Result<String, ProcessError> {
    let Some(rels) = read_member(archive, PACKAGE_RELATIONSHIPS, max_xml_bytes, "relationships XML size")? else {
        return Ok(DEFAULT_DOCUMENT_PART.to_string());
    };
    let rels = String::from_utf8(rels).map_err(|_| ProcessError::InvalidEncoding {
        part: PACKAGE_RELATIONSHIPS.to_string(),
    })?;
    Ok(office_document_target(&rels)?.unwrap_or_else(|| DEFAULT_DOCUMENT_PART.to_string()))
}

/// Reads the main document part named by the package relationships, falling
/// back to `word/document.xml` when the package has none.
pub(crate) fn read_document_xml(docx: &[u8], max_xml_bytes: usize) -> Result<DocumentPart, ProcessError> {
    let mut archive = ZipArchive::new(Cursor::new(docx))?;
    let name = main_part_name(&mut archive, max_xml_bytes)?;
    let Some(bytes) = read_member(&mut archive, &name, max_xml_bytes, "document XML size")? else {
        return Err(ProcessError::MissingPart(name));
    };

    let xml = String::from_utf8(bytes).map_err(|_| ProcessError::InvalidEncoding { part: name.clone() })?;
    let xml = match xml.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => xml,
    };
    Ok(DocumentPart { name, xml })
}

/// Rebuilds the container with new content for `part`; every other member
/// is copied without recompression.
pub(crate) fn replace_document_xml(docx: &[u8], part: &str, xml: &[u8]) -> Result<Vec<u8>, ProcessError> {
    let mut archive = ZipArchive::new(Cursor::new(docx))?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::with_capacity(docx.len() + xml.len() / 8)));
    let mut replaced = false;

    for index in 0..archive.len() {
        let member = archive.by_index_raw(index)?;
        if member.name() == part {
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            writer.start_file(part, options)?;
            writer.write_all(xml)?;
            replaced = true;
        } else {
            writer.raw_copy_file(member)?;
        }
    }

    if !replaced {
        return Err(ProcessError::MissingPart(part.to_string()));
    }

    Ok(writer.finish()?.into_inner())
}

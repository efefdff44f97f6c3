use std::collections::{BTreeMap, HashMap};
use std::io::Write;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::{NsReader, Writer};

use crate::error::ProcessError;
use crate::model::DocxTable;

/// Transitional and strict WordprocessingML main namespaces.
const WML_NAMESPACES: [&str; 2] = [
    "http://schemas.openxmlformats.org/wordprocessingml/2006/main",
    "http://purl.oclc.org/ooxml/wordprocessingml/main",
];

const BODY: &[u8] = b"body";
const TABLE: &[u8] = b"tbl";
const TABLE_GRID: &[u8] = b"tblGrid";
const ROW: &[u8] = b"tr";
const CELL: &[u8] = b"tc";
const CELL_PROPERTIES: &[u8] = b"tcPr";
const GRID_SPAN: &[u8] = b"gridSpan";
const VERTICAL_MERGE: &[u8] = b"vMerge";
const PARAGRAPH: &[u8] = b"p";
const HYPERLINK: &[u8] = b"hyperlink";
const RUN: &[u8] = b"r";
const TEXT: &[u8] = b"t";

/// Local name of a WordprocessingML element; `None` for markup in any other namespace.
type ElementKey = Option<Vec<u8>>;

fn wml_namespace(namespace: &ResolveResult<'_>) -> Option<&'static str> {
    match namespace {
        ResolveResult::Bound(Namespace(uri)) => WML_NAMESPACES
            .into_iter()
            .find(|candidate| candidate.as_bytes() == *uri),
        _ => None,
    }
}

/// Namespace URI and local name of a WordprocessingML start, empty or end tag.
fn resolve_event(namespace: &ResolveResult<'_>, event: &Event<'_>) -> Option<(&'static str, Vec<u8>)> {
    let local = match event {
        Event::Start(element) | Event::Empty(element) => element.local_name(),
        Event::End(element) => element.local_name(),
        _ => return None,
    };
    Some((wml_namespace(namespace)?, local.as_ref().to_vec()))
}

fn parent(path: &[ElementKey]) -> Option<&[u8]> {
    path.last().and_then(|key| key.as_deref())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VerticalMerge {
    None,
    Restart,
    Continue,
}

#[derive(Debug)]
struct CellState {
    paragraphs: Vec<String>,
    grid_span: usize,
    merge: VerticalMerge,
}

impl CellState {
    fn new() -> Self {
        Self {
            paragraphs: Vec::new(),
            grid_span: 1,
            merge: VerticalMerge::None,
        }
    }
}

#[derive(Debug, Default)]
struct TableState {
    rows: Vec<Vec<String>>,
    row: Option<Vec<CellState>>,
    cell: Option<CellState>,
    paragraph: Option<(usize, String)>,
    nested: usize,
    merge_origins: HashMap<usize, String>,
}

impl TableState {
    fn open(
        &mut self,
        name: &[u8],
        start: &BytesStart<'_>,
        path: &[ElementKey],
        reader: &NsReader<&[u8]>,
    ) -> Result<(), ProcessError> {
        if name == TABLE {
            self.nested += 1;
            return Ok(());
        }
        if self.nested > 0 {
            return Ok(());
        }

        let parent = parent(path);
        match name {
            ROW if parent == Some(TABLE) => self.row = Some(Vec::new()),
            CELL if parent == Some(ROW) && self.row.is_some() => self.cell = Some(CellState::new()),
            PARAGRAPH if parent == Some(CELL) && self.cell.is_some() => {
                self.paragraph = Some((path.len(), String::new()));
            }
            _ => self.property(name, start, parent, reader)?,
        }
        Ok(())
    }

    fn empty(
        &mut self,
        name: &[u8],
        element: &BytesStart<'_>,
        path: &[ElementKey],
        reader: &NsReader<&[u8]>,
    ) -> Result<(), ProcessError> {
        if self.nested > 0 {
            return Ok(());
        }

        if let Some((depth, text)) = self.paragraph.as_mut() {
            if in_direct_run(path, *depth) {
                match name {
                    b"tab" => text.push('\t'),
                    b"br" | b"cr" => text.push('\n'),
                    b"noBreakHyphen" => text.push('-'),
                    _ => {}
                }
            }
            return Ok(());
        }

        let parent = parent(path);
        if name == PARAGRAPH && parent == Some(CELL) {
            if let Some(cell) = self.cell.as_mut() {
                cell.paragraphs.push(String::new());
            }
            return Ok(());
        }

        self.property(name, element, parent, reader)
    }

    fn property(
        &mut self,
        name: &[u8],
        element: &BytesStart<'_>,
        parent: Option<&[u8]>,
        reader: &NsReader<&[u8]>,
    ) -> Result<(), ProcessError> {
        if parent != Some(CELL_PROPERTIES) {
            return Ok(());
        }
        let Some(cell) = self.cell.as_mut() else {
            return Ok(());
        };

        match name {
            GRID_SPAN => {
                if let Some(value) = wml_attribute(reader, element, b"val")? {
                    cell.grid_span = value.trim().parse::<usize>().unwrap_or(1).max(1);
                }
            }
            VERTICAL_MERGE => {
                cell.merge = match wml_attribute(reader, element, b"val")?.as_deref() {
                    Some("restart") => VerticalMerge::Restart,
                    _ => VerticalMerge::Continue,
                };
            }
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, value: &str, path: &[ElementKey]) {
        if self.nested > 0 || parent(path) != Some(TEXT) {
            return;
        }
        if let Some((depth, text)) = self.paragraph.as_mut() {
            if in_direct_run(&path[..path.len() - 1], *depth) {
                text.push_str(value);
            }
        }
    }

    fn close(&mut self, name: &[u8], path: &[ElementKey]) {
        if name == TABLE {
            self.nested -= 1;
            return;
        }
        if self.nested > 0 {
            return;
        }

        match name {
            PARAGRAPH => {
                if self.paragraph.as_ref().is_some_and(|(depth, _)| *depth == path.len()) {
                    if let (Some((_, text)), Some(cell)) = (self.paragraph.take(), self.cell.as_mut()) {
                        cell.paragraphs.push(text);
                    }
                }
            }
            CELL => {
                if let (Some(cell), Some(row)) = (self.cell.take(), self.row.as_mut()) {
                    row.push(cell);
                }
            }
            ROW => {
                if let Some(cells) = self.row.take() {
                    let row = self.expand_row(cells);
                    self.rows.push(row);
                }
            }
            _ => {}
        }
    }

    fn expand_row(&mut self, cells: Vec<CellState>) -> Vec<String> {
        let mut row = Vec::with_capacity(cells.len());
        let mut grid_column = 0_usize;

        for cell in cells {
            let own_text = cell.paragraphs.join("\n");
            let text = match cell.merge {
                VerticalMerge::Continue => self
                    .merge_origins
                    .get(&grid_column)
                    .cloned()
                    .unwrap_or_default(),
                VerticalMerge::Restart => {
                    self.merge_origins.insert(grid_column, own_text.clone());
                    own_text
                }
                VerticalMerge::None => {
                    self.merge_origins.remove(&grid_column);
                    own_text
                }
            };

            for _ in 0..cell.grid_span {
                row.push(text.clone());
            }
            grid_column += cell.grid_span;
        }

        row
    }
}

fn in_direct_run(path: &[ElementKey], paragraph_depth: usize) -> bool {
    if path.len() <= paragraph_depth + 1 {
        return false;
    }
    match &path[paragraph_depth + 1..] {
        [run] => run.as_deref() == Some(RUN),
        [link, run] => link.as_deref() == Some(HYPERLINK) && run.as_deref() == Some(RUN),
        _ => false,
    }
}

/// Value of the WordprocessingML attribute `local`, whatever prefix it is bound to.
fn wml_attribute(
    reader: &NsReader<&[u8]>,
    element: &BytesStart<'_>,
    local: &[u8],
) -> Result<Option<String>, ProcessError> {
    for attribute in element.attributes() {
        let attribute = attribute.map_err(quick_xml::Error::from)?;
        let (namespace, name) = reader.resolve_attribute(attribute.key);
        if name.as_ref() == local && wml_namespace(&namespace).is_some() {
            let value = attribute
                .unescape_value()
                .map_err(quick_xml::Error::from)?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Reads every table that is a direct child of the document body, in document order.
pub(crate) fn parse_body_tables(xml: &str, max_rows: usize) -> Result<Vec<DocxTable>, ProcessError> {
    let mut reader = NsReader::from_str(xml);
    let mut path: Vec<ElementKey> = Vec::new();
    let mut tables = Vec::new();
    let mut current: Option<TableState> = None;
    let mut total_rows = 0_usize;

    loop {
        let (namespace, event) = reader.read_resolved_event()?;
        let key: ElementKey = resolve_event(&namespace, &event).map(|(_, local)| local);

        match event {
            Event::Start(start) => {
                if let Some(table) = current.as_mut() {
                    if let Some(name) = key.as_deref() {
                        table.open(name, &start, &path, &reader)?;
                    }
                } else if key.as_deref() == Some(TABLE) && parent(&path) == Some(BODY) {
                    current = Some(TableState::default());
                }
                path.push(key);
            }
            Event::Empty(element) => {
                if let (Some(table), Some(name)) = (current.as_mut(), key.as_deref()) {
                    table.empty(name, &element, &path, &reader)?;
                }
            }
            Event::Text(text) => {
                if let Some(table) = current.as_mut() {
                    let value = text.unescape().map_err(quick_xml::Error::from)?;
                    table.text(&value, &path);
                }
            }
            Event::CData(data) => {
                if let Some(table) = current.as_mut() {
                    table.text(&String::from_utf8_lossy(&data), &path);
                }
            }
            Event::End(_) => {
                path.pop();
                let (Some(table), Some(name)) = (current.as_mut(), key.as_deref()) else {
                    continue;
                };

                if name == TABLE && table.nested == 0 {
                    if let Some(finished) = current.take() {
                        total_rows += finished.rows.len();
                        if total_rows > max_rows {
                            return Err(ProcessError::LimitExceeded {
                                what: "table row count",
                                limit: max_rows,
                            });
                        }
                        tables.push(DocxTable {
                            rows: finished.rows,
                        });
                    }
                } else {
                    table.close(name, &path);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(tables)
}

/// Cells for a column appended to one body table, one entry per row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AppendedColumn {
    pub cells: Vec<String>,
}

/// Qualified names for markup inserted into a table, using the prefix the
/// table itself was written with.
struct InsertedNames {
    prefix: Option<String>,
    namespace: &'static str,
}

impl InsertedNames {
    fn element(&self, local: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{local}"),
            None => local.to_string(),
        }
    }

    fn attribute(&self, local: &str) -> String {
        format!("{}:{local}", self.prefix.as_deref().unwrap_or("w"))
    }

    /// Start tag for an inserted subtree root; a default-namespace table has
    /// no prefix for attributes, so `w` is bound locally.
    fn root(&self, local: &str) -> BytesStart<'static> {
        let mut start = BytesStart::new(self.element(local));
        if self.prefix.is_none() {
            start.push_attribute(("xmlns:w", self.namespace));
        }
        start
    }

    fn start(&self, local: &str) -> Event<'static> {
        Event::Start(BytesStart::new(self.element(local)))
    }

    fn end(&self, local: &str) -> Event<'static> {
        Event::End(BytesEnd::new(self.element(local)))
    }
}

struct ActiveTable<'a> {
    column: &'a AppendedColumn,
    names: InsertedNames,
    depth: usize,
    next_row: usize,
}

/// Re-emits `xml` unchanged except for one trailing column on each body
/// table whose ordinal is a key of `columns`.
pub(crate) fn append_columns(
    xml: &str,
    columns: &BTreeMap<usize, AppendedColumn>,
    width_twips: u32,
) -> Result<Vec<u8>, ProcessError> {
    let mut reader = NsReader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + columns.len() * 1024));
    let mut path: Vec<ElementKey> = Vec::new();
    let mut table_ordinal = 0_usize;
    let mut active: Option<ActiveTable<'_>> = None;
    let width = width_twips.to_string();

    loop {
        let (namespace, event) = reader.read_resolved_event()?;
        let resolved = resolve_event(&namespace, &event);

        match &event {
            Event::Start(start) => {
                let key = resolved.map(|(uri, local)| {
                    if active.is_none() && local == TABLE && parent(&path) == Some(BODY) {
                        let names = InsertedNames {
                            prefix: start
                                .name()
                                .prefix()
                                .map(|prefix| String::from_utf8_lossy(prefix.as_ref()).into_owned()),
                            namespace: uri,
                        };
                        active = columns.get(&table_ordinal).map(|column| ActiveTable {
                            column,
                            names,
                            depth: path.len(),
                            next_row: 0,
                        });
                        table_ordinal += 1;
                    }
                    local
                });
                path.push(key);
            }
            Event::End(_) => {
                path.pop();
                if let Some(table) = active.as_mut() {
                    if path.len() == table.depth + 1 {
                        match resolved.as_ref().map(|(_, local)| local.as_slice()) {
                            Some(TABLE_GRID) => write_grid_column(&mut writer, &table.names, &width)?,
                            Some(ROW) => {
                                let text = table
                                    .column
                                    .cells
                                    .get(table.next_row)
                                    .map_or("", String::as_str);
                                write_cell(&mut writer, &table.names, text, &width)?;
                                table.next_row += 1;
                            }
                            _ => {}
                        }
                    } else if path.len() == table.depth {
                        active = None;
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        writer.write_event(event)?;
    }

    Ok(writer.into_inner())
}

fn write_grid_column<W: Write>(
    writer: &mut Writer<W>,
    names: &InsertedNames,
    width: &str,
) -> Result<(), ProcessError> {
    let width_attribute = names.attribute("w");
    writer.write_event(Event::Empty(
        names
            .root("gridCol")
            .with_attributes([(width_attribute.as_str(), width)]),
    ))?;
    Ok(())
}

fn write_cell<W: Write>(
    writer: &mut Writer<W>,
    names: &InsertedNames,
    text: &str,
    width: &str,
) -> Result<(), ProcessError> {
    let width_attribute = names.attribute("w");
    let type_attribute = names.attribute("type");

    writer.write_event(Event::Start(names.root("tc")))?;
    writer.write_event(names.start("tcPr"))?;
    writer.write_event(Event::Empty(BytesStart::new(names.element("tcW")).with_attributes([
        (width_attribute.as_str(), width),
        (type_attribute.as_str(), "dxa"),
    ])))?;
    writer.write_event(names.end("tcPr"))?;
    writer.write_event(names.start("p"))?;

    if !text.is_empty() {
        writer.write_event(names.start("r"))?;
        for (index, line) in text.split('\n').enumerate() {
            if index > 0 {
                writer.write_event(Event::Empty(BytesStart::new(names.element("br"))))?;
            }
            for (part_index, part) in line.split('\t').enumerate() {
                if part_index > 0 {
                    writer.write_event(Event::Empty(BytesStart::new(names.element("tab"))))?;
                }
                if part.is_empty() {
                    continue;
                }
                writer.write_event(Event::Start(
                    BytesStart::new(names.element("t")).with_attributes([("xml:space", "preserve")]),
                ))?;
                writer.write_event(Event::Text(BytesText::new(part)))?;
                writer.write_event(names.end("t"))?;
            }
        }
        writer.write_event(names.end("r"))?;
    }

    writer.write_event(names.end("p"))?;
    writer.write_event(names.end("tc"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{AppendedColumn, append_columns, parse_body_tables};

    const WML: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

    fn document(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{WML}"><w:body>{body}<w:sectPr/></w:body></w:document>"#
        )
    }

    fn cell(text: &str) -> String {
        format!("<w:tc><w:p><w:r><w:t>{text}</w:t></w:r></w:p></w:tc>")
    }

    fn rewrite(xml: &str, columns: &BTreeMap<usize, AppendedColumn>) -> String {
        let rewritten = append_columns(xml, columns, 2160).expect("rewrite should succeed");
        String::from_utf8(rewritten).expect("rewritten XML should be UTF-8")
    }

    fn single_column(cells: &[&str]) -> BTreeMap<usize, AppendedColumn> {
        let mut columns = BTreeMap::new();
        columns.insert(
            0,
            AppendedColumn {
                cells: cells.iter().map(|cell| (*cell).to_string()).collect(),
            },
        );
        columns
    }

    #[test]
    fn reads_cell_text_and_paragraph_breaks() {
        let xml = document(&format!(
            "<w:tbl><w:tblGrid><w:gridCol/><w:gridCol/></w:tblGrid><w:tr>{}<w:tc><w:p><w:r><w:t>a</w:t><w:tab/><w:t>b</w:t></w:r></w:p><w:p><w:hyperlink><w:r><w:t>c &amp; d</w:t></w:r></w:hyperlink></w:p></w:tc></w:tr></w:tbl>",
            cell("x")
        ));

        let tables = parse_body_tables(&xml, 100).expect("tables should parse");
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows, vec![vec!["x".to_string(), "a\tb\nc & d".to_string()]]);
    }

    #[test]
    fn expands_merged_cells() {
        let xml = document(&format!(
            r#"<w:tbl><w:tr><w:tc><w:tcPr><w:gridSpan w:val="2"/></w:tcPr><w:p><w:r><w:t>wide</w:t></w:r></w:p></w:tc>{}</w:tr><w:tr><w:tc><w:tcPr><w:vMerge w:val="restart"/></w:tcPr><w:p><w:r><w:t>top</w:t></w:r></w:p></w:tc>{}{}</w:tr><w:tr><w:tc><w:tcPr><w:vMerge/></w:tcPr><w:p/></w:tc>{}{}</w:tr></w:tbl>"#,
            cell("c"),
            cell("1"),
            cell("2"),
            cell("3"),
            cell("4"),
        ));

        let tables = parse_body_tables(&xml, 100).expect("tables should parse");
        assert_eq!(tables[0].rows[0], vec!["wide", "wide", "c"]);
        assert_eq!(tables[0].rows[2], vec!["top", "3", "4"]);
    }

    #[test]
    fn ignores_nested_tables_in_cell_text() {
        let xml = document(&format!(
            "<w:tbl><w:tr><w:tc><w:p><w:r><w:t>outer</w:t></w:r></w:p><w:tbl><w:tr>{}</w:tr></w:tbl><w:p/></w:tc></w:tr></w:tbl>",
            cell("inner")
        ));

        let tables = parse_body_tables(&xml, 100).expect("tables should parse");
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows, vec![vec!["outer\n".to_string()]]);
    }

    #[test]
    fn resolves_elements_by_namespace_not_prefix() {
        let xml = format!(
            r#"<ns0:document xmlns:ns0="{WML}"><ns0:body><ns0:tbl><ns0:tr><ns0:tc><ns0:tcPr><ns0:gridSpan ns0:val="2"/></ns0:tcPr><ns0:p><ns0:r><ns0:t>wide</ns0:t></ns0:r></ns0:p></ns0:tc></ns0:tr></ns0:tbl></ns0:body></ns0:document>"#
        );
        let tables = parse_body_tables(&xml, 100).expect("tables should parse");
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows, vec![vec!["wide", "wide"]]);

        let default_namespace = format!(
            r#"<document xmlns="{WML}"><body><tbl><tr><tc><p><r><t>plain</t></r></p></tc></tr></tbl></body></document>"#
        );
        let tables = parse_body_tables(&default_namespace, 100).expect("tables should parse");
        assert_eq!(tables[0].rows, vec![vec!["plain"]]);
    }

    #[test]
    fn skips_look_alike_elements_from_other_namespaces() {
        let xml = document(
            r#"<x:tbl xmlns:x="urn:example"><x:tr><x:tc><x:p><x:r><x:t>foreign</x:t></x:r></x:p></x:tc></x:tr></x:tbl><w:tbl><w:tr><w:tc><w:p><w:r><w:t>ours</w:t></w:r><x:t xmlns:x="urn:example">skipped</x:t></w:p></w:tc></w:tr></w:tbl>"#,
        );
        let tables = parse_body_tables(&xml, 100).expect("tables should parse");
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows, vec![vec!["ours"]]);
    }

    #[test]
    fn rejects_documents_over_row_limit() {
        let rows = format!("<w:tr>{}</w:tr>", cell("a")).repeat(3);
        let xml = document(&format!("<w:tbl>{rows}</w:tbl>"));
        assert!(parse_body_tables(&xml, 2).is_err());
    }

    #[test]
    fn appends_grid_column_and_cells_to_selected_table() {
        let table = format!(
            "<w:tbl><w:tblGrid><w:gridCol w:w=\"100\"/></w:tblGrid><w:tr>{}</w:tr><w:tr>{}</w:tr></w:tbl>",
            cell("h"),
            cell("v")
        );
        let xml = document(&format!("{table}<w:p/>{table}"));
        let mut columns = BTreeMap::new();
        columns.insert(
            1,
            AppendedColumn {
                cells: vec!["head".to_string(), "a < b".to_string()],
            },
        );

        let rewritten = rewrite(&xml, &columns);
        let tables = parse_body_tables(&rewritten, 100).expect("rewritten tables should parse");

        assert_eq!(tables[0].rows, vec![vec!["h"], vec!["v"]]);
        assert_eq!(tables[1].rows, vec![vec!["h", "head"], vec!["v", "a < b"]]);
        assert_eq!(rewritten.matches("<w:gridCol w:w=\"2160\"/>").count(), 1);
        assert!(rewritten.contains("a &lt; b"));
    }

    #[test]
    fn inserted_markup_follows_the_table_prefix() {
        let xml = format!(
            r#"<ns0:document xmlns:ns0="{WML}"><ns0:body><ns0:tbl><ns0:tblGrid><ns0:gridCol ns0:w="100"/></ns0:tblGrid><ns0:tr><ns0:tc><ns0:p><ns0:r><ns0:t>h</ns0:t></ns0:r></ns0:p></ns0:tc></ns0:tr></ns0:tbl></ns0:body></ns0:document>"#
        );
        let rewritten = rewrite(&xml, &single_column(&["new"]));

        assert!(rewritten.contains(r#"<ns0:gridCol ns0:w="2160"/></ns0:tblGrid>"#));
        assert!(rewritten.contains(r#"<ns0:tcW ns0:w="2160" ns0:type="dxa"/>"#));
        assert!(!rewritten.contains("<w:"));
        let tables = parse_body_tables(&rewritten, 100).expect("rewritten tables should parse");
        assert_eq!(tables[0].rows, vec![vec!["h", "new"]]);
    }

    #[test]
    fn default_namespace_table_binds_w_for_inserted_attributes() {
        let xml = format!(
            r#"<document xmlns="{WML}"><body><tbl><tblGrid><gridCol/></tblGrid><tr><tc><p><r><t>h</t></r></p></tc></tr></tbl></body></document>"#
        );
        let rewritten = rewrite(&xml, &single_column(&["new"]));

        assert!(rewritten.contains(&format!(r#"<gridCol xmlns:w="{WML}" w:w="2160"/></tblGrid>"#)));
        assert!(rewritten.contains(&format!(r#"<tc xmlns:w="{WML}"><tcPr><tcW w:w="2160" w:type="dxa"/>"#)));
        let tables = parse_body_tables(&rewritten, 100).expect("rewritten tables should parse");
        assert_eq!(tables[0].rows, vec![vec!["h", "new"]]);
    }
}

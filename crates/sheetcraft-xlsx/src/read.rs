//! Template import: workbook sheet discovery and worksheet parsing into the
//! in-memory [`TemplateDocument`].

use roxmltree::{Document, Node};
use sheetcraft_model::{CellRef, CellTemplate, CellValue, Range, RowTemplate, SheetTemplate, TemplateDocument};

use crate::opc::{parse_relationships, rels_for_part, resolve_target};
use crate::shared_strings::parse_shared_strings_xml;
use crate::{XlsxError, XlsxPackage};

const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// One workbook sheet entry with its resolved worksheet part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorksheetPartInfo {
    pub name: String,
    pub sheet_id: u32,
    pub rel_id: String,
    pub worksheet_part: String,
}

/// Ordered workbook sheets with their worksheet part paths, from
/// `xl/workbook.xml` + `xl/_rels/workbook.xml.rels`.
pub fn worksheet_parts(package: &XlsxPackage) -> Result<Vec<WorksheetPartInfo>, XlsxError> {
    let workbook_xml = package.part_str("xl/workbook.xml")?;
    let doc = Document::parse(workbook_xml)?;

    let rels_bytes = package
        .part(&rels_for_part("xl/workbook.xml"))
        .ok_or_else(|| XlsxError::MissingPart("xl/_rels/workbook.xml.rels".to_string()))?;
    let rels = parse_relationships(rels_bytes)?;

    let mut out = Vec::new();
    for sheet in doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "sheet")
    {
        let name = sheet
            .attribute("name")
            .ok_or(XlsxError::Invalid("workbook sheet missing name".to_string()))?
            .to_string();
        let sheet_id: u32 = sheet
            .attribute("sheetId")
            .and_then(|v| v.parse().ok())
            .unwrap_or(out.len() as u32 + 1);
        let rel_id = sheet
            .attribute((REL_NS, "id"))
            .or_else(|| sheet.attribute("r:id"))
            .or_else(|| sheet.attribute("id"))
            .ok_or_else(|| XlsxError::Invalid(format!("sheet {name} missing r:id")))?
            .to_string();

        let rel = rels
            .iter()
            .find(|rel| rel.id == rel_id)
            .ok_or_else(|| XlsxError::Invalid(format!("sheet {name} references missing {rel_id}")))?;
        if rel.is_external() {
            continue;
        }

        out.push(WorksheetPartInfo {
            name,
            sheet_id,
            rel_id,
            worksheet_part: resolve_target("xl/workbook.xml", &rel.target),
        });
    }

    Ok(out)
}

/// Read a template package into a [`TemplateDocument`].
///
/// Shared and inline strings are resolved to plain cell text (placeholders are
/// ordinary text content), formulas keep their `<f>` payload verbatim, and
/// style indices pass through untouched.
pub fn read_template(package: &XlsxPackage) -> Result<TemplateDocument, XlsxError> {
    let shared = match package.part("xl/sharedStrings.xml") {
        Some(bytes) => {
            let xml = std::str::from_utf8(bytes)
                .map_err(|e| XlsxError::Invalid(format!("sharedStrings not utf-8: {e}")))?;
            parse_shared_strings_xml(xml)?
        }
        None => Vec::new(),
    };

    let mut doc = TemplateDocument::default();
    for info in worksheet_parts(package)? {
        let sheet_xml = package.part_str(&info.worksheet_part)?;
        doc.sheets.push(parse_worksheet(&info.name, sheet_xml, &shared)?);
    }
    Ok(doc)
}

fn parse_worksheet(
    name: &str,
    sheet_xml: &str,
    shared: &[String],
) -> Result<SheetTemplate, XlsxError> {
    let doc = Document::parse(sheet_xml)?;
    let root = doc.root_element();
    let mut sheet = SheetTemplate::new(name);

    if let Some(cols) = find_child(&root, "cols") {
        for col in cols.children().filter(|n| n.is_element() && n.tag_name().name() == "col") {
            let (Some(min), Some(max), Some(width)) = (
                col.attribute("min").and_then(|v| v.parse::<u32>().ok()),
                col.attribute("max").and_then(|v| v.parse::<u32>().ok()),
                col.attribute("width").and_then(|v| v.parse::<f64>().ok()),
            ) else {
                continue;
            };
            for c in min..=max.min(min + 1024) {
                sheet.col_widths.insert(c, width);
            }
        }
    }

    if let Some(sheet_data) = find_child(&root, "sheetData") {
        let mut next_row = 1u32;
        for row_node in sheet_data
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "row")
        {
            let row_num = row_node
                .attribute("r")
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(next_row);
            next_row = row_num + 1;

            let mut row = RowTemplate::new(row_num);
            if row_node
                .attribute("customHeight")
                .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            {
                row.height = row_node.attribute("ht").and_then(|v| v.parse().ok());
            }
            row.outline_level = row_node.attribute("outlineLevel").and_then(|v| v.parse().ok());

            let mut next_col = 1u32;
            for cell_node in row_node
                .children()
                .filter(|n| n.is_element() && n.tag_name().name() == "c")
            {
                let cell_ref = match cell_node.attribute("r") {
                    Some(a1) => CellRef::from_a1(a1)
                        .map_err(|e| XlsxError::Invalid(format!("bad cell ref {a1}: {e}")))?,
                    None => CellRef::new(row_num, next_col),
                };
                next_col = cell_ref.col + 1;

                let style = cell_node.attribute("s").and_then(|v| v.parse().ok());
                let value = parse_cell_value(&cell_node, shared)?;
                if value.is_empty() && style.is_none() {
                    continue;
                }
                row.cells.push(CellTemplate {
                    cell: cell_ref,
                    value,
                    style,
                });
            }

            sheet.rows.push(row);
        }
    }

    if let Some(merge_cells) = find_child(&root, "mergeCells") {
        for merge in merge_cells
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "mergeCell")
        {
            let Some(range) = merge.attribute("ref") else {
                continue;
            };
            let range = Range::from_a1(range)
                .map_err(|e| XlsxError::Invalid(format!("bad merge ref {range}: {e}")))?;
            sheet.merges.push(range);
        }
    }

    Ok(sheet)
}

fn parse_cell_value(cell: &Node<'_, '_>, shared: &[String]) -> Result<CellValue, XlsxError> {
    if let Some(f) = find_child(cell, "f") {
        let formula = f.text().unwrap_or("").to_string();
        if !formula.is_empty() {
            return Ok(CellValue::Formula(formula));
        }
    }

    let cell_type = cell.attribute("t").unwrap_or("n");
    match cell_type {
        "s" => {
            let idx: usize = find_child(cell, "v")
                .and_then(|v| v.text())
                .and_then(|t| t.trim().parse().ok())
                .ok_or_else(|| XlsxError::Invalid("shared string cell missing index".to_string()))?;
            let text = shared
                .get(idx)
                .ok_or_else(|| XlsxError::Invalid(format!("shared string index {idx} out of range")))?;
            Ok(CellValue::Text(text.clone()))
        }
        "inlineStr" => {
            let mut text = String::new();
            if let Some(is) = find_child(cell, "is") {
                for t in is
                    .descendants()
                    .filter(|n| n.is_element() && n.tag_name().name() == "t")
                {
                    text.push_str(t.text().unwrap_or(""));
                }
            }
            Ok(CellValue::Text(text))
        }
        "str" => Ok(CellValue::Text(
            find_child(cell, "v")
                .and_then(|v| v.text())
                .unwrap_or("")
                .to_string(),
        )),
        "b" => {
            let v = find_child(cell, "v").and_then(|v| v.text()).unwrap_or("0");
            Ok(CellValue::Bool(v.trim() == "1" || v.trim().eq_ignore_ascii_case("true")))
        }
        _ => match find_child(cell, "v").and_then(|v| v.text()) {
            Some(v) => {
                let n: f64 = v
                    .trim()
                    .parse()
                    .map_err(|e| XlsxError::Invalid(format!("bad numeric cell value {v:?}: {e}")))?;
                Ok(CellValue::Number(n))
            }
            None => Ok(CellValue::Empty),
        },
    }
}

fn find_child<'a, 'i>(node: &Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_rows_cells_and_merges() {
        let xml = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <cols><col min="1" max="2" width="18.5" customWidth="1"/></cols>
  <sheetData>
    <row r="1" ht="28.5" customHeight="1">
      <c r="A1" t="inlineStr" s="3"><is><t>{{ title }}</t></is></c>
      <c r="B1"><v>42</v></c>
    </row>
    <row r="3">
      <c r="D3"><f>B3*C3</f><v>0</v></c>
      <c r="E3" t="b"><v>1</v></c>
    </row>
  </sheetData>
  <mergeCells count="1"><mergeCell ref="A1:B1"/></mergeCells>
</worksheet>"#;

        let sheet = parse_worksheet("Sheet1", xml, &[]).unwrap();
        assert_eq!(sheet.col_widths.get(&1), Some(&18.5));
        assert_eq!(sheet.col_widths.get(&2), Some(&18.5));
        assert_eq!(sheet.rows.len(), 2);

        let first = &sheet.rows[0];
        assert_eq!(first.row, 1);
        assert_eq!(first.height, Some(28.5));
        assert_eq!(first.cells[0].value, CellValue::Text("{{ title }}".to_string()));
        assert_eq!(first.cells[0].style, Some(3));
        assert_eq!(first.cells[1].value, CellValue::Number(42.0));

        let third = &sheet.rows[1];
        assert_eq!(third.cells[0].value, CellValue::Formula("B3*C3".to_string()));
        assert_eq!(third.cells[1].value, CellValue::Bool(true));

        assert_eq!(sheet.merges, vec![Range::from_a1("A1:B1").unwrap()]);
    }

    #[test]
    fn resolves_shared_strings() {
        let xml = r#"<worksheet><sheetData>
    <row r="1"><c r="A1" t="s"><v>0</v></c></row>
  </sheetData></worksheet>"#;
        let shared = vec!["{% endfor %}".to_string()];
        let sheet = parse_worksheet("S", xml, &shared).unwrap();
        assert_eq!(
            sheet.rows[0].cells[0].value,
            CellValue::Text("{% endfor %}".to_string())
        );
    }
}

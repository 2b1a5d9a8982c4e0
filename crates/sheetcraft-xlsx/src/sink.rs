//! The xlsx backend for the [`WorkbookSink`] contract.
//!
//! Two construction modes share one write path:
//!
//! - [`XlsxSink::from_template`] seeds the sink from an existing package.
//!   Worksheet parts are regenerated from the written cells; every other part
//!   (styles, theme, docProps, ...) is carried through verbatim, which is how
//!   opaque style indices survive the render.
//! - [`XlsxSink::new_workbook`] starts from nothing and emits a minimal
//!   single-workbook package. Used to author template files.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use sheetcraft_model::{
    col_to_name, AnchoredImage, CellValue, Range, SheetId, SinkError, WorkbookSink,
};

use crate::drawing::{
    build_anchor_xml, build_drawing_rels_xml, build_drawing_xml, ImagePlacement, REL_TYPE_IMAGE,
};
use crate::opc::{
    escape_attr, escape_text, next_rel_id, parse_relationships, rels_for_part, resolve_target,
    write_relationships, Relationship,
};
use crate::read::{read_template, worksheet_parts};
use crate::{XlsxError, XlsxPackage};

/// Excel's default column width in character units.
pub const DEFAULT_COLUMN_WIDTH_CHARS: f64 = 8.43;
/// Excel's default row height in points.
pub const DEFAULT_ROW_HEIGHT_PT: f64 = 15.0;

const REL_TYPE_WORKSHEET: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const REL_TYPE_STYLES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
const REL_TYPE_DRAWING: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing";
const CT_WORKSHEET: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
const CT_DRAWING: &str = "application/vnd.openxmlformats-officedocument.drawing+xml";

/// Approximate conversion from Excel character-unit column width to pixels
/// (Calibri 11 at 96 DPI, the same approximation openpyxl and xlsxwriter use).
pub fn column_width_to_px(chars: f64) -> f64 {
    (chars * 7.0 + 5.0).max(0.0)
}

/// Row heights are stored in points; pixels at 96 DPI.
pub fn row_height_pt_to_px(pt: f64) -> f64 {
    pt * 96.0 / 72.0
}

#[derive(Debug, Default, Clone)]
struct RowBuffer {
    height: Option<f64>,
    /// Cells keyed by 1-based column.
    cells: BTreeMap<u32, (CellValue, Option<u32>)>,
}

/// A drawing part the template worksheet already referenced. The part and
/// its relationship survive the render; the regenerated worksheet must
/// re-emit the `<drawing>` element or the images silently vanish.
#[derive(Debug, Clone)]
struct TemplateDrawing {
    part_name: String,
    rel_id: String,
}

#[derive(Debug, Clone)]
struct SheetBuffer {
    name: String,
    part_name: String,
    sheet_id: u32,
    /// True when the sheet was added by `new_sheet` rather than found in the
    /// template package; such sheets need workbook.xml/rels/content-type
    /// registration at save time.
    added: bool,
    rows: BTreeMap<u32, RowBuffer>,
    merges: Vec<Range>,
    images: Vec<(u32, u32, AnchoredImage)>,
    col_widths: BTreeMap<u32, f64>,
    template_drawing: Option<TemplateDrawing>,
}

/// Template-package-backed [`WorkbookSink`] implementation.
#[derive(Debug)]
pub struct XlsxSink {
    package: XlsxPackage,
    sheets: Vec<SheetBuffer>,
    owns_workbook: bool,
}

impl XlsxSink {
    /// Start a new minimal workbook from scratch.
    pub fn new_workbook() -> Self {
        Self {
            package: XlsxPackage::default(),
            sheets: Vec::new(),
            owns_workbook: true,
        }
    }

    /// Seed the sink from an existing package.
    ///
    /// Sheet buffers are pre-created for every workbook sheet (so
    /// `new_sheet("existing name")` opens rather than duplicates) and column
    /// widths are read for geometry queries. `xl/calcChain.xml` is dropped:
    /// rewriting sheet data invalidates it.
    pub fn from_template(mut package: XlsxPackage) -> Result<Self, XlsxError> {
        package.remove_part("xl/calcChain.xml");

        let template = read_template(&package)?;
        let mut sheets = Vec::new();
        for info in worksheet_parts(&package)? {
            let col_widths = template
                .sheet(&info.name)
                .map(|s| s.col_widths.clone())
                .unwrap_or_default();
            let template_drawing = match package.part(&rels_for_part(&info.worksheet_part)) {
                Some(bytes) => parse_relationships(bytes)?
                    .into_iter()
                    .find(|rel| rel.type_uri == REL_TYPE_DRAWING)
                    .map(|rel| TemplateDrawing {
                        part_name: resolve_target(&info.worksheet_part, &rel.target),
                        rel_id: rel.id,
                    }),
                None => None,
            };
            sheets.push(SheetBuffer {
                name: info.name,
                part_name: info.worksheet_part,
                sheet_id: info.sheet_id,
                added: false,
                rows: BTreeMap::new(),
                merges: Vec::new(),
                images: Vec::new(),
                col_widths,
                template_drawing,
            });
        }

        Ok(Self {
            package,
            sheets,
            owns_workbook: false,
        })
    }

    /// Set a column width (character units) on a sheet, for geometry queries
    /// and for serialization into the `<cols>` section.
    pub fn set_column_width(&mut self, sheet: SheetId, col: u32, width: f64) -> Result<(), SinkError> {
        self.sheet_mut(sheet)?.col_widths.insert(col, width);
        Ok(())
    }

    fn sheet_mut(&mut self, sheet: SheetId) -> Result<&mut SheetBuffer, SinkError> {
        self.sheets
            .get_mut(sheet.0)
            .ok_or_else(|| SinkError::new(format!("unknown sheet handle {}", sheet.0)))
    }

    fn sheet_ref(&self, sheet: SheetId) -> Option<&SheetBuffer> {
        self.sheets.get(sheet.0)
    }

    fn next_sheet_part(&self) -> (String, u32) {
        let mut max_index = 0u32;
        for name in self
            .package
            .part_names()
            .chain(self.sheets.iter().map(|s| s.part_name.as_str()))
        {
            if let Some(n) = name
                .strip_prefix("xl/worksheets/sheet")
                .and_then(|rest| rest.strip_suffix(".xml"))
                .and_then(|n| n.parse::<u32>().ok())
            {
                max_index = max_index.max(n);
            }
        }
        let max_sheet_id = self.sheets.iter().map(|s| s.sheet_id).max().unwrap_or(0);
        (
            format!("xl/worksheets/sheet{}.xml", max_index + 1),
            max_sheet_id + 1,
        )
    }

    fn serialize_worksheet(buffer: &SheetBuffer, drawing_rel_id: Option<&str>) -> Vec<u8> {
        let mut xml = String::new();
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push_str(
            r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
        );

        if !buffer.col_widths.is_empty() {
            xml.push_str("<cols>");
            for (col, width) in &buffer.col_widths {
                xml.push_str(&format!(
                    r#"<col min="{col}" max="{col}" width="{width}" customWidth="1"/>"#
                ));
            }
            xml.push_str("</cols>");
        }

        xml.push_str("<sheetData>");
        for (row_num, row) in &buffer.rows {
            if row.cells.is_empty() && row.height.is_none() {
                continue;
            }
            xml.push_str(&format!(r#"<row r="{row_num}""#));
            if let Some(height) = row.height {
                xml.push_str(&format!(r#" ht="{height}" customHeight="1""#));
            }
            xml.push('>');
            for (col, (value, style)) in &row.cells {
                write_cell_xml(&mut xml, *row_num, *col, value, *style);
            }
            xml.push_str("</row>");
        }
        xml.push_str("</sheetData>");

        if !buffer.merges.is_empty() {
            xml.push_str(&format!(r#"<mergeCells count="{}">"#, buffer.merges.len()));
            for merge in &buffer.merges {
                xml.push_str(&format!(r#"<mergeCell ref="{merge}"/>"#));
            }
            xml.push_str("</mergeCells>");
        }

        if let Some(rel_id) = drawing_rel_id {
            xml.push_str(&format!(r#"<drawing r:id="{rel_id}"/>"#));
        }

        xml.push_str("</worksheet>");
        xml.into_bytes()
    }

    fn next_media_index(&self) -> u32 {
        let mut max = 0u32;
        for name in self.package.part_names() {
            if let Some(rest) = name.strip_prefix("xl/media/image") {
                if let Some(n) = rest.split('.').next().and_then(|n| n.parse::<u32>().ok()) {
                    max = max.max(n);
                }
            }
        }
        max
    }

    fn next_drawing_index(&self) -> u32 {
        let mut max = 0u32;
        for name in self.package.part_names() {
            if let Some(n) = name
                .strip_prefix("xl/drawings/drawing")
                .and_then(|rest| rest.strip_suffix(".xml"))
                .and_then(|n| n.parse::<u32>().ok())
            {
                max = max.max(n);
            }
        }
        max
    }

    /// Register a drawing relationship on a worksheet's `.rels` part,
    /// creating the part when the worksheet had none.
    fn attach_drawing_rel(&mut self, worksheet_part: &str, drawing_part: &str) -> Result<String, XlsxError> {
        let rels_name = rels_for_part(worksheet_part);
        let mut rels = match self.package.part(&rels_name) {
            Some(bytes) => parse_relationships(bytes)?,
            None => Vec::new(),
        };
        let rel_id = next_rel_id(&rels);
        let target = drawing_part
            .strip_prefix("xl/")
            .map(|rest| format!("../{rest}"))
            .unwrap_or_else(|| format!("/{drawing_part}"));
        rels.push(Relationship {
            id: rel_id.clone(),
            type_uri: REL_TYPE_DRAWING.to_string(),
            target,
            target_mode: None,
        });
        self.package.set_part(rels_name, write_relationships(&rels));
        Ok(rel_id)
    }

    /// Append anchors for freshly inserted images to an existing drawing
    /// part, extending its relationship list.
    fn append_to_drawing(
        &mut self,
        drawing_part: &str,
        placements: &[ImagePlacement],
    ) -> Result<(), XlsxError> {
        let rels_name = rels_for_part(drawing_part);
        let mut rels = match self.package.part(&rels_name) {
            Some(bytes) => parse_relationships(bytes)?,
            None => Vec::new(),
        };

        let mut xml = self.package.part_str(drawing_part)?.to_string();
        let Some(pos) = xml.rfind("</") else {
            return Err(XlsxError::Invalid(format!("{drawing_part} has no closing tag")));
        };

        let mut object_id = rels.len() as u32;
        let mut anchors = String::new();
        for placement in placements {
            object_id += 1;
            let rel_id = next_rel_id(&rels);
            rels.push(Relationship {
                id: rel_id.clone(),
                type_uri: REL_TYPE_IMAGE.to_string(),
                target: format!("../media/{}", placement.media_name),
                target_mode: None,
            });
            anchors.push_str(&build_anchor_xml(placement, object_id, &rel_id));
        }
        xml.insert_str(pos, &anchors);

        self.package.set_part(drawing_part.to_string(), xml.into_bytes());
        self.package.set_part(rels_name, write_relationships(&rels));
        Ok(())
    }

    /// Renumber anchor rows in a template-carried drawing part after row
    /// expansion moved the rows beneath them.
    ///
    /// `shifts` is a row-ascending list of `(first_template_row, delta)`
    /// breakpoints; an anchor on template row `r` moves by the delta of the
    /// last entry whose row is `<= r`, or not at all.
    pub fn shift_template_anchors(
        &mut self,
        sheet: SheetId,
        shifts: &[(u32, i64)],
    ) -> Result<(), SinkError> {
        let Some(drawing) = self
            .sheet_ref(sheet)
            .and_then(|s| s.template_drawing.clone())
        else {
            return Ok(());
        };
        if shifts.iter().all(|(_, delta)| *delta == 0) {
            return Ok(());
        }

        let xml = self
            .package
            .part_str(&drawing.part_name)
            .map_err(|e| SinkError::new(e.to_string()))?
            .to_string();
        let shifted = anchor_row_re().replace_all(&xml, |caps: &regex::Captures| {
            let prefix = caps.get(1).map_or("", |m| m.as_str());
            let row0: i64 = caps[2].parse().unwrap_or(0);
            // Anchor rows are 0-indexed; template rows are 1-based.
            let delta = shifts
                .iter()
                .take_while(|(first, _)| (*first as i64) <= row0 + 1)
                .last()
                .map_or(0, |(_, delta)| *delta);
            format!("<{prefix}row>{}</{prefix}row>", (row0 + delta).max(0))
        });
        if let Cow::Owned(patched) = shifted {
            self.package.set_part(drawing.part_name, patched.into_bytes());
        }
        Ok(())
    }

    fn ensure_content_type_override(&mut self, part_name: &str, content_type: &str) -> Result<(), XlsxError> {
        let xml = match self.package.part("[Content_Types].xml") {
            Some(bytes) => String::from_utf8(bytes.to_vec())?,
            None => return Err(XlsxError::MissingPart("[Content_Types].xml".to_string())),
        };
        let part_attr = format!(r#"PartName="/{part_name}""#);
        if xml.contains(&part_attr) {
            return Ok(());
        }
        let Some(pos) = xml.rfind("</Types>") else {
            return Err(XlsxError::Invalid("[Content_Types].xml missing </Types>".to_string()));
        };
        let mut patched = xml;
        patched.insert_str(
            pos,
            &format!(r#"<Override PartName="/{part_name}" ContentType="{content_type}"/>"#),
        );
        self.package.set_part("[Content_Types].xml", patched.into_bytes());
        Ok(())
    }

    /// Insert `<sheet>` entries for sheets added after construction into an
    /// existing `xl/workbook.xml`, and register their parts.
    fn register_added_sheets(&mut self) -> Result<(), XlsxError> {
        let added: Vec<(String, String, u32)> = self
            .sheets
            .iter()
            .filter(|s| s.added)
            .map(|s| (s.name.clone(), s.part_name.clone(), s.sheet_id))
            .collect();
        if added.is_empty() {
            return Ok(());
        }

        let rels_name = rels_for_part("xl/workbook.xml");
        let mut rels = match self.package.part(&rels_name) {
            Some(bytes) => parse_relationships(bytes)?,
            None => Vec::new(),
        };

        let mut workbook_xml = self.package.part_str("xl/workbook.xml")?.to_string();
        for (name, part_name, sheet_id) in added {
            let rel_id = next_rel_id(&rels);
            rels.push(Relationship {
                id: rel_id.clone(),
                type_uri: REL_TYPE_WORKSHEET.to_string(),
                target: part_name.strip_prefix("xl/").unwrap_or(&part_name).to_string(),
                target_mode: None,
            });

            let sheet_entry = format!(
                r#"<sheet name="{}" sheetId="{sheet_id}" r:id="{rel_id}"/>"#,
                escape_attr(&name)
            );
            let Some(pos) = workbook_xml.rfind("</sheets>") else {
                return Err(XlsxError::Invalid("workbook.xml missing </sheets>".to_string()));
            };
            workbook_xml.insert_str(pos, &sheet_entry);

            self.ensure_content_type_override(&part_name, CT_WORKSHEET)?;
        }

        self.package.set_part("xl/workbook.xml", workbook_xml.into_bytes());
        self.package.set_part(rels_name, write_relationships(&rels));
        Ok(())
    }

    /// Emit the fixed scaffolding parts for a from-scratch workbook.
    fn write_workbook_scaffolding(&mut self) -> Result<(), XlsxError> {
        let mut content_types = String::new();
        content_types.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        content_types.push_str(
            r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
        );
        content_types.push_str(
            r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
        );
        content_types.push_str(r#"<Default Extension="xml" ContentType="application/xml"/>"#);
        content_types.push_str(
            r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
        );
        content_types.push_str(
            r#"<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#,
        );
        for sheet in &self.sheets {
            content_types.push_str(&format!(
                r#"<Override PartName="/{}" ContentType="{CT_WORKSHEET}"/>"#,
                sheet.part_name
            ));
        }
        content_types.push_str("</Types>");
        self.package
            .set_part("[Content_Types].xml", content_types.into_bytes());

        self.package.set_part(
            "_rels/.rels",
            write_relationships(&[Relationship {
                id: "rId1".to_string(),
                type_uri:
                    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument"
                        .to_string(),
                target: "xl/workbook.xml".to_string(),
                target_mode: None,
            }]),
        );

        let mut workbook = String::new();
        workbook.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        workbook.push_str(
            r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
        );
        let mut workbook_rels = Vec::new();
        for (idx, sheet) in self.sheets.iter().enumerate() {
            let rel_id = format!("rId{}", idx + 1);
            workbook.push_str(&format!(
                r#"<sheet name="{}" sheetId="{}" r:id="{rel_id}"/>"#,
                escape_attr(&sheet.name),
                sheet.sheet_id
            ));
            workbook_rels.push(Relationship {
                id: rel_id,
                type_uri: REL_TYPE_WORKSHEET.to_string(),
                target: sheet
                    .part_name
                    .strip_prefix("xl/")
                    .unwrap_or(&sheet.part_name)
                    .to_string(),
                target_mode: None,
            });
        }
        workbook.push_str("</sheets></workbook>");
        workbook_rels.push(Relationship {
            id: format!("rId{}", self.sheets.len() + 1),
            type_uri: REL_TYPE_STYLES.to_string(),
            target: "styles.xml".to_string(),
            target_mode: None,
        });

        self.package.set_part("xl/workbook.xml", workbook.into_bytes());
        self.package.set_part(
            rels_for_part("xl/workbook.xml"),
            write_relationships(&workbook_rels),
        );
        self.package.set_part("xl/styles.xml", minimal_styles_xml());
        Ok(())
    }

    fn save_inner(&mut self) -> Result<Vec<u8>, XlsxError> {
        if self.owns_workbook {
            self.write_workbook_scaffolding()?;
        } else {
            self.register_added_sheets()?;
        }

        let mut media_index = self.next_media_index();
        let mut drawing_index = self.next_drawing_index();

        for sheet_idx in 0..self.sheets.len() {
            let images = std::mem::take(&mut self.sheets[sheet_idx].images);
            let template_drawing = self.sheets[sheet_idx].template_drawing.clone();
            let mut drawing_rel_id = template_drawing.as_ref().map(|d| d.rel_id.clone());

            if !images.is_empty() {
                let mut placements = Vec::with_capacity(images.len());
                for (row, col, image) in images {
                    media_index += 1;
                    let media_name = format!("image{media_index}.{}", image.extension);
                    self.package.set_part(
                        format!("xl/media/{media_name}"),
                        image.bytes.clone(),
                    );
                    placements.push(ImagePlacement {
                        row,
                        col,
                        image,
                        media_name,
                    });
                }

                if let Some(drawing) = &template_drawing {
                    // The worksheet already references a drawing; new anchors
                    // join it instead of starting a second part.
                    self.append_to_drawing(&drawing.part_name, &placements)?;
                } else {
                    drawing_index += 1;
                    let drawing_part = format!("xl/drawings/drawing{drawing_index}.xml");
                    self.package
                        .set_part(drawing_part.clone(), build_drawing_xml(&placements));
                    self.package.set_part(
                        rels_for_part(&drawing_part),
                        build_drawing_rels_xml(&placements),
                    );
                    self.ensure_content_type_override(&drawing_part, CT_DRAWING)?;

                    let worksheet_part = self.sheets[sheet_idx].part_name.clone();
                    drawing_rel_id = Some(self.attach_drawing_rel(&worksheet_part, &drawing_part)?);
                }
            }

            let buffer = &self.sheets[sheet_idx];
            let xml = Self::serialize_worksheet(buffer, drawing_rel_id.as_deref());
            let part_name = buffer.part_name.clone();
            self.package.set_part(part_name, xml);
        }

        self.package.write_to_bytes()
    }
}

impl WorkbookSink for XlsxSink {
    fn new_sheet(&mut self, name: &str) -> Result<SheetId, SinkError> {
        if let Some(idx) = self.sheets.iter().position(|s| s.name == name) {
            let buffer = &mut self.sheets[idx];
            buffer.rows.clear();
            buffer.merges.clear();
            buffer.images.clear();
            return Ok(SheetId(idx));
        }

        let (part_name, sheet_id) = self.next_sheet_part();
        self.sheets.push(SheetBuffer {
            name: name.to_string(),
            part_name,
            sheet_id,
            added: true,
            rows: BTreeMap::new(),
            merges: Vec::new(),
            images: Vec::new(),
            col_widths: BTreeMap::new(),
            template_drawing: None,
        });
        Ok(SheetId(self.sheets.len() - 1))
    }

    fn write_cell(
        &mut self,
        sheet: SheetId,
        row: u32,
        col: u32,
        value: CellValue,
        style: Option<u32>,
    ) -> Result<(), SinkError> {
        if row == 0 || col == 0 {
            return Err(SinkError::new(format!("cell coordinates are 1-based, got ({row}, {col})")));
        }
        let buffer = self.sheet_mut(sheet)?;
        buffer
            .rows
            .entry(row)
            .or_default()
            .cells
            .insert(col, (value, style));
        Ok(())
    }

    fn set_merged_range(&mut self, sheet: SheetId, range: Range) -> Result<(), SinkError> {
        self.sheet_mut(sheet)?.merges.push(range);
        Ok(())
    }

    fn set_row_height(&mut self, sheet: SheetId, row: u32, height: f64) -> Result<(), SinkError> {
        self.sheet_mut(sheet)?
            .rows
            .entry(row)
            .or_default()
            .height = Some(height);
        Ok(())
    }

    fn insert_anchored_image(
        &mut self,
        sheet: SheetId,
        row: u32,
        col: u32,
        image: AnchoredImage,
    ) -> Result<(), SinkError> {
        if row == 0 || col == 0 {
            return Err(SinkError::new(format!("anchor coordinates are 1-based, got ({row}, {col})")));
        }
        self.sheet_mut(sheet)?.images.push((row, col, image));
        Ok(())
    }

    fn column_width_px(&self, sheet: SheetId, col: u32) -> f64 {
        let chars = self
            .sheet_ref(sheet)
            .and_then(|s| s.col_widths.get(&col).copied())
            .unwrap_or(DEFAULT_COLUMN_WIDTH_CHARS);
        column_width_to_px(chars)
    }

    fn row_height_px(&self, sheet: SheetId, row: u32) -> f64 {
        let pt = self
            .sheet_ref(sheet)
            .and_then(|s| s.rows.get(&row).and_then(|r| r.height))
            .unwrap_or(DEFAULT_ROW_HEIGHT_PT);
        row_height_pt_to_px(pt)
    }

    fn save(&mut self) -> Result<Vec<u8>, SinkError> {
        self.save_inner().map_err(|e| SinkError::new(e.to_string()))
    }
}

/// `<row>` elements inside a drawing part only ever appear in anchor
/// `from`/`to` blocks, prefixed or not.
fn anchor_row_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<([A-Za-z0-9]+:)?row>([0-9]+)</(?:[A-Za-z0-9]+:)?row>").unwrap()
    })
}

fn write_cell_xml(xml: &mut String, row: u32, col: u32, value: &CellValue, style: Option<u32>) {
    let a1 = format!("{}{row}", col_to_name(col));
    xml.push_str(&format!(r#"<c r="{a1}""#));
    if let Some(style) = style {
        xml.push_str(&format!(r#" s="{style}""#));
    }
    match value {
        CellValue::Empty => xml.push_str("/>"),
        CellValue::Text(text) => {
            let preserve = text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace);
            let space = if preserve { r#" xml:space="preserve""# } else { "" };
            xml.push_str(&format!(
                r#" t="inlineStr"><is><t{space}>{}</t></is></c>"#,
                escape_text(text)
            ));
        }
        CellValue::Number(n) => xml.push_str(&format!("><v>{n}</v></c>")),
        CellValue::Bool(b) => {
            xml.push_str(&format!(r#" t="b"><v>{}</v></c>"#, if *b { 1 } else { 0 }))
        }
        CellValue::Formula(f) => xml.push_str(&format!("><f>{}</f></c>", escape_text(f))),
    }
}

fn minimal_styles_xml() -> Vec<u8> {
    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.push_str(r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#);
    out.push_str(r#"<fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts>"#);
    out.push_str(r#"<fills count="1"><fill><patternFill patternType="none"/></fill></fills>"#);
    out.push_str(r#"<borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>"#);
    out.push_str(r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#);
    out.push_str(r#"<cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs>"#);
    out.push_str(r#"<cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>"#);
    out.push_str("</styleSheet>");
    out.into_bytes()
}

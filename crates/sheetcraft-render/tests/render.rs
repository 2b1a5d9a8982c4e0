//! End-to-end rendering tests: build a template workbook through the sink,
//! render it, and read the output back.

use pretty_assertions::assert_eq;
use sheetcraft_model::{AnchoredImage, CellValue, Range, Value, WorkbookSink};
use sheetcraft_render::{
    render, ImageDirective, ImageInsert, RenderError, RenderOptions, RenderWarning, Renderer,
    IMAGE_SENTINEL,
};
use sheetcraft_xlsx::{read_template, XlsxPackage, XlsxSink};

fn build_template(rows: &[(u32, u32, CellValue)], merges: &[&str]) -> Vec<u8> {
    let mut sink = XlsxSink::new_workbook();
    let sheet = sink.new_sheet("Sheet1").unwrap();
    for (row, col, value) in rows {
        sink.write_cell(sheet, *row, *col, value.clone(), None).unwrap();
    }
    for merge in merges {
        sink.set_merged_range(sheet, Range::from_a1(merge).unwrap()).unwrap();
    }
    sink.save().unwrap()
}

fn text(s: &str) -> CellValue {
    CellValue::Text(s.to_string())
}

fn read_output(bytes: &[u8]) -> sheetcraft_model::TemplateDocument {
    read_template(&XlsxPackage::from_bytes(bytes).unwrap()).unwrap()
}

fn cell_at(doc: &sheetcraft_model::TemplateDocument, row: u32, col: u32) -> Option<CellValue> {
    doc.sheets[0]
        .rows
        .iter()
        .find(|r| r.row == row)
        .and_then(|r| r.cells.iter().find(|c| c.cell.col == col))
        .map(|c| c.value.clone())
}

#[test]
fn identity_render_preserves_rows_and_values() {
    let template = build_template(
        &[
            (1, 1, text("Quarterly Report")),
            (2, 1, CellValue::Number(42.0)),
            (2, 2, CellValue::Bool(true)),
            (3, 1, CellValue::Formula("A2*2".to_string())),
        ],
        &["A1:B1"],
    );

    let data = Value::from(serde_json::json!({}));
    let (bytes, report) = Renderer::new()
        .render_bytes(&template, &data, &RenderOptions::default())
        .unwrap();

    let doc = read_output(&bytes);
    assert_eq!(doc.sheets[0].rows.len(), 3);
    assert_eq!(cell_at(&doc, 1, 1), Some(text("Quarterly Report")));
    assert_eq!(cell_at(&doc, 2, 1), Some(CellValue::Number(42.0)));
    assert_eq!(cell_at(&doc, 2, 2), Some(CellValue::Bool(true)));
    assert_eq!(cell_at(&doc, 3, 1), Some(CellValue::Formula("A2*2".to_string())));
    assert_eq!(doc.sheets[0].merges, vec![Range::from_a1("A1:B1").unwrap()]);

    assert_eq!(report.rows_expanded, 0);
    assert_eq!(report.cells_substituted, 0);
    assert!(report.warnings.is_empty());
}

#[test]
fn style_references_pass_through_unchanged() {
    let mut sink = XlsxSink::new_workbook();
    let sheet = sink.new_sheet("Styled").unwrap();
    sink.write_cell(sheet, 1, 1, text("plain"), Some(0)).unwrap();
    sink.write_cell(sheet, 2, 1, text("{{ v }}"), Some(0)).unwrap();
    let template = sink.save().unwrap();

    let data = Value::from(serde_json::json!({"v": 7}));
    let (bytes, _) = Renderer::new()
        .render_bytes(&template, &data, &RenderOptions::default())
        .unwrap();

    let doc = read_output(&bytes);
    let styles: Vec<Option<u32>> = doc.sheets[0]
        .rows
        .iter()
        .flat_map(|r| r.cells.iter().map(|c| c.style))
        .collect();
    assert_eq!(styles, vec![Some(0), Some(0)]);
    assert_eq!(cell_at(&doc, 2, 1), Some(CellValue::Number(7.0)));
}

#[test]
fn variables_substitute_typed_and_inline() {
    let template = build_template(
        &[
            (1, 1, text("{{ title }}")),
            (1, 2, text("Total: {{ total }} EUR")),
            (2, 1, text("{{ qty }}")),
            (2, 2, text("{{ missing }}")),
            (3, 1, text("{{ title|upper }}")),
        ],
        &[],
    );

    let data = Value::from(serde_json::json!({"title": "Report", "total": 12.5, "qty": 5}));
    let (bytes, report) = Renderer::new()
        .render_bytes(&template, &data, &RenderOptions::default())
        .unwrap();

    let doc = read_output(&bytes);
    assert_eq!(cell_at(&doc, 1, 1), Some(text("Report")));
    assert_eq!(cell_at(&doc, 1, 2), Some(text("Total: 12.5 EUR")));
    // Full-cell numeric placeholders stay numeric.
    assert_eq!(cell_at(&doc, 2, 1), Some(CellValue::Number(5.0)));
    // Missing variable renders empty (the cell vanishes) with a warning.
    assert_eq!(cell_at(&doc, 2, 2), None);
    assert_eq!(cell_at(&doc, 3, 1), Some(text("REPORT")));

    assert_eq!(report.cells_substituted, 5);
    assert_eq!(
        report.warnings,
        vec![RenderWarning::UnresolvedVariable {
            expr: "missing".to_string(),
            cell: "Sheet1!B2".to_string(),
        }]
    );
}

#[test]
fn loop_block_expands_per_item_with_formula_shifts() {
    let template = build_template(
        &[
            (1, 1, text("header")),
            (3, 1, text("{% for item in items %}")),
            (4, 1, text("{{ item.name }}")),
            (4, 2, CellValue::Formula("C4*2".to_string())),
            (5, 1, text("subtotal")),
            (6, 1, text("{% endfor %}")),
            (7, 1, CellValue::Formula("SUM(B4:B5)".to_string())),
        ],
        &[],
    );

    let data = Value::from(serde_json::json!({
        "items": [{"name": "a"}, {"name": "b"}, {"name": "c"}],
    }));
    let (bytes, report) = Renderer::new()
        .render_bytes(&template, &data, &RenderOptions::default())
        .unwrap();

    let doc = read_output(&bytes);
    // 1 header + 3 items x 2 rows + 1 trailing = 8 occupied rows, 1..=9 with
    // row 2 absent (it was empty in the template).
    assert_eq!(cell_at(&doc, 3, 1), Some(text("a")));
    assert_eq!(cell_at(&doc, 4, 1), Some(text("subtotal")));
    assert_eq!(cell_at(&doc, 5, 1), Some(text("b")));
    assert_eq!(cell_at(&doc, 7, 1), Some(text("c")));
    assert_eq!(cell_at(&doc, 9, 1), Some(CellValue::Formula("SUM(B4:B5)".to_string())));

    // Item 0 shifts by -1, item 1 by +1, item 2 by +3.
    assert_eq!(cell_at(&doc, 3, 2), Some(CellValue::Formula("C3*2".to_string())));
    assert_eq!(cell_at(&doc, 5, 2), Some(CellValue::Formula("C5*2".to_string())));
    assert_eq!(cell_at(&doc, 7, 2), Some(CellValue::Formula("C7*2".to_string())));

    assert_eq!(report.rows_expanded, 6);
    assert!(report.warnings.is_empty());
}

#[test]
fn empty_sequence_removes_block_with_warning() {
    let template = build_template(
        &[
            (1, 1, text("header")),
            (2, 1, text("{% for item in items %}")),
            (3, 1, text("{{ item.name }}")),
            (4, 1, text("{% endfor %}")),
            (5, 1, text("footer")),
        ],
        &[],
    );

    let data = Value::from(serde_json::json!({"items": []}));
    let (bytes, report) = Renderer::new()
        .render_bytes(&template, &data, &RenderOptions::default())
        .unwrap();

    let doc = read_output(&bytes);
    assert_eq!(cell_at(&doc, 1, 1), Some(text("header")));
    assert_eq!(cell_at(&doc, 2, 1), Some(text("footer")));
    assert_eq!(doc.sheets[0].rows.len(), 2);
    assert_eq!(
        report.warnings,
        vec![RenderWarning::EmptyLoopSequence {
            expr: "items".to_string(),
            row: 2,
        }]
    );
}

#[test]
fn unmatched_close_marker_aborts_without_output() {
    let template = build_template(&[(2, 1, text("{% endfor %}"))], &[]);
    let data = Value::from(serde_json::json!({}));

    let dir = tempfile::tempdir().unwrap();
    let template_path = dir.path().join("template.xlsx");
    let output_path = dir.path().join("out.xlsx");
    std::fs::write(&template_path, &template).unwrap();

    let err = render(&template_path, &data, &output_path, &RenderOptions::default())
        .expect_err("unmatched close must abort");
    assert!(matches!(err, RenderError::UnmatchedLoopClose { row: 2, .. }));
    assert!(!output_path.exists());
}

#[test]
fn missing_image_clears_cell_and_warns() {
    let payload = format!(
        r#"{IMAGE_SENTINEL}{{"path": "/no/such/file.png", "in_cell": true, "keep_ratio": true}}"#
    );
    let template = build_template(&[(1, 1, text(&payload)), (2, 1, text("after"))], &[]);

    let data = Value::from(serde_json::json!({}));
    let (bytes, report) = Renderer::new()
        .render_bytes(&template, &data, &RenderOptions::default())
        .unwrap();

    let doc = read_output(&bytes);
    // The directive text must not leak into the output.
    assert_eq!(cell_at(&doc, 1, 1), None);
    assert_eq!(cell_at(&doc, 2, 1), Some(text("after")));
    assert_eq!(report.images_inserted, 0);
    assert!(matches!(
        report.warnings.as_slice(),
        [RenderWarning::ImageLoadFailure { path, .. }] if path == "/no/such/file.png"
    ));

    // Output remains a loadable package.
    assert!(XlsxPackage::from_bytes(&bytes).is_ok());
}

fn tiny_png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(&13u32.to_be_bytes());
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
    bytes
}

#[test]
fn inline_image_is_anchored_and_scaled() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("logo.png");
    std::fs::write(&image_path, tiny_png(200, 100)).unwrap();

    let payload = format!(
        r#"{IMAGE_SENTINEL}{{"path": {:?}, "in_cell": true, "keep_ratio": true}}"#,
        image_path.to_string_lossy()
    );
    let template = build_template(&[(2, 1, text(&payload))], &[]);

    let data = Value::from(serde_json::json!({}));
    let (bytes, report) = Renderer::new()
        .render_bytes(&template, &data, &RenderOptions::default())
        .unwrap();

    assert_eq!(report.images_inserted, 1);
    assert!(report.warnings.is_empty());

    let package = XlsxPackage::from_bytes(&bytes).unwrap();
    assert!(package.has_part("xl/media/image1.png"));
    let drawing = package.part_str("xl/drawings/drawing1.xml").unwrap();
    assert!(drawing.contains("<xdr:oneCellAnchor>"));
    // Anchored at A2: 0-indexed col 0, row 1.
    assert!(drawing.contains("<xdr:col>0</xdr:col>"));
    assert!(drawing.contains("<xdr:row>1</xdr:row>"));
}

#[test]
fn explicit_image_inserts_use_caller_coordinates() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("chart.png");
    std::fs::write(&image_path, tiny_png(64, 64)).unwrap();

    let template = build_template(&[(1, 1, text("report"))], &[]);
    let options = RenderOptions {
        images: vec![ImageInsert {
            sheet: "Sheet1".to_string(),
            cell: sheetcraft_model::CellRef::new(5, 3),
            directive: ImageDirective {
                path: image_path.to_string_lossy().into_owned(),
                in_cell: false,
                keep_ratio: false,
                width: Some(32.0),
                height: None,
            },
        }],
        ..RenderOptions::default()
    };

    let data = Value::from(serde_json::json!({}));
    let (bytes, report) = Renderer::new().render_bytes(&template, &data, &options).unwrap();

    assert_eq!(report.images_inserted, 1);
    let package = XlsxPackage::from_bytes(&bytes).unwrap();
    let drawing = package.part_str("xl/drawings/drawing1.xml").unwrap();
    assert!(drawing.contains("<xdr:col>2</xdr:col>"));
    assert!(drawing.contains("<xdr:row>4</xdr:row>"));
    // width=32 with intrinsic 64x64 derives height 32: 32 px * 9525 EMU.
    assert!(drawing.contains(r#"cx="304800" cy="304800""#));
}

#[test]
fn format_fix_runs_and_reports_clean_output() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("logo.png");
    std::fs::write(&image_path, tiny_png(10, 10)).unwrap();

    let payload = format!(
        r#"{IMAGE_SENTINEL}{{"path": {:?}, "in_cell": true}}"#,
        image_path.to_string_lossy()
    );
    let template = build_template(&[(1, 1, text(&payload))], &[]);

    let data = Value::from(serde_json::json!({}));
    let (_, report) = Renderer::new()
        .render_bytes(&template, &data, &RenderOptions::default())
        .unwrap();

    // Drawings are written prefixed, so the fixer finds nothing to change.
    let fix = report.format_fix.expect("fix pass ran");
    assert!(fix.changed_entries.is_empty());
    assert!(fix.rules_applied.is_empty());
}

#[test]
fn custom_filters_apply_through_the_renderer() {
    let template = build_template(&[(1, 1, text("{{ price|cents }}"))], &[]);
    let data = Value::from(serde_json::json!({"price": 9.5}));

    let mut renderer = Renderer::new();
    renderer.evaluator_mut().register_filter("cents", |v| match v {
        Value::Number(n) => Value::Number((n * 100.0).round()),
        other => other.clone(),
    });
    let (bytes, report) = renderer
        .render_bytes(&template, &data, &RenderOptions::default())
        .unwrap();

    let doc = read_output(&bytes);
    assert_eq!(cell_at(&doc, 1, 1), Some(CellValue::Number(950.0)));
    assert!(report.warnings.is_empty());
}

#[test]
fn merge_inside_block_clones_per_item() {
    let template = build_template(
        &[
            (1, 1, text("{% for item in items %}")),
            (2, 1, text("{{ item }}")),
            (3, 1, text("{% endfor %}")),
        ],
        &["A2:B2"],
    );

    let data = Value::from(serde_json::json!({"items": ["x", "y"]}));
    let (bytes, report) = Renderer::new()
        .render_bytes(&template, &data, &RenderOptions::default())
        .unwrap();

    let doc = read_output(&bytes);
    assert_eq!(
        doc.sheets[0].merges,
        vec![Range::from_a1("A1:B1").unwrap(), Range::from_a1("A2:B2").unwrap()]
    );
    assert_eq!(cell_at(&doc, 1, 1), Some(text("x")));
    assert_eq!(cell_at(&doc, 2, 1), Some(text("y")));
    assert!(report.warnings.is_empty());
}

fn anchored_png(marker: u8) -> AnchoredImage {
    AnchoredImage {
        bytes: tiny_png(40, 40 + marker as u32),
        width_px: 40,
        height_px: 40,
        extension: "png".to_string(),
    }
}

#[test]
fn template_images_survive_rendering() {
    let mut sink = XlsxSink::new_workbook();
    let sheet = sink.new_sheet("Sheet1").unwrap();
    sink.write_cell(sheet, 1, 1, text("{{ title }}"), None).unwrap();
    sink.insert_anchored_image(sheet, 3, 2, anchored_png(0)).unwrap();
    let template = sink.save().unwrap();

    let data = Value::from(serde_json::json!({"title": "Report"}));
    let (bytes, report) = Renderer::new()
        .render_bytes(&template, &data, &RenderOptions::default())
        .unwrap();
    assert!(report.warnings.is_empty());

    let package = XlsxPackage::from_bytes(&bytes).unwrap();
    let worksheet = package.part_str("xl/worksheets/sheet1.xml").unwrap();
    assert!(worksheet.contains("<drawing r:id="));
    assert!(package.has_part("xl/drawings/drawing1.xml"));
    assert!(package.has_part("xl/media/image1.png"));
}

#[test]
fn template_images_shift_below_expanded_blocks() {
    let mut sink = XlsxSink::new_workbook();
    let sheet = sink.new_sheet("Sheet1").unwrap();
    sink.write_cell(sheet, 1, 1, text("{% for item in items %}"), None).unwrap();
    sink.write_cell(sheet, 2, 1, text("{{ item }}"), None).unwrap();
    sink.write_cell(sheet, 3, 1, text("{% endfor %}"), None).unwrap();
    sink.write_cell(sheet, 5, 1, text("footer"), None).unwrap();
    sink.insert_anchored_image(sheet, 6, 1, anchored_png(0)).unwrap();
    let template = sink.save().unwrap();

    // Four items over a one-row body push everything below down by one.
    let data = Value::from(serde_json::json!({"items": ["a", "b", "c", "d"]}));
    let (bytes, report) = Renderer::new()
        .render_bytes(&template, &data, &RenderOptions::default())
        .unwrap();
    assert!(report.warnings.is_empty());

    let package = XlsxPackage::from_bytes(&bytes).unwrap();
    let drawing = package.part_str("xl/drawings/drawing1.xml").unwrap();
    // Template row 6 (0-indexed 5) lands on row 7 (0-indexed 6).
    assert!(drawing.contains("<xdr:row>6</xdr:row>"));
    assert!(!drawing.contains("<xdr:row>5</xdr:row>"));
    assert_eq!(cell_at(&read_output(&bytes), 6, 1), Some(text("footer")));
}

#[test]
fn inline_images_join_the_template_drawing() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("extra.png");
    std::fs::write(&image_path, tiny_png(10, 10)).unwrap();

    let mut sink = XlsxSink::new_workbook();
    let sheet = sink.new_sheet("Sheet1").unwrap();
    sink.insert_anchored_image(sheet, 1, 1, anchored_png(0)).unwrap();
    let payload = format!(
        r#"{IMAGE_SENTINEL}{{"path": {:?}, "in_cell": true}}"#,
        image_path.to_string_lossy()
    );
    sink.write_cell(sheet, 4, 1, text(&payload), None).unwrap();
    let template = sink.save().unwrap();

    let data = Value::from(serde_json::json!({}));
    let (bytes, report) = Renderer::new()
        .render_bytes(&template, &data, &RenderOptions::default())
        .unwrap();
    assert_eq!(report.images_inserted, 1);
    assert!(report.warnings.is_empty());

    let package = XlsxPackage::from_bytes(&bytes).unwrap();
    assert!(!package.has_part("xl/drawings/drawing2.xml"));
    let drawing = package.part_str("xl/drawings/drawing1.xml").unwrap();
    assert_eq!(drawing.matches("<xdr:oneCellAnchor>").count(), 2);
    let worksheet = package.part_str("xl/worksheets/sheet1.xml").unwrap();
    assert_eq!(worksheet.matches("<drawing r:id=").count(), 1);
}
